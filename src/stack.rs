use crate::display::XWindow;
use crate::window::{Client, WindowKind};
use std::rc::Rc;

/// Pluggable hit-test: maps a screen point to the window that should receive
/// interactive operations there. The overview plugin swaps this out to remap
/// points across the zoomed-out grid, save-and-restore style.
pub type HitTestFn = Rc<dyn Fn(&WindowStack, i32, i32) -> Option<XWindow>>;

/// Ordered set of managed windows, bottom to top. Owns every window; all
/// other references are by display id.
pub struct WindowStack {
    wins: Vec<Client>,
    focused: Option<XWindow>,
    /// Forces the next frame to recomposite every window regardless of the
    /// culling region; held high for the duration of interactive drags.
    pub all_damaged: bool,
    hit_test: HitTestFn,
}

impl WindowStack {
    pub fn new() -> Self {
        WindowStack {
            wins: Vec::new(),
            focused: None,
            all_damaged: false,
            hit_test: Rc::new(WindowStack::topmost_at),
        }
    }

    /// Default hit-test: topmost drawable window containing the point.
    pub fn topmost_at(stack: &WindowStack, x: i32, y: i32) -> Option<XWindow> {
        stack
            .wins
            .iter()
            .rev()
            .find(|w| w.should_be_drawn() && w.attrib.contains(x, y))
            .map(|w| w.id)
    }

    fn index_of(&self, id: XWindow) -> Option<usize> {
        self.wins.iter().position(|w| w.id == id)
    }

    /// Inserts a window: desktops at the very bottom, everything else above
    /// the desktops and existing windows but below the current focus.
    pub fn add(&mut self, win: Client) {
        if win.kind == WindowKind::Desktop {
            self.wins.insert(0, win);
            return;
        }

        let floor = self
            .wins
            .iter()
            .rposition(|w| w.kind == WindowKind::Desktop)
            .map_or(0, |i| i + 1);

        let top = self.wins.len();
        let mut idx = match self.focused.and_then(|f| self.index_of(f)) {
            Some(fi) if fi + 1 == top => fi,
            _ => top,
        };
        if idx < floor {
            idx = floor;
        }
        self.wins.insert(idx, win);
    }

    /// Marks the window destroyed; it is deleted immediately when forced or
    /// unreferenced, otherwise deletion waits for the keep count to drain.
    pub fn remove(&mut self, id: XWindow, force: bool) {
        if let Some(i) = self.index_of(id) {
            self.wins[i].set_destroyed(true);
            if force || self.wins[i].keep_count == 0 {
                self.wins.remove(i);
            }
            if self.focused == Some(id) {
                self.focused = None;
            }
        }
    }

    /// Takes a sticky reference that defers destruction.
    pub fn hold(&mut self, id: XWindow) {
        if let Some(w) = self.find_mut(id) {
            w.keep_count += 1;
        }
    }

    /// Releases a sticky reference, deleting the window if it was destroyed
    /// in the meantime.
    pub fn release(&mut self, id: XWindow) {
        if let Some(i) = self.index_of(id) {
            let w = &mut self.wins[i];
            w.keep_count = w.keep_count.saturating_sub(1);
            if w.destroyed() && w.keep_count == 0 {
                self.wins.remove(i);
            }
        }
    }

    pub fn find(&self, id: XWindow) -> Option<&Client> {
        self.wins.iter().find(|w| w.id == id)
    }

    pub fn find_mut(&mut self, id: XWindow) -> Option<&mut Client> {
        self.wins.iter_mut().find(|w| w.id == id)
    }

    /// Raises the window to the top of the stack and focuses it.
    pub fn focus(&mut self, id: XWindow) -> bool {
        match self.index_of(id) {
            Some(i) if !self.wins[i].destroyed() => {
                let win = self.wins.remove(i);
                self.wins.push(win);
                self.focused = Some(id);
                true
            }
            _ => false,
        }
    }

    pub fn focused(&self) -> Option<XWindow> {
        self.focused
    }

    /// Bottom-up walk of the windows that should reach the compositor.
    pub fn paint_order(&self) -> impl Iterator<Item = &Client> {
        self.wins.iter().filter(|w| w.should_be_drawn())
    }

    pub fn paint_order_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.wins.iter_mut().filter(|w| w.should_be_drawn())
    }

    /// Every member, bottom-up, including destroyed and hidden windows.
    pub fn iter(&self) -> std::slice::Iter<'_, Client> {
        self.wins.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Client> {
        self.wins.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.wins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wins.is_empty()
    }

    pub fn window_at(&self, x: i32, y: i32) -> Option<XWindow> {
        let hit = Rc::clone(&self.hit_test);
        hit(self, x, y)
    }

    pub fn hit_test(&self) -> HitTestFn {
        Rc::clone(&self.hit_test)
    }

    pub fn set_hit_test(&mut self, f: HitTestFn) {
        self.hit_test = f;
    }

    pub fn remove_desktops(&mut self) {
        self.wins.retain(|w| w.kind != WindowKind::Desktop);
    }
}
