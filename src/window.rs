use crate::display::XWindow;
use crate::transform::Transform;
use std::any::Any;
use std::collections::HashMap;

/// A 4-tuple of pixel coordinates and sizes used to plot windows onto the
/// screen plane. Coordinates may go negative: workspaces to the left of and
/// above the current one live at negative offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quad {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Quad {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Quad { x, y, w, h }
    }

    pub fn from_size(w: i32, h: i32) -> Self {
        Quad { x: 0, y: 0, w, h }
    }

    /// Edge-inclusive: a press on a window's far border still belongs to it.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px <= self.x + self.w && py >= self.y && py <= self.y + self.h
    }

    pub fn intersects(&self, other: &Quad) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }

    pub fn union(&self, other: &Quad) -> Quad {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let r = (self.x + self.w).max(other.x + other.w);
        let b = (self.y + self.h).max(other.y + other.h);
        Quad::new(x, y, r - x, b - y)
    }
}

bitflags! {
    /// Internal per-window state bits, not known to the display server.
    pub struct WindowFlags: u32 {
        /// Drawing disabled: unmapped, or a window-scoped error fired.
        const NORENDER      = 1 << 0;
        /// The server destroyed the window; it may linger in the stack while
        /// a plugin holds a keep reference.
        const DESTROYED     = 1 << 1;
        const VISIBLE       = 1 << 2;
        /// The window has completed its first map.
        const INITIAL_MAP   = 1 << 3;
        /// Contents changed since the last texture upload.
        const DAMAGED       = 1 << 4;
        /// Quad buffers are shared and must never be regenerated.
        const NO_VBO_CHANGE = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Normal,
    /// Background tile; stacks below everything and is never focused.
    Desktop,
}

/// A managed top-level window: its display id, pixel geometry, GPU handles,
/// state flags, transform, weak family links and a dictionary plugins use to
/// attach private state.
pub struct Client {
    pub id: XWindow,
    pub attrib: Quad,
    pub kind: WindowKind,
    pub flags: WindowFlags,
    /// Sticky references held by plugins to defer destruction past the
    /// server-side destroy notification.
    pub keep_count: u32,
    pub transform: Transform,

    pub texture: u32,
    pub vao: u32,
    pub vbo: u32,

    /// Lookup-only links, resolved against the stack at each use; the parent
    /// may well be gone by then.
    pub transient_for: Option<XWindow>,
    pub leader: Option<XWindow>,

    pub data: HashMap<String, Box<dyn Any>>,
}

impl Client {
    pub fn new(id: XWindow, attrib: Quad) -> Self {
        Client {
            id,
            attrib,
            kind: WindowKind::Normal,
            flags: WindowFlags::VISIBLE,
            keep_count: 0,
            transform: Transform::default(),
            texture: 0,
            vao: 0,
            vbo: 0,
            transient_for: None,
            leader: None,
            data: HashMap::new(),
        }
    }

    pub fn desktop(id: XWindow, attrib: Quad) -> Self {
        let mut win = Client::new(id, attrib);
        win.kind = WindowKind::Desktop;
        win.flags |= WindowFlags::NO_VBO_CHANGE | WindowFlags::INITIAL_MAP;
        win
    }

    pub fn destroyed(&self) -> bool {
        self.flags.contains(WindowFlags::DESTROYED)
    }

    pub fn norender(&self) -> bool {
        self.flags.contains(WindowFlags::NORENDER)
    }

    pub fn visible(&self) -> bool {
        self.flags.contains(WindowFlags::VISIBLE)
    }

    pub fn damaged(&self) -> bool {
        self.flags.contains(WindowFlags::DAMAGED)
    }

    pub fn set_destroyed(&mut self, value: bool) {
        self.flags.set(WindowFlags::DESTROYED, value);
    }

    pub fn set_norender(&mut self, value: bool) {
        self.flags.set(WindowFlags::NORENDER, value);
    }

    pub fn set_visible(&mut self, value: bool) {
        self.flags.set(WindowFlags::VISIBLE, value);
    }

    pub fn set_damaged(&mut self, value: bool) {
        self.flags.set(WindowFlags::DAMAGED, value);
    }

    pub fn should_be_drawn(&self) -> bool {
        !self.destroyed() && !self.norender() && self.visible()
    }
}
