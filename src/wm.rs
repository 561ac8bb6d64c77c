use crate::bindings::{
    BindingId, BindingRegistry, ButtonBinding, ButtonKind, Context, Handler, Hook, KeyBinding,
};
use crate::config::Config;
use crate::display::{DisplayServer, Event, XWindow, ANY_MODIFIER};
use crate::ownership::OwnershipArbiter;
use crate::plugins::{Expo, Move, Plugin, Resize, WorkspaceSwitch};
use crate::render::Renderer;
use crate::stack::WindowStack;
use crate::transform::GlobalTransform;
use crate::window::{Client, Quad, WindowFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use x11::xlib::Button1;

const REFRESH_RATE: u64 = 60;
/// Shaved off the frame period to absorb scheduler jitter.
const FRAME_SLACK_US: u64 = 50;

/// Ids for windows the manager fabricates itself (background tiles).
/// Server-assigned resource ids are 29-bit and never reach this range.
const SYNTHETIC_ID_BASE: XWindow = 1 << 48;

lazy_static! {
    /// At most one event loop per process; contention is a programming error.
    static ref LOOP_GUARD: Mutex<()> = Mutex::new(());
}

/// Shared state every subsystem and plugin works against: the display
/// connection, the window stack, binding and ownership registries, the
/// global transforms and the workspace grid. Plugins receive this by
/// reference on every callback instead of reaching through a global.
pub struct Core {
    pub display: Box<dyn DisplayServer>,
    pub renderer: Box<dyn Renderer>,
    pub stack: WindowStack,
    pub bindings: BindingRegistry,
    pub owners: OwnershipArbiter,
    pub globals: GlobalTransform,
    pub config: Config,

    pub width: i32,
    pub height: i32,
    /// Set by any state change, consumed by the render step.
    pub redraw: bool,
    pub mousex: i32,
    pub mousey: i32,
    /// Input scale: pixel deltas are multiplied by this before they reach
    /// window geometry. The overview sets it to the grid dimensions so
    /// on-screen motion translates to virtual-plane motion.
    pub scale_x: i32,
    pub scale_y: i32,
    /// Culling region; windows outside it are skipped by the render walk.
    pub output: Quad,

    /* virtual desktop grid */
    pub vwidth: i32,
    pub vheight: i32,
    pub vx: i32,
    pub vy: i32,
}

impl Core {
    pub fn new(
        display: Box<dyn DisplayServer>,
        renderer: Box<dyn Renderer>,
        config: Config,
    ) -> Self {
        let (width, height) = display.screen_size();
        let (vwidth, vheight) = config.grid();

        Core {
            display,
            renderer,
            stack: WindowStack::new(),
            bindings: BindingRegistry::new(),
            owners: OwnershipArbiter::new(),
            globals: GlobalTransform::default(),
            config,
            width,
            height,
            redraw: true,
            mousex: 0,
            mousey: 0,
            scale_x: 1,
            scale_y: 1,
            output: Quad::from_size(width, height),
            vwidth,
            vheight,
            vx: 0,
            vy: 0,
        }
    }

    /* ---- binding registration, with the grab side effects ---- */

    pub fn add_key(&mut self, mut binding: KeyBinding, grab: bool) -> BindingId {
        if grab {
            self.display.grab_key(binding.key, binding.mods);
            binding.grabbed = true;
        }
        self.bindings.add_key(binding)
    }

    pub fn remove_key(&mut self, id: BindingId) {
        if let Some(binding) = self.bindings.remove_key(id) {
            if binding.grabbed {
                self.display.ungrab_key(binding.key, binding.mods);
            }
        }
    }

    pub fn add_button(&mut self, mut binding: ButtonBinding, grab: bool) -> BindingId {
        if grab {
            self.display.grab_button(binding.button, binding.mods);
            binding.grabbed = true;
        }
        self.bindings.add_button(binding)
    }

    pub fn remove_button(&mut self, id: BindingId) {
        if let Some(binding) = self.bindings.remove_button(id) {
            if binding.grabbed {
                self.display.ungrab_button(binding.button, binding.mods);
            }
        }
    }

    pub fn add_hook(&mut self, hook: Hook) -> BindingId {
        self.bindings.add_hook(hook)
    }

    pub fn remove_hook(&mut self, id: BindingId) {
        self.bindings.remove_hook(id);
    }

    pub fn enable_hook(&mut self, id: BindingId) {
        self.bindings.set_hook_active(id, true);
    }

    pub fn disable_hook(&mut self, id: BindingId) {
        self.bindings.set_hook_active(id, false);
    }

    /* ---- ownership ---- */

    pub fn activate_owner(&mut self, name: &str) -> bool {
        self.owners.activate(name)
    }

    pub fn deactivate_owner(&mut self, name: &str) {
        self.owners.deactivate(name, self.display.as_mut());
    }

    pub fn grab_owner(&mut self, name: &str) {
        self.owners.grab(name, self.display.as_mut());
    }

    pub fn ungrab_owner(&mut self, name: &str) {
        self.owners.ungrab(name, self.display.as_mut());
    }

    pub fn owner_active(&self, name: &str) -> bool {
        self.owners.is_active(name)
    }

    /* ---- windows ---- */

    pub fn window_at(&self, x: i32, y: i32) -> Option<XWindow> {
        self.stack.window_at(x, y)
    }

    pub fn focus_window(&mut self, id: XWindow) {
        if self.stack.focus(id) {
            self.redraw = true;
        }
    }

    /// Takes a plugin hold that defers destruction of the window.
    pub fn hold_window(&mut self, id: XWindow) {
        self.stack.hold(id);
    }

    pub fn add_window(&mut self, id: XWindow, parent: XWindow, geometry: Quad) {
        let mut win = Client::new(id, geometry);
        if parent != self.display.root() {
            win.transient_for = Some(parent);
        }
        self.display.track_damage(id);
        self.stack.add(win);
        debug!("managing window {:#x} at {:?}", id, geometry);
    }

    /// Marks the window destroyed, dropping it now unless a plugin holds it.
    pub fn remove_window(&mut self, id: XWindow, force: bool) {
        let dropping = self
            .stack
            .find(id)
            .map_or(false, |w| force || w.keep_count == 0);
        if dropping {
            let Core {
                stack, renderer, ..
            } = self;
            if let Some(win) = stack.find(id) {
                renderer.forget_window(win);
            }
        }
        self.stack.remove(id, force);
    }

    /// Drops a plugin hold, completing a deferred destruction if this was
    /// the last one.
    pub fn release_window(&mut self, id: XWindow) {
        let dropping = self
            .stack
            .find(id)
            .map_or(false, |w| w.destroyed() && w.keep_count <= 1);
        if dropping {
            let Core {
                stack, renderer, ..
            } = self;
            if let Some(win) = stack.find(id) {
                renderer.forget_window(win);
            }
        }
        self.stack.release(id);
    }

    pub fn move_window(&mut self, id: XWindow, x: i32, y: i32) {
        if let Some(win) = self.stack.find_mut(id) {
            win.attrib.x = x;
            win.attrib.y = y;
        }
        if id < SYNTHETIC_ID_BASE {
            self.display.move_window(id, x, y);
        }
    }

    pub fn resize_window(&mut self, id: XWindow, w: i32, h: i32) {
        let (w, h) = (w.max(1), h.max(1));
        if let Some(win) = self.stack.find_mut(id) {
            win.attrib.w = w;
            win.attrib.h = h;
            win.set_damaged(true);
        }
        if id < SYNTHETIC_ID_BASE {
            self.display.resize_window(id, w, h);
        }
    }

    pub fn damage_window(&mut self, id: XWindow) {
        if let Some(win) = self.stack.find_mut(id) {
            win.set_damaged(true);
        }
        self.redraw = true;
    }

    /// Forces full recomposition of every frame while set; interactive drags
    /// keep this high because transforms move windows outside their damage.
    pub fn set_redraw_everything(&mut self, everything: bool) {
        self.stack.all_damaged = everything;
        if everything {
            self.redraw = true;
        }
    }

    /* ---- workspaces ---- */

    pub fn workspace(&self) -> (i32, i32) {
        (self.vx, self.vy)
    }

    /// Commits a workspace change by translating every window one whole
    /// screen per grid step, preserving relative layout.
    pub fn switch_workspace(&mut self, nx: i32, ny: i32) {
        let dx = (self.vx - nx) * self.width;
        let dy = (self.vy - ny) * self.height;

        let targets: Vec<(XWindow, i32, i32)> = self
            .stack
            .iter()
            .map(|w| (w.id, w.attrib.x + dx, w.attrib.y + dy))
            .collect();
        for (id, x, y) in targets {
            self.move_window(id, x, y);
        }

        self.vx = nx;
        self.vy = ny;
        info!("workspace ({}, {})", nx, ny);
    }

    /// Windows whose bounding box intersects grid cell (i, j); membership is
    /// derived from geometry, with the current cell at the origin.
    pub fn workspace_windows(&self, i: i32, j: i32) -> Vec<XWindow> {
        let cell = Quad::new(
            (i - self.vx) * self.width,
            (j - self.vy) * self.height,
            self.width,
            self.height,
        );
        self.stack
            .iter()
            .filter(|w| !w.destroyed() && w.attrib.intersects(&cell))
            .map(|w| w.id)
            .collect()
    }

    /// Tiles the background image across the grid: one desktop-type window
    /// per cell, all sharing a single texture and quad.
    pub fn set_background(&mut self, path: &Path) {
        let texture = match self.renderer.load_image(path) {
            Ok(texture) => texture,
            Err(err) => {
                warn!("background disabled: {}", err);
                return;
            }
        };
        let (vao, vbo) = self
            .renderer
            .create_quad(Quad::from_size(self.width, self.height));

        self.stack.remove_desktops();
        for i in 0..self.vheight {
            for j in 0..self.vwidth {
                let id = SYNTHETIC_ID_BASE + (i * self.vwidth + j) as XWindow;
                let geometry = Quad::new(
                    j * self.width,
                    i * self.height,
                    self.width,
                    self.height,
                );
                let mut win = Client::desktop(id, geometry);
                win.texture = texture;
                win.vao = vao;
                win.vbo = vbo;
                self.stack.add(win);
            }
        }
        self.redraw = true;
    }

    /* ---- rendering ---- */

    /// One composited frame: compose the globals once, walk the stack in
    /// paint order and draw every window that intersects the output region.
    pub fn render_all(&mut self) {
        let Core {
            renderer,
            stack,
            globals,
            output,
            ..
        } = self;
        let global = globals.compose();
        let region = *output;
        let everything = stack.all_damaged;

        renderer.begin_frame();
        for win in stack.paint_order_mut() {
            if !everything && !win.attrib.intersects(&region) {
                continue;
            }
            let matrix = global * win.transform.compose();
            renderer.draw_window(win, matrix);
            win.set_damaged(false);
        }
        renderer.end_frame();
    }

    /// Click-to-focus: raise whatever is under the pointer.
    fn focus_click(&mut self, ctx: &Context) {
        if let Event::ButtonPress { x, y, .. } = ctx.event {
            if let Some(win) = self.window_at(x, y) {
                self.focus_window(win);
            }
        }
    }
}

/// What a single pass of the loop did; drives the pacing decision and makes
/// the loop testable one iteration at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStep {
    /// Under a frame period since the last tick: blocked on the display fd.
    Waited,
    /// Ran hooks and, when the redraw bit was up, composited a frame.
    Ticked,
}

/// The manager: core state plus the built-in plugins, driving the
/// frame-paced cooperative loop.
pub struct Ember {
    pub core: Core,
    plugins: Vec<Box<dyn Plugin>>,
}

impl Ember {
    pub fn new(
        display: Box<dyn DisplayServer>,
        renderer: Box<dyn Renderer>,
        config: Config,
    ) -> Self {
        let mut core = Core::new(display, renderer, config);

        /* a plain click, any modifiers, focuses the window under it */
        core.add_button(
            ButtonBinding {
                active: true,
                kind: ButtonKind::Press,
                button: Button1,
                mods: ANY_MODIFIER,
                handler: Handler::Core,
                grabbed: false,
            },
            false,
        );

        let mut plugins: Vec<Box<dyn Plugin>> = vec![
            Box::new(Move::new()),
            Box::new(Resize::new()),
            Box::new(WorkspaceSwitch::new()),
            Box::new(Expo::new()),
        ];

        for (slot, plugin) in plugins.iter_mut().enumerate() {
            plugin.register_ownership(&mut core.owners);
            plugin.init(&mut core, Handler::Plugin(slot));
            plugin.configure(&core.config);
            debug!("plugin {} ready", plugin.name());
        }

        if let Some(path) = core.config.background_image().map(PathBuf::from) {
            core.set_background(&path);
        }

        Ember { core, plugins }
    }

    /// The frame-paced cooperative loop. Runs until the display connection
    /// goes away or the process is terminated.
    pub fn run(&mut self) {
        let _guard = LOOP_GUARD.lock().expect("event loop entered twice");
        info!("entering event loop");

        self.core.redraw = true;
        let cycle = Duration::from_micros(1_000_000 / REFRESH_RATE - FRAME_SLACK_US);
        let mut last_tick = Instant::now();

        while self.core.display.alive() {
            self.step(&mut last_tick, cycle);
        }
    }

    /// One pass: drain everything pending, then either wait out the rest of
    /// the frame period or tick hooks and render.
    pub fn step(&mut self, last_tick: &mut Instant, cycle: Duration) -> LoopStep {
        while self.core.display.pending() > 0 {
            match self.core.display.next_event() {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }

        for id in self.core.display.take_render_failures() {
            if let Some(win) = self.core.stack.find_mut(id) {
                win.set_norender(true);
            }
        }

        let now = Instant::now();
        let elapsed = now.duration_since(*last_tick);
        if elapsed < cycle {
            /* readable or not, the next pass re-drains before ticking */
            self.core.display.wait(cycle - elapsed);
            LoopStep::Waited
        } else {
            self.tick();
            if self.core.redraw {
                self.core.render_all();
                self.core.redraw = false;
            }
            *last_tick = now;
            LoopStep::Ticked
        }
    }

    /// Runs every active hook once.
    pub fn tick(&mut self) {
        for (handler, id) in self.core.bindings.active_hooks() {
            /* an earlier hook this tick may have disabled it */
            if !self.core.bindings.hook_active(id) {
                continue;
            }
            match handler {
                Handler::Core => {}
                Handler::Plugin(slot) => self.plugins[slot].on_hook(&mut self.core, id),
            }
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Expose => self.core.redraw = true,

            Event::KeyPress { key, mods } => {
                let matched = self.core.bindings.matching_keys(key, mods);
                let ctx = Context { event };
                for (handler, id) in matched {
                    if !self.core.bindings.key_active(id) {
                        continue;
                    }
                    self.invoke_key(handler, id, &ctx);
                }
                self.core.redraw = true;
            }

            Event::Created {
                window,
                parent,
                geometry,
            } => {
                if window == self.core.display.overlay() {
                    return;
                }
                /* the manager maps eagerly rather than waiting for a map
                 * request */
                self.core.display.map_window(window);
                self.core.display.sync();
                self.core.add_window(window, parent, geometry);
                self.core.redraw = true;
            }

            Event::Destroyed { window } => {
                if self.core.stack.find(window).is_none() {
                    return;
                }
                self.core.remove_window(window, false);
                self.core.redraw = true;
            }

            Event::Mapped { window } => {
                let synced = self.core.display.get_geometry(window);
                if let Some(win) = self.core.stack.find_mut(window) {
                    win.set_norender(false);
                    win.flags.insert(WindowFlags::INITIAL_MAP);
                    if let Some(geometry) = synced {
                        win.attrib = geometry;
                    }
                    win.set_damaged(true);
                    self.core.redraw = true;
                }
            }

            Event::Unmapped { window } => {
                if let Some(win) = self.core.stack.find_mut(window) {
                    win.set_norender(true);
                    self.core.redraw = true;
                }
            }

            Event::ButtonPress {
                button,
                mods,
                x,
                y,
                time,
                ..
            } => {
                self.core.mousex = x;
                self.core.mousey = y;

                let matched = self.core.bindings.matching_presses(button, mods);
                let ctx = Context { event };
                for (handler, id) in matched {
                    if !self.core.bindings.button_active(id) {
                        continue;
                    }
                    self.invoke_button(handler, id, &ctx);
                }
                self.core.display.allow_replay(time);
            }

            Event::ButtonRelease { time, .. } => {
                let matched = self.core.bindings.active_releases();
                let ctx = Context { event };
                for (handler, id) in matched {
                    if !self.core.bindings.button_active(id) {
                        continue;
                    }
                    self.invoke_button(handler, id, &ctx);
                }
                self.core.display.allow_replay(time);
            }

            Event::Motion { x, y } => {
                self.core.mousex = x;
                self.core.mousey = y;
            }

            Event::Damaged { window } => {
                if let Some(win) = self.core.stack.find_mut(window) {
                    win.set_damaged(true);
                }
                self.core.redraw = true;
            }

            Event::KeyRelease { .. }
            | Event::Property { .. }
            | Event::FocusChange { .. }
            | Event::Crossing { .. } => {}
        }
    }

    fn invoke_key(&mut self, handler: Handler, id: BindingId, ctx: &Context) {
        match handler {
            Handler::Core => {}
            Handler::Plugin(slot) => self.plugins[slot].on_key(&mut self.core, id, ctx),
        }
    }

    fn invoke_button(&mut self, handler: Handler, id: BindingId, ctx: &Context) {
        match handler {
            Handler::Core => self.core.focus_click(ctx),
            Handler::Plugin(slot) => self.plugins[slot].on_button(&mut self.core, id, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::fake::{FakeDisplay, FakeLog};
    use crate::render::recording::{RecordingRenderer, RenderLog};
    use crate::window::WindowKind;
    use glam::Mat4;
    use std::cell::RefCell;
    use std::rc::Rc;
    use x11::keysym::{XK_e, XK_l};
    use x11::xlib::{ControlMask, Mod1Mask, Mod4Mask};

    struct Harness {
        wm: Ember,
        display_log: Rc<RefCell<FakeLog>>,
        render_log: Rc<RefCell<RenderLog>>,
    }

    fn harness(width: i32, height: i32) -> Harness {
        harness_with(FakeDisplay::new(width, height))
    }

    fn harness_with(display: FakeDisplay) -> Harness {
        let display_log = display.log_handle();
        let renderer = RecordingRenderer::new();
        let render_log = renderer.log_handle();
        let wm = Ember::new(Box::new(display), Box::new(renderer), Config::default());
        Harness {
            wm,
            display_log,
            render_log,
        }
    }

    fn create_window(wm: &mut Ember, id: XWindow, geometry: Quad) {
        wm.handle_event(Event::Created {
            window: id,
            parent: 1,
            geometry,
        });
        wm.handle_event(Event::Mapped { window: id });
    }

    fn press(button: u32, mods: u32, x: i32, y: i32) -> Event {
        Event::ButtonPress {
            button,
            mods,
            x,
            y,
            window: 0,
            time: 1,
        }
    }

    fn release(x: i32, y: i32) -> Event {
        Event::ButtonRelease {
            button: Button1,
            mods: 0,
            x,
            y,
            window: 0,
            time: 2,
        }
    }

    fn long_ago() -> Instant {
        Instant::now() - Duration::from_secs(1)
    }

    fn cycle() -> Duration {
        Duration::from_micros(1_000_000 / REFRESH_RATE - FRAME_SLACK_US)
    }

    #[test]
    fn drag_moves_window_by_cursor_delta() {
        let mut h = harness(1000, 800);
        create_window(&mut h.wm, 7, Quad::new(100, 100, 400, 300));

        h.wm.handle_event(press(Button1, Mod1Mask, 200, 150));
        assert!(h.wm.core.owner_active("move"));
        assert_eq!(h.display_log.borrow().pointer_grabs, 1);

        for i in 1..=30 {
            h.wm.handle_event(Event::Motion {
                x: 200 + i * 2,
                y: 150 + i,
            });
            h.wm.tick();
        }
        /* mid-drag the window moves through its transform, not its pixels */
        {
            let win = h.wm.core.stack.find(7).unwrap();
            assert_eq!(win.attrib, Quad::new(100, 100, 400, 300));
            assert_ne!(win.transform.translation, Mat4::IDENTITY);
        }

        h.wm.handle_event(release(260, 180));

        let win = h.wm.core.stack.find(7).unwrap();
        assert_eq!(win.attrib, Quad::new(160, 130, 400, 300));
        assert_eq!(win.transform.translation, Mat4::IDENTITY);
        assert!(!h.wm.core.owner_active("move"));
        assert_eq!(h.display_log.borrow().moves.last(), Some(&(7, 160, 130)));
        assert_eq!(h.display_log.borrow().pointer_ungrabs, 1);
    }

    #[test]
    fn zero_delta_drag_changes_nothing() {
        let mut h = harness(1000, 800);
        create_window(&mut h.wm, 7, Quad::new(100, 100, 400, 300));

        h.wm.handle_event(press(Button1, Mod1Mask, 200, 150));
        h.wm.tick();
        h.wm.handle_event(release(200, 150));

        let win = h.wm.core.stack.find(7).unwrap();
        assert_eq!(win.attrib, Quad::new(100, 100, 400, 300));
        assert_eq!(win.transform.translation, Mat4::IDENTITY);
        assert!(!h.wm.core.owner_active("move"));
    }

    #[test]
    fn resize_keeps_top_left_fixed() {
        let mut h = harness(1000, 1000);
        create_window(&mut h.wm, 9, Quad::new(0, 0, 200, 200));

        h.wm.handle_event(press(Button1, ControlMask, 200, 200));
        assert!(h.wm.core.owner_active("resize"));

        h.wm.handle_event(Event::Motion { x: 400, y: 400 });
        h.wm.tick();
        {
            let win = h.wm.core.stack.find(9).unwrap();
            assert_ne!(win.transform.scale, Mat4::IDENTITY);
        }

        h.wm.handle_event(release(400, 400));

        let win = h.wm.core.stack.find(9).unwrap();
        assert_eq!(win.attrib, Quad::new(0, 0, 400, 400));
        assert_eq!(win.transform.scale, Mat4::IDENTITY);
        assert_eq!(win.transform.translation, Mat4::IDENTITY);
        assert!(!h.wm.core.owner_active("resize"));
        assert_eq!(h.display_log.borrow().resizes.last(), Some(&(9, 400, 400)));
    }

    #[test]
    fn degenerate_window_is_clamped_before_scaling() {
        let mut h = harness(1000, 1000);
        create_window(&mut h.wm, 9, Quad::new(10, 10, 0, 0));

        h.wm.handle_event(press(Button1, ControlMask, 10, 10));
        {
            let win = h.wm.core.stack.find(9).unwrap();
            assert_eq!((win.attrib.w, win.attrib.h), (1, 1));
        }

        h.wm.handle_event(Event::Motion { x: 40, y: 50 });
        h.wm.tick();
        h.wm.handle_event(release(40, 50));

        let win = h.wm.core.stack.find(9).unwrap();
        assert_eq!(win.attrib, Quad::new(10, 10, 31, 41));
    }

    #[test]
    fn three_wrapping_switches_return_home() {
        let mut h = harness(900, 900);
        create_window(&mut h.wm, 7, Quad::new(100, 100, 200, 200));
        create_window(&mut h.wm, 8, Quad::new(400, 400, 100, 100));

        let right = h.wm.core.display.keycode(XK_l);
        for _ in 0..3 {
            h.wm.handle_event(Event::KeyPress {
                key: right,
                mods: ControlMask | Mod1Mask,
            });
        }
        for _ in 0..200 {
            h.wm.tick();
        }

        assert_eq!(h.wm.core.workspace(), (0, 0));
        assert!(h.wm.core.globals.is_identity());
        assert_eq!(h.wm.core.stack.find(7).unwrap().attrib.x, 100);
        assert_eq!(h.wm.core.stack.find(8).unwrap().attrib.x, 400);
        assert_eq!(h.wm.core.output, Quad::from_size(900, 900));
    }

    #[test]
    fn one_switch_translates_every_window_a_screen_over() {
        let mut h = harness(900, 900);
        create_window(&mut h.wm, 7, Quad::new(100, 100, 200, 200));

        let right = h.wm.core.display.keycode(XK_l);
        h.wm.handle_event(Event::KeyPress {
            key: right,
            mods: ControlMask | Mod1Mask,
        });

        /* the slide is in flight: translation moves, pixels do not */
        h.wm.tick();
        h.wm.tick();
        assert!(!h.wm.core.globals.is_identity());
        assert_eq!(h.wm.core.stack.find(7).unwrap().attrib.x, 100);
        /* both screens stay on display for the duration of the slide */
        assert_eq!(h.wm.core.output, Quad::new(0, 0, 1800, 900));

        for _ in 0..70 {
            h.wm.tick();
        }

        assert_eq!(h.wm.core.workspace(), (1, 0));
        assert_eq!(h.wm.core.stack.find(7).unwrap().attrib.x, 100 - 900);
        assert!(h.wm.core.globals.is_identity());
    }

    #[test]
    fn queued_directions_play_out_in_order() {
        let mut h = harness(900, 900);
        create_window(&mut h.wm, 7, Quad::new(100, 100, 200, 200));

        let right = h.wm.core.display.keycode(XK_l);
        h.wm.handle_event(Event::KeyPress {
            key: right,
            mods: ControlMask | Mod1Mask,
        });
        h.wm.handle_event(Event::KeyPress {
            key: right,
            mods: ControlMask | Mod1Mask,
        });

        for _ in 0..61 {
            h.wm.tick();
        }
        assert_eq!(h.wm.core.workspace(), (1, 0));

        for _ in 0..61 {
            h.wm.tick();
        }
        assert_eq!(h.wm.core.workspace(), (2, 0));
        assert_eq!(h.wm.core.stack.find(7).unwrap().attrib.x, 100 - 1800);
    }

    #[test]
    fn expo_toggle_round_trips_global_state() {
        let mut h = harness(900, 900);
        create_window(&mut h.wm, 7, Quad::new(100, 100, 200, 200));

        let saved = h.wm.core.stack.hit_test();
        let toggle = h.wm.core.display.keycode(XK_e);

        h.wm.handle_event(Event::KeyPress {
            key: toggle,
            mods: Mod4Mask,
        });
        assert!(h.wm.core.owner_active("expo"));
        assert!(!h.wm.core.globals.is_identity());
        assert_eq!((h.wm.core.scale_x, h.wm.core.scale_y), (3, 3));
        assert!(!Rc::ptr_eq(&h.wm.core.stack.hit_test(), &saved));

        h.wm.handle_event(Event::KeyPress {
            key: toggle,
            mods: Mod4Mask,
        });
        assert!(!h.wm.core.owner_active("expo"));
        assert!(h.wm.core.globals.is_identity());
        assert_eq!((h.wm.core.scale_x, h.wm.core.scale_y), (1, 1));
        assert!(Rc::ptr_eq(&h.wm.core.stack.hit_test(), &saved));
        assert_eq!(h.wm.core.output, Quad::from_size(900, 900));
    }

    #[test]
    fn expo_hit_test_maps_cells_onto_the_plane() {
        let mut h = harness(900, 900);
        /* current workspace is (1, 1); the cell up-left holds a window at
         * plane coordinates around (-450, -450) */
        h.wm.core.vx = 1;
        h.wm.core.vy = 1;
        create_window(&mut h.wm, 7, Quad::new(-500, -500, 200, 200));

        let toggle = h.wm.core.display.keycode(XK_e);
        h.wm.handle_event(Event::KeyPress {
            key: toggle,
            mods: Mod4Mask,
        });

        /* screen (150, 150) is inside cell (0, 0), offset (150, 150),
         * which remaps to (-450, -450) */
        assert_eq!(h.wm.core.window_at(150, 150), Some(7));
        assert_eq!(h.wm.core.window_at(450, 450), None);
    }

    #[test]
    fn expo_denies_interactive_move() {
        let mut h = harness(900, 900);
        h.wm.core.vx = 1;
        h.wm.core.vy = 1;
        create_window(&mut h.wm, 7, Quad::new(-500, -500, 200, 200));

        let toggle = h.wm.core.display.keycode(XK_e);
        h.wm.handle_event(Event::KeyPress {
            key: toggle,
            mods: Mod4Mask,
        });

        /* the press lands on the window through the remap, but move's
         * ticket is incompatible with expo's */
        h.wm.handle_event(press(Button1, Mod1Mask, 150, 150));
        assert!(!h.wm.core.owner_active("move"));
        assert!(h.wm.core.owner_active("expo"));
        assert_eq!(h.display_log.borrow().pointer_grabs, 0);
    }

    #[test]
    fn destroyed_window_survives_until_drag_ends() {
        let mut h = harness(1000, 800);
        create_window(&mut h.wm, 7, Quad::new(100, 100, 400, 300));

        h.wm.handle_event(press(Button1, Mod1Mask, 200, 150));
        h.wm.handle_event(Event::Destroyed { window: 7 });

        /* deferred: still findable, never painted */
        assert!(h.wm.core.stack.find(7).is_some());
        assert!(h.wm.core.stack.find(7).unwrap().destroyed());
        assert_eq!(h.wm.core.stack.paint_order().count(), 0);

        h.wm.handle_event(release(260, 180));
        assert!(h.wm.core.stack.find(7).is_none());
        assert!(!h.wm.core.owner_active("move"));
        /* no geometry request went out for the dead window */
        assert!(h.display_log.borrow().moves.is_empty());
    }

    #[test]
    fn created_windows_are_mapped_eagerly_and_damage_tracked() {
        let mut h = harness(800, 600);
        create_window(&mut h.wm, 5, Quad::new(0, 0, 100, 100));

        let log = h.display_log.borrow();
        assert_eq!(log.mapped, vec![5]);
        assert_eq!(log.damage_tracked, vec![5]);
    }

    #[test]
    fn click_focuses_and_raises() {
        let mut h = harness(800, 600);
        create_window(&mut h.wm, 5, Quad::new(0, 0, 400, 400));
        create_window(&mut h.wm, 6, Quad::new(0, 0, 400, 400));
        assert_eq!(h.wm.core.stack.focused(), None);

        h.wm.handle_event(press(Button1, 0, 50, 50));
        assert_eq!(h.wm.core.stack.focused(), Some(6));
        assert_eq!(h.display_log.borrow().replays, 1);
    }

    #[test]
    fn frame_pacing_waits_then_ticks() {
        let mut h = harness(800, 600);

        let mut fresh = Instant::now();
        assert_eq!(h.wm.step(&mut fresh, cycle()), LoopStep::Waited);

        let mut stale = long_ago();
        assert_eq!(h.wm.step(&mut stale, cycle()), LoopStep::Ticked);
        assert!(Instant::now().duration_since(stale) < Duration::from_secs(1));
    }

    #[test]
    fn render_happens_only_with_the_redraw_bit() {
        let mut h = harness(800, 600);
        create_window(&mut h.wm, 5, Quad::new(0, 0, 100, 100));

        h.wm.core.redraw = false;
        let mut last = long_ago();
        assert_eq!(h.wm.step(&mut last, cycle()), LoopStep::Ticked);
        assert_eq!(h.render_log.borrow().frames, 0);

        h.wm.handle_event(Event::Expose);
        let mut last = long_ago();
        h.wm.step(&mut last, cycle());
        assert_eq!(h.render_log.borrow().frames, 1);
        assert!(!h.wm.core.redraw);
        assert_eq!(h.render_log.borrow().drawn, vec![(5, Mat4::IDENTITY)]);
    }

    #[test]
    fn step_drains_scripted_events() {
        let mut display = FakeDisplay::new(800, 600);
        display.events.push_back(Event::Created {
            window: 5,
            parent: 1,
            geometry: Quad::new(0, 0, 100, 100),
        });
        display.events.push_back(Event::Mapped { window: 5 });
        let mut h = harness_with(display);

        let mut last = Instant::now();
        h.wm.step(&mut last, cycle());
        assert!(h.wm.core.stack.find(5).is_some());
    }

    #[test]
    fn render_failures_disable_drawing() {
        let mut display = FakeDisplay::new(800, 600);
        display.failures.push(5);
        let mut h = harness_with(display);
        create_window(&mut h.wm, 5, Quad::new(0, 0, 100, 100));

        let mut last = Instant::now();
        h.wm.step(&mut last, cycle());
        assert!(h.wm.core.stack.find(5).unwrap().norender());
    }

    #[test]
    fn offscreen_windows_are_culled_until_expo_widens_the_output() {
        let mut h = harness(900, 900);
        create_window(&mut h.wm, 5, Quad::new(100, 100, 100, 100));
        create_window(&mut h.wm, 6, Quad::new(1000, 100, 100, 100));

        h.wm.core.render_all();
        let drawn: Vec<XWindow> =
            h.render_log.borrow().drawn.iter().map(|d| d.0).collect();
        assert_eq!(drawn, vec![5]);

        let toggle = h.wm.core.display.keycode(XK_e);
        h.wm.handle_event(Event::KeyPress {
            key: toggle,
            mods: Mod4Mask,
        });
        h.wm.core.render_all();
        let drawn: Vec<XWindow> =
            h.render_log.borrow().drawn.iter().map(|d| d.0).collect();
        assert_eq!(drawn, vec![5, 6]);
    }

    #[test]
    fn background_tiles_one_desktop_per_cell() {
        let mut h = harness(800, 600);
        create_window(&mut h.wm, 5, Quad::new(0, 0, 100, 100));
        h.wm.core.set_background(Path::new("wallpaper.png"));

        let desktops: Vec<&Client> = h
            .wm
            .core
            .stack
            .iter()
            .filter(|w| w.kind == WindowKind::Desktop)
            .collect();
        assert_eq!(desktops.len(), 9);
        assert!(desktops.iter().all(|w| w.texture == desktops[0].texture));
        assert!(desktops
            .iter()
            .any(|w| w.attrib == Quad::new(0, 0, 800, 600)));
        assert!(desktops
            .iter()
            .any(|w| w.attrib == Quad::new(1600, 1200, 800, 600)));

        /* desktops sit below the client window */
        assert_eq!(h.wm.core.stack.iter().last().unwrap().id, 5);

        /* re-tiling replaces, not accumulates */
        h.wm.core.set_background(Path::new("other.png"));
        let count = h
            .wm
            .core
            .stack
            .iter()
            .filter(|w| w.kind == WindowKind::Desktop)
            .count();
        assert_eq!(count, 9);
    }

    #[test]
    fn workspace_membership_follows_geometry() {
        let mut h = harness(100, 100);
        create_window(&mut h.wm, 5, Quad::new(10, 10, 20, 20));
        create_window(&mut h.wm, 6, Quad::new(150, 10, 20, 20));
        create_window(&mut h.wm, 7, Quad::new(90, 10, 20, 20));

        assert_eq!(h.wm.core.workspace_windows(0, 0), vec![5, 7]);
        assert_eq!(h.wm.core.workspace_windows(1, 0), vec![6, 7]);
        assert!(h.wm.core.workspace_windows(2, 0).is_empty());
    }

    #[test]
    fn removing_a_grabbed_key_ungrabs_it() {
        let mut h = harness(800, 600);
        let id = h.wm.core.add_key(
            KeyBinding {
                active: true,
                key: 42,
                mods: Mod1Mask,
                handler: Handler::Core,
                grabbed: false,
            },
            true,
        );
        assert!(h
            .display_log
            .borrow()
            .grabbed_keys
            .contains(&(42, Mod1Mask)));

        h.wm.core.remove_key(id);
        assert!(h
            .display_log
            .borrow()
            .ungrabbed_keys
            .contains(&(42, Mod1Mask)));
    }

    #[test]
    fn transient_link_is_recorded_for_non_root_parents() {
        let mut h = harness(800, 600);
        create_window(&mut h.wm, 5, Quad::new(0, 0, 100, 100));
        h.wm.handle_event(Event::Created {
            window: 6,
            parent: 5,
            geometry: Quad::new(10, 10, 50, 50),
        });

        assert_eq!(h.wm.core.stack.find(6).unwrap().transient_for, Some(5));
        assert_eq!(h.wm.core.stack.find(5).unwrap().transient_for, None);
    }
}
