//! Animated workspace switching. Direction presses queue up in a FIFO; each
//! queued direction plays out as a fixed-length segment that slides the
//! whole window plane through the global translation, then commits the move
//! by translating every window's pixel geometry one screen over.

use crate::bindings::{BindingId, Context, Handler, Hook, KeyBinding};
use crate::config::Config;
use crate::display::Event;
use crate::plugins::{OptionRegistry, OptionValue, Plugin};
use crate::transform;
use crate::window::Quad;
use crate::wm::Core;
use glam::Mat4;
use std::collections::VecDeque;
use x11::keysym::{XK_h, XK_j, XK_k, XK_l};
use x11::xlib::{ControlMask, Mod1Mask};

const DEFAULT_STEPS: i64 = 60;

pub struct WorkspaceSwitch {
    keys: [BindingId; 4],
    keycodes: [u32; 4],
    hook: BindingId,
    dirs: VecDeque<(i32, i32)>,

    /* current segment */
    nx: i32,
    ny: i32,
    dx: i32,
    dy: i32,
    dirx: i32,
    diry: i32,
    step: u32,

    max_step: u32,
    options: OptionRegistry,
}

impl WorkspaceSwitch {
    pub fn new() -> Self {
        let mut options = OptionRegistry::new();
        options.declare("steps", OptionValue::Int(DEFAULT_STEPS));

        WorkspaceSwitch {
            keys: [0; 4],
            keycodes: [0; 4],
            hook: 0,
            dirs: VecDeque::new(),
            nx: 0,
            ny: 0,
            dx: 0,
            dy: 0,
            dirx: 0,
            diry: 0,
            step: 0,
            max_step: DEFAULT_STEPS as u32,
            options,
        }
    }

    /// Queues a direction; starts a segment at once when idle.
    pub fn move_workspace(&mut self, core: &mut Core, dir: (i32, i32)) {
        self.dirs.push_back(dir);
        if !core.bindings.hook_active(self.hook) {
            core.enable_hook(self.hook);
            self.begin(core);
        }
    }

    fn begin(&mut self, core: &mut Core) {
        let (ddx, ddy) = match self.dirs.pop_front() {
            Some(dir) => dir,
            None => return,
        };

        /* the grid is a torus */
        self.nx = (core.vx - ddx).rem_euclid(core.vwidth);
        self.ny = (core.vy - ddy).rem_euclid(core.vheight);
        self.dirx = ddx;
        self.diry = ddy;
        self.dx = (core.vx - self.nx) * core.width;
        self.dy = (core.vy - self.ny) * core.height;

        /* both the outgoing and the incoming screen are on display while the
         * slide runs */
        let from = Quad::from_size(core.width, core.height);
        let to = Quad::new(-self.dx, -self.dy, core.width, core.height);
        core.output = from.union(&to);

        self.step = 0;
        trace!("workspace segment -> ({}, {})", self.nx, self.ny);
    }

    fn tick(&mut self, core: &mut Core) {
        if self.step == self.max_step {
            core.globals.translation = Mat4::IDENTITY;
            core.switch_workspace(self.nx, self.ny);
            core.output = Quad::from_size(core.width, core.height);
            core.redraw = true;

            if self.dirs.is_empty() {
                core.disable_hook(self.hook);
            } else {
                self.begin(core);
            }
            return;
        }

        let progress = self.step as f32 / self.max_step as f32;
        self.step += 1;

        let mut offx = 2.0 * progress * self.dx as f32 / core.width as f32;
        let mut offy = -2.0 * progress * self.dy as f32 / core.height as f32;
        if self.dirx == 0 {
            offx = 0.0;
        }
        if self.diry == 0 {
            offy = 0.0;
        }

        core.globals.translation = transform::translate(offx, offy, 0.0);
        core.redraw = true;
    }
}

impl Plugin for WorkspaceSwitch {
    fn name(&self) -> &'static str {
        "workspace"
    }

    fn init(&mut self, core: &mut Core, handle: Handler) {
        self.keycodes = [
            core.display.keycode(XK_h),
            core.display.keycode(XK_l),
            core.display.keycode(XK_j),
            core.display.keycode(XK_k),
        ];

        for (i, key) in self.keycodes.iter().enumerate() {
            self.keys[i] = core.add_key(
                KeyBinding {
                    active: true,
                    key: *key,
                    mods: ControlMask | Mod1Mask,
                    handler: handle,
                    grabbed: false,
                },
                true,
            );
        }

        self.hook = core.add_hook(Hook {
            active: false,
            handler: handle,
        });
    }

    fn configure(&mut self, config: &Config) {
        self.options.load(config.plugin_table(self.name()));
        self.max_step = self.options.int("steps").max(1) as u32;
    }

    fn on_key(&mut self, core: &mut Core, _id: BindingId, ctx: &Context) {
        let key = match ctx.event {
            Event::KeyPress { key, .. } => key,
            _ => return,
        };

        if key == self.keycodes[0] {
            self.move_workspace(core, (1, 0));
        } else if key == self.keycodes[1] {
            self.move_workspace(core, (-1, 0));
        } else if key == self.keycodes[2] {
            self.move_workspace(core, (0, -1));
        } else if key == self.keycodes[3] {
            self.move_workspace(core, (0, 1));
        }
    }

    fn on_hook(&mut self, core: &mut Core, _id: BindingId) {
        self.tick(core);
    }
}
