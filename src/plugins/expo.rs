//! The zoomed-out overview: composites the whole workspace grid into the
//! screen at once. While active, the stack's hit-test is rerouted through a
//! coordinate remap so clicks land on the window they appear to hit, and the
//! input scale converts pixel motion into virtual-grid units for the other
//! plugins.

use crate::bindings::{BindingId, Context, Handler, KeyBinding};
use crate::ownership::{Ownership, OwnershipArbiter};
use crate::plugins::Plugin;
use crate::stack::{HitTestFn, WindowStack};
use crate::transform;
use crate::window::Quad;
use crate::wm::Core;
use glam::Mat4;
use std::rc::Rc;
use x11::keysym::XK_e;
use x11::xlib::Mod4Mask;

#[derive(Default)]
pub struct Expo {
    active: bool,
    toggle: BindingId,
    saved: Option<HitTestFn>,
}

impl Expo {
    pub fn new() -> Self {
        Self::default()
    }

    fn activate(&mut self, core: &mut Core) {
        if !core.activate_owner("expo") {
            return;
        }
        self.active = true;

        /* reroute hit-testing through the grid remap, keeping the previous
         * function to delegate to and to restore on exit */
        let saved = core.stack.hit_test();
        self.saved = Some(Rc::clone(&saved));

        let (vw, vh) = (core.vwidth, core.vheight);
        let (vx, vy) = (core.vx, core.vy);
        let (sw, sh) = (core.width, core.height);

        core.stack.set_hit_test(Rc::new(move |stack: &WindowStack, x: i32, y: i32| {
            let cell_w = sw / vw;
            let cell_h = sh / vh;
            let cx = x.div_euclid(cell_w);
            let cy = y.div_euclid(cell_h);
            let ox = x.rem_euclid(cell_w);
            let oy = y.rem_euclid(cell_h);

            let realx = (cx - vx) * sw + ox * vw;
            let realy = (cy - vy) * sh + oy * vh;
            saved(stack, realx, realy)
        }));

        let midx = vw / 2;
        let midy = vh / 2;
        let offx = (vx - midx) as f32 * 2.0 / vw as f32;
        let offy = (midy - vy) as f32 * 2.0 / vh as f32;

        core.globals.translation =
            core.globals.translation * transform::translate(offx, offy, 0.0);
        core.globals.scale =
            core.globals.scale * transform::scale(1.0 / vw as f32, 1.0 / vh as f32, 1.0);

        /* pixel deltas from here on are in virtual-grid units */
        core.scale_x = vw;
        core.scale_y = vh;

        core.output = Quad::new(-vx * sw, -vy * sh, vw * sw, vh * sh);
        core.redraw = true;
    }

    fn deactivate(&mut self, core: &mut Core) {
        self.active = false;

        core.globals.translation = Mat4::IDENTITY;
        core.globals.scale = Mat4::IDENTITY;
        core.scale_x = 1;
        core.scale_y = 1;
        core.output = Quad::from_size(core.width, core.height);

        if let Some(saved) = self.saved.take() {
            core.stack.set_hit_test(saved);
        }

        core.deactivate_owner("expo");
        core.redraw = true;
    }
}

impl Plugin for Expo {
    fn name(&self) -> &'static str {
        "expo"
    }

    fn register_ownership(&self, owners: &mut OwnershipArbiter) {
        /* compatible with nothing: peers must opt in to run during expo */
        owners.register(Ownership::new("expo"));
    }

    fn init(&mut self, core: &mut Core, handle: Handler) {
        let toggle_key = core.display.keycode(XK_e);
        self.toggle = core.add_key(
            KeyBinding {
                active: true,
                key: toggle_key,
                mods: Mod4Mask,
                handler: handle,
                grabbed: false,
            },
            true,
        );
    }

    fn on_key(&mut self, core: &mut Core, id: BindingId, _ctx: &Context) {
        if id != self.toggle {
            return;
        }
        if self.active {
            self.deactivate(core);
        } else {
            self.activate(core);
        }
    }
}
