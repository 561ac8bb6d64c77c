//! Interactive move and resize. Both follow the same shape: a grabbed
//! button press claims ownership and enables a per-frame hook that animates
//! the window through its transform; the release bakes the result into pixel
//! geometry and clears the transform again.

use crate::bindings::{BindingId, ButtonBinding, ButtonKind, Context, Handler, Hook};
use crate::display::{Event, XWindow, ANY_MODIFIER};
use crate::ownership::{Ownership, OwnershipArbiter};
use crate::plugins::Plugin;
use crate::transform;
use crate::wm::Core;
use glam::Mat4;
use x11::xlib::{Button1, ControlMask, Mod1Mask};

#[derive(Default)]
pub struct Move {
    win: Option<XWindow>,
    sx: i32,
    sy: i32,
    press: BindingId,
    release: BindingId,
    hook: BindingId,
}

impl Move {
    pub fn new() -> Self {
        Self::default()
    }

    fn initiate(&mut self, core: &mut Core, ctx: &Context) {
        let (x, y) = match ctx.event {
            Event::ButtonPress { x, y, .. } => (x, y),
            _ => return,
        };
        let win = match core.window_at(x, y) {
            Some(win) => win,
            None => return,
        };

        if !core.activate_owner("move") {
            return;
        }
        core.grab_owner("move");

        debug!("moving {:#x}", win);
        core.focus_window(win);
        self.win = Some(win);
        core.hold_window(win);

        core.bindings.set_button_active(self.release, true);
        core.enable_hook(self.hook);

        self.sx = x;
        self.sy = y;
        core.set_redraw_everything(true);
    }

    fn terminate(&mut self, core: &mut Core, ctx: &Context) {
        core.disable_hook(self.hook);
        core.bindings.set_button_active(self.release, false);
        core.deactivate_owner("move");

        let id = match self.win.take() {
            Some(id) => id,
            None => return,
        };

        let (ex, ey) = match ctx.event {
            Event::ButtonRelease { x, y, .. } => (x, y),
            _ => (core.mousex, core.mousey),
        };
        let dx = (ex - self.sx) * core.scale_x;
        let dy = (ey - self.sy) * core.scale_y;

        let baked = core.stack.find_mut(id).map(|win| {
            win.transform.translation = Mat4::IDENTITY;
            (win.attrib.x + dx, win.attrib.y + dy, win.destroyed())
        });

        if let Some((nx, ny, destroyed)) = baked {
            if !destroyed {
                core.move_window(id, nx, ny);
                core.focus_window(id);
            }
            core.damage_window(id);
        }

        core.set_redraw_everything(false);
        core.release_window(id);
        core.redraw = true;
    }

    fn intermediate(&mut self, core: &mut Core) {
        let id = match self.win {
            Some(id) => id,
            None => return,
        };

        let dx = ((core.mousex - self.sx) * core.scale_x) as f32;
        let dy = ((self.sy - core.mousey) * core.scale_y) as f32;
        let w2 = core.width as f32 / 2.0;
        let h2 = core.height as f32 / 2.0;

        if let Some(win) = core.stack.find_mut(id) {
            win.transform.translation = transform::translate(dx / w2, dy / h2, 0.0);
        }
        core.redraw = true;
    }
}

impl Plugin for Move {
    fn name(&self) -> &'static str {
        "move"
    }

    fn register_ownership(&self, owners: &mut OwnershipArbiter) {
        owners.register(Ownership::new("move").compat_all());
    }

    fn init(&mut self, core: &mut Core, handle: Handler) {
        self.hook = core.add_hook(Hook {
            active: false,
            handler: handle,
        });

        self.press = core.add_button(
            ButtonBinding {
                active: true,
                kind: ButtonKind::Press,
                button: Button1,
                mods: Mod1Mask,
                handler: handle,
                grabbed: false,
            },
            true,
        );

        self.release = core.add_button(
            ButtonBinding {
                active: false,
                kind: ButtonKind::Release,
                button: Button1,
                mods: ANY_MODIFIER,
                handler: handle,
                grabbed: false,
            },
            false,
        );
    }

    fn on_button(&mut self, core: &mut Core, id: BindingId, ctx: &Context) {
        if id == self.press {
            self.initiate(core, ctx);
        } else if id == self.release {
            self.terminate(core, ctx);
        }
    }

    fn on_hook(&mut self, core: &mut Core, _id: BindingId) {
        self.intermediate(core);
    }
}

#[derive(Default)]
pub struct Resize {
    win: Option<XWindow>,
    sx: i32,
    sy: i32,
    press: BindingId,
    release: BindingId,
    hook: BindingId,
}

impl Resize {
    pub fn new() -> Self {
        Self::default()
    }

    fn initiate(&mut self, core: &mut Core, ctx: &Context) {
        let (x, y) = match ctx.event {
            Event::ButtonPress { x, y, .. } => (x, y),
            _ => return,
        };
        let win = match core.window_at(x, y) {
            Some(win) => win,
            None => return,
        };

        if !core.activate_owner("resize") {
            return;
        }
        core.grab_owner("resize");

        debug!("resizing {:#x}", win);
        core.focus_window(win);
        self.win = Some(win);
        core.hold_window(win);

        core.bindings.set_button_active(self.release, true);
        core.enable_hook(self.hook);

        /* the scale factors divide by the current extents */
        if let Some(win) = core.stack.find_mut(win) {
            if win.attrib.w == 0 {
                win.attrib.w = 1;
            }
            if win.attrib.h == 0 {
                win.attrib.h = 1;
            }
        }

        self.sx = x;
        self.sy = y;
        core.set_redraw_everything(true);
    }

    fn terminate(&mut self, core: &mut Core, _ctx: &Context) {
        core.disable_hook(self.hook);
        core.bindings.set_button_active(self.release, false);

        let id = match self.win.take() {
            Some(id) => id,
            None => {
                core.deactivate_owner("resize");
                return;
            }
        };

        let dw = (core.mousex - self.sx) * core.scale_x;
        let dh = (core.mousey - self.sy) * core.scale_y;

        let baked = core.stack.find_mut(id).map(|win| {
            win.transform.scale = Mat4::IDENTITY;
            win.transform.translation = Mat4::IDENTITY;
            (win.attrib.w + dw, win.attrib.h + dh, win.destroyed())
        });

        if let Some((nw, nh, destroyed)) = baked {
            if !destroyed {
                core.resize_window(id, nw, nh);
                core.focus_window(id);
            }
            core.damage_window(id);
        }

        core.set_redraw_everything(false);
        core.release_window(id);
        core.deactivate_owner("resize");
        core.redraw = true;
    }

    fn intermediate(&mut self, core: &mut Core) {
        let id = match self.win {
            Some(id) => id,
            None => return,
        };

        let dw = (core.mousex - self.sx) * core.scale_x;
        let dh = (core.mousey - self.sy) * core.scale_y;
        let w2 = core.width as f32 / 2.0;
        let h2 = core.height as f32 / 2.0;

        if let Some(win) = core.stack.find_mut(id) {
            let kw = (win.attrib.w + dw) as f32 / win.attrib.w as f32;
            let kh = (win.attrib.h + dh) as f32 / win.attrib.h as f32;

            /* the scale is about screen center; shift the window back so its
             * top-left pixel stays put */
            let tlx = win.attrib.x as f32 - w2;
            let tly = h2 - win.attrib.y as f32;
            let ntlx = kw * tlx;
            let ntly = kh * tly;

            win.transform.translation =
                transform::translate((tlx - ntlx) / w2, (tly - ntly) / h2, 0.0);
            win.transform.scale = transform::scale(kw, kh, 1.0);
        }
        core.redraw = true;
    }
}

impl Plugin for Resize {
    fn name(&self) -> &'static str {
        "resize"
    }

    fn register_ownership(&self, owners: &mut OwnershipArbiter) {
        owners.register(Ownership::new("resize").compat_all());
    }

    fn init(&mut self, core: &mut Core, handle: Handler) {
        self.hook = core.add_hook(Hook {
            active: false,
            handler: handle,
        });

        self.press = core.add_button(
            ButtonBinding {
                active: true,
                kind: ButtonKind::Press,
                button: Button1,
                mods: ControlMask,
                handler: handle,
                grabbed: false,
            },
            true,
        );

        self.release = core.add_button(
            ButtonBinding {
                active: false,
                kind: ButtonKind::Release,
                button: Button1,
                mods: ANY_MODIFIER,
                handler: handle,
                grabbed: false,
            },
            false,
        );
    }

    fn on_button(&mut self, core: &mut Core, id: BindingId, ctx: &Context) {
        if id == self.press {
            self.initiate(core, ctx);
        } else if id == self.release {
            self.terminate(core, ctx);
        }
    }

    fn on_hook(&mut self, core: &mut Core, _id: BindingId) {
        self.intermediate(core);
    }
}
