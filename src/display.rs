use crate::error::WmError;
use crate::ffi;
use crate::window::Quad;
use libc::{c_char, c_int, c_uchar, c_uint, c_ulong, poll, pollfd, POLLIN};
use std::ffi::CStr;
use std::sync::Mutex;
use std::time::Duration;
use x11::xlib;

pub type XWindow = xlib::Window;

/// X's "match any modifier state" constant, honoured as a wildcard by the
/// button-press matcher.
pub const ANY_MODIFIER: u32 = 1 << 15;

lazy_static! {
    /// Guards global error state required by Xlib error handler registration;
    /// the handlers are context-free C callbacks and cannot reach the manager.
    static ref WM_DETECTED: Mutex<bool> = Mutex::new(false);
    /// Window ids that drew a BadMatch/BadDrawable/BadWindow; drained by the
    /// event loop, which marks them norender instead of crashing.
    static ref RENDER_FAILURES: Mutex<Vec<XWindow>> = Mutex::new(Vec::new());
}

/// A display event translated out of the raw union, carrying only the fields
/// the core dispatches on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Expose,
    KeyPress { key: u32, mods: u32 },
    KeyRelease { key: u32, mods: u32 },
    ButtonPress { button: u32, mods: u32, x: i32, y: i32, window: XWindow, time: u64 },
    ButtonRelease { button: u32, mods: u32, x: i32, y: i32, window: XWindow, time: u64 },
    Motion { x: i32, y: i32 },
    Created { window: XWindow, parent: XWindow, geometry: Quad },
    Destroyed { window: XWindow },
    Mapped { window: XWindow },
    Unmapped { window: XWindow },
    Property { window: XWindow },
    FocusChange { window: XWindow },
    Crossing { window: XWindow, enter: bool },
    Damaged { window: XWindow },
}

/// Connection to the display server: event fetch, grabs, window introspection
/// and the bounded wait the frame pacer suspends on. The Xlib implementation
/// lives below; tests drive the core through a queue-backed fake.
pub trait DisplayServer {
    fn screen_size(&self) -> (i32, i32);
    fn root(&self) -> XWindow;
    fn overlay(&self) -> XWindow;
    fn alive(&self) -> bool;

    fn pending(&mut self) -> usize;
    fn next_event(&mut self) -> Option<Event>;
    /// Block on the connection fd for at most `timeout`. Returns whether the
    /// fd became readable before the timeout elapsed.
    fn wait(&mut self, timeout: Duration) -> bool;

    fn grab_key(&mut self, key: u32, mods: u32);
    fn ungrab_key(&mut self, key: u32, mods: u32);
    fn grab_button(&mut self, button: u32, mods: u32);
    fn ungrab_button(&mut self, button: u32, mods: u32);
    fn grab_pointer(&mut self);
    fn ungrab_pointer(&mut self);

    fn map_window(&mut self, id: XWindow);
    fn move_window(&mut self, id: XWindow, x: i32, y: i32);
    fn resize_window(&mut self, id: XWindow, w: i32, h: i32);
    fn get_geometry(&self, id: XWindow) -> Option<Quad>;
    /// Subscribe to content-change notifications for a window.
    fn track_damage(&mut self, id: XWindow);

    fn keycode(&self, keysym: u32) -> u32;
    /// Replay the pointer so unclaimed clicks continue to the client.
    fn allow_replay(&mut self, time: u64);
    fn sync(&mut self);

    /// Window ids the error handler flagged since the last call.
    fn take_render_failures(&mut self) -> Vec<XWindow>;
}

/// Xlib-backed display connection. Owns the root and the composite overlay;
/// installing it redirects all subwindows of the root into offscreen storage.
pub struct XDisplay {
    display: *mut xlib::Display,
    root: XWindow,
    overlay: XWindow,
    fd: c_int,
    damage_base: c_int,
    width: i32,
    height: i32,
}

impl XDisplay {
    /// Opens the display, takes over compositing redirection and acquires the
    /// overlay. Refutable: another client may already hold substructure
    /// redirection on the root, which surfaces as BadAccess.
    pub fn open() -> Result<Self, WmError> {
        let display = unsafe { xlib::XOpenDisplay(std::ptr::null()) };
        if display.is_null() {
            return Err(WmError::DisplayOpen);
        }

        let root = unsafe { xlib::XDefaultRootWindow(display) };

        let (width, height) = unsafe {
            let mut attrs: xlib::XWindowAttributes = std::mem::zeroed();
            xlib::XGetWindowAttributes(display, root, &mut attrs);
            (attrs.width, attrs.height)
        };

        unsafe {
            xlib::XSetErrorHandler(Some(Self::on_wm_detected));
            xlib::XSetIOErrorHandler(Some(Self::on_connection_lost));

            let mut event_base = 0;
            let mut error_base = 0;
            if ffi::XCompositeQueryExtension(display, &mut event_base, &mut error_base) == 0 {
                return Err(WmError::MissingExtension("composite"));
            }

            ffi::XCompositeRedirectSubwindows(display, root, ffi::COMPOSITE_REDIRECT_MANUAL);
            xlib::XSelectInput(
                display,
                root,
                xlib::SubstructureRedirectMask
                    | xlib::SubstructureNotifyMask
                    | xlib::StructureNotifyMask
                    | xlib::PropertyChangeMask
                    | xlib::LeaveWindowMask
                    | xlib::EnterWindowMask
                    | xlib::KeyPressMask
                    | xlib::KeyReleaseMask
                    | xlib::ButtonPressMask
                    | xlib::ButtonReleaseMask
                    | xlib::FocusChangeMask
                    | xlib::ExposureMask
                    | xlib::Button1MotionMask,
            );
            xlib::XSync(display, xlib::False);
        }

        if *WM_DETECTED.lock().unwrap() {
            unsafe { xlib::XCloseDisplay(display) };
            return Err(WmError::AnotherManagerPresent);
        }

        let mut damage_base = 0;
        let overlay = unsafe {
            let mut error_base = 0;
            if ffi::XDamageQueryExtension(display, &mut damage_base, &mut error_base) == 0 {
                return Err(WmError::MissingExtension("damage"));
            }

            xlib::XSetErrorHandler(Some(Self::on_x_error));
            let overlay = ffi::XCompositeGetOverlayWindow(display, root);

            /* The overlay must be click-through: full bounding shape, empty
             * input shape, so events fall to the windows beneath it. */
            let region = ffi::XFixesCreateRegion(display, std::ptr::null_mut(), 0);
            ffi::XFixesSetWindowShapeRegion(display, overlay, ffi::SHAPE_BOUNDING, 0, 0, 0);
            ffi::XFixesSetWindowShapeRegion(display, overlay, ffi::SHAPE_INPUT, 0, 0, region);
            ffi::XFixesDestroyRegion(display, region);
            overlay
        };

        let fd = unsafe { xlib::XConnectionNumber(display) };

        debug!(
            "display open: root {:#x} overlay {:#x} {}x{}",
            root, overlay, width, height
        );

        Ok(XDisplay {
            display,
            root,
            overlay,
            fd,
            damage_base,
            width,
            height,
        })
    }

    pub fn raw(&self) -> *mut xlib::Display {
        self.display
    }

    #[allow(non_upper_case_globals)]
    fn translate(&self, event: &xlib::XEvent) -> Option<Event> {
        /* Safe because the type tag dictates well-defined union member access */
        unsafe {
            match event.get_type() {
                xlib::Expose => Some(Event::Expose),
                xlib::KeyPress => {
                    let ev = event.key;
                    Some(Event::KeyPress {
                        key: ev.keycode,
                        mods: ev.state,
                    })
                }
                xlib::KeyRelease => {
                    let ev = event.key;
                    Some(Event::KeyRelease {
                        key: ev.keycode,
                        mods: ev.state,
                    })
                }
                xlib::ButtonPress => {
                    let ev = event.button;
                    Some(Event::ButtonPress {
                        button: ev.button,
                        mods: ev.state,
                        x: ev.x_root,
                        y: ev.y_root,
                        window: ev.window,
                        time: ev.time,
                    })
                }
                xlib::ButtonRelease => {
                    let ev = event.button;
                    Some(Event::ButtonRelease {
                        button: ev.button,
                        mods: ev.state,
                        x: ev.x_root,
                        y: ev.y_root,
                        window: ev.window,
                        time: ev.time,
                    })
                }
                xlib::MotionNotify => {
                    let ev = event.motion;
                    Some(Event::Motion {
                        x: ev.x_root,
                        y: ev.y_root,
                    })
                }
                xlib::CreateNotify => {
                    let ev = event.create_window;
                    Some(Event::Created {
                        window: ev.window,
                        parent: ev.parent,
                        geometry: Quad::new(ev.x, ev.y, ev.width, ev.height),
                    })
                }
                xlib::DestroyNotify => Some(Event::Destroyed {
                    window: event.destroy_window.window,
                }),
                xlib::MapNotify => Some(Event::Mapped {
                    window: event.map.window,
                }),
                xlib::UnmapNotify => Some(Event::Unmapped {
                    window: event.unmap.window,
                }),
                xlib::PropertyNotify => Some(Event::Property {
                    window: event.property.window,
                }),
                xlib::FocusIn | xlib::FocusOut => Some(Event::FocusChange {
                    window: event.focus_change.window,
                }),
                xlib::EnterNotify | xlib::LeaveNotify => Some(Event::Crossing {
                    window: event.crossing.window,
                    enter: event.get_type() == xlib::EnterNotify,
                }),
                typ if typ == self.damage_base + ffi::X_DAMAGE_NOTIFY => {
                    let ev = &*(event as *const xlib::XEvent as *const ffi::XDamageNotifyEvent);
                    Some(Event::Damaged {
                        window: ev.drawable,
                    })
                }
                typ => {
                    trace!("unhandled event type {}", typ);
                    None
                }
            }
        }
    }

    /// Installed while claiming substructure redirection: the only error the
    /// request can produce is BadAccess from a second manager.
    unsafe extern "C" fn on_wm_detected(
        _display: *mut xlib::Display,
        event: *mut xlib::XErrorEvent,
    ) -> c_int {
        if (*event).error_code == xlib::BadAccess {
            *WM_DETECTED.lock().unwrap() = true;
        }
        0 /* This is ignored */
    }

    /// Steady-state error handler. Window-scoped errors disable drawing for
    /// the offending window; everything else is logged and dropped.
    unsafe extern "C" fn on_x_error(
        display: *mut xlib::Display,
        event: *mut xlib::XErrorEvent,
    ) -> c_int {
        let code = (*event).error_code;
        if code == xlib::BadMatch || code == xlib::BadDrawable || code == xlib::BadWindow {
            warn!(
                "caught {}; disabling drawing for {:#x}",
                err_code_pretty(code),
                (*event).resourceid
            );
            RENDER_FAILURES.lock().unwrap().push((*event).resourceid);
            return 0;
        }

        let mut buf = [0 as c_char; 512];
        xlib::XGetErrorText(display, code as c_int, buf.as_mut_ptr(), buf.len() as c_int);
        error!(
            "XError {} ({}): {}",
            code,
            err_code_pretty(code),
            CStr::from_ptr(buf.as_ptr()).to_string_lossy()
        );
        0
    }

    unsafe extern "C" fn on_connection_lost(_display: *mut xlib::Display) -> c_int {
        /* Xlib exits the process if this returns; make the death orderly. */
        error!("display connection lost");
        std::process::exit(1);
    }
}

impl DisplayServer for XDisplay {
    fn screen_size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn root(&self) -> XWindow {
        self.root
    }

    fn overlay(&self) -> XWindow {
        self.overlay
    }

    fn alive(&self) -> bool {
        true
    }

    fn pending(&mut self) -> usize {
        unsafe { xlib::XPending(self.display) as usize }
    }

    fn next_event(&mut self) -> Option<Event> {
        while self.pending() > 0 {
            let mut event: xlib::XEvent = unsafe { std::mem::zeroed() };
            unsafe { xlib::XNextEvent(self.display, &mut event) };
            if let Some(translated) = self.translate(&event) {
                return Some(translated);
            }
        }
        None
    }

    fn wait(&mut self, timeout: Duration) -> bool {
        let mut fd = pollfd {
            fd: self.fd,
            events: POLLIN,
            revents: 0,
        };
        let millis = ((timeout.as_micros() + 999) / 1000) as c_int;
        let n = unsafe { poll(&mut fd, 1, millis) };
        n > 0 && (fd.revents & POLLIN) != 0
    }

    fn grab_key(&mut self, key: u32, mods: u32) {
        unsafe {
            xlib::XGrabKey(
                self.display,
                key as c_int,
                mods as c_uint,
                self.root,
                xlib::False,
                xlib::GrabModeAsync,
                xlib::GrabModeAsync,
            );
        }
    }

    fn ungrab_key(&mut self, key: u32, mods: u32) {
        unsafe {
            xlib::XUngrabKey(self.display, key as c_int, mods as c_uint, self.root);
        }
    }

    fn grab_button(&mut self, button: u32, mods: u32) {
        unsafe {
            xlib::XGrabButton(
                self.display,
                button as c_uint,
                mods as c_uint,
                self.root,
                xlib::False,
                xlib::ButtonPressMask as c_uint,
                xlib::GrabModeAsync,
                xlib::GrabModeAsync,
                0,
                0,
            );
        }
    }

    fn ungrab_button(&mut self, button: u32, mods: u32) {
        unsafe {
            xlib::XUngrabButton(self.display, button as c_uint, mods as c_uint, self.root);
        }
    }

    fn grab_pointer(&mut self) {
        unsafe {
            xlib::XGrabPointer(
                self.display,
                self.overlay,
                xlib::True,
                (xlib::ButtonPressMask | xlib::ButtonReleaseMask | xlib::PointerMotionMask)
                    as c_uint,
                xlib::GrabModeAsync,
                xlib::GrabModeAsync,
                self.root,
                0,
                xlib::CurrentTime,
            );
        }
    }

    fn ungrab_pointer(&mut self) {
        unsafe {
            xlib::XUngrabPointer(self.display, xlib::CurrentTime);
        }
    }

    fn map_window(&mut self, id: XWindow) {
        unsafe {
            xlib::XMapWindow(self.display, id);
        }
    }

    fn move_window(&mut self, id: XWindow, x: i32, y: i32) {
        unsafe {
            xlib::XMoveWindow(self.display, id, x, y);
        }
    }

    fn resize_window(&mut self, id: XWindow, w: i32, h: i32) {
        unsafe {
            xlib::XResizeWindow(self.display, id, w.max(1) as c_uint, h.max(1) as c_uint);
        }
    }

    fn get_geometry(&self, id: XWindow) -> Option<Quad> {
        unsafe {
            let mut attrs: xlib::XWindowAttributes = std::mem::zeroed();
            if xlib::XGetWindowAttributes(self.display, id, &mut attrs) == 0 {
                return None;
            }
            Some(Quad::new(attrs.x, attrs.y, attrs.width, attrs.height))
        }
    }

    fn track_damage(&mut self, id: XWindow) {
        unsafe {
            ffi::XDamageCreate(self.display, id, ffi::DAMAGE_REPORT_NON_EMPTY);
        }
    }

    fn keycode(&self, keysym: u32) -> u32 {
        unsafe { xlib::XKeysymToKeycode(self.display, keysym as c_ulong) as u32 }
    }

    fn allow_replay(&mut self, time: u64) {
        unsafe {
            xlib::XAllowEvents(self.display, xlib::ReplayPointer, time as xlib::Time);
        }
    }

    fn sync(&mut self) {
        unsafe {
            xlib::XSync(self.display, xlib::False);
        }
    }

    fn take_render_failures(&mut self) -> Vec<XWindow> {
        std::mem::take(&mut *RENDER_FAILURES.lock().unwrap())
    }
}

impl Drop for XDisplay {
    /// Release the overlay and close the connection on any well-defined exit.
    fn drop(&mut self) {
        unsafe {
            ffi::XCompositeReleaseOverlayWindow(self.display, self.overlay);
            xlib::XCloseDisplay(self.display);
            info!("closed display OK");
        }
    }
}

fn err_code_pretty(code: c_uchar) -> &'static str {
    match code {
        0 => "Success",
        1 => "BadRequest",
        2 => "BadValue",
        3 => "BadWindow",
        4 => "BadPixmap",
        5 => "BadAtom",
        6 => "BadCursor",
        7 => "BadFont",
        8 => "BadMatch",
        9 => "BadDrawable",
        10 => "BadAccess",
        11 => "BadAlloc",
        12 => "BadColor",
        13 => "BadGC",
        14 => "BadIDChoice",
        15 => "BadName",
        16 => "BadLength",
        17 => "BadImplementation",
        128 => "FirstExtensionError",
        255 => "LastExtensionError",
        _ => "Unknown error code",
    }
}
