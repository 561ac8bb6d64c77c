//! Entry points of the Composite, Damage and Fixes extensions, which the
//! `x11` crate does not bind. Declarations follow the extension headers.
#![allow(non_snake_case, dead_code)]

use libc::{c_int, c_ulong};
use x11::xlib::{Bool, Display, Drawable, Time, Window, XRectangle, XID};

pub type XserverRegion = XID;
pub type Damage = XID;

pub const COMPOSITE_REDIRECT_AUTOMATIC: c_int = 0;
pub const COMPOSITE_REDIRECT_MANUAL: c_int = 1;

pub const SHAPE_BOUNDING: c_int = 0;
pub const SHAPE_CLIP: c_int = 1;
pub const SHAPE_INPUT: c_int = 2;

/* Event offset within the damage extension's event range. */
pub const X_DAMAGE_NOTIFY: c_int = 0;

pub const DAMAGE_REPORT_RAW_RECTANGLES: c_int = 0;
pub const DAMAGE_REPORT_DELTA_RECTANGLES: c_int = 1;
pub const DAMAGE_REPORT_BOUNDING_BOX: c_int = 2;
pub const DAMAGE_REPORT_NON_EMPTY: c_int = 3;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct XDamageNotifyEvent {
    pub type_: c_int,
    pub serial: c_ulong,
    pub send_event: Bool,
    pub display: *mut Display,
    pub drawable: Drawable,
    pub damage: Damage,
    pub level: c_int,
    pub more: Bool,
    pub timestamp: Time,
    pub area: XRectangle,
    pub geometry: XRectangle,
}

#[link(name = "Xcomposite")]
extern "C" {
    pub fn XCompositeQueryExtension(
        dpy: *mut Display,
        event_base: *mut c_int,
        error_base: *mut c_int,
    ) -> Bool;
    pub fn XCompositeRedirectSubwindows(dpy: *mut Display, window: Window, update: c_int);
    pub fn XCompositeUnredirectSubwindows(dpy: *mut Display, window: Window, update: c_int);
    pub fn XCompositeGetOverlayWindow(dpy: *mut Display, window: Window) -> Window;
    pub fn XCompositeReleaseOverlayWindow(dpy: *mut Display, window: Window);
}

#[link(name = "Xdamage")]
extern "C" {
    pub fn XDamageQueryExtension(
        dpy: *mut Display,
        event_base: *mut c_int,
        error_base: *mut c_int,
    ) -> Bool;
    pub fn XDamageCreate(dpy: *mut Display, drawable: Drawable, level: c_int) -> Damage;
    pub fn XDamageDestroy(dpy: *mut Display, damage: Damage);
    pub fn XDamageSubtract(
        dpy: *mut Display,
        damage: Damage,
        repair: XserverRegion,
        parts: XserverRegion,
    );
}

#[link(name = "Xfixes")]
extern "C" {
    pub fn XFixesCreateRegion(
        dpy: *mut Display,
        rectangles: *mut XRectangle,
        nrectangles: c_int,
    ) -> XserverRegion;
    pub fn XFixesDestroyRegion(dpy: *mut Display, region: XserverRegion);
    pub fn XFixesSetWindowShapeRegion(
        dpy: *mut Display,
        win: Window,
        shape_kind: c_int,
        x_off: c_int,
        y_off: c_int,
        region: XserverRegion,
    );
}
