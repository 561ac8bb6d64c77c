#![allow(dead_code)]
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate bitflags;

mod bindings;
mod config;
mod display;
mod error;
mod ffi;
mod ownership;
mod plugins;
mod render;
mod stack;
mod transform;
mod window;
mod wm;

use config::Config;
use display::XDisplay;
use env_logger::WriteStyle::Auto;
use error::WmError;
use render::GlRenderer;
use std::path::PathBuf;
use wm::Ember;

fn main() {
    env_logger::builder()
        .format_timestamp(None)
        .write_style(Auto)
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref());

    if let Err(err) = run(config) {
        error!("{}", err);
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), WmError> {
    let display = XDisplay::open()?;
    let renderer = GlRenderer::new(&display)?;
    info!("starting display server OK");

    let mut manager = Ember::new(Box::new(display), Box::new(renderer), config);
    manager.run();

    info!("finish OK");
    Ok(())
}
