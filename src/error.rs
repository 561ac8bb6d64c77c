use std::io;
use thiserror::Error;

/// Fatal initialization failures. Anything past `Core::init` is handled in
/// place (norender marks, logged X errors) and never unwinds.
#[derive(Debug, Error)]
pub enum WmError {
    #[error("could not open display")]
    DisplayOpen,

    #[error("another window manager is already running")]
    AnotherManagerPresent,

    #[error("display is missing a required extension: {0}")]
    MissingExtension(&'static str),

    #[error("could not create a GL context on the overlay")]
    GlContext,

    #[error("shader compilation failed: {0}")]
    Shader(String),

    #[error("could not read configuration: {0}")]
    ConfigRead(#[from] io::Error),

    #[error("could not parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("could not load image {path}: {reason}")]
    BadImage { path: String, reason: String },
}
