//! Interfaces to the game window collaborators: frame capture, key
//! injection and process pause control. Real backends (X11, etc.) live
//! outside this crate; here are the traits the pipeline consumes and the
//! async key dispatcher that decouples delivery from the frame loop.

mod dispatch;

use std::fmt;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use dispatch::{KeyDispatcher, PressHandle, DEFAULT_QUEUE, FOCUS_SETTLE};

/// The game's input vocabulary, named by function. `name()` yields the
/// physical key the injection backend should synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Confirm,
    Cancel,
    Up,
    Down,
    Left,
    Right,
    Menu,
}

impl Key {
    pub fn name(self) -> &'static str {
        match self {
            Key::Confirm => "z",
            Key::Cancel => "x",
            Key::Up => "up",
            Key::Down => "down",
            Key::Left => "left",
            Key::Right => "right",
            Key::Menu => "enter",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("target window is gone")]
    WindowGone,
    #[error("capture backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("key queue is full")]
    QueueFull,
    #[error("key dispatcher is gone")]
    DispatcherGone,
    #[error("window refused input: {0}")]
    Window(String),
}

/// Produces frames of the target window at its negotiated size.
pub trait FrameSource {
    fn capture(&mut self) -> Result<RgbaImage, CaptureError>;
}

/// Whether the target process was last paused or left running. Tracked so
/// pause/resume stay idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Paused,
    Playing,
}

/// Full control surface of the target window, implemented by the platform
/// backend. Everything here is synchronous; the dispatcher owns the
/// instance and serializes access from its worker task.
pub trait GameWindow: Send {
    fn is_focused(&self) -> Result<bool, InputError>;
    fn focus(&mut self) -> Result<(), InputError>;
    /// Deliver a key press to whatever window currently has focus.
    fn press_now(&mut self, key: Key) -> Result<(), InputError>;
    fn pause_process(&mut self) -> Result<(), InputError>;
    fn resume_process(&mut self) -> Result<(), InputError>;
}

/// The capability handed to decision code: request a key press or a
/// pause/resume, without blocking on delivery.
pub trait InputSink {
    fn press(&self, key: Key) -> Result<(), InputError>;
    fn pause(&self) -> Result<(), InputError>;
    fn resume(&self) -> Result<(), InputError>;
}
