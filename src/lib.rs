//! playbot: plays a side-scrolling/turn-based game by watching frames of
//! its window. Each frame is segmented into blobs (by an external backend),
//! classified into entities, matched against a phase book, and answered
//! with key presses through an input sink.
//!
//! The host loop owns a [`Session`] and feeds it one frame at a time; see
//! the member crates for the individual stages.

mod session;

pub use session::{FrameSummary, Session};

pub use playbot_ai as ai;
pub use playbot_data as data;
pub use playbot_vision as vision;
pub use playbot_window as window;
