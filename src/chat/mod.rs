//! Doctor/patient room protocol
//!
//! - [`negotiation`]: which language to translate into
//! - [`room`]: sending text and audio messages into a room
//! - [`search`]: client-side message log and search
//! - [`report`]: consultation summary

pub mod negotiation;
pub mod report;
pub mod room;
pub mod search;

pub use report::render_report;
pub use room::{ChatRoom, Notice, RoomOptions, RoomServices};
pub use search::{highlight, snippet, MessageLog};
