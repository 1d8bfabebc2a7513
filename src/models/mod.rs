//! Data models for consultation rooms

mod audio;
mod conversation;
mod message;
mod role;
mod summary;

pub use audio::*;
pub use conversation::*;
pub use message::*;
pub use role::*;
pub use summary::*;
