//! Conversation memory shared between the foreground loop and the
//! scheduler's executor path.

pub mod archive;
pub mod shared;

pub use archive::MemoryArchive;
pub use shared::{SharedMemory, Summarizer};
