// src/writer/mod.rs
pub mod channel_writer;
pub mod gap_index;
pub mod rotation;

pub use channel_writer::{ChannelWriter, WriteCursor, DATA_DATASET, INDEX_DATASET};
pub use gap_index::{GapIndexBuilder, IndexRow, IndexWindow, Run, RunTable};
pub use rotation::{FileCreated, ProgressFn, RotationPolicy};
