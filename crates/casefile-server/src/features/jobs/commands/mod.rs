//! Job commands

pub mod enqueue;

pub use enqueue::EnqueueJobCommand;
