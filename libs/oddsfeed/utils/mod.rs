//! Shared helpers

pub mod ticker;

pub use ticker::spawn_ticker;
