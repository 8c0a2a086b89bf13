//! Command implementations

pub mod dump;

pub use dump::*;
