//! Game state reduction.

pub mod reducer;

pub use reducer::{apply, Change, Reduction};
