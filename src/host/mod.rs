//! The default host engine, which terminates every handler chain.

pub use ops::{Heap, Stack};
pub use platform::*;

mod ops;
mod platform;
