//! Captured frames and the CPU-side color reductions

mod extractor;
pub use extractor::*;

mod frame;
pub use frame::*;

mod histogram;
pub use histogram::*;
