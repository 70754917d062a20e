//! DocVault answer synthesis
//!
//! Turns retrieved chunks into an answer constrained to them, or an
//! explicit no-answer.

pub mod synthesizer;

pub use synthesizer::{SynthesizedAnswer, Synthesizer};
