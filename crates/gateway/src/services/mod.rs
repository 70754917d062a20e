//! Request orchestration behind the HTTP handlers

pub mod qa;

pub use qa::{QaAnswer, QaService, Source};
