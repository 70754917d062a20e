//! DocVault ingestion
//!
//! Turns an uploaded text file into indexed chunks:
//! 1. Validates the file name, format and size
//! 2. Normalizes whitespace and splits the text into overlapping windows
//! 3. Embeds each chunk (optional when the provider is down)
//! 4. Publishes a new tenant snapshot, then stores the raw file

pub mod chunker;
pub mod pipeline;
pub mod store;
pub mod validate;

pub use chunker::{chunk_text, TextChunk};
pub use pipeline::{BootstrapReport, IngestOutcome, IngestionPipeline};
pub use store::{DocumentStore, StagedDocument};
pub use validate::{validate_upload, ValidatedUpload};
