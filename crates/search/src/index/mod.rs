//! Per-tenant indexes
//!
//! - `lexical`: TF-IDF over unigrams and bigrams
//! - `semantic`: dense vectors from the embedding provider
//! - `snapshot`: the immutable pair of both, and its atomic publication

mod lexical;
mod semantic;
mod snapshot;

pub use lexical::LexicalIndex;
pub use semantic::SemanticIndex;
pub use snapshot::{IndexCatalog, IndexSnapshot, TenantIndex};
