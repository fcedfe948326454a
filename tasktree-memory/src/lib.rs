//! tasktree memory - the command knowledge store.
//!
//! This crate persists discovered commands together with their AI summaries
//! and embeddings, and answers tag and similarity queries over them:
//! - SQLite schema with cascading tag associations
//! - Little-endian `f32` blob codec for embeddings
//! - Cosine-similarity ranking over an exhaustive scan
//! - Import from the older JSON stores
//!
//! ## Architecture
//!
//! ```text
//! register_command ─┐
//! upsert_summary ───┼──→ commands ←───┐
//! update_embedding ─┤                 ├── command_tags (display_order)
//! clear_embedding ──┘                 │
//! add_tag_to_command ──→ tags ←───────┘
//!
//! query vector → semantic_search → rank_by_similarity → ScoredCommand
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod embeddings;
pub mod identity;
pub mod legacy;
pub mod sqlite;
pub mod types;
pub mod vector;

// Re-export commonly used types
pub use embeddings::{create_embedding_provider, EmbeddingProvider, NoopEmbedding, OllamaEmbedding};
pub use identity::{command_id, content_hash};
pub use legacy::{parse_legacy_summaries, parse_legacy_tags, ImportReport, LegacySummary};
pub use sqlite::CommandStore;
pub use types::{CommandRow, ScoredCommand};
pub use vector::{bytes_to_vec, cosine_similarity, rank_by_similarity, vec_to_bytes, ScoredResult};
