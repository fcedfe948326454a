//! tasktree core - keeps the command store in step with the workspace.
//!
//! Provides:
//! - The discovered-command model and manifest parsing
//! - The registration → summarization → embedding pipeline
//! - A debounced scheduler for file-change triggers
//! - Semantic search over stored summaries
//! - Per-workspace session wiring
//!
//! ## Example
//!
//! ```ignore
//! let session = WorkspaceSession::open(root)?;
//! let summarizer = session.summarizer(prompt).await?;
//! let report = session.pipeline(summarizer).run(commands, &cancel).await?;
//! let hits = session.search().search("start the dev server").await?;
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod command;
pub mod debounce;
pub mod pipeline;
pub mod search;
pub mod session;

pub use command::{parse_manifest, DiscoveredCommand};
pub use debounce::DebouncedRunner;
pub use pipeline::{PipelineReport, Stage, StageFailure, SummaryPipeline};
pub use search::SemanticSearch;
pub use session::WorkspaceSession;
