//! Photo and video ingest engine with a bronze/silver/gold tier lifecycle.
//!
//! Files enter through the [`ingest::IngestPipeline`], which hashes them,
//! screens them against the library for exact and visual duplicates, and
//! admits survivors into the bronze tier. From there the
//! [`crate::core::tier::TierStateMachine`] drives enrichment and promotion,
//! and [`crate::core::burst::BurstGrouper`] finds rapid-sequence shots for
//! review.

pub mod config;
pub mod core;
pub mod enrich;
pub mod ingest;
pub mod storage;

pub use crate::config::EngineConfig;
pub use crate::core::burst::{BurstAnalysis, BurstGroup, BurstGrouper};
pub use crate::core::conflict::{
    CheckOutcome, DuplicateConflict, DuplicateConflictResolver, IncomingFile, ResolutionAction,
};
pub use crate::core::tier::TierStateMachine;
pub use crate::ingest::{IngestPipeline, IngestReport};
pub use crate::storage::library::MediaLibrary;
pub use crate::storage::models::{FileVersion, MediaAsset, ProcessingState, Tier};
pub use crate::storage::store::{MediaStore, MemoryStore};
