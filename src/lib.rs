// Regulation Tracker - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod classifier;    // Stage Classifier
pub mod config;        // Environment configuration
pub mod db;            // SQLite storage + read-side queries
pub mod deduplication; // Deduplication Guard
pub mod error;         // Error taxonomy
pub mod fetch;         // Federal Register fetch capability
pub mod logging;       // Tracing subscriber setup
pub mod models;        // Entities + Current-Stage Resolver
pub mod resolver;      // Entity Resolver (find-or-create)
pub mod search;        // Live upstream search
pub mod sync;          // Synchronization Engine

// Re-export commonly used types
pub use classifier::classify;
pub use config::Config;
pub use db::{
    Event, EntityCounts, RegulationDetail, RegulationFilter, RegulationSummary,
    entity_counts, list_agencies, list_committees, list_regulations, open_database,
    regulation_detail, seed_known_committees, setup_database,
};
pub use deduplication::{already_recorded, DedupKey};
pub use error::{Error, Result};
pub use fetch::{
    AgencyRef, DocumentSource, FederalRegisterClient, FederalRegisterDocument,
    SearchQuery, SearchResults,
};
pub use models::{
    current_stage, Agency, Committee, Document, Regulation, RuleStage, StageKind,
};
pub use resolver::{resolve_agency, resolve_regulation, Resolved};
pub use search::{search_documents, SearchForm, SearchHit, SearchPage};
pub use sync::{SyncEngine, SyncReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
