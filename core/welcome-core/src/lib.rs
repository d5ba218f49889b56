//! # welcome-core
//!
//! Reconciliation core for Welcome presence sensors: mirrors "who is in which
//! room" from the Welcome directory onto a persistent registry of boolean
//! occupancy entries.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Directory loads run on
//!   scoped threads; the daemon owns scheduling.
//! - **Single writer**: One cycle runs at a time; the registry and handler
//!   cache are only touched from the cycle's sequential passes.
//! - **Stable identity**: Entry keys derive from (kind, subject id, room) and
//!   survive restarts. Keys are never mutated; a changed identity means a
//!   retired entry and a new one.
//! - **All or nothing loads**: A failed directory fetch abandons the cycle and
//!   leaves the registry as it was.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use welcome_core::{LoadOptions, MemoryRegistry, ReconciliationEngine};
//!
//! let mut engine = ReconciliationEngine::new(MemoryRegistry::new());
//! let report = engine.refresh(&directory, &LoadOptions::new("home-1"))?;
//! for update in &report.updates {
//!     println!("{} {}", update.label, update.active);
//! }
//! ```

// Public modules
pub mod activation;
pub mod directory;
pub mod engine;
pub mod error;
pub mod handler;
pub mod identity;
pub mod policy;
pub mod registry;
pub mod types;

// Re-export commonly used items at crate root
pub use directory::{DirectorySnapshot, DirectorySource, LoadOptions};
pub use engine::{
    reconcile, CreatedEntry, CycleReport, EntryUpdate, HandlerCache, ReconciliationEngine,
    RemovedEntry,
};
pub use error::{Result, WelcomeError};
pub use handler::{entry_label, EntryHandler, EntryState, RetireReason};
pub use identity::{derive_entry_key, identity_source, EntryKey};
pub use policy::{creation_decision, CreationDecision};
pub use registry::{ActivationNotice, EntryContext, MemoryRegistry, Registry, RegistryEntry};
pub use types::*;
