//! MPD Core - Multi-package development workspaces
//!
//! This crate provides the core functionality:
//! - Spec: Tokenization of package constraint strings
//! - Classify: Bucketing variants into general, per-package and dependency sets
//! - Order: Build order of developed packages
//! - Store: Durable, atomically replaced project configuration
//! - Session: Per-shell project selection
//! - Lifecycle: Command preconditions
//! - Orchestrate: Workspace operations driving the external tools

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Constraint-string tokenizer and typed variants
pub mod spec;

/// Variant classification into buckets
pub mod classify;

/// Ordered per-package constraint lists
pub mod requirement;

/// Dependency ordering and missing-intermediate detection
pub mod order;

/// Project records and their directories
pub mod project;

/// Configuration document and atomic writes
pub mod store;

/// Per-user state directory
pub mod home;

/// Optional user settings
pub mod settings;

/// Session-scoped selection tokens
pub mod session;

/// Precondition predicates and their aggregated check
pub mod lifecycle;

/// Traits for the external resolver, build tool and source control
pub mod host;

/// Spack resolver adapter
pub mod spack;

/// CMake build tool adapter
pub mod cmake;

/// Git source-control adapter
pub mod git;

/// Generated CMake files
pub mod buildfiles;

/// Known repositories and suites
pub mod repos;

/// Self-repair of cached state
pub mod reconcile;

/// Workspace operations
pub mod orchestrate;

/// Crate-wide error type
pub mod error;

pub use error::{Error, ErrorKind, Result};
pub use home::MpdHome;
pub use lifecycle::Predicate;
pub use orchestrate::{Orchestrator, Tools};
pub use project::{Project, ProjectStatus};
pub use settings::Settings;
