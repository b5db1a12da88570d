// Benchd - Multi-model Benchmark Orchestrator
// Snapshot-backed apply/undo for racing several models against one codebase

pub mod benchmark;
pub mod cli;
pub mod config;
pub mod lock;
pub mod models;
pub mod session;
pub mod store;

pub use anyhow::{Context, Result};

// Re-export commonly used types
pub use benchmark::{BenchmarkError, BenchmarkParent, SessionBenchmark};
pub use config::BenchdConfig;
pub use models::ModelRef;
pub use session::{JsonSessionStore, Session, SessionStore};
pub use store::{ContentStore, GitStore, Snapshot};
