//! Repository trait definitions for storage operations.
//!
//! Storage is split across focused traits:
//!
//! - [`hospital`]: facility lookup and connection health
//! - [`snapshot`]: idempotent snapshot ingestion and history reads
//! - [`forecast`]: forecast batches, latest-forecast queries and forecast errors
//!
//! Code that needs everything takes `&dyn FullRepository` (or an
//! `Arc<dyn FullRepository>`), which every type implementing the three traits
//! gets for free.

pub mod error;
pub mod forecast;
pub mod hospital;
pub mod snapshot;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

pub use forecast::ForecastRepository;
pub use hospital::HospitalRepository;
pub use snapshot::SnapshotRepository;

/// Composite trait bound for a complete repository implementation.
pub trait FullRepository: HospitalRepository + SnapshotRepository + ForecastRepository {}

impl<T> FullRepository for T where T: HospitalRepository + SnapshotRepository + ForecastRepository {}
