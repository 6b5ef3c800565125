//! Tick-driven entity visibility culling
//!
//! Pipeline: [`snapshot::SnapshotBuilder`] gathers immutable state on the
//! simulation thread, [`worker::CullWorker`] runs [`compute::ComputeEngine`]
//! off-thread with a single in-flight slot, and [`service::CullingService`]
//! applies the finished decisions back through the host.

pub mod classify;
pub mod compute;
pub mod metrics;
pub mod service;
pub mod snapshot;
pub mod worker;

pub use classify::{Classifier, SoftwareClassifier, ThresholdTable};
pub use compute::{ComputationResult, Decision};
pub use service::CullingService;
