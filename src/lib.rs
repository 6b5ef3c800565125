//! Tickcull
//!
//! Tick-driven entity visibility culling for simulation servers. Far,
//! slow entities outside an observer's gaze are hidden per observer and
//! restored the moment the conditions stop holding; classification runs
//! on a worker thread with a single in-flight computation so the tick
//! loop never waits on it.
//!
//! # Features
//!
//! - `accel-download` - Fetch the optional native accelerator library at
//!   startup, with SHA-256 verification

pub mod accel;
pub mod config;
pub mod culling;
pub mod host;
pub mod packet;
pub mod report;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use config::CullingConfig;
pub use culling::CullingService;
pub use packet::PacketInterceptor;
