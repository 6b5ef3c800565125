//! Packet-level spawn/particle interception
//!
//! Sits on the host's outbound pipeline, ahead of the tick-driven pass:
//! spawn messages for entities that would be culled anyway are suppressed
//! before serialization, and a per-observer send budget smooths spawn
//! bursts by deferring the overflow to later ticks.

pub mod budget;
pub mod cache;
pub mod interceptor;

pub use interceptor::PacketInterceptor;

use crate::host::EntityId;
use crate::util::vec3::Vec3;

/// Outbound entity-spawn message, as visible to the interceptor
#[derive(Debug, Clone)]
pub struct SpawnMessage {
    pub entity: EntityId,
    /// Entity type tag when the pipeline exposes it; unknown kinds are
    /// never excluded and never suppressed conservatively
    pub kind: Option<String>,
    pub position: Vec3,
}

/// Interceptor ruling on one outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deliver now
    Send,
    /// Drop before serialization
    Suppress,
    /// Held back by the send budget; delivered on a later tick
    Defer,
}
