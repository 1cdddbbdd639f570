//! rayup-cluster — container lifecycle across a node set.
//!
//! The launch orchestrator drives one session through
//! `Idle → Starting → Running → Stopping → Idle` (with `Failed` terminal
//! from anywhere):
//!
//! ```text
//! start
//!   ├── idempotency probe (head + peers) — live session? reuse it
//!   ├── session lock (serializes racing starters)
//!   ├── mod preflight (entry-point validation, no node contacted yet)
//!   ├── head container, then peers (sequential, or parallel fan-out)
//!   ├── mod distribution: stage → inject → execute → barrier signal
//!   ├── readiness polling of the runtime (cluster mode)
//!   └── any failure → compensating stop of everything started
//! ```
//!
//! Containers started with mods wait on a barrier marker before the
//! workload runs, so "container is up" and "ready to serve" stay
//! decoupled.

pub mod docker;
pub mod error;
pub mod mods;
pub mod orchestrator;
pub mod readiness;
pub mod session;

pub use error::{ClusterError, ClusterResult};
pub use mods::ModBundle;
pub use orchestrator::{ClusterStatus, LaunchPlan, Orchestrator, ResourceLimits};
pub use readiness::ReadinessProbe;
pub use session::{Session, SessionLock, SessionState};
