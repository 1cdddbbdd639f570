//! rayup-core — shared building blocks for the rayup control-plane.
//!
//! Home of the types every other crate agrees on:
//! - [`NodeSet`] and head/peer role resolution
//! - [`ExecMode`] — the solo-vs-cluster decision, made once and threaded
//!   through everything downstream
//! - [`EnvFile`] — the flat `KEY=value` file that persists discovered
//!   cluster topology between invocations

pub mod envfile;
pub mod mode;
pub mod topology;

pub use envfile::EnvFile;
pub use mode::ExecMode;
pub use topology::{NodeSet, Topology, TopologyError};
