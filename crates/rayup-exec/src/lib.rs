//! rayup-exec — the remote-execution boundary.
//!
//! Everything rayup does to a machine goes through the [`Executor`]
//! trait: run a shell command, copy a path. The "local" host executes
//! without a network hop; remote hosts go over SSH. External
//! collaborators that are out of the control-plane's scope — image
//! builds, model downloads, topology discovery — live here too, each
//! behind a narrow command-shaped interface.

pub mod discovery;
pub mod executor;
pub mod image;
pub mod model;
pub mod scripted;

pub use discovery::{Discovered, Discovery, local_addresses};
pub use executor::{CommandOutput, ExecError, Executor, Host, ShellExecutor};
pub use image::ImageBuilder;
pub use model::ModelFetcher;
pub use scripted::ScriptedExecutor;
