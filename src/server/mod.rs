//! Server Module
//!
//! Launch parameters and supervision of the `llama-server` child process.

pub mod params;
pub mod supervisor;

pub use params::{ResolvedParams, RunParameters};
pub use supervisor::{ProcessSupervisor, ServerState, SupervisorConfig};
