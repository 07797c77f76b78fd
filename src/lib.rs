//! Llama Control Center core
//!
//! Installs prebuilt llama.cpp server builds and supervises the
//! `llama-server` process. Presentation layers drive it through
//! [`commands`] and watch it through [`events`].

pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod hardware;
pub mod logs;
pub mod models;
pub mod server;
pub mod setup;
pub mod state;

#[cfg(test)]
mod test_support;

pub use error::{CommandError, CommandResult, ControlError, ControlResult, ErrorKind};
pub use events::{CoreEvent, EventBus};
pub use state::{AppState, StateOptions};
