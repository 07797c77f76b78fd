//! Application state shared by every command

pub mod app_state;

pub use app_state::{AppState, StateOptions};
