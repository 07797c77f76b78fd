//! Hardware Detection Module
//!
//! Provides GPU detection for picking the right llama.cpp build.

pub mod gpu;

pub use gpu::{classify_gpu_name, detect_gpu, GpuInfo, GpuType};
