#![forbid(unsafe_code)]

//! Concrete evidence analyzers and the TOML configuration that enables them.

pub mod config;
pub mod extractor;
pub mod hayabusa;
pub mod plaso;
pub mod plasma;
pub mod registry;

pub use config::Config;
pub use registry::Registry;
