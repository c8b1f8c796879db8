#![doc = include_str!("../README.md")]

pub mod acquire;
pub mod cli;
pub mod config;
pub mod error;
pub mod runtime;
pub mod sink;

pub use acquire::{acquire, AcquisitionPipeline};
pub use config::AcquireConfig;
pub use error::*;
