#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![forbid(unsafe_code)]

pub mod env;
pub mod eval;
pub mod host;
pub mod pattern;
mod stack;
pub mod value;

pub use eval::{
    run_module, run_source, ExitRequest, FaultKind, RunConfig, RunOptions, RuntimeFault,
};
pub use host::{HostError, HostRegistry, OutputBuffer, TraceEmitter};
pub use value::Value;
