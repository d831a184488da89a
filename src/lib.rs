//! mlpipe - container pipeline for an ML project
//!
//! Builds the project environment in a container and runs data preparation,
//! training, model selection and tests as content-addressed image layers,
//! driven through the podman or docker CLI.

pub mod cache;
pub mod cli;
pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod orchestration;
pub mod pipeline;
pub mod source;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

pub use container::{Container, Executor, FileRef};
pub use context::{CancelHandle, ExecContext};
pub use error::{MlpipeError, MlpipeResult};
pub use pipeline::Pipeline;
