#![doc(html_root_url = "https://maxmcc.github.io/rust-jlink/")]

//! Links Java modules into a runtime image.
//!
//! A link starts from a [`Pool`](pool/struct.Pool.html) holding every class,
//! resource, native library and configuration file of the modules being
//! linked. A [`Pipeline`](pipeline/struct.Pipeline.html) of configured
//! plugins rewrites the pool one stage at a time, and the
//! [`ImageWriter`](image/struct.ImageWriter.html) lays the result out on disk.

#[macro_use]
pub mod logging;

pub mod config;
pub mod error;
pub mod image;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod plugin;
pub mod pool;
pub mod util;
pub mod writer;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::pipeline::Pipeline;
pub use crate::pool::{Artifact, ArtifactKind, Pool, PoolBuilder};
