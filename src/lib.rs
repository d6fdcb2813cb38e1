pub mod bitrate;
pub mod config;
pub mod cover;
pub mod discovery;
pub mod error;
pub mod media;
pub mod metadata;
pub mod pipeline;
pub mod pool;
pub mod timeline;

pub use config::Config;
pub use error::{AssembleError, Result};
pub use pipeline::{assemble, print_summary, AssemblyOutcome, PipelineConfig, PipelineStats};
