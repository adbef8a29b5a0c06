pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod state;

pub use error::{ApiError, LprError};
pub use orchestrator::LprPipeline;
pub use state::LprServiceState;
