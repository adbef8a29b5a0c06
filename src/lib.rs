//! Vietnamese license plate reader: detection, multi-variant OCR ensemble
//! and plate grammar.

pub use common::plates;
pub use lpr_service::{api, config, engine, pipeline, ApiError, LprError, LprPipeline, LprServiceState};
