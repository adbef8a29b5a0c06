//! Crop-level recognition pipeline: variants, recognition, ranking, parsing
//! and color classification.

pub mod analyzer;
pub mod color;
pub mod grammar;
pub mod provinces;
pub mod ranking;
pub mod recognition;
pub mod variants;

pub use analyzer::PlateAnalyzer;
pub use grammar::{parse, PlateFormat};
pub use ranking::{rank, Candidate, RankedOutcome};
pub use variants::{Variant, VariantGenerator, VariantProfile};
