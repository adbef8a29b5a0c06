//! Selection of one winning read among the per-variant candidates.

use crate::pipeline::grammar::{matches_special_format, strip_whitespace};
use common::plates::UNREADABLE_PLATE;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One recognition outcome tied to the variant it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub confidence: f32,
    pub source_variant: String,
}

impl Candidate {
    pub fn new(text: impl Into<String>, confidence: f32, source_variant: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence,
            source_variant: source_variant.into(),
        }
    }

    fn is_usable(&self) -> bool {
        !self.text.trim().is_empty() && self.confidence.is_finite() && self.confidence > 0.0
    }
}

/// Why the winner was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankReason {
    /// Text matched a special punctuated format as read.
    SpecialFormat,
    /// Text matched a special format once spurious spaces were removed.
    SpecialFormatCompacted,
    HighestConfidence,
    /// No usable candidate at all.
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOutcome {
    pub text: String,
    pub confidence: f32,
    pub source_variant: Option<String>,
    pub reason: RankReason,
}

impl RankedOutcome {
    pub fn is_unreadable(&self) -> bool {
        self.reason == RankReason::Unreadable
    }

    fn from_candidate(candidate: &Candidate, reason: RankReason) -> Self {
        Self {
            text: candidate.text.clone(),
            confidence: candidate.confidence,
            source_variant: Some(candidate.source_variant.clone()),
            reason,
        }
    }

    fn unreadable() -> Self {
        Self {
            text: UNREADABLE_PLATE.to_string(),
            confidence: 0.0,
            source_variant: None,
            reason: RankReason::Unreadable,
        }
    }
}

/// Usable candidates by confidence, highest first. Ties keep input order.
pub fn ordered(candidates: &[Candidate]) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = candidates.iter().filter(|c| c.is_usable()).cloned().collect();
    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    kept
}

/// Pick the winning read.
///
/// Candidates are scanned in confidence order. The first one whose text is a
/// special punctuated format, either as read or with spurious spaces removed,
/// wins over plain confidence. The returned text is always the candidate's
/// own text, never a reformatted one.
pub fn rank(candidates: &[Candidate]) -> RankedOutcome {
    let ordered = ordered(candidates);

    for candidate in &ordered {
        if matches_special_format(&candidate.text).is_some() {
            debug!(variant = %candidate.source_variant, text = %candidate.text, "special format short-circuit");
            return RankedOutcome::from_candidate(candidate, RankReason::SpecialFormat);
        }
        if matches_special_format(&strip_whitespace(&candidate.text)).is_some() {
            debug!(variant = %candidate.source_variant, text = %candidate.text, "special format after removing spaces");
            return RankedOutcome::from_candidate(candidate, RankReason::SpecialFormatCompacted);
        }
    }

    match ordered.first() {
        Some(top) => RankedOutcome::from_candidate(top, RankReason::HighestConfidence),
        None => RankedOutcome::unreadable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_and_orders() {
        let candidates = vec![
            Candidate::new("", 0.9, "original"),
            Candidate::new("51A1", 0.0, "grayscale"),
            Candidate::new("51A12", 0.4, "otsu"),
            Candidate::new("51A123", f32::NAN, "sharpen"),
            Candidate::new("51A1234", 0.8, "brighter"),
            Candidate::new("51A12345", 0.8, "high_contrast"),
        ];

        let ordered = ordered(&candidates);
        let variants: Vec<_> = ordered.iter().map(|c| c.source_variant.as_str()).collect();
        assert_eq!(variants, vec!["brighter", "high_contrast", "otsu"]);
    }

    #[test]
    fn test_highest_confidence_wins() {
        let outcome = rank(&[
            Candidate::new("51A1234", 0.6, "original"),
            Candidate::new("51A12345", 0.9, "otsu"),
        ]);
        assert_eq!(outcome.text, "51A12345");
        assert_eq!(outcome.confidence, 0.9);
        assert_eq!(outcome.source_variant.as_deref(), Some("otsu"));
        assert_eq!(outcome.reason, RankReason::HighestConfidence);
    }

    #[test]
    fn test_special_format_beats_confidence() {
        let outcome = rank(&[
            Candidate::new("6BG1668B6", 0.95, "original"),
            Candidate::new("68-G1 668.86", 0.41, "clahe_clip2_tile8"),
        ]);
        assert_eq!(outcome.text, "68-G1 668.86");
        assert_eq!(outcome.confidence, 0.41);
        assert_eq!(outcome.reason, RankReason::SpecialFormat);
    }

    #[test]
    fn test_compacted_match_on_stronger_read_wins() {
        let outcome = rank(&[
            Candidate::new("30-E 12345", 0.5, "otsu"),
            Candidate::new("68 -G1 668.86", 0.9, "original"),
        ]);
        assert_eq!(outcome.text, "68 -G1 668.86");
        assert_eq!(outcome.confidence, 0.9);
        assert_eq!(outcome.source_variant.as_deref(), Some("original"));
        assert_eq!(outcome.reason, RankReason::SpecialFormatCompacted);
    }

    #[test]
    fn test_verbatim_match_reported_before_compacted() {
        let outcome = rank(&[
            Candidate::new("68 -G1 668.86", 0.6, "original"),
            Candidate::new("30-E 12345", 0.8, "otsu"),
        ]);
        assert_eq!(outcome.text, "30-E 12345");
        assert_eq!(outcome.reason, RankReason::SpecialFormat);
    }

    #[test]
    fn test_empty_is_unreadable() {
        let outcome = rank(&[Candidate::new("", 0.0, "original"), Candidate::new(" ", 0.7, "otsu")]);
        assert!(outcome.is_unreadable());
        assert_eq!(outcome.text, UNREADABLE_PLATE);
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.source_variant, None);

        assert!(rank(&[]).is_unreadable());
    }

    #[test]
    fn test_rank_is_idempotent() {
        let candidates = vec![
            Candidate::new("29A12345", 0.7, "original"),
            Candidate::new("29A1234S", 0.7, "grayscale"),
            Candidate::new("29-A1 234.56", 0.3, "otsu"),
        ];
        let first = rank(&candidates);
        let again = rank(&ordered(&candidates));
        assert_eq!(first, again);
        assert_eq!(first, rank(&candidates));
    }
}
