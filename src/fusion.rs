//! Choosing between, or combining, the two channel recognitions.
//!
//! Confidence alone is unreliable across heterogeneous engines: one
//! engine's self-reported probability is not comparable to another's, and
//! vision models report none at all. So candidates are compared on a
//! composite score that mixes confidence with length and
//! structural-plausibility signals, and the winner-vs-merge decision is
//! driven by named thresholds on [`FusionPolicy`].

use std::collections::HashSet;

use schemars::JsonSchema;

use crate::{engines::RecognitionResult, prelude::*};

/// Heading inserted above OCR text appended as a supplement.
const OCR_SUPPLEMENT_HEADING: &str = "[OCR supplement]";

/// Heading inserted above vision text appended as a supplement.
const VISION_SUPPLEMENT_HEADING: &str = "[Vision supplement]";

/// Character count at which the quality length term saturates.
const QUALITY_LENGTH_CAP: usize = 200;

/// Distinct-character count at which the diversity term saturates.
const DIVERSITY_CAP: usize = 50;

/// Digit/punctuation count at which the structure term saturates.
const STRUCTURE_CAP: usize = 20;

/// Multiplier applied to the CJK character ratio before capping.
const CJK_RATIO_MULTIPLIER: f32 = 2.0;

/// Punctuation treated as a sign of structured content (amounts, dates,
/// lists).
const STRUCTURAL_PUNCTUATION: &str = ".,;:!?()[]{}";

/// How the final text for one image was produced.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FusionMethod {
    /// Only the OCR channel succeeded.
    OcrOnly,

    /// Only the vision channel succeeded.
    VisionOnly,

    /// Scores tied; both texts merged line-by-line.
    IntelligentMerge,

    /// OCR scored higher; vision at most appended as a supplement.
    OcrEnhanced,

    /// Vision scored higher; OCR at most appended as a supplement.
    VisionEnhanced,

    /// Neither channel succeeded.
    BothFailed,
}

/// The fused recognition for one image.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FusionOutcome {
    /// The fused text.
    pub text: String,

    /// How the text was produced.
    pub method: FusionMethod,

    /// Confidence of the OCR channel, when it contributed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,

    /// Confidence of the vision channel, when it contributed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision_confidence: Option<f32>,

    /// Failure messages from channels that did not succeed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Weights and thresholds steering the fusion decision.
///
/// The defaults carry over from the tuning of the system this replaces;
/// they are starting points, not ground truth, and every decision the
/// engine makes can be re-tuned by constructing a different policy.
#[derive(Clone, Copy, Debug)]
pub struct FusionPolicy {
    /// Weight of engine-reported confidence in the composite score.
    pub confidence_weight: f32,

    /// Weight of the (capped) text length in the composite score.
    pub length_weight: f32,

    /// Weight of the structural-quality estimate in the composite score.
    pub quality_weight: f32,

    /// Character count at which the composite length term saturates.
    pub length_cap: usize,

    /// Weight of text length within the quality estimate.
    pub quality_length_weight: f32,

    /// Weight of character diversity within the quality estimate.
    pub quality_diversity_weight: f32,

    /// Weight of the CJK character ratio within the quality estimate.
    pub quality_cjk_weight: f32,

    /// Weight of digit/punctuation density within the quality estimate.
    pub quality_structure_weight: f32,

    /// Score difference below which the two texts are merged line-wise
    /// instead of one being chosen as primary.
    pub score_tie_band: f32,

    /// How much longer (in characters) the primary text must be before
    /// the secondary is dropped instead of appended as a supplement.
    pub dominance_ratio: f32,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            confidence_weight: 0.4,
            length_weight: 0.3,
            quality_weight: 0.3,
            length_cap: 100,
            quality_length_weight: 0.3,
            quality_diversity_weight: 0.2,
            quality_cjk_weight: 0.3,
            quality_structure_weight: 0.2,
            score_tie_band: 0.1,
            dominance_ratio: 1.5,
        }
    }
}

impl FusionPolicy {
    /// Composite quality score for one candidate recognition.
    pub fn score(&self, result: &RecognitionResult) -> f32 {
        let chars = result.text.chars().count();
        let length_score = (chars as f32 / self.length_cap as f32).min(1.0);
        self.confidence_weight * result.confidence
            + self.length_weight * length_score
            + self.quality_weight * self.text_quality(&result.text)
    }

    /// Estimate how much a text looks like real structured content rather
    /// than recognition noise, in `[0, 1]`.
    fn text_quality(&self, text: &str) -> f32 {
        if text.trim().is_empty() {
            return 0.0;
        }
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len() as f32;

        let length_score = (total / QUALITY_LENGTH_CAP as f32).min(1.0);

        let unique: HashSet<char> = chars.iter().copied().collect();
        let diversity_score = (unique.len() as f32 / DIVERSITY_CAP as f32).min(1.0);

        let cjk_count = chars.iter().filter(|c| is_cjk(**c)).count() as f32;
        let cjk_score = (cjk_count / total * CJK_RATIO_MULTIPLIER).min(1.0);

        let structure_count = chars
            .iter()
            .filter(|c| c.is_ascii_digit() || STRUCTURAL_PUNCTUATION.contains(**c))
            .count();
        let structure_score = (structure_count as f32 / STRUCTURE_CAP as f32).min(1.0);

        (self.quality_length_weight * length_score
            + self.quality_diversity_weight * diversity_score
            + self.quality_cjk_weight * cjk_score
            + self.quality_structure_weight * structure_score)
            .min(1.0)
    }
}

/// Is this a CJK unified ideograph?
fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Decide what to do with the results of the two channels.
///
/// A missing result means the channel was not attempted; a present result
/// with `success == false` means it was attempted and failed. Failure
/// messages are carried through on the outcome for diagnostics.
pub fn fuse(
    policy: &FusionPolicy,
    ocr: Option<RecognitionResult>,
    vision: Option<RecognitionResult>,
) -> FusionOutcome {
    let mut errors = vec![];
    for result in [&ocr, &vision].into_iter().flatten() {
        if !result.success {
            errors.push(format!(
                "{}: {}",
                result.engine_id,
                result.error.as_deref().unwrap_or("failed")
            ));
        }
    }

    match (ocr, vision) {
        (Some(o), Some(v)) if o.success && v.success => {
            merge_or_select(policy, o, v, errors)
        }
        (Some(o), _) if o.success => FusionOutcome {
            text: o.text,
            method: FusionMethod::OcrOnly,
            ocr_confidence: Some(o.confidence),
            vision_confidence: None,
            errors,
        },
        (_, Some(v)) if v.success => FusionOutcome {
            text: v.text,
            method: FusionMethod::VisionOnly,
            ocr_confidence: None,
            vision_confidence: Some(v.confidence),
            errors,
        },
        _ => FusionOutcome {
            text: String::new(),
            method: FusionMethod::BothFailed,
            ocr_confidence: None,
            vision_confidence: None,
            errors,
        },
    }
}

/// Both channels succeeded: merge on a tie, otherwise let the higher score
/// win with the loser at most appended as a supplement.
fn merge_or_select(
    policy: &FusionPolicy,
    ocr: RecognitionResult,
    vision: RecognitionResult,
    errors: Vec<String>,
) -> FusionOutcome {
    let ocr_score = policy.score(&ocr);
    let vision_score = policy.score(&vision);
    debug!(ocr_score, vision_score, "scored both channels");

    let (text, method) = if (ocr_score - vision_score).abs() < policy.score_tie_band {
        (merge_lines(&ocr.text, &vision.text), FusionMethod::IntelligentMerge)
    } else if ocr_score > vision_score {
        (
            enhance(policy, &ocr.text, &vision.text, VISION_SUPPLEMENT_HEADING),
            FusionMethod::OcrEnhanced,
        )
    } else {
        (
            enhance(policy, &vision.text, &ocr.text, OCR_SUPPLEMENT_HEADING),
            FusionMethod::VisionEnhanced,
        )
    };

    FusionOutcome {
        text,
        method,
        ocr_confidence: Some(ocr.confidence),
        vision_confidence: Some(vision.confidence),
        errors,
    }
}

/// Line-level merge: OCR lines first, then vision lines, dropping exact
/// repeats while keeping first-seen order.
fn merge_lines(ocr: &str, vision: &str) -> String {
    let mut seen = HashSet::new();
    let mut merged: Vec<&str> = vec![];
    for line in ocr.lines().chain(vision.lines()) {
        let line = line.trim();
        if !line.is_empty() && seen.insert(line) {
            merged.push(line);
        }
    }
    merged.join("\n")
}

/// Keep the primary text, appending the secondary under `heading` unless
/// the primary dwarfs it.
fn enhance(policy: &FusionPolicy, primary: &str, secondary: &str, heading: &str) -> String {
    let primary_chars = primary.chars().count();
    let secondary_chars = secondary.chars().count();
    if primary_chars as f32 > policy.dominance_ratio * secondary_chars as f32 {
        primary.to_owned()
    } else {
        format!("{}\n\n{}\n{}", primary, heading, secondary)
    }
}
