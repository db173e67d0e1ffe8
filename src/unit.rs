//! Content units and document-level results.
//!
//! A [`ContentUnit`] is the atomic extraction target: one page of a paged
//! document, or one standalone embedded image. Upstream format parsers
//! (PDF, DOCX, ...) are responsible for producing units; everything in this
//! crate is format-agnostic from here on.

use std::sync::Arc;

use schemars::JsonSchema;

use crate::{fusion::FusionOutcome, prelude::*};

/// One page or embedded image, ready for extraction.
///
/// Units are immutable once built. Image payloads are shared `Arc`s so the
/// recognition channels can hold their own handles without copying.
#[derive(Clone, Debug)]
pub struct ContentUnit {
    /// The unique ID of this unit within its document.
    pub id: String,

    /// Zero-based position of this unit within its document.
    pub position: usize,

    /// Native text already present in the document format. May be empty.
    pub text: String,

    /// Raw bytes of each embedded image, in document order.
    pub images: Vec<Arc<Vec<u8>>>,

    /// Geometry metadata from the upstream parser, passed through to the
    /// result untouched.
    pub geometry: Option<UnitGeometry>,
}

/// Geometry metadata reported by an upstream parser.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UnitGeometry {
    /// Width in the parser's units (points, pixels, ...).
    pub width: f64,

    /// Height in the parser's units.
    pub height: f64,

    /// Rotation in degrees.
    #[serde(default)]
    pub rotation: i32,
}

/// What kind of content a unit holds.
#[derive(
    Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    /// Usable native text and no embedded images.
    NativeTextOnly,

    /// Both usable native text and embedded images.
    Mixed,

    /// Embedded images and no usable native text.
    ImageOnly,

    /// Neither usable native text nor embedded images.
    Empty,

    /// Unit processing trapped a failure. Never produced by
    /// classification.
    Error,
}

/// How a unit's final text was produced.
#[derive(
    Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitMethod {
    /// Native text copied through verbatim.
    NativeText,

    /// Text recognized from embedded images.
    Recognition,

    /// Native text with recognized image text appended.
    NativeWithRecognition,

    /// Nothing to extract.
    Empty,

    /// Unit processing failed; the text carries the error message.
    Error,
}

/// The result of processing a single content unit.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct UnitResult {
    /// The ID of the unit this result was produced from.
    pub unit_id: String,

    /// The unit's position within the document.
    pub position: usize,

    /// The extracted text. Empty means "no usable text", not an error.
    pub text: String,

    /// What kind of content the unit held.
    pub content_type: ContentType,

    /// How the text was produced.
    pub method: UnitMethod,

    /// How many embedded images the unit carried.
    pub image_count: usize,

    /// Per-image fusion outcomes, in image order.
    pub images: Vec<FusionOutcome>,

    /// Geometry metadata passed through from the unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<UnitGeometry>,

    /// The trapped failure, if unit processing failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate statistics over a processed document.
#[derive(Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DocumentStats {
    /// How many units did we process?
    pub total_units: usize,

    /// Units with usable native text and no images.
    pub native_text_units: usize,

    /// Units with both native text and images.
    pub mixed_units: usize,

    /// Units with images only.
    pub image_only_units: usize,

    /// Units with no content at all.
    pub empty_units: usize,

    /// Units whose processing failed.
    pub error_units: usize,

    /// How many embedded images went through the recognition pipeline?
    pub total_images: usize,

    /// Images resolved from the OCR channel alone.
    pub ocr_only_images: usize,

    /// Images resolved from the vision channel alone.
    pub vision_only_images: usize,

    /// Images whose channel results were merged line-by-line.
    pub merged_images: usize,

    /// Images where OCR won and vision at most supplemented it.
    pub ocr_enhanced_images: usize,

    /// Images where vision won and OCR at most supplemented it.
    pub vision_enhanced_images: usize,

    /// Images where both channels failed.
    pub failed_images: usize,
}

impl DocumentStats {
    /// Fold one unit result into the counters.
    pub fn record(&mut self, unit: &UnitResult) {
        use crate::fusion::FusionMethod;

        self.total_units += 1;
        match unit.content_type {
            ContentType::NativeTextOnly => self.native_text_units += 1,
            ContentType::Mixed => self.mixed_units += 1,
            ContentType::ImageOnly => self.image_only_units += 1,
            ContentType::Empty => self.empty_units += 1,
            ContentType::Error => self.error_units += 1,
        }
        for outcome in &unit.images {
            self.total_images += 1;
            match outcome.method {
                FusionMethod::OcrOnly => self.ocr_only_images += 1,
                FusionMethod::VisionOnly => self.vision_only_images += 1,
                FusionMethod::IntelligentMerge => self.merged_images += 1,
                FusionMethod::OcrEnhanced => self.ocr_enhanced_images += 1,
                FusionMethod::VisionEnhanced => self.vision_enhanced_images += 1,
                FusionMethod::BothFailed => self.failed_images += 1,
            }
        }
    }
}

/// The fully assembled result of processing one document.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DocumentResult {
    /// One result per input unit, in input order.
    pub units: Vec<UnitResult>,

    /// All unit texts, joined with blank lines.
    pub full_text: String,

    /// Aggregate counters.
    pub stats: DocumentStats,

    /// True when no unit carried usable native text, i.e. the document
    /// appears to be a scan.
    pub is_scanned: bool,
}
