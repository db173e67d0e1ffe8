//! Per-unit orchestration and whole-document assembly.
//!
//! The unit processor routes each classified unit through the right
//! pipeline (native text, image recognition, or both) and traps any
//! failure into an error-tagged result, so one bad unit never aborts a
//! document. The document assembler runs units through a bounded worker
//! pool and folds the ordered results into a [`DocumentResult`].

use std::sync::Arc;

use futures::StreamExt as _;

use crate::{
    async_utils::BoxedStream,
    classify::classify,
    fusion::{FusionOutcome, FusionPolicy, fuse},
    prelude::*,
    recognize::DualChannelRecognizer,
    sanitize::sanitize,
    unit::{
        ContentType, ContentUnit, DocumentResult, DocumentStats, UnitMethod, UnitResult,
    },
};

/// Heading above image-derived text appended to a unit's native text.
const IMAGE_TEXT_HEADING: &str = "[Image text]";

/// Separator between unit texts in a document's full text.
pub const UNIT_SEPARATOR: &str = "\n\n";

/// Processes the units of one document.
///
/// Engines, fusion policy and concurrency are all injected here, so tests
/// can substitute scripted engines and callers can tune the pipeline
/// without touching it.
#[derive(Clone)]
pub struct DocumentProcessor {
    recognizer: Arc<DualChannelRecognizer>,
    policy: FusionPolicy,
    jobs: usize,
}

impl DocumentProcessor {
    /// Create a new processor.
    pub fn new(
        recognizer: DualChannelRecognizer,
        policy: FusionPolicy,
        jobs: usize,
    ) -> Self {
        Self {
            recognizer: Arc::new(recognizer),
            policy,
            jobs: jobs.max(1),
        }
    }

    /// Process every unit of a document and assemble the final result.
    #[instrument(level = "debug", skip_all, fields(units = units.len()))]
    pub async fn process(&self, units: Vec<ContentUnit>) -> DocumentResult {
        let results = self.process_stream(units).collect::<Vec<_>>().await;
        assemble(results)
    }

    /// Process units as a stream of results.
    ///
    /// Units run concurrently, up to the configured worker count, but
    /// results are always yielded in input order.
    pub fn process_stream(&self, units: Vec<ContentUnit>) -> BoxedStream<UnitResult> {
        let this = self.clone();
        let jobs = self.jobs;
        futures::stream::iter(units)
            .map(move |unit| {
                let this = this.clone();
                async move { this.process_unit(unit).await }
            })
            .buffered(jobs)
            .boxed()
    }

    /// Process one unit, trapping any failure into an error-tagged result.
    #[instrument(level = "debug", skip_all, fields(unit = %unit.id))]
    pub async fn process_unit(&self, unit: ContentUnit) -> UnitResult {
        let id = unit.id.clone();
        let position = unit.position;
        let geometry = unit.geometry;
        match self.process_unit_inner(unit).await {
            Ok(result) => result,
            Err(err) => {
                error!(unit = %id, error = ?err, "unit processing failed");
                let message = format!("{:?}", err);
                UnitResult {
                    unit_id: id,
                    position,
                    text: message.clone(),
                    content_type: ContentType::Error,
                    method: UnitMethod::Error,
                    image_count: 0,
                    images: vec![],
                    geometry,
                    error: Some(message),
                }
            }
        }
    }

    async fn process_unit_inner(&self, unit: ContentUnit) -> Result<UnitResult> {
        let classification = classify(&unit);
        debug!(
            unit = %unit.id,
            content_type = ?classification.content_type,
            has_text = classification.has_native_text,
            native_chars = classification.native_text_length,
            has_images = classification.has_images,
            images = classification.image_count,
            "classified unit"
        );

        let ContentUnit {
            id,
            position,
            text: native_text,
            images,
            geometry,
        } = unit;
        let image_count = images.len();

        let (text, method, outcomes) = match classification.content_type {
            // Native text is trusted source text and passes through
            // verbatim, unsanitized.
            ContentType::NativeTextOnly => (native_text, UnitMethod::NativeText, vec![]),
            ContentType::ImageOnly => {
                let outcomes = self.recognize_images(images).await;
                let text = join_image_texts(&outcomes);
                (text, UnitMethod::Recognition, outcomes)
            }
            ContentType::Mixed => {
                let outcomes = self.recognize_images(images).await;
                let image_text = join_image_texts(&outcomes);
                let text = if image_text.is_empty() {
                    native_text
                } else {
                    format!(
                        "{}\n\n{}\n{}",
                        native_text, IMAGE_TEXT_HEADING, image_text
                    )
                };
                (text, UnitMethod::NativeWithRecognition, outcomes)
            }
            ContentType::Empty => (String::new(), UnitMethod::Empty, vec![]),
            // The classifier never yields this; treat it like an empty
            // unit if it ever appears.
            ContentType::Error => (String::new(), UnitMethod::Empty, vec![]),
        };

        Ok(UnitResult {
            unit_id: id,
            position,
            text,
            content_type: classification.content_type,
            method,
            image_count,
            images: outcomes,
            geometry,
            error: None,
        })
    }

    /// Run the two-channel pipeline over every embedded image.
    ///
    /// Each outcome's text has already been sanitized; empty text means
    /// recognition produced nothing usable for that image.
    async fn recognize_images(&self, images: Vec<Arc<Vec<u8>>>) -> Vec<FusionOutcome> {
        let mut outcomes = Vec::with_capacity(images.len());
        for image in images {
            let (ocr, vision) = self.recognizer.recognize(image).await;
            let mut outcome = fuse(&self.policy, ocr, vision);
            outcome.text = sanitize(&outcome.text);
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// Join the non-empty per-image texts with blank lines.
fn join_image_texts(outcomes: &[FusionOutcome]) -> String {
    outcomes
        .iter()
        .map(|outcome| outcome.text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(UNIT_SEPARATOR)
}

/// Combine ordered unit results into a document result.
pub fn assemble(results: Vec<UnitResult>) -> DocumentResult {
    let mut stats = DocumentStats::default();
    for unit in &results {
        stats.record(unit);
    }
    let full_text = results
        .iter()
        .map(|unit| unit.text.as_str())
        .collect::<Vec<_>>()
        .join(UNIT_SEPARATOR);
    // A document with no native text anywhere is a scan.
    let is_scanned = stats.native_text_units == 0 && stats.mixed_units == 0;
    DocumentResult {
        units: results,
        full_text,
        stats,
        is_scanned,
    }
}
