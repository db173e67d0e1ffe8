//! An engine that "recognizes" an image by decoding its bytes as UTF-8.
//!
//! This lets a fixture "image" be a plain text file, which makes end-to-end
//! tests and offline smoke runs possible without a recognition service.

use super::{RecognitionResult, RecognizeEngine};
use crate::prelude::*;

/// Echo engine for tests and offline runs.
pub struct EchoEngine {
    /// The confidence to report on every result.
    confidence: f32,
}

impl EchoEngine {
    /// Create a new echo engine reporting the given confidence.
    pub fn new(confidence: f32) -> Self {
        Self { confidence }
    }
}

impl Default for EchoEngine {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl RecognizeEngine for EchoEngine {
    fn id(&self) -> &str {
        "echo"
    }

    async fn recognize(&self, image: &[u8]) -> RecognitionResult {
        RecognitionResult::ok(
            "echo",
            String::from_utf8_lossy(image).into_owned(),
            self.confidence,
        )
    }
}
