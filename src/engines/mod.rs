//! Recognition engine interface.

use std::sync::Arc;

use crate::prelude::*;

pub mod echo;
pub mod tesseract;
pub mod vision;

/// The result of asking one engine to recognize one image.
#[derive(Clone, Debug)]
pub struct RecognitionResult {
    /// Which engine produced this result. Opaque to the caller; used for
    /// logging and statistics only.
    pub engine_id: String,

    /// The recognized text. Empty on failure.
    pub text: String,

    /// Engine-reported confidence in `[0, 1]`. Engines that do not report
    /// one use 1.0 on success; failures report 0.0.
    pub confidence: f32,

    /// Did the engine produce usable output?
    pub success: bool,

    /// The failure message, if any.
    pub error: Option<String>,
}

impl RecognitionResult {
    /// Build a successful result.
    pub fn ok(engine_id: &str, text: String, confidence: f32) -> Self {
        Self {
            engine_id: engine_id.to_owned(),
            text,
            confidence: confidence.clamp(0.0, 1.0),
            success: true,
            error: None,
        }
    }

    /// Build a failed result.
    pub fn failed(engine_id: &str, error: impl Into<String>) -> Self {
        Self {
            engine_id: engine_id.to_owned(),
            text: String::new(),
            confidence: 0.0,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Interface to a recognition engine.
///
/// Failures never cross this boundary as errors: engines trap their own
/// failures (network trouble, missing binaries, empty model output, ...)
/// and report them as `success == false` results. Anything that retries
/// or rate-limits belongs behind this interface, not in front of it.
#[async_trait]
pub trait RecognizeEngine: Send + Sync + 'static {
    /// A short identifier for logs and statistics.
    fn id(&self) -> &str;

    /// Recognize the text in one image.
    async fn recognize(&self, image: &[u8]) -> RecognitionResult;
}

/// Get the OCR engine with the given name.
pub fn ocr_engine_for_name(name: &str, lang: &str) -> Result<Arc<dyn RecognizeEngine>> {
    match name {
        "tesseract" => Ok(Arc::new(tesseract::TesseractEngine::new(lang))),
        "echo" => Ok(Arc::new(echo::EchoEngine::default())),
        other => Err(anyhow!("unknown OCR engine {:?}", other)),
    }
}

/// Get the vision engine for the given model name.
///
/// `echo` is handled specially for offline runs; every other name is
/// assumed to be a model served from an OpenAI-compatible endpoint.
pub fn vision_engine_for_model(
    model: &str,
    prompt: Option<String>,
) -> Result<Arc<dyn RecognizeEngine>> {
    match model {
        "echo" => Ok(Arc::new(echo::EchoEngine::default())),
        _ => Ok(Arc::new(vision::VisionEngine::new(model.to_owned(), prompt)?)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable engines for exercising the pipeline without external
    //! services.

    use std::time::Duration;

    use super::*;

    /// An engine that returns a preset result, optionally after a delay.
    pub struct StaticEngine {
        result: RecognitionResult,
        delay: Option<Duration>,
    }

    impl StaticEngine {
        pub fn ok(engine_id: &str, text: &str, confidence: f32) -> Self {
            Self {
                result: RecognitionResult::ok(engine_id, text.to_owned(), confidence),
                delay: None,
            }
        }

        pub fn failed(engine_id: &str, error: &str) -> Self {
            Self {
                result: RecognitionResult::failed(engine_id, error),
                delay: None,
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl RecognizeEngine for StaticEngine {
        fn id(&self) -> &str {
            &self.result.engine_id
        }

        async fn recognize(&self, _image: &[u8]) -> RecognitionResult {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.result.clone()
        }
    }
}
