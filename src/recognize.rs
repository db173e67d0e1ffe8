//! Running both recognition channels against one image.

use std::{sync::Arc, time::Duration};

use tokio::time;

use crate::{
    engines::{RecognitionResult, RecognizeEngine},
    prelude::*,
};

/// How long we wait for the OCR channel before abandoning the call.
pub const OCR_TIMEOUT: Duration = Duration::from_secs(30);

/// How long we wait for the vision channel before abandoning the call.
/// Vision calls are slower and costlier by design, so they get more room.
pub const VISION_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs the OCR and vision channels concurrently against one image.
///
/// Each enabled channel runs as its own task with its own timeout, so a
/// slow vision call can never block collection of the OCR result, or vice
/// versa. A channel with no engine configured yields `None`, which is
/// distinct from a failed recognition. There are no retries at this layer;
/// a single attempt per channel per image.
pub struct DualChannelRecognizer {
    ocr: Option<Arc<dyn RecognizeEngine>>,
    vision: Option<Arc<dyn RecognizeEngine>>,
    ocr_timeout: Duration,
    vision_timeout: Duration,
}

impl DualChannelRecognizer {
    /// Create a new recognizer over the given engines, with the default
    /// timeouts.
    pub fn new(
        ocr: Option<Arc<dyn RecognizeEngine>>,
        vision: Option<Arc<dyn RecognizeEngine>>,
    ) -> Self {
        Self {
            ocr,
            vision,
            ocr_timeout: OCR_TIMEOUT,
            vision_timeout: VISION_TIMEOUT,
        }
    }

    /// Override the per-channel timeouts.
    pub fn with_timeouts(mut self, ocr: Duration, vision: Duration) -> Self {
        self.ocr_timeout = ocr;
        self.vision_timeout = vision;
        self
    }

    /// Is at least one channel configured?
    pub fn is_enabled(&self) -> bool {
        self.ocr.is_some() || self.vision.is_some()
    }

    /// Recognize one image on every configured channel.
    ///
    /// Both channels are launched before either result is awaited, and the
    /// image handle is released as soon as the channels own their copies,
    /// so we never hold page images longer than necessary.
    #[instrument(level = "debug", skip_all)]
    pub async fn recognize(
        &self,
        image: Arc<Vec<u8>>,
    ) -> (Option<RecognitionResult>, Option<RecognitionResult>) {
        let ocr_task = self
            .ocr
            .clone()
            .map(|engine| run_channel(engine, image.clone(), self.ocr_timeout));
        let vision_task = self
            .vision
            .clone()
            .map(|engine| run_channel(engine, image, self.vision_timeout));

        let ocr_result = match ocr_task {
            Some(task) => Some(task.await),
            None => None,
        };
        let vision_result = match vision_task {
            Some(task) => Some(task.await),
            None => None,
        };
        (ocr_result, vision_result)
    }
}

/// Launch one channel and wait for it, up to `limit`.
///
/// The adapter call is spawned as a separate task, and the timeout applies
/// to the join handle: when a channel times out, the task is abandoned to
/// finish (and clean up) on its own, and its eventual result is ignored.
fn run_channel(
    engine: Arc<dyn RecognizeEngine>,
    image: Arc<Vec<u8>>,
    limit: Duration,
) -> impl Future<Output = RecognitionResult> {
    let engine_id = engine.id().to_owned();
    let handle = tokio::spawn(async move { engine.recognize(&image).await });
    async move {
        match time::timeout(limit, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => RecognitionResult::failed(
                &engine_id,
                format!("recognition task failed: {}", err),
            ),
            Err(_) => {
                warn!(engine = %engine_id, "recognition timed out");
                RecognitionResult::failed(&engine_id, "timeout")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::testing::StaticEngine;

    fn image() -> Arc<Vec<u8>> {
        Arc::new(b"fake image bytes".to_vec())
    }

    fn engine(engine: StaticEngine) -> Option<Arc<dyn RecognizeEngine>> {
        let engine: Arc<dyn RecognizeEngine> = Arc::new(engine);
        Some(engine)
    }

    #[tokio::test]
    async fn disabled_channels_yield_none() {
        let recognizer = DualChannelRecognizer::new(None, None);
        assert!(!recognizer.is_enabled());
        let (ocr, vision) = recognizer.recognize(image()).await;
        assert!(ocr.is_none());
        assert!(vision.is_none());
    }

    #[tokio::test]
    async fn both_channels_run_and_report() {
        let recognizer = DualChannelRecognizer::new(
            engine(StaticEngine::ok("ocr", "from ocr", 0.8)),
            engine(StaticEngine::ok("vision", "from vision", 1.0)),
        );
        let (ocr, vision) = recognizer.recognize(image()).await;
        assert_eq!(ocr.unwrap().text, "from ocr");
        assert_eq!(vision.unwrap().text, "from vision");
    }

    #[tokio::test]
    async fn failure_on_one_channel_does_not_disturb_the_other() {
        let recognizer = DualChannelRecognizer::new(
            engine(StaticEngine::failed("ocr", "service unreachable")),
            engine(StaticEngine::ok("vision", "Total Due: 230.00", 0.92)),
        );
        let (ocr, vision) = recognizer.recognize(image()).await;
        let ocr = ocr.unwrap();
        assert!(!ocr.success);
        assert_eq!(ocr.error.as_deref(), Some("service unreachable"));
        assert!(vision.unwrap().success);
    }

    #[tokio::test]
    async fn timeout_abandons_the_slow_channel_only() {
        let recognizer = DualChannelRecognizer::new(
            engine(
                StaticEngine::ok("ocr", "too late", 0.9)
                    .with_delay(Duration::from_secs(5)),
            ),
            engine(StaticEngine::ok("vision", "on time", 1.0)),
        )
        .with_timeouts(Duration::from_millis(50), VISION_TIMEOUT);

        let (ocr, vision) = recognizer.recognize(image()).await;
        let ocr = ocr.unwrap();
        assert!(!ocr.success);
        assert_eq!(ocr.error.as_deref(), Some("timeout"));
        let vision = vision.unwrap();
        assert!(vision.success);
        assert_eq!(vision.text, "on time");
    }
}
