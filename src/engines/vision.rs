//! Vision-language model engine.
//!
//! Speaks the OpenAI-compatible `/chat/completions` protocol, sending the
//! image as a base64 `data:` URL followed by a transcription prompt. VLM
//! endpoints do not report recognition confidence, so successful results
//! claim full confidence and the fusion scoring leans on the text-quality
//! terms to compare them against OCR output.

use std::{env, time::Duration};

use base64::{Engine as _, prelude::BASE64_STANDARD};
use keen_retry::{ExponentialJitter, ResolvedResult, RetryResult};
use reqwest::Client;
use serde_json::json;

use super::{RecognitionResult, RecognizeEngine};
use crate::{
    prelude::*,
    retry::{IsKnownTransient, retry_result_ok, try_fatal, try_potentially_transient},
};

/// The transcription prompt used when the caller doesn't provide one.
const DEFAULT_PROMPT: &str = "\
Read this image carefully and transcribe all visible text.
Keep the reading order, top to bottom and left to right.
Render tables in Markdown. Copy numbers, amounts and dates exactly.
Output only the transcribed text, with no extra commentary.";

/// Default API base URL, if `OPENAI_API_BASE` is unset.
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Timeout for a single HTTP request. Kept below the recognizer's
/// per-channel budget so a retry still has a chance to land.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(50);

/// A recognition engine backed by a vision-language model behind an
/// OpenAI-compatible endpoint.
pub struct VisionEngine {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    prompt: String,
}

impl VisionEngine {
    /// Create a new vision engine for the given model.
    ///
    /// The server is located via `OPENAI_API_BASE` and authenticated via
    /// `OPENAI_API_KEY`.
    pub fn new(model: String, prompt: Option<String>) -> Result<Self> {
        let api_base =
            env::var("OPENAI_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_owned());
        let api_key = env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY must be set to use a vision model")?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key,
            model,
            prompt: prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_owned()),
        })
    }

    /// Ask the model to transcribe one image, retrying transient failures.
    async fn transcribe(&self, image: &[u8]) -> Result<String> {
        let req = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": { "url": image_data_url(image) },
                    },
                    { "type": "text", "text": self.prompt },
                ],
            }],
        });

        // If we have a transient failure, back off exponentially.
        let jitter = ExponentialJitter::FromBackoffRange {
            backoff_range_millis: 1..=30_000,
            re_attempts: 5,
            jitter_ratio: 0.2,
        };

        let result = self
            .transcribe_inner(&req)
            .await
            .retry_with_async(|_| async { self.transcribe_inner(&req).await })
            .with_exponential_jitter(|| jitter)
            .await
            .inspect_recovered(|_, _, retry_errors_list| {
                warn!(
                    "vision request succeeded after {} retries (failed attempts: [{}])",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            })
            .inspect_given_up(|_, retry_errors_list, fatal_error| {
                error!(
                    "vision request failed after {} retries with error {fatal_error:?} (failed attempts: [{}])",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            });

        match result {
            ResolvedResult::Ok { output, .. }
            | ResolvedResult::Recovered { output, .. } => Ok(output),
            ResolvedResult::Fatal { error, .. } => Err(error),
            ResolvedResult::GivenUp { fatal_error, .. }
            | ResolvedResult::Unrecoverable { fatal_error, .. } => Err(fatal_error),
        }
    }

    /// One attempt at the transcription request.
    async fn transcribe_inner(
        &self,
        req: &serde_json::Value,
    ) -> RetryResult<(), (), String, anyhow::Error> {
        let response = try_potentially_transient!(
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(req)
                .send()
                .await
        );

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = anyhow!("vision endpoint returned {}: {}", status, body);
            if status.is_known_transient() {
                debug!("Potentially transient error: {:?}", error);
                return RetryResult::Transient { input: (), error };
            }
            return RetryResult::Fatal { input: (), error };
        }

        let body: ChatCompletionResponse = try_fatal!(
            response
                .json()
                .await
                .context("failed to parse vision endpoint response")
        );
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        retry_result_ok(text)
    }
}

/// The parts of a chat completion response we care about.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Convert raw image bytes into a `data:` URL, sniffing the MIME type from
/// the bytes themselves.
fn image_data_url(image: &[u8]) -> String {
    let mime_type = infer::get(image)
        .map(|kind| kind.mime_type())
        .unwrap_or("image/png");
    format!("data:{};base64,{}", mime_type, BASE64_STANDARD.encode(image))
}

#[async_trait]
impl RecognizeEngine for VisionEngine {
    fn id(&self) -> &str {
        "vision"
    }

    #[instrument(level = "debug", skip_all, fields(model = %self.model))]
    async fn recognize(&self, image: &[u8]) -> RecognitionResult {
        match self.transcribe(image).await {
            Ok(text) if !text.trim().is_empty() => {
                // VLMs report no probability; claim full confidence and let
                // the fusion score's text-quality terms arbitrate.
                RecognitionResult::ok("vision", text, 1.0)
            }
            Ok(_) => RecognitionResult::failed("vision", "vision model returned no text"),
            Err(err) => RecognitionResult::failed("vision", format!("{:?}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_sniffs_mime_type() {
        // Minimal PNG magic bytes.
        let png = [0x89u8, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0];
        let url = image_data_url(&png);
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn data_url_defaults_to_png_for_unknown_bytes() {
        let url = image_data_url(b"not an image");
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn response_parsing_tolerates_missing_content() {
        let body: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"role": "assistant"}}]}"#)
                .unwrap();
        assert_eq!(body.choices[0].message.content, None);
    }
}
