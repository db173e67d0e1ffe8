//! The `extract` subcommand.

use std::{sync::Arc, time::Duration};

use clap::Args;
use futures::{StreamExt as _, TryStreamExt as _};
use schemars::JsonSchema;
use tokio::{
    fs::File,
    io::{AsyncBufRead, AsyncWriteExt as _, BufReader},
};
use tokio_stream::wrappers::LinesStream;

use crate::{
    engines::{ocr_engine_for_name, vision_engine_for_model},
    fusion::FusionPolicy,
    prelude::*,
    processor::{DocumentProcessor, assemble},
    recognize::DualChannelRecognizer,
    ui::{ProgressConfig, Ui},
    unit::{ContentUnit, DocumentResult, UnitGeometry},
};

/// The `extract` subcommand's options.
#[derive(Args, Debug)]
pub struct ExtractOpts {
    /// Path to a JSONL file of content units. Reads standard input if
    /// omitted.
    pub input: Option<PathBuf>,

    /// Recognize embedded images with an OCR engine.
    #[clap(long = "ocr")]
    pub use_ocr: bool,

    /// Which OCR engine to use.
    #[clap(long, default_value = "tesseract")]
    pub ocr_engine: String,

    /// Language(s) for the Tesseract engine.
    #[clap(long, default_value = "chi_sim+eng")]
    pub ocr_lang: String,

    /// Recognize embedded images with a vision-language model.
    #[clap(long = "vision")]
    pub use_vision: bool,

    /// Which vision model to use.
    #[clap(long, default_value = "qwen-vl-plus")]
    pub vision_model: String,

    /// Override the built-in transcription prompt sent to the vision
    /// model.
    #[clap(long)]
    pub vision_prompt: Option<String>,

    /// Seconds to wait for the OCR channel before abandoning an image.
    #[clap(long, default_value_t = 30)]
    pub ocr_timeout: u64,

    /// Seconds to wait for the vision channel before abandoning an image.
    #[clap(long, default_value_t = 60)]
    pub vision_timeout: u64,

    /// Max number of units to process at a time.
    #[clap(short = 'j', long = "jobs", default_value_t = num_cpus::get())]
    pub jobs: usize,

    /// The output path to write the result to. Writes standard output if
    /// omitted.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// One line of the input file, describing a content unit.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct UnitRecord {
    /// The unique ID of the unit within the document.
    pub id: String,

    /// Native text already present in the unit, if any.
    #[serde(default)]
    pub text: String,

    /// Paths to the unit's embedded images.
    #[serde(default)]
    pub images: Vec<PathBuf>,

    /// Geometry metadata, passed through to the result untouched.
    #[serde(default)]
    pub geometry: Option<UnitGeometry>,
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_extract(ui: Ui, opts: &ExtractOpts) -> Result<()> {
    // Build the channel engines the caller asked for. Disabled channels
    // stay `None`, which the recognizer reports as "not attempted".
    let ocr = if opts.use_ocr {
        Some(ocr_engine_for_name(&opts.ocr_engine, &opts.ocr_lang)?)
    } else {
        None
    };
    let vision = if opts.use_vision {
        Some(vision_engine_for_model(
            &opts.vision_model,
            opts.vision_prompt.clone(),
        )?)
    } else {
        None
    };

    let recognizer = DualChannelRecognizer::new(ocr, vision).with_timeouts(
        Duration::from_secs(opts.ocr_timeout),
        Duration::from_secs(opts.vision_timeout),
    );
    if !recognizer.is_enabled() {
        info!("no recognition engines enabled; image content will yield no text");
    }

    let units = read_units(opts.input.as_deref()).await?;
    info!(units = units.len(), "read content units");

    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "📄",
            msg: "Extracting text",
            done_msg: "Extracted text",
        },
        units.len() as u64,
    );

    let processor =
        DocumentProcessor::new(recognizer, FusionPolicy::default(), opts.jobs);
    let results = pb
        .wrap_stream(processor.process_stream(units))
        .collect::<Vec<_>>()
        .await;
    let document = assemble(results);

    write_result(opts.output_path.as_deref(), &document).await
}

/// Read all unit records from a JSONL file or standard input, loading
/// their image payloads from disk.
async fn read_units(path: Option<&Path>) -> Result<Vec<ContentUnit>> {
    let lines = match path {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("failed to open input file {:?}", path))?;
            read_lines(BufReader::new(file)).await?
        }
        None => read_lines(BufReader::new(tokio::io::stdin())).await?,
    };

    let mut units = vec![];
    for (position, line) in lines.iter().filter(|l| !l.trim().is_empty()).enumerate() {
        let record: UnitRecord = serde_json::from_str(line).with_context(|| {
            format!("failed to parse unit record on line {}", position + 1)
        })?;
        let mut images = Vec::with_capacity(record.images.len());
        for image_path in &record.images {
            let bytes = tokio::fs::read(image_path)
                .await
                .with_context(|| format!("failed to read image {:?}", image_path))?;
            images.push(Arc::new(bytes));
        }
        units.push(ContentUnit {
            id: record.id,
            position,
            text: record.text,
            images,
            geometry: record.geometry,
        });
    }
    Ok(units)
}

/// Collect all lines from a reader.
async fn read_lines<R>(reader: R) -> Result<Vec<String>>
where
    R: AsyncBufRead + Unpin + Send,
{
    use tokio::io::AsyncBufReadExt as _;
    LinesStream::new(reader.lines())
        .try_collect()
        .await
        .context("failed to read input")
}

/// Write the document result to a file or standard output.
async fn write_result(path: Option<&Path>, document: &DocumentResult) -> Result<()> {
    let json = serde_json::to_string_pretty(document)
        .context("failed to serialize document result")?;
    match path {
        Some(path) => {
            tokio::fs::write(path, json.as_bytes())
                .await
                .with_context(|| format!("failed to write result to {:?}", path))?;
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(json.as_bytes())
                .await
                .context("failed to write result")?;
            stdout.write_all(b"\n").await.context("failed to write result")?;
            stdout.flush().await.context("failed to flush result")?;
        }
    }
    Ok(())
}
