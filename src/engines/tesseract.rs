//! Tesseract OCR engine.
//!
//! Wraps the `tesseract` CLI tool. We ask for TSV output instead of plain
//! text because the TSV rows carry per-word confidences, which the fusion
//! scoring needs.

use std::{
    fs::{File, read_to_string},
    io::Write as _,
};

use tokio::process::Command;

use super::{RecognitionResult, RecognizeEngine};
use crate::prelude::*;

/// OCR engine wrapping the `tesseract` CLI tool.
pub struct TesseractEngine {
    /// Language(s) passed to `-l`, e.g. `eng` or `chi_sim+eng`.
    lang: String,
}

impl TesseractEngine {
    /// Create a new `tesseract` engine for the given language(s).
    pub fn new(lang: &str) -> Self {
        Self {
            lang: lang.to_owned(),
        }
    }

    /// Run `tesseract` over one image and parse its TSV output.
    async fn run(&self, image: &[u8]) -> Result<(String, f32)> {
        let mime_type = infer::get(image)
            .map(|kind| kind.mime_type())
            .unwrap_or("image/png");
        let extension = mime_guess::get_mime_extensions_str(mime_type)
            .and_then(|o| o.first())
            .ok_or_else(|| anyhow!("cannot determine extension for {}", mime_type))?;

        // Write our input to a temporary file.
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join(format!("input.{}", extension));
        let output_base = tmpdir.path().join("output");
        let mut input_file =
            File::create(&input_path).context("cannot create tesseract input file")?;
        input_file
            .write_all(image)
            .context("cannot write tesseract input file")?;
        input_file
            .flush()
            .context("cannot flush tesseract input file")?;

        // Run tesseract on the input file.
        let output = Command::new("tesseract")
            .arg(&input_path)
            .arg(&output_base)
            .args(["-l", &self.lang])
            .arg("tsv")
            .output()
            .await
            .context("cannot run tesseract")?;
        check_for_command_failure("tesseract", &output)?;

        // Read the output file.
        let tsv = read_to_string(output_base.with_extension("tsv"))
            .context("cannot read tesseract output file")?;
        Ok(parse_tsv(&tsv))
    }
}

#[async_trait]
impl RecognizeEngine for TesseractEngine {
    fn id(&self) -> &str {
        "tesseract"
    }

    #[instrument(level = "debug", skip_all, fields(lang = %self.lang))]
    async fn recognize(&self, image: &[u8]) -> RecognitionResult {
        match self.run(image).await {
            Ok((text, confidence)) if !text.trim().is_empty() => {
                RecognitionResult::ok("tesseract", text, confidence)
            }
            Ok(_) => RecognitionResult::failed("tesseract", "no text recognized"),
            Err(err) => RecognitionResult::failed("tesseract", format!("{:?}", err)),
        }
    }
}

/// Report any command failures, including any error output.
fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
) -> Result<()> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(
        command_name = command_name,
        output = %stderr,
        "Standard error from command",
    );
    if output.status.success() {
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}

/// Parse Tesseract's TSV output into text plus an average word confidence.
///
/// Word rows carry a non-negative `conf` column. Words are grouped back
/// into lines by their (page, block, paragraph, line) numbers, and the
/// reported confidence is the mean of the per-word confidences, rescaled
/// from Tesseract's 0-100 range to `[0, 1]`.
fn parse_tsv(tsv: &str) -> (String, f32) {
    let mut lines: Vec<String> = vec![];
    let mut current_key: Option<[String; 4]> = None;
    let mut confidences: Vec<f32> = vec![];

    for row in tsv.lines().skip(1) {
        let columns: Vec<&str> = row.split('\t').collect();
        if columns.len() < 12 {
            continue;
        }
        let conf: f32 = columns[10].parse().unwrap_or(-1.0);
        let word = columns[11].trim();
        if conf < 0.0 || word.is_empty() {
            continue;
        }
        confidences.push(conf / 100.0);

        let key = [
            columns[1].to_owned(),
            columns[2].to_owned(),
            columns[3].to_owned(),
            columns[4].to_owned(),
        ];
        match (&current_key, lines.last_mut()) {
            (Some(current), Some(line)) if *current == key => {
                line.push(' ');
                line.push_str(word);
            }
            _ => {
                lines.push(word.to_owned());
                current_key = Some(key);
            }
        }
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };
    (lines.join("\n"), confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn parse_tsv_groups_words_into_lines() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
             5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t96\tTotal\n\
             5\t1\t1\t1\t1\t2\t12\t0\t10\t10\t88\tDue:\n\
             5\t1\t1\t1\t2\t1\t0\t12\t10\t10\t92\t230.00\n"
        );
        let (text, confidence) = parse_tsv(&tsv);
        assert_eq!(text, "Total Due:\n230.00");
        assert!((confidence - 0.92).abs() < 0.001);
    }

    #[test]
    fn parse_tsv_handles_empty_output() {
        let (text, confidence) = parse_tsv(HEADER);
        assert_eq!(text, "");
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn parse_tsv_skips_structural_rows() {
        // Structural rows (page, block, paragraph) have conf == -1 and
        // must not contribute words or confidence.
        let tsv = format!(
            "{HEADER}\n\
             2\t1\t1\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
             5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t50\tword\n"
        );
        let (text, confidence) = parse_tsv(&tsv);
        assert_eq!(text, "word");
        assert!((confidence - 0.5).abs() < 0.001);
    }
}
