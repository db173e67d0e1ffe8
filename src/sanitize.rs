//! Filtering recognized text into something fit to show a user.
//!
//! Recognition output is full of things nobody asked for: failure markers,
//! "no visible text" boilerplate from vision models, half-recognized noise
//! lines, and pathological repetition. Everything here is line-oriented
//! and idempotent, and an empty return value means "no usable text", never
//! an error.

use std::{
    collections::{HashMap, HashSet},
    sync::LazyLock,
};

use regex::RegexSet;

/// Lines matching any of these patterns carry no information for the user:
/// explicit failure markers, internal section markers, and the "nothing to
/// see here" phrasings that vision models produce for blank images (the
/// Chinese variants come from the models this pipeline is normally run
/// against).
static NOISE_LINE_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)^\[(processing|recognition|extraction|fusion)\s+(failed|error)",
        r"(?i)^\[(ocr|vision)\s+supplement\]$",
        r"(?i)^\[image\s+text\]$",
        r"(?i)^\[.*(recognition\s+result|supplement)[^\]]*\]$",
        r"^\[.*(识别结果|补充信息|增强结果|识别失败|处理失败|处理异常).*\]",
        r"(?i)no\s+visible\s+text",
        r"(?i)^(ocr|vision):\s*not\s+(run|attempted)",
        r"图中没有可见文字",
        r"^图中所有(可见)?文字[:：]?$",
    ])
    .expect("failed to compile noise patterns")
});

/// Minimum characters for a line to be kept.
const MIN_LINE_CHARS: usize = 3;

/// How many times a single token may repeat within a one-token line.
const MAX_SINGLE_TOKEN_REPEATS: usize = 2;

/// Token count above which the whole-unit repetition check applies.
const REPETITION_CHECK_MIN_TOKENS: usize = 10;

/// Fraction of total tokens one token may claim before the whole unit is
/// considered degenerate repetition.
const MAX_TOKEN_FREQUENCY: f32 = 0.3;

/// CJK punctuation that counts as punctuation for the all-symbols filter.
const CJK_PUNCTUATION: &str = "。，、；：！？（）【】《》—…·";

/// Sanitize fused recognition output for user presentation.
///
/// Returns an empty string when nothing usable remains; callers must treat
/// that as "no text", not as a failure. Running the output through again
/// changes nothing.
pub fn sanitize(text: &str) -> String {
    let mut kept: Vec<&str> = vec![];
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if NOISE_LINE_PATTERNS.is_match(line) {
            continue;
        }
        if line.chars().count() < MIN_LINE_CHARS {
            continue;
        }
        if is_digits_and_punctuation(line) {
            continue;
        }
        if is_repeated_token_line(line) {
            continue;
        }
        kept.push(line);
    }

    // A unit dominated by one token is recognition noise, not content;
    // discard it outright rather than presenting a wall of repeats.
    let tokens: Vec<&str> = kept.iter().flat_map(|l| l.split_whitespace()).collect();
    if tokens.len() > REPETITION_CHECK_MIN_TOKENS {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in &tokens {
            *counts.entry(token).or_default() += 1;
        }
        let most_common = counts.values().copied().max().unwrap_or(0);
        if most_common as f32 > MAX_TOKEN_FREQUENCY * tokens.len() as f32 {
            return String::new();
        }
    }

    // Drop exact repeats, keeping first occurrences in order.
    let mut seen = HashSet::new();
    let unique: Vec<&str> = kept.into_iter().filter(|line| seen.insert(*line)).collect();
    unique.join("\n")
}

/// Is this line composed solely of digits, punctuation and whitespace?
fn is_digits_and_punctuation(line: &str) -> bool {
    line.chars().all(|c| {
        c.is_ascii_digit()
            || c.is_whitespace()
            || c.is_ascii_punctuation()
            || CJK_PUNCTUATION.contains(c)
    })
}

/// Is this line a single token repeated more than twice?
fn is_repeated_token_line(line: &str) -> bool {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    tokens.len() > MAX_SINGLE_TOKEN_REPEATS
        && tokens.iter().collect::<HashSet<_>>().len() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_passes_through_unchanged() {
        let text = "Total Due: 230.00";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn failure_markers_and_boilerplate_are_stripped() {
        let text = "\
[Processing failed: engine crashed]
Invoice #4521
[Vision supplement]
no visible text in the image
图中没有可见文字
Total: $230.00";
        assert_eq!(sanitize(text), "Invoice #4521\nTotal: $230.00");
    }

    #[test]
    fn short_and_symbol_only_lines_are_dropped() {
        let text = "ab\n12345\n---\n... . .\nReal content here\n一二";
        assert_eq!(sanitize(text), "Real content here");
    }

    #[test]
    fn repeated_token_lines_are_dropped() {
        assert_eq!(sanitize("奖牌 奖牌 奖牌 奖牌"), "");
        // Two repeats are still allowed.
        assert_eq!(sanitize("very very"), "very very");
    }

    #[test]
    fn degenerate_repetition_discards_the_whole_unit() {
        // One token claims well over 30% of > 10 tokens, spread across
        // lines so no single-line filter catches it.
        let text = "\
奖牌 one 奖牌 two
奖牌 three 奖牌 four
奖牌 five 奖牌 six";
        assert_eq!(sanitize(text), "");
    }

    #[test]
    fn varied_text_survives_the_repetition_check() {
        let text = "one two three four\nfive six seven eight\nnine ten eleven twelve";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn duplicate_lines_keep_first_occurrence_order() {
        let text = "alpha beta\ngamma delta\nalpha beta\nepsilon zeta";
        assert_eq!(sanitize(text), "alpha beta\ngamma delta\nepsilon zeta");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "Total Due: 230.00",
            "[Processing failed: x]\nInvoice #4521\n12345\nInvoice #4521",
            "奖牌 奖牌 奖牌 奖牌\nsomething real here",
            "",
            "   \n\n\t",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn sanitized_output_never_contains_droplist_lines() {
        let text = "[OCR supplement]\nkept line one\n[图像识别失败]\nkept line two";
        let output = sanitize(text);
        for line in output.lines() {
            assert!(!NOISE_LINE_PATTERNS.is_match(line));
        }
        assert_eq!(output, "kept line one\nkept line two");
    }
}
