//! Deciding what kind of content a unit holds.

use crate::unit::{ContentType, ContentUnit};

/// Minimum trimmed character count for a unit to count as having usable
/// native text. Shorter runs are usually page numbers, stray watermark
/// fragments, or parser noise, and the unit is better served by the image
/// pipeline.
pub const MIN_TEXT_LENGTH: usize = 10;

/// The classification of one content unit.
///
/// Computed fresh for each unit and discarded after routing; never
/// persisted anywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentClassification {
    /// Does the unit carry usable native text?
    pub has_native_text: bool,

    /// Does the unit carry embedded images?
    pub has_images: bool,

    /// Trimmed character count of the native text.
    pub native_text_length: usize,

    /// How many embedded images the unit carries.
    pub image_count: usize,

    /// The derived content type.
    pub content_type: ContentType,
}

/// Classify a content unit.
///
/// This is a pure function of the unit and cannot fail: a unit with no
/// text and no images simply classifies as [`ContentType::Empty`]. Length
/// thresholds count Unicode scalars, not bytes, so CJK text is measured
/// the same way as ASCII.
pub fn classify(unit: &ContentUnit) -> ContentClassification {
    let native_text_length = unit.text.trim().chars().count();
    let has_native_text = native_text_length > MIN_TEXT_LENGTH;
    let image_count = unit.images.len();
    let has_images = image_count > 0;

    let content_type = match (has_native_text, has_images) {
        (true, false) => ContentType::NativeTextOnly,
        (true, true) => ContentType::Mixed,
        (false, true) => ContentType::ImageOnly,
        (false, false) => ContentType::Empty,
    };

    ContentClassification {
        has_native_text,
        has_images,
        native_text_length,
        image_count,
        content_type,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn unit(text: &str, image_count: usize) -> ContentUnit {
        ContentUnit {
            id: "u1".to_owned(),
            position: 0,
            text: text.to_owned(),
            images: (0..image_count).map(|_| Arc::new(vec![0u8; 4])).collect(),
            geometry: None,
        }
    }

    #[test]
    fn content_type_is_a_pure_function_of_text_and_images() {
        let cases = [
            ("Invoice #4521, Total: $230.00", 0, ContentType::NativeTextOnly),
            ("Invoice #4521, Total: $230.00", 2, ContentType::Mixed),
            ("", 1, ContentType::ImageOnly),
            ("", 0, ContentType::Empty),
        ];
        for (text, images, expected) in cases {
            assert_eq!(classify(&unit(text, images)).content_type, expected);
        }
    }

    #[test]
    fn short_text_does_not_count_as_native_text() {
        // Exactly MIN_TEXT_LENGTH characters is still too short.
        let classification = classify(&unit("0123456789", 0));
        assert!(!classification.has_native_text);
        assert_eq!(classification.content_type, ContentType::Empty);

        let classification = classify(&unit("0123456789a", 0));
        assert!(classification.has_native_text);
        assert_eq!(classification.content_type, ContentType::NativeTextOnly);
    }

    #[test]
    fn text_length_counts_characters_not_bytes() {
        // Eleven CJK characters are 33 bytes but must still pass the
        // threshold.
        let classification = classify(&unit("发票编号四五二一总计贰", 0));
        assert_eq!(classification.native_text_length, 11);
        assert!(classification.has_native_text);
    }

    #[test]
    fn whitespace_only_text_classifies_as_empty() {
        let classification = classify(&unit("   \n\t  \n", 0));
        assert!(!classification.has_native_text);
        assert_eq!(classification.native_text_length, 0);
        assert_eq!(classification.content_type, ContentType::Empty);
    }
}
