//! Normative/informative detection for standards text

use crate::model::Normativity;
use once_cell::sync::Lazy;
use regex::Regex;

// Explicit section markers take precedence over keyword detection
static NORMATIVE_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(normative\)").expect("valid regex"));

static INFORMATIVE_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(informative\)").expect("valid regex"));

// RFC 2119 binding keywords
static NORMATIVE_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(SHALL|MUST|REQUIRED|SHOULD|RECOMMENDED)\b").expect("valid regex"));

static INFORMATIVE_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(MAY|OPTIONAL|CAN|NOTE|EXAMPLE|INFORMATIVE)\b").expect("valid regex"));

/// Classify text as normative, informative, or unknown
///
/// Detection rules in priority order:
/// 1. Explicit section markers "(normative)" / "(informative)" in the
///    section path or body
/// 2. Normative keywords (SHALL, MUST, REQUIRED, SHOULD, RECOMMENDED)
/// 3. Informative keywords (MAY, OPTIONAL, CAN, NOTE, EXAMPLE, INFORMATIVE)
/// 4. Unknown when no marker is found
pub fn detect_normativity(text: &str, section_path: &str) -> Normativity {
    if NORMATIVE_SECTION.is_match(section_path) || NORMATIVE_SECTION.is_match(text) {
        return Normativity::Normative;
    }

    if INFORMATIVE_SECTION.is_match(section_path) || INFORMATIVE_SECTION.is_match(text) {
        return Normativity::Informative;
    }

    if NORMATIVE_KEYWORDS.is_match(text) {
        return Normativity::Normative;
    }

    if INFORMATIVE_KEYWORDS.is_match(text) {
        return Normativity::Informative;
    }

    Normativity::Unknown
}
