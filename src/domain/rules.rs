// ============================================================
// FIELD RULES
// ============================================================
// Declarative validation and sanitization contract per CSV column

use once_cell::sync::Lazy;
use regex::Regex;

/// Page statuses a row may declare.
pub const ALLOWED_STATUSES: [&str; 4] = ["draft", "publish", "private", "pending"];

static SLUG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

static IMAGE_URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://.+\.(jpg|jpeg|png|gif|webp)$").unwrap());

static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static SCRIPT_BLOCK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>|<script[^>]*/?>").unwrap());

static IFRAME_BLOCK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<iframe[^>]*>.*?</iframe>|<iframe[^>]*/?>").unwrap());

static EVENT_ATTR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\s+on\w+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).unwrap());

static SCRIPT_PROTOCOL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(javascript|vbscript):").unwrap());

static WHITESPACE_RUN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// How a field value is cleaned before the rule checks run.
///
/// A closed set dispatched by match; rules reference a variant rather
/// than a function name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sanitizer {
    /// Strip all markup and collapse whitespace
    PlainText,
    /// Keep ordinary markup, remove scripts and event handlers
    RichText,
    /// Reduce to lowercase letters, digits, and hyphens
    Slug,
    /// Remove whitespace and control characters
    Url,
}

impl Sanitizer {
    pub fn apply(&self, value: &str) -> String {
        match self {
            Sanitizer::PlainText => {
                let stripped = TAG_PATTERN.replace_all(value, "");
                WHITESPACE_RUN_PATTERN
                    .replace_all(stripped.trim(), " ")
                    .to_string()
            }
            Sanitizer::RichText => {
                let mut cleaned = SCRIPT_BLOCK_PATTERN.replace_all(value, "").to_string();
                cleaned = IFRAME_BLOCK_PATTERN.replace_all(&cleaned, "").to_string();
                cleaned = EVENT_ATTR_PATTERN.replace_all(&cleaned, "").to_string();
                cleaned = SCRIPT_PROTOCOL_PATTERN.replace_all(&cleaned, "").to_string();
                cleaned.trim().to_string()
            }
            Sanitizer::Slug => slugify(value),
            Sanitizer::Url => value
                .chars()
                .filter(|c| !c.is_whitespace() && !c.is_control())
                .collect(),
        }
    }
}

/// Turn arbitrary text into a slug of lowercase letters, digits, and hyphens.
pub fn slugify(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Validation contract for one CSV column.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: &'static str,
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<&'static Regex>,
    pub allowed: Option<&'static [&'static str]>,
    pub default: Option<&'static str>,
    pub sanitizer: Sanitizer,
}

/// The fixed rule set applied to every row.
pub static FIELD_RULES: Lazy<Vec<FieldRule>> = Lazy::new(|| {
    vec![
        FieldRule {
            name: "title",
            required: true,
            min_length: Some(1),
            max_length: Some(255),
            pattern: None,
            allowed: None,
            default: None,
            sanitizer: Sanitizer::PlainText,
        },
        FieldRule {
            name: "description",
            required: true,
            min_length: Some(1),
            max_length: Some(65_535),
            pattern: None,
            allowed: None,
            default: None,
            sanitizer: Sanitizer::RichText,
        },
        FieldRule {
            name: "slug",
            required: false,
            min_length: None,
            max_length: Some(200),
            pattern: Some(&SLUG_PATTERN),
            allowed: None,
            default: None,
            sanitizer: Sanitizer::Slug,
        },
        FieldRule {
            name: "status",
            required: false,
            min_length: None,
            max_length: None,
            pattern: None,
            allowed: Some(&ALLOWED_STATUSES),
            default: Some("draft"),
            sanitizer: Sanitizer::PlainText,
        },
        FieldRule {
            name: "categories",
            required: false,
            min_length: None,
            max_length: Some(500),
            pattern: None,
            allowed: None,
            default: None,
            sanitizer: Sanitizer::PlainText,
        },
        FieldRule {
            name: "meta_description",
            required: false,
            min_length: None,
            max_length: Some(160),
            pattern: None,
            allowed: None,
            default: None,
            sanitizer: Sanitizer::PlainText,
        },
        FieldRule {
            name: "featured_image_url",
            required: false,
            min_length: None,
            max_length: Some(2048),
            pattern: Some(&IMAGE_URL_PATTERN),
            allowed: None,
            default: None,
            sanitizer: Sanitizer::Url,
        },
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_strips_markup() {
        assert_eq!(
            Sanitizer::PlainText.apply("  Hello <b>world</b>  "),
            "Hello world"
        );
        assert_eq!(Sanitizer::PlainText.apply("a\n\tb   c"), "a b c");
    }

    #[test]
    fn test_rich_text_keeps_ordinary_markup() {
        let input = "<p>Keep <strong>this</strong></p><script>alert(1)</script>";
        assert_eq!(
            Sanitizer::RichText.apply(input),
            "<p>Keep <strong>this</strong></p>"
        );
    }

    #[test]
    fn test_rich_text_removes_event_handlers() {
        let input = r#"<img src="x.png" onerror="steal()">"#;
        assert_eq!(Sanitizer::RichText.apply(input), r#"<img src="x.png">"#);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Already-ok  "), "already-ok");
        assert_eq!(slugify("Ünïcode Títle"), "n-code-t-tle");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_url_sanitizer_drops_whitespace() {
        assert_eq!(
            Sanitizer::Url.apply(" https://example.com/a b.png\n"),
            "https://example.com/ab.png"
        );
    }

    #[test]
    fn test_image_url_pattern_is_case_insensitive() {
        assert!(IMAGE_URL_PATTERN.is_match("https://example.com/pic.JPG"));
        assert!(IMAGE_URL_PATTERN.is_match("http://example.com/a/b.webp"));
        assert!(!IMAGE_URL_PATTERN.is_match("https://example.com/doc.pdf"));
        assert!(!IMAGE_URL_PATTERN.is_match("ftp://example.com/pic.png"));
    }

    #[test]
    fn test_rule_table_covers_every_column() {
        let names: Vec<_> = FIELD_RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                "title",
                "description",
                "slug",
                "status",
                "categories",
                "meta_description",
                "featured_image_url"
            ]
        );
    }
}
