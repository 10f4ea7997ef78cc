#![deny(clippy::unwrap_used)]

use log_error::LogError;
use scraper::{ElementRef, Html};

pub mod catalog;
pub mod control;
pub mod export;
pub mod fields;
pub mod history;
pub mod progress;
pub mod row;
pub mod settings;
pub mod units;
pub mod uploader;

/// Strips markup from a description, decoding HTML entities along the way.
/// Script and style bodies are dropped, not rendered as text.
pub fn strip_html(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(input);
    let mut out = String::new();
    for node in fragment.root_element().descendants() {
        if let Some(text) = node.value().as_text() {
            let skipped = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|el| matches!(el.value().name(), "script" | "style"));
            if !skipped {
                out.push_str(text);
            }
        }
    }
    out.trim().to_string()
}

/// Parses a schedule interval like "24h" or "30m"; None when disabled or
/// unparseable.
pub fn parse_schedule(raw: &str) -> Option<std::time::Duration> {
    duration_str::parse(raw.trim()).log_error("Unable to parse schedule interval")
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn strips_tags_and_decodes_entities() {
        assert_eq!(
            "Soft & warm",
            strip_html("<p>Soft <b>&amp;</b> warm</p>")
        );
        assert_eq!("", strip_html(""));
        assert_eq!("plain", strip_html("plain"));
    }

    #[test]
    fn drops_script_and_style_bodies() {
        assert_eq!(
            "Visible",
            strip_html("<style>.a { color: red }</style>Visible<script>alert(1)</script>")
        );
    }

    #[test]
    fn parses_schedule_intervals() {
        assert_eq!(
            Some(std::time::Duration::from_secs(86400)),
            parse_schedule("24h")
        );
        assert_eq!(
            Some(std::time::Duration::from_secs(1800)),
            parse_schedule("30m")
        );
        assert_eq!(None, parse_schedule("sometimes"));
    }
}
