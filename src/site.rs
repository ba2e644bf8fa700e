//! The concrete listing profile: marker, ignore list, field signatures
//! and converters for the weekly track site.
//!
//! Everything here is plain data against the engine API; the engine knows
//! nothing about this site.

use serde_json::Value;

use crate::engine::{
    ConvertError, ExtractConfig, FieldSpec, MarkerPattern, PatternStep, Signature,
};

/// Production site root.
pub const BASE_URL: &str = "https://weeklybeats.com";

/// A track list item is a `div` whose class starts with `main-item`; its
/// `id` attribute identifies the record.
pub fn marker() -> MarkerPattern {
    MarkerPattern::new("div", "class", "main-item", "id")
}

/// Elements the site emits without ever closing.
pub fn ignore_tags() -> Vec<&'static str> {
    vec!["input", "img", "br", "hr", "meta", "link"]
}

/// Base fields present on every listing item.
pub fn listing_fields() -> Vec<FieldSpec> {
    let subject_anchor = || {
        Signature::new(vec![
            PatternStep::tag("div").class_token("item-subject"),
            PatternStep::tag("h3"),
            PatternStep::tag("a"),
        ])
    };
    vec![
        FieldSpec::text("title", subject_anchor()),
        // track page URL, consumed by enrichment
        FieldSpec::attribute("link", subject_anchor(), "href"),
        FieldSpec::text(
            "artist",
            Signature::new(vec![
                PatternStep::tag("div").class_token("item-starter"),
                PatternStep::tag("a"),
            ]),
        ),
        // the play button carries the audio URL inside an inline script call
        FieldSpec::attribute(
            "url",
            Signature::new(vec![PatternStep::tag("a").class_token("play")]),
            "onclick",
        )
        .with_converter(playlist_url),
    ]
}

/// Watcher fields: week number and live comment count.
pub fn watch_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::text(
            "week",
            Signature::new(vec![
                PatternStep::tag("li").class_token("info-views"),
                PatternStep::tag("strong"),
            ]),
        )
        .with_converter(week_number),
        FieldSpec::text(
            "comments",
            Signature::new(vec![
                PatternStep::tag("li").class_token("info-replies"),
                PatternStep::tag("strong"),
            ]),
        )
        .with_converter(count),
    ]
}

pub fn listing_config() -> ExtractConfig {
    ExtractConfig::new(marker())
        .ignore_tags(ignore_tags())
        .with_fields(listing_fields())
}

/// Listing config plus the watcher fields.
pub fn watch_config() -> ExtractConfig {
    listing_config().extend_fields(watch_fields())
}

/// First single-quoted argument of an inline script call, e.g.
/// `setPlaylistItem('https://…/file.m4a');`.
fn playlist_url(raw: &str) -> Result<Value, ConvertError> {
    raw.split('\'')
        .nth(1)
        .filter(|url| !url.is_empty())
        .map(|url| Value::String(url.to_string()))
        .ok_or_else(|| ConvertError(format!("no quoted URL in script call {raw:?}")))
}

/// `"Week 16"` style label to its number.
fn week_number(raw: &str) -> Result<Value, ConvertError> {
    raw.split_whitespace()
        .last()
        .and_then(|n| n.parse::<i64>().ok())
        .map(Value::from)
        .ok_or_else(|| ConvertError(format!("unparseable week label {raw:?}")))
}

fn count(raw: &str) -> Result<Value, ConvertError> {
    raw.trim()
        .parse::<i64>()
        .map(Value::from)
        .map_err(|err| ConvertError(format!("bad count {raw:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Extractor;

    // trimmed-down listing item in the site's real shape
    const LISTING_ITEM: &str = r#"
        <div class="main-item odd" id="m4012">
            <div class="item-art">
                <a class="play" href="#"
                   onclick="setPlaylistItem('https://weeklybeats.s3.amazonaws.com/music/2026/wangus_week16.m4a');return false;">
                    <img src="/img/play.png">
                </a>
            </div>
            <div class="item-subject">
                <h3><a href="/wangus/music/week-16">Basalt Fields</a></h3>
            </div>
            <div class="item-starter">by <a href="/wangus">wangus</a></div>
            <ul class="item-info">
                <li class="info-views"><strong>Week 16</strong></li>
                <li class="info-replies"><strong>7</strong></li>
            </ul>
        </div>
    "#;

    #[test]
    fn test_full_listing_item() {
        let engine = Extractor::new(watch_config());
        let records = engine.extract(LISTING_ITEM).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, "m4012");
        assert_eq!(record.str_field("title"), Some("Basalt Fields"));
        assert_eq!(record.str_field("link"), Some("/wangus/music/week-16"));
        assert_eq!(record.str_field("artist"), Some("wangus"));
        assert_eq!(
            record.str_field("url"),
            Some("https://weeklybeats.s3.amazonaws.com/music/2026/wangus_week16.m4a")
        );
        assert_eq!(record.int_field("week"), Some(16));
        assert_eq!(record.int_field("comments"), Some(7));
    }

    #[test]
    fn test_playlist_url_converter() {
        let value = playlist_url("setPlaylistItem('https://x/y.m4a');this.blur();").unwrap();
        assert_eq!(value, Value::from("https://x/y.m4a"));
        assert!(playlist_url("void(0)").is_err());
        assert!(playlist_url("f('')").is_err());
    }

    #[test]
    fn test_week_number_converter() {
        assert_eq!(week_number("Week 16").unwrap(), Value::from(16));
        assert_eq!(week_number(" 3 ").unwrap(), Value::from(3));
        assert!(week_number("Week").is_err());
    }

    #[test]
    fn test_count_converter() {
        assert_eq!(count(" 12 ").unwrap(), Value::from(12));
        assert!(count("many").is_err());
    }
}
