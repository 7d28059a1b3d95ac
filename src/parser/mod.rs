//! JSON-LD extraction from raw HTML.

pub mod generic;

pub use generic::GenericExtractor;

use crate::constants::JSON_LD_CONTENT_TYPE;
use crate::error::ParseError;
use crate::types::RawStructuredRecord;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

static SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script[type]").expect("script selector is valid"));

/// Wrappers some pages put around the JSON inside the script tag.
/// Longer variants first so `//<![CDATA[` doesn't leave a stray `//`.
const LEADING_ARTIFACTS: [&str; 3] = ["//<![CDATA[", "<![CDATA[", "<!--"];
const TRAILING_ARTIFACTS: [&str; 3] = ["//]]>", "]]>", "-->"];

/// Every decodable JSON-LD record on the page, in document order.
///
/// Blocks that fail to decode are logged and skipped; a page without any
/// structured data yields an empty list.
pub fn extract_structured_records(html: &str) -> Vec<RawStructuredRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    let blocks = document
        .select(&SCRIPT_SELECTOR)
        .filter(|script| {
            script
                .value()
                .attr("type")
                .map(is_json_ld_type)
                .unwrap_or(false)
        })
        .map(|script| script.text().collect::<String>());

    for (index, block) in blocks.enumerate() {
        match decode_block(index, &block) {
            Ok(value) => push_records(value, &mut records),
            Err(e) => warn!(error = %e, "skipping structured data block"),
        }
    }

    debug!(count = records.len(), "extracted structured data records");
    records
}

fn is_json_ld_type(declared: &str) -> bool {
    declared
        .split(';')
        .next()
        .map(|t| t.trim().eq_ignore_ascii_case(JSON_LD_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Peel wrapper markers off both ends of the block. Anything inside the
/// JSON itself, string values included, is left alone.
fn strip_artifacts(block: &str) -> &str {
    let mut text = block.trim();
    loop {
        let before = text.len();
        for artifact in LEADING_ARTIFACTS {
            if let Some(rest) = text.strip_prefix(artifact) {
                text = rest.trim_start();
            }
        }
        for artifact in TRAILING_ARTIFACTS {
            if let Some(rest) = text.strip_suffix(artifact) {
                text = rest.trim_end();
            }
        }
        if text.len() == before {
            return text;
        }
    }
}

fn decode_block(index: usize, block: &str) -> Result<Value, ParseError> {
    serde_json::from_str(strip_artifacts(block)).map_err(|source| ParseError::Json { index, source })
}

/// Objects become records; arrays and `@graph` contribute their objects.
fn push_records(value: Value, records: &mut Vec<RawStructuredRecord>) {
    match value {
        Value::Object(mut map) => match map.remove("@graph") {
            Some(Value::Array(graph)) => records.extend(graph.into_iter().filter_map(|v| match v {
                Value::Object(m) => Some(m),
                _ => None,
            })),
            Some(other) => {
                map.insert("@graph".to_string(), other);
                records.push(map);
            }
            None => records.push(map),
        },
        Value::Array(items) => {
            for item in items {
                if let Value::Object(map) = item {
                    records.push(map);
                }
            }
        }
        other => debug!(kind = ?other, "ignoring non-object structured data"),
    }
}
