//! Mapping from the fetcher's per-post metadata layout to [`PostRecord`].
//!
//! Everything that depends on the shape of the downloaded files lives here so
//! the directory scan never looks inside a metadata document itself.

use std::fmt;

use serde_json::{Map, Value};

use crate::post::PostRecord;

/// Normalized metadata object: the `node` value or the flat document.
pub type Node = Map<String, Value>;

/// Image extensions tried in order for a metadata base name
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".png"];

/// First image of a multi-image (sidecar) post
const SIDECAR_SUFFIX: &str = "_1.jpg";

const UTC_MARKER: &str = "_UTC";

/// Why a metadata file could not be turned into a [`Node`]
#[derive(Debug)]
pub enum MetadataError {
    Json(serde_json::Error),
    NotAnObject,
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::Json(e) => write!(f, "invalid JSON: {}", e),
            MetadataError::NotAnObject => write!(f, "metadata is not a JSON object"),
        }
    }
}

impl std::error::Error for MetadataError {}

/// Parse a metadata file and normalize it in one step
pub fn parse_metadata(bytes: &[u8]) -> Result<Node, MetadataError> {
    let doc: Value = serde_json::from_slice(bytes).map_err(MetadataError::Json)?;
    normalize(doc)
}

/// Resolve the record object: the value under `node` if present, else the document itself.
pub fn normalize(doc: Value) -> Result<Node, MetadataError> {
    let Value::Object(mut map) = doc else {
        return Err(MetadataError::NotAnObject);
    };
    match map.remove("node") {
        Some(Value::Object(node)) => Ok(node),
        Some(_) => Err(MetadataError::NotAnObject),
        None => Ok(map),
    }
}

/// Image file names to look for, in priority order.
/// The sidecar name is only consulted when no plain image exists.
pub fn image_candidates(base_name: &str) -> Vec<String> {
    let mut names: Vec<String> = IMAGE_EXTENSIONS
        .iter()
        .map(|ext| format!("{}{}", base_name, ext))
        .collect();
    names.push(format!("{}{}", base_name, SIDECAR_SUFFIX));
    names
}

/// `2020-09-13_12-26-40_UTC` -> `2020-09-13_12-26-40`; empty if there is no `_UTC`
pub fn date_str(base_name: &str) -> &str {
    base_name
        .find(UTC_MARKER)
        .map(|pos| &base_name[..pos])
        .unwrap_or("")
}

/// Text of the first caption edge
pub fn caption(node: &Node) -> String {
    node.get("edge_media_to_caption")
        .and_then(|c| c.get("edges"))
        .and_then(Value::as_array)
        .and_then(|edges| edges.first())
        .and_then(|edge| edge.get("node"))
        .and_then(|n| n.get("text"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Build the output record for a metadata node whose image was found.
pub fn to_record(base_name: &str, node: &Node, image_path: String) -> PostRecord {
    PostRecord {
        shortcode: node
            .get("shortcode")
            .and_then(Value::as_str)
            .map(str::to_string),
        timestamp: node.get("taken_at_timestamp").and_then(Value::as_i64),
        date_str: date_str(base_name).to_string(),
        caption: caption(node),
        image_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_nested_and_flat() {
        let nested = normalize(json!({"node": {"shortcode": "A"}})).unwrap();
        assert_eq!(nested["shortcode"], "A");

        let flat = normalize(json!({"shortcode": "B", "taken_at_timestamp": 5})).unwrap();
        assert_eq!(flat["shortcode"], "B");
        assert_eq!(flat["taken_at_timestamp"], 5);
    }

    #[test]
    fn test_normalize_rejects_non_objects() {
        assert!(matches!(normalize(json!([1, 2])), Err(MetadataError::NotAnObject)));
        assert!(matches!(normalize(json!({"node": null})), Err(MetadataError::NotAnObject)));
        assert!(matches!(parse_metadata(b"{not json"), Err(MetadataError::Json(_))));
    }

    #[test]
    fn test_date_str() {
        assert_eq!(date_str("2020-09-13_12-26-40_UTC"), "2020-09-13_12-26-40");
        assert_eq!(date_str("2020-09-13_12-26-40_UTC_extra_UTC"), "2020-09-13_12-26-40");
        assert_eq!(date_str("random"), "");
    }

    #[test]
    fn test_image_candidates_order() {
        assert_eq!(
            image_candidates("x"),
            vec!["x.jpg".to_string(), "x.png".to_string(), "x_1.jpg".to_string()]
        );
    }

    #[test]
    fn test_caption_variants() {
        let with = normalize(json!({"edge_media_to_caption": {"edges": [
            {"node": {"text": "first"}},
            {"node": {"text": "second"}}
        ]}}))
        .unwrap();
        assert_eq!(caption(&with), "first");

        let empty_edges = normalize(json!({"edge_media_to_caption": {"edges": []}})).unwrap();
        assert_eq!(caption(&empty_edges), "");

        let missing = normalize(json!({"shortcode": "x"})).unwrap();
        assert_eq!(caption(&missing), "");

        let no_text = normalize(json!({"edge_media_to_caption": {"edges": [{"node": {}}]}})).unwrap();
        assert_eq!(caption(&no_text), "");
    }

    #[test]
    fn test_to_record() {
        let node = normalize(json!({"node": {
            "shortcode": "TEST12345",
            "taken_at_timestamp": 1600000000,
            "edge_media_to_caption": {"edges": [{"node": {"text": "hello"}}]}
        }}))
        .unwrap();
        let r = to_record("2020-09-13_12-26-40_UTC", &node, "d/2020-09-13_12-26-40_UTC.jpg".into());
        assert_eq!(r.shortcode.as_deref(), Some("TEST12345"));
        assert_eq!(r.timestamp, Some(1600000000));
        assert_eq!(r.date_str, "2020-09-13_12-26-40");
        assert_eq!(r.caption, "hello");
        assert!(r.image_path.ends_with(".jpg"));
    }

    #[test]
    fn test_to_record_missing_fields() {
        let node = normalize(json!({})).unwrap();
        let r = to_record("base", &node, "d/base.png".into());
        assert_eq!(r.shortcode, None);
        assert_eq!(r.timestamp, None);
        assert_eq!(r.date_str, "");
        assert_eq!(r.caption, "");
    }
}
