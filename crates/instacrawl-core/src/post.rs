use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One indexed post, as written to index.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Post shortcode from the metadata file
    pub shortcode: Option<String>,
    /// `taken_at_timestamp` (UTC epoch seconds)
    pub timestamp: Option<i64>,
    /// Filename stem before `_UTC`, e.g. `2020-09-13_12-26-40`
    pub date_str: String,
    /// First caption edge text, empty when absent
    pub caption: String,
    /// Path of the matched image, joined onto the scanned directory
    pub image_path: String,
}

impl PostRecord {
    /// When the post was taken: the metadata timestamp, falling back to the filename date.
    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        if let Some(ts) = self.timestamp {
            if let Some(dt) = DateTime::from_timestamp(ts, 0) {
                return Some(dt);
            }
        }
        NaiveDateTime::parse_from_str(&self.date_str, "%Y-%m-%d_%H-%M-%S")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: Option<i64>, date_str: &str) -> PostRecord {
        PostRecord {
            shortcode: None,
            timestamp,
            date_str: date_str.to_string(),
            caption: String::new(),
            image_path: "x.jpg".to_string(),
        }
    }

    #[test]
    fn test_taken_at_prefers_timestamp() {
        let r = record(Some(1_600_000_000), "1999-01-01_00-00-00");
        assert_eq!(r.taken_at().unwrap().timestamp(), 1_600_000_000);
    }

    #[test]
    fn test_taken_at_falls_back_to_date_str() {
        let r = record(None, "2020-09-13_12-26-40");
        let dt = r.taken_at().unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2020-09-13 12:26:40");

        assert!(record(None, "").taken_at().is_none());
    }

    #[test]
    fn test_serializes_missing_fields_as_null() {
        let json = serde_json::to_value(record(None, "")).unwrap();
        assert!(json["shortcode"].is_null());
        assert!(json["timestamp"].is_null());
        assert_eq!(json["caption"], "");
    }
}
