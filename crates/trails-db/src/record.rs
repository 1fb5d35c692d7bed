use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Field values keyed by field name.
pub type RecordData = Map<String, Value>;

const ID_LEN: usize = 15;

/// Timestamp layout used for record dates and system timestamps.
/// Lexicographic order matches chronological order.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

/// A stored record of some collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub collection: String,
    pub data: RecordData,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Record {
    /// Value of a field or system column. Missing fields read as null.
    pub fn get(&self, field: &str) -> Value {
        match field {
            "id" => Value::String(self.id.clone()),
            "created" => Value::String(format_datetime(&self.created)),
            "updated" => Value::String(format_datetime(&self.updated)),
            other => self.data.get(other).cloned().unwrap_or(Value::Null),
        }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Flat API representation: system columns followed by field values.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("id".into(), Value::String(self.id.clone()));
        out.insert(
            "collectionName".into(),
            Value::String(self.collection.clone()),
        );
        out.insert("created".into(), self.get("created"));
        out.insert("updated".into(), self.get("updated"));
        for (key, value) in &self.data {
            out.insert(key.clone(), value.clone());
        }
        Value::Object(out)
    }
}

/// Fresh 15-character lowercase alphanumeric record id.
pub fn new_record_id() -> String {
    Uuid::new_v4().simple().to_string()[..ID_LEN].to_string()
}

pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse RFC 3339 or `YYYY-MM-DD HH:MM:SS[.fff]Z`.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let trimmed = s.strip_suffix('Z').unwrap_or(s);
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .ok()
}

/// Build [`RecordData`] from a JSON object literal. Non-objects yield empty data.
pub fn record_data(value: Value) -> RecordData {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_ids_are_short_and_alphanumeric() {
        let id = new_record_id();
        assert_eq!(id.len(), 15);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_record_id());
    }

    #[test]
    fn parses_both_datetime_layouts() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(parse_datetime("2024-01-15 10:00:00.000Z"), Some(expected));
        assert_eq!(parse_datetime("2024-01-15T10:00:00Z"), Some(expected));
        assert_eq!(parse_datetime("2024-01-15 10:00:00"), Some(expected));
        assert_eq!(parse_datetime("January 15th"), None);
    }

    #[test]
    fn formats_with_millisecond_precision() {
        let dt = Utc.with_ymd_and_hms(2024, 2, 28, 9, 0, 0).unwrap();
        assert_eq!(format_datetime(&dt), "2024-02-28 09:00:00.000Z");
    }

    #[test]
    fn json_view_flattens_fields_after_system_columns() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = Record {
            id: "abc".into(),
            collection: "announcements".into(),
            data: record_data(serde_json::json!({"title": "Hi"})),
            created: now,
            updated: now,
        };
        let json = record.to_json();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["collectionName"], "announcements");
        assert_eq!(json["created"], "2024-01-01 00:00:00.000Z");
        assert_eq!(json["title"], "Hi");
        assert_eq!(record.get("missing"), Value::Null);
    }
}
