use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A durable record of a created environment.
///
/// Fields this version doesn't know are kept in `extra` and written back unchanged, so
/// older and newer files stay compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// The workload's addressable database name.
    pub identity: String,
    pub port: u16,
    pub version: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HistoryRecord {
    pub fn same_environment(&self, other: &HistoryRecord) -> bool {
        self.identity == other.identity && self.port == other.port
    }
}

/// Removes every record with the same (identity, port) and prepends `record`.
pub fn upsert(records: &mut Vec<HistoryRecord>, record: HistoryRecord) {
    records.retain(|r| !r.same_environment(&record));
    records.insert(0, record);
}

/// Sorts by `created_at`, newest first.
pub fn newest_first(mut records: Vec<HistoryRecord>) -> Vec<HistoryRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(identity: &str, port: u16, version: &str) -> HistoryRecord {
        HistoryRecord {
            identity: identity.into(),
            port,
            version: version.into(),
            url: format!("http://localhost:{port}"),
            created_at: Utc::now(),
            extra: Default::default(),
        }
    }

    #[test]
    fn upsert_replaces_same_identity_and_port() {
        let mut records = vec![record("a-db", 1000, "17.0"), record("b-db", 2000, "17.0")];
        upsert(&mut records, record("b-db", 2000, "19.0"));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identity, "b-db");
        assert_eq!(records[0].version, "19.0");
        assert_eq!(records.iter().filter(|r| r.identity == "b-db").count(), 1);
    }

    #[test]
    fn upsert_keeps_same_identity_on_other_port() {
        let mut records = vec![record("a-db", 1000, "17.0")];
        upsert(&mut records, record("a-db", 1001, "17.0"));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn newest_first_orders_by_creation() {
        let mut old = record("old", 1, "17.0");
        old.created_at = Utc::now() - Duration::hours(1);
        let new = record("new", 2, "19.0");

        let sorted = newest_first(vec![old, new]);
        assert_eq!(sorted[0].identity, "new");
    }

    #[test]
    fn unknown_fields_are_kept() {
        let raw = r#"{"identity":"x","port":1,"version":"19.0","url":"u",
                      "created_at":"2026-01-01T00:00:00Z","owner":"someone"}"#;
        let rec: HistoryRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(rec.identity, "x");
        assert_eq!(rec.extra["owner"], "someone");

        let written = serde_json::to_value(&rec).unwrap();
        assert_eq!(written["owner"], "someone");
        assert_eq!(written["port"], 1);
    }
}
