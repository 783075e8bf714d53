//! Tracking sheet (`tracking.csv`)
//!
//! One row per completed typing session. The sheet is always rewritten
//! whole with the canonical header, so rows read from an older sheet are
//! mapped onto [`COLUMNS`] by header name.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{Error, Result};

/// Canonical column order
pub const COLUMNS: [&str; 14] = [
    "timestamp",
    "deviceId",
    "participantId",
    "session",
    "gender",
    "handedness",
    "totalKeys",
    "typingSpeed",
    "typingCategory",
    "browser",
    "browserVersion",
    "os",
    "osVersion",
    "deviceType",
];

const NOT_AVAILABLE: &str = "N/A";
const UNKNOWN: &str = "Unknown";

/// Browser or OS description reported by the client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub device_type: Option<String>,
}

/// Fields submitted for one tracking row
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEntry {
    pub device_id: Option<String>,
    pub participant_id: Option<String>,
    pub session: Option<Value>,
    pub gender: Option<String>,
    pub handedness: Option<String>,
    pub total_keys: Option<Value>,
    pub typing_speed: Option<Value>,
    pub typing_category: Option<String>,
    pub browser_info: Option<ClientInfo>,
    pub os_info: Option<ClientInfo>,
}

/// A fully populated row in [`COLUMNS`] order
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingRow(Vec<String>);

impl TrackingRow {
    /// Build a row, filling defaults for optional fields
    pub fn from_entry(entry: &TrackingEntry, now: DateTime<Utc>) -> Result<Self> {
        let device_id = required_text(entry.device_id.as_deref());
        let participant_id = required_text(entry.participant_id.as_deref());
        let session = entry.session.as_ref().and_then(scalar_text);

        let (device_id, participant_id, session) = match (device_id, participant_id, session) {
            (Some(d), Some(p), Some(s)) => (d, p, s),
            _ => {
                return Err(Error::InvalidInput(
                    "Missing required fields: deviceId, participantId, or session".to_string(),
                ))
            }
        };

        let browser = entry.browser_info.clone().unwrap_or_default();
        let os = entry.os_info.clone().unwrap_or_default();

        Ok(TrackingRow(vec![
            now.to_rfc3339_opts(SecondsFormat::Millis, true),
            device_id.to_string(),
            participant_id.to_string(),
            session,
            or_default(entry.gender.as_deref(), NOT_AVAILABLE),
            or_default(entry.handedness.as_deref(), NOT_AVAILABLE),
            entry.total_keys.as_ref().and_then(scalar_text).unwrap_or_else(|| "0".to_string()),
            entry.typing_speed.as_ref().and_then(scalar_text).unwrap_or_else(|| "0".to_string()),
            or_default(entry.typing_category.as_deref(), NOT_AVAILABLE),
            or_default(browser.name.as_deref(), UNKNOWN),
            or_default(browser.version.as_deref(), UNKNOWN),
            or_default(os.name.as_deref(), UNKNOWN),
            or_default(os.version.as_deref(), UNKNOWN),
            or_default(browser.device_type.as_deref(), UNKNOWN),
        ]))
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        let index = COLUMNS.iter().position(|c| *c == column)?;
        self.0.get(index).map(String::as_str)
    }
}

/// All rows of the tracking sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingSheet {
    rows: Vec<TrackingRow>,
}

impl TrackingSheet {
    /// Parse an existing sheet; the first line is the header
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        let positions: Vec<Option<usize>> = COLUMNS
            .iter()
            .map(|column| headers.iter().position(|h| h.trim() == *column))
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            let row = positions
                .iter()
                .map(|pos| pos.and_then(|i| record.get(i)).unwrap_or("").to_string())
                .collect();
            rows.push(TrackingRow(row));
        }

        Ok(Self { rows })
    }

    /// Parse `text`, or start an empty sheet if it is unreadable
    pub fn parse_or_fresh(text: &str) -> Self {
        match Self::parse(text) {
            Ok(sheet) => sheet,
            Err(e) => {
                warn!(error = %e, "Tracking sheet unreadable, starting fresh");
                Self::default()
            }
        }
    }

    pub fn push(&mut self, row: TrackingRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[TrackingRow] {
        &self.rows
    }

    /// Render the sheet with the canonical header
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(COLUMNS)?;
        for row in &self.rows {
            writer.write_record(&row.0)?;
        }
        let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| Error::Internal(e.to_string()))
    }
}

fn required_text(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn or_default(value: Option<&str>, default: &str) -> String {
    required_text(value).unwrap_or(default).to_string()
}

/// Render a JSON scalar the way it should appear in a cell
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn entry(value: Value) -> TrackingEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_row_fills_defaults() {
        let row = TrackingRow::from_entry(
            &entry(json!({ "deviceId": "d1", "participantId": "U001", "session": 2 })),
            now(),
        )
        .unwrap();

        assert_eq!(row.get("timestamp"), Some("2025-03-01T12:00:00.000Z"));
        assert_eq!(row.get("session"), Some("2"));
        assert_eq!(row.get("gender"), Some("N/A"));
        assert_eq!(row.get("totalKeys"), Some("0"));
        assert_eq!(row.get("browser"), Some("Unknown"));
        assert_eq!(row.get("deviceType"), Some("Unknown"));
    }

    #[test]
    fn test_row_flattens_client_info() {
        let row = TrackingRow::from_entry(
            &entry(json!({
                "deviceId": "d1",
                "participantId": "U001",
                "session": "1",
                "totalKeys": 1234,
                "typingSpeed": 61.5,
                "browserInfo": { "name": "Firefox", "version": "128", "deviceType": "desktop" },
                "osInfo": { "name": "Linux" }
            })),
            now(),
        )
        .unwrap();

        assert_eq!(row.get("totalKeys"), Some("1234"));
        assert_eq!(row.get("typingSpeed"), Some("61.5"));
        assert_eq!(row.get("browser"), Some("Firefox"));
        assert_eq!(row.get("browserVersion"), Some("128"));
        assert_eq!(row.get("deviceType"), Some("desktop"));
        assert_eq!(row.get("os"), Some("Linux"));
        assert_eq!(row.get("osVersion"), Some("Unknown"));
    }

    #[test]
    fn test_row_requires_identity_fields() {
        let missing_session = entry(json!({ "deviceId": "d1", "participantId": "U001" }));
        assert!(matches!(
            TrackingRow::from_entry(&missing_session, now()),
            Err(Error::InvalidInput(_))
        ));

        let blank_device = entry(json!({ "deviceId": " ", "participantId": "U001", "session": 1 }));
        assert!(TrackingRow::from_entry(&blank_device, now()).is_err());
    }

    #[test]
    fn test_sheet_appends_and_rereads() {
        let mut sheet = TrackingSheet::parse("").unwrap();
        assert!(sheet.is_empty());

        for session in 1..=2 {
            sheet.push(
                TrackingRow::from_entry(
                    &entry(json!({ "deviceId": "d1", "participantId": "U001", "session": session })),
                    now(),
                )
                .unwrap(),
            );
        }

        let text = sheet.to_csv().unwrap();
        assert!(text.starts_with("timestamp,deviceId,participantId,session,"));

        let reread = TrackingSheet::parse(&text).unwrap();
        assert_eq!(reread, sheet);
    }

    #[test]
    fn test_sheet_maps_columns_by_header_and_skips_blank_lines() {
        let text = "participantId,deviceId,session\nU007,dev,3\n,,\n";
        let sheet = TrackingSheet::parse(text).unwrap();

        assert_eq!(sheet.len(), 1);
        let row = &sheet.rows()[0];
        assert_eq!(row.get("participantId"), Some("U007"));
        assert_eq!(row.get("deviceId"), Some("dev"));
        assert_eq!(row.get("gender"), Some(""));
    }

    #[test]
    fn test_malformed_sheet_starts_fresh() {
        let text = "a,b\n1,2,3\n";
        assert!(TrackingSheet::parse(text).is_err());
        assert!(TrackingSheet::parse_or_fresh(text).is_empty());
    }
}
