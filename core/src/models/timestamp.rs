//! Serde adapter for snapshot timestamps.
//!
//! The bot has shipped timestamps in several shapes over time: RFC 3339
//! strings, naive ISO strings (implicitly UTC) and epoch milliseconds. All of
//! them decode into `DateTime<Utc>`; encoding always produces RFC 3339.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer, de::Error};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    FractionalMillis(f64),
    Text(String),
}

pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(ms) => from_millis(ms)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}"))),
        RawTimestamp::FractionalMillis(ms) if ms.is_finite() => from_millis(ms.trunc() as i64)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}"))),
        RawTimestamp::FractionalMillis(ms) => {
            Err(D::Error::custom(format!("invalid timestamp: {ms}")))
        }
        RawTimestamp::Text(text) => parse_text(&text).map_err(D::Error::custom),
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn parse_text(text: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("unrecognised timestamp {text:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        ts: DateTime<Utc>,
    }

    fn decode(raw: serde_json::Value) -> Result<DateTime<Utc>, serde_json::Error> {
        serde_json::from_value::<Wrapper>(serde_json::json!({ "ts": raw })).map(|w| w.ts)
    }

    #[test]
    fn accepts_every_known_shape() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        assert_eq!(decode("2024-05-01T12:00:00Z".into()).unwrap(), expected);
        assert_eq!(decode("2024-05-01T14:00:00+02:00".into()).unwrap(), expected);
        assert_eq!(decode("2024-05-01T12:00:00.000".into()).unwrap(), expected);
        assert_eq!(decode("2024-05-01 12:00:00".into()).unwrap(), expected);
        assert_eq!(decode(1_714_564_800_000_i64.into()).unwrap(), expected);
        assert_eq!(decode(1_714_564_800_000.4_f64.into()).unwrap(), expected);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("yesterday".into()).is_err());
        assert!(decode(serde_json::Value::Null).is_err());
    }

    #[test]
    fn encodes_rfc3339_with_millis() {
        let w = Wrapper {
            ts: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };
        let out = serde_json::to_value(&w).unwrap();

        assert_eq!(out["ts"], "2024-05-01T12:00:00.000Z");
    }
}
