use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Timestamp as used by the race API. The remote side emits both RFC3339
/// strings and naive `YYYY-MM-DDTHH:MM:SS` timestamps, the latter taken as UTC.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct RtDateTime(pub DateTime<FixedOffset>);

impl RtDateTime {
    pub fn now() -> Self {
        Self::from_fixed_offset(chrono::Local::now().fixed_offset())
    }
    pub fn from_fixed_offset(datetime: DateTime<FixedOffset>) -> RtDateTime {
        let millis = datetime.timestamp_subsec_millis();
        let nanos = datetime.timestamp_subsec_nanos() - millis * 1_000_000;
        if let Some(dt) = datetime.checked_sub_signed(TimeDelta::nanoseconds(nanos as i64)) {
            RtDateTime(dt)
        } else {
            RtDateTime(datetime)
        }
    }
    pub fn to_display_string(self) -> String {
        self.0.format("%F %T").to_string()
    }
    pub fn to_iso_string(self) -> String {
        if self.0.timestamp_subsec_millis() == 0 {
            self.0.to_rfc3339_opts(SecondsFormat::Secs, true)
        } else {
            self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
        }
    }
    pub fn parse_from_string(datetime_str: &str) -> Result<Self, anyhow::Error> {
        let datetime_str = datetime_str.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(datetime_str) {
            return Ok(Self::from_fixed_offset(dt));
        }
        // naive timestamps, with or without seconds
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(datetime_str, format) {
                return Ok(Self::from_fixed_offset(dt.and_utc().fixed_offset()));
            }
        }
        Err(anyhow::anyhow!("Unrecognized date-time string: {datetime_str}"))
    }
}

impl From<DateTime<FixedOffset>> for RtDateTime {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::from_fixed_offset(value)
    }
}
impl From<DateTime<Utc>> for RtDateTime {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_fixed_offset(value.fixed_offset())
    }
}

impl Serialize for RtDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso_string())
    }
}
impl<'de> Deserialize<'de> for RtDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RtDateTime::parse_from_string(&s).map_err(D::Error::custom)
    }
}

pub(crate) fn hhmm(dt: &RtDateTime) -> String {
    dt.0.format("%H:%M").to_string()
}
pub(crate) fn hhmmss(dt: &RtDateTime) -> String {
    dt.0.format("%H:%M:%S").to_string()
}
pub(crate) fn dtstr(iso_date_str: Option<&str>) -> String {
    let Some(s) = iso_date_str else {
        return "---".to_string()
    };
    if let Ok(dt) = RtDateTime::parse_from_string(s) {
        dt.to_display_string()
    } else {
        s.to_string()
    }
}

#[test]
fn test_trimmed_millis() {
    let dt = RtDateTime::now();
    assert_eq!(dt.0.timestamp_subsec_nanos() % 1_000_000, 0);
}

#[test]
fn test_parse_rtdatetime() {
    for (dtstr, dtstr2) in &[
        ("1970-03-05 14:32:45+00:00", "1970-03-05T14:32:45Z"),
        ("2025-03-05T14:32:45Z", "2025-03-05T14:32:45Z"),
        ("2025-03-05 14:32:45+10:00", "2025-03-05T14:32:45+10:00"),
        ("2025-03-05T14:32:45-01:30", "2025-03-05T14:32:45-01:30"),
        // naive timestamps as emitted by the race API
        ("2025-03-05T14:32:45", "2025-03-05T14:32:45Z"),
        ("2025-03-05T14:32:45.565293063", "2025-03-05T14:32:45.565Z"),
        ("2025-03-05 14:32", "2025-03-05T14:32:00Z"),
    ] {
        let dt = RtDateTime::parse_from_string(dtstr)
            .map_err(|e| println!("parse {dtstr} error: {e}")).unwrap();
        assert_eq!(&dt.to_iso_string(), dtstr2)
    }
    assert!(RtDateTime::parse_from_string("14:32").is_err());
}

#[test]
fn test_ordering_compares_instants() {
    let a = RtDateTime::parse_from_string("2024-06-01T14:00:00+02:00").unwrap();
    let b = RtDateTime::parse_from_string("2024-06-01T13:00:00+00:00").unwrap();
    let c = RtDateTime::parse_from_string("2024-06-01T12:30:00Z").unwrap();
    assert_eq!(a, b);
    assert!(c < a);
}
