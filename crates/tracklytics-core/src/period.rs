use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;

/// Reporting period selected by the `period` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Period {
    #[serde(rename = "hour")]
    Hour,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

/// Calendar unit of one graph bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Day,
}

impl Granularity {
    pub fn step(self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
        }
    }

    /// Start of the bucket containing `at`.
    pub fn truncate(self, at: DateTime<Utc>) -> DateTime<Utc> {
        at.duration_trunc(self.step()).unwrap_or(at)
    }

    /// First bucket boundary strictly after `at`.
    pub fn next_boundary(self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.truncate(at).checked_add_signed(self.step())
    }
}

impl Period {
    /// Parse a period keyword. Unknown or missing keywords give `None` so each
    /// endpoint can apply its own default.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim)? {
            "hour" => Some(Self::Hour),
            "24h" => Some(Self::Day),
            "7d" => Some(Self::Week),
            "30d" => Some(Self::Month),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "24h",
            Self::Week => "7d",
            Self::Month => "30d",
        }
    }

    /// Length of the stats range for this period.
    pub fn duration(self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::hours(24),
            Self::Week => Duration::days(7),
            Self::Month => Duration::days(30),
        }
    }

    /// Graph buckets: hourly for the short windows, daily otherwise.
    pub fn granularity(self) -> Granularity {
        match self {
            Self::Hour | Self::Day => Granularity::Hour,
            Self::Week | Self::Month => Granularity::Day,
        }
    }

    /// Fixed number of graph buckets.
    pub fn bucket_count(self) -> usize {
        match self {
            Self::Hour | Self::Day => 24,
            Self::Week => 7,
            Self::Month => 30,
        }
    }
}
