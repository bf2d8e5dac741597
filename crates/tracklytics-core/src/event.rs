use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attribution::Attribution;
use crate::visitor::DeviceClass;

/// The payload the tracking script sends to `POST /api/event`.
///
/// The script uses one-letter keys to keep beacons small; the long names are
/// accepted as aliases for hand-written clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectPayload {
    #[serde(rename = "n", alias = "name")]
    pub name: String,
    #[serde(rename = "u", alias = "url")]
    pub url: String,
    #[serde(rename = "r", alias = "referrer", default)]
    pub referrer: Option<String>,
    /// Viewport size as `"<width>x<height>"`.
    #[serde(rename = "v", alias = "viewport", default)]
    pub viewport: Option<String>,
    #[serde(rename = "p", alias = "props", default)]
    pub props: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(rename = "$", alias = "revenue", default)]
    pub revenue: Option<Revenue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revenue {
    pub amount: f64,
    pub currency: String,
}

/// `pageview` is the only name the sessionizer counts as a page view; every
/// other name is a custom event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    Pageview,
    Custom(String),
}

impl EventName {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" => None,
            "pageview" => Some(Self::Pageview),
            other => Some(Self::Custom(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pageview => "pageview",
            Self::Custom(name) => name,
        }
    }

    pub fn is_pageview(&self) -> bool {
        matches!(self, Self::Pageview)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An enriched, stored event. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub identity: String,
    pub name: EventName,
    /// Destination reduced to scheme + host + path.
    pub url: String,
    pub attribution: Attribution,
    pub props: serde_json::Map<String, serde_json::Value>,
    pub revenue: Option<Revenue>,
    pub created_at: DateTime<Utc>,
}

/// Per-identity client profile, written once on the identity's first event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity: String,
    pub language: Option<String>,
    pub country: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_class: DeviceClass,
    pub created_at: DateTime<Utc>,
}
