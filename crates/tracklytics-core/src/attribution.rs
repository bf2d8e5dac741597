//! Referrer and UTM extraction from the destination URL of an event.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utm {
    pub source: String,
    pub medium: String,
    pub campaign: String,
    pub term: String,
    pub content: String,
}

/// How a visitor arrived at the destination.
///
/// `Campaign` only exists when `utm_source` was present, and `Referral` only
/// when the destination carried an explicit `ref` parameter, so consumers
/// never have to guess whether half-filled UTM fields are meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attribution {
    /// No campaign parameters. `referrer` is the reduced `Referer` value, if any.
    Direct { referrer: Option<String> },
    /// `utm_source` present without `ref`.
    Campaign { referrer: Option<String>, utm: Utm },
    /// `ref` present: it replaces the referrer and UTM fields are copied as-is.
    Referral { referrer: String, utm: Utm },
}

impl Attribution {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::Campaign { .. } => "campaign",
            Self::Referral { .. } => "referral",
        }
    }

    pub fn referrer(&self) -> Option<&str> {
        match self {
            Self::Direct { referrer } | Self::Campaign { referrer, .. } => referrer.as_deref(),
            Self::Referral { referrer, .. } => Some(referrer),
        }
    }

    pub fn utm(&self) -> Option<&Utm> {
        match self {
            Self::Direct { .. } => None,
            Self::Campaign { utm, .. } | Self::Referral { utm, .. } => Some(utm),
        }
    }

    /// Rebuild an attribution from its stored columns. Unknown kinds and a
    /// referral without a referrer degrade to `Direct`.
    pub fn from_parts(kind: &str, referrer: Option<String>, utm: Utm) -> Self {
        match (kind, referrer) {
            ("campaign", referrer) => Self::Campaign { referrer, utm },
            ("referral", Some(referrer)) => Self::Referral { referrer, utm },
            (_, referrer) => Self::Direct { referrer },
        }
    }
}

/// A destination URL reduced for storage together with its attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub url: String,
    pub attribution: Attribution,
}

/// Parse the destination `url` and the raw `referrer` of an event.
///
/// Both URLs are reduced to scheme + host + path. An empty referrer counts as
/// absent; an unparseable one is rejected like an unparseable destination.
pub fn extract(url: &str, referrer: Option<&str>) -> Result<Destination, CoreError> {
    let location = parse_url(url)?;

    let mut ref_param: Option<String> = None;
    let mut utm = Utm::default();
    for (key, value) in location.query_pairs() {
        // First occurrence of each parameter wins.
        let slot = match key.as_ref() {
            "ref" => {
                if ref_param.is_none() && !value.is_empty() {
                    ref_param = Some(value.into_owned());
                }
                continue;
            }
            "utm_source" => &mut utm.source,
            "utm_medium" => &mut utm.medium,
            "utm_campaign" => &mut utm.campaign,
            "utm_term" => &mut utm.term,
            "utm_content" => &mut utm.content,
            _ => continue,
        };
        if slot.is_empty() {
            *slot = value.into_owned();
        }
    }

    let attribution = match ref_param {
        Some(referrer) => Attribution::Referral { referrer, utm },
        None => {
            let referrer = match referrer.map(str::trim).filter(|r| !r.is_empty()) {
                Some(raw) => Some(reduce(&parse_url(raw)?)),
                None => None,
            };
            if utm.source.is_empty() {
                Attribution::Direct { referrer }
            } else {
                Attribution::Campaign { referrer, utm }
            }
        }
    };

    Ok(Destination {
        url: reduce(&location),
        attribution,
    })
}

fn parse_url(raw: &str) -> Result<Url, CoreError> {
    Url::parse(raw.trim()).map_err(|source| CoreError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

/// `scheme://host[:port]/path`, dropping credentials, query and fragment.
fn reduce(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}
