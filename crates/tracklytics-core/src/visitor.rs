//! Visitor identity and client classification.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::event::IdentityRecord;

const SECONDS_PER_DAY: i64 = 86_400;

/// Explicit configuration for identity resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityConfig {
    pub breakpoints: Breakpoints,
}

/// Viewport width breakpoints, ascending, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoints(pub [u32; 5]);

impl Default for Breakpoints {
    fn default() -> Self {
        Self([640, 768, 1024, 1280, 1536])
    }
}

impl Breakpoints {
    /// Parse a comma-separated list of five ascending widths.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let widths = raw
            .split(',')
            .map(|w| w.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid device breakpoints: {e}"))?;
        let widths: [u32; 5] = widths
            .try_into()
            .map_err(|_| "device breakpoints must list exactly 5 widths".to_string())?;
        if widths.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err("device breakpoints must be strictly ascending".to_string());
        }
        Ok(Self(widths))
    }

    /// Widths below the first breakpoint are mobile; each breakpoint after
    /// that starts the next class, and everything at or above the fourth is a
    /// display.
    pub fn classify(&self, width: u32) -> DeviceClass {
        const CLASSES: [DeviceClass; 5] = [
            DeviceClass::Mobile,
            DeviceClass::Tablet,
            DeviceClass::Laptop,
            DeviceClass::Desktop,
            DeviceClass::Display,
        ];
        let index = self.0.iter().position(|bp| width < *bp).unwrap_or(4);
        CLASSES[index.min(4)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Laptop,
    Desktop,
    Display,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Laptop => "laptop",
            Self::Desktop => "desktop",
            Self::Display => "display",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a `"<width>x<height>"` viewport. Missing or malformed sizes count
/// as desktop.
pub fn classify_viewport(viewport: Option<&str>, breakpoints: &Breakpoints) -> DeviceClass {
    let parsed = viewport.and_then(|v| {
        let (w, h) = v.trim().split_once('x')?;
        let width = w.trim().parse::<u32>().ok()?;
        h.trim().parse::<u32>().ok()?;
        Some(width)
    });
    match parsed {
        Some(width) => breakpoints.classify(width),
        None => DeviceClass::Desktop,
    }
}

/// Request-side inputs for resolving the client address.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientAddr<'a> {
    pub real_ip: Option<&'a str>,
    pub forwarded_for: Option<&'a str>,
    pub remote_addr: Option<&'a str>,
}

/// Pick the client IP: `X-Real-IP`, then the first `X-Forwarded-For` hop,
/// then the connection address. Ports are stripped and loopback spellings
/// collapse to `127.0.0.1`.
pub fn resolve_client_ip(addr: &ClientAddr<'_>) -> String {
    let raw = addr
        .real_ip
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            addr.forwarded_for
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        })
        .or(addr.remote_addr.map(str::trim))
        .unwrap_or_default();
    normalize_ip(raw)
}

fn normalize_ip(raw: &str) -> String {
    if let Ok(socket) = raw.parse::<SocketAddr>() {
        return loopback_or(socket.ip());
    }
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return loopback_or(ip);
    }
    let unbracketed = raw.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = unbracketed.parse::<IpAddr>() {
        return loopback_or(ip);
    }
    let host = match raw.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => raw,
    };
    if host.eq_ignore_ascii_case("localhost") {
        return "127.0.0.1".to_string();
    }
    host.to_string()
}

fn loopback_or(ip: IpAddr) -> String {
    if ip.is_loopback() {
        "127.0.0.1".to_string()
    } else {
        ip.to_string()
    }
}

/// UTC day number used to rotate identities at midnight.
pub fn day_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(SECONDS_PER_DAY)
}

/// Compute the identity fingerprint for a visitor.
///
/// `sha256(day | ip | user_agent)` as 64 hex characters. The same inputs
/// within one UTC day give the same identity; the next day gives a new one,
/// so no raw grouping key outlives 24 hours.
pub fn compute_identity(ip: &str, user_agent: &str, day: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(day.to_string().as_bytes());
    hasher.update([0x1f]);
    hasher.update(ip.as_bytes());
    hasher.update([0x1f]);
    hasher.update(user_agent.as_bytes());
    hex::encode(hasher.finalize())
}

/// First usable `(language, region)` pair from an `Accept-Language` header.
///
/// Entries are `lang-REGION`, or `lang;REGION`. A `;q=` suffix is a weight,
/// not a region; weights are ignored and the first match wins.
pub fn parse_locale(accept_language: &str) -> Option<(String, String)> {
    accept_language.split(',').find_map(|entry| {
        let entry = entry.trim();
        let (tag, region) = match entry.split_once(';') {
            Some((tag, rest)) if rest.trim_start().starts_with("q=") => {
                tag.trim().split_once('-')?
            }
            Some((tag, region)) => (tag, region),
            None => entry.split_once('-')?,
        };
        let (tag, region) = (tag.trim(), region.trim());
        let valid = !tag.is_empty() && !region.is_empty() && !region.contains(['-', ';']);
        valid.then(|| (tag.to_string(), region.to_string()))
    })
}

/// Browser and OS as reported by a classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub browser: Option<String>,
    pub os: Option<String>,
}

/// Structured User-Agent client hints, raw header values.
#[derive(Debug, Clone, Copy, Default)]
pub struct UaHints<'a> {
    /// `Sec-CH-UA`, e.g. `"Chromium";v="122", "Not(A:Brand";v="24"`.
    pub brands: Option<&'a str>,
    /// `Sec-CH-UA-Platform`, e.g. `"macOS"`.
    pub platform: Option<&'a str>,
}

/// Pluggable User-Agent classification.
pub trait ClientClassifier: Send + Sync + 'static {
    fn classify(&self, user_agent: &str) -> ClientInfo;
}

/// Classify the client, letting client hints override the User-Agent parse.
pub fn classify_client(
    classifier: &dyn ClientClassifier,
    user_agent: &str,
    hints: &UaHints<'_>,
) -> ClientInfo {
    let mut info = if user_agent.is_empty() {
        ClientInfo::default()
    } else {
        classifier.classify(user_agent)
    };

    if let Some(platform) = hints
        .platform
        .map(|p| p.trim().trim_matches('"'))
        .filter(|p| !p.is_empty())
    {
        info.os = Some(platform.to_string());
    }

    // The last real brand is the most specific one ("Google Chrome" after
    // "Chromium"); GREASE entries like "Not(A:Brand" are skipped.
    if let Some(brand) = hints.brands.and_then(|raw| {
        raw.split(',')
            .filter_map(|entry| {
                let (name, _) = entry.split_once(';')?;
                let name = name.trim().trim_matches('"');
                (!name.is_empty() && !is_grease_brand(name)).then_some(name)
            })
            .last()
    }) {
        info.browser = Some(brand.to_string());
    }

    info
}

fn is_grease_brand(name: &str) -> bool {
    name.starts_with("Not") && name.ends_with("Brand")
}

/// Everything the resolver reads from one ingestion request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientRequest<'a> {
    pub addr: ClientAddr<'a>,
    pub user_agent: &'a str,
    pub hints: UaHints<'a>,
    pub accept_language: Option<&'a str>,
    pub viewport: Option<&'a str>,
}

/// Resolve the identity and client profile for an incoming event.
pub fn resolve_identity(
    config: &IdentityConfig,
    classifier: &dyn ClientClassifier,
    request: &ClientRequest<'_>,
    now: DateTime<Utc>,
) -> IdentityRecord {
    let ip = resolve_client_ip(&request.addr);
    let identity = compute_identity(&ip, request.user_agent, day_bucket(now));
    let client = classify_client(classifier, request.user_agent, &request.hints);
    let (language, country) = match request.accept_language.and_then(parse_locale) {
        Some((language, country)) => (Some(language), Some(country)),
        None => (None, None),
    };

    IdentityRecord {
        identity,
        language,
        country,
        browser: client.browser,
        os: client.os,
        device_class: classify_viewport(request.viewport, &config.breakpoints),
        created_at: now,
    }
}
