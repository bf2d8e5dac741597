/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit` (env
/// `TRACKLYTICS_DUCKDB_MEMORY`, default `"1GB"`). An explicit limit is always
/// set: the DuckDB default of 80% of system RAM is not acceptable for a
/// server process. `threads = 2` keeps the background pool small for
/// single-writer embedded use.
///
/// Sessions are not stored. `events` keeps the raw stream and every query
/// re-sessionizes it, so the only index needed is `(identity, created_at)`.
/// `seq` records insertion order to break ties between equal timestamps.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- IDENTITIES (one row per same-day fingerprint)
-- ===========================================
CREATE TABLE IF NOT EXISTS identities (
    identity        VARCHAR PRIMARY KEY,           -- sha256(day, ip, user agent), 64 hex chars
    language        VARCHAR,
    country         VARCHAR,                       -- region of the Accept-Language locale
    browser         VARCHAR,
    os              VARCHAR,
    device_class    VARCHAR NOT NULL,              -- mobile | tablet | laptop | desktop | display
    created_at      TIMESTAMP NOT NULL
);

-- ===========================================
-- EVENTS (append-only)
-- ===========================================
CREATE SEQUENCE IF NOT EXISTS events_seq;

CREATE TABLE IF NOT EXISTS events (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    seq             BIGINT NOT NULL DEFAULT nextval('events_seq'),
    identity        VARCHAR NOT NULL,
    event_name      VARCHAR NOT NULL,              -- 'pageview' or a custom name
    url             VARCHAR NOT NULL,              -- scheme + host + path
    attribution     VARCHAR NOT NULL,              -- direct | campaign | referral
    referrer        VARCHAR,
    utm_source      VARCHAR,                       -- NULL unless attribution carries UTM
    utm_medium      VARCHAR,
    utm_campaign    VARCHAR,
    utm_term        VARCHAR,
    utm_content     VARCHAR,
    props           VARCHAR NOT NULL DEFAULT '{{}}', -- JSON object
    revenue_amount  DOUBLE,
    revenue_currency VARCHAR,
    created_at      TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_identity_time ON events(identity, created_at);
CREATE INDEX IF NOT EXISTS idx_events_time ON events(created_at);
"#
    )
}
