use tracklytics_core::visitor::{ClientClassifier, ClientInfo};

/// User-Agent classification via the `woothee` crate.
///
/// Only browser and OS are taken from the UA; the device class comes from
/// the reported viewport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WootheeClassifier;

impl ClientClassifier for WootheeClassifier {
    fn classify(&self, user_agent: &str) -> ClientInfo {
        let Some(result) = woothee::parser::Parser::new().parse(user_agent) else {
            return ClientInfo::default();
        };
        ClientInfo {
            browser: known(result.name),
            os: known(result.os),
        }
    }
}

/// woothee reports unknown values as `"UNKNOWN"` or an empty string.
fn known(value: &str) -> Option<String> {
    (!value.is_empty() && value != "UNKNOWN").then(|| value.to_string())
}
