use serde::{Deserialize, Serialize};

/// Opt-out marker for networks that do not want to be mapped.
const OPT_OUT_SUFFIX: &str = "_nomap";

/// One access point as seen in a single Wi-Fi scan. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPointObservation {
    pub bssid: String,
    pub signal_dbm: i32,
    pub ssid: Option<String>,
}

impl AccessPointObservation {
    pub fn new(bssid: impl Into<String>, signal_dbm: i32) -> Self {
        Self {
            bssid: bssid.into(),
            signal_dbm,
            ssid: None,
        }
    }

    /// Networks whose SSID ends in `_nomap` must never be looked up or cached.
    pub fn opted_out(&self) -> bool {
        self.ssid
            .as_deref()
            .map_or(false, |ssid| ssid.ends_with(OPT_OUT_SUFFIX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_out_follows_ssid_suffix() {
        let mut observation = AccessPointObservation::new("aa:bb:cc:dd:ee:ff", -60);
        assert!(!observation.opted_out());

        observation.ssid = Some("coffee shop".to_string());
        assert!(!observation.opted_out());

        observation.ssid = Some("coffee shop_nomap".to_string());
        assert!(observation.opted_out());
    }
}
