use serde::{Deserialize, Serialize};

/// Provider tag for negative cache entries: the remote service was asked and
/// had no answer, so the BSSID must not be re-requested until the entry goes
/// stale.
pub const NEGATIVE_PROVIDER: &str = "unknown";

/// Verification window. A record corroborated within this span counts as
/// verified.
pub const ONE_DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Staleness horizon. Records observed longer ago are refreshed in the
/// background.
pub const THIRTY_DAYS_MS: i64 = 2_592_000_000;

/// A located access point, as persisted in the cache and passed between the
/// fusion and refresh stages.
///
/// `bssid` is the cache key; it is `None` only on fused outputs, which are
/// never persisted. `signal_dbm` and `combined_of` are transient companions
/// of a fusion round and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRecord {
    pub bssid: Option<String>,
    pub provider: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    /// Meters. Absent or negative means the position is unusable.
    pub accuracy: Option<f32>,
    /// Unix millis of retrieval (or combination) time.
    pub observed_at_ms: i64,
    /// Unix millis of the last cross-corroboration, if any.
    pub verified_at_ms: Option<i64>,
    #[serde(skip)]
    pub signal_dbm: Option<i32>,
    #[serde(skip)]
    pub combined_of: Option<u32>,
}

impl LocationRecord {
    /// Entry recording that the remote service did not know this BSSID.
    pub fn negative(bssid: String, observed_at_ms: i64) -> Self {
        Self {
            bssid: Some(bssid),
            provider: NEGATIVE_PROVIDER.to_string(),
            latitude: 0.0,
            longitude: 0.0,
            altitude: None,
            accuracy: None,
            observed_at_ms,
            verified_at_ms: None,
            signal_dbm: None,
            combined_of: None,
        }
    }

    pub fn has_usable_position(&self) -> bool {
        self.accuracy.map_or(false, |accuracy| accuracy >= 0.0)
    }

    pub fn is_stale(&self, now_ms: i64) -> bool {
        self.observed_at_ms + THIRTY_DAYS_MS < now_ms
    }

    pub fn is_verified(&self, now_ms: i64) -> bool {
        self.verified_at_ms
            .map_or(false, |verified_at| verified_at > now_ms - ONE_DAY_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positive(observed_at_ms: i64) -> LocationRecord {
        LocationRecord {
            bssid: Some("aa:bb:cc:dd:ee:ff".to_string()),
            provider: "test".to_string(),
            latitude: 52.0,
            longitude: 13.0,
            altitude: None,
            accuracy: Some(40.0),
            observed_at_ms,
            verified_at_ms: None,
            signal_dbm: None,
            combined_of: None,
        }
    }

    #[test]
    fn negative_entries_are_unusable() {
        let record = LocationRecord::negative("aa:bb:cc:dd:ee:ff".to_string(), 1_000);
        assert_eq!(record.provider, NEGATIVE_PROVIDER);
        assert!(!record.has_usable_position());
    }

    #[test]
    fn negative_accuracy_is_unusable() {
        let mut record = positive(1_000);
        assert!(record.has_usable_position());
        record.accuracy = Some(-1.0);
        assert!(!record.has_usable_position());
    }

    #[test]
    fn staleness_uses_thirty_day_horizon() {
        let now_ms = 10 * THIRTY_DAYS_MS;
        assert!(positive(now_ms - THIRTY_DAYS_MS - 1).is_stale(now_ms));
        assert!(!positive(now_ms - THIRTY_DAYS_MS).is_stale(now_ms));
        assert!(!positive(now_ms).is_stale(now_ms));
    }

    #[test]
    fn verification_expires_after_a_day() {
        let now_ms = 10 * ONE_DAY_MS;
        let mut record = positive(now_ms);
        assert!(!record.is_verified(now_ms));

        record.verified_at_ms = Some(now_ms - ONE_DAY_MS + 1);
        assert!(record.is_verified(now_ms));

        record.verified_at_ms = Some(now_ms - ONE_DAY_MS);
        assert!(!record.is_verified(now_ms));
    }
}
