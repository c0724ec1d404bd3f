//! Turns a set of candidate access point locations into one position
//! estimate: cluster, pick the largest cluster, apply the verification rules
//! for its size, then combine.

pub mod cluster;
pub mod combine;

use chrono::Utc;
use log::debug;

use crate::cache::LocationCache;
use crate::error::Result;
use crate::models::LocationRecord;

pub struct FusionEngine {
    cache: LocationCache,
    provider: String,
}

impl FusionEngine {
    pub fn new(provider: &str, cache: LocationCache) -> Self {
        Self {
            cache,
            provider: provider.to_string(),
        }
    }

    /// Fuses `candidates` into a single estimate, or `None` when no cluster
    /// is trustworthy enough. Persisting verification timestamps is the only
    /// write this performs.
    ///
    /// Verification rules by winning cluster size:
    /// - 1: returned as-is, and only if already verified.
    /// - 2: combined; additionally marked verified when one member already is.
    /// - 3+: marked verified and combined unconditionally.
    pub async fn estimate(&self, candidates: &[LocationRecord]) -> Result<Option<LocationRecord>> {
        let now_ms = Utc::now().timestamp_millis();

        let mut clusters = cluster::build_clusters(candidates);
        cluster::merge_overlapping(&mut clusters);
        clusters.sort_by(|a, b| b.len().cmp(&a.len()));

        debug!(
            "built {} clusters of sizes {:?}",
            clusters.len(),
            clusters.iter().map(Vec::len).collect::<Vec<_>>()
        );

        let Some(best) = clusters.first() else {
            return Ok(None);
        };
        let mut members: Vec<LocationRecord> =
            best.iter().map(|&index| candidates[index].clone()).collect();

        match members.len() {
            1 => {
                let record = members.remove(0);
                if record.is_verified(now_ms) {
                    debug!("single-member cluster, but verified");
                    Ok(Some(record))
                } else {
                    Ok(None)
                }
            }
            2 => {
                if members.iter().any(|record| record.is_verified(now_ms)) {
                    debug!("two-member cluster with prior verification");
                    self.verify_all(&mut members, now_ms).await?;
                } else {
                    debug!("two-member cluster without verification");
                }
                Ok(Some(combine::combine_cluster(&self.provider, &members, now_ms)))
            }
            _ => {
                debug!("{}-member cluster, auto-verified", members.len());
                self.verify_all(&mut members, now_ms).await?;
                Ok(Some(combine::combine_cluster(&self.provider, &members, now_ms)))
            }
        }
    }

    /// Stamps every member as verified now and persists the updated records
    /// in one batch.
    async fn verify_all(&self, members: &mut [LocationRecord], now_ms: i64) -> Result<()> {
        let mut editor = self.cache.begin_edit();
        for record in members.iter_mut() {
            record.verified_at_ms = Some(now_ms);
            editor.put(record.clone());
        }
        editor.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ONE_DAY_MS;
    use tempfile::TempDir;

    fn open_cache(dir: &TempDir) -> LocationCache {
        LocationCache::open(dir.path().join("cache.sqlite3")).unwrap()
    }

    fn candidate(bssid: &str, lat: f64, signal_dbm: i32) -> LocationRecord {
        LocationRecord {
            bssid: Some(bssid.to_string()),
            provider: "test".to_string(),
            latitude: lat,
            longitude: 13.0,
            altitude: None,
            accuracy: Some(20.0),
            observed_at_ms: Utc::now().timestamp_millis(),
            verified_at_ms: None,
            signal_dbm: Some(signal_dbm),
            combined_of: None,
        }
    }

    #[tokio::test]
    async fn empty_candidates_yield_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = FusionEngine::new("test", open_cache(&dir));
        assert!(engine.estimate(&[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unverified_singleton_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = FusionEngine::new("test", open_cache(&dir));

        let lone = candidate("aa:bb:cc:dd:ee:01", 52.0, -60);
        assert!(engine.estimate(&[lone]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn verified_singleton_is_returned_as_is() {
        let dir = TempDir::new().unwrap();
        let engine = FusionEngine::new("test", open_cache(&dir));

        let mut lone = candidate("aa:bb:cc:dd:ee:01", 52.0, -60);
        lone.verified_at_ms = Some(Utc::now().timestamp_millis());

        let estimate = engine.estimate(&[lone.clone()]).await.unwrap().unwrap();
        assert_eq!(estimate.bssid, lone.bssid);
        assert_eq!(estimate.combined_of, None);
    }

    #[tokio::test]
    async fn expired_verification_does_not_count() {
        let dir = TempDir::new().unwrap();
        let engine = FusionEngine::new("test", open_cache(&dir));

        let mut lone = candidate("aa:bb:cc:dd:ee:01", 52.0, -60);
        lone.verified_at_ms = Some(Utc::now().timestamp_millis() - ONE_DAY_MS - 1_000);
        assert!(engine.estimate(&[lone]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unverified_pair_combines_without_persisting() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        let engine = FusionEngine::new("test", cache.clone());

        let a = candidate("aa:bb:cc:dd:ee:01", 52.0, -50);
        let b = candidate("aa:bb:cc:dd:ee:02", 52.0001, -70);

        let estimate = engine.estimate(&[a, b]).await.unwrap().unwrap();
        assert_eq!(estimate.combined_of, Some(2));
        assert_eq!(estimate.verified_at_ms, None);

        // Nothing was written back.
        assert!(cache.get("aa:bb:cc:dd:ee:01").await.unwrap().is_none());
        assert!(cache.get("aa:bb:cc:dd:ee:02").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pair_with_prior_verification_verifies_both() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        let engine = FusionEngine::new("test", cache.clone());

        let mut a = candidate("aa:bb:cc:dd:ee:01", 52.0, -50);
        a.verified_at_ms = Some(Utc::now().timestamp_millis());
        let b = candidate("aa:bb:cc:dd:ee:02", 52.0001, -70);

        let estimate = engine.estimate(&[a, b]).await.unwrap().unwrap();
        assert_eq!(estimate.combined_of, Some(2));
        assert!(estimate.verified_at_ms.is_some());

        for bssid in ["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:02"] {
            let stored = cache.get(bssid).await.unwrap().unwrap();
            assert!(stored.verified_at_ms.is_some(), "{bssid} not verified");
        }
    }

    #[tokio::test]
    async fn three_members_auto_verify() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        let engine = FusionEngine::new("test", cache.clone());

        let candidates = vec![
            candidate("aa:bb:cc:dd:ee:01", 52.0, -50),
            candidate("aa:bb:cc:dd:ee:02", 52.0001, -60),
            candidate("aa:bb:cc:dd:ee:03", 52.0002, -70),
        ];

        let estimate = engine.estimate(&candidates).await.unwrap().unwrap();
        assert_eq!(estimate.combined_of, Some(3));
        assert!(estimate.verified_at_ms.is_some());

        for bssid in ["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:02", "aa:bb:cc:dd:ee:03"] {
            let stored = cache.get(bssid).await.unwrap().unwrap();
            assert!(stored.verified_at_ms.is_some(), "{bssid} not verified");
        }
    }

    #[tokio::test]
    async fn largest_cluster_wins() {
        let dir = TempDir::new().unwrap();
        let engine = FusionEngine::new("test", open_cache(&dir));

        // Three around 52.0, one lone outlier far away.
        let candidates = vec![
            candidate("aa:bb:cc:dd:ee:01", 52.0, -50),
            candidate("aa:bb:cc:dd:ee:02", 52.0001, -60),
            candidate("aa:bb:cc:dd:ee:03", 52.0002, -70),
            candidate("aa:bb:cc:dd:ee:04", 40.0, -40),
        ];

        let estimate = engine.estimate(&candidates).await.unwrap().unwrap();
        assert_eq!(estimate.combined_of, Some(3));
        assert!((estimate.latitude - 52.0).abs() < 0.01);
    }
}
