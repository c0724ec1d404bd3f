use crate::models::LocationRecord;

/// Assumed maximum coverage radius of a single access point, in meters.
pub(crate) const MAX_AP_RADIUS_M: f64 = 500.0;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Groups candidates into clusters of geometrically compatible records.
///
/// Clusters are index sets over the candidate slice. A candidate joins every
/// cluster it is compatible with, so clusters may share members; a candidate
/// compatible with none starts its own. Compatibility with a cluster is
/// single-link: one matching member is enough.
pub(crate) fn build_clusters(candidates: &[LocationRecord]) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for (index, record) in candidates.iter().enumerate() {
        let mut used = false;
        for cluster in clusters.iter_mut() {
            if cluster
                .iter()
                .any(|&member| compatible(record, &candidates[member]))
            {
                cluster.push(index);
                used = true;
            }
        }
        if !used {
            clusters.push(vec![index]);
        }
    }

    clusters
}

/// Merging overlapping clusters is deliberately skipped. Selection depends on
/// seeing the clusters exactly as built, shared members included.
pub(crate) fn merge_overlapping(_clusters: &mut [Vec<usize>]) {}

/// Two records are compatible when their positions could plausibly describe
/// access points heard from one spot: the distance minus both accuracies and
/// the maximum coverage radius is negative.
fn compatible(a: &LocationRecord, b: &LocationRecord) -> bool {
    let reach =
        f64::from(a.accuracy.unwrap_or(0.0)) + f64::from(b.accuracy.unwrap_or(0.0)) + MAX_AP_RADIUS_M;
    distance_m(a.latitude, a.longitude, b.latitude, b.longitude) - reach < 0.0
}

/// Great-circle distance in meters (haversine).
pub(crate) fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}
