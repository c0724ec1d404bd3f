use crate::models::LocationRecord;

/// Accuracy floor for weighting. Records more accurate than this gain no
/// extra weight from the accuracy term.
const ACCURACY_WEIGHT: f64 = 50.0;

/// Lowest signal strength considered, in dBm. Signal levels are offsets
/// above this floor, so a missing reading maps to level 200.
const MIN_SIGNAL_DBM: i32 = -200;

/// Collapses a cluster into one record: a weighted average where stronger
/// signals and better accuracies dominate.
///
/// The output carries no BSSID (it maps no single access point), the member
/// count in `combined_of`, and the newest verification time present among
/// the members.
pub(crate) fn combine_cluster(
    provider: &str,
    members: &[LocationRecord],
    now_ms: i64,
) -> LocationRecord {
    let levels: Vec<f64> = members.iter().map(signal_level).collect();
    let min_level = levels.iter().copied().fold(f64::INFINITY, f64::min);
    let max_level = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut latitude = 0.0;
    let mut longitude = 0.0;
    let mut accuracy = 0.0;
    let mut altitude = 0.0;
    let mut altitude_weight = 0.0;
    let mut total_weight = 0.0;
    let mut verified_at_ms: Option<i64> = None;

    for (record, &level) in members.iter().zip(&levels) {
        let weight = weight_of(level, min_level, max_level, record.accuracy);

        latitude += record.latitude * weight;
        longitude += record.longitude * weight;
        accuracy += f64::from(record.accuracy.unwrap_or(0.0)) * weight;
        if let Some(alt) = record.altitude {
            altitude += alt * weight;
            altitude_weight += weight;
        }
        if let Some(verified_at) = record.verified_at_ms {
            verified_at_ms = Some(verified_at_ms.map_or(verified_at, |v| v.max(verified_at)));
        }
        total_weight += weight;
    }

    LocationRecord {
        bssid: None,
        provider: provider.to_string(),
        latitude: latitude / total_weight,
        longitude: longitude / total_weight,
        altitude: (altitude_weight > 0.0).then(|| altitude / altitude_weight),
        accuracy: Some((accuracy / total_weight) as f32),
        observed_at_ms: now_ms,
        verified_at_ms,
        signal_dbm: None,
        combined_of: Some(members.len() as u32),
    }
}

fn signal_level(record: &LocationRecord) -> f64 {
    f64::from((record.signal_dbm.unwrap_or(0) - MIN_SIGNAL_DBM).abs())
}

/// Signal ratio within the cluster plus the accuracy term, squared. When the
/// cluster has no signal spread the ratio is zero for every member and the
/// accuracy term decides alone.
fn weight_of(level: f64, min_level: f64, max_level: f64, accuracy: Option<f32>) -> f64 {
    let ratio = if max_level > min_level {
        (level - min_level) / (max_level - min_level)
    } else {
        0.0
    };
    let accuracy_term = ACCURACY_WEIGHT / f64::from(accuracy.unwrap_or(0.0)).max(ACCURACY_WEIGHT);
    (ratio + accuracy_term).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(lat: f64, lon: f64, accuracy: f32, signal_dbm: i32) -> LocationRecord {
        LocationRecord {
            bssid: Some(format!("aa:bb:cc:dd:ee:{:02x}", signal_dbm.unsigned_abs() & 0xff)),
            provider: "test".to_string(),
            latitude: lat,
            longitude: lon,
            altitude: None,
            accuracy: Some(accuracy),
            observed_at_ms: 0,
            verified_at_ms: None,
            signal_dbm: Some(signal_dbm),
            combined_of: None,
        }
    }

    #[test]
    fn identical_positions_combine_exactly() {
        let members = vec![
            member(52.5, 13.4, 0.0, -50),
            member(52.5, 13.4, 0.0, -60),
            member(52.5, 13.4, 0.0, -70),
        ];
        let combined = combine_cluster("test", &members, 1_000);

        assert_eq!(combined.latitude, 52.5);
        assert_eq!(combined.longitude, 13.4);
        assert_eq!(combined.combined_of, Some(3));
        assert_eq!(combined.observed_at_ms, 1_000);
        assert!(combined.bssid.is_none());
    }

    #[test]
    fn flat_signal_spread_degrades_to_accuracy_weights() {
        // Same signal everywhere: ratio is zero, equal accuracies mean a
        // plain average rather than NaN.
        let members = vec![
            member(52.0, 13.0, 20.0, -60),
            member(54.0, 13.0, 20.0, -60),
        ];
        let combined = combine_cluster("test", &members, 0);
        assert!((combined.latitude - 53.0).abs() < 1e-9);
    }

    #[test]
    fn stronger_signal_pulls_the_average() {
        // -50 dBm maps to ratio 1, -90 dBm to ratio 0; accuracies equal.
        let members = vec![
            member(52.0, 13.0, 20.0, -50),
            member(53.0, 13.0, 20.0, -90),
        ];
        let combined = combine_cluster("test", &members, 0);

        // Weights are (1 + 1)^2 = 4 and (0 + 1)^2 = 1.
        let expected = (52.0 * 4.0 + 53.0 * 1.0) / 5.0;
        assert!((combined.latitude - expected).abs() < 1e-9);
    }

    #[test]
    fn poor_accuracy_shrinks_the_accuracy_term() {
        // Flat signals; accuracy 50 gets term 1.0, accuracy 200 gets 0.25.
        let members = vec![
            member(52.0, 13.0, 50.0, -60),
            member(53.0, 13.0, 200.0, -60),
        ];
        let combined = combine_cluster("test", &members, 0);

        let w_good = 1.0f64.powi(2);
        let w_poor = 0.25f64.powi(2);
        let expected = (52.0 * w_good + 53.0 * w_poor) / (w_good + w_poor);
        assert!((combined.latitude - expected).abs() < 1e-9);
    }

    #[test]
    fn altitude_averages_only_present_values() {
        let mut with_altitude = member(52.0, 13.0, 20.0, -60);
        with_altitude.altitude = Some(100.0);
        let without_altitude = member(52.0, 13.0, 20.0, -60);

        let combined = combine_cluster("test", &[with_altitude, without_altitude], 0);
        assert_eq!(combined.altitude, Some(100.0));

        let none = combine_cluster(
            "test",
            &[member(52.0, 13.0, 20.0, -60), member(52.0, 13.0, 20.0, -60)],
            0,
        );
        assert_eq!(none.altitude, None);
    }

    #[test]
    fn newest_verification_time_survives() {
        let mut first = member(52.0, 13.0, 20.0, -60);
        first.verified_at_ms = Some(1_000);
        let mut second = member(52.0, 13.0, 20.0, -60);
        second.verified_at_ms = Some(5_000);
        let third = member(52.0, 13.0, 20.0, -60);

        let combined = combine_cluster("test", &[first, second, third], 0);
        assert_eq!(combined.verified_at_ms, Some(5_000));

        let unverified = combine_cluster(
            "test",
            &[member(52.0, 13.0, 20.0, -60), member(52.0, 13.0, 20.0, -60)],
            0,
        );
        assert_eq!(unverified.verified_at_ms, None);
    }

    #[test]
    fn missing_signal_maps_to_level_two_hundred() {
        assert_eq!(signal_level(&member(0.0, 0.0, 0.0, -50)), 150.0);

        let mut silent = member(0.0, 0.0, 0.0, 0);
        silent.signal_dbm = None;
        assert_eq!(signal_level(&silent), 200.0);
    }
}
