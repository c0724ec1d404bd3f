use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mac::normalize_bssid;
use crate::models::LocationRecord;

use super::LocationResolver;

/// Latitude/longitude arrive as fixed-point integers scaled by this factor.
const WIRE_LATLON: f64 = 1e8;

/// Altitudes at or below this are sentinel values for "unknown".
const MIN_VALID_ALTITUDE: f64 = -500.0;

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    client: &'a str,
    wifis: Vec<RequestWifi<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestWifi<'a> {
    mac: &'a str,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    wifis: Vec<ResponseWifi>,
}

#[derive(Debug, Deserialize)]
struct ResponseWifi {
    mac: Option<String>,
    location: Option<ResponseLocation>,
    channel: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ResponseLocation {
    latitude: Option<i64>,
    longitude: Option<i64>,
    altitude: Option<f64>,
    accuracy: Option<f32>,
}

/// Resolves batches against the lookup service with one JSON POST per call.
pub struct HttpResolver {
    client: reqwest::Client,
    service_url: String,
    client_id: String,
    provider: String,
}

impl HttpResolver {
    /// The provider tag on returned records is the service host.
    pub fn new(service_url: &str, client_id: &str) -> Result<Self> {
        let provider = reqwest::Url::parse(service_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .ok_or_else(|| Error::Transport(format!("invalid service url: {service_url}")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            service_url: service_url.to_string(),
            client_id: client_id.to_string(),
            provider,
        })
    }
}

#[async_trait]
impl LocationResolver for HttpResolver {
    async fn resolve(&self, bssids: &[String]) -> Result<Vec<LocationRecord>> {
        let request = LookupRequest {
            client: &self.client_id,
            wifis: bssids.iter().map(|mac| RequestWifi { mac }).collect(),
        };

        debug!("requesting {} locations from {}", bssids.len(), self.provider);

        let response = self
            .client
            .post(&self.service_url)
            .json(&request)
            .send()
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("service returned status {status}")));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        let now_ms = Utc::now().timestamp_millis();
        let mut records = Vec::with_capacity(body.wifis.len());
        for wifi in body.wifis {
            match record_from_wifi(wifi, &self.provider, now_ms) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => warn!("skipping malformed response record: {err}"),
            }
        }

        debug!("service answered with {} records", records.len());
        Ok(records)
    }
}

/// Maps one response record. Returns `Ok(None)` for records that carry no
/// position; fails only on a MAC that cannot be normalized.
fn record_from_wifi(
    wifi: ResponseWifi,
    provider: &str,
    now_ms: i64,
) -> Result<Option<LocationRecord>> {
    let Some(raw_mac) = wifi.mac else {
        return Ok(None);
    };
    let bssid = normalize_bssid(&raw_mac)?;

    let Some(location) = wifi.location else {
        return Ok(None);
    };
    let (Some(latitude), Some(longitude)) = (location.latitude, location.longitude) else {
        return Ok(None);
    };

    if let Some(channel) = wifi.channel {
        debug!("{bssid} reported on channel {channel}");
    }

    Ok(Some(LocationRecord {
        bssid: Some(bssid),
        provider: provider.to_string(),
        latitude: latitude as f64 / WIRE_LATLON,
        longitude: longitude as f64 / WIRE_LATLON,
        altitude: location.altitude.filter(|altitude| *altitude > MIN_VALID_ALTITUDE),
        accuracy: location.accuracy,
        observed_at_ms: now_ms,
        verified_at_ms: None,
        signal_dbm: None,
        combined_of: None,
    }))
}
