pub mod http;

pub use http::HttpResolver;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::LocationRecord;

/// Remote access point geolocation service.
///
/// One call resolves a batch of BSSIDs. A BSSID missing from the returned
/// records is unresolved; the service may also return records for BSSIDs
/// that were never requested, and callers are expected to keep those too.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn resolve(&self, bssids: &[String]) -> Result<Vec<LocationRecord>>;
}
