use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings for one locator session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Where the location cache database lives.
    pub db_path: PathBuf,
    /// Endpoint of the remote access point lookup service.
    pub service_url: String,
    /// Client identifier sent with every lookup request.
    pub client_id: String,
    /// Provider tag stamped on fused estimates.
    pub provider: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("wifiloc.sqlite3"),
            service_url: "https://iphone-services.apple.com/clls/wloc".to_string(),
            client_id: "com.apple.maps".to_string(),
            provider: "apple".to_string(),
        }
    }
}
