use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A BSSID that cannot be normalized to a MAC address.
    #[error("invalid mac address: {0}")]
    InvalidAddress(String),

    /// Remote lookup failed at the transport or protocol level.
    #[error("lookup transport error: {0}")]
    Transport(String),

    /// The on-disk cache was written by a newer build.
    #[error("cache schema version {found} is newer than supported version {supported}")]
    SchemaMismatch { found: i32, supported: i32 },

    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
