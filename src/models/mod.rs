pub mod observation;
pub mod record;

pub use observation::AccessPointObservation;
pub use record::{LocationRecord, NEGATIVE_PROVIDER, ONE_DAY_MS, THIRTY_DAYS_MS};
