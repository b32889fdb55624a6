//! IP-to-location and ASN resolution, and the per-user location history
//! that risk evaluation checks against.

pub mod asn;
pub mod history;
pub mod location;

pub use asn::AsnResolver;
pub use history::{LocationHistory, LocationHistoryStore};
pub use location::{GeoLocation, GeoResolver};
