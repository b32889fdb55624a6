//! Login risk evaluation: geo/ASN velocity checks, device trust, and the
//! alerts and audit events a high-risk login should trigger.

pub mod alert;
pub mod engine;
pub mod haversine;

pub use alert::SecurityAlert;
pub use engine::{RiskEngine, RiskLevel, RiskResult};
