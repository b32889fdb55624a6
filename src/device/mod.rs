//! Device fingerprinting and lifecycle.

pub mod fingerprint;
pub mod record;
pub mod service;

pub use fingerprint::{generate, FingerprintRequest, Platform};
pub use record::{DeviceRecord, DeviceState};
pub use service::{DeviceFingerprintService, DeviceView, IpSecurityPolicy};
