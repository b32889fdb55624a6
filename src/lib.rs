//! # Identity Risk & Authorization Core
//!
//! Device fingerprinting, geo/ASN-based risk scoring, and role-hierarchy
//! authorization for an identity provider's authentication path.
//!
//! This crate is a library consumed by an HTTP front-end — it defines no
//! wire protocol of its own. It depends only on the outbound adapter
//! traits in [`adapters`] and [`audit`]; concrete persistence, alerting,
//! and MaxMind-database implementations live in the embedding
//! application.
//!
//! ## Components
//!
//! - [`ratelimit`] — admission control keyed by caller identity.
//! - [`circuit_breaker`] — cascading-failure protection for outbound
//!   calls.
//! - [`cache`] — stampede-safe named TTL cache.
//! - [`geo::asn`] — ASN resolution via a local database, DNS, and WHOIS,
//!   composed behind a circuit breaker and rate limiter.
//! - [`geo::location`] — IP-to-location resolution.
//! - [`geo::history`] — per-user location history.
//! - [`risk`] — impossible-travel, VPN, and country-risk evaluation.
//! - [`device`] — device fingerprint generation and lifecycle.
//! - [`authz`] — role hierarchy, assignment validation, sensitive-field
//!   policy.
//! - [`audit`] — structured security-event logging.
//! - [`adapters`] — outbound trait interfaces.
//! - [`mocks`] — in-memory adapter implementations for tests.
//!
//! ## Non-goals
//!
//! No wire protocol, no WebAuthn/passkey cryptography, no batch risk
//! scoring, no UI.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod adapters;
pub mod audit;
pub mod authz;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod device;
pub mod error;
pub mod geo;
pub mod ids;
pub mod ratelimit;
pub mod risk;

pub mod mocks;

pub use config::RiskConfig;
pub use error::{Result, RiskError};
pub use ids::{DeviceRecordId, UserId};
