//! Core traits for the DDNS system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`InterfaceSource`]: Read current interface addresses from the router
//! - [`DnsProvider`]: Query and mutate A record sets via the provider API
//! - [`Verifier`]: Confirm propagation against authoritative nameservers
//! - [`AnnotationUpdater`]: Push the apex addresses to cluster resources

pub mod annotations;
pub mod dns_provider;
pub mod interface_source;
pub mod verifier;

pub use annotations::AnnotationUpdater;
pub use dns_provider::{DnsProvider, DnsProviderFactory, RecordSet, Zone, A_RECORD};
pub use interface_source::{InterfaceSource, InterfaceSourceFactory};
pub use verifier::Verifier;
