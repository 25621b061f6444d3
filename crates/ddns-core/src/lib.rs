// # ddns-core
//
// Core library for the OPNsense to Hetzner DNS reconciler.
//
// ## Architecture Overview
//
// This library provides the reconciliation core:
// - **InterfaceSource**: Trait for reading router interface addresses
// - **DnsProvider**: Trait for the provider's raw record-set API
// - **RecordSync**: Idempotent A record sync with rate limiting and retries
// - **Verifier**: Trait for authoritative propagation checks
// - **AnnotationUpdater**: Trait for the cluster annotation collaborator
// - **DdnsEngine**: Runs reconciliation cycles over configured records
// - **ProviderRegistry**: Plugin-based registry for providers and sources
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Single-shot plugins**: Providers and sources never retry or sleep
// 3. **Plugin-Based**: Providers are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: The provider's record set is the only state

pub mod config;
pub mod engine;
pub mod error;
pub mod ratelimit;
pub mod readiness;
pub mod records;
pub mod registry;
pub mod retry;
pub mod traits;

// Re-export core types for convenience
pub use config::{DdnsConfig, RecordConfig};
pub use engine::{CycleReport, DdnsEngine, DesiredState, EngineEvent};
pub use error::{Error, Result};
pub use ratelimit::RateLimiter;
pub use readiness::{Readiness, ReadinessCheck};
pub use records::RecordSync;
pub use registry::ProviderRegistry;
pub use retry::{RetryAttempt, RetryPolicy};
pub use traits::{AnnotationUpdater, DnsProvider, InterfaceSource, RecordSet, Verifier, Zone};
