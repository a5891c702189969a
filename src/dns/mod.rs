//! DNS records and TLS certificates for application domains.
//!
//! # Data Flow
//! ```text
//! Domains of healthy applications
//!     → reconciler.rs (sequential per domain)
//!         → provider.rs / cloudflare.rs   list, delete, create
//!         → resolver.rs                   does the name reach us?
//!         → certs.rs                      issue, renewal hook
//! ```
//!
//! # Design Decisions
//! - Providers, resolvers and certificate tooling sit behind traits
//! - Every mutating provider call is preceded by a managed-subdomain check

pub mod certs;
pub mod cloudflare;
pub mod provider;
pub mod reconciler;
pub mod resolver;

pub use certs::{CertError, CertificateManager, CommandCertificateManager};
pub use cloudflare::CloudflareProvider;
pub use provider::{DnsError, DnsProvider, DomainRecord, InMemoryProvider, NewRecord};
pub use reconciler::{DnsReconciler, ReconcileSummary};
pub use resolver::{DomainResolver, HickoryResolver, StaticResolver};
