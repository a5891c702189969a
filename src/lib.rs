//! Domain and load balancer control plane for a decentralized application
//! hosting network.

pub mod config;
pub mod context;
pub mod discovery;
pub mod dns;
pub mod domains;
pub mod haproxy;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod sharding;
pub mod specs;

pub use config::schema::ControlConfig;
pub use lifecycle::Shutdown;
pub use pipeline::{CycleReport, Pipeline};
