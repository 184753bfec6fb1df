//! cns-e2e: poll-until-converged helpers for CSI e2e suites on vSphere.

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod node;
pub mod poll;
pub mod vsphere;

#[cfg(test)]
mod fake;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use api::ManagementApi;
pub use config::{ConfigError, E2eConfig, VSphereConfig};
pub use error::{ApiError, VSphereError};
pub use gateway::GatewayClient;
pub use logging::init_tracing;
pub use model::{EntityRef, EntityType};
pub use node::{NodeDirectory, StaticNodeDirectory};
pub use poll::{
    CancellationToken, PollError, PollOutcome, PollSpec, PollSpecError, poll, poll_until,
};
pub use vsphere::{DetachOutcome, VSphere};
