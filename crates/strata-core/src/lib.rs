//! strata-core — shared vocabulary for the Strata control plane.
//!
//! - [`config`]: the deployment-wide `strata.toml` configuration
//! - [`id`]: the logical-ID ↔ provider-name codec
//! - [`types`]: entity models, tags, and request payloads

pub mod config;
pub mod id;
pub mod types;

pub use config::{AwsConfig, ConfigError, StrataConfig, WaiterConfig};
pub use id::{IdCodec, ProviderName, generate_entity_id};
pub use types::*;
