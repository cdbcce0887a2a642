//! strata-provider — the cloud capability set consumed by the orchestrator.
//!
//! The orchestrator never talks to an SDK directly. It sees three narrow
//! async traits:
//!
//! ```text
//! ClusterApi        clusters, task definitions, services, tasks
//! SecurityGroupApi  security groups + group-to-group ingress
//! AutoScalingApi    launch configurations + autoscaling groups
//! ```
//!
//! Every call may fail with a [`ProviderError`] carrying the provider's
//! machine-readable code and human-readable message; callers decide which
//! codes/messages mean "already absent" or "already exists".
//!
//! [`SimulatedCloud`] implements all three traits in memory, including the
//! eventual-consistency quirks the orchestrator has to tolerate.

pub mod api;
pub mod error;
pub mod simulated;

pub use api::*;
pub use error::{ProviderError, ProviderResult, codes};
pub use simulated::{SimulatedCloud, SimulationSettings};
