//! strata-orchestrator — maps logical entities onto provider resources.
//!
//! Each entity kind has a manager that owns the full provisioning and
//! teardown sequence for it:
//!
//! ```text
//! Orchestrator
//!   ├── EnvironmentManager  cluster, security group, launch config, ASG
//!   ├── DeployManager       task-definition revisions
//!   ├── ServiceManager      container services in an environment
//!   └── TaskManager         one-off task runs in an environment
//! ```
//!
//! Managers resolve provider names through the [`IdCodec`], record entity
//! relations in the [`TagStore`], and rely on the [`Waiter`] for the only
//! retries in the system: waiting for eventually consistent deletions to
//! settle.
//!
//! [`IdCodec`]: strata_core::IdCodec
//! [`TagStore`]: strata_tags::TagStore
//! [`Waiter`]: strata_wait::Waiter

pub mod context;
pub mod deploy;
pub mod environment;
pub mod error;
pub mod service;
pub mod task;
pub mod userdata;

use std::sync::Arc;

use strata_tags::{Consistency, TagStore};
use strata_wait::Clock;

pub use context::{OrchestratorConfig, Providers};
pub use deploy::DeployManager;
pub use environment::EnvironmentManager;
pub use error::{OrchestratorError, OrchestratorResult};
pub use service::ServiceManager;
pub use task::TaskManager;

use context::Context;

/// One manager per entity kind, sharing providers, tags, and configuration.
#[derive(Clone)]
pub struct Orchestrator {
    pub environments: EnvironmentManager,
    pub deploys: DeployManager,
    pub services: ServiceManager,
    pub tasks: TaskManager,
}

impl Orchestrator {
    /// Existence checks and relation lookups go through point reads, so the
    /// tag store must serve those strongly.
    pub fn new(
        providers: Providers,
        tags: Arc<dyn TagStore>,
        config: OrchestratorConfig,
        clock: Arc<dyn Clock>,
    ) -> OrchestratorResult<Self> {
        if tags.consistency().point != Consistency::Strong {
            return Err(OrchestratorError::Validation(
                "tag store point reads must be strongly consistent".into(),
            ));
        }
        let ctx = Context {
            providers,
            tags,
            config: Arc::new(config),
            clock,
        };
        let deploys = DeployManager::new(ctx.clone());
        Ok(Self {
            environments: EnvironmentManager::new(ctx.clone()),
            services: ServiceManager::new(ctx.clone(), deploys.clone()),
            tasks: TaskManager::new(ctx, deploys.clone()),
            deploys,
        })
    }
}
