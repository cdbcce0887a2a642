//! Shared handles passed to every manager.

use std::sync::Arc;

use tracing::debug;

use strata_core::{AwsConfig, IdCodec, StrataConfig, WaiterConfig};
use strata_provider::{AutoScalingApi, ClusterApi, ProviderResult, SecurityGroupApi, SimulatedCloud};
use strata_tags::TagStore;
use strata_wait::{Clock, Waiter};

use crate::error::OrchestratorResult;

/// The provider capability set.
#[derive(Clone)]
pub struct Providers {
    pub clusters: Arc<dyn ClusterApi>,
    pub security_groups: Arc<dyn SecurityGroupApi>,
    pub autoscaling: Arc<dyn AutoScalingApi>,
}

impl Providers {
    /// All three capabilities served by one simulated cloud.
    pub fn simulated(cloud: SimulatedCloud) -> Self {
        let cloud = Arc::new(cloud);
        Self {
            clusters: cloud.clone(),
            security_groups: cloud.clone(),
            autoscaling: cloud,
        }
    }
}

/// Deployment-wide values the managers need.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub codec: IdCodec,
    pub aws: AwsConfig,
    pub waiter: WaiterConfig,
}

impl OrchestratorConfig {
    pub fn from_strata(config: &StrataConfig) -> Self {
        Self {
            codec: IdCodec::new(&config.instance.name),
            aws: config.aws.clone(),
            waiter: config.waiter.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct Context {
    pub providers: Providers,
    pub tags: Arc<dyn TagStore>,
    pub config: Arc<OrchestratorConfig>,
    pub clock: Arc<dyn Clock>,
}

impl Context {
    pub fn codec(&self) -> &IdCodec {
        &self.config.codec
    }

    pub fn aws(&self) -> &AwsConfig {
        &self.config.aws
    }

    pub fn waiter(&self, operation: &str) -> Waiter {
        Waiter::from_config(operation, &self.config.waiter, self.clock.clone())
    }
}

/// Treat matching provider failures as success.
///
/// Used on delete/authorize paths where "already absent" or "already
/// present" means the step has nothing left to do.
pub(crate) fn tolerate(
    result: ProviderResult<()>,
    operation: &str,
    codes: &[&str],
    fragments: &[&str],
) -> OrchestratorResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.matches(codes, fragments) => {
            debug!(%operation, error = %err, "tolerated provider error");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_provider::{ProviderError, codes};

    #[test]
    fn tolerate_passes_through_unmatched_errors() {
        let absent = Err(ProviderError::new(codes::VALIDATION_ERROR, "AutoScalingGroup name not found - x"));
        assert!(tolerate(absent, "delete asg", &[], &["name not found"]).is_ok());

        let denied = Err(ProviderError::new("AccessDenied", "no"));
        assert!(tolerate(denied, "delete asg", &[], &["name not found"]).is_err());

        let duplicate = Err(ProviderError::new(codes::DUPLICATE_PERMISSION, "rule exists"));
        assert!(tolerate(duplicate, "authorize", &[codes::DUPLICATE_PERMISSION], &[]).is_ok());
    }
}
