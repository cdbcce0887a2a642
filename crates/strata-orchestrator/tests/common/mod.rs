//! Shared harness: an orchestrator over a simulated cloud and in-memory tags.

#![allow(dead_code)]

use std::sync::Arc;

use strata_core::{AwsConfig, CreateEnvironmentRequest, IdCodec, WaiterConfig};
use strata_orchestrator::{Orchestrator, OrchestratorConfig, Providers};
use strata_provider::{SimulatedCloud, SimulationSettings};
use strata_tags::{MemoryTagStore, TagStore};
use strata_wait::ManualClock;

pub const LINUX_AMI: &str = "ami-linux";
pub const WINDOWS_AMI: &str = "ami-windows";
pub const AGENT_GROUP: &str = "sg-agent";

pub struct Harness {
    pub cloud: SimulatedCloud,
    pub tags: Arc<MemoryTagStore>,
    pub clock: ManualClock,
    pub codec: IdCodec,
    pub orchestrator: Orchestrator,
}

pub fn aws_config() -> AwsConfig {
    AwsConfig {
        region: Some("us-west-2".to_string()),
        linux_service_ami: LINUX_AMI.to_string(),
        windows_service_ami: WINDOWS_AMI.to_string(),
        vpc_id: "vpc-1".to_string(),
        private_subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
        ecs_instance_profile: "strata-ecs".to_string(),
        ssh_key_pair: "strata-key".to_string(),
        agent_security_group_id: AGENT_GROUP.to_string(),
        s3_bucket: "strata-dev".to_string(),
    }
}

pub fn harness() -> Harness {
    harness_with(SimulationSettings::default(), 5)
}

pub fn harness_with(settings: SimulationSettings, retries: u32) -> Harness {
    let cloud = SimulatedCloud::with_settings(settings);
    let tags = Arc::new(MemoryTagStore::new());
    let clock = ManualClock::new();
    let codec = IdCodec::new("dev");
    let config = OrchestratorConfig {
        codec: codec.clone(),
        aws: aws_config(),
        waiter: WaiterConfig {
            retries,
            delay_secs: 10,
            propagation_delay_secs: 2,
        },
    };
    let store: Arc<dyn TagStore> = tags.clone();
    let orchestrator = Orchestrator::new(
        Providers::simulated(cloud.clone()),
        store,
        config,
        Arc::new(clock.clone()),
    )
    .unwrap();
    Harness {
        cloud,
        tags,
        clock,
        codec,
        orchestrator,
    }
}

pub fn environment_request(name: &str, os: &str, count: u32) -> CreateEnvironmentRequest {
    CreateEnvironmentRequest {
        environment_name: name.to_string(),
        instance_size: "t3.small".to_string(),
        operating_system: os.to_string(),
        ami_id: None,
        min_cluster_count: count,
        user_data_template: None,
    }
}

/// Operation names of the recorded provider calls, in order.
pub async fn operations(cloud: &SimulatedCloud) -> Vec<String> {
    cloud
        .calls()
        .await
        .into_iter()
        .map(|call| call.split_whitespace().next().unwrap_or_default().to_string())
        .collect()
}
