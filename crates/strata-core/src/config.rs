//! strata.toml configuration parser.
//!
//! Deployment-wide values (AMIs, VPC, subnets, role names, ...) are read once
//! at startup and handed to the orchestrator explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {}", .0.join(", "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrataConfig {
    pub instance: InstanceConfig,
    pub aws: AwsConfig,
    #[serde(default)]
    pub waiter: WaiterConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Identifies this control-plane installation. The name becomes part of
/// every provider resource name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub linux_service_ami: String,
    pub windows_service_ami: String,
    pub vpc_id: String,
    pub private_subnets: Vec<String>,
    pub ecs_instance_profile: String,
    pub ssh_key_pair: String,
    pub agent_security_group_id: String,
    pub s3_bucket: String,
}

/// Retry budget for convergence waits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaiterConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
    /// Pause between creating a security group and authorizing ingress on it.
    #[serde(default = "default_propagation_secs")]
    pub propagation_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_retries() -> u32 {
    50
}

fn default_delay_secs() -> u64 {
    10
}

fn default_propagation_secs() -> u64 {
    2
}

fn default_workers() -> usize {
    4
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/strata")
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            delay_secs: default_delay_secs(),
            propagation_delay_secs: default_propagation_secs(),
        }
    }
}

impl WaiterConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn propagation_delay(&self) -> Duration {
        Duration::from_secs(self.propagation_delay_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StrataConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Report every missing required value at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        let required = [
            ("instance.name", self.instance.name.as_str()),
            ("aws.linux_service_ami", self.aws.linux_service_ami.as_str()),
            ("aws.windows_service_ami", self.aws.windows_service_ami.as_str()),
            ("aws.vpc_id", self.aws.vpc_id.as_str()),
            ("aws.ecs_instance_profile", self.aws.ecs_instance_profile.as_str()),
            ("aws.ssh_key_pair", self.aws.ssh_key_pair.as_str()),
            ("aws.agent_security_group_id", self.aws.agent_security_group_id.as_str()),
            ("aws.s3_bucket", self.aws.s3_bucket.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                missing.push(format!("{field} is required"));
            }
        }
        if self.aws.private_subnets.is_empty() {
            missing.push("aws.private_subnets must list at least one subnet".to_string());
        }
        if !self
            .instance
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            missing.push("instance.name may only contain [A-Za-z0-9-]".to_string());
        }
        if self.jobs.workers == 0 {
            missing.push("jobs.workers must be at least 1".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[instance]
name = "dev"

[aws]
linux_service_ami = "ami-linux"
windows_service_ami = "ami-windows"
vpc_id = "vpc-123"
private_subnets = ["subnet-a", "subnet-b"]
ecs_instance_profile = "ecs-role"
ssh_key_pair = "dev-key"
agent_security_group_id = "sg-agent"
s3_bucket = "strata-dev"
"#;

    #[test]
    fn parse_full_config_with_defaults() {
        let config = StrataConfig::parse(FULL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.instance.name, "dev");
        assert_eq!(config.aws.private_subnets.len(), 2);
        assert_eq!(config.waiter, WaiterConfig::default());
        assert_eq!(config.jobs.workers, 4);
        assert_eq!(config.waiter.delay(), Duration::from_secs(10));
    }

    #[test]
    fn validate_reports_every_missing_field() {
        let config = StrataConfig::parse(
            r#"
[instance]
name = "dev"

[aws]
linux_service_ami = ""
windows_service_ami = "ami-windows"
vpc_id = ""
private_subnets = []
ecs_instance_profile = "ecs-role"
ssh_key_pair = "dev-key"
agent_security_group_id = "sg-agent"
s3_bucket = "strata-dev"
"#,
        )
        .unwrap();

        match config.validate() {
            Err(ConfigError::Invalid(problems)) => {
                assert_eq!(problems.len(), 3);
                assert!(problems[0].contains("linux_service_ami"));
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn instance_name_must_be_name_safe() {
        let mut config = StrataConfig::parse(FULL).unwrap();
        config.instance.name = "dev env".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        std::fs::write(&path, FULL).unwrap();

        let config = StrataConfig::from_file(&path).unwrap();
        assert_eq!(config.aws.s3_bucket, "strata-dev");

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            StrataConfig::from_file(&missing),
            Err(ConfigError::Read { .. })
        ));
    }
}
