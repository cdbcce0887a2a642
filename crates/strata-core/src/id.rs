//! Logical ID ↔ provider name codec.
//!
//! Every entity has two coordinates: the logical ID stored in tags and shown
//! to clients, and the provider name used to address the cloud API. The
//! provider name is `l0-{instance}-{logical_id}`; every secondary resource
//! name is derived from it, so all of an entity's provider resources can be
//! reconstructed from the logical ID alone.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Leading segment of every managed provider name.
pub const PROVIDER_PREFIX: &str = "l0";

/// Max characters of the human name kept in a generated ID.
const STEM_LEN: usize = 12;

/// Hex characters of the name hash appended to a generated ID.
const HASH_LEN: usize = 8;

/// Maps logical IDs into the provider namespace of one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdCodec {
    prefix: String,
}

impl IdCodec {
    pub fn new(instance: &str) -> Self {
        Self {
            prefix: format!("{PROVIDER_PREFIX}-{instance}-"),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn encode(&self, logical_id: &str) -> ProviderName {
        ProviderName(format!("{}{logical_id}", self.prefix))
    }

    /// Strip the namespace prefix. Names from another installation (or not
    /// managed by Strata at all) decode to `None`.
    pub fn decode(&self, provider_name: &str) -> Option<String> {
        provider_name
            .strip_prefix(&self.prefix)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    pub fn is_managed(&self, provider_name: &str) -> bool {
        self.decode(provider_name).is_some()
    }
}

/// Deterministic, provider-safe ID for a human-supplied name.
///
/// The lowercase alphanumeric stem keeps IDs recognizable; the hash suffix
/// keeps distinct names apart. Uniqueness is advisory: two names can still
/// collide on a truncated hash.
pub fn generate_entity_id(name: &str) -> String {
    let stem: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(STEM_LEN)
        .collect();
    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    format!("{stem}{}", &digest[..HASH_LEN])
}

/// A fully-qualified provider resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderName(String);

impl ProviderName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn security_group_name(&self) -> String {
        format!("{}-env", self.0)
    }

    pub fn auto_scaling_group_name(&self) -> String {
        self.0.clone()
    }

    pub fn launch_configuration_name(&self) -> String {
        self.0.clone()
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProviderName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let codec = IdCodec::new("dev");
        for id in ["prod1a2b3c4d", "x", "api-gateway00ff00ff"] {
            let name = codec.encode(id);
            assert_eq!(name.as_str(), format!("l0-dev-{id}"));
            assert_eq!(codec.decode(name.as_str()).as_deref(), Some(id));
        }
    }

    #[test]
    fn encode_is_pure() {
        let a = IdCodec::new("dev");
        let b = IdCodec::new("dev");
        assert_eq!(a.encode("env1"), b.encode("env1"));
        assert_ne!(a.encode("env1"), IdCodec::new("prod").encode("env1"));
    }

    #[test]
    fn decode_rejects_foreign_names() {
        let codec = IdCodec::new("dev");
        assert_eq!(codec.decode("l0-prod-env1"), None);
        assert_eq!(codec.decode("default"), None);
        assert_eq!(codec.decode("l0-dev-"), None);
        assert!(codec.is_managed("l0-dev-env1"));
        assert!(!codec.is_managed("l0-devx-env1"));
    }

    #[test]
    fn generated_ids_are_deterministic() {
        assert_eq!(generate_entity_id("prod"), generate_entity_id("prod"));
        assert_ne!(generate_entity_id("prod"), generate_entity_id("staging"));
        assert_ne!(generate_entity_id("prod"), generate_entity_id("Prod"));
    }

    #[test]
    fn generated_ids_are_name_safe() {
        let id = generate_entity_id("My Env_With.Weird/Chars and a long tail");
        assert!(id.starts_with("myenvwithwei"));
        assert_eq!(id.len(), STEM_LEN + HASH_LEN);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

        let symbols_only = generate_entity_id("---");
        assert_eq!(symbols_only.len(), HASH_LEN);
    }

    #[test]
    fn secondary_names_derive_from_provider_name() {
        let name = IdCodec::new("dev").encode("prod");
        assert_eq!(name.security_group_name(), "l0-dev-prod-env");
        assert_eq!(name.auto_scaling_group_name(), "l0-dev-prod");
        assert_eq!(name.launch_configuration_name(), "l0-dev-prod");
    }
}
