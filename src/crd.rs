//! The `GslbConfig` CustomResourceDefinition and its data model.
//!
//! Group `cyberun.cloud`, version `v1`, kind `GslbConfig`, namespaced. Fields
//! not enumerated here are not recognized.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::GslbError;

/// `(namespace, name)` identity of a GslbConfig object.
pub type ObjectId = (String, String);

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cyberun.cloud",
    version = "v1",
    kind = "GslbConfig",
    namespaced,
    status = "GslbConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct GslbConfigSpec {
    /// Zone apex; must be a valid FQDN.
    pub domain: String,
    /// Emitted as NS + glue A records. Must contain at least one entry.
    pub nameservers: Vec<Nameserver>,
    /// Names unique within a config.
    #[serde(default)]
    pub records: Vec<Record>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct GslbConfigStatus {
    /// Last generation number this config contributed to.
    #[serde(default)]
    pub last_generation: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Nameserver {
    pub hostname: String,
    pub address: Ipv4Addr,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// A single DNS label, or `@` for the apex.
    pub name: String,
    pub targets: Vec<Target>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub address: Ipv4Addr,
    /// ISO 3166-1 alpha-2 country code, or empty for the default/global pool.
    #[serde(default)]
    pub location: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    pub protocol: Protocol,
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_weight() -> u32 {
    1
}

fn default_path() -> String {
    "/".to_string()
}

impl GslbConfigSpec {
    /// Validate on ingress: FQDN syntax, unique record names,
    /// target port range. `port`/`protocol` are enforced structurally by the
    /// typed fields above and by Kubernetes API schema validation for the
    /// CRD, so only the remaining semantic checks are repeated here.
    pub fn validate(&self, id: &ObjectId) -> Result<(), GslbError> {
        if !is_valid_fqdn(&self.domain) {
            return Err(GslbError::SpecValidation {
                id: format!("{}/{}", id.0, id.1),
                reason: format!("domain {:?} is not a valid FQDN", self.domain),
            });
        }
        if self.nameservers.is_empty() {
            return Err(GslbError::SpecValidation {
                id: format!("{}/{}", id.0, id.1),
                reason: "nameservers must have at least one entry".to_string(),
            });
        }

        let mut seen = HashSet::with_capacity(self.records.len());
        for record in &self.records {
            if !seen.insert(record.name.as_str()) {
                return Err(GslbError::SpecValidation {
                    id: format!("{}/{}", id.0, id.1),
                    reason: format!("duplicate record name {:?}", record.name),
                });
            }
            for target in &record.targets {
                if target.port == 0 {
                    return Err(GslbError::SpecValidation {
                        id: format!("{}/{}", id.0, id.1),
                        reason: format!("target {} has port out of range", target.address),
                    });
                }
                if target.weight == 0 {
                    return Err(GslbError::SpecValidation {
                        id: format!("{}/{}", id.0, id.1),
                        reason: format!("target {} has weight zero", target.address),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Minimal FQDN syntax check: dot-separated labels, each 1-63 chars, alnum
/// and hyphen only, no leading/trailing hyphen, at least one label.
pub fn is_valid_fqdn(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
    if labels.is_empty() {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
