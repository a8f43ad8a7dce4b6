//! Per-host bookkeeping for a cluster deployment.
//!
//! The inventory is the list of instances the orchestration runtime plans to run,
//! each pinned to a machine. From it we derive which instances share a machine,
//! which replicasets should exist, and the config section every instance needs.
//! Persisting the rendered sections is left to the caller.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

use crate::{split_uri, UriError};

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Invalid inventory: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Instance {0} is declared more than once")]
    DuplicateInstance(String),

    #[error("Instance {name}: {source}")]
    InvalidUri {
        name: String,
        #[source]
        source: UriError,
    },

    #[error("Instance {0} not found in inventory")]
    UnknownInstance(String),

    #[error("Replicaset {alias} has conflicting roles: {first:?} vs {second:?}")]
    RolesMismatch {
        alias: String,
        first: BTreeSet<String>,
        second: BTreeSet<String>,
    },

    #[error("Instance {0} is not a stateboard and has no replicaset_alias")]
    MissingReplicaset(String),

    #[error("Instance {name}: extra key '{key}' is reserved")]
    ReservedKey { name: String, key: String },
}

/// Config keys rendered from dedicated fields; `extra` may not set them.
const RESERVED_KEYS: [&str; 2] = ["advertise_uri", "http_port"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryInstance {
    pub name: String,
    /// Host the instance runs on.
    pub machine: String,
    pub advertise_uri: String,
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default)]
    pub replicaset_alias: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub stateboard: bool,
    #[serde(default)]
    pub expelled: bool,
    /// Free-form keys copied into the rendered config section.
    #[serde(default)]
    pub extra: BTreeMap<String, YamlValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    instances: Vec<InventoryInstance>,
}

impl Inventory {
    pub fn new(instances: Vec<InventoryInstance>) -> Result<Self, InventoryError> {
        let mut seen = HashSet::new();
        for instance in &instances {
            if !seen.insert(instance.name.as_str()) {
                return Err(InventoryError::DuplicateInstance(instance.name.clone()));
            }
            split_uri(&instance.advertise_uri).map_err(|source| InventoryError::InvalidUri {
                name: instance.name.clone(),
                source,
            })?;
            if !instance.stateboard && !instance.expelled && instance.replicaset_alias.is_none() {
                return Err(InventoryError::MissingReplicaset(instance.name.clone()));
            }
            if let Some(key) = RESERVED_KEYS
                .iter()
                .find(|key| instance.extra.contains_key(**key))
            {
                return Err(InventoryError::ReservedKey {
                    name: instance.name.clone(),
                    key: key.to_string(),
                });
            }
        }
        Ok(Self { instances })
    }

    pub fn from_yaml(text: &str) -> Result<Self, InventoryError> {
        let raw: Inventory = serde_yaml::from_str(text)?;
        Self::new(raw.instances)
    }

    pub fn instance(&self, name: &str) -> Option<&InventoryInstance> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Machine name to the sorted names of the instances it runs.
    ///
    /// Expelled instances are left out; stateboards stay since they occupy a machine.
    pub fn group_by_machine(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for instance in self.instances.iter().filter(|i| !i.expelled) {
            groups
                .entry(instance.machine.clone())
                .or_default()
                .push(instance.name.clone());
        }
        for names in groups.values_mut() {
            names.sort();
        }
        groups
    }

    /// Replicaset alias to member names in declaration order.
    ///
    /// Stateboards and expelled instances are not replicaset members. Members
    /// without roles inherit the replicaset's; two non-empty role sets must agree.
    pub fn replicasets(&self) -> Result<BTreeMap<String, ReplicasetPlan>, InventoryError> {
        let mut plans: BTreeMap<String, ReplicasetPlan> = BTreeMap::new();
        for instance in self.instances.iter().filter(|i| !i.stateboard && !i.expelled) {
            let Some(alias) = instance.replicaset_alias.as_ref() else {
                continue;
            };
            match plans.get_mut(alias) {
                Some(plan) => {
                    if plan.roles.is_empty() {
                        plan.roles = instance.roles.clone();
                    } else if !instance.roles.is_empty() && plan.roles != instance.roles {
                        return Err(InventoryError::RolesMismatch {
                            alias: alias.clone(),
                            first: plan.roles.clone(),
                            second: instance.roles.clone(),
                        });
                    }
                    plan.members.push(instance.name.clone());
                }
                None => {
                    plans.insert(
                        alias.clone(),
                        ReplicasetPlan {
                            roles: instance.roles.clone(),
                            members: vec![instance.name.clone()],
                        },
                    );
                }
            }
        }
        Ok(plans)
    }

    /// Render the YAML config section for one instance.
    pub fn render_instance_config(
        &self,
        app_name: &str,
        instance_name: &str,
    ) -> Result<String, InventoryError> {
        let instance = self
            .instance(instance_name)
            .ok_or_else(|| InventoryError::UnknownInstance(instance_name.to_string()))?;

        let section_key = if instance.stateboard {
            format!("{app_name}-stateboard")
        } else {
            format!("{app_name}.{}", instance.name)
        };

        let mut body = Mapping::new();
        body.insert(
            "advertise_uri".into(),
            instance.advertise_uri.clone().into(),
        );
        if let Some(port) = instance.http_port {
            body.insert("http_port".into(), u64::from(port).into());
        }
        for (key, value) in &instance.extra {
            body.insert(key.clone().into(), value.clone());
        }

        let mut section = Mapping::new();
        section.insert(section_key.into(), YamlValue::Mapping(body));
        Ok(serde_yaml::to_string(&section)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicasetPlan {
    pub roles: BTreeSet<String>,
    pub members: Vec<String>,
}
