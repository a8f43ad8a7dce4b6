//! Read-only views of the cluster topology.
//!
//! A [`Topology`] is fetched on demand and never cached: every query builds a
//! fresh value so callers never act on a stale replicaset list.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::InstanceIdentity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicasetStatus {
    Healthy,
    Unhealthy,
    /// Any other status string reported by the cluster, kept verbatim.
    Other(String),
}

impl ReplicasetStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "healthy" => ReplicasetStatus::Healthy,
            "unhealthy" => ReplicasetStatus::Unhealthy,
            other => ReplicasetStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReplicasetStatus::Healthy => "healthy",
            ReplicasetStatus::Unhealthy => "unhealthy",
            ReplicasetStatus::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ReplicasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ReplicasetStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ReplicasetStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ReplicasetStatus::parse(&raw))
    }
}

/// A replicaset member together with the uuid the cluster assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub uuid: Uuid,
    #[serde(flatten)]
    pub identity: InstanceIdentity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicasetSnapshot {
    pub uuid: Uuid,
    pub alias: String,
    pub status: ReplicasetStatus,
    pub roles: BTreeSet<String>,
    pub master: InstanceIdentity,
    /// Members in the order the cluster reports them (failover priority).
    pub members: Vec<Member>,
}

impl ReplicasetSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.status == ReplicasetStatus::Healthy
    }

    pub fn member_by_alias(&self, alias: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.identity.name() == alias)
    }
}

/// Mapping from replicaset uuid to its snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topology {
    replicasets: BTreeMap<Uuid, ReplicasetSnapshot>,
}

impl Topology {
    pub fn from_replicasets(replicasets: impl IntoIterator<Item = ReplicasetSnapshot>) -> Self {
        Self {
            replicasets: replicasets.into_iter().map(|r| (r.uuid, r)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.replicasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicasets.is_empty()
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&ReplicasetSnapshot> {
        self.replicasets.get(uuid)
    }

    pub fn replicasets(&self) -> impl Iterator<Item = &ReplicasetSnapshot> {
        self.replicasets.values()
    }

    /// Locate an instance by alias across all replicasets.
    pub fn find_instance(&self, alias: &str) -> Option<(&ReplicasetSnapshot, &Member)> {
        self.replicasets()
            .find_map(|r| r.member_by_alias(alias).map(|m| (r, m)))
    }

    pub fn find_uuid(&self, uuid: &Uuid) -> Option<(&ReplicasetSnapshot, &Member)> {
        self.replicasets()
            .find_map(|r| r.members.iter().find(|m| &m.uuid == uuid).map(|m| (r, m)))
    }

    /// Replicaset holding the instance advertised at `uri`, if it has joined.
    pub fn replicaset_of_uri(&self, uri: &str) -> Option<&ReplicasetSnapshot> {
        self.replicasets().find(|r| {
            r.members
                .iter()
                .any(|m| m.identity.advertise_uri() == uri)
        })
    }

    pub fn contains_uri(&self, uri: &str) -> bool {
        self.replicaset_of_uri(uri).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(alias: &str, members: &[(&str, &str)]) -> ReplicasetSnapshot {
        let members: Vec<Member> = members
            .iter()
            .map(|(name, uri)| Member {
                uuid: Uuid::new_v4(),
                identity: InstanceIdentity::from_uri(*name, uri).unwrap(),
            })
            .collect();
        ReplicasetSnapshot {
            uuid: Uuid::new_v4(),
            alias: alias.to_string(),
            status: ReplicasetStatus::Healthy,
            roles: ["vshard-storage".to_string()].into_iter().collect(),
            master: members[0].identity.clone(),
            members,
        }
    }

    #[test]
    fn status_parsing_keeps_unknown_values() {
        assert_eq!(ReplicasetStatus::parse("healthy"), ReplicasetStatus::Healthy);
        assert_eq!(
            ReplicasetStatus::parse("unhealthy"),
            ReplicasetStatus::Unhealthy
        );
        let other = ReplicasetStatus::parse("connecting");
        assert_eq!(other.as_str(), "connecting");
    }

    #[test]
    fn lookups_by_alias_and_uri() {
        let topology = Topology::from_replicasets(vec![
            snapshot("storage-1", &[("s1-master", "10.0.0.1:3301"), ("s1-replica", "10.0.0.2:3301")]),
            snapshot("router", &[("router-1", "10.0.0.3:3301")]),
        ]);

        assert_eq!(topology.len(), 2);
        let (replicaset, member) = topology.find_instance("s1-replica").unwrap();
        assert_eq!(replicaset.alias, "storage-1");
        assert_eq!(member.identity.port(), 3301);
        assert!(topology.find_uuid(&member.uuid).is_some());

        assert!(topology.contains_uri("10.0.0.3:3301"));
        assert!(!topology.contains_uri("10.0.0.9:3301"));
        assert_eq!(
            topology.replicaset_of_uri("10.0.0.2:3301").unwrap().alias,
            "storage-1"
        );
    }

    #[test]
    fn topology_serializes_as_uuid_keyed_map() {
        let replicaset = snapshot("router", &[("router-1", "localhost:3301")]);
        let uuid = replicaset.uuid;
        let topology = Topology::from_replicasets(vec![replicaset]);

        let json = serde_json::to_value(&topology).unwrap();
        let entry = &json[uuid.to_string()];
        assert_eq!(entry["alias"], "router");
        assert_eq!(entry["status"], "healthy");
        assert_eq!(entry["members"][0]["name"], "router-1");
    }
}
