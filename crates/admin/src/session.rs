//! Command façade: one method per administrative action.
//!
//! Every method composes request → transport → interpreter and reports an
//! [`Outcome`]. Nothing is retried and nothing is cached between calls; the
//! topology in particular is fetched fresh whenever an operation needs it.

use common::{
    AuthParams, ClientConfig, InstanceIdentity, Member, Outcome, ReplicasetSnapshot,
    ReplicasetStatus, Topology,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use transport::{Channels, Transport};
use uuid::Uuid;

use crate::interpret::interpret;
use crate::request::{
    AdminRequest, AuthParamsQuery, BootstrapVshardRequest, EditAuthParamsRequest, ExpelRequest,
    HealthRequest, JoinRequest, ProbeRequest, ServersQuery, SnapshotStateRequest,
    TopologyRequest, variables_of,
};
use crate::{AdminError, AdminResult};

/// Administration session bound to one control instance (and optionally one
/// console socket). Build one per run; sessions share nothing.
pub struct AdminSession {
    transport: Box<dyn Transport>,
}

impl AdminSession {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
        }
    }

    pub fn from_config(config: &ClientConfig) -> AdminResult<Self> {
        Ok(Self::new(Channels::from_config(config)?))
    }

    fn call<R: AdminRequest>(&self, request: &R) -> AdminResult<Value> {
        let payload = request.payload();
        debug!(
            operation = payload.operation(),
            channel = payload.kind(),
            variables = %variables_of(&payload),
            "dispatching request"
        );
        interpret(self.transport.send(&payload), request.result_path())
    }

    fn call_as<R: AdminRequest, T: DeserializeOwned>(&self, request: &R) -> AdminResult<T> {
        let value = self.call(request)?;
        serde_json::from_value(value)
            .map_err(|err| AdminError::Remote(format!("Unexpected response shape: {err}")))
    }

    fn report(operation: &'static str, result: AdminResult<Outcome>) -> Outcome {
        match result {
            Ok(outcome) => {
                if outcome.is_changed() {
                    info!(operation, "cluster state changed");
                }
                outcome
            }
            Err(err) => {
                warn!(operation, kind = err.kind(), error = %err, "operation failed");
                err.into()
            }
        }
    }

    /// Register the instance at `request.uri()` with the control instance.
    pub fn probe(&self, request: &ProbeRequest) -> Outcome {
        Self::report("probe", self.try_probe(request))
    }

    fn try_probe(&self, request: &ProbeRequest) -> AdminResult<Outcome> {
        let probed = self.call(request)?;
        if probed.as_bool() == Some(true) {
            info!(uri = request.uri(), "probed instance");
            Ok(Outcome::changed(None))
        } else {
            Err(AdminError::Remote(format!("Probe of {} failed", request.uri())))
        }
    }

    /// Join the instance with the requested roles, or report it already joined.
    pub fn set_roles(&self, request: &JoinRequest) -> Outcome {
        Self::report("set_roles", self.try_set_roles(request))
    }

    fn try_set_roles(&self, request: &JoinRequest) -> AdminResult<Outcome> {
        let servers = self.servers()?;
        if let Some(replicaset) = servers
            .iter()
            .find(|s| s.uri == request.uri())
            .and_then(|s| s.replicaset.as_ref())
        {
            debug!(uri = request.uri(), replicaset = %replicaset.uuid, "instance already joined");
            return Ok(Outcome::unchanged(Some(json!({
                "replicaset_uuid": replicaset.uuid,
            })))
            .with_message(format!("Instance {} is already joined", request.uri())));
        }

        let joined = self.call(request)?;
        if joined.as_bool() != Some(true) {
            return Err(AdminError::Remote(format!("Join of {} failed", request.uri())));
        }
        info!(uri = request.uri(), roles = ?request.roles(), "joined instance");
        Ok(Outcome::changed(None))
    }

    /// Read the health indicator of the instance behind the control socket.
    /// Never changes anything.
    pub fn check_health(&self) -> Outcome {
        Self::report("check_health", self.try_check_health())
    }

    fn try_check_health(&self) -> AdminResult<Outcome> {
        let report: HealthReport = self.call_as(&HealthRequest)?;
        let payload = json!({
            "healthy": report.healthy,
            "state": report.state,
            "status": report.status,
        });
        if report.healthy {
            Ok(Outcome::unchanged(Some(payload)))
        } else {
            let state = report.state.as_deref().unwrap_or("unknown");
            Ok(Outcome::failed_with(
                format!("Instance is not healthy: {state}"),
                payload,
            ))
        }
    }

    /// Report whether a checkpoint (snapshot) is being written right now.
    pub fn check_snapshot_state(&self) -> Outcome {
        Self::report("check_snapshot_state", self.try_check_snapshot_state())
    }

    fn try_check_snapshot_state(&self) -> AdminResult<Outcome> {
        let state: SnapshotState = self.call_as(&SnapshotStateRequest)?;
        Ok(Outcome::unchanged(Some(json!({
            "in_progress": state.in_progress,
        }))))
    }

    /// Fetch the current replicaset list as a [`Topology`].
    pub fn topology(&self) -> AdminResult<Topology> {
        let replicasets: Vec<WireReplicaset> = self.call_as(&TopologyRequest)?;
        let snapshots = replicasets
            .into_iter()
            .map(WireReplicaset::into_snapshot)
            .collect::<AdminResult<Vec<_>>>()?;
        Ok(Topology::from_replicasets(snapshots))
    }

    pub fn get_topology(&self) -> Outcome {
        Self::report(
            "get_topology",
            self.topology().and_then(|topology| {
                let payload = serde_json::to_value(&topology)
                    .map_err(|err| AdminError::Remote(err.to_string()))?;
                Ok(Outcome::unchanged(Some(payload)))
            }),
        )
    }

    pub fn auth_params(&self) -> AdminResult<AuthParams> {
        self.call_as(&AuthParamsQuery)
    }

    pub fn get_auth_params(&self) -> Outcome {
        Self::report(
            "get_auth_params",
            self.auth_params().map(|params| Outcome::unchanged(Some(json!(params)))),
        )
    }

    /// Update auth parameters.
    ///
    /// Only the fields set on the request are compared: if they already hold
    /// the requested values the mutation is skipped, otherwise `changed`
    /// reflects whether any of them differs between the old and new state.
    pub fn edit_auth_params(&self, request: &EditAuthParamsRequest) -> Outcome {
        Self::report("edit_auth_params", self.try_edit_auth_params(request))
    }

    fn try_edit_auth_params(&self, request: &EditAuthParamsRequest) -> AdminResult<Outcome> {
        let wanted = request.params();
        let old = self.auth_params()?;
        if wanted.is_satisfied_by(&old) {
            return Ok(Outcome::unchanged(Some(json!(old))));
        }

        let new: AuthParams = self.call_as(request)?;
        let payload = Some(json!(new));
        if old.project(wanted) != new.project(wanted) {
            info!(params = ?wanted, "auth params updated");
            Ok(Outcome::changed(payload))
        } else {
            Ok(Outcome::unchanged(payload))
        }
    }

    /// Expel an instance. Expelling an instance the cluster does not know is
    /// a successful no-op.
    pub fn expel(&self, request: &ExpelRequest) -> Outcome {
        Self::report("expel", self.try_expel(request))
    }

    fn try_expel(&self, request: &ExpelRequest) -> AdminResult<Outcome> {
        let uuid = request.uuid();
        let known = self.servers()?.iter().any(|s| s.uuid == Some(uuid));
        if !known {
            let not_found = AdminError::NotFound(format!("Instance {uuid} is not in the topology"));
            debug!(%uuid, "{not_found}");
            return Ok(Outcome::unchanged(None).with_message(not_found.to_string()));
        }

        let expelled = self.call(request)?;
        if expelled.as_bool() != Some(true) {
            return Err(AdminError::Remote(format!("Expel of {uuid} failed")));
        }
        info!(%uuid, "expelled instance");
        Ok(Outcome::changed(None))
    }

    /// Bootstrap vshard routing. A cluster that is already bootstrapped is
    /// reported as unchanged.
    pub fn bootstrap_vshard(&self) -> Outcome {
        let result = match self.call(&BootstrapVshardRequest) {
            Ok(value) if value.as_bool() == Some(true) => Ok(Outcome::changed(None)),
            Ok(_) => Ok(Outcome::unchanged(None)),
            Err(AdminError::Remote(message)) if message.contains("already bootstrapped") => {
                Ok(Outcome::unchanged(None).with_message(message))
            }
            Err(err) => Err(err),
        };
        Self::report("bootstrap_vshard", result)
    }

    fn servers(&self) -> AdminResult<Vec<WireServer>> {
        self.call_as(&ServersQuery)
    }
}

#[derive(Debug, Deserialize)]
struct HealthReport {
    #[serde(default)]
    healthy: bool,
    state: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotState {
    #[serde(default)]
    in_progress: bool,
}

#[derive(Debug, Deserialize)]
struct WireServer {
    uri: String,
    #[serde(default, deserialize_with = "lenient_uuid")]
    uuid: Option<Uuid>,
    replicaset: Option<WireReplicasetRef>,
}

#[derive(Debug, Deserialize)]
struct WireReplicasetRef {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    uuid: Uuid,
    alias: Option<String>,
    uri: String,
}

impl WireMember {
    fn into_member(self) -> AdminResult<Member> {
        let name = self.alias.unwrap_or_else(|| self.uri.clone());
        let identity = InstanceIdentity::from_uri(name, &self.uri)
            .map_err(|err| AdminError::Remote(err.to_string()))?;
        Ok(Member {
            uuid: self.uuid,
            identity,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireReplicaset {
    uuid: Uuid,
    alias: String,
    status: String,
    #[serde(default)]
    roles: Value,
    master: Option<WireMember>,
    #[serde(default)]
    members: Vec<WireMember>,
}

impl WireReplicaset {
    fn into_snapshot(self) -> AdminResult<ReplicasetSnapshot> {
        // An empty Lua table may arrive as `{}` rather than `[]`.
        let roles = match self.roles {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|role| role.as_str().map(str::to_string))
                .collect(),
            _ => Default::default(),
        };
        let members = self
            .members
            .into_iter()
            .map(WireMember::into_member)
            .collect::<AdminResult<Vec<_>>>()?;
        let master = match self.master {
            Some(master) => master.into_member()?.identity,
            None => members
                .first()
                .map(|m| m.identity.clone())
                .ok_or_else(|| {
                    AdminError::Remote(format!("Replicaset {} has no members", self.alias))
                })?,
        };
        Ok(ReplicasetSnapshot {
            uuid: self.uuid,
            alias: self.alias,
            status: ReplicasetStatus::parse(&self.status),
            roles,
            master,
            members,
        })
    }
}

/// Unconfigured servers may report an empty uuid.
fn lenient_uuid<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<Uuid>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| Uuid::parse_str(&raw).ok()))
}
