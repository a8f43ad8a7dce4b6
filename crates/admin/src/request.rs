//! Typed administrative requests.
//!
//! Each request is validated when it is constructed and renders exactly one
//! [`Payload`]. GraphQL documents are constants; caller data goes through
//! variables. Console scripts are constant Lua bodies; caller data goes
//! through JSON arguments.

use common::{split_uri, AuthParams};
use serde_json::{json, Value};
use transport::{ConsoleCall, GraphqlRequest, Payload};
use uuid::Uuid;

use crate::{AdminError, AdminResult};

pub const EMPTY_ROLES: &str = "Instance roles list must be non-empty";
pub const EMPTY_AUTH_PARAMS: &str = "Auth params must not be empty";

/// Common shape of every typed request.
pub trait AdminRequest {
    /// Location of the operation's result under `data` in a GraphQL response.
    /// Console requests return an empty path: the result is the whole value.
    fn result_path(&self) -> &'static [&'static str];

    fn payload(&self) -> Payload;
}

const PROBE_SERVER: &str = "\
mutation probe_server($uri: String!) {
  probe_server(uri: $uri)
}";

const JOIN_SERVER: &str = "\
mutation join_server(
  $uri: String!, $instance_uuid: String, $replicaset_uuid: String,
  $replicaset_alias: String, $roles: [String!], $vshard_group: String,
  $replicaset_weight: Float, $zone: String
) {
  join_server(
    uri: $uri, instance_uuid: $instance_uuid, replicaset_uuid: $replicaset_uuid,
    replicaset_alias: $replicaset_alias, roles: $roles, vshard_group: $vshard_group,
    replicaset_weight: $replicaset_weight, zone: $zone
  )
}";

const SERVERS: &str = "\
query servers {
  servers { uri uuid alias replicaset { uuid alias } }
}";

const EXPEL_SERVER: &str = "\
mutation expel_server($uuid: String!) {
  expel_server(uuid: $uuid)
}";

const AUTH_PARAMS: &str = "\
query auth_params {
  cluster { auth_params { enabled cookie_max_age cookie_renew_age } }
}";

const EDIT_AUTH_PARAMS: &str = "\
mutation edit_auth_params($enabled: Boolean, $cookie_max_age: Long, $cookie_renew_age: Long) {
  cluster {
    auth_params(enabled: $enabled, cookie_max_age: $cookie_max_age, cookie_renew_age: $cookie_renew_age) {
      enabled cookie_max_age cookie_renew_age
    }
  }
}";

const BOOTSTRAP_VSHARD: &str = "\
mutation bootstrap_vshard {
  bootstrap_vshard
}";

const HEALTH_SCRIPT: &str = "
local confapplier = require('cartridge.confapplier')
local membership = require('membership')
local state = confapplier.get_state()
local box_status = type(box.cfg) == 'function' and 'unconfigured' or box.info.status
local myself = membership.myself()
local alive = myself ~= nil and myself.status == 'alive'
local healthy = state == 'RolesConfigured' and box_status == 'running' and alive
return {healthy = healthy, state = state, status = box_status}
";

const SNAPSHOT_STATE_SCRIPT: &str = "
if type(box.cfg) == 'function' then return nil, 'Box is not configured' end
return {in_progress = box.info.gc().checkpoint_is_in_progress}
";

const TOPOLOGY_SCRIPT: &str = "
local replicasets, err = require('cartridge').admin_get_replicasets()
if replicasets == nil then return nil, err end
local result = {}
for _, r in ipairs(replicasets) do
  local members = {}
  for _, s in ipairs(r.servers) do
    table.insert(members, {uuid = s.uuid, alias = s.alias, uri = s.uri})
  end
  local master = r.master and {uuid = r.master.uuid, alias = r.master.alias, uri = r.master.uri}
  table.insert(result, {uuid = r.uuid, alias = r.alias, status = r.status, roles = r.roles, master = master, members = members})
end
return result
";

fn validate_uri(uri: &str) -> AdminResult<String> {
    split_uri(uri)?;
    Ok(uri.trim().to_string())
}

/// Register an instance with the control instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    uri: String,
}

impl ProbeRequest {
    pub fn new(uri: &str) -> AdminResult<Self> {
        Ok(Self {
            uri: validate_uri(uri)?,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl AdminRequest for ProbeRequest {
    fn result_path(&self) -> &'static [&'static str] {
        &["probe_server"]
    }

    fn payload(&self) -> Payload {
        Payload::Graphql(
            GraphqlRequest::new("probe_server", PROBE_SERVER).variable("uri", self.uri.as_str()),
        )
    }
}

/// Join an instance to a replicaset with the given roles.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    uri: String,
    roles: Option<Vec<String>>,
    replicaset_alias: Option<String>,
    replicaset_uuid: Option<Uuid>,
    instance_uuid: Option<Uuid>,
    vshard_group: Option<String>,
    weight: Option<f64>,
    zone: Option<String>,
}

impl JoinRequest {
    /// `roles` may be omitted to join an existing replicaset as is, but an
    /// explicit list must name at least one role.
    pub fn new(uri: &str, roles: Option<Vec<String>>) -> AdminResult<Self> {
        let uri = validate_uri(uri)?;
        if let Some(roles) = &roles {
            if roles.is_empty() {
                return Err(AdminError::validation(EMPTY_ROLES));
            }
            if roles.iter().any(|role| role.trim().is_empty()) {
                return Err(AdminError::validation("Role names must not be blank"));
            }
        }
        Ok(Self {
            uri,
            roles,
            replicaset_alias: None,
            replicaset_uuid: None,
            instance_uuid: None,
            vshard_group: None,
            weight: None,
            zone: None,
        })
    }

    pub fn with_replicaset_alias(mut self, alias: impl Into<String>) -> Self {
        self.replicaset_alias = Some(alias.into());
        self
    }

    pub fn with_replicaset_uuid(mut self, uuid: Uuid) -> Self {
        self.replicaset_uuid = Some(uuid);
        self
    }

    pub fn with_instance_uuid(mut self, uuid: Uuid) -> Self {
        self.instance_uuid = Some(uuid);
        self
    }

    pub fn with_vshard_group(mut self, group: impl Into<String>) -> Self {
        self.vshard_group = Some(group.into());
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> AdminResult<Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(AdminError::validation(format!(
                "Replicaset weight must be a non-negative number, got {weight}"
            )));
        }
        self.weight = Some(weight);
        Ok(self)
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn roles(&self) -> Option<&[String]> {
        self.roles.as_deref()
    }

    pub fn replicaset_alias(&self) -> Option<&str> {
        self.replicaset_alias.as_deref()
    }
}

impl AdminRequest for JoinRequest {
    fn result_path(&self) -> &'static [&'static str] {
        &["join_server"]
    }

    fn payload(&self) -> Payload {
        let uuid_var = |uuid: Option<Uuid>| uuid.map(|u| Value::String(u.to_string()));
        Payload::Graphql(
            GraphqlRequest::new("join_server", JOIN_SERVER)
                .variable("uri", self.uri.as_str())
                .variable("instance_uuid", uuid_var(self.instance_uuid))
                .variable("replicaset_uuid", uuid_var(self.replicaset_uuid))
                .variable("replicaset_alias", self.replicaset_alias.clone())
                .variable("roles", self.roles.clone())
                .variable("vshard_group", self.vshard_group.clone())
                .variable("replicaset_weight", self.weight)
                .variable("zone", self.zone.clone()),
        )
    }
}

/// List every server the control instance knows, joined or not.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ServersQuery;

impl AdminRequest for ServersQuery {
    fn result_path(&self) -> &'static [&'static str] {
        &["servers"]
    }

    fn payload(&self) -> Payload {
        Payload::Graphql(GraphqlRequest::new("servers", SERVERS))
    }
}

/// Mark an instance as expelled from the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpelRequest {
    uuid: Uuid,
}

impl ExpelRequest {
    pub fn new(uuid: &str) -> AdminResult<Self> {
        let uuid = Uuid::parse_str(uuid.trim())
            .map_err(|err| AdminError::validation(format!("Invalid instance uuid '{uuid}': {err}")))?;
        Ok(Self { uuid })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl AdminRequest for ExpelRequest {
    fn result_path(&self) -> &'static [&'static str] {
        &["expel_server"]
    }

    fn payload(&self) -> Payload {
        Payload::Graphql(
            GraphqlRequest::new("expel_server", EXPEL_SERVER)
                .variable("uuid", self.uuid.to_string()),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AuthParamsQuery;

impl AdminRequest for AuthParamsQuery {
    fn result_path(&self) -> &'static [&'static str] {
        &["cluster", "auth_params"]
    }

    fn payload(&self) -> Payload {
        Payload::Graphql(GraphqlRequest::new("auth_params", AUTH_PARAMS))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditAuthParamsRequest {
    params: AuthParams,
}

impl EditAuthParamsRequest {
    pub fn new(params: AuthParams) -> AdminResult<Self> {
        if params.is_empty() {
            return Err(AdminError::validation(EMPTY_AUTH_PARAMS));
        }
        if let (Some(max_age), Some(renew_age)) = (params.cookie_max_age, params.cookie_renew_age) {
            if renew_age > max_age {
                return Err(AdminError::validation(format!(
                    "cookie_renew_age ({renew_age}) must not exceed cookie_max_age ({max_age})"
                )));
            }
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &AuthParams {
        &self.params
    }
}

impl AdminRequest for EditAuthParamsRequest {
    fn result_path(&self) -> &'static [&'static str] {
        &["cluster", "auth_params"]
    }

    fn payload(&self) -> Payload {
        Payload::Graphql(
            GraphqlRequest::new("edit_auth_params", EDIT_AUTH_PARAMS)
                .variable("enabled", self.params.enabled)
                .variable("cookie_max_age", self.params.cookie_max_age)
                .variable("cookie_renew_age", self.params.cookie_renew_age),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BootstrapVshardRequest;

impl AdminRequest for BootstrapVshardRequest {
    fn result_path(&self) -> &'static [&'static str] {
        &["bootstrap_vshard"]
    }

    fn payload(&self) -> Payload {
        Payload::Graphql(GraphqlRequest::new("bootstrap_vshard", BOOTSTRAP_VSHARD))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthRequest;

impl AdminRequest for HealthRequest {
    fn result_path(&self) -> &'static [&'static str] {
        &[]
    }

    fn payload(&self) -> Payload {
        Payload::Console(ConsoleCall::new("check_health", HEALTH_SCRIPT))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnapshotStateRequest;

impl AdminRequest for SnapshotStateRequest {
    fn result_path(&self) -> &'static [&'static str] {
        &[]
    }

    fn payload(&self) -> Payload {
        Payload::Console(ConsoleCall::new("check_snapshot_state", SNAPSHOT_STATE_SCRIPT))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TopologyRequest;

impl AdminRequest for TopologyRequest {
    fn result_path(&self) -> &'static [&'static str] {
        &[]
    }

    fn payload(&self) -> Payload {
        Payload::Console(ConsoleCall::new("get_topology", TOPOLOGY_SCRIPT))
    }
}

/// Caller data of a payload: GraphQL variables or console arguments.
pub fn variables_of(payload: &Payload) -> Value {
    match payload {
        Payload::Graphql(request) => Value::Object(request.variables.clone()),
        Payload::Console(call) => json!(call.args),
    }
}
