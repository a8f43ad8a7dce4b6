//! In-memory cluster that answers admin payloads the way a control instance
//! does, so façade behavior can be checked without a running cluster.

#![allow(dead_code)]

use common::AuthParams;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use transport::{Payload, RawResponse, Transport, TransportResult};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Server {
    uri: String,
    alias: String,
    uuid: Option<Uuid>,
    replicaset: Option<Uuid>,
}

#[derive(Debug, Clone)]
struct Replicaset {
    alias: String,
    roles: Vec<String>,
}

#[derive(Debug)]
struct State {
    reachable: BTreeMap<String, String>,
    servers: Vec<Server>,
    replicasets: BTreeMap<Uuid, Replicaset>,
    auth: AuthParams,
    bootstrapped: bool,
    healthy: bool,
    sent: Vec<&'static str>,
}

#[derive(Clone)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                reachable: BTreeMap::new(),
                servers: Vec::new(),
                replicasets: BTreeMap::new(),
                auth: AuthParams {
                    enabled: Some(false),
                    cookie_max_age: Some(2_592_000),
                    cookie_renew_age: Some(86_400),
                },
                bootstrapped: false,
                healthy: true,
                sent: Vec::new(),
            })),
        }
    }

    /// Make an instance with `alias` answer probes at `uri`.
    pub fn with_instance(self, alias: &str, uri: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .reachable
            .insert(uri.to_string(), alias.to_string());
        self
    }

    pub fn unhealthy(self) -> Self {
        self.state.lock().unwrap().healthy = false;
        self
    }

    /// Operations received so far, in order.
    pub fn sent(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.sent().iter().filter(|op| **op == operation).count()
    }

    pub fn instance_uuid(&self, alias: &str) -> Option<Uuid> {
        let state = self.state.lock().unwrap();
        state
            .servers
            .iter()
            .find(|s| s.alias == alias)
            .and_then(|s| s.uuid)
    }
}

fn data(body: Value) -> TransportResult<RawResponse> {
    Ok(RawResponse::Http {
        status: 200,
        body: json!({ "data": body }),
    })
}

fn graphql_error(message: String) -> TransportResult<RawResponse> {
    Ok(RawResponse::Http {
        status: 200,
        body: json!({ "errors": [{ "message": message }] }),
    })
}

fn console(result: Value) -> TransportResult<RawResponse> {
    Ok(RawResponse::Console {
        result,
        error: None,
    })
}

fn str_var<'a>(vars: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    vars.get(name).and_then(Value::as_str)
}

impl State {
    fn graphql(&mut self, operation: &str, vars: &Map<String, Value>) -> TransportResult<RawResponse> {
        match operation {
            "probe_server" => {
                let uri = str_var(vars, "uri").unwrap_or_default().to_string();
                let Some(alias) = self.reachable.get(&uri).cloned() else {
                    return graphql_error(format!("Probe {uri:?} failed: no response"));
                };
                if !self.servers.iter().any(|s| s.uri == uri) {
                    self.servers.push(Server {
                        uri,
                        alias,
                        uuid: None,
                        replicaset: None,
                    });
                }
                data(json!({ "probe_server": true }))
            }
            "join_server" => {
                let uri = str_var(vars, "uri").unwrap_or_default();
                let Some(index) = self.servers.iter().position(|s| s.uri == uri) else {
                    return graphql_error(format!("Server {uri:?} is not in membership"));
                };
                if self.servers[index].replicaset.is_some() {
                    return graphql_error(format!("Server {uri:?} is already joined"));
                }
                let roles: Vec<String> = vars
                    .get("roles")
                    .and_then(Value::as_array)
                    .map(|roles| {
                        roles
                            .iter()
                            .filter_map(|r| r.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let alias = str_var(vars, "replicaset_alias")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("replicaset-{}", self.replicasets.len() + 1));
                let existing = self
                    .replicasets
                    .iter()
                    .find(|(_, r)| r.alias == alias)
                    .map(|(uuid, _)| *uuid);
                let replicaset = match existing {
                    Some(uuid) => uuid,
                    None => {
                        let uuid = Uuid::new_v4();
                        self.replicasets.insert(uuid, Replicaset { alias, roles });
                        uuid
                    }
                };
                let server = &mut self.servers[index];
                server.uuid = Some(Uuid::new_v4());
                server.replicaset = Some(replicaset);
                data(json!({ "join_server": true }))
            }
            "servers" => {
                let servers: Vec<Value> = self
                    .servers
                    .iter()
                    .map(|s| {
                        let replicaset = s.replicaset.map(|uuid| {
                            json!({ "uuid": uuid, "alias": self.replicasets[&uuid].alias })
                        });
                        json!({
                            "uri": s.uri,
                            "alias": s.alias,
                            "uuid": s.uuid.map(|u| u.to_string()).unwrap_or_default(),
                            "replicaset": replicaset,
                        })
                    })
                    .collect();
                data(json!({ "servers": servers }))
            }
            "expel_server" => {
                let uuid = str_var(vars, "uuid").and_then(|u| Uuid::parse_str(u).ok());
                let before = self.servers.len();
                self.servers.retain(|s| s.uuid.is_none() || s.uuid != uuid);
                if self.servers.len() == before {
                    return graphql_error("Server not in config".to_string());
                }
                let servers = &self.servers;
                self.replicasets
                    .retain(|uuid, _| servers.iter().any(|s| s.replicaset == Some(*uuid)));
                data(json!({ "expel_server": true }))
            }
            "auth_params" => data(json!({ "cluster": { "auth_params": self.auth } })),
            "edit_auth_params" => {
                if let Some(enabled) = vars.get("enabled").and_then(Value::as_bool) {
                    self.auth.enabled = Some(enabled);
                }
                if let Some(age) = vars.get("cookie_max_age").and_then(Value::as_u64) {
                    self.auth.cookie_max_age = Some(age);
                }
                if let Some(age) = vars.get("cookie_renew_age").and_then(Value::as_u64) {
                    self.auth.cookie_renew_age = Some(age);
                }
                data(json!({ "cluster": { "auth_params": self.auth } }))
            }
            "bootstrap_vshard" => {
                if self.bootstrapped {
                    return graphql_error("Sharding config is already bootstrapped".to_string());
                }
                self.bootstrapped = true;
                data(json!({ "bootstrap_vshard": true }))
            }
            other => graphql_error(format!("Unknown operation {other}")),
        }
    }

    fn console(&self, operation: &str) -> TransportResult<RawResponse> {
        match operation {
            "check_health" => console(json!({
                "healthy": self.healthy,
                "state": if self.healthy { "RolesConfigured" } else { "ConfiguringRoles" },
                "status": "running",
            })),
            "check_snapshot_state" => console(json!({ "in_progress": false })),
            "get_topology" => {
                let replicasets: Vec<Value> = self
                    .replicasets
                    .iter()
                    .map(|(uuid, replicaset)| {
                        let members: Vec<Value> = self
                            .servers
                            .iter()
                            .filter(|s| s.replicaset == Some(*uuid))
                            .map(|s| json!({ "uuid": s.uuid, "alias": s.alias, "uri": s.uri }))
                            .collect();
                        json!({
                            "uuid": uuid,
                            "alias": replicaset.alias,
                            "status": "healthy",
                            "roles": replicaset.roles,
                            "master": members.first(),
                            "members": members,
                        })
                    })
                    .collect();
                console(Value::Array(replicasets))
            }
            other => Ok(RawResponse::Console {
                result: Value::Null,
                error: Some(json!(format!("Unknown operation {other}"))),
            }),
        }
    }
}

impl Transport for FakeCluster {
    fn send(&self, payload: &Payload) -> TransportResult<RawResponse> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(payload.operation());
        match payload {
            Payload::Graphql(request) => state.graphql(request.operation, &request.variables),
            Payload::Console(call) => state.console(call.operation),
        }
    }
}
