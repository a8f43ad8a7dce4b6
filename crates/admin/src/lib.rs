//! Cluster administration client.
//!
//! Typed requests ([`request`]) are rendered into transport payloads, sent
//! over HTTP or the control socket, and the raw replies are classified by
//! [`interpret()`] before [`AdminSession`] turns them into an
//! [`common::Outcome`].

pub mod error;
pub mod interpret;
pub mod request;
pub mod session;

pub use error::{AdminError, AdminResult};
pub use interpret::{error_text, interpret};
pub use request::{
    AdminRequest, AuthParamsQuery, BootstrapVshardRequest, EditAuthParamsRequest, ExpelRequest,
    HealthRequest, JoinRequest, ProbeRequest, ServersQuery, SnapshotStateRequest,
    TopologyRequest, EMPTY_AUTH_PARAMS, EMPTY_ROLES,
};
pub use session::AdminSession;
