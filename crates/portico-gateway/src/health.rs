//! Health probes.
//!
//! `/health` answers JSON and `/healthz` answers plain text. Both report the
//! readiness found by a fresh [`RpcConnection::check`](crate::RpcConnection::check)
//! and never change the connection.

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionState;
use crate::status::{json_response, response, HttpResponse};

/// Path of the JSON probe.
pub const HEALTH_PATH: &str = "/health";
/// Path of the plain-text probe.
pub const HEALTHZ_PATH: &str = "/healthz";

/// Body of the JSON probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Whether the RPC connection is ready.
    pub ok: bool,
    /// Connection state when not ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HealthReport {
    /// Report for `state`.
    pub fn of(state: ConnectionState) -> Self {
        if state == ConnectionState::Ready {
            Self {
                ok: true,
                reason: None,
            }
        } else {
            Self {
                ok: false,
                reason: Some(state.to_string()),
            }
        }
    }
}

fn probe_status(state: ConnectionState) -> StatusCode {
    if state == ConnectionState::Ready {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    }
}

/// `{"ok":true}`, or `{"ok":false,"reason":"<state>"}` with 502.
pub fn health(state: ConnectionState) -> HttpResponse {
    json_response(probe_status(state), &HealthReport::of(state))
}

/// `ok`, or `grpc server is <state>` with 502.
pub fn healthz(state: ConnectionState) -> HttpResponse {
    let body = if state == ConnectionState::Ready {
        "ok\n".to_string()
    } else {
        format!("grpc server is {state}\n")
    };
    response(probe_status(state), "text/plain; charset=utf-8", body)
}
