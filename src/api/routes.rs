//! Request dispatch
//!
//! | Route                      | Methods |
//! |----------------------------|---------|
//! | `/api/state`               | GET     |
//! | `/api/well-known`          | GET     |
//! | `/api/ports`               | POST    |
//! | `/api/ports/{port}`        | DELETE  |
//! | `/api/status`              | GET     |
//! | `/api/firewall/start`      | POST    |
//! | `/api/firewall/stop`       | POST    |
//! | `/api/logs`                | GET     |
//! | `/api/interfaces`          | GET     |
//! | `/`, `/<asset>`            | GET     |

use super::AppContext;
use super::response::{self, ApiResponse};
use super::static_files;
use crate::core::controller::ControllerPhase;
use crate::core::error::Error;
use crate::core::logs::{LOG_TAIL_LINES, read_recent_lines};
use crate::core::ports::Port;
use crate::core::program::FirewallStatus;
use crate::core::well_known::well_known_ports;
use crate::validators::list_interfaces;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{Method, Request, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct StatusBody {
    status: FirewallStatus,
    phase: ControllerPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    interface: Option<String>,
}

#[derive(Debug, Serialize)]
struct LogsBody {
    logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct InterfacesBody {
    interfaces: Vec<String>,
    default: String,
}

/// Handles one request. Never fails: every error becomes a response.
pub async fn handle<B>(req: Request<B>, ctx: Arc<AppContext>) -> ApiResponse
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("{method} {path}");

    if path == "/api" || path.starts_with("/api/") {
        let route = path.trim_start_matches("/api").trim_matches('/').to_string();
        return api(&method, &route, req.into_body(), &ctx).await;
    }

    if method != Method::GET && method != Method::HEAD {
        return response::method_not_allowed("GET, HEAD");
    }

    if path == "/" {
        let index = ctx.config.static_path().join(&ctx.config.index_file);
        return static_files::serve_file(&index).await;
    }
    static_files::serve(&ctx.config.static_path(), &path).await
}

async fn api<B>(method: &Method, route: &str, body: B, ctx: &AppContext) -> ApiResponse
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let segments: Vec<&str> = route.split('/').collect();

    match (segments.as_slice(), method) {
        (["state"], &Method::GET) => response::ok(&ctx.ports.merged_state().await),
        (["state"], _) => response::method_not_allowed("GET"),

        (["well-known"], &Method::GET) => response::ok(&well_known_ports()),
        (["well-known"], _) => response::method_not_allowed("GET"),

        (["ports"], &Method::POST) => add_port(body, ctx).await,
        (["ports"], _) => response::method_not_allowed("POST"),

        (["ports", raw], &Method::DELETE) => match raw.parse::<Port>() {
            Ok(port) => result(ctx.ports.remove_port(port).await),
            Err(e) => response::from_error(&e),
        },
        (["ports", _], _) => response::method_not_allowed("DELETE"),

        (["status"], &Method::GET) => {
            let state = ctx.controller.state();
            response::ok(&StatusBody {
                status: ctx.controller.program().status().await,
                phase: state.phase,
                interface: state.interface,
            })
        }
        (["status"], _) => response::method_not_allowed("GET"),

        (["firewall", "start"], &Method::POST) => start(body, ctx).await,
        (["firewall", "stop"], &Method::POST) => result(ctx.controller.stop().await),
        (["firewall", "start" | "stop"], _) => response::method_not_allowed("POST"),

        (["logs"], &Method::GET) => logs(ctx).await,
        (["logs"], _) => response::method_not_allowed("GET"),

        (["interfaces"], &Method::GET) => response::ok(&InterfacesBody {
            interfaces: list_interfaces(),
            default: ctx.config.default_interface.clone(),
        }),
        (["interfaces"], _) => response::method_not_allowed("GET"),

        _ => response::error_message(StatusCode::NOT_FOUND, "Not found"),
    }
}

fn result<T: Serialize>(outcome: crate::core::error::Result<T>) -> ApiResponse {
    match outcome {
        Ok(body) => response::ok(&body),
        Err(e) => response::from_error(&e),
    }
}

/// Reads a JSON body. An empty body is `None`.
async fn read_json<B>(body: B) -> Result<Option<Value>, ApiResponse>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(response::error_message(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
            ));
        }
        Err(e) => {
            debug!("Failed to read request body: {e}");
            return Err(response::error_message(
                StatusCode::BAD_REQUEST,
                "Failed to read request body",
            ));
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|_| response::error_message(StatusCode::BAD_REQUEST, "Invalid JSON body"))
}

async fn add_port<B>(body: B, ctx: &AppContext) -> ApiResponse
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = match read_json(body).await {
        Ok(body) => body.unwrap_or(Value::Null),
        Err(response) => return response,
    };
    match Port::from_json(&body["port"]) {
        Ok(port) => result(ctx.ports.add_port(port).await),
        Err(e) => response::from_error(&e),
    }
}

async fn start<B>(body: B, ctx: &AppContext) -> ApiResponse
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = match read_json(body).await {
        Ok(body) => body.unwrap_or(Value::Null),
        Err(response) => return response,
    };
    let iface = match &body["iface"] {
        Value::Null => ctx.config.default_interface.clone(),
        Value::String(s) if s.trim().is_empty() => ctx.config.default_interface.clone(),
        Value::String(s) => s.trim().to_string(),
        _ => {
            return response::from_error(&Error::validation(
                "iface",
                "Interface name must be a string",
            ));
        }
    };
    result(ctx.controller.start(&iface).await)
}

async fn logs(ctx: &AppContext) -> ApiResponse {
    let body = match read_recent_lines(&ctx.config.log_path(), LOG_TAIL_LINES).await {
        Ok(logs) => LogsBody { logs, error: None },
        Err(e) => {
            debug!("Log file unavailable: {e}");
            LogsBody {
                logs: Vec::new(),
                error: Some("Log file not found or empty".to_string()),
            }
        }
    };
    response::ok(&body)
}
