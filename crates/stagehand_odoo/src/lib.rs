//! # Stagehand Odoo
//!
//! A [`ManagementApi`] speaking Odoo's JSON-RPC protocol.
//!
//! Every call is a `POST /jsonrpc` naming a service (`common` or `object`), a method and
//! positional arguments. Registry work goes through `execute_kw` on `ir.module.module`.
//!
//! ```no_run
//! use stagehand_core::prelude::*;
//! use stagehand_odoo::OdooRpc;
//!
//! async fn run() -> Result<(), ManagementError> {
//!     let rpc = OdooRpc::new();
//!     let endpoint = Endpoint {
//!         base_url: "http://127.0.0.1:49153".into(),
//!         database: "odoo-1234abcd-db".into(),
//!     };
//!     let session = rpc
//!         .authenticate(&endpoint, &Credentials { login: "admin".into(), password: "admin".into() })
//!         .await?;
//!     rpc.refresh_registry(&session).await?;
//!     Ok(())
//! }
//! ```

use stagehand_core::prelude::*;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const MODULE_MODEL: &str = "ir.module.module";

/// Markers of a scheduled task holding the registry lock.
const LOCK_MARKERS: [&str; 2] = ["invalid operation", "could not obtain lock"];

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Deserialize, Default)]
struct RpcErrorData {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    debug: String,
}

impl RpcError {
    fn into_management_error(self) -> ManagementError {
        let data = self.data.unwrap_or_default();
        let haystack = format!("{} {} {} {}", self.message, data.name, data.message, data.debug)
            .to_lowercase();

        let summary = if data.message.is_empty() {
            self.message
        } else {
            data.message
        };

        if LOCK_MARKERS.iter().any(|m| haystack.contains(m)) {
            ManagementError::Locked(summary)
        } else {
            ManagementError::Rpc(summary)
        }
    }
}

#[derive(Deserialize)]
struct ModuleRow {
    id: i64,
    name: String,
    state: String,
}

/// JSON-RPC client for a workload's management interface.
#[derive(Clone)]
pub struct OdooRpc {
    client: Client,
    probe_timeout: Duration,
    request_timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl Default for OdooRpc {
    fn default() -> Self {
        Self::new()
    }
}

impl OdooRpc {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            probe_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(300),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Upper bound for a single reachability probe.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Upper bound for any other call. Installs can take minutes on a cold registry.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn call(
        &self,
        base_url: &str,
        service: &str,
        method: &str,
        args: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, ManagementError> {
        let url = format!("{}/jsonrpc", base_url.trim_end_matches('/'));
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": { "service": service, "method": method, "args": args },
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let request = self
            .client
            .post(&url)
            .json(&body)
            .timeout(timeout.unwrap_or(self.request_timeout));

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ManagementError::Unreachable(e.to_string())
            } else {
                ManagementError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                ManagementError::Unreachable(format!("{status}: {text}"))
            } else {
                ManagementError::Transport(format!("{status}: {text}"))
            });
        }

        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| ManagementError::Transport(format!("Failed to parse response: {e}")))?;

        if let Some(error) = rpc.error {
            let err = error.into_management_error();
            tracing::debug!(service, method, error = %err, "JSON-RPC call failed");
            return Err(err);
        }

        Ok(rpc.result.unwrap_or(Value::Null))
    }

    async fn execute_kw(
        &self,
        session: &Session,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, ManagementError> {
        self.call(
            &session.endpoint.base_url,
            "object",
            "execute_kw",
            json!([
                session.endpoint.database,
                session.uid,
                session.password,
                MODULE_MODEL,
                method,
                args,
                kwargs,
            ]),
            None,
        )
        .await
    }
}

impl ManagementApi for OdooRpc {
    async fn version(&self, endpoint: &Endpoint) -> Result<String, ManagementError> {
        let result = self
            .call(
                &endpoint.base_url,
                "common",
                "version",
                json!([]),
                Some(self.probe_timeout),
            )
            .await?;

        Ok(result
            .get("server_version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    async fn authenticate(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Session, ManagementError> {
        let result = self
            .call(
                &endpoint.base_url,
                "common",
                "authenticate",
                json!([endpoint.database, credentials.login, credentials.password, {}]),
                None,
            )
            .await?;

        // A rejected login answers `false` rather than an error.
        let Some(uid) = result.as_i64().filter(|uid| *uid > 0) else {
            return Err(ManagementError::AuthenticationFailed(
                credentials.login.clone(),
            ));
        };

        Ok(Session {
            endpoint: endpoint.clone(),
            uid,
            password: credentials.password.clone(),
        })
    }

    async fn refresh_registry(&self, session: &Session) -> Result<(), ManagementError> {
        self.execute_kw(session, "update_list", json!([]), json!({}))
            .await?;
        Ok(())
    }

    async fn find_extension(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Option<ExtensionRecord>, ManagementError> {
        let result = self
            .execute_kw(
                session,
                "search_read",
                json!([[["name", "=", name]]]),
                json!({ "fields": ["id", "name", "state"], "limit": 1 }),
            )
            .await?;

        let rows: Vec<ModuleRow> = serde_json::from_value(result)
            .map_err(|e| ManagementError::Transport(format!("Unexpected search_read result: {e}")))?;

        Ok(rows.into_iter().next().map(|row| ExtensionRecord {
            id: row.id,
            name: row.name,
            state: ExtensionState::parse(&row.state),
        }))
    }

    async fn install_extension(
        &self,
        session: &Session,
        extension: &ExtensionRecord,
    ) -> Result<(), ManagementError> {
        self.execute_kw(
            session,
            "button_immediate_install",
            json!([[extension.id]]),
            json!({}),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(server: &MockServer) -> Endpoint {
        Endpoint {
            base_url: server.uri(),
            database: "odoo-1234abcd-db".into(),
        }
    }

    fn session(server: &MockServer) -> Session {
        Session {
            endpoint: endpoint(server),
            uid: 2,
            password: "admin".into(),
        }
    }

    fn admin() -> Credentials {
        Credentials {
            login: "admin".into(),
            password: "admin".into(),
        }
    }

    async fn respond(server: &MockServer, params: Value, body: Value) {
        Mock::given(method("POST"))
            .and(path("/jsonrpc"))
            .and(body_partial_json(json!({ "params": params })))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn lock_error() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": 200,
                "message": "Odoo Server Error",
                "data": {
                    "name": "psycopg2.errors.LockNotAvailable",
                    "message": "could not obtain lock on row in relation \"ir_module_module\"",
                    "debug": "Traceback ..."
                }
            }
        })
    }

    #[tokio::test]
    async fn version_reads_server_version() {
        let server = MockServer::start().await;
        respond(
            &server,
            json!({ "service": "common", "method": "version" }),
            json!({ "jsonrpc": "2.0", "id": 1, "result": { "server_version": "19.0" } }),
        )
        .await;

        let version = OdooRpc::new().version(&endpoint(&server)).await.unwrap();
        assert_eq!(version, "19.0");
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let endpoint = Endpoint {
            base_url: "http://127.0.0.1:9".into(),
            database: "x".into(),
        };
        let err = OdooRpc::new().version(&endpoint).await.unwrap_err();
        assert!(matches!(err, ManagementError::Unreachable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn authenticate_returns_session_for_uid() {
        let server = MockServer::start().await;
        respond(
            &server,
            json!({ "service": "common", "method": "authenticate",
                    "args": ["odoo-1234abcd-db", "admin", "admin", {}] }),
            json!({ "jsonrpc": "2.0", "id": 1, "result": 2 }),
        )
        .await;

        let session = OdooRpc::new()
            .authenticate(&endpoint(&server), &admin())
            .await
            .unwrap();
        assert_eq!(session.uid, 2);
        assert_eq!(session.endpoint.database, "odoo-1234abcd-db");
    }

    #[tokio::test]
    async fn rejected_login_is_an_authentication_failure() {
        let server = MockServer::start().await;
        respond(
            &server,
            json!({ "method": "authenticate" }),
            json!({ "jsonrpc": "2.0", "id": 1, "result": false }),
        )
        .await;

        let err = OdooRpc::new()
            .authenticate(&endpoint(&server), &admin())
            .await
            .unwrap_err();
        assert_eq!(err, ManagementError::AuthenticationFailed("admin".into()));
    }

    #[tokio::test]
    async fn lock_errors_are_retryable() {
        let server = MockServer::start().await;
        respond(&server, json!({ "method": "execute_kw" }), lock_error()).await;

        let err = OdooRpc::new()
            .refresh_registry(&session(&server))
            .await
            .unwrap_err();
        assert!(err.is_locked(), "{err:?}");
    }

    #[tokio::test]
    async fn other_rpc_errors_are_not_locks() {
        let server = MockServer::start().await;
        respond(
            &server,
            json!({ "method": "execute_kw" }),
            json!({
                "jsonrpc": "2.0", "id": 1,
                "error": { "code": 200, "message": "Odoo Server Error",
                           "data": { "name": "odoo.exceptions.AccessError", "message": "Access Denied" } }
            }),
        )
        .await;

        let err = OdooRpc::new()
            .refresh_registry(&session(&server))
            .await
            .unwrap_err();
        assert_eq!(err, ManagementError::Rpc("Access Denied".into()));
    }

    #[tokio::test]
    async fn find_extension_maps_module_state() {
        let server = MockServer::start().await;
        respond(
            &server,
            json!({ "args": ["odoo-1234abcd-db", 2, "admin", "ir.module.module", "search_read",
                             [[["name", "=", "brand_theme"]]],
                             { "fields": ["id", "name", "state"], "limit": 1 }] }),
            json!({ "jsonrpc": "2.0", "id": 1,
                    "result": [{ "id": 412, "name": "brand_theme", "state": "uninstalled" }] }),
        )
        .await;

        let found = OdooRpc::new()
            .find_extension(&session(&server), "brand_theme")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, 412);
        assert_eq!(found.state, ExtensionState::Uninstalled);
    }

    #[tokio::test]
    async fn unknown_extension_is_none() {
        let server = MockServer::start().await;
        respond(
            &server,
            json!({ "method": "execute_kw" }),
            json!({ "jsonrpc": "2.0", "id": 1, "result": [] }),
        )
        .await;

        let found = OdooRpc::new()
            .find_extension(&session(&server), "ghost")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn install_sends_the_module_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jsonrpc"))
            .and(body_partial_json(json!({ "params": { "args":
                ["odoo-1234abcd-db", 2, "admin", "ir.module.module", "button_immediate_install", [[412]], {}] } })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let extension = ExtensionRecord {
            id: 412,
            name: "brand_theme".into(),
            state: ExtensionState::Uninstalled,
        };
        OdooRpc::new()
            .install_extension(&session(&server), &extension)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refresh_sends_no_record_ids() {
        let server = MockServer::start().await;
        respond(
            &server,
            json!({ "method": "execute_kw" }),
            json!({ "jsonrpc": "2.0", "id": 1, "result": true }),
        )
        .await;

        OdooRpc::new()
            .refresh_registry(&session(&server))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body["params"]["args"],
            json!(["odoo-1234abcd-db", 2, "admin", "ir.module.module", "update_list", [], {}])
        );
    }

    #[tokio::test]
    async fn slow_calls_are_cut_off_as_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jsonrpc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": true }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = OdooRpc::new()
            .with_request_timeout(Duration::from_millis(100))
            .refresh_registry(&session(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagementError::Unreachable(_)), "{err:?}");
    }
}
