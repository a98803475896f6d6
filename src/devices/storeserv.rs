//! HPE StoreServ (3PAR) and Primera disk array client.
//!
//! Talks to the WSAPI service: JSON bodies, a session key obtained from
//! `POST credentials` and carried on every request in the
//! `X-HP3PAR-WSAPI-SessionKey` header. The service announces an aged-out
//! key with status 403 and error code 6, which triggers the transparent
//! re-login in the generic client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{truncate_body, RestError, RestResult};
use crate::rest::backend::Backend;
use crate::rest::client::{Rest, Transport};
use crate::rest::options::{RequestBody, RequestOptions, Timeout};
use crate::utils::CookieMap;

/// WSAPI port when TLS is enabled.
const WSAPI_PORT_TLS: u16 = 8080;

/// WSAPI port for plain HTTP.
const WSAPI_PORT_PLAIN: u16 = 8008;

/// WSAPI port on Primera arrays, same with and without TLS.
const PRIMERA_PORT: u16 = 443;

/// Header carrying the WSAPI session key.
const SESSION_KEY_HEADER: HeaderName = HeaderName::from_static("x-hp3par-wsapi-sessionkey");

/// WSAPI error code reported with status 403 when the session key is
/// invalid or has timed out.
const CODE_SESSION_INVALID: i64 = 6;

/// Array family behind the WSAPI endpoint. Primera serves the same API on
/// a different default port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WsapiKind {
    StoreServ,
    Primera,
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    key: String,
}

/// HPE StoreServ 3PAR or Primera disk array.
///
/// Build one with [`StoreServ::new`] or [`StoreServ::primera`], adjust it
/// with the `with_*` methods, then hand it to [`Rest::new`].
#[derive(Debug, Clone)]
pub struct StoreServ {
    address: String,
    username: String,
    password: String,
    port: Option<u16>,
    ssl: bool,
    verify: bool,
    timeout: Timeout,
    kind: WsapiKind,
}

impl StoreServ {
    /// StoreServ 3PAR array. TLS on port 8080 by default, certificate
    /// verification enabled.
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password: password.into(),
            port: None,
            ssl: true,
            verify: true,
            timeout: Timeout::default(),
            kind: WsapiKind::StoreServ,
        }
    }

    /// Primera array. Same WSAPI, default port 443.
    pub fn primera(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            kind: WsapiKind::Primera,
            ..Self::new(address, username, password)
        }
    }

    /// Use a non-default WSAPI port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Switch between https and plain http.
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Enable or disable TLS certificate verification.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Replace the default timeout of one second to connect and unbounded
    /// read.
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    fn port(&self) -> u16 {
        if let Some(port) = self.port {
            return port;
        }
        match self.kind {
            WsapiKind::Primera => PRIMERA_PORT,
            WsapiKind::StoreServ => {
                if self.ssl {
                    WSAPI_PORT_TLS
                } else {
                    WSAPI_PORT_PLAIN
                }
            }
        }
    }
}

#[async_trait]
impl Backend for StoreServ {
    type Artifact = String;
    type Body = Value;

    fn address(&self) -> &str {
        &self.address
    }

    fn base_url(&self) -> String {
        let proto = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}/api/v1", proto, self.address, self.port())
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
        headers
    }

    fn verify_tls(&self) -> bool {
        self.verify
    }

    fn default_timeout(&self) -> Timeout {
        self.timeout
    }

    async fn login(&self, transport: &Transport) -> RestResult<String> {
        let credentials = serde_json::json!({
            "user": self.username,
            "password": self.password,
        });
        let raw = transport
            .call(Method::POST, self.join_url("credentials"))
            .headers(self.default_headers())
            .body(RequestBody::Json(credentials))
            .send()
            .await?;

        match raw.status {
            // 201 (created) is a fresh session key
            201 => {
                let reply: LoginReply = serde_json::from_slice(&raw.body).map_err(|_| {
                    RestError::auth(&self.address, &self.username, "login reply has no session key")
                })?;
                debug!(address = %self.address, "WSAPI session created");
                Ok(reply.key)
            }
            // 403 (forbidden) is a wrong user or password
            403 => {
                let reason = serde_json::from_slice::<Value>(&raw.body)
                    .ok()
                    .and_then(|body| body.get("desc").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| truncate_body(&String::from_utf8_lossy(&raw.body)));
                Err(RestError::auth(&self.address, &self.username, reason))
            }
            status => Err(RestError::auth(
                &self.address,
                &self.username,
                format!("unexpected login status {}", status),
            )),
        }
    }

    async fn logout(&self, transport: &Transport, artifact: &String) {
        let mut headers = self.default_headers();
        match HeaderValue::from_str(artifact) {
            Ok(value) => {
                headers.insert(SESSION_KEY_HEADER, value);
            }
            Err(_) => return,
        }

        let call = transport
            .call(Method::DELETE, self.join_url(&format!("credentials/{}", artifact)))
            .headers(headers);
        match call.send().await {
            Ok(raw) if raw.is_success() => {
                debug!(address = %self.address, "WSAPI session closed");
            }
            Ok(raw) => {
                warn!(address = %self.address, status = raw.status, "session close rejected");
            }
            Err(err) => {
                warn!(address = %self.address, error = %err, "cannot close session gracefully");
            }
        }
    }

    fn decode(&self, body: &[u8]) -> Option<Value> {
        serde_json::from_slice(body).ok()
    }

    fn session_expired(&self, status: u16, body: Option<&Value>, _active: bool) -> bool {
        // The array reports an invalid key even for requests that never
        // carried one, so the artifact state is not consulted.
        status == 403
            && body.is_some_and(|body| {
                body.get("code").and_then(Value::as_i64) == Some(CODE_SESSION_INVALID)
            })
    }

    fn attach(
        &self,
        headers: &mut HeaderMap,
        _cookies: &mut CookieMap,
        artifact: &String,
    ) -> RestResult<()> {
        let value = HeaderValue::from_str(artifact).map_err(|_| {
            RestError::Parameter("session key holds bytes illegal in a header".to_string())
        })?;
        headers.insert(SESSION_KEY_HEADER, value);
        Ok(())
    }
}

impl Rest<StoreServ> {
    /// GET with a WSAPI query filter, for example
    /// `name EQ vol.0 OR name EQ vol.1` against `volumes`.
    ///
    /// The expression is sent quoted, the way the WSAPI query syntax
    /// expects it.
    pub async fn get_query(
        &mut self,
        path: &str,
        query: &str,
    ) -> RestResult<(u16, Option<Value>)> {
        let options = RequestOptions::new().with_param("query", format!("\"{}\"", query));
        self.get(path, options).await
    }
}
