//! HPE StoreOnce Gen 4 disk backup appliance client.
//!
//! Gen 4 replaced the XML service of Gen 3 with a JSON API and OAuth-style
//! logins: `POST pml/login/authenticatewithobject` returns an access token
//! that rides in the `Authorization: Bearer` header. A 401 on a request
//! that carried a token means the token aged out and a fresh login plus
//! replay fixes it; a 401 without a token is reported to the caller as is.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{truncate_body, RestError, RestResult};
use crate::rest::backend::Backend;
use crate::rest::client::Transport;
use crate::rest::options::{RequestBody, Timeout};
use crate::utils::CookieMap;

const LOGIN_PATH: &str = "pml/login/authenticatewithobject";
const LOGOUT_PATH: &str = "pml/login/delete";

#[derive(Debug, Deserialize)]
struct LoginReply {
    access_token: String,
}

/// HPE StoreOnce Gen 4 disk backup appliance.
///
/// Certificate verification is off by default because these appliances
/// ship with self-signed certificates.
#[derive(Debug, Clone)]
pub struct StoreOnceG4 {
    address: String,
    username: String,
    password: String,
    port: Option<u16>,
    ssl: bool,
    verify: bool,
    timeout: Timeout,
}

impl StoreOnceG4 {
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
            verify: false,
            timeout: Timeout::default(),
        }
    }

    /// Use a non-default port. By default the device is addressed without
    /// an explicit port.
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
}

#[async_trait]
impl Backend for StoreOnceG4 {
    type Artifact = String;
    type Body = Value;

    fn address(&self) -> &str {
        &self.address
    }

    fn base_url(&self) -> String {
        let proto = if self.ssl { "https" } else { "http" };
        match self.port {
            Some(port) => format!("{}://{}:{}", proto, self.address, port),
            None => format!("{}://{}", proto, self.address),
        }
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
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
            "username": self.username,
            "password": self.password,
            "grant_type": "password",
        });
        let raw = transport
            .call(Method::POST, self.join_url(LOGIN_PATH))
            .headers(self.default_headers())
            .body(RequestBody::Json(credentials))
            .send()
            .await?;

        match raw.status {
            200 => {
                let reply: LoginReply = serde_json::from_slice(&raw.body).map_err(|_| {
                    RestError::auth(&self.address, &self.username, "login reply has no access token")
                })?;
                debug!(address = %self.address, "access token obtained");
                Ok(reply.access_token)
            }
            // 401 is a wrong user name or password
            401 => Err(RestError::auth(
                &self.address,
                &self.username,
                truncate_body(&String::from_utf8_lossy(&raw.body)),
            )),
            status => Err(RestError::auth(
                &self.address,
                &self.username,
                format!("unexpected login status {}", status),
            )),
        }
    }

    /// `DELETE pml/login/delete`, which answers 204 on success. Anything
    /// else only gets logged, the token is dropped either way.
    async fn logout(&self, transport: &Transport, artifact: &String) {
        let mut headers = self.default_headers();
        match HeaderValue::from_str(&format!("Bearer {}", artifact)) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => return,
        }

        let call = transport
            .call(Method::DELETE, self.join_url(LOGOUT_PATH))
            .headers(headers);
        match call.send().await {
            Ok(raw) if raw.status == 204 => {
                debug!(address = %self.address, "session closed");
            }
            Ok(raw) => {
                warn!(address = %self.address, status = raw.status, "session closed with unexpected status");
            }
            Err(err) => {
                warn!(address = %self.address, error = %err, "session was not closed properly");
            }
        }
    }

    fn decode(&self, body: &[u8]) -> Option<Value> {
        serde_json::from_slice(body).ok()
    }

    fn session_expired(&self, status: u16, _body: Option<&Value>, active: bool) -> bool {
        // Only a 401 against a request that actually carried a token can
        // mean expiry. A sessionless 401 is an ordinary answer.
        status == 401 && active
    }

    fn attach(
        &self,
        headers: &mut HeaderMap,
        _cookies: &mut CookieMap,
        artifact: &String,
    ) -> RestResult<()> {
        let value = HeaderValue::from_str(&format!("Bearer {}", artifact)).map_err(|_| {
            RestError::Parameter("access token holds bytes illegal in a header".to_string())
        })?;
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_forms() {
        let device = StoreOnceG4::new("so-g4.lab", "svc", "pw");
        assert_eq!(device.base_url(), "https://so-g4.lab");

        let with_port = StoreOnceG4::new("so-g4.lab", "svc", "pw").with_port(8443);
        assert_eq!(with_port.base_url(), "https://so-g4.lab:8443");

        let plain = StoreOnceG4::new("so-g4.lab", "svc", "pw")
            .with_ssl(false)
            .with_port(8080);
        assert_eq!(plain.base_url(), "http://so-g4.lab:8080");
    }

    #[test]
    fn test_session_expired_wants_active_token() {
        let device = StoreOnceG4::new("so-g4.lab", "svc", "pw");
        assert!(device.session_expired(401, None, true));
        assert!(!device.session_expired(401, None, false));
        assert!(!device.session_expired(403, None, true));
    }
}
