//! HPE XP disk array client, routed through Command View AE.
//!
//! XP arrays are not addressed directly: requests go to the Configuration
//! Manager of a Command View AE server, which proxies them to the array
//! selected by a twelve character device id derived from the array
//! generation and serial number. A login returns a session id and token,
//! the token rides in the `Authorization: Session ...` header, and error
//! `KART40047-E` on a 401 marks that token as expired.
//!
//! An array unknown to the Configuration Manager answers the login with
//! 404 `KART30070-E`; the client then registers the array and retries the
//! login once, so first contact needs no manual preparation.

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

/// Default Configuration Manager REST port.
const CVAE_PORT: u16 = 23451;

/// Timeout for Configuration Manager housekeeping calls.
const CVAE_TIMEOUT_SECS: u64 = 120;

/// Timeout for array requests. Array operations routed through the SVP
/// are slow, five minutes is the vendor recommendation.
const XP_TIMEOUT_SECS: u64 = 300;

/// Error id reported with a 401 when the session token has timed out.
const MSG_SESSION_EXPIRED: &str = "KART40047-E";

/// Error id reported with a 404 when the array is not registered in the
/// Configuration Manager database.
const MSG_NOT_REGISTERED: &str = "KART30070-E";

/// Disk array generation behind the Configuration Manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XpGeneration {
    /// HPE XP7.
    Xp7,
    /// HPE P9500.
    P9500,
}

impl XpGeneration {
    /// Model name used when registering the array.
    pub fn model(&self) -> &'static str {
        match self {
            XpGeneration::Xp7 => "XP7",
            XpGeneration::P9500 => "P9500",
        }
    }

    /// First digit of the device id.
    fn device_prefix(&self) -> char {
        match self {
            XpGeneration::Xp7 => '8',
            XpGeneration::P9500 => '7',
        }
    }
}

/// Session id and token returned by a login.
#[derive(Debug, Clone, Deserialize)]
pub struct XpSession {
    #[serde(rename = "sessionId")]
    pub id: i64,
    pub token: String,
}

fn message_id(body: Option<&Value>) -> Option<&str> {
    body?.get("messageId")?.as_str()
}

/// Render the structured Configuration Manager error document into one
/// readable reason line.
fn cvae_reason(body: Option<&Value>, raw: &[u8]) -> String {
    let Some(body) = body else {
        return truncate_body(&String::from_utf8_lossy(raw));
    };
    let field = |name: &str| body.get(name).and_then(Value::as_str).unwrap_or("-");
    format!(
        "{}: {} (source: {}, cause: {}, solution: {})",
        field("messageId"),
        field("message"),
        field("errorSource"),
        field("cause"),
        field("solution"),
    )
}

/// `serialNumber` comes back as a JSON number from some Configuration
/// Manager versions and as a string from others.
fn serial_matches(value: &Value, serial: &str) -> bool {
    match value {
        Value::String(text) => text == serial,
        other => other.to_string() == serial,
    }
}

// ===== XP Array =====

/// HPE XP7 or P9500 disk array, addressed through Command View AE.
///
/// Certificate verification is off by default because Configuration
/// Manager installations commonly run with self-signed certificates.
#[derive(Debug, Clone)]
pub struct Xp {
    cvae: String,
    svp: String,
    serial: String,
    username: String,
    password: String,
    generation: XpGeneration,
    port: u16,
    ssl: bool,
    verify: bool,
    timeout: Timeout,
}

impl Xp {
    /// `cvae` is the Command View AE host, `svp` the service processor of
    /// the array, `serial` the array serial number (five or six digits).
    pub fn new(
        cvae: impl Into<String>,
        svp: impl Into<String>,
        serial: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        generation: XpGeneration,
    ) -> Self {
        Self {
            cvae: cvae.into(),
            svp: svp.into(),
            serial: serial.into(),
            username: username.into(),
            password: password.into(),
            generation,
            port: CVAE_PORT,
            ssl: true,
            verify: false,
            timeout: Timeout::uniform(XP_TIMEOUT_SECS),
        }
    }

    /// Use a non-default Configuration Manager port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
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

    /// Replace the default uniform timeout of five minutes.
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Twelve character array address inside the Configuration Manager:
    /// a generation digit followed by the zero padded serial number.
    fn device_id(&self) -> String {
        format!("{}{:0>11}", self.generation.device_prefix(), self.serial)
    }

    async fn try_login(&self, transport: &Transport) -> RestResult<LoginOutcome> {
        let raw = transport
            .call(Method::POST, self.join_url("sessions"))
            .headers(self.default_headers())
            .basic_auth(&self.username, &self.password)
            .send()
            .await?;
        let body: Option<Value> = serde_json::from_slice(&raw.body).ok();

        match raw.status {
            200 => {
                let session: XpSession = body
                    .and_then(|body| serde_json::from_value(body).ok())
                    .ok_or_else(|| {
                        RestError::auth(&self.cvae, &self.username, "login reply has no session token")
                    })?;
                debug!(serial = %self.serial, session_id = session.id, "session token received");
                Ok(LoginOutcome::Session(session))
            }
            404 if message_id(body.as_ref()) == Some(MSG_NOT_REGISTERED) => {
                Ok(LoginOutcome::NotRegistered)
            }
            // 401 is a wrong user name or password
            401 => Err(RestError::auth(
                &self.cvae,
                &self.username,
                cvae_reason(body.as_ref(), &raw.body),
            )),
            status => Err(RestError::auth(
                &self.cvae,
                &self.username,
                format!("unexpected login status {}", status),
            )),
        }
    }
}

enum LoginOutcome {
    Session(XpSession),
    NotRegistered,
}

#[async_trait]
impl Backend for Xp {
    type Artifact = XpSession;
    type Body = Value;

    fn address(&self) -> &str {
        &self.cvae
    }

    fn base_url(&self) -> String {
        let proto = if self.ssl { "https" } else { "http" };
        format!(
            "{}://{}:{}/ConfigurationManager/v1/objects/storages/{}",
            proto,
            self.cvae,
            self.port,
            self.device_id()
        )
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn verify_tls(&self) -> bool {
        self.verify
    }

    fn default_timeout(&self) -> Timeout {
        self.timeout
    }

    /// Log in to the array. When the Configuration Manager does not know
    /// the array yet, register it there and retry the login once.
    async fn login(&self, transport: &Transport) -> RestResult<XpSession> {
        match self.try_login(transport).await? {
            LoginOutcome::Session(session) => Ok(session),
            LoginOutcome::NotRegistered => {
                debug!(
                    serial = %self.serial,
                    "array not registered in Configuration Manager, registering"
                );
                let cvae = CommandViewAE::new(&self.cvae)
                    .with_port(self.port)
                    .with_ssl(self.ssl)
                    .with_verify(self.verify);
                let status = cvae
                    .register(
                        &self.svp,
                        &self.serial,
                        &self.username,
                        &self.password,
                        self.generation,
                    )
                    .await?;
                if status != 200 {
                    return Err(RestError::auth(
                        &self.cvae,
                        &self.username,
                        format!("array registration failed with status {}", status),
                    ));
                }
                match self.try_login(transport).await? {
                    LoginOutcome::Session(session) => Ok(session),
                    LoginOutcome::NotRegistered => Err(RestError::auth(
                        &self.cvae,
                        &self.username,
                        "array still unknown to Configuration Manager after registration",
                    )),
                }
            }
        }
    }

    async fn logout(&self, transport: &Transport, artifact: &XpSession) {
        let mut headers = self.default_headers();
        match HeaderValue::from_str(&format!("Session {}", artifact.token)) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => return,
        }

        let call = transport
            .call(Method::DELETE, self.join_url(&format!("sessions/{}", artifact.id)))
            .headers(headers);
        match call.send().await {
            Ok(raw) if raw.is_success() => {
                debug!(serial = %self.serial, session_id = artifact.id, "session discarded");
            }
            Ok(raw) => {
                warn!(serial = %self.serial, status = raw.status, "session discard rejected");
            }
            Err(err) => {
                warn!(serial = %self.serial, error = %err, "cannot discard session");
            }
        }
    }

    fn decode(&self, body: &[u8]) -> Option<Value> {
        serde_json::from_slice(body).ok()
    }

    fn session_expired(&self, status: u16, body: Option<&Value>, active: bool) -> bool {
        active && status == 401 && message_id(body) == Some(MSG_SESSION_EXPIRED)
    }

    fn attach(
        &self,
        headers: &mut HeaderMap,
        _cookies: &mut CookieMap,
        artifact: &XpSession,
    ) -> RestResult<()> {
        let value = HeaderValue::from_str(&format!("Session {}", artifact.token)).map_err(|_| {
            RestError::Parameter("session token holds bytes illegal in a header".to_string())
        })?;
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

// ===== Command View AE =====

/// Storage device registry of a Command View AE server.
///
/// Registration normally happens behind the scenes when an [`Xp`] client
/// first logs in; this type is for deliberate housekeeping, like removing
/// a decommissioned array from the Configuration Manager database.
#[derive(Debug, Clone)]
pub struct CommandViewAE {
    address: String,
    port: u16,
    ssl: bool,
    verify: bool,
    timeout: Timeout,
}

impl CommandViewAE {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: CVAE_PORT,
            ssl: true,
            verify: false,
            timeout: Timeout::uniform(CVAE_TIMEOUT_SECS),
        }
    }

    /// Use a non-default Configuration Manager port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
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

    /// Replace the default uniform timeout of two minutes.
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    fn base_url(&self) -> String {
        let proto = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}/ConfigurationManager", proto, self.address, self.port)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn transport(&self) -> RestResult<Transport> {
        Transport::new(&self.address, self.verify, self.timeout)
    }

    /// Register an array in the Configuration Manager database. Returns
    /// the HTTP status the server answered with; 200 means registered.
    pub async fn register(
        &self,
        svp: &str,
        serial: &str,
        username: &str,
        password: &str,
        generation: XpGeneration,
    ) -> RestResult<u16> {
        let registration = serde_json::json!({
            "svpIp": svp,
            "serialNumber": serial,
            "model": generation.model(),
        });
        let raw = self
            .transport()?
            .call(Method::POST, format!("{}/v1/objects/storages", self.base_url()))
            .headers(self.headers())
            .body(RequestBody::Json(registration))
            .basic_auth(username, password)
            .send()
            .await?;

        if raw.status == 200 {
            debug!(serial = serial, "array registered in Configuration Manager");
        } else {
            warn!(serial = serial, status = raw.status, "array registration rejected");
        }
        Ok(raw.status)
    }

    /// Look an array up by serial number. Returns the raw storage record,
    /// or `None` when the Configuration Manager does not know the serial.
    pub async fn find(&self, serial: &str) -> RestResult<Option<Value>> {
        let raw = self
            .transport()?
            .call(Method::GET, format!("{}/v1/objects/storages", self.base_url()))
            .headers(self.headers())
            .send()
            .await?;
        if raw.status != 200 {
            return Ok(None);
        }

        let body: Value = match serde_json::from_slice(&raw.body) {
            Ok(body) => body,
            Err(_) => return Ok(None),
        };
        let arrays = match body.get("data").and_then(Value::as_array) {
            Some(arrays) => arrays,
            None => return Ok(None),
        };
        for array in arrays {
            if let Some(found) = array.get("serialNumber") {
                if serial_matches(found, serial) {
                    return Ok(Some(array.clone()));
                }
            }
        }
        Ok(None)
    }

    /// Remove an array registration. Returns whether a registration was
    /// actually removed.
    pub async fn unregister(
        &self,
        serial: &str,
        username: &str,
        password: &str,
    ) -> RestResult<bool> {
        let Some(array) = self.find(serial).await? else {
            debug!(serial = serial, "array not registered, nothing to remove");
            return Ok(false);
        };
        let Some(device_id) = array.get("storageDeviceId").and_then(Value::as_str) else {
            warn!(serial = serial, "storage record carries no storageDeviceId");
            return Ok(false);
        };

        let raw = self
            .transport()?
            .call(
                Method::DELETE,
                format!("{}/v1/objects/storages/{}", self.base_url(), device_id),
            )
            .headers(self.headers())
            .basic_auth(username, password)
            .send()
            .await?;

        if raw.status == 200 {
            debug!(serial = serial, "array registration removed");
            Ok(true)
        } else {
            warn!(serial = serial, status = raw.status, "cannot remove array registration");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_generation_prefix() {
        let xp7 = Xp::new("cvae.lab", "10.0.0.9", "12345", "svc", "pw", XpGeneration::Xp7);
        assert_eq!(xp7.device_id(), "800000012345");

        let p9500 = Xp::new("cvae.lab", "10.0.0.9", "444444", "svc", "pw", XpGeneration::P9500);
        assert_eq!(p9500.device_id(), "700000444444");
    }

    #[test]
    fn test_base_url_contains_device_id() {
        let xp = Xp::new("cvae.lab", "10.0.0.9", "12345", "svc", "pw", XpGeneration::Xp7);
        assert_eq!(
            xp.base_url(),
            "https://cvae.lab:23451/ConfigurationManager/v1/objects/storages/800000012345"
        );
    }

    #[test]
    fn test_session_expired_wants_active_and_message() {
        let xp = Xp::new("cvae.lab", "10.0.0.9", "12345", "svc", "pw", XpGeneration::Xp7);
        let expired = serde_json::json!({"messageId": "KART40047-E"});
        let other = serde_json::json!({"messageId": "KART30005-E"});

        assert!(xp.session_expired(401, Some(&expired), true));
        assert!(!xp.session_expired(401, Some(&expired), false));
        assert!(!xp.session_expired(401, Some(&other), true));
        assert!(!xp.session_expired(401, None, true));
        assert!(!xp.session_expired(404, Some(&expired), true));
    }

    #[test]
    fn test_serial_matches_string_or_number() {
        assert!(serial_matches(&serde_json::json!("12345"), "12345"));
        assert!(serial_matches(&serde_json::json!(12345), "12345"));
        assert!(!serial_matches(&serde_json::json!(54321), "12345"));
    }
}
