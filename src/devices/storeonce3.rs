//! HPE StoreOnce Gen 3 disk backup appliance client.
//!
//! Gen 3 is the odd one out: the API speaks XML, authentication rides on
//! response cookies from a basic-auth `GET cluster`, there is no logout
//! call, and large listings are paged (see [`crate::rest::Pager`]). The
//! appliance also throttles logins hard, so the cookie jar can be written
//! to disk and picked up again by later processes.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;

use tracing::debug;

use crate::error::{truncate_body, RestError, RestResult};
use crate::rest::backend::Backend;
use crate::rest::client::Transport;
use crate::rest::options::Timeout;
use crate::session::SessionStore;
use crate::utils::xml::first_text;
use crate::utils::CookieMap;

/// Default REST port of a Gen 3 appliance.
const G3_PORT: u16 = 443;

/// Message text the appliance places in its XML error document when the
/// session cookies have aged out.
const EXPIRED_MESSAGE: &str = "Your session has expired.";

/// Element path of that message inside the error document.
const EXPIRED_MESSAGE_PATH: &str = "errors/error/message";

/// HPE StoreOnce Gen 3 disk backup appliance.
///
/// Certificate verification is off by default because these appliances
/// ship with self-signed certificates.
#[derive(Debug, Clone)]
pub struct StoreOnceG3 {
    address: String,
    username: String,
    password: String,
    port: u16,
    ssl: bool,
    verify: bool,
    timeout: Timeout,
    store: Option<SessionStore>,
}

impl StoreOnceG3 {
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password: password.into(),
            port: G3_PORT,
            ssl: true,
            verify: false,
            timeout: Timeout::default(),
            store: None,
        }
    }

    /// Use a non-default REST port.
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

    /// Replace the default timeout of one second to connect and unbounded
    /// read.
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keep session cookies in one file per appliance under `dir`, so a
    /// later process can resume the session without logging in again.
    pub fn with_cookie_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store = Some(SessionStore::new(dir));
        self
    }

    fn store_key(&self) -> String {
        format!("{}_{}", self.address, self.port)
    }
}

#[async_trait]
impl Backend for StoreOnceG3 {
    type Artifact = CookieMap;
    type Body = String;

    fn address(&self) -> &str {
        &self.address
    }

    fn base_url(&self) -> String {
        let proto = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}/storeonceservices", proto, self.address, self.port)
    }

    /// Gen 3 paths carry a trailing slash.
    fn join_url(&self, path: &str) -> String {
        format!("{}/{}/", self.base_url(), path.trim_matches('/'))
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/xml"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/xml"));
        headers
    }

    fn verify_tls(&self) -> bool {
        self.verify
    }

    fn default_timeout(&self) -> Timeout {
        self.timeout
    }

    /// Basic-auth `GET cluster`; the session is whatever cookies the
    /// appliance sets on the answer.
    async fn login(&self, transport: &Transport) -> RestResult<CookieMap> {
        let raw = transport
            .call(Method::GET, self.join_url("cluster"))
            .headers(self.default_headers())
            .basic_auth(&self.username, &self.password)
            .send()
            .await?;

        if raw.status != 200 {
            return Err(RestError::auth(
                &self.address,
                &self.username,
                truncate_body(&String::from_utf8_lossy(&raw.body)),
            ));
        }

        debug!(address = %self.address, "authenticated, session cookies received");
        Ok(raw.cookies())
    }

    fn decode(&self, body: &[u8]) -> Option<String> {
        std::str::from_utf8(body).ok().map(str::to_string)
    }

    fn session_expired(&self, status: u16, body: Option<&String>, _active: bool) -> bool {
        status == 401
            && body.is_some_and(|xml| {
                first_text(xml, EXPIRED_MESSAGE_PATH)
                    .is_some_and(|message| message.contains(EXPIRED_MESSAGE))
            })
    }

    /// Session cookies overlay caller and waypoint cookies of the same
    /// name.
    fn attach(
        &self,
        _headers: &mut HeaderMap,
        cookies: &mut CookieMap,
        artifact: &CookieMap,
    ) -> RestResult<()> {
        cookies.merge(artifact);
        Ok(())
    }

    fn load_persisted(&self) -> Option<CookieMap> {
        let store = self.store.as_ref()?;
        let stored = store.load::<CookieMap>(&self.store_key())?;
        if stored.data.is_empty() {
            return None;
        }
        Some(stored.data)
    }

    fn persist(&self, artifact: &CookieMap) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        if artifact.is_empty() {
            return false;
        }
        store.save(&self.store_key(), artifact)
    }
}
