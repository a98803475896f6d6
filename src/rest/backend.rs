//! Device adapter trait behind the generic REST client.
//!
//! Each supported appliance family implements [`Backend`] to describe the
//! parts that differ between them: how to build URLs, what a login returns,
//! how the session artifact rides on requests, and how an expired session
//! is recognized in a response. Everything else (request execution,
//! transparent re-login, pagination) is shared.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error::RestResult;
use crate::rest::client::Transport;
use crate::rest::options::Timeout;
use crate::utils::CookieMap;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Proof of authentication handed back by a login. A header token for
    /// most devices, a whole cookie jar for StoreOnce Gen 3.
    type Artifact: Send + Sync;

    /// Decoded response body type. JSON devices use `serde_json::Value`,
    /// XML devices use the raw text.
    type Body: Send;

    /// Host name or IP address of the device, used in log and error output.
    fn address(&self) -> &str;

    /// Scheme, host, port and API prefix, without a trailing slash.
    fn base_url(&self) -> String;

    /// Join a request path onto the base URL.
    fn join_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_matches('/'))
    }

    /// Headers sent with every request. `Content-Type` and `Accept` from
    /// this set cannot be overridden by callers.
    fn default_headers(&self) -> HeaderMap;

    /// Whether to verify the TLS certificate chain.
    fn verify_tls(&self) -> bool {
        true
    }

    /// Timeout applied when the caller does not override it.
    fn default_timeout(&self) -> Timeout {
        Timeout::default()
    }

    /// Authenticate against the device and return a fresh artifact.
    async fn login(&self, transport: &Transport) -> RestResult<Self::Artifact>;

    /// Invalidate a session on the device. Devices without a logout call
    /// keep the default no-op.
    async fn logout(&self, transport: &Transport, artifact: &Self::Artifact) {
        let _ = (transport, artifact);
    }

    /// Decode a non-empty response body, or `None` when it does not parse.
    fn decode(&self, body: &[u8]) -> Option<Self::Body>;

    /// Classify a response as an expired-session rejection.
    ///
    /// `active` tells whether a session artifact was attached to the
    /// request that produced this response.
    fn session_expired(&self, status: u16, body: Option<&Self::Body>, active: bool) -> bool;

    /// Attach the session artifact to an outgoing request. Runs after all
    /// caller headers are in place, so nothing can clobber it.
    fn attach(
        &self,
        headers: &mut HeaderMap,
        cookies: &mut CookieMap,
        artifact: &Self::Artifact,
    ) -> RestResult<()>;

    /// Recall an artifact persisted by an earlier process, if the device
    /// supports that.
    fn load_persisted(&self) -> Option<Self::Artifact> {
        None
    }

    /// Persist an artifact for later processes. Returns whether anything
    /// was written.
    fn persist(&self, artifact: &Self::Artifact) -> bool {
        let _ = artifact;
        false
    }
}
