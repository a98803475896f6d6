//! Generic REST executor with transparent session recovery.
//!
//! This module provides the `Rest` client that drives every supported
//! device. It owns the HTTP transport and the session state, builds each
//! request from device defaults plus caller options, and when a response
//! is classified as an expired session it logs in again and replays the
//! request exactly once.

use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, COOKIE};
use reqwest::{Client, Method};
use tracing::{debug, warn};

use crate::error::{truncate_body, RestError, RestResult};
use crate::rest::backend::Backend;
use crate::rest::options::{RequestBody, RequestOptions, Timeout};
use crate::session::SessionState;
use crate::utils::CookieMap;

// ===== Transport =====

/// HTTP transport for one device.
///
/// Clone is cheap - reqwest::Client uses Arc internally for connection
/// pooling. The connect timeout is fixed at build time because reqwest
/// only accepts it on the client builder, so changing it means building
/// a new transport.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    address: String,
    timeout: Timeout,
}

impl Transport {
    pub fn new(address: &str, verify_tls: bool, timeout: Timeout) -> RestResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .connect_timeout(timeout.connect)
            .build()
            .map_err(RestError::Init)?;

        Ok(Self {
            client,
            address: address.to_string(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    /// Start building a request. Finish with [`Call::send`].
    pub fn call(&self, method: Method, url: impl Into<String>) -> Call<'_> {
        Call {
            transport: self,
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            cookies: CookieMap::new(),
            params: Vec::new(),
            body: RequestBody::Empty,
            basic_auth: None,
            timeout: None,
        }
    }
}

/// One outgoing HTTP exchange, built up and then sent.
pub struct Call<'a> {
    transport: &'a Transport,
    method: Method,
    url: String,
    headers: HeaderMap,
    cookies: CookieMap,
    params: Vec<(String, String)>,
    body: RequestBody,
    basic_auth: Option<(String, String)>,
    timeout: Option<Timeout>,
}

impl Call<'_> {
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn cookies(mut self, cookies: CookieMap) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn basic_auth(mut self, username: &str, password: &str) -> Self {
        self.basic_auth = Some((username.to_string(), password.to_string()));
        self
    }

    /// Override the transport timeout for this call. Only the read phase
    /// can differ per call, the connect phase is a transport property.
    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send the request and collect status, headers and body.
    ///
    /// Network failures map to [`RestError::Connectivity`]. Any HTTP status
    /// is returned as data, non-2xx is only logged.
    pub async fn send(self) -> RestResult<RawResponse> {
        let mut headers = self.headers;
        if let Some(value) = self.cookies.header_value() {
            let value = HeaderValue::from_str(&value)
                .map_err(|_| RestError::Parameter(format!("invalid cookie value: {}", value)))?;
            headers.insert(COOKIE, value);
        }

        let mut request = self
            .transport
            .client
            .request(self.method.clone(), &self.url)
            .headers(headers);
        if !self.params.is_empty() {
            request = request.query(&self.params);
        }
        match &self.body {
            RequestBody::Empty => {}
            RequestBody::Json(value) => request = request.json(value),
            RequestBody::Xml(text) => request = request.body(text.clone()),
        }
        if let Some((username, password)) = &self.basic_auth {
            request = request.basic_auth(username, Some(password));
        }
        let timeout = self.timeout.unwrap_or(self.transport.timeout);
        if let Some(read) = timeout.read {
            request = request.timeout(read);
        }

        debug!(method = %self.method, url = %self.url, "sending request");
        let started = Instant::now();

        let response = request
            .send()
            .await
            .map_err(|err| RestError::connectivity(&self.transport.address, err))?;
        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| RestError::connectivity(&self.transport.address, err))?
            .to_vec();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if (200..300).contains(&status) {
            debug!(status = status, elapsed_ms = elapsed_ms, url = %self.url, "request done");
        } else {
            warn!(
                status = status,
                elapsed_ms = elapsed_ms,
                url = %self.url,
                body = %truncate_body(&String::from_utf8_lossy(&body)),
                "request returned an error status"
            );
        }

        Ok(RawResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}

/// Status, headers and raw body of a completed exchange.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Cookies set by this response.
    pub fn cookies(&self) -> CookieMap {
        CookieMap::capture(&self.headers)
    }
}

// ===== Header Assembly =====

/// Build the header set for one attempt: device defaults first, caller
/// overrides on top, then `Content-Type` and `Accept` pinned back to the
/// device defaults. The session artifact is attached after this, so it can
/// never be clobbered by a caller header.
fn build_headers(defaults: &HeaderMap, overrides: &[(String, String)]) -> RestResult<HeaderMap> {
    let mut headers = defaults.clone();
    for (name, value) in overrides {
        let parsed_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RestError::Parameter(format!("invalid header name: {}", name)))?;
        let parsed_value = HeaderValue::from_str(value)
            .map_err(|_| RestError::Parameter(format!("invalid value for header {}", name)))?;
        headers.insert(parsed_name, parsed_value);
    }
    for name in [CONTENT_TYPE, ACCEPT] {
        if let Some(value) = defaults.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    Ok(headers)
}

// ===== Client =====

/// Result of one protected exchange after body decoding.
pub(crate) struct Exchange<T> {
    pub status: u16,
    pub body: Option<T>,
    pub cookies: CookieMap,
}

/// REST client for one device, generic over its [`Backend`] adapter.
///
/// All request methods take `&mut self`: a client holds at most one live
/// session and the exclusive borrow keeps login, replay and logout from
/// ever interleaving on the same connection.
pub struct Rest<B: Backend> {
    backend: B,
    transport: Transport,
    session: SessionState<B::Artifact>,
}

impl<B: Backend> Rest<B> {
    pub fn new(backend: B) -> RestResult<Self> {
        let transport = Transport::new(
            backend.address(),
            backend.verify_tls(),
            backend.default_timeout(),
        )?;

        Ok(Self {
            backend,
            transport,
            session: SessionState::Unauthenticated,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether a session artifact is currently held.
    pub fn has_session(&self) -> bool {
        self.session.is_active()
    }

    pub fn timeout(&self) -> Timeout {
        self.transport.timeout()
    }

    /// Replace the instance timeout. Rebuilds the transport because the
    /// connect phase is fixed when the HTTP client is built.
    pub fn set_timeout(&mut self, timeout: Timeout) -> RestResult<()> {
        self.transport = Transport::new(self.backend.address(), self.backend.verify_tls(), timeout)?;
        Ok(())
    }

    // ===== Session Lifecycle =====

    /// Ensure an active session. Reuses a persisted artifact when the
    /// device supports that, otherwise logs in. Calling this while a
    /// session is active does nothing.
    pub async fn open(&mut self) -> RestResult<()> {
        if self.adopt_persisted() {
            return Ok(());
        }
        self.fresh_login().await
    }

    /// End the session on the device. Safe to call while unauthenticated,
    /// and always leaves the client unauthenticated.
    ///
    /// Persisted state is flushed before the server-side session is
    /// revoked, so a later client can still pick the artifact up where
    /// the device keeps it valid across logins.
    pub async fn close(&mut self) {
        if let Some(artifact) = self.session.take() {
            self.backend.persist(&artifact);
            self.backend.logout(&self.transport, &artifact).await;
        }
    }

    fn adopt_persisted(&mut self) -> bool {
        if self.session.is_active() {
            return true;
        }
        if let Some(artifact) = self.backend.load_persisted() {
            debug!(address = self.backend.address(), "resuming persisted session");
            self.session.activate(artifact);
            return true;
        }
        false
    }

    async fn fresh_login(&mut self) -> RestResult<()> {
        let artifact = self.backend.login(&self.transport).await?;
        self.backend.persist(&artifact);
        self.session.activate(artifact);
        Ok(())
    }

    // ===== Protected Requests =====

    pub async fn get(
        &mut self,
        path: &str,
        options: RequestOptions,
    ) -> RestResult<(u16, Option<B::Body>)> {
        let exchange = self
            .execute(Method::GET, path, RequestBody::Empty, options)
            .await?;
        Ok((exchange.status, exchange.body))
    }

    pub async fn post(
        &mut self,
        path: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> RestResult<(u16, Option<B::Body>)> {
        let exchange = self
            .execute(Method::POST, path, body.into(), options)
            .await?;
        Ok((exchange.status, exchange.body))
    }

    pub async fn put(
        &mut self,
        path: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> RestResult<(u16, Option<B::Body>)> {
        let exchange = self.execute(Method::PUT, path, body.into(), options).await?;
        Ok((exchange.status, exchange.body))
    }

    pub async fn delete(
        &mut self,
        path: &str,
        options: RequestOptions,
    ) -> RestResult<(u16, Option<B::Body>)> {
        let exchange = self
            .execute(Method::DELETE, path, RequestBody::Empty, options)
            .await?;
        Ok((exchange.status, exchange.body))
    }

    /// Run one protected request with expired-session recovery.
    ///
    /// A request may go out without a session: some devices reject it in a
    /// recognizable way and the recovery path below turns that into a
    /// login plus replay, so callers never have to open explicitly.
    pub(crate) async fn execute(
        &mut self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> RestResult<Exchange<B::Body>> {
        self.adopt_persisted();

        let mut replayed = false;
        loop {
            let exchange = self.attempt(&method, path, &body, &options).await?;
            let expired = self.backend.session_expired(
                exchange.status,
                exchange.body.as_ref(),
                self.session.is_active(),
            );
            if !expired {
                return Ok(exchange);
            }

            debug!(
                address = self.backend.address(),
                status = exchange.status,
                "session rejected, logging in again"
            );
            self.session.deactivate();
            self.fresh_login().await?;

            if replayed {
                // Second rejection in a row. The new session is kept so the
                // client stays usable, but the request is not retried again.
                warn!(
                    address = self.backend.address(),
                    status = exchange.status,
                    "request rejected again after a fresh login, giving up on it"
                );
                return Ok(exchange);
            }
            replayed = true;
        }
    }

    /// One shot on the wire: build headers, attach the session, send,
    /// decode. No recovery here.
    async fn attempt(
        &self,
        method: &Method,
        path: &str,
        body: &RequestBody,
        options: &RequestOptions,
    ) -> RestResult<Exchange<B::Body>> {
        let url = self.backend.join_url(path);

        let defaults = self.backend.default_headers();
        let mut headers = build_headers(&defaults, &options.headers)?;
        let mut cookies = options.cookies.clone();
        if let Some(artifact) = self.session.artifact() {
            self.backend.attach(&mut headers, &mut cookies, artifact)?;
        }

        let mut call = self
            .transport
            .call(method.clone(), url.clone())
            .headers(headers)
            .cookies(cookies)
            .params(options.params.clone())
            .body(body.clone());
        if let Some(timeout) = options.timeout {
            call = call.timeout(timeout);
        }
        let raw = call.send().await?;

        let decoded = if raw.body.is_empty() {
            None
        } else {
            let decoded = self.backend.decode(&raw.body);
            if decoded.is_none() {
                warn!(
                    status = raw.status,
                    url = %url,
                    body = %truncate_body(&String::from_utf8_lossy(&raw.body)),
                    "response body does not parse"
                );
            }
            decoded
        };

        Ok(Exchange {
            status: raw.status,
            body: decoded,
            cookies: raw.cookies(),
        })
    }
}
