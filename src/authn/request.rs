//! Per-request view handed to authentication clients.

use axum::http::{
    header::{COOKIE, USER_AGENT},
    HeaderMap, HeaderName, HeaderValue,
};
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

type BeforeFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type BeforeFunc = Box<dyn FnOnce(ResponseWriter) -> BeforeFuture + Send>;

/// Handle to the outgoing response while it is still being assembled.
///
/// `written` flips once the response is handed to the transport; after that
/// header writes are refused.
#[derive(Clone, Debug, Default)]
pub struct ResponseWriter {
    written: Arc<AtomicBool>,
    headers: Arc<Mutex<Vec<(HeaderName, HeaderValue)>>>,
}

impl ResponseWriter {
    #[must_use]
    pub fn written(&self) -> bool {
        self.written.load(Ordering::SeqCst)
    }

    pub fn mark_written(&self) {
        self.written.store(true, Ordering::SeqCst);
    }

    /// Queue a header for the response. Returns false once written.
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) -> bool {
        if self.written() {
            return false;
        }
        self.headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, value));
        true
    }

    #[must_use]
    pub fn take_headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        std::mem::take(&mut *self.headers.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Response side of a request: pre-send callbacks and the writer they get.
#[derive(Clone, Default)]
pub struct Response {
    before: Arc<Mutex<Vec<BeforeFunc>>>,
    writer: ResponseWriter,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self
            .before
            .lock()
            .map_or(0, |before| before.len());
        f.debug_struct("Response")
            .field("before", &pending)
            .field("writer", &self.writer)
            .finish()
    }
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback to run right before the response is sent.
    pub fn before<F, Fut>(&self, f: F)
    where
        F: FnOnce(ResponseWriter) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let func: BeforeFunc = Box::new(move |w| Box::pin(f(w)));
        self.before
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(func);
    }

    #[must_use]
    pub fn writer(&self) -> &ResponseWriter {
        &self.writer
    }

    /// Run registered callbacks in registration order. Each runs at most once.
    pub async fn run_before(&self) {
        let funcs =
            std::mem::take(&mut *self.before.lock().unwrap_or_else(PoisonError::into_inner));
        for func in funcs {
            func(self.writer.clone()).await;
        }
    }
}

pub struct Request {
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    meta: Mutex<HashMap<String, String>>,
    cancel: CancellationToken,
    resp: Response,
}

impl Request {
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            remote_addr: None,
            meta: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            resp: Response::new(),
        }
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_response(mut self, resp: Response) -> Self {
        self.resp = resp;
        self
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Raw value of the cookie `name`, undecoded.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .find_map(|pair| {
                let (key, val) = pair.trim().split_once('=')?;
                (key.trim() == name).then(|| val.trim())
            })
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        self.headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }

    /// Best effort client address: proxy headers first, then the peer.
    /// Unparseable values give `None`.
    #[must_use]
    pub fn client_ip(&self) -> Option<IpAddr> {
        let forwarded = self
            .header("x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let real_ip = self
            .header("x-real-ip")
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match forwarded.or(real_ip) {
            Some(addr) => parse_ip(addr),
            None => self.remote_addr.map(|addr| addr.ip()),
        }
    }

    pub fn set_meta(&self, key: &str, value: &str) {
        self.meta
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    #[must_use]
    pub fn meta(&self, key: &str) -> Option<String> {
        self.meta
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn response(&self) -> &Response {
        &self.resp
    }
}

/// Accepts `1.2.3.4`, `1.2.3.4:80`, `::1` and `[::1]:80`.
fn parse_ip(addr: &str) -> Option<IpAddr> {
    addr.parse::<IpAddr>()
        .ok()
        .or_else(|| addr.parse::<SocketAddr>().ok().map(|sock| sock.ip()))
}
