use super::{AuthError, Client, Identity, Redirect, RedirectClient, Request};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Picks at most one client per request and runs every client's hook for the
/// identity it produced.
#[derive(Default)]
pub struct Service {
    clients: Vec<Arc<dyn Client>>,
    redirect_clients: HashMap<String, Arc<dyn RedirectClient>>,
}

impl Service {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. Clients stay ordered by priority; ties keep
    /// registration order.
    pub fn register(&mut self, client: Arc<dyn Client>) {
        debug!(client = client.name(), priority = client.priority(), "registered client");
        self.clients.push(client);
        self.clients.sort_by_key(|c| c.priority());
    }

    pub fn register_redirect(&mut self, provider: &str, client: Arc<dyn RedirectClient>) {
        self.redirect_clients.insert(provider.to_string(), client);
    }

    #[must_use]
    pub fn client_names(&self) -> Vec<&str> {
        self.clients.iter().map(|c| c.name()).collect()
    }

    /// # Errors
    /// `NotApplicable` when no client claims the request, `Canceled` when the
    /// request is canceled mid-flight, otherwise whatever the client or a hook
    /// returned.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, r: &Request) -> Result<Identity, AuthError> {
        let Some(client) = self.clients.iter().find(|c| c.test(r)) else {
            return Err(AuthError::NotApplicable);
        };

        let cancel = r.cancellation();
        let result = tokio::select! {
            () = cancel.cancelled() => return Err(AuthError::Canceled),
            result = client.authenticate(r) => result,
        };
        let identity = result.map_err(|err| {
            if !err.is_control_signal() {
                warn!(
                    client = client.name(),
                    kind = err.kind(),
                    "Failed to authenticate request: {err}"
                );
            }
            err
        })?;

        for c in &self.clients {
            c.hook(&identity, r)?;
        }

        Ok(identity)
    }

    /// # Errors
    /// `NotApplicable` for unknown providers, or the redirect client's error.
    pub fn redirect_url(&self, provider: &str, r: &Request) -> Result<Redirect, AuthError> {
        self.redirect_clients
            .get(provider)
            .ok_or(AuthError::NotApplicable)?
            .redirect_url(r)
    }
}
