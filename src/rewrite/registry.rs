//! Registry of active response handlers
//!
//! Handlers can be added and removed while traffic is flowing. Dispatch works
//! on a snapshot of the current set, so a handler added or removed during a
//! dispatch may or may not see that response.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{InterceptedRequest, InterceptedResponse, ResponseHandler};
use crate::error::{Result, RewriteError};

/// Opaque identifier returned when a handler is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(Uuid);

impl HandlerId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for HandlerId {
    type Err = RewriteError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| RewriteError::NotFound(format!("Handler with id {} not found", s)))
    }
}

/// A registered handler and when it was added
#[derive(Clone)]
pub struct HandlerRegistration {
    pub id: HandlerId,
    pub handler: Arc<dyn ResponseHandler>,
    pub registered_at: DateTime<Utc>,
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("id", &self.id)
            .field("handler", &self.handler.name())
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Concurrent set of handlers invoked on every intercepted response
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<HandlerId, HandlerRegistration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a handler for responses dispatched from now on
    pub fn add(&self, handler: Arc<dyn ResponseHandler>) -> HandlerId {
        self.register(handler).id
    }

    /// Like [`add`](Self::add), returning a copy of the stored registration
    ///
    /// The copy stays valid even if the handler is removed concurrently.
    pub fn register(&self, handler: Arc<dyn ResponseHandler>) -> HandlerRegistration {
        loop {
            let id = HandlerId::generate();
            if let Entry::Vacant(slot) = self.handlers.entry(id) {
                info!(id = %id, handler = handler.name(), "Registering response handler");
                let registration = HandlerRegistration {
                    id,
                    handler,
                    registered_at: Utc::now(),
                };
                slot.insert(registration.clone());
                return registration;
            }
        }
    }

    /// Deregister a handler; `false` if no handler has this id
    pub fn remove(&self, id: &HandlerId) -> bool {
        match self.handlers.remove(id) {
            Some((_, registration)) => {
                info!(
                    id = %id,
                    handler = registration.handler.name(),
                    "Removed response handler"
                );
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &HandlerId) -> Option<HandlerRegistration> {
        self.handlers.get(id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Current registrations, oldest first
    pub fn list(&self) -> Vec<HandlerRegistration> {
        let mut registrations: Vec<_> = self.handlers.iter().map(|r| r.value().clone()).collect();
        registrations.sort_by_key(|r| r.registered_at);
        registrations
    }

    fn snapshot(&self) -> Vec<Arc<dyn ResponseHandler>> {
        self.handlers
            .iter()
            .map(|r| r.value().handler.clone())
            .collect()
    }

    /// Invoke every registered handler on one response
    ///
    /// Handlers run in no particular order, outside of any registry lock.
    /// A failing handler does not stop the others; the first error is
    /// returned once all of them have run.
    pub fn invoke_all(
        &self,
        request: &InterceptedRequest,
        response: &mut InterceptedResponse,
    ) -> Result<()> {
        let mut first_error = None;

        for handler in self.snapshot() {
            if let Err(e) = handler.handle(request, response) {
                warn!(
                    handler = handler.name(),
                    uri = %request.uri(),
                    error = %e,
                    "Response handler failed"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
