//! Scoped lifecycle of the remote capability session.
//!
//! A session is built in two steps: the connector opens a transport to the
//! server address, then performs the protocol handshake over it. Only the
//! handshaken session is handed to callers. Teardown runs inner to outer
//! (protocol session, then transport) exactly once, whatever happened in
//! between.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::capability::Capability;
use crate::conversation::{CapabilityInvocationRequest, CapabilityInvocationResult};
use crate::error::SessionError;

/// An initialized protocol session.
#[async_trait]
pub trait CapabilitySession: Send + Sync {
    async fn list_capabilities(&self) -> Result<Vec<Capability>, SessionError>;

    async fn invoke(
        &self,
        request: &CapabilityInvocationRequest,
    ) -> Result<CapabilityInvocationResult, SessionError>;

    async fn close(&mut self) -> Result<(), SessionError>;
}

#[async_trait]
pub trait SessionTransport: Send {
    async fn close(&mut self) -> Result<(), SessionError>;
}

#[async_trait]
pub trait SessionConnector: Send + Sync {
    type Transport: SessionTransport;
    type Session: CapabilitySession;

    async fn connect(&self, address: &str) -> Result<Self::Transport, SessionError>;

    async fn initialize(
        &self,
        transport: &mut Self::Transport,
    ) -> Result<Self::Session, SessionError>;
}

/// Owns a transport and the session initialized over it.
pub struct SessionScope<C: SessionConnector> {
    address: String,
    transport: Option<C::Transport>,
    session: Option<C::Session>,
}

impl<C: SessionConnector> SessionScope<C> {
    /// Connects and initializes. If the handshake fails the transport is
    /// closed before the error is returned.
    pub async fn open(connector: &C, address: &str) -> Result<Self, SessionError> {
        let mut transport = connector.connect(address).await?;
        debug!(event_name = "session.transport.connected", address, "transport connected");

        match connector.initialize(&mut transport).await {
            Ok(session) => {
                debug!(event_name = "session.initialized", address, "session initialized");
                Ok(Self {
                    address: address.to_string(),
                    transport: Some(transport),
                    session: Some(session),
                })
            }
            Err(error) => {
                if let Err(close_error) = transport.close().await {
                    warn!(
                        event_name = "session.transport.close_failed",
                        address,
                        error = %close_error,
                        "transport close failed after handshake error"
                    );
                }
                Err(error)
            }
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn session(&self) -> Result<&C::Session, SessionError> {
        self.session.as_ref().ok_or(SessionError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none() && self.transport.is_none()
    }

    /// Closes the session, then the transport. Failures are logged only.
    /// Further calls do nothing.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(error) = session.close().await {
                warn!(
                    event_name = "session.close_failed",
                    address = %self.address,
                    error = %error,
                    "protocol session close failed"
                );
            }
        }
        if let Some(mut transport) = self.transport.take() {
            if let Err(error) = transport.close().await {
                warn!(
                    event_name = "session.transport.close_failed",
                    address = %self.address,
                    error = %error,
                    "transport close failed"
                );
            }
        }
        debug!(event_name = "session.closed", address = %self.address, "session closed");
    }
}

impl<C: SessionConnector> Drop for SessionScope<C> {
    fn drop(&mut self) {
        if !self.is_closed() {
            warn!(
                event_name = "session.dropped_open",
                address = %self.address,
                "session scope dropped without close"
            );
        }
    }
}

/// Runs `body` against a freshly opened session and tears the session down
/// afterwards, including when `body` panics. The panic is resumed after
/// teardown.
///
/// The future returned by `body` may only borrow the session, so anything
/// else it uses has to be moved in.
pub async fn with_session<C, T, F>(connector: &C, address: &str, body: F) -> Result<T, SessionError>
where
    C: SessionConnector,
    F: for<'s> FnOnce(&'s C::Session) -> BoxFuture<'s, T>,
{
    let mut scope = SessionScope::open(connector, address).await?;

    let outcome = match scope.session() {
        Ok(session) => AssertUnwindSafe(body(session)).catch_unwind().await,
        Err(error) => {
            scope.close().await;
            return Err(error);
        }
    };

    scope.close().await;
    match outcome {
        Ok(value) => Ok(value),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::{CapabilitySession, SessionConnector, SessionTransport};
    use crate::capability::Capability;
    use crate::conversation::{CapabilityInvocationRequest, CapabilityInvocationResult};
    use crate::error::SessionError;

    pub type EventLog = Arc<Mutex<Vec<String>>>;

    pub fn events(log: &EventLog) -> Vec<String> {
        log.lock().expect("event log lock").clone()
    }

    fn record(log: &EventLog, event: impl Into<String>) {
        log.lock().expect("event log lock").push(event.into());
    }

    pub fn bucket_capability() -> Capability {
        Capability {
            name: "create-storage-bucket".to_string(),
            description: "Create an S3 bucket through ACK".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "max_retries": {"type": "integer"}
                }
            }),
        }
    }

    pub struct FakeTransport {
        log: EventLog,
    }

    #[async_trait]
    impl SessionTransport for FakeTransport {
        async fn close(&mut self) -> Result<(), SessionError> {
            record(&self.log, "transport.close");
            Ok(())
        }
    }

    /// Records every call and answers invocations with
    /// `"<capability> ok: <arguments>"`.
    pub struct FakeSession {
        log: EventLog,
        capabilities: Vec<Capability>,
        fail_invocations: bool,
        fail_close: bool,
    }

    impl FakeSession {
        pub fn new(log: EventLog) -> Self {
            Self { log, capabilities: vec![bucket_capability()], fail_invocations: false, fail_close: false }
        }

        pub fn failing_invocations(mut self) -> Self {
            self.fail_invocations = true;
            self
        }
    }

    #[async_trait]
    impl CapabilitySession for FakeSession {
        async fn list_capabilities(&self) -> Result<Vec<Capability>, SessionError> {
            record(&self.log, "session.list");
            Ok(self.capabilities.clone())
        }

        async fn invoke(
            &self,
            request: &CapabilityInvocationRequest,
        ) -> Result<CapabilityInvocationResult, SessionError> {
            record(&self.log, format!("session.invoke:{}", request.arguments_json()));
            if self.fail_invocations {
                return Err(SessionError::Invoke {
                    capability: request.capability_name.clone(),
                    message: "connection reset".to_string(),
                });
            }
            Ok(CapabilityInvocationResult::text(
                request.capability_name.clone(),
                format!("{} ok: {}", request.capability_name, request.arguments_json()),
            ))
        }

        async fn close(&mut self) -> Result<(), SessionError> {
            record(&self.log, "session.close");
            if self.fail_close {
                return Err(SessionError::Close("already gone".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeConnector {
        pub log: EventLog,
        pub fail_connect: bool,
        pub fail_initialize: bool,
        pub fail_session_close: bool,
        pub fail_invocations: bool,
    }

    #[async_trait]
    impl SessionConnector for FakeConnector {
        type Transport = FakeTransport;
        type Session = FakeSession;

        async fn connect(&self, address: &str) -> Result<FakeTransport, SessionError> {
            record(&self.log, "transport.connect");
            if self.fail_connect {
                return Err(SessionError::Connect {
                    address: address.to_string(),
                    message: "connection refused".to_string(),
                });
            }
            Ok(FakeTransport { log: self.log.clone() })
        }

        async fn initialize(
            &self,
            _transport: &mut FakeTransport,
        ) -> Result<FakeSession, SessionError> {
            record(&self.log, "session.initialize");
            if self.fail_initialize {
                return Err(SessionError::Initialize("protocol mismatch".to_string()));
            }
            let mut session = FakeSession::new(self.log.clone());
            session.fail_close = self.fail_session_close;
            if self.fail_invocations {
                session = session.failing_invocations();
            }
            Ok(session)
        }
    }
}
