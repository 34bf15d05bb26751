//! Async driver for a [`ReplicationSession`].
//!
//! One tokio task owns the session and its transport. The [`SessionHandle`]
//! talks to it over a command channel and observes it through a `watch`
//! channel, so the document itself is never shared.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::{self, Config};
use crate::error::SessionError;
use crate::protocol::Message;
use crate::session::{ReplicationSession, SessionEvent, SessionOptions, SessionState, SetState};
use crate::telemetry::{self, Telemetry};
use crate::transport::{ChannelAddress, Transport, WebSocketTransport};

/// Latest published state of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub value: Value,
    pub ready: bool,
    /// Set once the session ended in a fault.
    pub fault: Option<String>,
}

enum Command {
    Set(SetState, oneshot::Sender<Result<Value, SessionError>>),
    Close,
}

/// Consumer side of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    /// Join the channel named by `options` on the configured relay.
    pub async fn connect(initial: Value, options: SessionOptions) -> Result<Self, SessionError> {
        Self::connect_with(config::global(), initial, options).await
    }

    pub async fn connect_with(
        config: &Config,
        initial: Value,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        // Build the candidate first so shape errors surface before any I/O.
        let session = ReplicationSession::new(initial)?;
        let server_url = config.server_url()?;
        let address = ChannelAddress::new(server_url, config.host.clone(), options.key)
            .with_app_key(config.app_key.clone());
        let transport = WebSocketTransport::connect(&address.to_url()).await?;
        Ok(Self::start(session, transport, Telemetry::new(config.telemetry)))
    }

    /// Run a session over an already open transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<T>(initial: Value, options: SessionOptions, transport: T) -> Result<Self, SessionError>
    where
        T: Transport + 'static,
    {
        let session = ReplicationSession::new(initial)?;
        tracing::debug!(key = ?options.key, sid = session.sid(), "spawning session");
        Ok(Self::start(
            session,
            transport,
            Telemetry::new(config::global().telemetry),
        ))
    }

    fn start<T>(session: ReplicationSession, transport: T, telemetry: Telemetry) -> Self
    where
        T: Transport + 'static,
    {
        let (commands, rx) = mpsc::channel(32);
        let (status_tx, status) = watch::channel(SessionStatus {
            value: session.value(),
            ready: false,
            fault: None,
        });
        telemetry.record(telemetry::SESSIONS_STARTED, 1);
        tokio::spawn(
            Driver {
                session,
                transport,
                commands: rx,
                status: status_tx,
                telemetry,
            }
            .run(),
        );
        Self { commands, status }
    }

    /// Current materialized value.
    pub fn value(&self) -> Value {
        self.status.borrow().value.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.status.borrow().ready
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Wait until reconciliation finished or the session faulted.
    pub async fn ready(&self) -> Result<Value, SessionError> {
        let mut status = self.status.clone();
        let current = status
            .wait_for(|s| s.ready || s.fault.is_some())
            .await
            .map_err(|_| SessionError::Closed)?;
        match &current.fault {
            Some(reason) => Err(SessionError::Faulted(reason.clone())),
            None => Ok(current.value.clone()),
        }
    }

    /// Replace the shared value.
    pub async fn set(&self, value: Value) -> Result<Value, SessionError> {
        self.request(SetState::Value(value)).await
    }

    /// Derive the shared value from the current one.
    pub async fn update<F>(&self, f: F) -> Result<Value, SessionError>
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        self.request(SetState::update(f)).await
    }

    async fn request(&self, request: SetState) -> Result<Value, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Set(request, tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Stop the session and close the transport.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
    }
}

struct Driver<T> {
    session: ReplicationSession,
    transport: T,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<SessionStatus>,
    telemetry: Telemetry,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        if let Err(e) = self.open().await {
            self.fail(e);
            return self.shutdown().await;
        }

        loop {
            tokio::select! {
                frame = self.transport.recv() => match frame {
                    Some(Ok(text)) => {
                        if let Err(e) = self.on_frame(&text).await {
                            if e.is_fatal() || self.is_faulted() {
                                self.fail(e);
                                break;
                            }
                            self.telemetry.record(telemetry::FRAMES_SKIPPED, 1);
                            tracing::warn!(error = %e, "skipping inbound frame");
                        }
                    }
                    Some(Err(e)) => {
                        self.fail(e.into());
                        break;
                    }
                    None => {
                        self.fail(SessionError::Closed);
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Set(request, reply)) => {
                        let result = self.session.set_state(request);
                        if let Err(e) = self.flush().await {
                            // The edit never left this replica.
                            let _ = reply.send(Err(SessionError::Faulted(e.to_string())));
                            self.fail(e);
                            break;
                        }
                        if let Ok(value) = &result {
                            self.publish(value.clone());
                        }
                        let _ = reply.send(result);
                    }
                    // Every handle is gone or close() was called.
                    Some(Command::Close) | None => break,
                },
            }
        }
        self.shutdown().await;
    }

    async fn open(&mut self) -> Result<(), SessionError> {
        let init = self.session.open()?;
        self.send(init).await
    }

    async fn on_frame(&mut self, text: &str) -> Result<(), SessionError> {
        let message = Message::from_text(text)?;
        tracing::trace!(kind = message.kind(), "inbound frame");
        let is_update = matches!(message, Message::Update { .. });
        match self.session.handle_message(message)? {
            SessionEvent::Ready(value) => {
                self.telemetry.record(telemetry::SESSIONS_READY, 1);
                self.publish(value);
            }
            SessionEvent::Changed(value) => {
                self.publish(value);
            }
            SessionEvent::Idle => {}
        }
        if is_update {
            self.telemetry.record(telemetry::UPDATES_RECEIVED, 1);
        }
        // Reconciling against a peer's snapshot may produce a local edit.
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), SessionError> {
        for message in self.session.take_outbound() {
            self.send(message).await?;
            self.telemetry.record(telemetry::UPDATES_SENT, 1);
        }
        Ok(())
    }

    async fn send(&mut self, message: Message) -> Result<(), SessionError> {
        let text = message.to_text()?;
        self.transport.send(text).await?;
        Ok(())
    }

    fn publish(&self, value: Value) {
        let ready = self.session.is_ready();
        self.status.send_modify(|status| {
            status.value = value;
            status.ready = ready;
        });
    }

    fn is_faulted(&self) -> bool {
        matches!(self.session.state(), SessionState::Faulted(_))
    }

    fn fail(&mut self, error: SessionError) {
        tracing::error!(sid = self.session.sid(), error = %error, "session faulted");
        // Keep the reason the session recorded first, if any.
        self.session.fault(error.to_string());
        let reason = match self.session.state() {
            SessionState::Faulted(reason) => reason.clone(),
            _ => error.to_string(),
        };
        self.telemetry.record(telemetry::SESSIONS_FAULTED, 1);
        self.status.send_modify(|status| status.fault = Some(reason));
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "transport close failed");
        }
        tracing::debug!(sid = self.session.sid(), "session stopped");
    }
}
