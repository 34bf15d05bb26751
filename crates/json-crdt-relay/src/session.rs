//! Replication session state machine.
//!
//! [`ReplicationSession`] does no I/O: the driver feeds it inbound messages
//! and local set-requests and ships whatever [`take_outbound`] returns.
//!
//! ```text
//! Connecting --open()--> AwaitingReconciliation --first/init--> Ready
//!      \_____________________________|______________________________\__> Faulted
//! ```
//!
//! Only changes that originate locally are encoded for the relay. Updates
//! received from the relay, and the snapshot adopted during reconciliation,
//! are applied with [`Origin::Remote`] and never leave the session again.
//!
//! [`take_outbound`]: ReplicationSession::take_outbound

use std::fmt;

use json_crdt::json_crdt::NodeKind;
use json_crdt::{synchronize, Document, MergeMode, Origin, SyncError, MAIN};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::logging;
use crate::protocol::Message;

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Channel key; sessions with the same key share one value.
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingReconciliation,
    Ready,
    Faulted(String),
}

/// Result of handling one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Reconciliation finished; carries the first published value.
    Ready(Value),
    /// A remote update changed the value.
    Changed(Value),
    /// Nothing for the caller to publish.
    Idle,
}

/// A local mutation request.
pub enum SetState {
    Value(Value),
    Update(Box<dyn FnOnce(&Value) -> Value + Send>),
}

impl SetState {
    pub fn update<F>(f: F) -> Self
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        SetState::Update(Box::new(f))
    }
}

impl fmt::Debug for SetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetState::Value(value) => f.debug_tuple("Value").field(value).finish(),
            SetState::Update(_) => f.write_str("Update(..)"),
        }
    }
}

impl From<Value> for SetState {
    fn from(value: Value) -> Self {
        SetState::Value(value)
    }
}

pub struct ReplicationSession {
    state: SessionState,
    initial: Value,
    candidate: Vec<u8>,
    doc: Document,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Updates that arrived before reconciliation finished.
    pending: Vec<Vec<u8>>,
}

impl ReplicationSession {
    /// Build the candidate state for `initial`.
    ///
    /// The document root is a map, so `initial` must be a JSON object.
    pub fn new(initial: Value) -> Result<Self, SessionError> {
        ensure_object(&initial)?;
        let mut candidate = Document::random();
        synchronize(
            &mut candidate,
            &initial,
            Some(MAIN),
            MergeMode::Replace,
            Origin::Local,
        )?;
        let snapshot = candidate.snapshot()?;

        let mut doc = Document::new(candidate.sid());
        let (tx, rx) = mpsc::unbounded_channel();
        doc.observe(move |event| {
            if event.origin == Origin::Remote {
                return;
            }
            match event.encode_update() {
                Ok(update) => {
                    // The receiver lives in the session; a send error means
                    // it is being dropped.
                    let _ = tx.send(update);
                }
                Err(e) => tracing::error!(error = %e, "failed to encode local update"),
            }
        });

        tracing::debug!(sid = doc.sid(), bytes = snapshot.len(), "candidate state built");
        Ok(Self {
            state: SessionState::Connecting,
            initial,
            candidate: snapshot,
            doc,
            outbound: rx,
            pending: Vec::new(),
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn sid(&self) -> u64 {
        self.doc.sid()
    }

    /// Current materialized value.
    ///
    /// Before reconciliation the live document is still empty.
    pub fn value(&self) -> Value {
        self.doc.materialize()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The message to send once the transport is open.
    pub fn open(&mut self) -> Result<Message, SessionError> {
        self.check_faulted()?;
        if self.state == SessionState::Connecting {
            self.state = SessionState::AwaitingReconciliation;
        }
        Ok(Message::init(&self.candidate))
    }

    pub fn handle_message(&mut self, message: Message) -> Result<SessionEvent, SessionError> {
        self.check_faulted()?;
        match message {
            Message::First => {
                if self.is_ready() {
                    tracing::warn!(sid = self.sid(), "ignoring first after reconciliation");
                    return Ok(SessionEvent::Idle);
                }
                let adopted = self.doc.apply_update(&self.candidate, Origin::Remote);
                self.reconciled(adopted.map_err(SessionError::from), false)
            }
            Message::Init { .. } => {
                if self.is_ready() {
                    tracing::warn!(sid = self.sid(), "ignoring init after reconciliation");
                    return Ok(SessionEvent::Idle);
                }
                let adopted = match message.decode_payload() {
                    Ok(Some(snapshot)) => self
                        .doc
                        .apply_update(&snapshot, Origin::Remote)
                        .map_err(SessionError::from),
                    Ok(None) => Ok(()),
                    Err(e) => Err(e),
                };
                self.reconciled(adopted, true)
            }
            Message::Update { .. } => {
                let Some(update) = message.decode_payload()? else {
                    return Ok(SessionEvent::Idle);
                };
                if !self.is_ready() {
                    tracing::debug!(bytes = update.len(), "buffering update until reconciled");
                    self.pending.push(update);
                    return Ok(SessionEvent::Idle);
                }
                self.doc.apply_update(&update, Origin::Remote)?;
                Ok(SessionEvent::Changed(self.value()))
            }
            Message::Error { message } => {
                tracing::error!(sid = self.sid(), error = %message, "relay reported an error");
                self.state = SessionState::Faulted(message.clone());
                Err(SessionError::Relay(message))
            }
            Message::Console { level, logs } => {
                logging::forward_console(level, &logs);
                Ok(SessionEvent::Idle)
            }
        }
    }

    /// Apply a local mutation and return the new value.
    pub fn set_state(&mut self, request: SetState) -> Result<Value, SessionError> {
        self.check_faulted()?;
        if !self.is_ready() {
            return Err(SessionError::NotReady);
        }
        let value = match request {
            SetState::Value(value) => value,
            SetState::Update(f) => f(&self.value()),
        };
        ensure_object(&value)?;
        synchronize(
            &mut self.doc,
            &value,
            Some(MAIN),
            MergeMode::Replace,
            Origin::Local,
        )?;
        Ok(self.value())
    }

    /// Drain the updates produced by local changes since the last call.
    pub fn take_outbound(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(update) = self.outbound.try_recv() {
            messages.push(Message::update(&update));
        }
        messages
    }

    /// Mark the session as terminally failed.
    pub fn fault(&mut self, reason: impl Into<String>) {
        if !matches!(self.state, SessionState::Faulted(_)) {
            self.state = SessionState::Faulted(reason.into());
        }
    }

    fn check_faulted(&self) -> Result<(), SessionError> {
        match &self.state {
            SessionState::Faulted(reason) => Err(SessionError::Faulted(reason.clone())),
            _ => Ok(()),
        }
    }

    /// Finish reconciliation once a canonical snapshot has been adopted.
    fn reconciled(
        &mut self,
        adopted: Result<(), SessionError>,
        merge_initial: bool,
    ) -> Result<SessionEvent, SessionError> {
        if let Err(e) = adopted {
            self.fault(format!("cannot adopt canonical state: {e}"));
            return Err(e);
        }
        for update in std::mem::take(&mut self.pending) {
            if let Err(e) = self.doc.apply_update(&update, Origin::Remote) {
                tracing::warn!(error = %e, "dropping buffered update");
            }
        }
        if merge_initial {
            let merged = synchronize(
                &mut self.doc,
                &self.initial,
                Some(MAIN),
                MergeMode::Additive,
                Origin::Local,
            );
            if let Err(e) = merged {
                self.fault(format!("cannot merge initial value: {e}"));
                return Err(e.into());
            }
        }
        self.state = SessionState::Ready;
        tracing::info!(sid = self.sid(), canonical = !merge_initial, "session ready");
        Ok(SessionEvent::Ready(self.value()))
    }
}

impl fmt::Debug for ReplicationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationSession")
            .field("state", &self.state)
            .field("doc", &self.doc)
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn ensure_object(value: &Value) -> Result<(), SyncError> {
    match value {
        Value::Object(_) => Ok(()),
        other => Err(SyncError::ShapeMismatch {
            id: MAIN,
            expected: NodeKind::of_value(other),
            found: NodeKind::Map,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ready_first(initial: Value) -> ReplicationSession {
        let mut session = ReplicationSession::new(initial).unwrap();
        session.open().unwrap();
        session.handle_message(Message::First).unwrap();
        session
    }

    #[test]
    fn open_sends_candidate_snapshot() {
        let mut session = ReplicationSession::new(json!({ "a": 1 })).unwrap();
        assert_eq!(session.state(), &SessionState::Connecting);
        let init = session.open().unwrap();
        assert_eq!(session.state(), &SessionState::AwaitingReconciliation);

        let snapshot = init.decode_payload().unwrap().unwrap();
        let mut peer = Document::new(90_000);
        peer.apply_update(&snapshot, Origin::Remote).unwrap();
        assert_eq!(peer.materialize(), json!({ "a": 1 }));
        // Nothing is published before reconciliation.
        assert_eq!(session.value(), json!({}));
    }

    #[test]
    fn first_adopts_candidate_without_echo() {
        let mut session = ReplicationSession::new(json!({ "a": [1, 2] })).unwrap();
        session.open().unwrap();
        let event = session.handle_message(Message::First).unwrap();
        assert_eq!(event, SessionEvent::Ready(json!({ "a": [1, 2] })));
        assert!(session.is_ready());
        assert!(session.take_outbound().is_empty());
    }

    #[test]
    fn init_reply_merges_initial_additively() {
        let mut canonical = Document::new(90_000);
        synchronize(
            &mut canonical,
            &json!({ "shared": "theirs", "theirs": 1 }),
            Some(MAIN),
            MergeMode::Replace,
            Origin::Local,
        )
        .unwrap();

        let mut session = ReplicationSession::new(json!({ "mine": true })).unwrap();
        session.open().unwrap();
        let event = session
            .handle_message(Message::init(&canonical.snapshot().unwrap()))
            .unwrap();
        let expected = json!({ "shared": "theirs", "theirs": 1, "mine": true });
        assert_eq!(event, SessionEvent::Ready(expected.clone()));

        // The merged key is a local edit and goes out exactly once.
        let outbound = session.take_outbound();
        assert_eq!(outbound.len(), 1);
        let update = outbound[0].decode_payload().unwrap().unwrap();
        canonical.apply_update(&update, Origin::Remote).unwrap();
        assert_eq!(canonical.materialize(), expected);
    }

    #[test]
    fn init_reply_without_missing_keys_sends_nothing() {
        let mut canonical = Document::new(90_000);
        synchronize(
            &mut canonical,
            &json!({ "a": 1, "b": 2 }),
            Some(MAIN),
            MergeMode::Replace,
            Origin::Local,
        )
        .unwrap();
        let mut session = ReplicationSession::new(json!({ "a": 1 })).unwrap();
        session.open().unwrap();
        session
            .handle_message(Message::init(&canonical.snapshot().unwrap()))
            .unwrap();
        assert!(session.take_outbound().is_empty());
        assert_eq!(session.value(), json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn local_change_emits_one_update() {
        let mut session = ready_first(json!({ "n": 0, "list": [1] }));
        let value = session
            .set_state(SetState::Value(json!({ "n": 1, "list": [1, 2, 3], "k": {} })))
            .unwrap();
        assert_eq!(value, json!({ "n": 1, "list": [1, 2, 3], "k": {} }));
        assert_eq!(session.take_outbound().len(), 1);
        assert!(session.take_outbound().is_empty());
    }

    #[test]
    fn updater_sees_previous_value() {
        let mut session = ready_first(json!({ "count": 1 }));
        let value = session
            .set_state(SetState::update(|prev| {
                let count = prev["count"].as_i64().unwrap_or(0);
                json!({ "count": count + 1 })
            }))
            .unwrap();
        assert_eq!(value, json!({ "count": 2 }));
    }

    #[test]
    fn unchanged_value_sends_nothing() {
        let mut session = ready_first(json!({ "a": 1 }));
        session.set_state(json!({ "a": 1 }).into()).unwrap();
        assert!(session.take_outbound().is_empty());
    }

    #[test]
    fn remote_update_is_not_echoed() {
        let mut a = ready_first(json!({ "a": 1 }));
        let mut b = ReplicationSession::new(json!({})).unwrap();
        b.open().unwrap();
        b.handle_message(Message::init(&a.document().snapshot().unwrap()))
            .unwrap();
        assert!(b.take_outbound().is_empty());

        a.set_state(json!({ "a": 2 }).into()).unwrap();
        let outbound = a.take_outbound();
        assert_eq!(outbound.len(), 1);
        let event = b.handle_message(outbound[0].clone()).unwrap();
        assert_eq!(event, SessionEvent::Changed(json!({ "a": 2 })));
        assert!(b.take_outbound().is_empty());
    }

    #[test]
    fn early_updates_are_buffered() {
        let mut canonical = Document::new(90_000);
        synchronize(&mut canonical, &json!({ "a": 1 }), Some(MAIN), MergeMode::Replace, Origin::Local)
            .unwrap();
        let snapshot = canonical.snapshot().unwrap();
        let mut updates = Vec::new();
        let sink = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let tap = sink.clone();
        canonical.observe(move |e| tap.lock().unwrap().push(e.encode_update().unwrap()));
        synchronize(&mut canonical, &json!({ "a": 2 }), Some(MAIN), MergeMode::Replace, Origin::Local)
            .unwrap();
        updates.extend(sink.lock().unwrap().drain(..));

        let mut session = ReplicationSession::new(json!({})).unwrap();
        session.open().unwrap();
        let event = session.handle_message(Message::update(&updates[0])).unwrap();
        assert_eq!(event, SessionEvent::Idle);
        let event = session.handle_message(Message::init(&snapshot)).unwrap();
        assert_eq!(event, SessionEvent::Ready(json!({ "a": 2 })));
    }

    #[test]
    fn set_before_ready_is_rejected() {
        let mut session = ReplicationSession::new(json!({})).unwrap();
        session.open().unwrap();
        assert!(matches!(
            session.set_state(json!({ "a": 1 }).into()),
            Err(SessionError::NotReady)
        ));
    }

    #[test]
    fn relay_error_is_terminal() {
        let mut session = ready_first(json!({}));
        let err = session
            .handle_message(Message::Error {
                message: "quota".into(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::Relay(ref m) if m == "quota"));
        assert_eq!(session.state(), &SessionState::Faulted("quota".into()));
        assert!(matches!(
            session.set_state(json!({}).into()),
            Err(SessionError::Faulted(_))
        ));
        assert!(matches!(
            session.handle_message(Message::First),
            Err(SessionError::Faulted(_))
        ));
    }

    #[test]
    fn duplicate_first_is_ignored() {
        let mut session = ready_first(json!({ "a": 1 }));
        assert_eq!(session.handle_message(Message::First).unwrap(), SessionEvent::Idle);
        assert_eq!(
            session.handle_message(Message::init(&[])).unwrap(),
            SessionEvent::Idle
        );
        assert_eq!(session.value(), json!({ "a": 1 }));
    }

    #[test]
    fn shape_errors_surface_synchronously() {
        assert!(matches!(
            ReplicationSession::new(json!([1])),
            Err(SessionError::Sync(SyncError::ShapeMismatch { .. }))
        ));
        let mut session = ready_first(json!({}));
        assert!(matches!(
            session.set_state(json!("scalar").into()),
            Err(SessionError::Sync(SyncError::ShapeMismatch {
                expected: NodeKind::Scalar,
                ..
            }))
        ));
        assert!(session.is_ready());
    }

    #[test]
    fn corrupt_canonical_state_faults() {
        let mut session = ReplicationSession::new(json!({})).unwrap();
        session.open().unwrap();
        let err = session.handle_message(Message::init(&[0xff, 0x00])).unwrap_err();
        assert!(matches!(err, SessionError::Codec(_)));
        assert!(matches!(session.state(), SessionState::Faulted(_)));
    }

    #[test]
    fn console_is_not_control_flow() {
        let mut session = ready_first(json!({}));
        let event = session
            .handle_message(Message::Console {
                level: crate::protocol::ConsoleLevel::Info,
                logs: vec![json!("hello")],
            })
            .unwrap();
        assert_eq!(event, SessionEvent::Idle);
        assert!(session.is_ready());
    }
}
