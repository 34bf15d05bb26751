#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use json_crdt_relay::transport::{Transport, TransportError, TransportResult};
use json_crdt_relay::{Message, SessionHandle, SessionStatus};
use tokio::sync::mpsc;

/// Client end of a connection to [`TestRelay`].
pub struct RelayConnection {
    peer: usize,
    to_relay: mpsc::UnboundedSender<Inbound>,
    from_relay: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for RelayConnection {
    async fn send(&mut self, text: String) -> TransportResult<()> {
        self.to_relay
            .send(Inbound::Frame(self.peer, text))
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<TransportResult<String>> {
        self.from_relay.recv().await.map(Ok)
    }
}

enum Inbound {
    Join(usize, mpsc::UnboundedSender<String>),
    Frame(usize, String),
    Kick(usize),
}

/// Minimal single-channel relay: the first `init` wins, later joiners get
/// the canonical snapshot plus every update since, and updates fan out to
/// all other peers.
pub struct TestRelay {
    tx: mpsc::UnboundedSender<Inbound>,
    next_peer: usize,
}

impl TestRelay {
    pub fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_relay(rx));
        Self { tx, next_peer: 0 }
    }

    pub fn connect(&mut self) -> (usize, RelayConnection) {
        let peer = self.next_peer;
        self.next_peer += 1;
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let _ = self.tx.send(Inbound::Join(peer, out_tx));
        (
            peer,
            RelayConnection {
                peer,
                to_relay: self.tx.clone(),
                from_relay: out_rx,
            },
        )
    }

    /// Drop the relay side of a peer's connection.
    pub fn kick(&self, peer: usize) {
        let _ = self.tx.send(Inbound::Kick(peer));
    }
}

async fn run_relay(mut rx: mpsc::UnboundedReceiver<Inbound>) {
    let mut peers: HashMap<usize, mpsc::UnboundedSender<String>> = HashMap::new();
    let mut canonical: Option<String> = None;
    let mut history: Vec<String> = Vec::new();

    while let Some(inbound) = rx.recv().await {
        match inbound {
            Inbound::Join(peer, tx) => {
                peers.insert(peer, tx);
            }
            Inbound::Kick(peer) => {
                peers.remove(&peer);
            }
            Inbound::Frame(peer, text) => {
                let Ok(message) = Message::from_text(&text) else {
                    continue;
                };
                let Some(out) = peers.get(&peer) else {
                    continue;
                };
                match message {
                    Message::Init { .. } => match &canonical {
                        None => {
                            canonical = Some(text);
                            let _ = out.send(Message::First.to_text().unwrap());
                        }
                        Some(snapshot) => {
                            let _ = out.send(snapshot.clone());
                            for update in &history {
                                let _ = out.send(update.clone());
                            }
                        }
                    },
                    Message::Update { .. } => {
                        history.push(text.clone());
                        for (other, tx) in &peers {
                            if *other != peer {
                                let _ = tx.send(text.clone());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Wait until the handle publishes a status matching `pred`.
pub async fn wait_for_status(
    handle: &SessionHandle,
    pred: impl Fn(&SessionStatus) -> bool,
) -> SessionStatus {
    let mut status = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        status.wait_for(|s| pred(s)).await.map(|s| s.clone())
    })
    .await
    .expect("timed out waiting for session status")
    .expect("session task ended")
}
