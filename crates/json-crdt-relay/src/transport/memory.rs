use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Transport, TransportError, TransportResult};

/// One end of an in-process channel pair.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryTransport {
    /// Two connected ends: what one sends, the other receives.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self { tx: a_tx, rx: a_rx },
            Self { tx: b_tx, rx: b_rx },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, text: String) -> TransportResult<()> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<TransportResult<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.rx.close();
        Ok(())
    }
}
