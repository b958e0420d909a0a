//! Simulated bus transport
//!
//! Stands in for real hardware: the `simulation` connection target and the
//! test suite both use it. Writes are recorded with a timestamp, and a
//! [`SimulationHandle`] lets the owner inject incoming bytes, register canned
//! answers for specific frames, and make connect/send fail on demand.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use super::traits::{ConnectionState, Transport, TransportError, TransportStats};

/// Observable line activity, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Connect,
    Break,
    Dtr(bool),
    Rts(bool),
    Write(Vec<u8>),
}

#[derive(Debug, Default)]
struct SimState {
    events: Vec<(Instant, BusEvent)>,
    replies: HashMap<Vec<u8>, Vec<u8>>,
    fail_connect: bool,
    fail_send: bool,
}

/// Control side of a [`SimulatedTransport`]
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    state: Arc<Mutex<SimState>>,
    incoming: mpsc::UnboundedSender<Vec<u8>>,
}

impl SimulationHandle {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make bytes available to the next `receive`
    pub fn inject(&self, bytes: &[u8]) {
        if !bytes.is_empty() {
            let _ = self.incoming.send(bytes.to_vec());
        }
    }

    /// Answer `frame` with `answer` whenever it is written
    pub fn reply_to(&self, frame: &[u8], answer: &[u8]) {
        self.lock().replies.insert(frame.to_vec(), answer.to_vec());
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.lock().fail_send = fail;
    }

    /// Drop the connection as if the peer went away
    pub fn drop_connection(&self) {
        let _ = self.incoming.send(Vec::new());
    }

    /// Everything that happened on the line so far
    pub fn events(&self) -> Vec<(Instant, BusEvent)> {
        self.lock().events.clone()
    }

    /// Written frames in order
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.lock()
            .events
            .iter()
            .filter_map(|(_, event)| match event {
                BusEvent::Write(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }
}

/// In-memory transport with no hardware behind it
#[derive(Debug)]
pub struct SimulatedTransport {
    state: Arc<Mutex<SimState>>,
    incoming_tx: mpsc::UnboundedSender<Vec<u8>>,
    incoming_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: VecDeque<u8>,
    connected: bool,
    stats: TransportStats,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            incoming_tx,
            incoming_rx,
            pending: VecDeque::new(),
            connected: false,
            stats: TransportStats::new(),
        }
    }

    /// Transport plus the handle that controls it
    pub fn with_handle() -> (Self, SimulationHandle) {
        let transport = Self::new();
        let handle = transport.handle();
        (transport, handle)
    }

    pub fn handle(&self) -> SimulationHandle {
        SimulationHandle {
            state: Arc::clone(&self.state),
            incoming: self.incoming_tx.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: BusEvent) {
        self.lock().events.push((Instant::now(), event));
    }

    fn ensure_connected(&self, what: &str) -> Result<(), TransportError> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::SendFailed(format!(
                "{what} on disconnected simulation"
            )))
        }
    }

    fn lose_connection(&mut self) -> TransportError {
        self.connected = false;
        self.pending.clear();
        self.stats.record_disconnection();
        TransportError::ConnectionLost("Simulated connection dropped".to_string())
    }

    fn drain_pending(&mut self, buffer: &mut [u8]) -> usize {
        let n = buffer.len().min(self.pending.len());
        for (slot, byte) in buffer.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        self.stats.record_bytes_received(n);
        n
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn transport_type(&self) -> &str {
        "simulation"
    }

    fn name(&self) -> &str {
        "simulation"
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.connected {
            return Ok(());
        }
        self.stats.record_connection_attempt();
        if self.lock().fail_connect {
            self.stats.record_failed_connection();
            return Err(TransportError::ConnectionFailed(
                "Simulated connect failure".to_string(),
            ));
        }
        self.connected = true;
        self.stats.record_successful_connection();
        self.record(BusEvent::Connect);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.connected {
            self.connected = false;
            self.stats.record_disconnection();
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.ensure_connected("send")?;
        let reply = {
            let mut state = self.lock();
            if state.fail_send {
                return Err(TransportError::SendFailed("Simulated send failure".to_string()));
            }
            state
                .events
                .push((Instant::now(), BusEvent::Write(data.to_vec())));
            state.replies.get(data).cloned()
        };
        self.stats.record_bytes_sent(data.len());
        debug!(
            hex_data = %common::hex::format_hex_spaced(data),
            length = data.len(),
            direction = "send",
            "[Simulation] Raw packet"
        );

        if let Some(answer) = reply {
            self.pending.extend(answer);
        }
        Ok(data.len())
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        if !self.connected {
            return Err(TransportError::ReceiveFailed(
                "Simulation not connected".to_string(),
            ));
        }
        if buffer.is_empty() {
            return Ok(0);
        }
        if !self.pending.is_empty() {
            return Ok(self.drain_pending(buffer));
        }

        // recv() is cancel-safe; nothing is lost if this future is dropped
        let chunk = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.incoming_rx.recv()).await {
                Ok(chunk) => chunk,
                Err(_) => {
                    return Err(TransportError::Timeout(format!(
                        "Receive operation timed out after {limit:?}"
                    )));
                },
            },
            None => self.incoming_rx.recv().await,
        };

        match chunk {
            Some(bytes) if !bytes.is_empty() => {
                self.pending.extend(bytes);
                Ok(self.drain_pending(buffer))
            },
            _ => Err(self.lose_connection()),
        }
    }

    async fn send_break(&mut self) -> Result<(), TransportError> {
        self.ensure_connected("break")?;
        self.record(BusEvent::Break);
        Ok(())
    }

    async fn set_dtr(&mut self, level: bool) -> Result<(), TransportError> {
        self.ensure_connected("DTR")?;
        self.record(BusEvent::Dtr(level));
        Ok(())
    }

    async fn set_rts(&mut self, level: bool) -> Result<(), TransportError> {
        self.ensure_connected("RTS")?;
        self.record(BusEvent::Rts(level));
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connection_state(&self) -> ConnectionState {
        self.stats.connection_state
    }

    async fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
