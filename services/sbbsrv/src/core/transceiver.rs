//! Half-duplex transceiver
//!
//! One task owns the bus transport, the transmitter enable line and the
//! request queue. Exchanges are taken from the queue strictly in order; each
//! one is stepped through [`ExchangeState`] until it completes or fails, and
//! only then is the next one started. Bytes arriving while nothing awaits an
//! answer are reported as unsolicited.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use common::hex::format_hex_spaced;

use super::rs485::DirectionDriver;
use super::transport::{Transport, TransportError, TransportStats};
use crate::error::{Result, SbbError};
use crate::protocol::Frame;

const UNSOLICITED_CHANNEL_CAPACITY: usize = 64;
const IDLE_READ_CHUNK: usize = 64;

/// Longest answer a caller may wait for
pub const MAX_ANSWER_BYTES: usize = 255;

/// Per-exchange timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTiming {
    /// Pause before the frame is put on the bus
    pub initiation_delay: Duration,
    /// Time allowed for the answer, counted from the end of transmission
    pub response_timeout: Duration,
}

impl Default for ExchangeTiming {
    fn default() -> Self {
        Self {
            initiation_delay: Duration::from_millis(200),
            response_timeout: Duration::from_secs(2),
        }
    }
}

/// A queued request with its completion channel
#[derive(Debug)]
struct Exchange {
    frame: Frame,
    answer_bytes: usize,
    timing: ExchangeTiming,
    reply: oneshot::Sender<Result<Vec<u8>>>,
}

#[derive(Debug)]
enum ExchangeState {
    Queued,
    Transmitting,
    AwaitingResponse { collected: Vec<u8>, deadline: Instant },
    Completed(Vec<u8>),
    Failed(SbbError),
}

/// Snapshot published after every exchange
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransceiverStatus {
    pub transport_type: String,
    pub transport_name: String,
    pub connected: bool,
    pub tx_enabled: bool,
    pub hold_delay_ms: u64,
    pub queue_depth: usize,
    pub exchanges_completed: u64,
    pub exchanges_failed: u64,
    pub response_timeouts: u64,
    pub unsolicited_bytes: u64,
    pub transport: TransportStats,
}

/// Cloneable submission side of the transceiver
#[derive(Debug, Clone)]
pub struct TransceiverHandle {
    requests: mpsc::UnboundedSender<Exchange>,
    unsolicited: broadcast::Sender<Vec<u8>>,
    status: watch::Receiver<TransceiverStatus>,
    queued: Arc<AtomicUsize>,
    timing: ExchangeTiming,
}

impl TransceiverHandle {
    /// Default timing applied by [`TransceiverHandle::submit`]
    pub fn timing(&self) -> ExchangeTiming {
        self.timing
    }

    /// Queue a frame with default timing
    pub fn submit(
        &self,
        frame: Frame,
        answer_bytes: usize,
    ) -> Result<oneshot::Receiver<Result<Vec<u8>>>> {
        self.submit_with(frame, answer_bytes, self.timing)
    }

    /// Queue a frame; the receiver resolves exactly once with the outcome
    pub fn submit_with(
        &self,
        frame: Frame,
        answer_bytes: usize,
        timing: ExchangeTiming,
    ) -> Result<oneshot::Receiver<Result<Vec<u8>>>> {
        if answer_bytes > MAX_ANSWER_BYTES {
            return Err(SbbError::validation(format!(
                "Answer length {answer_bytes} exceeds the maximum of {MAX_ANSWER_BYTES} bytes"
            )));
        }
        let (reply, rx) = oneshot::channel();
        self.queued.fetch_add(1, Ordering::SeqCst);
        let exchange = Exchange {
            frame,
            answer_bytes,
            timing,
            reply,
        };
        if self.requests.send(exchange).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(SbbError::internal("Transceiver is not running"));
        }
        Ok(rx)
    }

    /// Queue a frame and wait for its outcome
    pub async fn exchange(&self, frame: Frame, answer_bytes: usize) -> Result<Vec<u8>> {
        self.exchange_with(frame, answer_bytes, self.timing).await
    }

    pub async fn exchange_with(
        &self,
        frame: Frame,
        answer_bytes: usize,
        timing: ExchangeTiming,
    ) -> Result<Vec<u8>> {
        self.submit_with(frame, answer_bytes, timing)?
            .await
            .map_err(|_| SbbError::internal("Transceiver dropped the exchange"))?
    }

    /// Stream of bytes received while no exchange was waiting for them
    pub fn subscribe_unsolicited(&self) -> broadcast::Receiver<Vec<u8>> {
        self.unsolicited.subscribe()
    }

    pub fn status(&self) -> TransceiverStatus {
        let mut status = self.status.borrow().clone();
        status.queue_depth = self.queued.load(Ordering::SeqCst);
        status
    }
}

/// Owner of the bus; see the module docs
#[derive(Debug)]
pub struct Transceiver {
    bus: Box<dyn Transport>,
    direction: DirectionDriver,
    requests: mpsc::UnboundedReceiver<Exchange>,
    unsolicited: broadcast::Sender<Vec<u8>>,
    status: watch::Sender<TransceiverStatus>,
    queued: Arc<AtomicUsize>,
}

impl Transceiver {
    pub fn new(
        bus: Box<dyn Transport>,
        direction: DirectionDriver,
        timing: ExchangeTiming,
    ) -> (Self, TransceiverHandle) {
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (unsolicited, _) = broadcast::channel(UNSOLICITED_CHANNEL_CAPACITY);
        let initial = TransceiverStatus {
            transport_type: bus.transport_type().to_string(),
            transport_name: bus.name().to_string(),
            hold_delay_ms: direction.hold().as_millis() as u64,
            ..Default::default()
        };
        let (status_tx, status_rx) = watch::channel(initial);
        let queued = Arc::new(AtomicUsize::new(0));

        let handle = TransceiverHandle {
            requests: requests_tx,
            unsolicited: unsolicited.clone(),
            status: status_rx,
            queued: Arc::clone(&queued),
            timing,
        };
        let transceiver = Self {
            bus,
            direction,
            requests,
            unsolicited,
            status: status_tx,
            queued,
        };
        (transceiver, handle)
    }

    /// Start the transceiver task
    pub fn spawn(
        bus: Box<dyn Transport>,
        direction: DirectionDriver,
        timing: ExchangeTiming,
        shutdown: CancellationToken,
    ) -> (TransceiverHandle, JoinHandle<()>) {
        let (transceiver, handle) = Self::new(bus, direction, timing);
        let task = tokio::spawn(transceiver.run(shutdown));
        (handle, task)
    }

    /// Serve the queue until shutdown or until every handle is gone
    pub async fn run(mut self, shutdown: CancellationToken) {
        self.open().await;
        self.publish_status().await;

        loop {
            let exchange = tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Transceiver received cancellation signal, shutting down");
                    break;
                }
                next = self.idle() => match next {
                    Some(exchange) => exchange,
                    None => break,
                },
            };
            self.process(exchange).await;
            self.queued.fetch_sub(1, Ordering::SeqCst);
            self.publish_status().await;
        }

        if self.bus.is_connected().await {
            if let Err(e) = self.direction.force_inactive(self.bus.as_mut()).await {
                warn!("Failed to release transmitter on shutdown: {e}");
            }
        }
        if let Err(e) = self.bus.close().await {
            warn!("Failed to close bus transport: {e}");
        }
        info!("Transceiver terminated");
    }

    /// Open the bus early so unsolicited bytes are seen from the start
    async fn open(&mut self) {
        match self.bus.connect().await {
            Ok(()) => {
                if let Err(e) = self.direction.force_inactive(self.bus.as_mut()).await {
                    warn!("Failed to set transmitter inactive: {e}");
                }
            },
            Err(e) => warn!("Bus not available yet, retrying with the first command: {e}"),
        }
    }

    /// Wait for the next request while servicing timers and stray bytes
    async fn idle(&mut self) -> Option<Exchange> {
        let mut buf = [0u8; IDLE_READ_CHUNK];
        loop {
            let connected = self.bus.is_connected().await;
            let release_at = self.direction.deadline();
            tokio::select! {
                request = self.requests.recv() => return request,
                () = sleep_until_opt(release_at) => self.fire_release().await,
                read = self.bus.receive(&mut buf, None), if connected => {
                    self.on_idle_read(read, &buf).await;
                }
            }
        }
    }

    async fn process(&mut self, exchange: Exchange) {
        let Exchange {
            frame,
            answer_bytes,
            timing,
            reply,
        } = exchange;
        debug!(frame = %frame, answer_bytes, "Exchange started");

        let mut state = ExchangeState::Queued;
        loop {
            state = match state {
                ExchangeState::Queued => {
                    self.wait_initiation(timing.initiation_delay).await;
                    ExchangeState::Transmitting
                },
                ExchangeState::Transmitting => self.transmit(&frame, answer_bytes, timing).await,
                ExchangeState::AwaitingResponse {
                    collected,
                    deadline,
                } => {
                    self.collect(collected, answer_bytes, deadline, timing.response_timeout)
                        .await
                },
                ExchangeState::Completed(answer) => {
                    debug!(
                        frame = %frame,
                        answer = %format_hex_spaced(&answer),
                        "Exchange completed"
                    );
                    self.status.send_modify(|s| s.exchanges_completed += 1);
                    let _ = reply.send(Ok(answer));
                    break;
                },
                ExchangeState::Failed(error) => {
                    warn!(frame = %frame, "Exchange failed: {error}");
                    let timed_out = error.is_timeout();
                    self.status.send_modify(|s| {
                        s.exchanges_failed += 1;
                        if timed_out {
                            s.response_timeouts += 1;
                        }
                    });
                    let _ = reply.send(Err(error));
                    break;
                },
            };
        }
    }

    async fn wait_initiation(&mut self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let start_at = Instant::now() + delay;
        let mut buf = [0u8; IDLE_READ_CHUNK];
        loop {
            let connected = self.bus.is_connected().await;
            let release_at = self.direction.deadline();
            tokio::select! {
                () = sleep_until(start_at) => return,
                () = sleep_until_opt(release_at) => self.fire_release().await,
                read = self.bus.receive(&mut buf, None), if connected => {
                    self.on_idle_read(read, &buf).await;
                }
            }
        }
    }

    async fn transmit(
        &mut self,
        frame: &Frame,
        answer_bytes: usize,
        timing: ExchangeTiming,
    ) -> ExchangeState {
        let was_connected = self.bus.is_connected().await;
        if let Err(e) = self.bus.connect().await {
            return ExchangeState::Failed(SbbError::connection(e.to_string()));
        }
        if !was_connected {
            if let Err(e) = self.direction.force_inactive(self.bus.as_mut()).await {
                warn!("Failed to set transmitter inactive after reconnect: {e}");
            }
        }

        info!("Transmitting bytes:{}", format_hex_spaced(frame.as_bytes()));
        if let Err(e) = self.put_on_wire(frame).await {
            if let Err(release_err) = self.direction.force_inactive(self.bus.as_mut()).await {
                debug!("Transmitter release after failed send: {release_err}");
            }
            return ExchangeState::Failed(SbbError::connection(e.to_string()));
        }
        let end_of_transmission = Instant::now();

        if let Err(e) = self.direction.release(self.bus.as_mut()).await {
            warn!("Failed to release transmitter: {e}");
        }

        if answer_bytes == 0 {
            ExchangeState::Completed(Vec::new())
        } else {
            ExchangeState::AwaitingResponse {
                collected: Vec::new(),
                deadline: end_of_transmission + timing.response_timeout,
            }
        }
    }

    async fn put_on_wire(&mut self, frame: &Frame) -> std::result::Result<(), TransportError> {
        self.direction.enable(self.bus.as_mut()).await?;
        self.bus.send_break().await?;
        self.bus.send(frame.as_bytes()).await?;
        Ok(())
    }

    async fn collect(
        &mut self,
        mut collected: Vec<u8>,
        expected: usize,
        deadline: Instant,
        timeout: Duration,
    ) -> ExchangeState {
        if collected.len() >= expected {
            return ExchangeState::Completed(collected);
        }

        // Read no further than the answer; surplus bytes stay in the transport
        let mut chunk = [0u8; IDLE_READ_CHUNK];
        let want = (expected - collected.len()).min(IDLE_READ_CHUNK);
        let release_at = self.direction.deadline();
        tokio::select! {
            biased;
            read = self.bus.receive(&mut chunk[..want], None) => match read {
                Ok(n) => {
                    collected.extend_from_slice(&chunk[..n]);
                    if collected.len() >= expected {
                        ExchangeState::Completed(collected)
                    } else {
                        ExchangeState::AwaitingResponse { collected, deadline }
                    }
                },
                Err(e) => ExchangeState::Failed(SbbError::connection(e.to_string())),
            },
            () = sleep_until(deadline) => ExchangeState::Failed(SbbError::ResponseTimeout {
                expected,
                received: collected.len(),
                timeout,
            }),
            () = sleep_until_opt(release_at) => {
                self.fire_release().await;
                ExchangeState::AwaitingResponse { collected, deadline }
            }
        }
    }

    async fn fire_release(&mut self) {
        if let Err(e) = self.direction.fire_if_due(self.bus.as_mut()).await {
            warn!("Failed to release transmitter: {e}");
        }
    }

    async fn on_idle_read(
        &mut self,
        read: std::result::Result<usize, TransportError>,
        buf: &[u8],
    ) {
        match read {
            Ok(0) => {},
            Ok(n) => {
                let bytes = &buf[..n];
                info!("Received bytes:{}", format_hex_spaced(bytes));
                self.status.send_modify(|s| s.unsolicited_bytes += n as u64);
                let _ = self.unsolicited.send(bytes.to_vec());
            },
            Err(e) => {
                warn!("Bus connection lost while idle: {e}");
                self.direction.reset();
                let _ = self.bus.disconnect().await;
                self.publish_status().await;
            },
        }
    }

    async fn publish_status(&mut self) {
        let transport = self.bus.stats().await;
        let connected = self.bus.is_connected().await;
        let tx_enabled = self.direction.is_enabled();
        self.status.send_modify(|s| {
            s.connected = connected;
            s.tx_enabled = tx_enabled;
            s.transport = transport;
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
