//! High-level bus operations
//!
//! `SbbClient` turns logical requests (raw bytes, opcodes, module values)
//! into frames and hands them to the transceiver queue.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::transceiver::{ExchangeTiming, TransceiverHandle, TransceiverStatus};
use crate::error::{Result, SbbError};
use crate::protocol::{CommandTable, Frame, ModuleType, CMD_GET_POSITION};

/// Answer to one info register query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoReading {
    pub opcode: u8,
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A module that answered during an address sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanHit {
    pub addr: u8,
    pub position: u8,
}

/// Client for the SBB bus
#[derive(Debug, Clone)]
pub struct SbbClient {
    transceiver: TransceiverHandle,
}

impl SbbClient {
    pub fn new(transceiver: TransceiverHandle) -> Self {
        Self { transceiver }
    }

    pub fn status(&self) -> TransceiverStatus {
        self.transceiver.status()
    }

    pub fn transceiver(&self) -> &TransceiverHandle {
        &self.transceiver
    }

    /// Send an already built frame and wait for `answer_bytes` bytes
    pub async fn send_command(&self, frame: Frame, answer_bytes: usize) -> Result<Vec<u8>> {
        self.transceiver.exchange(frame, answer_bytes).await
    }

    /// Build a frame from the command table and exchange it
    ///
    /// `expected` overrides the table's answer length.
    pub async fn send_frame(
        &self,
        opcode: u8,
        address: u8,
        params: &[u8],
        expected: Option<usize>,
    ) -> Result<Vec<u8>> {
        let frame = Frame::build(opcode, address, params)?;
        let answer_bytes = expected.unwrap_or_else(|| frame.expected_answer());
        self.send_command(frame, answer_bytes).await
    }

    /// Send bytes as given; the answer length defaults to the opcode's
    pub async fn send_raw(&self, bytes: Vec<u8>, expected: Option<usize>) -> Result<Vec<u8>> {
        let frame = Frame::raw(bytes)?;
        let answer_bytes = expected.unwrap_or_else(|| frame.expected_answer());
        self.send_command(frame, answer_bytes).await
    }

    /// Move a module to a raw position; returns the frame that was sent
    pub async fn set_position(&self, address: u8, position: u8) -> Result<Frame> {
        let frame = Frame::set_position(address, position);
        self.send_command(frame.clone(), 0).await?;
        Ok(frame)
    }

    /// Show a logical value on a module of the given type
    pub async fn set_module_value(
        &self,
        address: u8,
        module_type: ModuleType,
        value: i64,
    ) -> Result<Frame> {
        let position = module_type.position(value);
        debug!("Module {address} ({module_type}) value {value} -> position {position}");
        self.set_position(address, position).await
    }

    /// Queue a module update without waiting for it
    ///
    /// Failures are logged once the exchange finishes.
    pub fn post_module_value(
        &self,
        address: u8,
        module_type: ModuleType,
        value: i64,
    ) -> Result<()> {
        let frame = Frame::set_position(address, module_type.position(value));
        let pending = self.transceiver.submit(frame, 0)?;
        tokio::spawn(async move {
            match pending.await {
                Ok(Ok(_)) => {},
                Ok(Err(e)) => warn!("Update of module {address} failed: {e}"),
                Err(_) => warn!("Update of module {address} was dropped"),
            }
        });
        Ok(())
    }

    /// Query every info register of one module
    ///
    /// All queries are queued together; each register reports its own
    /// outcome so one silent register does not hide the others.
    pub async fn query_info(&self, address: u8) -> Result<Vec<InfoReading>> {
        let table = CommandTable::global();
        let mut pending = Vec::new();
        for opcode in table.info_opcodes() {
            let frame = Frame::build(opcode, address, &[])?;
            let answer_bytes = frame.expected_answer();
            pending.push((opcode, self.transceiver.submit(frame, answer_bytes)?));
        }

        let mut readings = Vec::with_capacity(pending.len());
        for (opcode, rx) in pending {
            let outcome = rx
                .await
                .map_err(|_| SbbError::internal("Transceiver dropped the exchange"))?;
            let name = table.get(opcode).map_or("unknown", |c| c.name);
            let (answer, error) = match outcome {
                Ok(bytes) => (Some(common::hex::encode_upper(&bytes)), None),
                Err(e) => (None, Some(e.to_string())),
            };
            readings.push(InfoReading {
                opcode,
                name,
                answer,
                error,
            });
        }
        Ok(readings)
    }

    /// Probe each address in `range` with a position query
    ///
    /// Silent addresses are skipped; a connection failure aborts the sweep.
    pub async fn scan(
        &self,
        range: RangeInclusive<u8>,
        response_timeout: Duration,
    ) -> Result<Vec<ScanHit>> {
        let timing = ExchangeTiming {
            response_timeout,
            ..self.transceiver.timing()
        };
        info!(
            "Scanning addresses {}..={} ({response_timeout:?} per address)",
            range.start(),
            range.end()
        );

        let mut hits = Vec::new();
        for addr in range {
            let frame = Frame::build(CMD_GET_POSITION, addr, &[])?;
            match self.transceiver.exchange_with(frame, 1, timing).await {
                Ok(answer) => {
                    let position = answer.first().copied().unwrap_or_default();
                    info!("Module {addr} answered, position {position}");
                    hits.push(ScanHit { addr, position });
                },
                Err(e) if e.is_timeout() => {},
                Err(e) => return Err(e),
            }
        }
        info!("Scan finished, {} module(s) found", hits.len());
        Ok(hits)
    }
}
