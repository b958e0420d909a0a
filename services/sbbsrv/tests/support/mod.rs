//! Shared fixtures for the sbbsrv integration tests

#![allow(dead_code)]

use std::time::Duration;

use sbbsrv::core::transport::{BusEvent, SimulatedTransport, SimulationHandle};
use sbbsrv::core::{DirectionDriver, TxEnableLine};
use sbbsrv::{ExchangeTiming, SbbClient, Transceiver};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A running transceiver on a simulated bus
pub struct TestBus {
    pub client: SbbClient,
    pub sim: SimulationHandle,
    pub shutdown: CancellationToken,
    pub task: JoinHandle<()>,
}

impl TestBus {
    pub fn start(line: TxEnableLine, hold: Duration, timing: ExchangeTiming) -> Self {
        let (bus, sim) = SimulatedTransport::with_handle();
        let shutdown = CancellationToken::new();
        let (handle, task) = Transceiver::spawn(
            Box::new(bus),
            DirectionDriver::new(line, hold),
            timing,
            shutdown.clone(),
        );
        Self {
            client: SbbClient::new(handle),
            sim,
            shutdown,
            task,
        }
    }

    /// No direction line, no initiation delay
    pub fn quick(response_timeout: Duration) -> Self {
        Self::start(TxEnableLine::None, Duration::ZERO, timing(0, response_timeout))
    }

    /// Line events without timestamps
    pub fn events(&self) -> Vec<BusEvent> {
        self.sim.events().into_iter().map(|(_, e)| e).collect()
    }

    /// Times at which frames were written
    pub fn write_times(&self) -> Vec<Instant> {
        self.sim
            .events()
            .into_iter()
            .filter_map(|(at, e)| matches!(e, BusEvent::Write(_)).then_some(at))
            .collect()
    }
}

pub fn timing(initiation_ms: u64, response_timeout: Duration) -> ExchangeTiming {
    ExchangeTiming {
        initiation_delay: Duration::from_millis(initiation_ms),
        response_timeout,
    }
}
