//! Bus timing behaviour of the transceiver queue
//!
//! All tests run on a paused clock so delays and timeouts are exact.

mod support;

use std::time::Duration;

use sbbsrv::core::transport::BusEvent;
use sbbsrv::core::TxEnableLine;
use sbbsrv::protocol::{CMD_GET_POSITION, CMD_GET_SERIAL};
use sbbsrv::{Frame, SbbError};
use support::{timing, TestBus};
use tokio::time::Instant;

fn get_position(addr: u8) -> Frame {
    Frame::build(CMD_GET_POSITION, addr, &[]).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_exchanges_run_in_submission_order() {
    let bus = TestBus::start(
        TxEnableLine::None,
        Duration::ZERO,
        timing(200, Duration::from_secs(2)),
    );
    let handle = bus.client.transceiver().clone();
    let start = Instant::now();

    let pending: Vec<_> = (1..=3u8)
        .map(|addr| handle.submit(Frame::set_position(addr, 10 + addr), 0).unwrap())
        .collect();
    for rx in pending {
        rx.await.unwrap().unwrap();
    }

    assert_eq!(
        bus.sim.written_frames(),
        vec![
            vec![0xFF, 0xC0, 0x01, 0x0B],
            vec![0xFF, 0xC0, 0x02, 0x0C],
            vec![0xFF, 0xC0, 0x03, 0x0D],
        ]
    );
    // Each exchange waits the initiation delay after the previous one ended
    let offsets: Vec<Duration> = bus.write_times().iter().map(|t| *t - start).collect();
    assert_eq!(
        offsets,
        vec![
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(600),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_get_their_own_answers() {
    let bus = TestBus::quick(Duration::from_millis(500));
    for addr in 1..=4u8 {
        bus.sim.reply_to(get_position(addr).as_bytes(), &[addr * 10]);
    }

    let tasks: Vec<_> = (1..=4u8)
        .map(|addr| {
            let client = bus.client.clone();
            tokio::spawn(async move {
                let answer = client
                    .send_frame(CMD_GET_POSITION, addr, &[], None)
                    .await
                    .unwrap();
                (addr, answer)
            })
        })
        .collect();

    for task in tasks {
        let (addr, answer) = task.await.unwrap();
        assert_eq!(answer, vec![addr * 10]);
    }
    assert_eq!(bus.sim.written_frames().len(), 4);
    assert_eq!(bus.client.status().exchanges_completed, 4);
    assert_eq!(bus.client.status().queue_depth, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_exact_and_next_exchange_starts_immediately() {
    let bus = TestBus::quick(Duration::from_secs(2));
    let handle = bus.client.transceiver().clone();
    let start = Instant::now();

    let silent = handle.submit(get_position(9), 2).unwrap();
    let next = handle.submit(Frame::set_position(3, 4), 0).unwrap();

    let err = silent.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        SbbError::ResponseTimeout {
            expected: 2,
            received: 0,
            ..
        }
    ));
    assert_eq!(Instant::now() - start, Duration::from_secs(2));

    next.await.unwrap().unwrap();
    let times = bus.write_times();
    assert_eq!(times.len(), 2);
    assert_eq!(times[1] - times[0], Duration::from_secs(2));

    let status = bus.client.status();
    assert_eq!(status.response_timeouts, 1);
    assert_eq!(status.exchanges_failed, 1);
    assert_eq!(status.exchanges_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_partial_answer_times_out_with_count() {
    let bus = TestBus::quick(Duration::from_millis(300));
    let serial = Frame::build(CMD_GET_SERIAL, 5, &[]).unwrap();
    bus.sim.reply_to(serial.as_bytes(), &[0x12]);

    let err = bus.client.send_command(serial, 4).await.unwrap_err();
    assert!(matches!(
        err,
        SbbError::ResponseTimeout {
            expected: 4,
            received: 1,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_surplus_bytes_are_reported_as_unsolicited() {
    let bus = TestBus::quick(Duration::from_millis(300));
    let mut unsolicited = bus.client.transceiver().subscribe_unsolicited();
    bus.sim.reply_to(get_position(7).as_bytes(), &[0x07, 0xAA]);

    let answer = bus.client.send_command(get_position(7), 1).await.unwrap();
    assert_eq!(answer, vec![0x07]);
    assert_eq!(unsolicited.recv().await.unwrap(), vec![0xAA]);
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_exchanges_keep_transmitter_enabled() {
    let bus = TestBus::start(
        TxEnableLine::Rts,
        Duration::from_millis(50),
        timing(0, Duration::from_secs(1)),
    );
    let handle = bus.client.transceiver().clone();

    let first = handle.submit(Frame::set_position(1, 1), 0).unwrap();
    let second = handle.submit(Frame::set_position(2, 2), 0).unwrap();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        bus.events(),
        vec![
            BusEvent::Connect,
            BusEvent::Rts(false),
            BusEvent::Rts(true),
            BusEvent::Break,
            BusEvent::Write(vec![0xFF, 0xC0, 0x01, 0x01]),
            BusEvent::Break,
            BusEvent::Write(vec![0xFF, 0xC0, 0x02, 0x02]),
            BusEvent::Rts(false),
        ]
    );

    let events = bus.sim.events();
    let (released_at, _) = events.last().unwrap();
    let last_write = *bus.write_times().last().unwrap();
    assert_eq!(*released_at - last_write, Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_transmitter_released_during_initiation_wait() {
    let bus = TestBus::start(
        TxEnableLine::Rts,
        Duration::from_millis(50),
        timing(200, Duration::from_secs(1)),
    );
    let handle = bus.client.transceiver().clone();

    let first = handle.submit(Frame::set_position(1, 1), 0).unwrap();
    let second = handle.submit(Frame::set_position(2, 2), 0).unwrap();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        bus.events(),
        vec![
            BusEvent::Connect,
            BusEvent::Rts(false),
            BusEvent::Rts(true),
            BusEvent::Break,
            BusEvent::Write(vec![0xFF, 0xC0, 0x01, 0x01]),
            BusEvent::Rts(false),
            BusEvent::Rts(true),
            BusEvent::Break,
            BusEvent::Write(vec![0xFF, 0xC0, 0x02, 0x02]),
            BusEvent::Rts(false),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_connection_loss_fails_exchange_and_bus_recovers() {
    let bus = TestBus::quick(Duration::from_secs(2));
    let handle = bus.client.transceiver().clone();

    let pending = handle.submit(get_position(4), 1).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    bus.sim.drop_connection();

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_connection());

    bus.client.set_position(4, 1).await.unwrap();
    let connects = bus
        .events()
        .into_iter()
        .filter(|e| *e == BusEvent::Connect)
        .count();
    assert_eq!(connects, 2);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_reasserts_transmitter() {
    let bus = TestBus::start(
        TxEnableLine::Rts,
        Duration::from_millis(500),
        timing(0, Duration::from_secs(1)),
    );

    bus.client.set_position(1, 1).await.unwrap();
    // Connection goes away while the release is still pending
    bus.sim.drop_connection();
    tokio::time::sleep(Duration::from_secs(1)).await;

    bus.client.set_position(2, 2).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        bus.events(),
        vec![
            BusEvent::Connect,
            BusEvent::Rts(false),
            BusEvent::Rts(true),
            BusEvent::Break,
            BusEvent::Write(vec![0xFF, 0xC0, 0x01, 0x01]),
            BusEvent::Connect,
            BusEvent::Rts(false),
            BusEvent::Rts(true),
            BusEvent::Break,
            BusEvent::Write(vec![0xFF, 0xC0, 0x02, 0x02]),
            BusEvent::Rts(false),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_releases_line_and_queue_continues() {
    let bus = TestBus::start(
        TxEnableLine::Rts,
        Duration::ZERO,
        timing(200, Duration::from_secs(1)),
    );
    let handle = bus.client.transceiver().clone();
    bus.sim.set_fail_send(true);

    let failing = handle.submit(Frame::set_position(1, 1), 0).unwrap();
    let next = handle.submit(Frame::set_position(2, 2), 0).unwrap();

    let err = failing.await.unwrap().unwrap_err();
    assert!(err.is_connection());
    // The next exchange is still in its initiation delay
    bus.sim.set_fail_send(false);
    next.await.unwrap().unwrap();

    assert_eq!(
        bus.events(),
        vec![
            BusEvent::Connect,
            BusEvent::Rts(false),
            BusEvent::Rts(true),
            BusEvent::Break,
            BusEvent::Rts(false),
            BusEvent::Rts(true),
            BusEvent::Break,
            BusEvent::Write(vec![0xFF, 0xC0, 0x02, 0x02]),
            BusEvent::Rts(false),
        ]
    );
    let status = bus.client.status();
    assert_eq!(status.exchanges_failed, 1);
    assert_eq!(status.exchanges_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_queue() {
    let bus = TestBus::quick(Duration::from_millis(100));
    bus.client.set_position(1, 1).await.unwrap();

    bus.shutdown.cancel();
    bus.task.await.unwrap();

    let err = bus.client.set_position(1, 2).await.unwrap_err();
    assert!(matches!(err, SbbError::InternalError(_)));
}
