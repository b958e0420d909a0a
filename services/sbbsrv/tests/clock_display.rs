//! Clock display updates against a simulated bus

mod support;

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use sbbsrv::service::{ClockConfig, ClockUpdater, ManualClock};
use support::TestBus;

fn at(h: u32, mi: u32, s: u32) -> NaiveDateTime {
    // 2024-01-01 is a Monday
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(h, mi, s)
        .unwrap()
}

fn clock_config() -> ClockConfig {
    ClockConfig {
        hour_module: Some(1),
        minute_module: Some(2),
        weekday_module1: Some(3),
        weekday_module2: Some(4),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_one_cycle_sets_every_module() {
    let bus = TestBus::quick(Duration::from_millis(100));
    let updater = ClockUpdater::new(
        bus.client.clone(),
        clock_config(),
        ManualClock::new(at(9, 5, 30)),
    );

    let wait = updater.run_cycle();
    assert_eq!(wait, Duration::from_secs(30));

    // Updates are queued without waiting; let the bus drain
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        bus.sim.written_frames(),
        vec![
            vec![0xFF, 0xC0, 0x01, 9],
            vec![0xFF, 0xC0, 0x02, 35],
            vec![0xFF, 0xC0, 0x03, b'M' - b'A'],
            vec![0xFF, 0xC0, 0x04, b'O' - b'A'],
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_updater_follows_minute_boundaries() {
    let bus = TestBus::quick(Duration::from_millis(100));
    let clock = ManualClock::new(at(23, 59, 45));
    let config = ClockConfig {
        weekday_module1: None,
        weekday_module2: None,
        ..clock_config()
    };
    let task = ClockUpdater::new(bus.client.clone(), config, clock.clone())
        .spawn(bus.shutdown.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(bus.sim.written_frames().len(), 2);

    // Next cycle runs 15 s after the first one
    clock.set(at(0, 0, 0));
    tokio::time::sleep(Duration::from_secs(15)).await;

    let frames = bus.sim.written_frames();
    assert_eq!(
        frames,
        vec![
            vec![0xFF, 0xC0, 0x01, 23],
            vec![0xFF, 0xC0, 0x02, 28],
            vec![0xFF, 0xC0, 0x01, 0],
            vec![0xFF, 0xC0, 0x02, 30],
        ]
    );

    bus.shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_updates_do_not_stop_the_clock() {
    let bus = TestBus::quick(Duration::from_millis(100));
    bus.sim.set_fail_connect(true);
    let clock = ManualClock::new(at(12, 0, 0));
    let updater = ClockUpdater::new(bus.client.clone(), clock_config(), clock.clone());

    updater.run_cycle();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(bus.sim.written_frames().is_empty());
    assert_eq!(bus.client.status().exchanges_failed, 4);

    bus.sim.set_fail_connect(false);
    clock.set(at(12, 1, 0));
    updater.run_cycle();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(bus.sim.written_frames().len(), 4);
}
