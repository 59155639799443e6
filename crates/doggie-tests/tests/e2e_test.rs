//! End-to-end tests for the Doggie Lab car
//!
//! Each test builds the whole car on a private virtual bus, drives it the
//! way an operator or an attacker on the bus would, and checks the frames and
//! dashboard updates that come back.
//!
//! Run with: cargo test -p doggie-tests --test e2e_test

use std::time::Duration;

use doggie_core::messages::{
    AbsStatus, AirbagStatus, DoorSet, DoorsControl, DoorsStatus, EngineControl, EngineStatus,
    KeyState, SpeedStatus,
};
use doggie_ecus::abs::AbsCommand;
use doggie_ecus::cruise_control::CruiseCommand;
use doggie_ecus::immo::ImmoCommand;
use doggie_ecus::{ButtonState, ClusterIntent, LabConfig};
use doggie_tests::TestHarness;
use pretty_assertions::assert_eq;

const SECRET: &[u8] = b"flag{sarasaVIN123456789}";

/// The central ECU only accepts a start once it has seen the key
async fn wait_for_key(harness: &TestHarness) {
    harness
        .wait_for(Duration::from_secs(1), |m: &KeyState| m.inserted)
        .await
        .expect("immobilizer never reported the key");
}

#[tokio::test]
async fn test_engine_start_from_cluster() {
    let harness = TestHarness::start().await;
    wait_for_key(&harness).await;

    harness
        .car
        .handles()
        .cluster
        .send(ClusterIntent::PressStart)
        .unwrap();

    let started = harness
        .wait_for(Duration::from_secs(2), |m: &EngineStatus| m.engine_on)
        .await;
    assert_eq!(started, Some(EngineStatus { engine_on: true }));

    // Self-test: ABS reads failed right after the start, then clears
    let cleared = harness
        .wait_for(Duration::from_secs(3), |m: &AbsStatus| !m.failed)
        .await;
    assert!(cleared.is_some());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let dashboard = harness.dashboard.snapshot();
    assert_eq!(dashboard.button, ButtonState::On);
    assert_eq!(dashboard.abs_ok, Some(true));
    let history = harness.dashboard.button_history();
    let ignition = history
        .iter()
        .position(|state| *state == ButtonState::Ignition)
        .expect("button never went to IGNITION");
    assert!(history[ignition..].contains(&ButtonState::On));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_engine_start_without_key_is_refused() {
    let harness = TestHarness::start().await;
    let handles = harness.car.handles().clone();

    handles.immo.send(ImmoCommand::SetKeyInserted(false)).unwrap();
    harness
        .wait_for(Duration::from_secs(1), |m: &KeyState| !m.inserted)
        .await
        .expect("key removal not broadcast");

    harness.send(&EngineControl { start: true }).await;
    let started = harness
        .wait_for(Duration::from_millis(600), |m: &EngineStatus| m.engine_on)
        .await;
    assert_eq!(started, None);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_doors_unlock_then_lock_one() {
    let harness = TestHarness::start().await;

    harness
        .car
        .handles()
        .cluster
        .send(ClusterIntent::UnlockDoors)
        .unwrap();
    let unlocked = harness
        .wait_for(Duration::from_secs(1), |m: &DoorsStatus| m.locked.is_empty())
        .await;
    assert!(unlocked.is_some(), "doors never reported unlocked");

    harness
        .send(&DoorsControl {
            lock: true,
            doors: DoorSet::FRONT_RIGHT,
        })
        .await;
    let status = harness
        .wait_for(Duration::from_secs(1), |m: &DoorsStatus| {
            m.locked == DoorSet::FRONT_RIGHT
        })
        .await;
    assert_eq!(status.map(|m| m.locked.bits()), Some(0b1000));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        harness.dashboard.snapshot().doors_locked,
        Some(DoorSet::FRONT_RIGHT)
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn test_doors_stay_locked_while_driving() {
    let harness = TestHarness::start().await;
    let handles = harness.car.handles().clone();
    wait_for_key(&harness).await;

    handles.cluster.send(ClusterIntent::PressStart).unwrap();
    handles.cruise.send(CruiseCommand::SetTarget(80)).unwrap();

    let moving = harness
        .wait_for(Duration::from_secs(10), |m: &SpeedStatus| m.speed >= 25)
        .await;
    assert!(moving.is_some(), "car never reached unlock-inhibit speed");

    handles.cluster.send(ClusterIntent::UnlockDoors).unwrap();
    let statuses: Vec<DoorsStatus> = harness.collect(Duration::from_millis(400)).await;
    assert!(!statuses.is_empty());
    assert!(statuses.iter().all(|m| m.locked == DoorSet::ALL));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_vin_secret_over_isotp() {
    let harness = TestHarness::start().await;
    let mut tester = harness.diagnostic_tester();

    let obd = tester.request(&[0x09, 0x02], Duration::from_secs(2)).await;
    assert_eq!(obd.as_deref(), Some(SECRET));

    let uds = tester
        .request(&[0x22, 0xF1, 0x90], Duration::from_secs(2))
        .await;
    assert_eq!(uds.as_deref(), Some(SECRET));

    let other = tester
        .request(&[0x22, 0xF1, 0x91], Duration::from_millis(300))
        .await;
    assert_eq!(other, None);

    tester.close().await;
    harness.shutdown().await;
}

#[tokio::test]
async fn test_abs_sensor_disconnect_latches_fault() {
    let harness = TestHarness::start().await;

    let ok = harness
        .wait_for(Duration::from_secs(1), |m: &AbsStatus| !m.failed)
        .await;
    assert!(ok.is_some());

    harness
        .car
        .handles()
        .abs
        .send(AbsCommand::SetSensorConnected(false))
        .unwrap();
    let failed = harness
        .wait_for(Duration::from_secs(2), |m: &AbsStatus| m.failed)
        .await;
    assert!(failed.is_some(), "ABS fault never reported");

    // Latched: reconnecting the sensor does not clear it
    harness
        .car
        .handles()
        .abs
        .send(AbsCommand::SetSensorConnected(true))
        .unwrap();
    let statuses: Vec<AbsStatus> = harness.collect(Duration::from_millis(500)).await;
    assert!(statuses.iter().all(|m| m.failed));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(harness.dashboard.snapshot().abs_ok, Some(false));

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_healthy_abs_never_faults_on_stock_timing() {
    let harness = TestHarness::start_with(LabConfig::default()).await;

    let statuses: Vec<AbsStatus> = harness.collect(Duration::from_secs(5)).await;
    assert!(statuses.len() >= 40, "only {} ABS statuses", statuses.len());
    let failed = statuses.iter().filter(|m| m.failed).count();
    assert_eq!(failed, 0);
    assert_eq!(harness.dashboard.snapshot().abs_ok, Some(true));

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_engine_self_test_clears_on_stock_timing() {
    let harness = TestHarness::start_with(LabConfig::default()).await;
    wait_for_key(&harness).await;

    harness
        .car
        .handles()
        .cluster
        .send(ClusterIntent::PressStart)
        .unwrap();
    harness
        .wait_for(Duration::from_secs(2), |m: &EngineStatus| m.engine_on)
        .await
        .expect("engine never started");
    harness
        .wait_for(Duration::from_secs(2), |m: &AbsStatus| m.failed)
        .await
        .expect("self-test never reported ABS failed");
    harness
        .wait_for(Duration::from_secs(3), |m: &AbsStatus| !m.failed)
        .await
        .expect("self-test never cleared");

    // Stays clear once the window has closed
    let statuses: Vec<AbsStatus> = harness.collect(Duration::from_secs(3)).await;
    assert!(!statuses.is_empty());
    assert!(statuses.iter().all(|m| !m.failed));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_airbag_toggle_round_trip() {
    let harness = TestHarness::start().await;
    let cluster = harness.car.handles().cluster.clone();

    cluster.send(ClusterIntent::ToggleAirbag).unwrap();
    let off = harness
        .wait_for(Duration::from_secs(1), |m: &AirbagStatus| !m.enabled)
        .await;
    assert!(off.is_some());

    cluster.send(ClusterIntent::ToggleAirbag).unwrap();
    let on = harness
        .wait_for(Duration::from_secs(1), |m: &AirbagStatus| m.enabled)
        .await;
    assert!(on.is_some());

    harness.shutdown().await;
}
