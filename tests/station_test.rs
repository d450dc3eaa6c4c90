//! End-to-end station tests
//!
//! A `SimBackend` is served over the HTTP command boundary on an ephemeral
//! port; the station talks to it through `RemoteCommandClient` exactly as it
//! would talk to the real services.

use conveyor_station::domain::{ErrorKind, ScanSession, ScanState, SlotNumber};
use conveyor_station::infra::Config;
use conveyor_station::io::command_server::serve_commands;
use conveyor_station::io::SimBackend;
use conveyor_station::services::{ScanCommand, ScanHandle, ScanSource};
use conveyor_station::station::{spawn_station, BackendMode, Station};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tokio::sync::watch;

struct Harness {
    sim: Arc<SimBackend>,
    station: Station,
    shutdown_tx: watch::Sender<bool>,
}

async fn serve_sim(shutdown: watch::Receiver<bool>) -> (Arc<SimBackend>, String) {
    let sim = Arc::new(SimBackend::with_demo_data(10));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_commands(listener, sim.clone(), shutdown));
    (sim, format!("http://{}", addr))
}

async fn start(config: Config) -> Harness {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (sim, url) = serve_sim(shutdown_rx.clone()).await;
    let config = config.with_backend_url(url);
    let station = spawn_station(&config, BackendMode::Remote, shutdown_rx).unwrap();
    Harness { sim, station, shutdown_tx }
}

async fn wait_until<F>(handle: &ScanHandle, mut pred: F) -> ScanSession
where
    F: FnMut(&ScanSession) -> bool,
{
    let mut rx = handle.subscribe();
    let session = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for station state")
        .expect("controller stopped");
    session.clone()
}

async fn scan(harness: &Harness, code: &str) -> ScanSession {
    let handle = &harness.station.handle;
    let before = handle.snapshot().commands_handled();
    handle.scan(code, ScanSource::Scanner).unwrap();
    wait_until(handle, |s| s.commands_handled() > before && !s.busy()).await
}

async fn stop(harness: Harness) {
    harness.shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), harness.station.join())
        .await
        .expect("station did not stop");
}

#[tokio::test]
async fn test_family_scans_end_in_ticket_complete() {
    let harness = start(Config::default()).await;

    let first = scan(&harness, "1003-1").await;
    assert_eq!(
        first.state(),
        &ScanState::Success { code: first.last_scan().unwrap().clone(), slot: SlotNumber(1) }
    );
    assert_eq!(first.scan_count(), 1);
    assert_eq!(first.next_slot(), Some(SlotNumber(1)));
    let context = first.context();
    assert_eq!(context.customer.as_ref().unwrap().display_name(), "Bram Okafor");
    assert_eq!(context.ticket.as_ref().unwrap().display_invoice_number, "1003");
    assert_eq!(context.garments.len(), 2);

    let second = scan(&harness, "1003-2").await;
    assert!(matches!(
        second.state(),
        ScanState::TicketComplete { slot: SlotNumber(1), .. }
    ));

    // Accept and complete both presented slot 1
    assert_eq!(harness.sim.runs(), vec![SlotNumber(1), SlotNumber(1)]);
    assert_eq!(harness.station.metrics.accepted_total(), 1);
    assert_eq!(harness.station.metrics.tickets_completed_total(), 1);

    stop(harness).await;
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let harness = start(Config::default()).await;

    let session = scan(&harness, "9999").await;
    match session.state() {
        ScanState::Error { error } => assert_eq!(error.kind(), ErrorKind::NotFound),
        other => panic!("expected not found, got {:?}", other),
    }
    assert!(harness.sim.runs().is_empty());
    assert_eq!(harness.station.metrics.errors_total(ErrorKind::NotFound), 1);

    stop(harness).await;
}

#[tokio::test]
async fn test_hanger_detection_reaches_conveyor_state() {
    let harness = start(Config::default()).await;
    harness.sim.set_hanger_present(true);

    let session = scan(&harness, "1001-1").await;
    assert!(matches!(
        session.state(),
        ScanState::GarmentOnConveyor { slot: SlotNumber(1), .. }
    ));

    stop(harness).await;
}

#[tokio::test]
async fn test_clear_conveyor_empties_slots() {
    let harness = start(Config::default()).await;

    scan(&harness, "1004-1").await;
    let used = harness.station.handle.snapshot().stats().map(|s| s.slots_used);
    assert_eq!(used, Some(1));

    let handle = &harness.station.handle;
    let before = handle.snapshot().commands_handled();
    handle.submit(ScanCommand::ClearConveyor).unwrap();
    let session = wait_until(handle, |s| s.commands_handled() > before && !s.busy()).await;

    assert_eq!(session.state(), &ScanState::Waiting);
    assert_eq!(session.stats().map(|s| s.slots_used), Some(0));
    assert_eq!(harness.station.metrics.clear_conveyor_total(), 1);

    stop(harness).await;
}

#[tokio::test]
async fn test_link_loss_blocks_scans_until_restored() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[link]\npoll_interval_ms = 50\nfailure_threshold = 1\n").unwrap();
    file.flush().unwrap();
    let harness = start(Config::from_file(file.path()).unwrap()).await;
    let handle = &harness.station.handle;

    harness.sim.set_link_up(false);
    wait_until(handle, |s| s.state() == &ScanState::ConveyorDisconnected).await;

    let session = scan(&harness, "1001-1").await;
    assert_eq!(session.state(), &ScanState::ConveyorDisconnected);
    assert!(harness.sim.runs().is_empty());

    harness.sim.set_link_up(true);
    let session = wait_until(handle, |s| s.link_connected()).await;
    assert_eq!(session.state(), &ScanState::Waiting);
    assert_eq!(harness.station.metrics.link_drops_total(), 1);

    stop(harness).await;
}

#[tokio::test]
async fn test_rescan_after_ticket_complete_is_an_error() {
    let harness = start(Config::default()).await;

    let first = scan(&harness, "1002-1").await;
    assert!(matches!(first.state(), ScanState::TicketComplete { .. }));

    let again = scan(&harness, "1002-1").await;
    match again.state() {
        ScanState::Error { error } => assert_eq!(error.kind(), ErrorKind::Backend),
        other => panic!("expected backend error, got {:?}", other),
    }
    assert_eq!(again.scan_count(), 0);
    assert_eq!(again.stats().map(|s| s.slots_used), Some(0));
    assert_eq!(harness.sim.runs().len(), 1);

    stop(harness).await;
}
