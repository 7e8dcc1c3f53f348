use super::*;
use crate::rpc::FenceState;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_handler(counter: Arc<AtomicUsize>) -> SignalHandler {
    Arc::new(move |_: SignalKind, _: &GeofenceNotification| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_router_routes_by_subscription() {
    let router = SignalRouter::default();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    router.insert(1, counting_handler(first.clone()));
    router.insert(2, counting_handler(second.clone()));

    let notification = GeofenceNotification::inout("app.x", 3, 0, FenceState::Entered);
    assert!(router.route(1, SignalKind::Inout, &notification));
    assert!(router.route(1, SignalKind::Inout, &notification));
    assert!(router.route(2, SignalKind::Event, &notification));

    assert_eq!(first.load(Ordering::SeqCst), 2);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn test_router_drops_unknown_subscription() {
    let router = SignalRouter::default();
    let notification = GeofenceNotification::inout("app.x", 3, 0, FenceState::Exited);
    assert!(!router.route(9, SignalKind::Inout, &notification));

    let counter = Arc::new(AtomicUsize::new(0));
    router.insert(9, counting_handler(counter.clone()));
    assert!(router.remove(9));
    assert!(!router.remove(9));
    assert!(!router.route(9, SignalKind::Inout, &notification));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(router.len(), 0);
}

#[tokio::test]
async fn test_connect_to_nothing_is_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ClientConfig::with_ports("127.0.0.1", port, port);
    assert_eq!(
        Connection::connect(&config).await.err(),
        Some(GeofenceError::Connection)
    );
}

#[test]
fn test_deadline_never_overflows() {
    let before = Instant::now();
    let ctx = deadline_context(Duration::MAX);
    assert!(ctx.deadline > before);
    assert!(ctx.deadline <= Instant::now() + MAX_DEADLINE);
}

#[test]
fn test_missing_sink_maps_to_memory_error() {
    assert_eq!(
        subscribe_failed(SignalKind::Inout, BusError::NoSignalSink),
        GeofenceError::Memory
    );
    assert_eq!(
        subscribe_failed(SignalKind::Event, BusError::ShuttingDown),
        GeofenceError::DbusCall
    );
}
