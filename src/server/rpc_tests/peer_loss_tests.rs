//! Server-side cleanup when clients vanish.

use super::{record_idle, recv_within, TestServer};
use crate::rpc::SignalKind;
use crate::server::Capabilities;

#[tokio::test]
async fn test_lost_client_releases_both_categories_once() {
    let (capabilities, mut idle) = record_idle(Capabilities::new());
    let server = TestServer::start(capabilities).await;
    let (client, _signals) = server.started_client().await;
    assert_eq!(server.session_count().await, 1);

    drop(client);

    assert_eq!(recv_within(&mut idle, 2000).await, Some(SignalKind::Inout));
    assert_eq!(recv_within(&mut idle, 2000).await, Some(SignalKind::Event));
    assert!(recv_within(&mut idle, 200).await.is_none());
    assert!(server.wait_for_sessions(0).await);
    assert_eq!(server.subscription_count().await, 0);
    assert!(server.server().is_idle(SignalKind::Inout).await.unwrap());

    server.destroy().await;
}

#[tokio::test]
async fn test_remaining_subscriber_keeps_categories_busy() {
    let (capabilities, mut idle) = record_idle(Capabilities::new());
    let server = TestServer::start(capabilities).await;
    let (first, _first_signals) = server.started_client().await;
    let (second, _second_signals) = server.started_client().await;
    assert_eq!(server.session_count().await, 2);

    drop(first);
    assert!(server.wait_for_sessions(1).await);
    assert!(recv_within(&mut idle, 200).await.is_none());
    assert!(!server.server().is_idle(SignalKind::Event).await.unwrap());

    drop(second);
    assert_eq!(recv_within(&mut idle, 2000).await, Some(SignalKind::Inout));
    assert_eq!(recv_within(&mut idle, 2000).await, Some(SignalKind::Event));

    server.destroy().await;
}

#[tokio::test]
async fn test_stop_then_loss_reports_idle_only_once() {
    let (capabilities, mut idle) = record_idle(Capabilities::new());
    let server = TestServer::start(capabilities).await;
    let (mut client, _signals) = server.started_client().await;

    client.stop().await.unwrap();
    assert_eq!(recv_within(&mut idle, 2000).await, Some(SignalKind::Inout));
    assert_eq!(recv_within(&mut idle, 2000).await, Some(SignalKind::Event));

    drop(client);
    assert!(recv_within(&mut idle, 300).await.is_none());

    server.destroy().await;
}

#[tokio::test]
async fn test_client_without_subscriptions_leaves_no_trace() {
    let (capabilities, mut idle) = record_idle(Capabilities::new());
    let server = TestServer::start(capabilities).await;
    let client = server.create_client().await;
    assert_eq!(server.session_count().await, 0);

    drop(client);
    assert!(recv_within(&mut idle, 300).await.is_none());
    assert_eq!(server.session_count().await, 0);

    server.destroy().await;
}

#[tokio::test]
async fn test_category_goes_idle_again_after_resubscribe() {
    let (capabilities, mut idle) = record_idle(Capabilities::new());
    let server = TestServer::start(capabilities).await;

    let (first, _first_signals) = server.started_client().await;
    drop(first);
    assert_eq!(recv_within(&mut idle, 2000).await, Some(SignalKind::Inout));
    assert_eq!(recv_within(&mut idle, 2000).await, Some(SignalKind::Event));

    let (second, _second_signals) = server.started_client().await;
    drop(second);
    assert_eq!(recv_within(&mut idle, 2000).await, Some(SignalKind::Inout));
    assert_eq!(recv_within(&mut idle, 2000).await, Some(SignalKind::Event));

    server.destroy().await;
}
