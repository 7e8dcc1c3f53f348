//! Raw bus-level calls, bypassing the client proxy.

use super::TestServer;
use crate::rpc::bus_service::BusServiceClient;
use crate::rpc::{
    BusError, Destination, MethodCall, MethodReply, SignalKind, INTERFACE_NAME, SERVICE_NAME,
};
use crate::server::Capabilities;
use tarpc::client;
use tarpc::tokio_serde::formats::Bincode;

async fn raw_client(server: &TestServer) -> BusServiceClient {
    use tarpc::serde_transport::tcp;

    let transport = tcp::connect(server.server().local_addr(), Bincode::default)
        .await
        .unwrap();
    BusServiceClient::new(client::Config::default(), transport).spawn()
}

fn get_places() -> MethodCall {
    MethodCall::GetPlaces {
        caller_id: "app.x".into(),
    }
}

#[tokio::test]
async fn test_hello_assigns_unique_name() {
    let server = TestServer::start(Capabilities::new()).await;
    let client = raw_client(&server).await;

    let name = client.hello(tarpc::context::current(), 1).await.unwrap();
    assert!(name.starts_with(":1."));
    assert!(client
        .name_has_owner(tarpc::context::current(), name)
        .await
        .unwrap());
    assert!(client
        .name_has_owner(tarpc::context::current(), SERVICE_NAME.into())
        .await
        .unwrap());
    assert!(!client
        .name_has_owner(tarpc::context::current(), "org.example.Nobody".into())
        .await
        .unwrap());

    server.destroy().await;
}

#[tokio::test]
async fn test_misrouted_calls_are_rejected() {
    let server = TestServer::start(Capabilities::new()).await;
    let client = raw_client(&server).await;

    let wrong_service = Destination::new("org.example.Nobody", crate::rpc::OBJECT_PATH);
    let result = client
        .call_method(tarpc::context::current(), wrong_service, get_places())
        .await
        .unwrap();
    assert!(matches!(result, Err(BusError::ServiceUnknown { .. })));

    let wrong_path = Destination::new(SERVICE_NAME, "/nowhere");
    let result = client
        .call_method(tarpc::context::current(), wrong_path, get_places())
        .await
        .unwrap();
    assert_eq!(
        result,
        Err(BusError::UnknownObject {
            path: "/nowhere".into()
        })
    );

    let wrong_interface = Destination {
        interface: format!("{}.Legacy", INTERFACE_NAME),
        ..Destination::default()
    };
    let result = client
        .call_method(tarpc::context::current(), wrong_interface, get_places())
        .await
        .unwrap();
    assert!(matches!(result, Err(BusError::UnknownInterface { .. })));

    let result = client
        .call_method(tarpc::context::current(), Destination::default(), get_places())
        .await
        .unwrap();
    assert!(matches!(result, Ok(MethodReply::Places(_))));

    server.destroy().await;
}

#[tokio::test]
async fn test_subscriptions_need_signal_channel() {
    let server = TestServer::start(Capabilities::new()).await;
    let client = raw_client(&server).await;
    client.hello(tarpc::context::current(), 1).await.unwrap();

    let rule = Destination::default().match_rule(SignalKind::Inout);
    let result = client
        .add_match(tarpc::context::current(), rule)
        .await
        .unwrap();
    assert_eq!(result, Err(BusError::NoSignalSink));

    let result = client
        .remove_match(tarpc::context::current(), 12345)
        .await
        .unwrap();
    assert_eq!(result, Err(BusError::UnknownSubscription { id: 12345 }));
    assert_eq!(server.subscription_count().await, 0);

    server.destroy().await;
}
