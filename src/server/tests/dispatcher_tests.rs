use super::*;
use crate::identity::LookupError;
use crate::rpc::{GeofenceType, SignalKind};
use crate::status::StatusCode;
use std::sync::{Arc, Mutex};

fn no_lookup() -> Box<dyn IdentityResolver> {
    Box::new(|pid: u32| -> Result<String, LookupError> {
        Err(LookupError {
            pid,
            reason: "unavailable".into(),
        })
    })
}

fn request(caller_id: &str) -> GeofenceRequest {
    GeofenceRequest::access_point(caller_id, -1, GeofenceType::WifiAccessPoint, "aa:bb", "home")
}

#[test]
fn test_every_method_has_a_neutral_default() {
    let mut dispatcher = Dispatcher::new(Capabilities::new(), no_lookup());

    let reply = dispatcher.dispatch(None, MethodCall::AddGeofence(request("app.x")));
    assert_eq!(reply, MethodReply::Id(-1));

    let reply = dispatcher.dispatch(
        None,
        MethodCall::DeletePlace {
            place_id: 1,
            caller_id: "app.x".into(),
        },
    );
    assert_eq!(reply, MethodReply::Done);

    let reply = dispatcher.dispatch(
        None,
        MethodCall::GetPlaces {
            caller_id: "app.x".into(),
        },
    );
    assert_eq!(reply, MethodReply::Places(ListReply::no_result()));
}

#[test]
fn test_registered_handler_runs_once() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = calls.clone();
    let capabilities = Capabilities::new().on_enable_geofence(move |fence_id, caller_id, enable| {
        seen.lock()
            .unwrap()
            .push((fence_id, caller_id.to_string(), enable));
    });
    assert!(capabilities.supports(Method::EnableGeofence));
    assert!(!capabilities.supports(Method::StartGeofence));

    let mut dispatcher = Dispatcher::new(capabilities, no_lookup());
    let reply = dispatcher.dispatch(
        None,
        MethodCall::EnableGeofence {
            fence_id: 7,
            caller_id: "app.x".into(),
            enable: true,
        },
    );

    assert_eq!(reply, MethodReply::Done);
    assert_eq!(*calls.lock().unwrap(), vec![(7, "app.x".to_string(), true)]);
}

#[test]
fn test_handler_id_is_returned_verbatim() {
    let capabilities = Capabilities::new()
        .on_add_geofence(|request| if request.ssid == "home" { 7 } else { -3 });
    let mut dispatcher = Dispatcher::new(capabilities, no_lookup());

    let reply = dispatcher.dispatch(None, MethodCall::AddGeofence(request("app.x")));
    assert_eq!(reply, MethodReply::Id(7));
}

#[test]
fn test_empty_caller_is_resolved_from_pid() {
    let resolver: Box<dyn IdentityResolver> =
        Box::new(|pid: u32| -> Result<String, LookupError> { Ok(format!("app.pid{}", pid)) });
    let capabilities = Capabilities::new().on_add_place(|caller_id, _| {
        if caller_id == "app.pid77" {
            1
        } else {
            -1
        }
    });
    let mut dispatcher = Dispatcher::new(capabilities, resolver);

    let reply = dispatcher.dispatch(
        Some(77),
        MethodCall::AddPlace {
            caller_id: String::new(),
            place_name: "Home".into(),
        },
    );
    assert_eq!(reply, MethodReply::Id(1));
}

#[test]
fn test_failed_lookup_proceeds_with_empty_identity() {
    let capabilities = Capabilities::new().on_get_place_name(|_, caller_id| {
        assert!(caller_id.is_empty());
        PlaceNameReply::found("Home")
    });
    let mut dispatcher = Dispatcher::new(capabilities, no_lookup());

    let reply = dispatcher.dispatch(
        Some(12),
        MethodCall::GetPlaceName {
            place_id: 1,
            caller_id: String::new(),
        },
    );
    match reply {
        MethodReply::PlaceName(reply) => {
            assert_eq!(reply.error_code, StatusCode::None);
            assert_eq!(reply.place_name.as_deref(), Some("Home"));
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[test]
fn test_notify_idle_forwards_each_category() {
    let idle = Arc::new(Mutex::new(Vec::new()));
    let sink = idle.clone();
    let capabilities =
        Capabilities::new().on_idle_category(move |category| sink.lock().unwrap().push(category));
    let mut dispatcher = Dispatcher::new(capabilities, no_lookup());

    dispatcher.notify_idle(&[SignalKind::Inout, SignalKind::Event]);
    dispatcher.notify_idle(&[]);

    assert_eq!(
        *idle.lock().unwrap(),
        vec![SignalKind::Inout, SignalKind::Event]
    );
}

#[test]
fn test_notify_idle_without_handler_is_silent() {
    let mut dispatcher = Dispatcher::new(Capabilities::new(), no_lookup());
    dispatcher.notify_idle(&[SignalKind::Inout]);
}
