use super::*;
use crate::rpc::SignalKind;
use crate::status::StatusCode;

fn wifi(caller_id: &str, place_id: i32) -> GeofenceRequest {
    GeofenceRequest::access_point(caller_id, place_id, GeofenceType::WifiAccessPoint, "aa:bb:cc", "home-ap")
}

#[test]
fn test_add_place_and_fence() {
    let engine = MemoryEngine::new();
    let place_id = engine.add_place("app.x", "Home");
    assert!(place_id >= 0);

    let fence_id = engine.add_geofence(&wifi("app.x", place_id));
    assert!(fence_id >= 0);

    let reply = engine.get_geofences(place_id, "app.x");
    assert_eq!(reply.count, 1);
    let records = reply.records.unwrap();
    assert_eq!(records[0].fence_id, fence_id);
    assert_eq!(records[0].ssid, "home-ap");
    assert!(records[0].enabled);
}

#[test]
fn test_fence_under_foreign_place_is_rejected() {
    let engine = MemoryEngine::new();
    let place_id = engine.add_place("app.x", "Home");

    assert_eq!(engine.add_geofence(&wifi("app.y", place_id)), INVALID_ID);
    assert_eq!(engine.add_geofence(&wifi("app.y", 999)), INVALID_ID);
    assert!(engine.add_geofence(&wifi("app.y", UNGROUPED_PLACE)) >= 0);
}

#[test]
fn test_empty_place_name_is_rejected() {
    let engine = MemoryEngine::new();
    assert_eq!(engine.add_place("app.x", ""), INVALID_ID);
}

#[test]
fn test_queries_are_scoped_to_caller() {
    let engine = MemoryEngine::new();
    engine.add_place("app.x", "Home");
    engine.add_place("app.y", "Office");

    let places = engine.get_places("app.x");
    assert_eq!(places.count, 1);
    assert_eq!(places.records.unwrap()[0].place_name, "Home");

    let none = engine.get_places("app.z");
    assert_eq!(none.count, 0);
    assert_eq!(none.error_code, StatusCode::None);
    assert_eq!(none.records, Some(Vec::new()));
}

#[test]
fn test_point_radius_fields_only_for_point_fences() {
    let engine = MemoryEngine::new();
    let point = GeofenceRequest::point_radius("app.x", UNGROUPED_PLACE, 37.5, 127.0, 200, "Seoul");
    engine.add_geofence(&point);
    engine.add_geofence(&GeofenceRequest {
        latitude: 10.0,
        ..wifi("app.x", UNGROUPED_PLACE)
    });

    let records = engine.get_geofences(UNGROUPED_PLACE, "app.x").records.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].radius, 200);
    assert_eq!(records[1].latitude, 0.0);
}

#[test]
fn test_update_and_place_name() {
    let engine = MemoryEngine::new();
    let place_id = engine.add_place("app.x", "Home");

    engine.update_place(place_id, "app.y", "Stolen");
    assert_eq!(
        engine.get_place_name(place_id, "app.x").place_name.as_deref(),
        Some("Home")
    );

    engine.update_place(place_id, "app.x", "Cottage");
    assert_eq!(
        engine.get_place_name(place_id, "app.x"),
        PlaceNameReply::found("Cottage")
    );
    assert_eq!(
        engine.get_place_name(99, "app.x"),
        PlaceNameReply::no_result()
    );
}

#[test]
fn test_delete_place_cascades_to_fences() {
    let engine = MemoryEngine::new();
    let place_id = engine.add_place("app.x", "Home");
    engine.add_geofence(&wifi("app.x", place_id));
    let loose = engine.add_geofence(&wifi("app.x", UNGROUPED_PLACE));

    engine.delete_place(place_id, "app.x");

    let remaining = engine.get_geofences(UNGROUPED_PLACE, "app.x").records.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].fence_id, loose);
}

#[test]
fn test_start_requires_enabled_fence() {
    let engine = MemoryEngine::new();
    let fence_id = engine.add_geofence(&wifi("app.x", UNGROUPED_PLACE));

    engine.enable_geofence(fence_id, "app.x", false);
    engine.set_running(fence_id, "app.x", true);
    assert!(!engine.is_running(fence_id));

    engine.enable_geofence(fence_id, "app.x", true);
    engine.set_running(fence_id, "app.x", true);
    assert!(engine.is_running(fence_id));

    engine.set_running(fence_id, "app.x", false);
    assert!(!engine.is_running(fence_id));
}

#[test]
fn test_delete_geofence_checks_owner() {
    let engine = MemoryEngine::new();
    let fence_id = engine.add_geofence(&wifi("app.x", UNGROUPED_PLACE));

    engine.delete_geofence(fence_id, "app.y");
    assert_eq!(engine.get_geofences(UNGROUPED_PLACE, "app.x").count, 1);

    engine.delete_geofence(fence_id, "app.x");
    assert_eq!(engine.get_geofences(UNGROUPED_PLACE, "app.x").count, 0);
}

#[test]
fn test_capabilities_cover_every_method() {
    let engine = MemoryEngine::new();
    let capabilities = engine.capabilities();
    for method in crate::rpc::Method::ALL {
        assert!(capabilities.supports(method), "{} missing", method);
    }

    engine.record_idle(SignalKind::Inout);
    assert_eq!(engine.idle_reports(), vec![SignalKind::Inout]);
}

#[test]
fn test_exhausted_ids_are_invalid() {
    let engine = MemoryEngine::new();
    engine.state().next_place_id = i32::MAX;
    engine.state().next_fence_id = i32::MAX;

    assert_eq!(engine.add_place("app.x", "Home"), INVALID_ID);
    assert_eq!(
        engine.add_geofence(&wifi("app.x", UNGROUPED_PLACE)),
        INVALID_ID
    );
    assert!(engine.get_places("app.x").records.unwrap_or_default().is_empty());
}

#[test]
fn test_idle_reports_are_bounded_and_drained() {
    let engine = MemoryEngine::new();
    for _ in 0..MAX_IDLE_REPORTS {
        engine.record_idle(SignalKind::Inout);
    }
    engine.record_idle(SignalKind::Event);

    let reports = engine.idle_reports();
    assert_eq!(reports.len(), MAX_IDLE_REPORTS);
    assert_eq!(reports.last(), Some(&SignalKind::Event));

    assert_eq!(engine.take_idle_reports().len(), MAX_IDLE_REPORTS);
    assert!(engine.idle_reports().is_empty());
}
