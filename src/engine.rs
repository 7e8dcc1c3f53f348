//! In-memory reference engine backing the `geofenced` binary.
//!
//! Stores places and fences per caller and answers every geofence method.
//! It does no containment math; started fences are only marked as running.

use crate::daemon_log::daemon_log;
use crate::rpc::{
    Category, FenceRecord, GeofenceRequest, GeofenceType, ListReply, PlaceNameReply, PlaceRecord,
    INVALID_ID, UNGROUPED_PLACE,
};
use crate::server::Capabilities;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Idle reports kept before the oldest are dropped.
const MAX_IDLE_REPORTS: usize = 64;

/// Access type reported for records owned by the calling application.
pub const ACCESS_TYPE_PRIVATE: i32 = 1;

#[derive(Debug, Clone)]
struct StoredPlace {
    owner: String,
    name: String,
}

#[derive(Debug, Clone)]
struct StoredFence {
    owner: String,
    request: GeofenceRequest,
    enabled: bool,
    running: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    places: BTreeMap<i32, StoredPlace>,
    fences: BTreeMap<i32, StoredFence>,
    next_place_id: i32,
    next_fence_id: i32,
    idle_reports: Vec<Category>,
}

impl EngineState {
    fn owns_place(&self, place_id: i32, caller_id: &str) -> bool {
        self.places
            .get(&place_id)
            .is_some_and(|place| place.owner == caller_id)
    }

    fn owned_fence(&mut self, fence_id: i32, caller_id: &str) -> Option<&mut StoredFence> {
        self.fences
            .get_mut(&fence_id)
            .filter(|fence| fence.owner == caller_id)
    }
}

/// Shared handle to the store; clones see the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Capability map with every method and the idle callback registered.
    pub fn capabilities(&self) -> Capabilities {
        let add_geofence = self.clone();
        let add_place = self.clone();
        let update_place = self.clone();
        let delete_geofence = self.clone();
        let delete_place = self.clone();
        let enable = self.clone();
        let start = self.clone();
        let stop = self.clone();
        let get_geofences = self.clone();
        let get_places = self.clone();
        let get_place_name = self.clone();
        let idle = self.clone();

        Capabilities::new()
            .on_add_geofence(move |request| add_geofence.add_geofence(request))
            .on_add_place(move |caller_id, name| add_place.add_place(caller_id, name))
            .on_update_place(move |place_id, caller_id, name| {
                update_place.update_place(place_id, caller_id, name)
            })
            .on_delete_geofence(move |fence_id, caller_id| {
                delete_geofence.delete_geofence(fence_id, caller_id)
            })
            .on_delete_place(move |place_id, caller_id| delete_place.delete_place(place_id, caller_id))
            .on_enable_geofence(move |fence_id, caller_id, on| {
                enable.enable_geofence(fence_id, caller_id, on)
            })
            .on_start_geofence(move |fence_id, caller_id| start.set_running(fence_id, caller_id, true))
            .on_stop_geofence(move |fence_id, caller_id| stop.set_running(fence_id, caller_id, false))
            .on_get_geofences(move |place_id, caller_id| get_geofences.get_geofences(place_id, caller_id))
            .on_get_places(move |caller_id| get_places.get_places(caller_id))
            .on_get_place_name(move |place_id, caller_id| {
                get_place_name.get_place_name(place_id, caller_id)
            })
            .on_idle_category(move |category| idle.record_idle(category))
    }

    /// Returns the new fence id, or `INVALID_ID` if the place is not the caller's.
    pub fn add_geofence(&self, request: &GeofenceRequest) -> i32 {
        let mut state = self.state();
        if request.place_id != UNGROUPED_PLACE && !state.owns_place(request.place_id, &request.caller_id) {
            return INVALID_ID;
        }
        let Some(fence_id) = state.next_fence_id.checked_add(1) else {
            return INVALID_ID;
        };
        state.next_fence_id = fence_id;
        state.fences.insert(
            fence_id,
            StoredFence {
                owner: request.caller_id.clone(),
                request: request.clone(),
                enabled: true,
                running: false,
            },
        );
        fence_id
    }

    /// Returns the new place id, or `INVALID_ID` for an empty name.
    pub fn add_place(&self, caller_id: &str, name: &str) -> i32 {
        if name.is_empty() {
            return INVALID_ID;
        }
        let mut state = self.state();
        let Some(place_id) = state.next_place_id.checked_add(1) else {
            return INVALID_ID;
        };
        state.next_place_id = place_id;
        state.places.insert(
            place_id,
            StoredPlace {
                owner: caller_id.to_string(),
                name: name.to_string(),
            },
        );
        place_id
    }

    pub fn update_place(&self, place_id: i32, caller_id: &str, name: &str) {
        let mut state = self.state();
        match state.places.get_mut(&place_id) {
            Some(place) if place.owner == caller_id => place.name = name.to_string(),
            _ => daemon_log(
                "engine",
                &format!("update_place: {} does not own place {}", caller_id, place_id),
            ),
        }
    }

    pub fn delete_geofence(&self, fence_id: i32, caller_id: &str) {
        let mut state = self.state();
        if state.owned_fence(fence_id, caller_id).is_some() {
            state.fences.remove(&fence_id);
        }
    }

    /// Deletes the place and every fence grouped under it.
    pub fn delete_place(&self, place_id: i32, caller_id: &str) {
        let mut state = self.state();
        if !state.owns_place(place_id, caller_id) {
            return;
        }
        state.places.remove(&place_id);
        state
            .fences
            .retain(|_, fence| fence.request.place_id != place_id);
    }

    pub fn enable_geofence(&self, fence_id: i32, caller_id: &str, enable: bool) {
        if let Some(fence) = self.state().owned_fence(fence_id, caller_id) {
            fence.enabled = enable;
        }
    }

    fn set_running(&self, fence_id: i32, caller_id: &str, running: bool) {
        if let Some(fence) = self.state().owned_fence(fence_id, caller_id) {
            fence.running = running && fence.enabled;
        }
    }

    pub fn is_running(&self, fence_id: i32) -> bool {
        self.state()
            .fences
            .get(&fence_id)
            .is_some_and(|fence| fence.running)
    }

    /// The caller's fences under `place_id`, or all of them for `UNGROUPED_PLACE`.
    pub fn get_geofences(&self, place_id: i32, caller_id: &str) -> ListReply<FenceRecord> {
        let state = self.state();
        let records = state
            .fences
            .iter()
            .filter(|(_, fence)| fence.owner == caller_id)
            .filter(|(_, fence)| place_id == UNGROUPED_PLACE || fence.request.place_id == place_id)
            .map(|(fence_id, fence)| fence_record(*fence_id, fence))
            .collect();
        ListReply::found(records)
    }

    pub fn get_places(&self, caller_id: &str) -> ListReply<PlaceRecord> {
        let state = self.state();
        let records = state
            .places
            .iter()
            .filter(|(_, place)| place.owner == caller_id)
            .map(|(place_id, place)| PlaceRecord {
                place_id: *place_id,
                access_type: ACCESS_TYPE_PRIVATE,
                place_name: place.name.clone(),
            })
            .collect();
        ListReply::found(records)
    }

    pub fn get_place_name(&self, place_id: i32, caller_id: &str) -> PlaceNameReply {
        match self.state().places.get(&place_id) {
            Some(place) if place.owner == caller_id => PlaceNameReply::found(place.name.clone()),
            _ => PlaceNameReply::no_result(),
        }
    }

    fn record_idle(&self, category: Category) {
        daemon_log("engine", &format!("{} has no subscribers left", category));
        let mut state = self.state();
        if state.idle_reports.len() == MAX_IDLE_REPORTS {
            state.idle_reports.remove(0);
        }
        state.idle_reports.push(category);
    }

    /// The most recent idle-category reports, oldest first.
    pub fn idle_reports(&self) -> Vec<Category> {
        self.state().idle_reports.clone()
    }

    /// Drain the recorded idle-category reports.
    pub fn take_idle_reports(&self) -> Vec<Category> {
        std::mem::take(&mut self.state().idle_reports)
    }
}

fn fence_record(fence_id: i32, fence: &StoredFence) -> FenceRecord {
    let request = &fence.request;
    let point = request.geofence_type == GeofenceType::PointRadius;
    FenceRecord {
        fence_id,
        place_id: request.place_id,
        enabled: fence.enabled,
        geofence_type: request.geofence_type,
        access_type: ACCESS_TYPE_PRIVATE,
        latitude: if point { request.latitude } else { 0.0 },
        longitude: if point { request.longitude } else { 0.0 },
        radius: if point { request.radius } else { 0 },
        address: request.address.clone(),
        bssid: request.bssid.clone(),
        ssid: request.ssid.clone(),
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
