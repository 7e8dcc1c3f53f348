//! Wire types exchanged between geofence clients and the server.
//!
//! Method calls and replies are typed enums rather than loosely-typed
//! dictionaries; each `MethodCall` variant names exactly one remote method.

use crate::status::StatusCode;
use serde::{Deserialize, Serialize};

/// Well-known bus name owned by the geofence server.
pub const SERVICE_NAME: &str = "org.tizen.lbs.Providers.GeofenceServer";

/// Object path the server's methods and signals live on.
pub const OBJECT_PATH: &str = "/org/tizen/lbs/Providers/GeofenceServer/SAMSUNG";

/// Interface name for every geofence method and signal.
pub const INTERFACE_NAME: &str = "org.tizen.lbs.Geofence";

/// Sentinel id returned on the wire when an add operation fails.
pub const INVALID_ID: i32 = -1;

/// Place id meaning "not grouped under any place".
pub const UNGROUPED_PLACE: i32 = -1;

/// Identifier of one installed signal subscription.
pub type SubscriptionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeofenceType {
    PointRadius,
    WifiAccessPoint,
    Bluetooth,
}

/// Containment state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FenceState {
    #[default]
    Unknown,
    Entered,
    Exited,
}

/// Parameters of an `AddGeofence` call.
///
/// Fields are passed through untouched; the engine consults only the ones
/// relevant to `geofence_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceRequest {
    pub caller_id: String,
    pub place_id: i32,
    pub geofence_type: GeofenceType,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: i32,
    pub address: String,
    pub bssid: String,
    pub ssid: String,
}

impl GeofenceRequest {
    /// A point-radius fence around `(latitude, longitude)`.
    pub fn point_radius(
        caller_id: impl Into<String>,
        place_id: i32,
        latitude: f64,
        longitude: f64,
        radius: i32,
        address: impl Into<String>,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            place_id,
            geofence_type: GeofenceType::PointRadius,
            latitude,
            longitude,
            radius,
            address: address.into(),
            bssid: String::new(),
            ssid: String::new(),
        }
    }

    /// A fence triggered by a WiFi or Bluetooth access point.
    pub fn access_point(
        caller_id: impl Into<String>,
        place_id: i32,
        geofence_type: GeofenceType,
        bssid: impl Into<String>,
        ssid: impl Into<String>,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            place_id,
            geofence_type,
            latitude: 0.0,
            longitude: 0.0,
            radius: 0,
            address: String::new(),
            bssid: bssid.into(),
            ssid: ssid.into(),
        }
    }
}

/// Parameters shared by the place methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceRequest {
    pub caller_id: String,
    pub place_id: i32,
    pub place_name: String,
}

/// One geofence as reported by `GetGeofences`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FenceRecord {
    pub fence_id: i32,
    pub place_id: i32,
    pub enabled: bool,
    pub geofence_type: GeofenceType,
    pub access_type: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: i32,
    pub address: String,
    pub bssid: String,
    pub ssid: String,
}

/// One place as reported by `GetPlaces`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub place_id: i32,
    pub access_type: i32,
    pub place_name: String,
}

/// Reply of a list query.
///
/// `records: None` (absent) and `records: Some(vec![])` (empty) are distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListReply<T> {
    pub count: i32,
    pub error_code: StatusCode,
    pub records: Option<Vec<T>>,
}

impl<T> ListReply<T> {
    /// A successful reply; `count` is taken from the record list.
    pub fn found(records: Vec<T>) -> Self {
        Self {
            count: i32::try_from(records.len()).unwrap_or(i32::MAX),
            error_code: StatusCode::None,
            records: Some(records),
        }
    }

    pub fn no_result() -> Self {
        Self {
            count: 0,
            error_code: StatusCode::NoResult,
            records: None,
        }
    }
}

/// Reply of `GetPlaceName`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceNameReply {
    pub error_code: StatusCode,
    pub place_name: Option<String>,
}

impl PlaceNameReply {
    pub fn found(name: impl Into<String>) -> Self {
        Self {
            error_code: StatusCode::None,
            place_name: Some(name.into()),
        }
    }

    pub fn no_result() -> Self {
        Self {
            error_code: StatusCode::NoResult,
            place_name: None,
        }
    }
}

/// Remote methods exposed on the geofence interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    AddGeofence,
    AddPlace,
    UpdatePlace,
    DeleteGeofence,
    DeletePlace,
    EnableGeofence,
    StartGeofence,
    StopGeofence,
    GetGeofences,
    GetPlaces,
    GetPlaceName,
}

impl Method {
    pub const ALL: [Method; 11] = [
        Method::AddGeofence,
        Method::AddPlace,
        Method::UpdatePlace,
        Method::DeleteGeofence,
        Method::DeletePlace,
        Method::EnableGeofence,
        Method::StartGeofence,
        Method::StopGeofence,
        Method::GetGeofences,
        Method::GetPlaces,
        Method::GetPlaceName,
    ];

    /// Member name of the method on the bus interface.
    pub fn member(self) -> &'static str {
        match self {
            Method::AddGeofence => "AddGeofence",
            Method::AddPlace => "AddPlace",
            Method::UpdatePlace => "UpdatePlace",
            Method::DeleteGeofence => "DeleteGeofence",
            Method::DeletePlace => "DeletePlace",
            Method::EnableGeofence => "EnableGeofence",
            Method::StartGeofence => "StartGeofence",
            Method::StopGeofence => "StopGeofence",
            Method::GetGeofences => "GetGeofences",
            Method::GetPlaces => "GetPlaces",
            Method::GetPlaceName => "GetPlaceName",
        }
    }

    /// Reply sent when no handler is registered for this method.
    pub fn default_reply(self) -> MethodReply {
        match self {
            Method::AddGeofence | Method::AddPlace => MethodReply::Id(INVALID_ID),
            Method::UpdatePlace
            | Method::DeleteGeofence
            | Method::DeletePlace
            | Method::EnableGeofence
            | Method::StartGeofence
            | Method::StopGeofence => MethodReply::Done,
            Method::GetGeofences => MethodReply::Geofences(ListReply::no_result()),
            Method::GetPlaces => MethodReply::Places(ListReply::no_result()),
            Method::GetPlaceName => MethodReply::PlaceName(PlaceNameReply::no_result()),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.member())
    }
}

/// A single remote method invocation with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MethodCall {
    AddGeofence(GeofenceRequest),
    AddPlace { caller_id: String, place_name: String },
    UpdatePlace(PlaceRequest),
    DeleteGeofence { fence_id: i32, caller_id: String },
    DeletePlace { place_id: i32, caller_id: String },
    EnableGeofence { fence_id: i32, caller_id: String, enable: bool },
    StartGeofence { fence_id: i32, caller_id: String },
    StopGeofence { fence_id: i32, caller_id: String },
    GetGeofences { place_id: i32, caller_id: String },
    GetPlaces { caller_id: String },
    GetPlaceName { place_id: i32, caller_id: String },
}

impl MethodCall {
    pub fn method(&self) -> Method {
        match self {
            MethodCall::AddGeofence(_) => Method::AddGeofence,
            MethodCall::AddPlace { .. } => Method::AddPlace,
            MethodCall::UpdatePlace(_) => Method::UpdatePlace,
            MethodCall::DeleteGeofence { .. } => Method::DeleteGeofence,
            MethodCall::DeletePlace { .. } => Method::DeletePlace,
            MethodCall::EnableGeofence { .. } => Method::EnableGeofence,
            MethodCall::StartGeofence { .. } => Method::StartGeofence,
            MethodCall::StopGeofence { .. } => Method::StopGeofence,
            MethodCall::GetGeofences { .. } => Method::GetGeofences,
            MethodCall::GetPlaces { .. } => Method::GetPlaces,
            MethodCall::GetPlaceName { .. } => Method::GetPlaceName,
        }
    }

    pub fn caller_id(&self) -> &str {
        match self {
            MethodCall::AddGeofence(request) => &request.caller_id,
            MethodCall::UpdatePlace(request) => &request.caller_id,
            MethodCall::AddPlace { caller_id, .. }
            | MethodCall::DeleteGeofence { caller_id, .. }
            | MethodCall::DeletePlace { caller_id, .. }
            | MethodCall::EnableGeofence { caller_id, .. }
            | MethodCall::StartGeofence { caller_id, .. }
            | MethodCall::StopGeofence { caller_id, .. }
            | MethodCall::GetGeofences { caller_id, .. }
            | MethodCall::GetPlaces { caller_id }
            | MethodCall::GetPlaceName { caller_id, .. } => caller_id,
        }
    }

    pub fn set_caller_id(&mut self, id: String) {
        match self {
            MethodCall::AddGeofence(request) => request.caller_id = id,
            MethodCall::UpdatePlace(request) => request.caller_id = id,
            MethodCall::AddPlace { caller_id, .. }
            | MethodCall::DeleteGeofence { caller_id, .. }
            | MethodCall::DeletePlace { caller_id, .. }
            | MethodCall::EnableGeofence { caller_id, .. }
            | MethodCall::StartGeofence { caller_id, .. }
            | MethodCall::StopGeofence { caller_id, .. }
            | MethodCall::GetGeofences { caller_id, .. }
            | MethodCall::GetPlaces { caller_id }
            | MethodCall::GetPlaceName { caller_id, .. } => *caller_id = id,
        }
    }
}

/// Reply to a `MethodCall`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MethodReply {
    /// Id allocated by an add operation, or `INVALID_ID`.
    Id(i32),
    /// Completion of a mutating call without a payload.
    Done,
    Geofences(ListReply<FenceRecord>),
    Places(ListReply<PlaceRecord>),
    PlaceName(PlaceNameReply),
}

/// Signal kinds the server broadcasts.
///
/// Each kind is also a subscription category tracked by the session registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalKind {
    /// In/out transitions (`GeofenceInout`).
    Inout,
    /// Fence lifecycle events (`GeofenceEvent`).
    Event,
}

/// Subscription category; one per signal kind.
pub type Category = SignalKind;

impl SignalKind {
    pub const ALL: [SignalKind; 2] = [SignalKind::Inout, SignalKind::Event];

    pub fn member(self) -> &'static str {
        match self {
            SignalKind::Inout => "GeofenceInout",
            SignalKind::Event => "GeofenceEvent",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.member())
    }
}

/// Signal payload.
///
/// `place_id` and `error_code` are only present on `Event` signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeofenceNotification {
    pub caller_id: String,
    pub fence_id: i32,
    pub access_type: i32,
    pub state: FenceState,
    pub place_id: Option<i32>,
    pub error_code: Option<i32>,
}

impl GeofenceNotification {
    pub fn inout(
        caller_id: impl Into<String>,
        fence_id: i32,
        access_type: i32,
        state: FenceState,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            fence_id,
            access_type,
            state,
            place_id: None,
            error_code: None,
        }
    }

    pub fn event(
        place_id: i32,
        fence_id: i32,
        access_type: i32,
        caller_id: impl Into<String>,
        error_code: i32,
        state: FenceState,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            fence_id,
            access_type,
            state,
            place_id: Some(place_id),
            error_code: Some(error_code),
        }
    }
}

/// Target of a method call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub service: String,
    pub object_path: String,
    pub interface: String,
}

impl Destination {
    pub fn new(service: impl Into<String>, object_path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            object_path: object_path.into(),
            interface: INTERFACE_NAME.to_string(),
        }
    }

    pub fn match_rule(&self, signal: SignalKind) -> MatchRule {
        MatchRule {
            service: self.service.clone(),
            interface: self.interface.clone(),
            signal,
            object_path: self.object_path.clone(),
        }
    }
}

impl Default for Destination {
    fn default() -> Self {
        Self::new(SERVICE_NAME, OBJECT_PATH)
    }
}

/// Filter selecting which signals a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRule {
    pub service: String,
    pub interface: String,
    pub signal: SignalKind,
    pub object_path: String,
}

impl MatchRule {
    /// Whether a signal of `kind` emitted by `origin` passes this rule.
    pub fn matches(&self, origin: &Destination, kind: SignalKind) -> bool {
        self.signal == kind
            && self.service == origin.service
            && self.object_path == origin.object_path
            && self.interface == origin.interface
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
