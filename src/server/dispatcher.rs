//! Capability map from remote method to engine handler.
//!
//! The map is built once, before the server starts. A method without a
//! handler is answered with its neutral default reply.

use crate::identity::{resolve_or_empty, IdentityResolver};
use crate::rpc::{
    Category, FenceRecord, GeofenceRequest, ListReply, Method, MethodCall, MethodReply,
    PlaceNameReply, PlaceRecord,
};
use std::collections::HashMap;

/// Type-erased method handler.
pub type Handler = Box<dyn FnMut(MethodCall) -> MethodReply + Send>;

/// Callback told when a subscription category is abandoned.
pub type IdleHandler = Box<dyn FnMut(Category) + Send>;

/// Engine callbacks, keyed by method.
///
/// Built with the `on_*` methods:
///
/// ```ignore
/// let capabilities = Capabilities::new()
///     .on_add_place(|caller_id, name| store.add_place(caller_id, name))
///     .on_idle_category(|category| engine.pause(category));
/// ```
#[derive(Default)]
pub struct Capabilities {
    handlers: HashMap<Method, Handler>,
    on_idle: Option<IdleHandler>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supports(&self, method: Method) -> bool {
        self.handlers.contains_key(&method)
    }

    /// Register a raw handler for `method`, replacing any previous one.
    ///
    /// The handler must answer with the reply variant matching `method`.
    pub fn with_handler(mut self, method: Method, handler: Handler) -> Self {
        self.handlers.insert(method, handler);
        self
    }

    pub fn on_add_geofence<F>(self, mut f: F) -> Self
    where
        F: FnMut(&GeofenceRequest) -> i32 + Send + 'static,
    {
        self.with_handler(
            Method::AddGeofence,
            Box::new(move |call| match call {
                MethodCall::AddGeofence(request) => MethodReply::Id(f(&request)),
                other => other.method().default_reply(),
            }),
        )
    }

    pub fn on_add_place<F>(self, mut f: F) -> Self
    where
        F: FnMut(&str, &str) -> i32 + Send + 'static,
    {
        self.with_handler(
            Method::AddPlace,
            Box::new(move |call| match call {
                MethodCall::AddPlace {
                    caller_id,
                    place_name,
                } => MethodReply::Id(f(&caller_id, &place_name)),
                other => other.method().default_reply(),
            }),
        )
    }

    /// `f(place_id, caller_id, place_name)`
    pub fn on_update_place<F>(self, mut f: F) -> Self
    where
        F: FnMut(i32, &str, &str) + Send + 'static,
    {
        self.with_handler(
            Method::UpdatePlace,
            Box::new(move |call| match call {
                MethodCall::UpdatePlace(request) => {
                    f(request.place_id, &request.caller_id, &request.place_name);
                    MethodReply::Done
                }
                other => other.method().default_reply(),
            }),
        )
    }

    /// `f(fence_id, caller_id)`
    pub fn on_delete_geofence<F>(self, mut f: F) -> Self
    where
        F: FnMut(i32, &str) + Send + 'static,
    {
        self.with_handler(
            Method::DeleteGeofence,
            Box::new(move |call| match call {
                MethodCall::DeleteGeofence {
                    fence_id,
                    caller_id,
                } => {
                    f(fence_id, &caller_id);
                    MethodReply::Done
                }
                other => other.method().default_reply(),
            }),
        )
    }

    /// `f(place_id, caller_id)`
    pub fn on_delete_place<F>(self, mut f: F) -> Self
    where
        F: FnMut(i32, &str) + Send + 'static,
    {
        self.with_handler(
            Method::DeletePlace,
            Box::new(move |call| match call {
                MethodCall::DeletePlace {
                    place_id,
                    caller_id,
                } => {
                    f(place_id, &caller_id);
                    MethodReply::Done
                }
                other => other.method().default_reply(),
            }),
        )
    }

    /// `f(fence_id, caller_id, enable)`
    pub fn on_enable_geofence<F>(self, mut f: F) -> Self
    where
        F: FnMut(i32, &str, bool) + Send + 'static,
    {
        self.with_handler(
            Method::EnableGeofence,
            Box::new(move |call| match call {
                MethodCall::EnableGeofence {
                    fence_id,
                    caller_id,
                    enable,
                } => {
                    f(fence_id, &caller_id, enable);
                    MethodReply::Done
                }
                other => other.method().default_reply(),
            }),
        )
    }

    pub fn on_start_geofence<F>(self, mut f: F) -> Self
    where
        F: FnMut(i32, &str) + Send + 'static,
    {
        self.with_handler(
            Method::StartGeofence,
            Box::new(move |call| match call {
                MethodCall::StartGeofence {
                    fence_id,
                    caller_id,
                } => {
                    f(fence_id, &caller_id);
                    MethodReply::Done
                }
                other => other.method().default_reply(),
            }),
        )
    }

    pub fn on_stop_geofence<F>(self, mut f: F) -> Self
    where
        F: FnMut(i32, &str) + Send + 'static,
    {
        self.with_handler(
            Method::StopGeofence,
            Box::new(move |call| match call {
                MethodCall::StopGeofence {
                    fence_id,
                    caller_id,
                } => {
                    f(fence_id, &caller_id);
                    MethodReply::Done
                }
                other => other.method().default_reply(),
            }),
        )
    }

    /// `f(place_id, caller_id)`
    pub fn on_get_geofences<F>(self, mut f: F) -> Self
    where
        F: FnMut(i32, &str) -> ListReply<FenceRecord> + Send + 'static,
    {
        self.with_handler(
            Method::GetGeofences,
            Box::new(move |call| match call {
                MethodCall::GetGeofences {
                    place_id,
                    caller_id,
                } => MethodReply::Geofences(f(place_id, &caller_id)),
                other => other.method().default_reply(),
            }),
        )
    }

    pub fn on_get_places<F>(self, mut f: F) -> Self
    where
        F: FnMut(&str) -> ListReply<PlaceRecord> + Send + 'static,
    {
        self.with_handler(
            Method::GetPlaces,
            Box::new(move |call| match call {
                MethodCall::GetPlaces { caller_id } => MethodReply::Places(f(&caller_id)),
                other => other.method().default_reply(),
            }),
        )
    }

    /// `f(place_id, caller_id)`
    pub fn on_get_place_name<F>(self, mut f: F) -> Self
    where
        F: FnMut(i32, &str) -> PlaceNameReply + Send + 'static,
    {
        self.with_handler(
            Method::GetPlaceName,
            Box::new(move |call| match call {
                MethodCall::GetPlaceName {
                    place_id,
                    caller_id,
                } => MethodReply::PlaceName(f(place_id, &caller_id)),
                other => other.method().default_reply(),
            }),
        )
    }

    pub fn on_idle_category<F>(mut self, f: F) -> Self
    where
        F: FnMut(Category) + Send + 'static,
    {
        self.on_idle = Some(Box::new(f));
        self
    }
}

/// Routes method calls to their handlers.
pub struct Dispatcher {
    capabilities: Capabilities,
    resolver: Box<dyn IdentityResolver>,
}

impl Dispatcher {
    pub fn new(capabilities: Capabilities, resolver: Box<dyn IdentityResolver>) -> Self {
        Self {
            capabilities,
            resolver,
        }
    }

    /// Run exactly one handler for `call`, or produce the neutral default.
    ///
    /// An empty `caller_id` is resolved from `caller_pid` first.
    pub fn dispatch(&mut self, caller_pid: Option<u32>, mut call: MethodCall) -> MethodReply {
        if call.caller_id().is_empty() {
            if let Some(pid) = caller_pid {
                call.set_caller_id(resolve_or_empty(self.resolver.as_ref(), pid));
            }
        }

        let method = call.method();
        match self.capabilities.handlers.get_mut(&method) {
            Some(handler) => handler(call),
            None => {
                tracing::debug!("no handler for {}, answering default", method);
                method.default_reply()
            }
        }
    }

    /// Tell the engine about categories that just became idle.
    pub fn notify_idle(&mut self, categories: &[Category]) {
        let Some(on_idle) = self.capabilities.on_idle.as_mut() else {
            return;
        };
        for category in categories {
            on_idle(*category);
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
