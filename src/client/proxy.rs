//! Client proxy: one async method per remote geofence operation.

use crate::client::connection::{Connection, SignalHandler};
use crate::client::query::{PlaceName, QueryResult};
use crate::config::ClientConfig;
use crate::daemon_log::daemon_log;
use crate::identity::{resolve_or_empty, IdentityResolver, ProcessNameResolver};
use crate::rpc::{
    Destination, FenceRecord, GeofenceNotification, GeofenceRequest, MethodCall, MethodReply,
    PlaceRecord, PlaceRequest, SignalKind, SubscriptionId,
};
use crate::status::{GeofenceError, GeofenceResult};
use std::sync::Arc;

struct ClientInner {
    connection: Connection,
    /// Service the proxy targets once started.
    target: Destination,
    /// Set by `start`; calls without a binding are never dispatched.
    binding: Option<Destination>,
    /// Present while started.
    subscriptions: Option<Vec<SubscriptionId>>,
    /// Left behind by a `start` whose rollback could not reach the server.
    stale: Vec<SubscriptionId>,
}

/// Handle to a geofence server.
///
/// `create` connects, `start` binds the service and subscribes to both signal
/// kinds, `stop` unsubscribes, and `destroy` releases the connection. Every
/// operation after `destroy` fails with `GeofenceError::Parameter`.
pub struct GeofenceClient {
    inner: Option<ClientInner>,
    resolver: Arc<dyn IdentityResolver>,
}

fn unexpected_reply(reply: &MethodReply) -> GeofenceError {
    daemon_log("client", &format!("Unexpected reply: {:?}", reply));
    GeofenceError::DbusCall
}

impl GeofenceClient {
    pub async fn create(config: &ClientConfig) -> GeofenceResult<Self> {
        let connection = Connection::connect(config).await?;
        Ok(Self {
            inner: Some(ClientInner {
                connection,
                target: config.destination(),
                binding: None,
                subscriptions: None,
                stale: Vec::new(),
            }),
            resolver: Arc::new(ProcessNameResolver),
        })
    }

    /// Replace the resolver used by `caller_id`.
    pub fn with_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    fn live(&self) -> GeofenceResult<&ClientInner> {
        self.inner.as_ref().ok_or(GeofenceError::Parameter)
    }

    fn live_mut(&mut self) -> GeofenceResult<&mut ClientInner> {
        self.inner.as_mut().ok_or(GeofenceError::Parameter)
    }

    /// This process's own caller identity; empty if it cannot be resolved.
    pub fn caller_id(&self) -> String {
        resolve_or_empty(self.resolver.as_ref(), std::process::id())
    }

    pub fn is_started(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| inner.subscriptions.is_some())
    }

    /// Unique name of the underlying connection, while not destroyed.
    pub fn connection_name(&self) -> Option<&str> {
        self.inner
            .as_ref()
            .map(|inner| inner.connection.unique_name())
    }

    /// Release the connection, unsubscribing first if still started.
    pub async fn destroy(&mut self) -> GeofenceResult<()> {
        let mut inner = self.inner.take().ok_or(GeofenceError::Parameter)?;
        let mut leftover = std::mem::take(&mut inner.stale);
        leftover.extend(inner.subscriptions.take().unwrap_or_default());
        for id in leftover {
            if let Err(e) = inner.connection.unsubscribe(id).await {
                daemon_log(
                    "client",
                    &format!("Unsubscribe {} during destroy failed: {}", id, e),
                );
            }
        }
        daemon_log(
            "client",
            &format!("Destroyed {}", inner.connection.unique_name()),
        );
        Ok(())
    }

    /// Bind the service and subscribe `callback` to in/out and event signals.
    pub async fn start<F>(&mut self, callback: F) -> GeofenceResult<()>
    where
        F: Fn(SignalKind, &GeofenceNotification) + Send + Sync + 'static,
    {
        let inner = self.live_mut()?;
        if inner.subscriptions.is_some() {
            return Err(GeofenceError::Parameter);
        }

        let target = inner.target.clone();
        if !inner.connection.name_has_owner(&target.service).await? {
            daemon_log(
                "client",
                &format!("Service {} has no owner", target.service),
            );
            return Err(GeofenceError::AccessDenied);
        }
        inner.binding = Some(target.clone());

        let handler: SignalHandler = Arc::new(callback);
        let mut installed = Vec::new();
        for kind in SignalKind::ALL {
            match inner
                .connection
                .subscribe(target.match_rule(kind), handler.clone())
                .await
            {
                Ok(id) => installed.push(id),
                Err(e) => {
                    daemon_log("client", &format!("Subscribing to {} failed: {}", kind, e));
                    for id in installed {
                        if let Err(rollback) = inner.connection.unsubscribe(id).await {
                            daemon_log(
                                "client",
                                &format!("Rolling back subscription {} failed: {}", id, rollback),
                            );
                            inner.stale.push(id);
                        }
                    }
                    return Err(match e {
                        GeofenceError::Memory => GeofenceError::Memory,
                        _ => GeofenceError::DbusCall,
                    });
                }
            }
        }

        inner.subscriptions = Some(installed);
        Ok(())
    }

    /// Remove every subscription installed by `start`.
    ///
    /// Subscriptions the server did not confirm removing stay installed and
    /// the proxy stays started, so `stop` can be called again.
    pub async fn stop(&mut self) -> GeofenceResult<()> {
        let inner = self.live_mut()?;
        let subscriptions = inner.subscriptions.take().ok_or(GeofenceError::Parameter)?;

        let mut result = Ok(());
        let mut remaining = Vec::new();
        for id in subscriptions {
            if let Err(e) = inner.connection.unsubscribe(id).await {
                remaining.push(id);
                result = Err(e);
            }
        }
        if !remaining.is_empty() {
            daemon_log(
                "client",
                &format!("{} subscriptions still installed after stop", remaining.len()),
            );
            inner.subscriptions = Some(remaining);
        }
        result
    }

    async fn invoke(&self, call: MethodCall) -> GeofenceResult<MethodReply> {
        let inner = self.live()?;
        let Some(destination) = inner.binding.as_ref() else {
            return Err(GeofenceError::AccessDenied);
        };
        inner.connection.call(destination, call).await
    }

    async fn invoke_id(&self, call: MethodCall) -> GeofenceResult<i32> {
        match self.invoke(call).await? {
            MethodReply::Id(id) if id >= 0 => Ok(id),
            MethodReply::Id(id) => {
                daemon_log("client", &format!("Server returned invalid id {}", id));
                Err(GeofenceError::DbusCall)
            }
            other => Err(unexpected_reply(&other)),
        }
    }

    async fn invoke_done(&self, call: MethodCall) -> GeofenceResult<()> {
        match self.invoke(call).await? {
            MethodReply::Done => Ok(()),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Returns the new fence id.
    pub async fn add_geofence(&self, request: &GeofenceRequest) -> GeofenceResult<i32> {
        self.invoke_id(MethodCall::AddGeofence(request.clone()))
            .await
    }

    /// Returns the new place id.
    pub async fn add_place(&self, caller_id: &str, place_name: &str) -> GeofenceResult<i32> {
        self.invoke_id(MethodCall::AddPlace {
            caller_id: caller_id.to_string(),
            place_name: place_name.to_string(),
        })
        .await
    }

    pub async fn update_place(
        &self,
        caller_id: &str,
        place_id: i32,
        place_name: &str,
    ) -> GeofenceResult<()> {
        self.invoke_done(MethodCall::UpdatePlace(PlaceRequest {
            caller_id: caller_id.to_string(),
            place_id,
            place_name: place_name.to_string(),
        }))
        .await
    }

    pub async fn delete_geofence(&self, caller_id: &str, fence_id: i32) -> GeofenceResult<()> {
        self.invoke_done(MethodCall::DeleteGeofence {
            fence_id,
            caller_id: caller_id.to_string(),
        })
        .await
    }

    pub async fn delete_place(&self, caller_id: &str, place_id: i32) -> GeofenceResult<()> {
        self.invoke_done(MethodCall::DeletePlace {
            place_id,
            caller_id: caller_id.to_string(),
        })
        .await
    }

    pub async fn enable_geofence(
        &self,
        caller_id: &str,
        fence_id: i32,
        enable: bool,
    ) -> GeofenceResult<()> {
        self.invoke_done(MethodCall::EnableGeofence {
            fence_id,
            caller_id: caller_id.to_string(),
            enable,
        })
        .await
    }

    pub async fn start_geofence(&self, caller_id: &str, fence_id: i32) -> GeofenceResult<()> {
        self.invoke_done(MethodCall::StartGeofence {
            fence_id,
            caller_id: caller_id.to_string(),
        })
        .await
    }

    pub async fn stop_geofence(&self, caller_id: &str, fence_id: i32) -> GeofenceResult<()> {
        self.invoke_done(MethodCall::StopGeofence {
            fence_id,
            caller_id: caller_id.to_string(),
        })
        .await
    }

    /// Fences of `place_id` (`-1` for all of the caller's fences).
    pub async fn get_geofences(
        &self,
        caller_id: &str,
        place_id: i32,
    ) -> GeofenceResult<QueryResult<FenceRecord>> {
        let call = MethodCall::GetGeofences {
            place_id,
            caller_id: caller_id.to_string(),
        };
        match self.invoke(call).await? {
            MethodReply::Geofences(reply) => Ok(reply.into()),
            other => Err(unexpected_reply(&other)),
        }
    }

    pub async fn get_places(&self, caller_id: &str) -> GeofenceResult<QueryResult<PlaceRecord>> {
        let call = MethodCall::GetPlaces {
            caller_id: caller_id.to_string(),
        };
        match self.invoke(call).await? {
            MethodReply::Places(reply) => Ok(reply.into()),
            other => Err(unexpected_reply(&other)),
        }
    }

    pub async fn get_place_name(&self, caller_id: &str, place_id: i32) -> GeofenceResult<PlaceName> {
        let call = MethodCall::GetPlaceName {
            place_id,
            caller_id: caller_id.to_string(),
        };
        match self.invoke(call).await? {
            MethodReply::PlaceName(reply) => Ok(reply.into()),
            other => Err(unexpected_reply(&other)),
        }
    }
}
