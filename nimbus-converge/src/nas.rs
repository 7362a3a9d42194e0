//! NAS volume interfaces.
//!
//! Interfaces are children of a volume and are addressed by the composite id
//! `volumeId/interfaceId`. The NAS service does not arbitrate concurrent
//! interface changes on one volume, so every mutation holds the volume's
//! named lock until its convergence wait finishes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::config::OperationTimeouts;
use crate::error::Result;
use crate::fault::check_deleted;
use crate::identity::{self, CompositeId};
use crate::lock::LockRegistry;
use crate::observer::{DELETED, Observation, Observer};
use crate::poller::{OperationSpec, wait_for};
use crate::retry::{RetryPolicy, retry_on_transient};
use crate::transport::{ApiError, RestClient, unwrap_envelope};

pub const BUILDING: &str = "BUILDING";
pub const ACTIVE: &str = "ACTIVE";
pub const DELETING: &str = "DELETING";
pub const ERROR: &str = "ERROR";

pub const NAS_INITIAL_DELAY: Duration = Duration::from_secs(10);
pub const NAS_POLL_INTERVAL: Duration = Duration::from_secs(3);

const ERROR_REASON: &str = "the volume interface is in error status; check the NAS storage API logs";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NasInterface {
    pub id: String,
    pub status: String,
    pub path: String,
    pub subnet_id: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NasVolume {
    pub id: String,
    pub name: String,
    pub status: String,
    pub interfaces: Vec<NasInterface>,
}

impl NasVolume {
    pub fn interface(&self, id: &str) -> Option<&NasInterface> {
        self.interfaces.iter().find(|i| i.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectInterface<'a> {
    subnet_id: &'a str,
}

#[async_trait]
pub trait NasApi: Send + Sync {
    async fn get_volume(&self, volume_id: &str) -> std::result::Result<NasVolume, ApiError>;

    async fn connect_interface(&self, volume_id: &str, subnet_id: &str) -> std::result::Result<NasInterface, ApiError>;

    async fn delete_interface(&self, volume_id: &str, interface_id: &str) -> std::result::Result<(), ApiError>;
}

/// NAS storage v1 REST client.
#[derive(Clone)]
pub struct RestNasApi {
    client: RestClient,
}

impl RestNasApi {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NasApi for RestNasApi {
    async fn get_volume(&self, volume_id: &str) -> std::result::Result<NasVolume, ApiError> {
        let value: Value = self.client.get_json(&format!("v1/volumes/{volume_id}")).await?;
        unwrap_envelope(value, "volume")
    }

    async fn connect_interface(&self, volume_id: &str, subnet_id: &str) -> std::result::Result<NasInterface, ApiError> {
        let body = json!({ "interface": ConnectInterface { subnet_id } });
        let value: Value = self
            .client
            .post_json(&format!("v1/volumes/{volume_id}/interfaces"), &body)
            .await?;
        unwrap_envelope(value, "interface")
    }

    async fn delete_interface(&self, volume_id: &str, interface_id: &str) -> std::result::Result<(), ApiError> {
        self.client
            .delete(&format!("v1/volumes/{volume_id}/interfaces/{interface_id}"))
            .await
    }
}

/// Probes one interface through its volume. An interface missing from the
/// volume is reported as deleted.
pub struct NasInterfaceObserver {
    api: Arc<dyn NasApi>,
}

impl NasInterfaceObserver {
    pub fn new(api: Arc<dyn NasApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Observer for NasInterfaceObserver {
    type Object = NasInterface;

    async fn observe(&self, id: &str) -> std::result::Result<Observation<NasInterface>, ApiError> {
        let (volume_id, interface_id) =
            identity::decode(id).map_err(|e| ApiError::malformed(e.to_string()))?;

        let volume = self.api.get_volume(&volume_id).await?;
        let Some(found) = volume.interface(&interface_id) else {
            return Ok(Observation::deleted());
        };

        let status = found.status.trim().to_ascii_uppercase();
        let observation = Observation::new(found.clone(), status.clone());
        if status == ERROR {
            return Ok(observation.with_reason(ERROR_REASON));
        }
        Ok(observation)
    }
}

pub struct NasInterfaceController {
    api: Arc<dyn NasApi>,
    locks: Arc<LockRegistry>,
    timeouts: OperationTimeouts,
}

impl NasInterfaceController {
    pub fn new(api: Arc<dyn NasApi>, locks: Arc<LockRegistry>, timeouts: OperationTimeouts) -> Self {
        Self { api, locks, timeouts }
    }

    pub fn observer(&self) -> NasInterfaceObserver {
        NasInterfaceObserver::new(Arc::clone(&self.api))
    }

    /// Connect a new interface on `subnet_id` to the volume and wait until it
    /// is active. Returns the composite id with the converged interface.
    pub async fn create(
        &self,
        volume_id: &str,
        subnet_id: &str,
        cancel: &CancelSignal,
    ) -> Result<(CompositeId, NasInterface)> {
        let timeout = self.timeouts.create();
        let spec = OperationSpec::new([ACTIVE], timeout)
            .with_pending([BUILDING])
            .with_initial_delay(NAS_INITIAL_DELAY)
            .with_poll_interval(NAS_POLL_INTERVAL);
        spec.validate()?;

        let _guard = self.locks.lock_or_cancel(volume_id, cancel).await?;

        let created = retry_on_transient(&RetryPolicy::new(timeout), cancel, || {
            self.api.connect_interface(volume_id, subnet_id)
        })
        .await?;
        let id = CompositeId::new(volume_id, created.id.clone());
        debug!(%id, "volume interface connected");

        let done = wait_for(&spec, &self.observer(), &id.encode(), cancel).await?;

        Ok((id, done.object.unwrap_or(created)))
    }

    /// Current state of an interface, `None` once it is gone.
    pub async fn get(&self, id: &str) -> Result<Option<NasInterface>> {
        let id: CompositeId = id.parse()?;
        match self.api.get_volume(id.parent()).await {
            Ok(volume) => Ok(volume.interface(id.child()).cloned()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Disconnect an interface and wait until the volume no longer lists it.
    pub async fn delete(&self, id: &str, cancel: &CancelSignal) -> Result<()> {
        let id: CompositeId = id.parse()?;
        let timeout = self.timeouts.delete();
        let spec = OperationSpec::new([DELETED], timeout)
            .with_pending([ACTIVE, DELETING])
            .with_initial_delay(NAS_INITIAL_DELAY)
            .with_poll_interval(NAS_POLL_INTERVAL);
        spec.validate()?;

        let _guard = self.locks.lock_or_cancel(id.parent(), cancel).await?;

        let api = &self.api;
        let (volume_id, interface_id) = (id.parent(), id.child());
        retry_on_transient(&RetryPolicy::new(timeout), cancel, || async move {
            check_deleted(api.delete_interface(volume_id, interface_id).await)
        })
        .await?;

        wait_for(&spec, &self.observer(), &id.encode(), cancel).await?;
        debug!(%id, "volume interface deleted");
        Ok(())
    }
}
