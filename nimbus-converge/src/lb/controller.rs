//! Listener, monitor and load-balancer lifecycle.
//!
//! Each mutation goes through the transient retry wrapper and is followed by
//! a convergence wait on the owning load balancer.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::api::LbApi;
use super::options::{ListenerArgs, ListenerChanges, LoadBalancerChanges, MonitorArgs, MonitorChanges};
use super::{ACTIVE, DELETED, LbResource, LbScope, lb_pending, lb_pending_delete};
use crate::backend::Backend;
use crate::cancel::CancelSignal;
use crate::config::{OperationTimeouts, ProviderConfig};
use crate::error::Result;
use crate::fault::check_deleted;
use crate::poller::{Converged, OperationSpec, wait_for};
use crate::retry::{RetryPolicy, retry_on_transient};

/// Delay before the first probe and between probes.
pub const LB_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct LoadBalancerController {
    api: Arc<dyn LbApi>,
    backend: Backend,
    timeouts: OperationTimeouts,
}

impl LoadBalancerController {
    pub fn new(api: Arc<dyn LbApi>, config: &ProviderConfig) -> Self {
        Self {
            api,
            backend: Backend::select(config),
            timeouts: config.timeouts,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    fn spec<'a>(target: &str, pending: impl IntoIterator<Item = &'a str>, timeout: Duration) -> OperationSpec {
        OperationSpec::new([target], timeout)
            .with_pending(pending)
            .with_initial_delay(LB_POLL_INTERVAL)
            .with_poll_interval(LB_POLL_INTERVAL)
    }

    /// Wait for a load balancer to reach `target`.
    pub async fn wait_for_loadbalancer(
        &self,
        lb_id: &str,
        target: &str,
        pending: &[&str],
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> Result<Converged<LbResource>> {
        self.wait_for_component(lb_id, LbScope::LoadBalancer, lb_id, target, pending, timeout, cancel)
            .await
    }

    /// Wait for a component of `lb_id` to reach `target`.
    #[allow(clippy::too_many_arguments)]
    pub async fn wait_for_component(
        &self,
        lb_id: &str,
        scope: LbScope,
        id: &str,
        target: &str,
        pending: &[&str],
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> Result<Converged<LbResource>> {
        debug!(lb_id, %scope, id, target, backend = %self.backend, "waiting for load balancer component");
        let observer = self.backend.lb_observer(Arc::clone(&self.api), lb_id, scope);
        let spec = Self::spec(target, pending.iter().copied(), timeout);
        wait_for(&spec, &observer, id, cancel).await
    }

    async fn wait_parent_active(&self, lb_id: &str, timeout: Duration, cancel: &CancelSignal) -> Result<()> {
        self.wait_for_loadbalancer(lb_id, ACTIVE, &lb_pending(), timeout, cancel)
            .await
            .map(|_| ())
    }

    /// Update a load balancer. Returns `None` when nothing changed.
    pub async fn update_loadbalancer(
        &self,
        lb_id: &str,
        changes: &LoadBalancerChanges,
        cancel: &CancelSignal,
    ) -> Result<Option<LbResource>> {
        let Some(opts) = self.backend.loadbalancer_update(changes) else {
            return Ok(None);
        };
        let timeout = self.timeouts.update();

        self.wait_parent_active(lb_id, timeout, cancel).await?;
        retry_on_transient(&RetryPolicy::new(timeout), cancel, || {
            self.api.update_loadbalancer(lb_id, &opts)
        })
        .await?;

        let done = self
            .wait_for_loadbalancer(lb_id, ACTIVE, &lb_pending(), timeout, cancel)
            .await?;
        Ok(done.object)
    }

    pub async fn create_listener(&self, args: &ListenerArgs, cancel: &CancelSignal) -> Result<LbResource> {
        let opts = self.backend.listener_create(args);
        let timeout = self.timeouts.create();
        let lb_id = args.loadbalancer_id.as_str();

        self.wait_parent_active(lb_id, timeout, cancel).await?;
        let created = retry_on_transient(&RetryPolicy::new(timeout), cancel, || {
            self.api.create_listener(&opts)
        })
        .await?;
        debug!(id = %created.id, lb_id, "listener created");

        let done = self
            .wait_for_component(lb_id, LbScope::Listener, &created.id, ACTIVE, &lb_pending(), timeout, cancel)
            .await?;
        Ok(done.object.unwrap_or(created))
    }

    /// Update a listener. Returns `None` when nothing this backend
    /// understands changed.
    pub async fn update_listener(
        &self,
        lb_id: &str,
        id: &str,
        changes: &ListenerChanges,
        cancel: &CancelSignal,
    ) -> Result<Option<LbResource>> {
        let Some(opts) = self.backend.listener_update(changes) else {
            return Ok(None);
        };
        let timeout = self.timeouts.update();

        self.wait_parent_active(lb_id, timeout, cancel).await?;
        retry_on_transient(&RetryPolicy::new(timeout), cancel, || {
            self.api.update_listener(id, &opts)
        })
        .await?;

        let done = self
            .wait_for_component(lb_id, LbScope::Listener, id, ACTIVE, &lb_pending(), timeout, cancel)
            .await?;
        Ok(done.object)
    }

    pub async fn delete_listener(&self, lb_id: &str, id: &str, cancel: &CancelSignal) -> Result<()> {
        self.delete_component(lb_id, LbScope::Listener, id, cancel).await
    }

    /// Create a health monitor on a pool that belongs to `lb_id`.
    pub async fn create_monitor(&self, lb_id: &str, args: &MonitorArgs, cancel: &CancelSignal) -> Result<LbResource> {
        let opts = self.backend.monitor_create(args);
        let timeout = self.timeouts.create();

        self.wait_parent_active(lb_id, timeout, cancel).await?;
        let created = retry_on_transient(&RetryPolicy::new(timeout), cancel, || {
            self.api.create_monitor(&opts)
        })
        .await?;
        debug!(id = %created.id, lb_id, pool_id = %args.pool_id, "monitor created");

        let done = self
            .wait_for_component(lb_id, LbScope::Monitor, &created.id, ACTIVE, &lb_pending(), timeout, cancel)
            .await?;
        Ok(done.object.unwrap_or(created))
    }

    /// Update a monitor. Returns `None` when nothing this backend
    /// understands changed.
    pub async fn update_monitor(
        &self,
        lb_id: &str,
        id: &str,
        changes: &MonitorChanges,
        cancel: &CancelSignal,
    ) -> Result<Option<LbResource>> {
        let Some(opts) = self.backend.monitor_update(changes) else {
            return Ok(None);
        };
        let timeout = self.timeouts.update();

        self.wait_parent_active(lb_id, timeout, cancel).await?;
        retry_on_transient(&RetryPolicy::new(timeout), cancel, || {
            self.api.update_monitor(id, &opts)
        })
        .await?;

        let done = self
            .wait_for_component(lb_id, LbScope::Monitor, id, ACTIVE, &lb_pending(), timeout, cancel)
            .await?;
        Ok(done.object)
    }

    pub async fn delete_monitor(&self, lb_id: &str, id: &str, cancel: &CancelSignal) -> Result<()> {
        self.delete_component(lb_id, LbScope::Monitor, id, cancel).await
    }

    async fn delete_component(&self, lb_id: &str, scope: LbScope, id: &str, cancel: &CancelSignal) -> Result<()> {
        let timeout = self.timeouts.delete();

        self.wait_parent_active(lb_id, timeout, cancel).await?;
        let (api, target) = (&self.api, &scope);
        retry_on_transient(&RetryPolicy::new(timeout), cancel, || async move {
            check_deleted(api.delete_child(target, id).await)
        })
        .await?;

        self.wait_for_component(lb_id, scope, id, DELETED, &lb_pending_delete(), timeout, cancel)
            .await?;
        debug!(id, lb_id, "component deleted");
        Ok(())
    }
}
