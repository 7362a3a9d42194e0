//! Backend-specific probes for load-balancer components.
//!
//! A component's own provisioning status is only meaningful while its parent
//! load balancer is settled, so both observers report the parent status first
//! whenever the parent is busy.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::api::LbApi;
use super::{ACTIVE, LbResource, LbScope, is_skip, normalize_status};
use crate::backend::Backend;
use crate::observer::{Observation, Observer};
use crate::transport::ApiError;

/// Legacy probe: resolves statuses from the load balancer status tree.
pub struct LegacyTreeObserver {
    api: Arc<dyn LbApi>,
    lb_id: String,
    scope: LbScope,
}

impl LegacyTreeObserver {
    pub fn new(api: Arc<dyn LbApi>, lb_id: impl Into<String>, scope: LbScope) -> Self {
        Self {
            api,
            lb_id: lb_id.into(),
            scope,
        }
    }
}

#[async_trait]
impl Observer for LegacyTreeObserver {
    type Object = LbResource;

    async fn observe(&self, id: &str) -> Result<Observation<LbResource>, ApiError> {
        if self.scope == LbScope::LoadBalancer {
            let lb = self.api.get_loadbalancer(id).await?;
            let status = normalize_status(&lb.provisioning_status);
            return Ok(Observation::new(lb, status));
        }

        let tree = self.api.get_status_tree(&self.lb_id).await.map_err(|e| ApiError {
            status: e.status,
            message: format!(
                "unable to get statuses from load balancer {} status tree: {}",
                self.lb_id, e.message
            ),
        })?;

        if let Some(lb) = &tree.loadbalancer {
            let parent_status = normalize_status(&lb.provisioning_status);
            if !is_skip(&parent_status) {
                trace!(lb_id = %self.lb_id, status = %parent_status, "parent busy");
                return Ok(Observation::new(LbResource::from(lb), parent_status));
            }
            if let Some(child) = lb.find(&self.scope, id) {
                let status = normalize_status(&child.provisioning_status);
                return Ok(Observation::new(child, status));
            }
        }

        // Not in the tree: the component exists but carries no status.
        let child = self.api.get_child(&self.scope, id).await?;
        Ok(Observation::new(child, ACTIVE))
    }
}

/// Modern probe: parent load balancer first, then the component directly.
pub struct ModernObserver {
    api: Arc<dyn LbApi>,
    lb_id: String,
    scope: LbScope,
}

impl ModernObserver {
    pub fn new(api: Arc<dyn LbApi>, lb_id: impl Into<String>, scope: LbScope) -> Self {
        Self {
            api,
            lb_id: lb_id.into(),
            scope,
        }
    }
}

#[async_trait]
impl Observer for ModernObserver {
    type Object = LbResource;

    async fn observe(&self, id: &str) -> Result<Observation<LbResource>, ApiError> {
        let lb_id = if self.scope == LbScope::LoadBalancer {
            id
        } else {
            self.lb_id.as_str()
        };

        let lb = self.api.get_loadbalancer(lb_id).await?;
        let parent_status = normalize_status(&lb.provisioning_status);
        if self.scope == LbScope::LoadBalancer || !is_skip(&parent_status) {
            return Ok(Observation::new(lb, parent_status));
        }

        let child = self.api.get_child(&self.scope, id).await?;
        let status = normalize_status(&child.provisioning_status);
        Ok(Observation::new(child, status))
    }
}

/// Observer chosen by the backend selector.
pub enum LbObserver {
    Legacy(LegacyTreeObserver),
    Modern(ModernObserver),
}

#[async_trait]
impl Observer for LbObserver {
    type Object = LbResource;

    async fn observe(&self, id: &str) -> Result<Observation<LbResource>, ApiError> {
        match self {
            LbObserver::Legacy(o) => o.observe(id).await,
            LbObserver::Modern(o) => o.observe(id).await,
        }
    }
}

impl Backend {
    pub fn lb_observer(self, api: Arc<dyn LbApi>, lb_id: impl Into<String>, scope: LbScope) -> LbObserver {
        match self {
            Backend::Legacy => LbObserver::Legacy(LegacyTreeObserver::new(api, lb_id, scope)),
            Backend::Modern => LbObserver::Modern(ModernObserver::new(api, lb_id, scope)),
        }
    }
}
