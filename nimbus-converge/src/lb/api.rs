//! Load-balancer service client.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use super::options::{ListenerCreate, ListenerUpdate, LoadBalancerUpdate, MonitorCreate, MonitorUpdate};
use super::{LbResource, LbScope, StatusTree};
use crate::backend::Backend;
use crate::transport::{ApiError, RestClient, unwrap_envelope};

/// Calls the load-balancer family needs from either backend.
#[async_trait]
pub trait LbApi: Send + Sync {
    async fn get_loadbalancer(&self, id: &str) -> Result<LbResource, ApiError>;

    /// Status tree of a load balancer and all of its components.
    async fn get_status_tree(&self, lb_id: &str) -> Result<StatusTree, ApiError>;

    async fn get_child(&self, scope: &LbScope, id: &str) -> Result<LbResource, ApiError>;

    async fn update_loadbalancer(&self, id: &str, opts: &LoadBalancerUpdate) -> Result<LbResource, ApiError>;

    async fn create_listener(&self, opts: &ListenerCreate) -> Result<LbResource, ApiError>;

    async fn update_listener(&self, id: &str, opts: &ListenerUpdate) -> Result<LbResource, ApiError>;

    async fn create_monitor(&self, opts: &MonitorCreate) -> Result<LbResource, ApiError>;

    async fn update_monitor(&self, id: &str, opts: &MonitorUpdate) -> Result<LbResource, ApiError>;

    async fn delete_child(&self, scope: &LbScope, id: &str) -> Result<(), ApiError>;
}

/// REST implementation routed by [`Backend`].
#[derive(Clone)]
pub struct RestLbApi {
    client: RestClient,
    backend: Backend,
}

impl RestLbApi {
    pub fn new(client: RestClient, backend: Backend) -> Self {
        Self { client, backend }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    fn path(&self, scope: &LbScope, id: Option<&str>) -> String {
        let prefix = self.backend.lbaas_prefix();
        match id {
            Some(id) => format!("{prefix}/{}/{id}", scope.collection()),
            None => format!("{prefix}/{}", scope.collection()),
        }
    }

    async fn get(&self, scope: &LbScope, id: &str) -> Result<LbResource, ApiError> {
        let value: Value = self.client.get_json(&self.path(scope, Some(id))).await?;
        unwrap_envelope(value, scope.envelope())
    }

    async fn create<B: Serialize + Sync>(&self, scope: &LbScope, body: &B) -> Result<LbResource, ApiError> {
        let key = scope.envelope();
        let value: Value = self
            .client
            .post_json(&self.path(scope, None), &json!({ key: body }))
            .await?;
        unwrap_envelope(value, key)
    }

    async fn update<B: Serialize + Sync>(&self, scope: &LbScope, id: &str, body: &B) -> Result<LbResource, ApiError> {
        let key = scope.envelope();
        let value: Value = self
            .client
            .put_json(&self.path(scope, Some(id)), &json!({ key: body }))
            .await?;
        unwrap_envelope(value, key)
    }
}

#[async_trait]
impl LbApi for RestLbApi {
    async fn get_loadbalancer(&self, id: &str) -> Result<LbResource, ApiError> {
        self.get(&LbScope::LoadBalancer, id).await
    }

    async fn get_status_tree(&self, lb_id: &str) -> Result<StatusTree, ApiError> {
        let path = format!("{}/statuses", self.path(&LbScope::LoadBalancer, Some(lb_id)));
        let value: Value = self.client.get_json(&path).await?;
        // A "null" tree is reported as an empty one.
        match value.get("statuses") {
            Some(Value::Null) | None => Ok(StatusTree::default()),
            Some(_) => unwrap_envelope(value, "statuses"),
        }
    }

    async fn get_child(&self, scope: &LbScope, id: &str) -> Result<LbResource, ApiError> {
        self.get(scope, id).await
    }

    async fn update_loadbalancer(&self, id: &str, opts: &LoadBalancerUpdate) -> Result<LbResource, ApiError> {
        self.update(&LbScope::LoadBalancer, id, opts).await
    }

    async fn create_listener(&self, opts: &ListenerCreate) -> Result<LbResource, ApiError> {
        self.create(&LbScope::Listener, opts).await
    }

    async fn update_listener(&self, id: &str, opts: &ListenerUpdate) -> Result<LbResource, ApiError> {
        self.update(&LbScope::Listener, id, opts).await
    }

    async fn create_monitor(&self, opts: &MonitorCreate) -> Result<LbResource, ApiError> {
        self.create(&LbScope::Monitor, opts).await
    }

    async fn update_monitor(&self, id: &str, opts: &MonitorUpdate) -> Result<LbResource, ApiError> {
        self.update(&LbScope::Monitor, id, opts).await
    }

    async fn delete_child(&self, scope: &LbScope, id: &str) -> Result<(), ApiError> {
        self.client.delete(&self.path(scope, Some(id))).await
    }
}
