//! Kubernetes node groups.
//!
//! A node group lives inside a cluster; its resource id is the composite
//! `clusterId/nodeGroupId` minted at creation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::config::OperationTimeouts;
use crate::error::Result;
use crate::fault::check_deleted;
use crate::identity::{self, CompositeId, normalize_child_ref};
use crate::observer::{DELETED, Observation, Observer};
use crate::poller::{OperationSpec, wait_for};
use crate::retry::{RetryPolicy, retry_on_transient};
use crate::transport::{ApiError, RestClient};

pub const CREATE_IN_PROGRESS: &str = "CREATE_IN_PROGRESS";
pub const CREATE_COMPLETE: &str = "CREATE_COMPLETE";
pub const UPDATE_IN_PROGRESS: &str = "UPDATE_IN_PROGRESS";
pub const UPDATE_COMPLETE: &str = "UPDATE_COMPLETE";
pub const DELETE_IN_PROGRESS: &str = "DELETE_IN_PROGRESS";
pub const DELETE_COMPLETE: &str = "DELETE_COMPLETE";

/// Node group whose upgrade is tracked on the cluster rather than on itself.
pub const DEFAULT_MASTER: &str = "default-master";

/// Delay and poll interval per operation.
pub const CREATE_TIMING: (Duration, Duration) = (Duration::from_secs(60), Duration::from_secs(20));
pub const UPDATE_TIMING: (Duration, Duration) = (Duration::from_secs(60), Duration::from_secs(20));
pub const UPGRADE_TIMING: (Duration, Duration) = (Duration::from_secs(120), Duration::from_secs(30));
pub const DELETE_TIMING: (Duration, Duration) = (Duration::from_secs(30), Duration::from_secs(10));
pub const CLUSTER_TIMING: (Duration, Duration) = (Duration::from_secs(30), Duration::from_secs(10));

/// Upper bound on waiting for a busy cluster before touching its node groups.
pub const CLUSTER_SETTLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeGroup {
    pub uuid: String,
    pub name: String,
    pub status: String,
    pub status_reason: Option<String>,
    pub node_count: u32,
    pub min_node_count: u32,
    pub max_node_count: Option<u32>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Cluster {
    pub uuid: String,
    pub name: String,
    pub status: String,
    pub status_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeGroupCreate {
    pub name: String,
    pub flavor_id: String,
    pub image_id: String,
    pub node_count: u32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeGroupUpgrade {
    pub version: String,
    pub num_max_unavailable_nodes: u32,
    pub num_buffer_nodes: u32,
}

/// One JSON-patch `replace` operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOp {
    pub op: &'static str,
    pub path: String,
    pub value: serde_json::Value,
}

impl PatchOp {
    pub fn replace(field: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            op: "replace",
            path: format!("/{field}"),
            value: value.into(),
        }
    }
}

#[async_trait]
pub trait NodeGroupApi: Send + Sync {
    async fn get_cluster(&self, cluster_id: &str) -> std::result::Result<Cluster, ApiError>;

    async fn get(&self, cluster_id: &str, node_group_id: &str) -> std::result::Result<NodeGroup, ApiError>;

    async fn create(&self, cluster_id: &str, opts: &NodeGroupCreate) -> std::result::Result<NodeGroup, ApiError>;

    async fn patch(
        &self,
        cluster_id: &str,
        node_group_id: &str,
        ops: &[PatchOp],
    ) -> std::result::Result<NodeGroup, ApiError>;

    async fn resize(&self, cluster_id: &str, node_group_id: &str, node_count: u32) -> std::result::Result<(), ApiError>;

    async fn upgrade(
        &self,
        cluster_id: &str,
        node_group_id: &str,
        opts: &NodeGroupUpgrade,
    ) -> std::result::Result<(), ApiError>;

    async fn delete(&self, cluster_id: &str, node_group_id: &str) -> std::result::Result<(), ApiError>;
}

/// Container-infra v1 REST client.
#[derive(Clone)]
pub struct RestNodeGroupApi {
    client: RestClient,
}

impl RestNodeGroupApi {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

fn node_group_path(cluster_id: &str, node_group_id: &str) -> String {
    format!("v1/clusters/{cluster_id}/nodegroups/{node_group_id}")
}

#[async_trait]
impl NodeGroupApi for RestNodeGroupApi {
    async fn get_cluster(&self, cluster_id: &str) -> std::result::Result<Cluster, ApiError> {
        self.client.get_json(&format!("v1/clusters/{cluster_id}")).await
    }

    async fn get(&self, cluster_id: &str, node_group_id: &str) -> std::result::Result<NodeGroup, ApiError> {
        self.client.get_json(&node_group_path(cluster_id, node_group_id)).await
    }

    async fn create(&self, cluster_id: &str, opts: &NodeGroupCreate) -> std::result::Result<NodeGroup, ApiError> {
        self.client
            .post_json(&format!("v1/clusters/{cluster_id}/nodegroups"), opts)
            .await
    }

    async fn patch(
        &self,
        cluster_id: &str,
        node_group_id: &str,
        ops: &[PatchOp],
    ) -> std::result::Result<NodeGroup, ApiError> {
        self.client
            .patch_json(&node_group_path(cluster_id, node_group_id), ops)
            .await
    }

    async fn resize(&self, cluster_id: &str, node_group_id: &str, node_count: u32) -> std::result::Result<(), ApiError> {
        let body = json!({ "node_count": node_count, "nodegroup": node_group_id });
        let _: serde_json::Value = self
            .client
            .post_json(&format!("v1/clusters/{cluster_id}/actions/resize"), &body)
            .await?;
        Ok(())
    }

    async fn upgrade(
        &self,
        cluster_id: &str,
        node_group_id: &str,
        opts: &NodeGroupUpgrade,
    ) -> std::result::Result<(), ApiError> {
        let path = format!("{}/upgrade", node_group_path(cluster_id, node_group_id));
        let _: serde_json::Value = self.client.post_json(&path, opts).await?;
        Ok(())
    }

    async fn delete(&self, cluster_id: &str, node_group_id: &str) -> std::result::Result<(), ApiError> {
        self.client.delete(&node_group_path(cluster_id, node_group_id)).await
    }
}

/// Probes a node group by composite id.
pub struct NodeGroupObserver {
    api: Arc<dyn NodeGroupApi>,
}

impl NodeGroupObserver {
    pub fn new(api: Arc<dyn NodeGroupApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Observer for NodeGroupObserver {
    type Object = NodeGroup;

    async fn observe(&self, id: &str) -> std::result::Result<Observation<NodeGroup>, ApiError> {
        let (cluster_id, node_group_id) =
            identity::decode(id).map_err(|e| ApiError::malformed(e.to_string()))?;
        let group = self.api.get(&cluster_id, &node_group_id).await?;
        let (status, reason) = (group.status.clone(), failure_reason(&group.status, &group.status_reason));
        Ok(with_reason(Observation::new(group, status), reason))
    }
}

/// Probes a cluster by id. Used to wait out cluster-level operations that
/// block node-group changes.
pub struct ClusterObserver {
    api: Arc<dyn NodeGroupApi>,
}

impl ClusterObserver {
    pub fn new(api: Arc<dyn NodeGroupApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Observer for ClusterObserver {
    type Object = Cluster;

    async fn observe(&self, id: &str) -> std::result::Result<Observation<Cluster>, ApiError> {
        let cluster = self.api.get_cluster(id).await?;
        let (status, reason) = (cluster.status.clone(), failure_reason(&cluster.status, &cluster.status_reason));
        Ok(with_reason(Observation::new(cluster, status), reason))
    }
}

fn failure_reason(status: &str, reason: &Option<String>) -> Option<String> {
    status.ends_with("_FAILED").then(|| reason.clone()).flatten()
}

fn with_reason<T>(observation: Observation<T>, reason: Option<String>) -> Observation<T> {
    match reason {
        Some(reason) => observation.with_reason(reason),
        None => observation,
    }
}

pub struct NodeGroupController {
    api: Arc<dyn NodeGroupApi>,
    timeouts: OperationTimeouts,
}

impl NodeGroupController {
    pub fn new(api: Arc<dyn NodeGroupApi>, timeouts: OperationTimeouts) -> Self {
        Self { api, timeouts }
    }

    pub fn observer(&self) -> NodeGroupObserver {
        NodeGroupObserver::new(Arc::clone(&self.api))
    }

    pub fn cluster_observer(&self) -> ClusterObserver {
        ClusterObserver::new(Arc::clone(&self.api))
    }

    fn spec(target: &[&str], pending: &[&str], timeout: Duration, (delay, interval): (Duration, Duration)) -> OperationSpec {
        OperationSpec::new(target.iter().copied(), timeout)
            .with_pending(pending.iter().copied())
            .with_initial_delay(delay)
            .with_poll_interval(interval)
    }

    /// Create a node group and wait for it. Returns its composite id.
    pub async fn create(
        &self,
        cluster_id: &str,
        opts: &NodeGroupCreate,
        cancel: &CancelSignal,
    ) -> Result<(CompositeId, NodeGroup)> {
        let timeout = self.timeouts.create();
        let spec = Self::spec(&[CREATE_COMPLETE], &[CREATE_IN_PROGRESS], timeout, CREATE_TIMING);
        spec.validate()?;

        let created = retry_on_transient(&RetryPolicy::new(timeout), cancel, || {
            self.api.create(cluster_id, opts)
        })
        .await?;

        let id = CompositeId::new(cluster_id, created.uuid.clone());
        debug!(%id, "node group created");

        let done = wait_for(&spec, &self.observer(), &id.encode(), cancel).await?;
        Ok((id, done.object.unwrap_or(created)))
    }

    /// Look up a node group by composite id or bare node-group id.
    pub async fn get(&self, cluster_id: &str, reference: &str) -> Result<NodeGroup> {
        let node_group_id = normalize_child_ref(reference);
        Ok(self.api.get(cluster_id, node_group_id).await?)
    }

    /// Change autoscaling bounds. Does not wait; the control plane applies
    /// bounds without a status transition.
    pub async fn update_bounds(
        &self,
        id: &str,
        min_node_count: Option<u32>,
        max_node_count: Option<u32>,
        cancel: &CancelSignal,
    ) -> Result<Option<NodeGroup>> {
        let mut ops = Vec::new();
        if let Some(min) = min_node_count {
            ops.push(PatchOp::replace("min_node_count", min));
        }
        if let Some(max) = max_node_count {
            ops.push(PatchOp::replace("max_node_count", max));
        }
        if ops.is_empty() {
            return Ok(None);
        }

        let id: CompositeId = id.parse()?;
        let updated = retry_on_transient(&RetryPolicy::new(self.timeouts.update()), cancel, || {
            self.api.patch(id.parent(), id.child(), &ops)
        })
        .await?;
        Ok(Some(updated))
    }

    /// Resize to `node_count` nodes and wait for the update to finish.
    pub async fn resize(&self, id: &str, node_count: u32, cancel: &CancelSignal) -> Result<NodeGroup> {
        let id: CompositeId = id.parse()?;
        let timeout = self.timeouts.update();
        let spec = Self::spec(&[UPDATE_COMPLETE], &[UPDATE_IN_PROGRESS], timeout, UPDATE_TIMING);
        spec.validate()?;

        retry_on_transient(&RetryPolicy::new(timeout), cancel, || {
            self.api.resize(id.parent(), id.child(), node_count)
        })
        .await?;

        let done = wait_for(&spec, &self.observer(), &id.encode(), cancel).await?;
        Ok(done.object.unwrap_or_default())
    }

    /// Wait until no cluster-level create or update is running.
    pub async fn wait_cluster_stable(&self, cluster_id: &str, cancel: &CancelSignal) -> Result<Cluster> {
        let spec = Self::spec(
            &[UPDATE_COMPLETE, CREATE_COMPLETE],
            &[UPDATE_IN_PROGRESS, CREATE_IN_PROGRESS],
            CLUSTER_SETTLE_TIMEOUT,
            CLUSTER_TIMING,
        );
        let done = wait_for(&spec, &self.cluster_observer(), cluster_id, cancel).await?;
        Ok(done.object.unwrap_or_default())
    }

    /// Upgrade the node group's Kubernetes version and wait for it.
    ///
    /// The cluster has to be idle before the upgrade is submitted. Upgrading
    /// [`DEFAULT_MASTER`] runs as a cluster update, so that wait follows the
    /// cluster; every other node group is followed directly.
    pub async fn upgrade(&self, id: &str, opts: &NodeGroupUpgrade, cancel: &CancelSignal) -> Result<NodeGroup> {
        let id: CompositeId = id.parse()?;
        let timeout = self.timeouts.update();
        let spec = Self::spec(&[UPDATE_COMPLETE], &[UPDATE_IN_PROGRESS], timeout, UPGRADE_TIMING);
        spec.validate()?;

        self.wait_cluster_stable(id.parent(), cancel).await?;
        debug!(%id, version = %opts.version, "cluster stable, upgrading node group");

        retry_on_transient(&RetryPolicy::new(timeout), cancel, || {
            self.api.upgrade(id.parent(), id.child(), opts)
        })
        .await?;

        if id.child() == DEFAULT_MASTER {
            let spec = Self::spec(&[UPDATE_COMPLETE, CREATE_COMPLETE], &[UPDATE_IN_PROGRESS], timeout, CLUSTER_TIMING);
            wait_for(&spec, &self.cluster_observer(), id.parent(), cancel).await?;
            return self.get(id.parent(), id.child()).await;
        }

        let done = wait_for(&spec, &self.observer(), &id.encode(), cancel).await?;
        Ok(done.object.unwrap_or_default())
    }

    /// Delete a node group. A node group that is already gone counts as
    /// deleted.
    pub async fn delete(&self, id: &str, cancel: &CancelSignal) -> Result<()> {
        let id: CompositeId = id.parse()?;
        let timeout = self.timeouts.delete();
        let spec = Self::spec(&[DELETE_COMPLETE, DELETED], &[DELETE_IN_PROGRESS], timeout, DELETE_TIMING);
        spec.validate()?;

        let api = &self.api;
        let (cluster_id, node_group_id) = (id.parent(), id.child());
        retry_on_transient(&RetryPolicy::new(timeout), cancel, || async move {
            check_deleted(api.delete(cluster_id, node_group_id).await)
        })
        .await?;

        wait_for(&spec, &self.observer(), &id.encode(), cancel).await?;
        debug!(%id, "node group deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_op_shape() {
        let op = serde_json::to_value(PatchOp::replace("max_node_count", 5)).unwrap();
        assert_eq!(
            op,
            json!({"op": "replace", "path": "/max_node_count", "value": 5})
        );
    }

    #[test]
    fn test_delete_spec_accepts_vanished_group() {
        let spec = NodeGroupController::spec(
            &[DELETE_COMPLETE, DELETED],
            &[DELETE_IN_PROGRESS],
            Duration::from_secs(60),
            DELETE_TIMING,
        );
        assert!(spec.validate().is_ok());
        assert!(spec.expects_deleted());
        assert_eq!(spec.initial_delay, Duration::from_secs(30));
    }
}
