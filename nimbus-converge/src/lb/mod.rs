//! Load-balancer operation family.
//!
//! Every operation exists in both backends. The [`Backend`](crate::backend::Backend)
//! picks the option encoding and the observer; the status vocabulary handed
//! to the poller is the same for both.

pub mod api;
pub mod controller;
pub mod observer;
pub mod options;

use std::fmt;

use serde::Deserialize;

pub use crate::observer::DELETED;

pub use api::{LbApi, RestLbApi};
pub use controller::LoadBalancerController;
pub use observer::{LbObserver, LegacyTreeObserver, ModernObserver};
pub use options::{
    ListenerArgs, ListenerChanges, ListenerCreate, ListenerUpdate, LoadBalancerChanges,
    LoadBalancerUpdate, MonitorArgs, MonitorChanges, MonitorCreate, MonitorUpdate,
};

pub const ACTIVE: &str = "ACTIVE";
pub const ERROR: &str = "ERROR";
pub const PENDING_CREATE: &str = "PENDING_CREATE";
pub const PENDING_UPDATE: &str = "PENDING_UPDATE";
pub const PENDING_DELETE: &str = "PENDING_DELETE";

/// Statuses a load balancer passes through while applying a change.
pub fn lb_pending() -> [&'static str; 2] {
    [PENDING_CREATE, PENDING_UPDATE]
}

/// Statuses a component may report before its deletion is visible.
pub fn lb_pending_delete() -> [&'static str; 4] {
    [ERROR, PENDING_UPDATE, PENDING_DELETE, ACTIVE]
}

/// Parent statuses that say nothing about a child; the child must be probed.
pub fn lb_skip() -> [&'static str; 2] {
    [ERROR, ACTIVE]
}

pub(crate) fn is_skip(status: &str) -> bool {
    lb_skip().contains(&status)
}

/// Map a raw provisioning status onto the shared vocabulary.
pub fn normalize_status(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Component kinds addressable below a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LbScope {
    LoadBalancer,
    Listener,
    Pool,
    Monitor,
    Member { pool_id: String },
}

impl LbScope {
    /// Response envelope key for a single object of this kind.
    pub fn envelope(&self) -> &'static str {
        match self {
            LbScope::LoadBalancer => "loadbalancer",
            LbScope::Listener => "listener",
            LbScope::Pool => "pool",
            LbScope::Monitor => "healthmonitor",
            LbScope::Member { .. } => "member",
        }
    }

    /// Collection path relative to the LBaaS prefix.
    pub fn collection(&self) -> String {
        match self {
            LbScope::LoadBalancer => "loadbalancers".to_string(),
            LbScope::Listener => "listeners".to_string(),
            LbScope::Pool => "pools".to_string(),
            LbScope::Monitor => "healthmonitors".to_string(),
            LbScope::Member { pool_id } => format!("pools/{pool_id}/members"),
        }
    }
}

impl fmt::Display for LbScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LbScope::LoadBalancer => write!(f, "load balancer"),
            LbScope::Listener => write!(f, "listener"),
            LbScope::Pool => write!(f, "pool"),
            LbScope::Monitor => write!(f, "monitor"),
            LbScope::Member { pool_id } => write!(f, "member of pool {pool_id}"),
        }
    }
}

/// Any LBaaS object, reduced to what convergence needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LbResource {
    pub id: String,
    pub name: String,
    pub provisioning_status: String,
    pub operating_status: String,
}

/// `GET loadbalancers/{id}/statuses` payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusTree {
    pub loadbalancer: Option<TreeLoadBalancer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TreeLoadBalancer {
    pub id: String,
    pub name: String,
    pub provisioning_status: String,
    pub operating_status: String,
    pub listeners: Vec<TreeNode>,
    pub pools: Vec<TreePool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TreePool {
    pub id: String,
    pub name: String,
    pub provisioning_status: String,
    pub operating_status: String,
    pub healthmonitor: Option<TreeNode>,
    pub members: Vec<TreeNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub provisioning_status: String,
    pub operating_status: String,
}

impl From<&TreeNode> for LbResource {
    fn from(node: &TreeNode) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            provisioning_status: node.provisioning_status.clone(),
            operating_status: node.operating_status.clone(),
        }
    }
}

impl From<&TreePool> for LbResource {
    fn from(pool: &TreePool) -> Self {
        Self {
            id: pool.id.clone(),
            name: pool.name.clone(),
            provisioning_status: pool.provisioning_status.clone(),
            operating_status: pool.operating_status.clone(),
        }
    }
}

impl From<&TreeLoadBalancer> for LbResource {
    fn from(lb: &TreeLoadBalancer) -> Self {
        Self {
            id: lb.id.clone(),
            name: lb.name.clone(),
            provisioning_status: lb.provisioning_status.clone(),
            operating_status: lb.operating_status.clone(),
        }
    }
}

impl TreeLoadBalancer {
    /// Locate a component in the tree. Entries without a provisioning status
    /// are treated as absent.
    pub fn find(&self, scope: &LbScope, id: &str) -> Option<LbResource> {
        let hit = match scope {
            LbScope::LoadBalancer => (self.id == id).then(|| LbResource::from(self)),
            LbScope::Listener => self
                .listeners
                .iter()
                .find(|l| l.id == id)
                .map(LbResource::from),
            LbScope::Pool => self.pools.iter().find(|p| p.id == id).map(LbResource::from),
            LbScope::Monitor => self
                .pools
                .iter()
                .filter_map(|p| p.healthmonitor.as_ref())
                .find(|m| m.id == id)
                .map(LbResource::from),
            LbScope::Member { .. } => self
                .pools
                .iter()
                .flat_map(|p| p.members.iter())
                .find(|m| m.id == id)
                .map(LbResource::from),
        };
        hit.filter(|r| !r.provisioning_status.is_empty())
    }
}
