//! Request options for the load-balancer family.
//!
//! Callers describe what they want with backend-neutral `*Args` and
//! `*Changes` values. [`Backend`] turns them into the matching request body:
//! legacy bodies drop the fields only the modern API understands.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::backend::Backend;

// ---------------------------------------------------------------------------
// Backend-neutral inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerArgs {
    pub loadbalancer_id: String,
    pub protocol: String,
    pub protocol_port: u16,
    pub tenant_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub default_pool_id: Option<String>,
    pub default_tls_container_ref: Option<String>,
    pub sni_container_refs: Vec<String>,
    pub admin_state_up: bool,
    pub connection_limit: Option<i32>,
    pub keepalive_timeout: Option<u32>,
    // Modern backend only.
    pub timeout_client_data: Option<u32>,
    pub timeout_member_connect: Option<u32>,
    pub timeout_member_data: Option<u32>,
    pub timeout_tcp_inspect: Option<u32>,
    pub tags: Vec<String>,
    pub insert_headers: BTreeMap<String, String>,
    pub allowed_cidrs: Vec<String>,
}

impl ListenerArgs {
    pub fn new(loadbalancer_id: impl Into<String>, protocol: impl Into<String>, port: u16) -> Self {
        Self {
            loadbalancer_id: loadbalancer_id.into(),
            protocol: protocol.into(),
            protocol_port: port,
            admin_state_up: true,
            ..Default::default()
        }
    }

    fn modern_only_fields(&self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if self.timeout_client_data.is_some() {
            set.push("timeout_client_data");
        }
        if self.timeout_member_connect.is_some() {
            set.push("timeout_member_connect");
        }
        if self.timeout_member_data.is_some() {
            set.push("timeout_member_data");
        }
        if self.timeout_tcp_inspect.is_some() {
            set.push("timeout_tcp_inspect");
        }
        if !self.tags.is_empty() {
            set.push("tags");
        }
        if !self.insert_headers.is_empty() {
            set.push("insert_headers");
        }
        if !self.allowed_cidrs.is_empty() {
            set.push("allowed_cidrs");
        }
        set
    }
}

/// Changed listener fields. `None` means unchanged; an empty list clears.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub connection_limit: Option<i32>,
    pub default_pool_id: Option<String>,
    pub default_tls_container_ref: Option<String>,
    pub sni_container_refs: Option<Vec<String>>,
    pub admin_state_up: Option<bool>,
    pub keepalive_timeout: Option<u32>,
    // Modern backend only.
    pub timeout_client_data: Option<u32>,
    pub timeout_member_connect: Option<u32>,
    pub timeout_member_data: Option<u32>,
    pub timeout_tcp_inspect: Option<u32>,
    pub insert_headers: Option<BTreeMap<String, String>>,
    pub allowed_cidrs: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorArgs {
    pub pool_id: String,
    pub monitor_type: String,
    pub delay: u32,
    pub timeout: u32,
    pub max_retries: u32,
    pub tenant_id: Option<String>,
    pub url_path: Option<String>,
    pub http_method: Option<String>,
    pub expected_codes: Option<String>,
    pub name: Option<String>,
    pub admin_state_up: bool,
    pub host_header: Option<String>,
    pub health_check_port: Option<u16>,
    // Modern backend only.
    pub max_retries_down: Option<u32>,
}

impl MonitorArgs {
    pub fn new(pool_id: impl Into<String>, monitor_type: impl Into<String>) -> Self {
        Self {
            pool_id: pool_id.into(),
            monitor_type: monitor_type.into(),
            delay: 20,
            timeout: 10,
            max_retries: 5,
            tenant_id: None,
            url_path: None,
            http_method: None,
            expected_codes: None,
            name: None,
            admin_state_up: true,
            host_header: None,
            health_check_port: None,
            max_retries_down: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorChanges {
    pub url_path: Option<String>,
    pub expected_codes: Option<String>,
    pub delay: Option<u32>,
    pub timeout: Option<u32>,
    pub max_retries: Option<u32>,
    pub admin_state_up: Option<bool>,
    pub name: Option<String>,
    pub http_method: Option<String>,
    pub health_check_port: Option<u16>,
    // Modern backend only.
    pub max_retries_down: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBalancerChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub admin_state_up: Option<bool>,
    // Modern backend only.
    pub tags: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerCreateBody {
    pub protocol: String,
    pub protocol_port: u16,
    pub loadbalancer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_pool_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_tls_container_ref: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sni_container_refs: Vec<String>,
    pub admin_state_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_timeout: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyListenerCreate {
    #[serde(flatten)]
    pub body: ListenerCreateBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModernListenerCreate {
    #[serde(flatten)]
    pub body: ListenerCreateBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_client_data: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_member_connect: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_member_data: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_tcp_inspect: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub insert_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_cidrs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ListenerCreate {
    Legacy(LegacyListenerCreate),
    Modern(ModernListenerCreate),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListenerUpdateBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_pool_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_tls_container_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni_container_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_timeout: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModernListenerUpdate {
    #[serde(flatten)]
    pub body: ListenerUpdateBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_client_data: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_member_connect: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_member_data: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_tcp_inspect: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_cidrs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ListenerUpdate {
    Legacy(ListenerUpdateBody),
    Modern(ModernListenerUpdate),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorCreateBody {
    pub pool_id: String,
    #[serde(rename = "type")]
    pub monitor_type: String,
    pub delay: u32,
    pub timeout: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_codes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub admin_state_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModernMonitorCreate {
    #[serde(flatten)]
    pub body: MonitorCreateBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries_down: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MonitorCreate {
    Legacy(MonitorCreateBody),
    Modern(ModernMonitorCreate),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorUpdateBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_codes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModernMonitorUpdate {
    #[serde(flatten)]
    pub body: MonitorUpdateBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries_down: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MonitorUpdate {
    Legacy(MonitorUpdateBody),
    Modern(ModernMonitorUpdate),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadBalancerUpdateBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModernLoadBalancerUpdate {
    #[serde(flatten)]
    pub body: LoadBalancerUpdateBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LoadBalancerUpdate {
    Legacy(LoadBalancerUpdateBody),
    Modern(ModernLoadBalancerUpdate),
}

macro_rules! backend_of {
    ($($ty:ident),+) => {
        $(
            impl $ty {
                /// Backend this body was encoded for.
                pub fn backend(&self) -> Backend {
                    match self {
                        $ty::Legacy(_) => Backend::Legacy,
                        $ty::Modern(_) => Backend::Modern,
                    }
                }
            }
        )+
    };
}

backend_of!(
    ListenerCreate,
    ListenerUpdate,
    MonitorCreate,
    MonitorUpdate,
    LoadBalancerUpdate
);

/// `Some(value)` unless `value` equals its default, i.e. nothing changed.
fn changed<T: Default + PartialEq>(value: T) -> Option<T> {
    (value != T::default()).then_some(value)
}

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

impl Backend {
    pub fn listener_create(self, args: &ListenerArgs) -> ListenerCreate {
        let body = ListenerCreateBody {
            protocol: args.protocol.clone(),
            protocol_port: args.protocol_port,
            loadbalancer_id: args.loadbalancer_id.clone(),
            name: args.name.clone(),
            description: args.description.clone(),
            default_pool_id: args.default_pool_id.clone(),
            default_tls_container_ref: args.default_tls_container_ref.clone(),
            sni_container_refs: args.sni_container_refs.clone(),
            admin_state_up: args.admin_state_up,
            connection_limit: args.connection_limit,
            keepalive_timeout: args.keepalive_timeout,
        };

        match self {
            Backend::Legacy => {
                let ignored = args.modern_only_fields();
                if !ignored.is_empty() {
                    debug!(?ignored, "listener fields not supported by {self}");
                }
                ListenerCreate::Legacy(LegacyListenerCreate {
                    body,
                    tenant_id: args.tenant_id.clone(),
                })
            }
            Backend::Modern => ListenerCreate::Modern(ModernListenerCreate {
                body,
                project_id: args.tenant_id.clone(),
                timeout_client_data: args.timeout_client_data,
                timeout_member_connect: args.timeout_member_connect,
                timeout_member_data: args.timeout_member_data,
                timeout_tcp_inspect: args.timeout_tcp_inspect,
                tags: args.tags.clone(),
                insert_headers: args.insert_headers.clone(),
                allowed_cidrs: args.allowed_cidrs.clone(),
            }),
        }
    }

    /// `None` when no field this backend understands has changed.
    pub fn listener_update(self, changes: &ListenerChanges) -> Option<ListenerUpdate> {
        let body = ListenerUpdateBody {
            name: changes.name.clone(),
            description: changes.description.clone(),
            connection_limit: changes.connection_limit,
            default_pool_id: changes.default_pool_id.clone(),
            default_tls_container_ref: changes.default_tls_container_ref.clone(),
            sni_container_refs: changes.sni_container_refs.clone(),
            admin_state_up: changes.admin_state_up,
            keepalive_timeout: changes.keepalive_timeout,
        };

        match self {
            Backend::Legacy => changed(body).map(ListenerUpdate::Legacy),
            Backend::Modern => changed(ModernListenerUpdate {
                body,
                timeout_client_data: changes.timeout_client_data,
                timeout_member_connect: changes.timeout_member_connect,
                timeout_member_data: changes.timeout_member_data,
                timeout_tcp_inspect: changes.timeout_tcp_inspect,
                insert_headers: changes.insert_headers.clone(),
                allowed_cidrs: changes.allowed_cidrs.clone(),
                tags: changes.tags.clone(),
            })
            .map(ListenerUpdate::Modern),
        }
    }

    pub fn monitor_create(self, args: &MonitorArgs) -> MonitorCreate {
        let body = MonitorCreateBody {
            pool_id: args.pool_id.clone(),
            monitor_type: args.monitor_type.clone(),
            delay: args.delay,
            timeout: args.timeout,
            max_retries: args.max_retries,
            tenant_id: args.tenant_id.clone(),
            url_path: args.url_path.clone(),
            http_method: args.http_method.clone(),
            expected_codes: args.expected_codes.clone(),
            name: args.name.clone(),
            admin_state_up: args.admin_state_up,
            host_header: args.host_header.clone(),
            health_check_port: args.health_check_port,
        };

        match self {
            Backend::Legacy => {
                if args.max_retries_down.is_some() {
                    debug!("max_retries_down is not supported by {self}");
                }
                MonitorCreate::Legacy(body)
            }
            Backend::Modern => MonitorCreate::Modern(ModernMonitorCreate {
                body,
                max_retries_down: args.max_retries_down,
            }),
        }
    }

    /// `None` when no field this backend understands has changed.
    pub fn monitor_update(self, changes: &MonitorChanges) -> Option<MonitorUpdate> {
        let body = MonitorUpdateBody {
            url_path: changes.url_path.clone(),
            expected_codes: changes.expected_codes.clone(),
            delay: changes.delay,
            timeout: changes.timeout,
            max_retries: changes.max_retries,
            admin_state_up: changes.admin_state_up,
            name: changes.name.clone(),
            http_method: changes.http_method.clone(),
            health_check_port: changes.health_check_port,
        };

        match self {
            Backend::Legacy => changed(body).map(MonitorUpdate::Legacy),
            Backend::Modern => changed(ModernMonitorUpdate {
                body,
                max_retries_down: changes.max_retries_down,
            })
            .map(MonitorUpdate::Modern),
        }
    }

    /// `None` when no field this backend understands has changed.
    pub fn loadbalancer_update(self, changes: &LoadBalancerChanges) -> Option<LoadBalancerUpdate> {
        let body = LoadBalancerUpdateBody {
            name: changes.name.clone(),
            description: changes.description.clone(),
            admin_state_up: changes.admin_state_up,
        };

        match self {
            Backend::Legacy => changed(body).map(LoadBalancerUpdate::Legacy),
            Backend::Modern => changed(ModernLoadBalancerUpdate {
                body,
                tags: changes.tags.clone(),
            })
            .map(LoadBalancerUpdate::Modern),
        }
    }
}
