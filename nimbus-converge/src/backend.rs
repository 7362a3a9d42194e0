//! Backend capability selection for the load-balancer family.

use std::fmt;

use crate::config::ProviderConfig;

/// Which load-balancer API a provider talks to.
///
/// Chosen once per provider and held for the lifetime of every controller
/// built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Neutron LBaaS v2, served by the networking endpoint.
    Legacy,
    /// Octavia, served by the dedicated load-balancer endpoint.
    Modern,
}

impl Backend {
    pub fn select(config: &ProviderConfig) -> Self {
        if config.use_octavia {
            Backend::Modern
        } else {
            Backend::Legacy
        }
    }

    /// Service catalog type the backend is registered under.
    pub fn service_type(self) -> &'static str {
        match self {
            Backend::Legacy => "network",
            Backend::Modern => "load-balancer",
        }
    }

    /// Path prefix for every LBaaS collection.
    pub fn lbaas_prefix(self) -> &'static str {
        match self {
            Backend::Legacy => "v2.0/lbaas",
            Backend::Modern => "v2/lbaas",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Legacy => write!(f, "neutron"),
            Backend::Modern => write!(f, "octavia"),
        }
    }
}
