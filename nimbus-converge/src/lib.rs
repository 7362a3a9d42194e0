//! Convergence core for eventually-consistent cloud control planes.
//!
//! Controllers issue a mutating call through [`retry::retry_on_transient`],
//! then hand the resulting identity to [`poller::wait_for`], which drives an
//! [`observer::Observer`] until the resource settles. The load-balancer
//! family runs against one of two backends picked by [`backend::Backend`].

pub mod backend;
pub mod cancel;
pub mod config;
pub mod error;
pub mod fault;
pub mod identity;
pub mod lb;
pub mod lock;
pub mod nas;
pub mod nodegroup;
pub mod observer;
pub mod poller;
pub mod retry;
pub mod transport;

pub use backend::Backend;
pub use cancel::{CancelSignal, Canceller, cancel_pair};
pub use config::{ConfigError, OperationTimeouts, ProviderConfig};
pub use error::{ConvergeError, Result};
pub use fault::{Classify, FaultClass, check_deleted, classify};
pub use identity::{CompositeId, IdentityError, normalize_child_ref};
pub use lock::{KeyGuard, LockRegistry};
pub use observer::{DELETED, Observation, Observer};
pub use poller::{Converged, OperationSpec, UnexpectedStatus, WaitFailure, wait_for, wait_for_with_last};
pub use retry::{RetryPolicy, retry_on_transient};
pub use transport::{ApiError, RestClient};
