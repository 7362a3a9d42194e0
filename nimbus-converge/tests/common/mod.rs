//! Shared fakes for nimbus-converge integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use nimbus_converge::lb::options::{
    ListenerCreate, ListenerUpdate, LoadBalancerUpdate, MonitorCreate, MonitorUpdate,
};
use nimbus_converge::lb::{
    LbApi, LbResource, LbScope, StatusTree, TreeLoadBalancer, TreeNode, TreePool,
};
use nimbus_converge::nas::{NasApi, NasInterface, NasVolume};
use nimbus_converge::nodegroup::{
    Cluster, DEFAULT_MASTER, NodeGroup, NodeGroupApi, NodeGroupCreate, NodeGroupUpgrade, PatchOp,
};
use nimbus_converge::{ApiError, Observation, Observer};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Marker status: the fake answers 404 for this object.
pub const GONE: &str = "GONE";

/// Status sequence; the last entry repeats forever.
#[derive(Debug, Clone, Default)]
pub struct Seq(VecDeque<String>);

impl Seq {
    pub fn of(statuses: &[&str]) -> Self {
        Self(statuses.iter().map(|s| s.to_string()).collect())
    }

    pub fn next(&mut self) -> String {
        if self.0.len() > 1 {
            self.0.pop_front().unwrap_or_default()
        } else {
            self.0.front().cloned().unwrap_or_default()
        }
    }

    pub fn peek(&self) -> &str {
        self.0.front().map(String::as_str).unwrap_or_default()
    }
}

// =============================================================================
// Scripted observer
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Status(&'static str),
    Fail(u16),
}

/// Observer that replays a fixed script; the last step repeats.
pub struct ScriptedObserver {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
}

impl ScriptedObserver {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn always(status: &'static str) -> Self {
        Self::new([Step::Status(status)])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Observer for ScriptedObserver {
    type Object = String;

    async fn observe(&self, _id: &str) -> Result<Observation<String>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front().unwrap()
            } else {
                *steps.front().expect("script must not be empty")
            }
        };
        match step {
            Step::Status(s) => Ok(Observation::new(s.to_string(), s)),
            Step::Fail(code) => Err(ApiError::with_status(code, "scripted failure")),
        }
    }
}

// =============================================================================
// Load balancer fake
// =============================================================================

#[derive(Default)]
struct LbState {
    lb: Seq,
    children: BTreeMap<String, (LbScope, Seq)>,
    create_script: Vec<String>,
    update_script: Vec<String>,
    mutation_failures: VecDeque<u16>,
    next_id: u32,
    requests: Vec<String>,
    bodies: Vec<Value>,
}

/// In-memory LBaaS serving scripted statuses.
pub struct FakeLbApi {
    state: Mutex<LbState>,
}

impl FakeLbApi {
    pub fn new(lb_statuses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LbState {
                lb: Seq::of(lb_statuses),
                create_script: vec!["PENDING_CREATE".into(), "ACTIVE".into()],
                update_script: vec!["PENDING_UPDATE".into(), "ACTIVE".into()],
                ..Default::default()
            }),
        })
    }

    pub fn with_child(self: Arc<Self>, scope: LbScope, id: &str, statuses: &[&str]) -> Arc<Self> {
        self.state
            .lock()
            .unwrap()
            .children
            .insert(id.to_string(), (scope, Seq::of(statuses)));
        self
    }

    pub fn set_lb(&self, statuses: &[&str]) {
        self.state.lock().unwrap().lb = Seq::of(statuses);
    }

    pub fn set_create_script(&self, statuses: &[&str]) {
        self.state.lock().unwrap().create_script = statuses.iter().map(|s| s.to_string()).collect();
    }

    pub fn fail_mutations(&self, codes: &[u16]) {
        self.state.lock().unwrap().mutation_failures = codes.iter().copied().collect();
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count(&self, request: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == request).count()
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.state.lock().unwrap().bodies.clone()
    }

    fn mutate<B: serde::Serialize>(&self, request: &str, body: Option<&B>) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.to_string());
        if let Some(code) = state.mutation_failures.pop_front() {
            return Err(ApiError::with_status(code, "injected failure"));
        }
        if let Some(body) = body {
            state.bodies.push(serde_json::to_value(body).unwrap());
        }
        Ok(())
    }

    fn create_child(&self, scope: LbScope, prefix: &str) -> LbResource {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("{prefix}-{}", state.next_id);
        let script: Vec<&str> = state.create_script.iter().map(String::as_str).collect();
        let seq = Seq::of(&script);
        let status = seq.peek().to_string();
        state.children.insert(id.clone(), (scope, seq));
        resource(&id, &status)
    }

    fn restart_child(&self, id: &str, script: &[&str]) {
        if let Some((_, seq)) = self.state.lock().unwrap().children.get_mut(id) {
            *seq = Seq::of(script);
        }
    }

    fn update_child(&self, id: &str) -> Result<LbResource, ApiError> {
        let script: Vec<String> = self.state.lock().unwrap().update_script.clone();
        let script: Vec<&str> = script.iter().map(String::as_str).collect();
        self.restart_child(id, &script);
        Ok(resource(id, script[0]))
    }
}

fn resource(id: &str, status: &str) -> LbResource {
    LbResource {
        id: id.to_string(),
        provisioning_status: status.to_string(),
        ..Default::default()
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::not_found(format!("{what} could not be found"))
}

#[async_trait]
impl LbApi for FakeLbApi {
    async fn get_loadbalancer(&self, id: &str) -> Result<LbResource, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push("get_loadbalancer".into());
        let status = state.lb.next();
        if status == GONE {
            return Err(not_found(id));
        }
        Ok(resource(id, &status))
    }

    async fn get_status_tree(&self, lb_id: &str) -> Result<StatusTree, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push("get_status_tree".into());
        let status = state.lb.next();
        if status == GONE {
            return Err(not_found(lb_id));
        }

        let mut listeners = Vec::new();
        let mut pool = TreePool {
            id: "pool-1".into(),
            provisioning_status: "ACTIVE".into(),
            ..Default::default()
        };
        for (id, (scope, seq)) in state.children.iter_mut() {
            let status = seq.next();
            if status == GONE {
                continue;
            }
            let node = TreeNode {
                id: id.clone(),
                provisioning_status: status,
                ..Default::default()
            };
            match scope {
                LbScope::Listener => listeners.push(node),
                LbScope::Monitor => pool.healthmonitor = Some(node),
                LbScope::Member { .. } => pool.members.push(node),
                _ => {}
            }
        }

        Ok(StatusTree {
            loadbalancer: Some(TreeLoadBalancer {
                id: lb_id.to_string(),
                provisioning_status: status,
                listeners,
                pools: vec![pool],
                ..Default::default()
            }),
        })
    }

    async fn get_child(&self, scope: &LbScope, id: &str) -> Result<LbResource, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(format!("get_{}", scope.envelope()));
        match state.children.get_mut(id) {
            Some((_, seq)) => {
                let status = seq.next();
                if status == GONE {
                    Err(not_found(id))
                } else {
                    Ok(resource(id, &status))
                }
            }
            None => Err(not_found(id)),
        }
    }

    async fn update_loadbalancer(&self, id: &str, opts: &LoadBalancerUpdate) -> Result<LbResource, ApiError> {
        self.mutate("update_loadbalancer", Some(opts))?;
        Ok(resource(id, "PENDING_UPDATE"))
    }

    async fn create_listener(&self, opts: &ListenerCreate) -> Result<LbResource, ApiError> {
        self.mutate("create_listener", Some(opts))?;
        Ok(self.create_child(LbScope::Listener, "listener"))
    }

    async fn update_listener(&self, id: &str, opts: &ListenerUpdate) -> Result<LbResource, ApiError> {
        self.mutate("update_listener", Some(opts))?;
        self.update_child(id)
    }

    async fn create_monitor(&self, opts: &MonitorCreate) -> Result<LbResource, ApiError> {
        self.mutate("create_monitor", Some(opts))?;
        Ok(self.create_child(LbScope::Monitor, "monitor"))
    }

    async fn update_monitor(&self, id: &str, opts: &MonitorUpdate) -> Result<LbResource, ApiError> {
        self.mutate("update_monitor", Some(opts))?;
        self.update_child(id)
    }

    async fn delete_child(&self, scope: &LbScope, id: &str) -> Result<(), ApiError> {
        self.mutate::<()>(&format!("delete_{}", scope.envelope()), None)?;
        let known = self.state.lock().unwrap().children.contains_key(id);
        if !known {
            return Err(not_found(id));
        }
        self.restart_child(id, &["PENDING_DELETE", GONE]);
        Ok(())
    }
}

// =============================================================================
// NAS fake
// =============================================================================

#[derive(Default)]
struct NasState {
    volumes: HashMap<String, BTreeMap<String, Seq>>,
    create_script: Vec<String>,
    next_id: u32,
    /// Connects issued while another interface on the same volume was
    /// still building.
    conflicts: u32,
    requests: Vec<String>,
}

pub struct FakeNasApi {
    state: Mutex<NasState>,
}

impl FakeNasApi {
    pub fn new(volumes: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(NasState {
                volumes: volumes.iter().map(|v| (v.to_string(), BTreeMap::new())).collect(),
                create_script: vec!["BUILDING".into(), "ACTIVE".into()],
                ..Default::default()
            }),
        })
    }

    pub fn set_create_script(&self, statuses: &[&str]) {
        self.state.lock().unwrap().create_script = statuses.iter().map(|s| s.to_string()).collect();
    }

    pub fn conflicts(&self) -> u32 {
        self.state.lock().unwrap().conflicts
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl NasApi for FakeNasApi {
    async fn get_volume(&self, volume_id: &str) -> Result<NasVolume, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(format!("get_volume {volume_id}"));
        let Some(interfaces) = state.volumes.get_mut(volume_id) else {
            return Err(not_found(volume_id));
        };
        let interfaces = interfaces
            .iter_mut()
            .filter_map(|(id, seq)| {
                let status = seq.next();
                (status != GONE).then(|| NasInterface {
                    id: id.clone(),
                    status,
                    ..Default::default()
                })
            })
            .collect();
        Ok(NasVolume {
            id: volume_id.to_string(),
            interfaces,
            ..Default::default()
        })
    }

    async fn connect_interface(&self, volume_id: &str, subnet_id: &str) -> Result<NasInterface, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(format!("connect {volume_id}"));
        state.next_id += 1;
        let id = format!("if-{}", state.next_id);
        let script: Vec<String> = state.create_script.clone();
        let script: Vec<&str> = script.iter().map(String::as_str).collect();

        let Some(interfaces) = state.volumes.get_mut(volume_id) else {
            return Err(not_found(volume_id));
        };
        let busy = interfaces.values().any(|seq| seq.peek() == "BUILDING");
        interfaces.insert(id.clone(), Seq::of(&script));
        if busy {
            state.conflicts += 1;
        }

        Ok(NasInterface {
            id,
            status: script[0].to_string(),
            subnet_id: subnet_id.to_string(),
            ..Default::default()
        })
    }

    async fn delete_interface(&self, volume_id: &str, interface_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(format!("delete {volume_id}/{interface_id}"));
        let seq = state
            .volumes
            .get_mut(volume_id)
            .and_then(|interfaces| interfaces.get_mut(interface_id))
            .ok_or_else(|| not_found(interface_id))?;
        *seq = Seq::of(&["DELETING", GONE]);
        Ok(())
    }
}

// =============================================================================
// Node group fake
// =============================================================================

#[derive(Default)]
struct NodeGroupState {
    clusters: HashMap<String, Seq>,
    groups: HashMap<(String, String), (NodeGroup, Seq)>,
    next_id: u32,
    requests: Vec<String>,
}

pub struct FakeNodeGroupApi {
    state: Mutex<NodeGroupState>,
}

impl FakeNodeGroupApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(NodeGroupState::default()),
        })
    }

    pub fn script(&self, cluster_id: &str, node_group_id: &str, statuses: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .groups
            .entry((cluster_id.to_string(), node_group_id.to_string()))
            .or_insert_with(|| {
                (
                    NodeGroup {
                        uuid: node_group_id.to_string(),
                        ..Default::default()
                    },
                    Seq::default(),
                )
            });
        entry.1 = Seq::of(statuses);
    }

    pub fn script_cluster(&self, cluster_id: &str, statuses: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.clusters.insert(cluster_id.to_string(), Seq::of(statuses));
    }

    pub fn set_reason(&self, cluster_id: &str, node_group_id: &str, reason: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some((group, _)) = state
            .groups
            .get_mut(&(cluster_id.to_string(), node_group_id.to_string()))
        {
            group.status_reason = Some(reason.to_string());
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl NodeGroupApi for FakeNodeGroupApi {
    async fn get_cluster(&self, cluster_id: &str) -> Result<Cluster, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(format!("get cluster {cluster_id}"));
        let seq = state
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| not_found(cluster_id))?;
        Ok(Cluster {
            uuid: cluster_id.to_string(),
            status: seq.next(),
            ..Default::default()
        })
    }

    async fn get(&self, cluster_id: &str, node_group_id: &str) -> Result<NodeGroup, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(format!("get {cluster_id}/{node_group_id}"));
        let (group, seq) = state
            .groups
            .get_mut(&(cluster_id.to_string(), node_group_id.to_string()))
            .ok_or_else(|| not_found(node_group_id))?;
        let status = seq.next();
        if status == GONE {
            return Err(not_found(node_group_id));
        }
        Ok(NodeGroup {
            status,
            ..group.clone()
        })
    }

    async fn create(&self, cluster_id: &str, opts: &NodeGroupCreate) -> Result<NodeGroup, ApiError> {
        let uuid = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(format!("create {cluster_id}"));
            state.next_id += 1;
            format!("ng-{}", state.next_id)
        };
        self.script(cluster_id, &uuid, &["CREATE_IN_PROGRESS", "CREATE_COMPLETE"]);

        let mut state = self.state.lock().unwrap();
        let key = (cluster_id.to_string(), uuid.clone());
        if let Some((group, _)) = state.groups.get_mut(&key) {
            group.name = opts.name.clone();
            group.node_count = opts.node_count;
        }
        Ok(NodeGroup {
            uuid,
            name: opts.name.clone(),
            status: "CREATE_IN_PROGRESS".into(),
            node_count: opts.node_count,
            ..Default::default()
        })
    }

    async fn patch(&self, cluster_id: &str, node_group_id: &str, ops: &[PatchOp]) -> Result<NodeGroup, ApiError> {
        let mut state = self.state.lock().unwrap();
        state
            .requests
            .push(format!("patch {cluster_id}/{node_group_id} {}", ops.len()));
        let (group, seq) = state
            .groups
            .get_mut(&(cluster_id.to_string(), node_group_id.to_string()))
            .ok_or_else(|| not_found(node_group_id))?;
        for op in ops {
            let value = op.value.as_u64().unwrap_or_default() as u32;
            match op.path.as_str() {
                "/min_node_count" => group.min_node_count = value,
                "/max_node_count" => group.max_node_count = Some(value),
                _ => {}
            }
        }
        Ok(NodeGroup {
            status: seq.peek().to_string(),
            ..group.clone()
        })
    }

    async fn resize(&self, cluster_id: &str, node_group_id: &str, node_count: u32) -> Result<(), ApiError> {
        {
            let mut state = self.state.lock().unwrap();
            state
                .requests
                .push(format!("resize {cluster_id}/{node_group_id} {node_count}"));
            if let Some((group, _)) = state
                .groups
                .get_mut(&(cluster_id.to_string(), node_group_id.to_string()))
            {
                group.node_count = node_count;
            }
        }
        self.script(cluster_id, node_group_id, &["UPDATE_IN_PROGRESS", "UPDATE_COMPLETE"]);
        Ok(())
    }

    async fn upgrade(&self, cluster_id: &str, node_group_id: &str, opts: &NodeGroupUpgrade) -> Result<(), ApiError> {
        {
            let mut state = self.state.lock().unwrap();
            state
                .requests
                .push(format!("upgrade {cluster_id}/{node_group_id} {}", opts.version));
        }
        if node_group_id == DEFAULT_MASTER {
            self.script_cluster(cluster_id, &["UPDATE_IN_PROGRESS", "UPDATE_COMPLETE"]);
        } else {
            self.script(cluster_id, node_group_id, &["UPDATE_IN_PROGRESS", "UPDATE_COMPLETE"]);
        }
        Ok(())
    }

    async fn delete(&self, cluster_id: &str, node_group_id: &str) -> Result<(), ApiError> {
        let known = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(format!("delete {cluster_id}/{node_group_id}"));
            state
                .groups
                .contains_key(&(cluster_id.to_string(), node_group_id.to_string()))
        };
        if !known {
            return Err(not_found(node_group_id));
        }
        self.script(cluster_id, node_group_id, &["DELETE_IN_PROGRESS", GONE]);
        Ok(())
    }
}

// =============================================================================
// HTTP fake (modern LBaaS over a real socket)
// =============================================================================

#[derive(Default)]
pub struct CloudState {
    pub lb_status: Mutex<Seq>,
    pub listeners: Mutex<BTreeMap<String, Seq>>,
    pub post_failures: Mutex<VecDeque<u16>>,
    pub posted: Mutex<Vec<Value>>,
}

/// Minimal modern LBaaS endpoint bound to a random local port.
pub struct TestCloud {
    pub addr: SocketAddr,
    pub state: Arc<CloudState>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestCloud {
    pub async fn spawn(lb_statuses: &[&str]) -> Self {
        let state = Arc::new(CloudState {
            lb_status: Mutex::new(Seq::of(lb_statuses)),
            ..Default::default()
        });

        let router = Router::new()
            .route("/v2/lbaas/loadbalancers/{id}", get(get_loadbalancer))
            .route("/v2/lbaas/listeners", post(create_listener))
            .route(
                "/v2/lbaas/listeners/{id}",
                get(get_listener).delete(delete_listener),
            )
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            state,
            shutdown_tx,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

type Reply = (StatusCode, Json<Value>);

fn reply(code: StatusCode, body: Value) -> Reply {
    (code, Json(body))
}

async fn get_loadbalancer(State(state): State<Arc<CloudState>>, Path(id): Path<String>) -> Reply {
    let status = state.lb_status.lock().unwrap().next();
    if status == GONE {
        return reply(StatusCode::NOT_FOUND, json!({"faultstring": "not found"}));
    }
    reply(
        StatusCode::OK,
        json!({"loadbalancer": {"id": id, "provisioning_status": status}}),
    )
}

async fn create_listener(State(state): State<Arc<CloudState>>, Json(body): Json<Value>) -> Reply {
    if let Some(code) = state.post_failures.lock().unwrap().pop_front() {
        let code = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return reply(code, json!({"faultstring": "injected"}));
    }
    state.posted.lock().unwrap().push(body);

    let mut listeners = state.listeners.lock().unwrap();
    let id = format!("listener-{}", listeners.len() + 1);
    listeners.insert(id.clone(), Seq::of(&["PENDING_CREATE", "ACTIVE"]));
    reply(
        StatusCode::CREATED,
        json!({"listener": {"id": id, "provisioning_status": "PENDING_CREATE"}}),
    )
}

async fn get_listener(State(state): State<Arc<CloudState>>, Path(id): Path<String>) -> Reply {
    let mut listeners = state.listeners.lock().unwrap();
    match listeners.get_mut(&id).map(Seq::next) {
        Some(status) if status != GONE => reply(
            StatusCode::OK,
            json!({"listener": {"id": id, "provisioning_status": status}}),
        ),
        _ => reply(StatusCode::NOT_FOUND, json!({"faultstring": "not found"})),
    }
}

async fn delete_listener(State(state): State<Arc<CloudState>>, Path(id): Path<String>) -> StatusCode {
    let mut listeners = state.listeners.lock().unwrap();
    match listeners.get_mut(&id) {
        Some(seq) => {
            *seq = Seq::of(&["PENDING_DELETE", GONE]);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}
