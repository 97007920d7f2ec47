use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use {
    switchboard_contacts::ContactResolver,
    switchboard_messages::MessageStore,
    tokio::sync::{RwLock, mpsc},
};

#[cfg(feature = "metrics")]
use switchboard_metrics::MetricsHandle;

// ── Client session ───────────────────────────────────────────────────────────

/// A WebSocket client currently connected to the gateway.
#[derive(Debug)]
pub struct ClientSession {
    pub session_id: String,
    /// Channel for sending serialized frames to this client's write loop.
    pub sender: mpsc::UnboundedSender<String>,
    pub subscribed_instances: HashSet<String>,
    /// Fixed by the first successful subscription.
    pub workspace_id: Option<String>,
    pub connected_at: Instant,
}

impl ClientSession {
    pub fn new(session_id: impl Into<String>, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            session_id: session_id.into(),
            sender,
            subscribed_instances: HashSet::new(),
            workspace_id: None,
            connected_at: Instant::now(),
        }
    }

    /// Send a serialized JSON frame to this client.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Rooms ────────────────────────────────────────────────────────────────────

/// A broadcast group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Room<'a> {
    Instance(&'a str),
    Workspace(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    #[error("instanceName is required")]
    MissingInstance,

    #[error("workspaceUuid is required")]
    MissingWorkspace,

    #[error("session is bound to workspace '{bound}'")]
    WorkspaceMismatch { bound: String },

    #[error("unknown session")]
    UnknownSession,
}

#[derive(Default)]
struct Rooms {
    sessions: HashMap<String, ClientSession>,
    /// Derived from `sessions[*].subscribed_instances`.
    instance_rooms: HashMap<String, HashSet<String>>,
    workspace_rooms: HashMap<String, HashSet<String>>,
}

impl Rooms {
    fn members(&self, room: Room<'_>) -> Option<&HashSet<String>> {
        match room {
            Room::Instance(name) => self.instance_rooms.get(name),
            Room::Workspace(id) => self.workspace_rooms.get(id),
        }
    }
}

fn leave(rooms: &mut HashMap<String, HashSet<String>>, room: &str, session_id: &str) {
    if let Some(members) = rooms.get_mut(room) {
        members.remove(session_id);
        if members.is_empty() {
            rooms.remove(room);
        }
    }
}

/// Session registry and room index.
///
/// Room membership is only reachable through these methods. Every mutation
/// and every room send takes the single lock, so a session removed here is
/// never the target of a send that starts afterwards.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Rooms>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, session: ClientSession) {
        let mut inner = self.inner.write().await;
        inner.sessions.insert(session.session_id.clone(), session);
    }

    /// Join the instance room and the workspace room. Returns `false` when the
    /// session was already subscribed to `instance_name`.
    pub async fn subscribe(
        &self,
        session_id: &str,
        instance_name: &str,
        workspace_id: &str,
    ) -> Result<bool, SubscribeError> {
        let instance_name = instance_name.trim();
        let workspace_id = workspace_id.trim();
        if instance_name.is_empty() {
            return Err(SubscribeError::MissingInstance);
        }
        if workspace_id.is_empty() {
            return Err(SubscribeError::MissingWorkspace);
        }

        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or(SubscribeError::UnknownSession)?;
        if let Some(bound) = session.workspace_id.as_deref()
            && bound != workspace_id
        {
            return Err(SubscribeError::WorkspaceMismatch {
                bound: bound.to_string(),
            });
        }
        session
            .workspace_id
            .get_or_insert_with(|| workspace_id.to_string());
        let added = session
            .subscribed_instances
            .insert(instance_name.to_string());

        inner
            .instance_rooms
            .entry(instance_name.to_string())
            .or_default()
            .insert(session_id.to_string());
        inner
            .workspace_rooms
            .entry(workspace_id.to_string())
            .or_default()
            .insert(session_id.to_string());
        Ok(added)
    }

    /// Leave an instance room. Returns `false` when not subscribed.
    pub async fn unsubscribe(&self, session_id: &str, instance_name: &str) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner
            .sessions
            .get_mut(session_id)
            .is_some_and(|s| s.subscribed_instances.remove(instance_name));
        if removed {
            leave(&mut inner.instance_rooms, instance_name, session_id);
        }
        removed
    }

    /// Remove a session from every room and drop it.
    pub async fn remove(&self, session_id: &str) -> Option<ClientSession> {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.remove(session_id)?;
        for instance in &session.subscribed_instances {
            leave(&mut inner.instance_rooms, instance, session_id);
        }
        if let Some(workspace) = &session.workspace_id {
            leave(&mut inner.workspace_rooms, workspace, session_id);
        }
        Some(session)
    }

    /// Queue `frame` for every member of `room` except `exclude`.
    /// Returns the number of sessions it was queued for.
    pub async fn send_to_room(&self, room: Room<'_>, frame: &str, exclude: Option<&str>) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.members(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|id| exclude != Some(id.as_str()))
            .filter_map(|id| inner.sessions.get(id))
            .filter(|session| session.send(frame))
            .count()
    }

    /// Queue `frame` for one session.
    pub async fn send_to(&self, session_id: &str, frame: &str) -> bool {
        self.inner
            .read()
            .await
            .sessions
            .get(session_id)
            .is_some_and(|s| s.send(frame))
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn room_size(&self, room: Room<'_>) -> usize {
        self.inner.read().await.members(room).map_or(0, HashSet::len)
    }

    pub async fn is_subscribed(&self, session_id: &str, instance_name: &str) -> bool {
        self.inner
            .read()
            .await
            .sessions
            .get(session_id)
            .is_some_and(|s| s.subscribed_instances.contains(instance_name.trim()))
    }

    /// The room index equals the union of each session's subscriptions.
    #[cfg(test)]
    async fn index_is_consistent(&self) -> bool {
        let inner = self.inner.read().await;
        let mut derived: HashMap<String, HashSet<String>> = HashMap::new();
        for session in inner.sessions.values() {
            for instance in &session.subscribed_instances {
                derived
                    .entry(instance.clone())
                    .or_default()
                    .insert(session.session_id.clone());
            }
        }
        derived == inner.instance_rooms
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Runtime knobs with defaults suitable for tests.
pub struct GatewayOptions {
    pub max_payload_bytes: usize,
    pub cors_origins: Vec<String>,
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<MetricsHandle>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            max_payload_bytes: switchboard_protocol::MAX_PAYLOAD_BYTES,
            cors_origins: Vec::new(),
            #[cfg(feature = "metrics")]
            metrics_handle: None,
        }
    }
}

impl From<&switchboard_config::RealtimeConfig> for GatewayOptions {
    fn from(config: &switchboard_config::RealtimeConfig) -> Self {
        Self {
            max_payload_bytes: config.max_payload_bytes,
            cors_origins: config.cors_origins.clone(),
            ..Self::default()
        }
    }
}

/// Shared gateway runtime state.
pub struct GatewayState {
    pub sessions: SessionRegistry,
    pub messages: Arc<dyn MessageStore>,
    pub contacts: ContactResolver,
    pub max_payload_bytes: usize,
    pub cors_origins: Vec<String>,
    pub version: String,
    seq: AtomicU64,
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<MetricsHandle>,
}

impl GatewayState {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        contacts: ContactResolver,
        options: GatewayOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: SessionRegistry::new(),
            messages,
            contacts,
            max_payload_bytes: options.max_payload_bytes,
            cors_origins: options.cors_origins,
            version: env!("CARGO_PKG_VERSION").to_string(),
            seq: AtomicU64::new(0),
            #[cfg(feature = "metrics")]
            metrics_handle: options.metrics_handle,
        })
    }

    /// Next frame sequence number, starting at 1.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}
