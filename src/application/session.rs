//! Per-session state and the registry that owns it.
//!
//! Each session sits behind its own async mutex, held for a whole
//! interaction, so one session handles one request at a time while other
//! sessions proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{ports::VectorStore, Conversation, DomainError, Notation};

pub struct SessionContext {
    pub id: Uuid,
    pub notation: Notation,
    pub subject: String,
    pub index: Option<Arc<dyn VectorStore>>,
    pub history: Conversation,
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            notation: Notation::Ladder,
            subject: String::new(),
            index: None,
            history: Conversation::new(),
            created_at: Utc::now(),
        }
    }

    pub fn indexed_chunks(&self) -> usize {
        self.index.as_ref().map_or(0, |index| index.len())
    }
}

/// Registry entry: the locked context plus an activity clock the sweeper can
/// read without waiting on a running interaction.
pub struct SessionHandle {
    context: Mutex<SessionContext>,
    last_active: std::sync::Mutex<Instant>,
}

impl SessionHandle {
    fn new(id: Uuid) -> Self {
        Self {
            context: Mutex::new(SessionContext::new(id)),
            last_active: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn context(&self) -> &Mutex<SessionContext> {
        &self.context
    }

    pub fn touch(&self) {
        if let Ok(mut last) = self.last_active.lock() {
            *last = Instant::now();
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(SessionHandle::new(id)));
        debug!(session_id = %id, "session created");
        id
    }

    /// Looks up a session and marks it active.
    pub async fn get(&self, id: Uuid) -> Result<Arc<SessionHandle>, DomainError> {
        let handle = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("session {id}")))?;
        handle.touch();
        Ok(handle)
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops sessions idle for longer than `ttl`. A session in the middle of
    /// an interaction is never dropped.
    pub async fn purge_expired(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, handle| {
            let busy = handle.context.try_lock().is_err();
            busy || handle.idle_for() <= ttl
        });

        let purged = before - sessions.len();
        if purged > 0 {
            info!(purged, remaining = sessions.len(), "expired sessions removed");
        }
        purged
    }

    /// Periodically purges idle sessions until the runtime shuts down.
    pub fn spawn_sweeper(self: Arc<Self>, ttl: Duration, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(ttl_secs = ttl.as_secs(), "session sweeper started");
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                self.purge_expired(ttl).await;
            }
        })
    }
}
