use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use shipwright_core::session::Session;

/// Trait for session persistence. Implemented by `JsonSessionStore` and
/// `MemorySessionStore` (tests).
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<Session>>;
    async fn save(&self, session: &Session) -> Result<()>;
}

/// One JSON file per session under `{root}/sessions/`.
pub struct JsonSessionStore {
    root: PathBuf,
}

impl JsonSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load a session, creating an empty one in memory when absent.
    pub async fn load_or_new(&self, id: &str) -> Result<Session> {
        Ok(self.load(id).await?.unwrap_or_else(|| Session::new(id)))
    }
}

#[async_trait::async_trait]
impl SessionStore for JsonSessionStore {
    async fn load(&self, id: &str) -> Result<Option<Session>> {
        let root = self.root.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || shipwright_store::load_session(&root, &id)).await?
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let root = self.root.clone();
        let session = session.clone();
        tokio::task::spawn_blocking(move || shipwright_store::save_session(&root, &session)).await?
    }
}

/// In-memory session store (for testing).
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: std::sync::Mutex<HashMap<String, Session>>,
    saves: std::sync::atomic::AtomicUsize,
    fail_saves: std::sync::atomic::AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, session: Session) -> Self {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
        self
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Make every subsequent `save` fail.
    pub fn fail_saves(&self) {
        self.fail_saves
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.get(id))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_saves.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("session store unavailable");
        }
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }
}
