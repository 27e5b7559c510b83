//! Registry of live sessions keyed by share code.
//!
//! The store is the only place codes are bound to sessions. A code stays
//! bound while its session is non-terminal; once the session expires or is
//! cancelled the binding is released, either lazily on the next lookup or by
//! [`SessionStore::sweep`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::code::{CodeGenerator, ShareCode};
use crate::config::{SessionConfig, StorageConfig, MAX_SESSION_TTL};
use crate::error::{Error, Result};
use crate::file::FileDescriptor;
use crate::session::TransferSession;
use crate::storage::Spool;

/// Concurrent map from share code to session.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<ShareCode, Arc<TransferSession>>>,
    generator: CodeGenerator,
    config: SessionConfig,
    storage: StorageConfig,
}

impl SessionStore {
    /// Create an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the code settings or the TTL are invalid.
    pub fn new(config: SessionConfig, storage: StorageConfig) -> Result<Self> {
        let generator = CodeGenerator::new(config.code_length, config.code_retry_limit)?;
        if config.session_ttl.is_zero() || config.session_ttl > MAX_SESSION_TTL {
            return Err(Error::InvalidConfig {
                key: "session.session_ttl".to_string(),
                reason: "must be between 1s and 365 days".to_string(),
            });
        }
        Ok(Self {
            sessions: RwLock::new(HashMap::new()),
            generator,
            config,
            storage,
        })
    }

    /// Session settings in effect.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Parse user input into a code of the configured length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCodeFormat`] for malformed input.
    pub fn parse_code(&self, input: &str) -> Result<ShareCode> {
        ShareCode::parse(input, self.generator.length())
    }

    /// Create a session for `files` and bind it to a fresh code.
    ///
    /// # Errors
    ///
    /// Returns an error if the file list is empty or too long, a file fails
    /// validation, spools cannot be created, or no free code can be found.
    pub async fn register(&self, files: Vec<FileDescriptor>) -> Result<Arc<TransferSession>> {
        if files.is_empty() {
            return Err(Error::InvalidInput("at least one file is required".to_string()));
        }
        if files.len() > self.config.max_files {
            return Err(Error::InvalidInput(format!(
                "{} files declared, at most {} allowed",
                files.len(),
                self.config.max_files
            )));
        }
        for file in &files {
            file.validate(self.config.max_file_size_bytes)?;
        }

        let id = Uuid::new_v4();
        let mut spools = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let spool = Spool::for_file(&self.storage, id, index, file.size_bytes).await?;
            spools.push(Arc::new(spool));
        }

        let mut sessions = self.write();

        let live = sessions.values().filter(|s| !s.is_terminal()).count() as u64;
        if live >= self.generator.space() {
            return Err(Error::CodeSpaceFull { live });
        }

        let code = self
            .generator
            .generate_unique(|code| sessions.get(code).is_some_and(|s| !s.is_terminal()))?;

        let session = Arc::new(TransferSession::new(
            id,
            code.clone(),
            files,
            spools,
            self.config.session_ttl,
            self.config.single_use,
        ));

        if let Some(previous) = sessions.insert(code.clone(), Arc::clone(&session)) {
            tracing::debug!("Code {} rebound from session {}", code, previous.id());
        }
        drop(sessions);

        tracing::info!(
            "Session {} created with {} file(s), expires at {}",
            code,
            session.files().len(),
            session.expires_at()
        );

        Ok(session)
    }

    /// Find the usable session bound to `code`.
    ///
    /// A session found in a terminal state is unbound before its error is
    /// returned, so the code becomes available again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCodeFormat`], [`Error::CodeNotFound`],
    /// [`Error::CodeExpired`] or [`Error::SessionCancelled`].
    pub fn lookup(&self, code: &str) -> Result<Arc<TransferSession>> {
        let code = self.parse_code(code)?;
        let session = self
            .read()
            .get(&code)
            .cloned()
            .ok_or_else(|| Error::CodeNotFound(code.to_string()))?;

        if let Err(e) = session.ensure_usable() {
            self.evict(&code, &session);
            return Err(e);
        }

        Ok(session)
    }

    /// Cancel and unbind the session bound to `code`.
    ///
    /// Closing an unknown or already terminal session is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCodeFormat`] for malformed input.
    pub fn close(&self, code: &str) -> Result<()> {
        let code = self.parse_code(code)?;
        let removed = self.write().remove(&code);
        if let Some(session) = removed {
            session.cancel();
            tracing::debug!("Session {} closed", code);
        }
        Ok(())
    }

    /// Unbind every session that has reached a terminal state.
    ///
    /// Returns the number of sessions removed.
    pub fn sweep(&self) -> usize {
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, session| {
            session.expire_if_due();
            !session.is_terminal()
        });
        let removed = before - sessions.len();
        drop(sessions);

        if removed > 0 {
            tracing::info!("Swept {} closed session(s)", removed);
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        tracing::debug!("Session sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
        })
    }

    /// Number of bound sessions, including terminal ones not yet swept.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no sessions are bound.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn evict(&self, code: &ShareCode, session: &Arc<TransferSession>) {
        let mut sessions = self.write();
        if sessions
            .get(code)
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            sessions.remove(code);
            tracing::debug!("Evicted closed session {}", code);
        }
    }

    fn read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<ShareCode, Arc<TransferSession>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<ShareCode, Arc<TransferSession>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;
    use crate::session::SessionStatus;

    fn memory_store(config: SessionConfig) -> SessionStore {
        let storage = StorageConfig {
            backend: StorageBackend::Memory,
            spool_dir: None,
        };
        SessionStore::new(config, storage).unwrap()
    }

    fn one_file() -> Vec<FileDescriptor> {
        vec![FileDescriptor::guessed("a.txt", 4)]
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let store = memory_store(SessionConfig::default());
        let session = store.register(one_file()).await.unwrap();
        let code = session.code().to_string();

        let found = store.lookup(&code).unwrap();
        assert!(Arc::ptr_eq(&found, &session));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let store = memory_store(SessionConfig::default());
        assert!(matches!(
            store.lookup("12ab56"),
            Err(Error::InvalidCodeFormat(_))
        ));
        assert!(matches!(
            store.lookup("000000"),
            Err(Error::CodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let config = SessionConfig {
            max_files: 2,
            max_file_size_bytes: 100,
            ..SessionConfig::default()
        };
        let store = memory_store(config);

        assert!(matches!(
            store.register(vec![]).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store
                .register(vec![FileDescriptor::guessed("big.bin", 101)])
                .await,
            Err(Error::FileTooLarge { .. })
        ));
        let three = (0..3)
            .map(|i| FileDescriptor::guessed(format!("{i}.txt"), 1))
            .collect();
        assert!(matches!(
            store.register(three).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = memory_store(SessionConfig::default());
        let session = store.register(one_file()).await.unwrap();
        let code = session.code().to_string();

        store.close(&code).unwrap();
        assert_eq!(session.status(), SessionStatus::Cancelled);
        assert!(matches!(store.lookup(&code), Err(Error::CodeNotFound(_))));
        store.close(&code).unwrap();
    }

    #[tokio::test]
    async fn test_lookup_evicts_cancelled_session() {
        let store = memory_store(SessionConfig::default());
        let session = store.register(one_file()).await.unwrap();
        let code = session.code().to_string();

        session.cancel();
        assert!(matches!(
            store.lookup(&code),
            Err(Error::SessionCancelled(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_expired() {
        let config = SessionConfig {
            session_ttl: Duration::from_secs(30),
            ..SessionConfig::default()
        };
        let store = memory_store(config);
        store.register(one_file()).await.unwrap();
        store.register(one_file()).await.unwrap();

        assert_eq!(store.sweep(), 0);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.sweep(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_small_code_space_exhausts() {
        let config = SessionConfig {
            code_length: 4,
            code_retry_limit: 3,
            ..SessionConfig::default()
        };
        let store = memory_store(config);

        // Fill every code directly so the next draw cannot succeed.
        for value in 0..10_000u32 {
            let code = ShareCode::parse(&format!("{value:04}"), 4).unwrap();
            let session = Arc::new(TransferSession::new(
                Uuid::new_v4(),
                code.clone(),
                one_file(),
                vec![Arc::new(Spool::memory(4))],
                Duration::from_secs(60),
                false,
            ));
            store.write().insert(code, session);
        }

        let err = store.register(one_file()).await.unwrap_err();
        assert!(matches!(err, Error::CodeSpaceFull { live: 10_000 }));
        assert_eq!(err.code(), Some("E008"));
        assert!(!err.to_string().contains("0 attempts"));
    }

    #[tokio::test]
    async fn test_terminal_binding_is_reusable() {
        let config = SessionConfig {
            code_length: 4,
            code_retry_limit: 1,
            ..SessionConfig::default()
        };
        let store = memory_store(config);

        let mut cancelled = Vec::new();
        for value in 0..10_000u32 {
            let code = ShareCode::parse(&format!("{value:04}"), 4).unwrap();
            let session = Arc::new(TransferSession::new(
                Uuid::new_v4(),
                code.clone(),
                one_file(),
                vec![Arc::new(Spool::memory(4))],
                Duration::from_secs(60),
                false,
            ));
            cancelled.push(Arc::clone(&session));
            store.write().insert(code, session);
        }
        for session in &cancelled {
            session.cancel();
        }

        let session = store.register(one_file()).await.unwrap();
        assert!(!session.is_terminal());
        assert!(store.lookup(session.code().as_str()).is_ok());
    }
}
