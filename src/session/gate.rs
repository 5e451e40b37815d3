//! Single-flight session renewal
//!
//! Every fetch attempt reads a [`SessionSnapshot`] and remembers its version.
//! When the server reports that authorization lapsed, the attempt hands that
//! version back to [`SessionGate::ensure_fresh`]. Only the first caller for a
//! given version performs the renewal; everyone else waits on the refresh lock
//! and picks up the already-renewed session.

use super::{Session, SessionError};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

pub type RecoveryError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Re-authorizes a session whose authorization lapsed
#[async_trait]
pub trait Reauthorize: Send + Sync {
    async fn reauthorize(&self, session: &Session) -> Result<Session, RecoveryError>;
}

/// Session value together with the version it was read at
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub version: u64,
    pub session: Session,
}

struct GateState {
    version: u64,
    session: Session,
    poisoned: Option<String>,
}

/// Versioned owner of the shared session
pub struct SessionGate {
    state: RwLock<GateState>,
    refresh: Mutex<()>,
    reauth: Arc<dyn Reauthorize>,
    refreshes: AtomicU64,
}

impl SessionGate {
    pub fn new(session: Session, reauth: Arc<dyn Reauthorize>) -> Self {
        Self {
            state: RwLock::new(GateState {
                version: 0,
                session,
                poisoned: None,
            }),
            refresh: Mutex::new(()),
            reauth,
            refreshes: AtomicU64::new(0),
        }
    }

    /// Current session, or the recovery error once the gate is poisoned
    pub async fn current(&self) -> Result<SessionSnapshot, SessionError> {
        let state = self.state.read().await;
        if let Some(reason) = &state.poisoned {
            return Err(SessionError::RecoveryFailed(reason.clone()));
        }
        Ok(SessionSnapshot {
            version: state.version,
            session: state.session.clone(),
        })
    }

    /// Return a session newer than `stale_version`, renewing it if nobody has yet
    pub async fn ensure_fresh(&self, stale_version: u64) -> Result<SessionSnapshot, SessionError> {
        if let Some(snapshot) = self.newer_than(stale_version).await? {
            return Ok(snapshot);
        }

        let _guard = self.refresh.lock().await;

        // Renewed (or poisoned) while we waited for the lock
        if let Some(snapshot) = self.newer_than(stale_version).await? {
            debug!(stale_version, version = snapshot.version, "Session already renewed");
            return Ok(snapshot);
        }

        let stale = self.state.read().await.session.clone();
        info!(stale_version, "Session expired, renewing");

        match self.reauth.reauthorize(&stale).await {
            Ok(session) => {
                let mut state = self.state.write().await;
                state.version += 1;
                state.session = session;
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                info!(version = state.version, "Session renewed");

                Ok(SessionSnapshot {
                    version: state.version,
                    session: state.session.clone(),
                })
            }
            Err(e) => {
                let reason = e.to_string();
                error!(stale_version, error = %reason, "Session renewal failed");
                self.state.write().await.poisoned = Some(reason.clone());
                Err(SessionError::RecoveryFailed(reason))
            }
        }
    }

    /// Number of renewals performed so far
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    async fn newer_than(&self, stale_version: u64) -> Result<Option<SessionSnapshot>, SessionError> {
        let state = self.state.read().await;
        if let Some(reason) = &state.poisoned {
            return Err(SessionError::RecoveryFailed(reason.clone()));
        }
        if state.version > stale_version {
            return Ok(Some(SessionSnapshot {
                version: state.version,
                session: state.session.clone(),
            }));
        }
        Ok(None)
    }
}
