//! Session table and idle reaping.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use homeserv_config::SessionConfig;

use crate::session::CallSession;
use crate::SessionError;

/// Owns every live call session.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<CallSession>>>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a session for a call. Each call id gets exactly one.
    pub fn open(
        &self,
        call_id: &str,
        caller_phone: &str,
    ) -> Result<Arc<CallSession>, SessionError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(call_id) {
            return Err(SessionError::DuplicateSession(call_id.to_string()));
        }
        let session = Arc::new(CallSession::new(call_id, caller_phone));
        sessions.insert(call_id.to_string(), session.clone());
        tracing::info!(call_id, "opened session");
        Ok(session)
    }

    pub fn get(&self, call_id: &str) -> Result<Arc<CallSession>, SessionError> {
        self.sessions
            .read()
            .get(call_id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(call_id.to_string()))
    }

    /// Close and drop a session. Waits for any in-flight turn to finish,
    /// and is a no-op for unknown or already-closed calls.
    pub async fn close(&self, call_id: &str) {
        let session = self.sessions.read().get(call_id).cloned();
        if let Some(session) = session {
            let _turn = session.begin_turn().await;
            session.close();
            self.sessions.write().remove(call_id);
            tracing::info!(call_id, "closed session");
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Drop sessions idle past the configured timeout. Returns how many.
    pub fn sweep_idle(&self) -> usize {
        let timeout = Duration::from_secs(self.config.idle_timeout_seconds);
        let idle: Vec<(String, Arc<CallSession>)> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect();
        let mut reaped = 0;
        for (id, session) in idle {
            // A turn in flight holds the gate; leave that session for the
            // next sweep instead of closing it mid-turn.
            let Some(_turn) = session.try_begin_turn() else {
                continue;
            };
            session.close();
            self.sessions.write().remove(&id);
            tracing::info!(call_id = %id, "reaped idle session");
            reaped += 1;
        }
        reaped
    }

    /// Start the background reaper. Returns a shutdown sender.
    pub fn start_sweeper(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = Duration::from_secs(manager.config.sweep_interval_seconds);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reaped = manager.sweep_idle();
                        if reaped > 0 {
                            tracing::info!(reaped, remaining = manager.count(), "session sweep");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("session sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(SessionConfig::default())
    }

    #[test]
    fn open_and_get() {
        let m = manager();
        let session = m.open("call-1", "555-123-4567").unwrap();
        assert_eq!(session.id, "call-1");
        assert_eq!(m.get("call-1").unwrap().id, "call-1");
    }

    #[test]
    fn duplicate_call_id_rejected() {
        let m = manager();
        m.open("call-1", "555-123-4567").unwrap();
        assert_eq!(
            m.open("call-1", "555-999-0000").unwrap_err(),
            SessionError::DuplicateSession("call-1".to_string())
        );
    }

    #[test]
    fn get_unknown_call() {
        let m = manager();
        assert_eq!(
            m.get("nope").unwrap_err(),
            SessionError::SessionNotFound("nope".to_string())
        );
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let m = manager();
        m.open("call-1", "555-123-4567").unwrap();
        m.close("call-1").await;
        assert!(m.get("call-1").is_err());
        // Second close of the same call is a quiet no-op.
        m.close("call-1").await;
    }

    #[test]
    fn sweep_reaps_only_idle_sessions() {
        let m = SessionManager::new(SessionConfig {
            idle_timeout_seconds: 300,
            ..SessionConfig::default()
        });
        m.open("call-1", "555-123-4567").unwrap();
        assert_eq!(m.sweep_idle(), 0);
        assert_eq!(m.count(), 1);
    }

    #[tokio::test]
    async fn sweep_skips_sessions_with_a_turn_in_flight() {
        let m = SessionManager::new(SessionConfig {
            idle_timeout_seconds: 0,
            ..SessionConfig::default()
        });
        let session = m.open("call-1", "555-123-4567").unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        // A turn holding the gate keeps the session alive and open.
        let turn = session.begin_turn().await;
        assert_eq!(m.sweep_idle(), 0);
        assert_eq!(m.count(), 1);
        assert!(!session.is_closed());

        drop(turn);
        assert_eq!(m.sweep_idle(), 1);
        assert_eq!(m.count(), 0);
    }

    #[tokio::test]
    async fn sweeper_task_shuts_down() {
        let m = Arc::new(SessionManager::new(SessionConfig {
            sweep_interval_seconds: 1,
            ..SessionConfig::default()
        }));
        let shutdown = m.start_sweeper();
        shutdown.send(true).unwrap();
        tokio::task::yield_now().await;
    }
}
