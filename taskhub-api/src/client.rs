//! Logique de session côté client.
//!
//! L'access token vit uniquement en mémoire; le refresh token passe par un
//! tier durable ([`CredentialStorage`]) choisi par le client embarquant.
//! [`RefreshCoordinator`] garantit au plus un appel refresh en vol par
//! processus client: les requêtes qui échouent pendant ce vol s'enfilent et
//! sont rejouées une seule fois avec le nouveau token.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::responses::AuthResponse;

/// Issue d'une tentative de requête, vue par la session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Réponse 401: access token absent, expiré ou invalide.
    Unauthenticated,
    /// Toute autre erreur, opaque pour la session.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token available")]
    MissingRefreshToken,
    #[error("refresh rejected: {0}")]
    Rejected(String),
    #[error("refresh cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Credentials locaux effacés: le refresh a échoué ou la requête rejouée
    /// est revenue 401. L'UI doit renvoyer vers l'écran de login.
    #[error("session expired, logged out")]
    LoggedOut,
    #[error("request failed: {0}")]
    Request(String),
}

/// Tier durable pour le refresh token uniquement.
///
/// L'implémentation décide du compromis d'exposition (storage navigateur,
/// cookie, keychain...). L'access token ne passe jamais par ce trait.
pub trait CredentialStorage: Send + Sync {
    fn load(&self) -> Option<String>;
    fn store(&self, refresh_token: &str);
    fn clear(&self);
}

/// Stockage en mémoire: durabilité limitée au processus client.
#[derive(Default)]
pub struct MemoryStorage {
    token: Mutex<Option<String>>,
}

impl CredentialStorage for MemoryStorage {
    fn load(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    fn store(&self, refresh_token: &str) {
        *lock(&self.token) = Some(refresh_token.to_string());
    }

    fn clear(&self) {
        *lock(&self.token) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct CoordinatorState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<Result<String, RefreshError>>>,
}

/// Coordinateur single-flight: au plus un refresh en vol à la fois.
///
/// Le premier appelant devient leader et exécute l'échange; les suivants
/// s'enregistrent comme waiters et reçoivent tous le résultat du leader.
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<CoordinatorState>,
}

impl RefreshCoordinator {
    /// Obtient un nouvel access token, en déclenchant `do_refresh` ou en
    /// attendant le refresh déjà en vol.
    pub async fn refresh<F, Fut>(&self, do_refresh: F) -> Result<String, RefreshError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, RefreshError>>,
    {
        let rx = {
            let mut state = lock(&self.state);
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Some(rx)
            } else {
                state.in_flight = true;
                None
            }
        };

        if let Some(rx) = rx {
            // Un refresh est déjà en vol: attendre son issue.
            return rx.await.unwrap_or(Err(RefreshError::Cancelled));
        }

        let guard = LeaderGuard { coordinator: self };
        let result = do_refresh().await;
        guard.finish(result.clone());
        result
    }

    /// Remet le flag à zéro et propage le résultat à tous les waiters.
    fn settle(&self, result: &Result<String, RefreshError>) {
        let waiters = {
            let mut state = lock(&self.state);
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

/// Un leader annulé en plein vol doit quand même libérer le coordinateur,
/// sinon le flag reste levé et plus aucun refresh ne part.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
}

impl LeaderGuard<'_> {
    fn finish(self, result: Result<String, RefreshError>) {
        self.coordinator.settle(&result);
        std::mem::forget(self);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.settle(&Err(RefreshError::Cancelled));
    }
}

/// État de session d'un client: paire de credentials + coordination refresh.
pub struct ClientSession {
    // Jamais persisté: le token court vit uniquement ici.
    access: Mutex<Option<String>>,
    storage: Box<dyn CredentialStorage>,
    coordinator: RefreshCoordinator,
}

impl ClientSession {
    pub fn new(storage: Box<dyn CredentialStorage>) -> Self {
        Self {
            access: Mutex::new(None),
            storage,
            coordinator: RefreshCoordinator::default(),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        lock(&self.access).clone()
    }

    /// Enregistre une nouvelle paire (après register, login ou refresh).
    pub fn store_pair(&self, access_token: &str, refresh_token: &str) {
        *lock(&self.access) = Some(access_token.to_string());
        self.storage.store(refresh_token);
    }

    /// Efface tous les credentials (logout, forcé ou non).
    pub fn clear(&self) {
        *lock(&self.access) = None;
        self.storage.clear();
    }

    /// Exécute `request` avec l'access token courant. Sur 401, refresh via le
    /// coordinateur puis rejoue la requête une seule fois. Si le refresh
    /// échoue ou si le rejeu revient 401, les credentials sont effacés et
    /// l'appel se termine en [`SessionError::LoggedOut`].
    ///
    /// `exchange` matérialise POST /auth/refresh; seul le leader l'appelle.
    pub async fn run<T, F, Fut, X, XFut>(&self, request: F, exchange: X) -> Result<T, SessionError>
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
        X: FnOnce(String) -> XFut,
        XFut: Future<Output = Result<AuthResponse, String>>,
    {
        match request(self.access_token()).await {
            Ok(value) => Ok(value),
            Err(CallError::Other(message)) => Err(SessionError::Request(message)),
            Err(CallError::Unauthenticated) => {
                let access = match self.refresh_access(exchange).await {
                    Ok(access) => access,
                    Err(_) => {
                        self.clear();
                        return Err(SessionError::LoggedOut);
                    }
                };

                // Rejeu unique: un deuxième 401 ne relance pas de refresh.
                match request(Some(access)).await {
                    Ok(value) => Ok(value),
                    Err(CallError::Unauthenticated) => {
                        self.clear();
                        Err(SessionError::LoggedOut)
                    }
                    Err(CallError::Other(message)) => Err(SessionError::Request(message)),
                }
            }
        }
    }

    async fn refresh_access<X, XFut>(&self, exchange: X) -> Result<String, RefreshError>
    where
        X: FnOnce(String) -> XFut,
        XFut: Future<Output = Result<AuthResponse, String>>,
    {
        self.coordinator
            .refresh(|| async move {
                let refresh_token = self
                    .storage
                    .load()
                    .ok_or(RefreshError::MissingRefreshToken)?;
                let response = exchange(refresh_token)
                    .await
                    .map_err(RefreshError::Rejected)?;
                self.store_pair(&response.access_token, &response.refresh_token);
                Ok(response.access_token)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::UserResponse;
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    fn auth_response(access: &str, refresh: &str) -> AuthResponse {
        AuthResponse {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            user: UserResponse {
                id: Uuid::new_v4(),
                email: "a@b.com".to_string(),
                name: "A".to_string(),
                created_at: Utc::now(),
            },
            expires_in: 900,
        }
    }

    fn session_with_pair(access: &str, refresh: &str) -> Arc<ClientSession> {
        let session = Arc::new(ClientSession::new(Box::new(MemoryStorage::default())));
        session.store_pair(access, refresh);
        session
    }

    #[tokio::test]
    async fn successful_request_does_not_trigger_refresh() {
        let session = session_with_pair("access_1", "refresh_1");
        let exchanges = Arc::new(AtomicUsize::new(0));

        let exchanged = Arc::clone(&exchanges);
        let result = session
            .run(
                |access| async move {
                    assert_eq!(access.as_deref(), Some("access_1"));
                    Ok("payload")
                },
                move |_refresh| async move {
                    exchanged.fetch_add(1, Ordering::SeqCst);
                    Err("should not be called".to_string())
                },
            )
            .await;

        assert_eq!(result, Ok("payload"));
        assert_eq!(exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_access_is_refreshed_and_replayed_once() {
        let session = session_with_pair("stale", "refresh_1");
        let attempts = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&attempts);
        let result = session
            .run(
                move |access| {
                    let counted = Arc::clone(&counted);
                    async move {
                        counted.fetch_add(1, Ordering::SeqCst);
                        match access.as_deref() {
                            Some("fresh") => Ok("payload"),
                            _ => Err(CallError::Unauthenticated),
                        }
                    }
                },
                |refresh| async move {
                    assert_eq!(refresh, "refresh_1");
                    Ok(auth_response("fresh", "refresh_2"))
                },
            )
            .await;

        assert_eq!(result, Ok("payload"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(session.access_token().as_deref(), Some("fresh"));
        assert_eq!(session.storage.load().as_deref(), Some("refresh_2"));
    }

    #[tokio::test]
    async fn five_concurrent_failures_issue_a_single_refresh() {
        let session = session_with_pair("stale", "refresh_1");
        let exchanges = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..5 {
            let session = Arc::clone(&session);
            let exchanges = Arc::clone(&exchanges);
            handles.push(tokio::spawn(async move {
                session
                    .run(
                        move |access| async move {
                            match access.as_deref() {
                                Some("fresh") => Ok(i),
                                _ => Err(CallError::Unauthenticated),
                            }
                        },
                        move |_refresh| async move {
                            exchanges.fetch_add(1, Ordering::SeqCst);
                            // Laisse le temps aux autres appels d'échouer et
                            // de s'enfiler derrière ce refresh.
                            tokio::time::sleep(Duration::from_millis(200)).await;
                            Ok(auth_response("fresh", "refresh_2"))
                        },
                    )
                    .await
            }));
        }

        let mut replayed = Vec::new();
        for handle in handles {
            replayed.push(handle.await.expect("task panicked").expect("call failed"));
        }
        replayed.sort_unstable();

        assert_eq!(replayed, vec![0, 1, 2, 3, 4]);
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
        assert_eq!(session.storage.load().as_deref(), Some("refresh_2"));
    }

    #[tokio::test]
    async fn failed_refresh_forces_logout() {
        let session = session_with_pair("stale", "refresh_1");

        let result: Result<(), _> = session
            .run(
                |_access| async move { Err(CallError::Unauthenticated) },
                |_refresh| async move { Err("invalid refresh token".to_string()) },
            )
            .await;

        assert_eq!(result, Err(SessionError::LoggedOut));
        assert!(session.access_token().is_none());
        assert!(session.storage.load().is_none());
    }

    #[tokio::test]
    async fn missing_refresh_token_logs_out_without_network_call() {
        let session = Arc::new(ClientSession::new(Box::new(MemoryStorage::default())));
        let exchanges = Arc::new(AtomicUsize::new(0));

        let exchanged = Arc::clone(&exchanges);
        let result: Result<(), _> = session
            .run(
                |_access| async move { Err(CallError::Unauthenticated) },
                move |_refresh| async move {
                    exchanged.fetch_add(1, Ordering::SeqCst);
                    Ok(auth_response("fresh", "refresh_2"))
                },
            )
            .await;

        assert_eq!(result, Err(SessionError::LoggedOut));
        assert_eq!(exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn replay_that_still_fails_does_not_loop() {
        let session = session_with_pair("stale", "refresh_1");
        let attempts = Arc::new(AtomicUsize::new(0));
        let exchanges = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&attempts);
        let exchanged = Arc::clone(&exchanges);
        let result: Result<(), _> = session
            .run(
                move |_access| {
                    let counted = Arc::clone(&counted);
                    async move {
                        counted.fetch_add(1, Ordering::SeqCst);
                        Err(CallError::Unauthenticated)
                    }
                },
                move |_refresh| async move {
                    exchanged.fetch_add(1, Ordering::SeqCst);
                    Ok(auth_response("fresh", "refresh_2"))
                },
            )
            .await;

        assert_eq!(result, Err(SessionError::LoggedOut));
        assert_eq!(attempts.load(Ordering::SeqCst), 2, "exactly one replay");
        assert_eq!(exchanges.load(Ordering::SeqCst), 1, "exactly one refresh");
        assert!(session.access_token().is_none());
    }

    #[tokio::test]
    async fn waiters_receive_the_leader_result() {
        let coordinator = Arc::new(RefreshCoordinator::default());

        let leader = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .refresh(|| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok("fresh".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiter = coordinator
            .refresh(|| async { panic!("waiter must not become leader") })
            .await;

        assert_eq!(waiter.as_deref(), Ok("fresh"));
        assert_eq!(
            leader.await.expect("leader panicked").as_deref(),
            Ok("fresh")
        );
    }

    #[tokio::test]
    async fn cancelled_leader_releases_the_flight() {
        let coordinator = Arc::new(RefreshCoordinator::default());

        let leader = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .refresh(|| async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok("never".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();
        let _ = leader.await;

        let result = coordinator.refresh(|| async { Ok("fresh".to_string()) }).await;
        assert_eq!(result.as_deref(), Ok("fresh"));
    }
}
