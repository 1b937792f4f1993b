use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use crate::errors::{PurgeError, PurgeResult};
use crate::models::User;
use crate::services::PurgeStore;
use super::boundary::ResetTime;
use super::executor::{call_store, PurgeExecutor};

/// Result of evaluating one user. `purged` is true only for the evaluation
/// that advanced the ledger; `removed` counts what this evaluation deleted
/// either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UserPurgeOutcome {
    pub purged: bool,
    pub removed: u64,
}

/// Whether a user's most recent boundary has been purged yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserResetState {
    Pending,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFailure {
    pub user_id: String,
    #[serde(serialize_with = "error_message")]
    pub error: PurgeError,
}

fn error_message<S: Serializer>(error: &PurgeError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeSummary {
    pub users_evaluated: usize,
    pub users_purged: usize,
    pub total_tasks_removed: u64,
    /// Users that were skipped because of an error.
    pub failures: Vec<UserFailure>,
    /// Users that were purged but whose ledger entry could not be written.
    pub warnings: Vec<UserFailure>,
    pub cancelled: bool,
}

struct Evaluation {
    outcome: UserPurgeOutcome,
    ledger_warning: Option<PurgeError>,
}

/// Applies each user's daily reset at most once per boundary.
///
/// The batch run and the single-user run share `evaluate_user`, so a purge
/// triggered by a timer, an admin command or a page load behaves the same.
/// Evaluations for the same user are serialized through a per-user lock;
/// different users proceed in parallel up to `max_concurrent_users`.
///
/// The lock only covers this process. Across processes sharing a store,
/// exactly-once reporting rests on the ledger compare-and-set: the delete is
/// idempotent and only the evaluation whose ledger write lands reports a
/// purge.
pub struct PurgeCoordinator<S> {
    store: Arc<S>,
    executor: PurgeExecutor<S>,
    timeout: Duration,
    max_concurrent_users: usize,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: PurgeStore> PurgeCoordinator<S> {
    pub fn new(store: Arc<S>, timeout: Duration, max_concurrent_users: usize) -> Self {
        Self {
            executor: PurgeExecutor::new(store.clone(), timeout),
            store,
            timeout,
            max_concurrent_users: max_concurrent_users.max(1),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> PurgeResult<PurgeSummary> {
        self.run_once_with_cancel(now, &CancellationToken::new()).await
    }

    /// Evaluates every user. Only failing to list users is an error; per-user
    /// failures land in the summary. Cancellation is checked before each user
    /// starts, a user already mid-purge runs to completion.
    pub async fn run_once_with_cancel(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> PurgeResult<PurgeSummary> {
        let users = call_store(self.timeout, "find_users", self.store.find_users()).await?;
        tracing::debug!("Evaluating daily reset for {} users at {}", users.len(), now);

        // Like a worker pool: a user only starts once a permit is free.
        let semaphore = Semaphore::new(self.max_concurrent_users);
        let mut pending = FuturesUnordered::new();
        for user in users {
            pending.push(self.evaluate_with_permit(user, now, cancel, &semaphore));
        }

        let mut results = Vec::new();
        while let Some(result) = pending.next().await {
            results.push(result);
        }

        let mut summary = PurgeSummary::default();
        for (user_id, result) in results {
            match result {
                None => summary.cancelled = true,
                Some(Ok(evaluation)) => {
                    summary.users_evaluated += 1;
                    if evaluation.outcome.purged {
                        summary.users_purged += 1;
                    }
                    summary.total_tasks_removed += evaluation.outcome.removed;
                    if let Some(error) = evaluation.ledger_warning {
                        summary.warnings.push(UserFailure { user_id, error });
                    }
                }
                Some(Err(error)) => {
                    summary.users_evaluated += 1;
                    summary.failures.push(UserFailure { user_id, error });
                }
            }
        }

        if summary.cancelled {
            tracing::warn!("Purge run cancelled after {} users", summary.users_evaluated);
        }
        tracing::info!(
            "Purge run finished: {} users evaluated, {} purged, {} tasks removed, {} failures",
            summary.users_evaluated,
            summary.users_purged,
            summary.total_tasks_removed,
            summary.failures.len()
        );
        Ok(summary)
    }

    /// Just-in-time variant for a single user, reading their latest reset time.
    pub async fn run_once_for_user(&self, user_id: &str, now: DateTime<Utc>) -> PurgeResult<UserPurgeOutcome> {
        let user = self.load_user(user_id).await?;
        let evaluation = self.evaluate_user(&user, now).await?;
        Ok(evaluation.outcome)
    }

    pub async fn state_for_user(&self, user_id: &str, now: DateTime<Utc>) -> PurgeResult<UserResetState> {
        let user = self.load_user(user_id).await?;
        let boundary = ResetTime::of_user(&user)?.boundary_at(now);
        let recorded = call_store(self.timeout, "get_purge_ledger", self.store.get_purge_ledger(user_id)).await?;
        Ok(match recorded {
            Some(recorded) if recorded >= boundary => UserResetState::Settled,
            _ => UserResetState::Pending,
        })
    }

    async fn load_user(&self, user_id: &str) -> PurgeResult<User> {
        call_store(self.timeout, "find_user", self.store.find_user(user_id))
            .await?
            .ok_or_else(|| PurgeError::UserNotFound(user_id.to_string()))
    }

    async fn evaluate_with_permit(
        &self,
        user: User,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        semaphore: &Semaphore,
    ) -> (String, Option<PurgeResult<Evaluation>>) {
        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return (user.id, None),
        };
        if cancel.is_cancelled() {
            return (user.id, None);
        }
        let result = self.evaluate_user(&user, now).await;
        (user.id, Some(result))
    }

    async fn evaluate_user(&self, user: &User, now: DateTime<Utc>) -> PurgeResult<Evaluation> {
        let reset = ResetTime::of_user(user).map_err(|e| {
            tracing::warn!("Skipping user {}: {}", user.id, e);
            e
        })?;
        let boundary = reset.boundary_at(now);

        let lock = self.lock_for(&user.id);
        let result = {
            let _guard = lock.lock().await;
            self.purge_if_pending(&user.id, boundary).await
        };
        self.release_lock(&user.id, lock);
        result
    }

    // Must run under the user's lock.
    async fn purge_if_pending(&self, user_id: &str, boundary: DateTime<Utc>) -> PurgeResult<Evaluation> {
        let recorded = call_store(self.timeout, "get_purge_ledger", self.store.get_purge_ledger(user_id)).await?;
        if let Some(recorded) = recorded {
            if recorded >= boundary {
                tracing::debug!("User {} already settled through {}", user_id, recorded);
                return Ok(Evaluation {
                    outcome: UserPurgeOutcome::default(),
                    ledger_warning: None,
                });
            }
        }

        let removed = self.executor.purge(user_id, boundary).await?;

        let written = call_store(
            self.timeout,
            "set_purge_ledger",
            self.store.set_purge_ledger(user_id, boundary),
        )
        .await;

        let evaluation = match written {
            Ok(true) => Evaluation {
                outcome: UserPurgeOutcome { purged: true, removed },
                ledger_warning: None,
            },
            // Another process settled this boundary after our ledger read.
            Ok(false) => {
                tracing::debug!("Ledger for user {} already at or past {}", user_id, boundary);
                Evaluation {
                    outcome: UserPurgeOutcome { purged: false, removed },
                    ledger_warning: None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Purged user {} through {} but could not record it: {}",
                    user_id,
                    boundary,
                    e
                );
                Evaluation {
                    outcome: UserPurgeOutcome { purged: true, removed },
                    ledger_warning: Some(PurgeError::LedgerWriteFailed(e.to_string())),
                }
            }
        };
        Ok(evaluation)
    }

    fn lock_for(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(user_id.to_string()).or_default().clone()
    }

    // Forgets the user's lock once nobody else holds or waits on it.
    fn release_lock(&self, user_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.user_locks.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(&lock) == 2 {
            locks.remove(user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use crate::errors::StoreResult;
    use crate::models::Task;
    use crate::services::MemoryStore;

    fn user(id: &str, hour: u32, minute: u32) -> User {
        User {
            id: id.to_string(),
            username: id.to_string(),
            email: format!("{}@example.com", id),
            full_name: None,
            password_hash: String::new(),
            reset_hour: hour,
            reset_minute: minute,
            created_at: Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    fn coordinator(store: &Arc<MemoryStore>) -> PurgeCoordinator<MemoryStore> {
        PurgeCoordinator::new(store.clone(), Duration::from_secs(1), 4)
    }

    #[tokio::test]
    async fn second_run_with_same_now_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(user("u1", 22, 0));
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap();
        store.insert_task(Task::new("u1", "old".into(), now - ChronoDuration::days(1)));

        let coordinator = coordinator(&store);
        let first = coordinator.run_once_for_user("u1", now).await.unwrap();
        assert_eq!(first, UserPurgeOutcome { purged: true, removed: 1 });

        let second = coordinator.run_once_for_user("u1", now).await.unwrap();
        assert_eq!(second, UserPurgeOutcome { purged: false, removed: 0 });
        assert_eq!(store.delete_calls(), 1);
    }

    #[tokio::test]
    async fn state_moves_from_pending_to_settled_and_back() {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(user("u1", 22, 0));
        let coordinator = coordinator(&store);

        let morning = Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap();
        assert_eq!(coordinator.state_for_user("u1", morning).await.unwrap(), UserResetState::Pending);
        coordinator.run_once_for_user("u1", morning).await.unwrap();
        assert_eq!(coordinator.state_for_user("u1", morning).await.unwrap(), UserResetState::Settled);

        let night = Utc.with_ymd_and_hms(2024, 1, 2, 22, 0, 0).unwrap();
        assert_eq!(coordinator.state_for_user("u1", night).await.unwrap(), UserResetState::Pending);
    }

    #[tokio::test]
    async fn unknown_user_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap();
        let err = coordinator(&store).run_once_for_user("ghost", now).await.unwrap_err();
        assert_eq!(err, PurgeError::UserNotFound("ghost".into()));
    }

    #[tokio::test]
    async fn locks_are_forgotten_after_use() {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(user("u1", 0, 0));
        let coordinator = coordinator(&store);
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap();

        coordinator.run_once_for_user("u1", now).await.unwrap();
        assert!(coordinator.user_locks.lock().unwrap().is_empty());
    }

    // Always reads an empty ledger, as if another process settled the user
    // right after our read.
    struct StaleLedgerReads(MemoryStore);

    #[async_trait]
    impl PurgeStore for StaleLedgerReads {
        async fn find_users(&self) -> StoreResult<Vec<User>> {
            self.0.find_users().await
        }

        async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
            self.0.find_user(user_id).await
        }

        async fn delete_tasks_before(&self, user_id: &str, boundary: DateTime<Utc>) -> StoreResult<u64> {
            self.0.delete_tasks_before(user_id, boundary).await
        }

        async fn get_purge_ledger(&self, _user_id: &str) -> StoreResult<Option<DateTime<Utc>>> {
            Ok(None)
        }

        async fn set_purge_ledger(&self, user_id: &str, boundary: DateTime<Utc>) -> StoreResult<bool> {
            self.0.set_purge_ledger(user_id, boundary).await
        }
    }

    #[tokio::test]
    async fn losing_the_ledger_race_is_not_reported_as_a_purge() {
        let inner = MemoryStore::new();
        inner.insert_user(user("u1", 22, 0));
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap();
        let boundary = Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap();
        assert!(inner.set_purge_ledger("u1", boundary).await.unwrap());

        let store = Arc::new(StaleLedgerReads(inner));
        let coordinator = PurgeCoordinator::new(store.clone(), Duration::from_secs(1), 4);

        let outcome = coordinator.run_once_for_user("u1", now).await.unwrap();
        assert_eq!(outcome, UserPurgeOutcome { purged: false, removed: 0 });

        let summary = coordinator.run_once(now).await.unwrap();
        assert_eq!(summary.users_evaluated, 1);
        assert_eq!(summary.users_purged, 0);
        assert!(summary.warnings.is_empty());
        assert_eq!(store.0.ledger_for("u1"), Some(boundary));
    }

    #[test]
    fn failures_serialize_with_their_message() {
        let failure = UserFailure {
            user_id: "u9".into(),
            error: PurgeError::InvalidResetConfiguration { hour: 25, minute: 0 },
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["user_id"], "u9");
        assert_eq!(json["error"], "Invalid reset configuration 25:00");
    }
}
