//! Grant queue: role grants that are retried off the hot path.
//!
//! When an inline grant fails transiently the caller enqueues it here. A
//! single worker drains the queue in FIFO order and applies each job under
//! the [`RetryPolicy`]; jobs that still fail are logged and dropped. The
//! queue is bounded: when full, new jobs are rejected and counted.

use std::sync::Arc;

use guildkeep_core::{GuildId, RoleId, UserId};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::platform::Platform;
use crate::retry::{with_backoff, RetryPolicy};

/// One pending grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantJob {
    /// Guild of the member.
    pub guild: GuildId,
    /// Receiving member.
    pub user: UserId,
    /// Role to grant.
    pub role: RoleId,
}

/// Counters describing queue activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrantStats {
    /// Jobs accepted.
    pub enqueued: u64,
    /// Jobs rejected because the queue was full or closed.
    pub dropped: u64,
    /// Jobs that eventually succeeded.
    pub granted: u64,
    /// Jobs abandoned after the final attempt.
    pub failed: u64,
}

/// Producer handle. Clones share the same queue.
#[derive(Clone)]
pub struct GrantQueue {
    tx: mpsc::Sender<GrantJob>,
    stats: Arc<Mutex<GrantStats>>,
}

impl std::fmt::Debug for GrantQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantQueue").field("stats", &*self.stats.lock()).finish()
    }
}

/// Consumer side; run it with [`GrantWorker::run`].
pub struct GrantWorker {
    rx: mpsc::Receiver<GrantJob>,
    platform: Arc<dyn Platform>,
    policy: RetryPolicy,
    stats: Arc<Mutex<GrantStats>>,
}

impl GrantQueue {
    /// A queue holding at most `capacity` jobs, and its worker.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, policy: RetryPolicy, capacity: usize) -> (Self, GrantWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(Mutex::new(GrantStats::default()));
        (
            Self {
                tx,
                stats: Arc::clone(&stats),
            },
            GrantWorker {
                rx,
                platform,
                policy,
                stats,
            },
        )
    }

    /// Enqueue `job`. Returns `false` if it was dropped.
    pub fn enqueue(&self, job: GrantJob) -> bool {
        let accepted = self.tx.try_send(job).is_ok();
        let mut stats = self.stats.lock();
        if accepted {
            stats.enqueued += 1;
        } else {
            stats.dropped += 1;
            warn!(user = %job.user, guild = %job.guild, role = %job.role, "Grant queue full, job dropped");
        }
        accepted
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> GrantStats {
        *self.stats.lock()
    }
}

impl GrantWorker {
    /// Apply one job under the retry policy. Returns whether it succeeded.
    pub async fn process(&self, job: GrantJob) -> bool {
        let result = with_backoff(&self.policy, "grant_role", || {
            self.platform.grant_role(job.guild, job.user, job.role)
        })
        .await;
        let mut stats = self.stats.lock();
        match result {
            Ok(()) => {
                stats.granted += 1;
                debug!(user = %job.user, guild = %job.guild, role = %job.role, "Queued grant applied");
                true
            }
            Err(e) => {
                stats.failed += 1;
                warn!(user = %job.user, guild = %job.guild, role = %job.role, error = %e, "Queued grant abandoned");
                false
            }
        }
    }

    /// Drain jobs until every producer is gone or `shutdown` fires. Jobs
    /// still queued at shutdown are not attempted.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Grant worker started");
        loop {
            tokio::select! {
                job = self.rx.recv() => match job {
                    Some(job) => {
                        self.process(job).await;
                    }
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        info!("Grant worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::mock::MockPlatform;
    use crate::types::Member;
    use std::time::Duration;

    const GUILD: GuildId = GuildId(1);

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }

    fn job(user: u64, role: u64) -> GrantJob {
        GrantJob {
            guild: GUILD,
            user: UserId(user),
            role: RoleId(role),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn worker_retries_transient_failures() {
        let mock = Arc::new(MockPlatform::new());
        mock.add_member(GUILD, Member::new(UserId(7), "ada", 1));
        mock.fail_next_grants(2, PlatformError::Unavailable("gateway".into()));
        let (queue, worker) = GrantQueue::new(mock.clone(), policy(), 8);

        assert!(queue.enqueue(job(7, 70)));
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(worker.run(rx));
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(()).expect("send");
        handle.await.expect("join");

        assert!(mock.member_roles(GUILD, UserId(7)).contains(&RoleId(70)));
        let stats = queue.stats();
        assert_eq!((stats.enqueued, stats.granted, stats.failed), (1, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_abandoned() {
        let mock = Arc::new(MockPlatform::new());
        mock.add_member(GUILD, Member::new(UserId(7), "ada", 1));
        mock.refuse_role(RoleId(70));
        let (queue, worker) = GrantQueue::new(mock.clone(), policy(), 8);
        assert!(!worker.process(job(7, 70)).await);
        assert_eq!(queue.stats().failed, 1);
        assert_eq!(mock.grant_attempts(), 1);
    }

    #[test]
    fn full_queue_drops_jobs() {
        let mock = Arc::new(MockPlatform::new());
        let (queue, _worker) = GrantQueue::new(mock, policy(), 1);
        assert!(queue.enqueue(job(1, 1)));
        assert!(!queue.enqueue(job(2, 2)));
        let stats = queue.stats();
        assert_eq!((stats.enqueued, stats.dropped), (1, 1));
    }
}
