//! Long-running tasks of the bot.
//!
//! | Task          | Runs                         | Stops on                  |
//! |---------------|------------------------------|---------------------------|
//! | Event pump    | Per event, up to `workers`   | shutdown or closed stream |
//! | Grant worker  | Per queued role grant        | shutdown                  |
//! | Sweeper       | Every `sweep_interval`       | shutdown                  |
//!
//! Every event handler runs in its own task under a soft deadline. A handler
//! that overruns is cancelled; engine writes are atomic, so a cancelled
//! handler leaves either the whole write or none of it. A panicking handler
//! takes down only its own task.

use std::sync::Arc;
use std::time::Duration;

use guildkeep_core::sweeper::Sweeper;
use guildkeep_platform::queue::GrantWorker;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::events::PlatformEvent;
use crate::ingress::Ingress;

/// Outcome counters of an [`EventPump`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Handlers that finished in time.
    pub handled: u64,
    /// Handlers cancelled at the deadline.
    pub timed_out: u64,
    /// Handlers that panicked.
    pub panicked: u64,
}

/// Bounded pool feeding events to an [`Ingress`].
#[derive(Debug)]
pub struct EventPump {
    ingress: Arc<Ingress>,
    workers: usize,
    deadline: Duration,
}

enum Finished {
    Done,
    TimedOut,
}

impl EventPump {
    /// Pool of `workers` concurrent handlers, each cancelled after
    /// `deadline`.
    #[must_use]
    pub fn new(ingress: Arc<Ingress>, workers: usize, deadline: Duration) -> Self {
        Self {
            ingress,
            workers: workers.max(1),
            deadline,
        }
    }

    /// Consume `events` until the stream closes or `shutdown` fires, then
    /// wait for in-flight handlers.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<PlatformEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> PumpStats {
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut running: JoinSet<Finished> = JoinSet::new();
        let mut stats = PumpStats::default();
        info!(workers = self.workers, deadline_ms = self.deadline.as_millis() as u64, "Event pump started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    tally(&mut stats, joined);
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let Ok(permit) = Arc::clone(&permits).acquire_owned().await else { break };
                    let ingress = Arc::clone(&self.ingress);
                    let deadline = self.deadline;
                    running.spawn(async move {
                        let _permit = permit;
                        let kind = event.kind();
                        match tokio::time::timeout(deadline, ingress.handle(event)).await {
                            Ok(()) => Finished::Done,
                            Err(_) => {
                                warn!(event = kind, deadline_ms = deadline.as_millis() as u64, "Handler exceeded deadline, cancelled");
                                Finished::TimedOut
                            }
                        }
                    });
                }
            }
        }

        debug!(in_flight = running.len(), "Event pump draining");
        while let Some(joined) = running.join_next().await {
            tally(&mut stats, joined);
        }
        info!(
            handled = stats.handled,
            timed_out = stats.timed_out,
            panicked = stats.panicked,
            "Event pump stopped"
        );
        stats
    }
}

fn tally(stats: &mut PumpStats, joined: Result<Finished, tokio::task::JoinError>) {
    match joined {
        Ok(Finished::Done) => stats.handled += 1,
        Ok(Finished::TimedOut) => stats.timed_out += 1,
        Err(e) => {
            stats.panicked += 1;
            error!(error = %e, "Event handler aborted");
        }
    }
}

/// Start the sweeper and the grant retry worker.
#[must_use]
pub fn spawn_background(
    sweeper: Sweeper,
    sweep_every: Duration,
    grants: GrantWorker,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(sweeper.run(sweep_every, shutdown.subscribe())),
        tokio::spawn(grants.run(shutdown.subscribe())),
    ]
}
