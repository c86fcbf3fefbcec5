//! Single-task scheduler driving every timed part of the service.
//!
//! One tokio task owns all time-based work so sweeps, delayed jobs and
//! administrative commands never interleave:
//!
//! * Commands arrive over an unbounded channel; request/response commands
//!   carry a `oneshot` reply sender.
//! * Delayed jobs (the elimination settle delay and the two departure
//!   rechecks) sit in a small queue keyed by their earliest run time.
//! * Three intervals drive the corpse sweep, the death message sweep and the
//!   arena-state reconciliation. A reload that changes any cadence rebuilds them.
//!
//! Shutdown stops the loop first and only then tears down every registry, so
//! no sweep can run concurrently with the teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};

use crate::backend::PresentationBackend;
use crate::config::{Config, MAX_INTERVAL_MS};
use crate::coordinator::{ContextId, Coordinator};
use crate::intake::EliminationEvent;
use crate::proxy::ParticipantId;
use crate::service::{ProxyService, ServiceStatus};

/// Poll granularity for the delayed job queue.
const TICK: Duration = Duration::from_millis(25);

/// Timing knobs resolved from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub corpse_sweep: Duration,
    pub annotation_sweep: Duration,
    /// First death message sweep; later sweeps follow `annotation_sweep`.
    pub annotation_initial: Duration,
    pub reconcile: Duration,
    pub settle_delay: Duration,
    pub first_recheck: Duration,
    pub safety_recheck: Duration,
}

impl Cadence {
    /// Every duration is clamped to [`MAX_INTERVAL_MS`].
    pub fn from_config(config: &Config) -> Self {
        let annotation_sweep =
            capped(Duration::from_millis(config.death_message.cleanup_interval_ms));
        let (first_recheck, safety_recheck) = config.state_recheck_delays();
        Self {
            corpse_sweep: capped(Duration::from_millis(config.corpse.cleanup_interval_ms)),
            annotation_sweep,
            annotation_initial: annotation_sweep.saturating_mul(2),
            reconcile: capped(Duration::from_millis(config.advanced.reconcile_interval_ms)),
            settle_delay: capped(config.creation_delay()),
            first_recheck: capped(first_recheck),
            safety_recheck: capped(safety_recheck),
        }
    }

    fn timers_differ(&self, other: &Cadence) -> bool {
        self.corpse_sweep != other.corpse_sweep
            || self.annotation_sweep != other.annotation_sweep
            || self.annotation_initial != other.annotation_initial
            || self.reconcile != other.reconcile
    }
}

fn capped(d: Duration) -> Duration {
    d.min(Duration::from_millis(MAX_INTERVAL_MS))
}

#[derive(Debug)]
enum Job {
    Settle(EliminationEvent),
    DeparturePass(ContextId),
}

#[derive(Debug)]
struct TimedJob {
    earliest: Instant,
    job: Job,
}

impl TimedJob {
    fn after(delay: Duration, job: Job) -> Self {
        Self {
            earliest: Instant::now() + delay,
            job,
        }
    }
}

pub enum ScheduleCommand {
    Eliminated(EliminationEvent),
    Departed {
        participant: ParticipantId,
        context: ContextId,
    },
    Reload(Box<Config>, oneshot::Sender<()>),
    Status(oneshot::Sender<ServiceStatus>),
    CleanupContext(ContextId, oneshot::Sender<usize>),
    Remove(ParticipantId, oneshot::Sender<bool>),
    PendingJobs(oneshot::Sender<usize>),
    /// Stop the loop, tear down every registry, reply with the number released.
    Shutdown(oneshot::Sender<usize>),
}

#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<ScheduleCommand>,
}

impl SchedulerHandle {
    /// Report an elimination. Returns `false` if the scheduler is gone.
    pub fn eliminated(&self, event: EliminationEvent) -> bool {
        self.tx.send(ScheduleCommand::Eliminated(event)).is_ok()
    }

    /// Report that `participant` left while attached to `context`.
    pub fn departed(&self, participant: ParticipantId, context: ContextId) -> bool {
        self.tx
            .send(ScheduleCommand::Departed {
                participant,
                context,
            })
            .is_ok()
    }

    pub async fn reload(&self, config: Config) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(ScheduleCommand::Reload(Box::new(config), tx))
            .is_ok()
        {
            rx.await.is_ok()
        } else {
            false
        }
    }

    pub async fn status(&self) -> Option<ServiceStatus> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(ScheduleCommand::Status(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    pub async fn cleanup_context(&self, context: ContextId) -> Option<usize> {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(ScheduleCommand::CleanupContext(context, tx))
            .is_ok()
        {
            rx.await.ok()
        } else {
            None
        }
    }

    pub async fn remove(&self, participant: ParticipantId) -> Option<bool> {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(ScheduleCommand::Remove(participant, tx))
            .is_ok()
        {
            rx.await.ok()
        } else {
            None
        }
    }

    /// Number of delayed jobs not yet run.
    pub async fn pending_jobs(&self) -> Option<usize> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(ScheduleCommand::PendingJobs(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    /// Stop the scheduler and release every live proxy. Returns how many
    /// proxies were released, or 0 if the scheduler had already stopped.
    pub async fn shutdown(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(ScheduleCommand::Shutdown(tx)).is_ok() {
            rx.await.unwrap_or(0)
        } else {
            0
        }
    }
}

struct Timers {
    corpse: Interval,
    annotation: Interval,
    reconcile: Interval,
}

impl Timers {
    fn new(cadence: &Cadence) -> Self {
        Self {
            corpse: delayed_interval(cadence.corpse_sweep, cadence.corpse_sweep),
            annotation: delayed_interval(cadence.annotation_initial, cadence.annotation_sweep),
            reconcile: delayed_interval(cadence.reconcile, cadence.reconcile),
        }
    }
}

fn delayed_interval(initial: Duration, period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + initial, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

pub fn start_scheduler<B, C>(service: Arc<ProxyService<B, C>>) -> SchedulerHandle
where
    B: PresentationBackend,
    C: Coordinator,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<ScheduleCommand>();
    let handle = SchedulerHandle { tx };

    tokio::spawn(async move {
        let mut cadence = Cadence::from_config(&service.config());
        let mut timers = Timers::new(&cadence);
        let mut jobs: Vec<TimedJob> = Vec::new();
        let mut shutdown_reply: Option<oneshot::Sender<usize>> = None;

        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("scheduler: all handles dropped");
                        break;
                    };
                    match cmd {
                        ScheduleCommand::Eliminated(event) => {
                            if service.admit_elimination(&event) {
                                jobs.push(TimedJob::after(cadence.settle_delay, Job::Settle(event)));
                            }
                        }
                        ScheduleCommand::Departed { participant, context } => {
                            debug!("Participant {} left arena {}; scheduling state checks", participant, context);
                            jobs.push(TimedJob::after(cadence.first_recheck, Job::DeparturePass(context.clone())));
                            jobs.push(TimedJob::after(cadence.safety_recheck, Job::DeparturePass(context)));
                        }
                        ScheduleCommand::Reload(config, done) => {
                            service.reload(*config);
                            let next = Cadence::from_config(&service.config());
                            if next.timers_differ(&cadence) {
                                timers = Timers::new(&next);
                            }
                            cadence = next;
                            let _ = done.send(());
                        }
                        ScheduleCommand::Status(resp) => { let _ = resp.send(service.status()); }
                        ScheduleCommand::CleanupContext(context, resp) => {
                            let _ = resp.send(service.cleanup_context(&context));
                        }
                        ScheduleCommand::Remove(participant, resp) => {
                            let _ = resp.send(service.remove(&participant));
                        }
                        ScheduleCommand::PendingJobs(resp) => { let _ = resp.send(jobs.len()); }
                        ScheduleCommand::Shutdown(done) => {
                            shutdown_reply = Some(done);
                            break;
                        }
                    }
                }
                _ = timers.corpse.tick() => {
                    let removed = service.sweep_corpses(Instant::now());
                    if removed > 0 {
                        debug!("scheduler: corpse sweep removed {}", removed);
                    }
                }
                _ = timers.annotation.tick() => {
                    service.sweep_annotations(Instant::now());
                }
                _ = timers.reconcile.tick() => {
                    let report = service.reconcile();
                    if !report.skipped.is_empty() {
                        debug!("scheduler: {} arenas skipped this cycle", report.skipped.len());
                    }
                }
                _ = tokio::time::sleep(TICK) => {}
            }

            if jobs.is_empty() {
                continue;
            }
            let now = Instant::now();
            let mut due: Vec<TimedJob> = Vec::new();
            let mut i = 0;
            while i < jobs.len() {
                if jobs[i].earliest <= now {
                    due.push(jobs.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            due.sort_by_key(|j| j.earliest);
            for timed in due {
                match timed.job {
                    Job::Settle(event) => {
                        service.settle_elimination(&event);
                    }
                    Job::DeparturePass(context) => {
                        service.departure_pass(&context);
                    }
                }
            }
        }

        if !jobs.is_empty() {
            debug!("scheduler: dropping {} pending jobs", jobs.len());
        }
        let released = service.teardown();
        info!("Corpse scheduler stopped");
        if let Some(done) = shutdown_reply {
            let _ = done.send(released);
        }
    });

    handle
}
