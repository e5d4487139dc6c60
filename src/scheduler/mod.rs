//! Background timer service.
//!
//! Every state machine is driven by named interval jobs that get paused,
//! resumed with a fresh interval, and rescheduled. Job callbacks never
//! reach into handler state directly — they enqueue work instead: a job
//! fire is delivered as a `TimerEvent` on an mpsc channel the coordinator
//! selects on alongside its receive channel, so all handler state mutation
//! stays on the single coordinator task.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// The fixed set of timer-driven events a job can fire. Each variant
/// corresponds to exactly one scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    DiscoveryTick,
    BullyCall,
    BullyCallResponseTimeout,
    BullyCoordinatorTimeout,
    PhaseKingInit,
    PhaseKingStart,
}

enum JobCommand {
    Pause,
    Resume(Option<Duration>),
    Reschedule(Duration),
    Cancel,
}

/// A handle to a running job: pause/resume/reschedule, mirroring
/// `add_job`'s returned job object in the source.
pub struct JobHandle {
    tx: mpsc::UnboundedSender<JobCommand>,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub fn pause(&self) {
        let _ = self.tx.send(JobCommand::Pause);
    }

    /// Resume the job. If `interval` is given, the job's period is reset
    /// to it and it restarts a full countdown from now — "resume_job" in
    /// the source always reschedules with the full interval before
    /// resuming, so callers should pass `Some(interval)` to match that.
    pub fn resume(&self, interval: Option<Duration>) {
        let _ = self.tx.send(JobCommand::Resume(interval));
    }

    pub fn reschedule(&self, interval: Duration) {
        let _ = self.tx.send(JobCommand::Reschedule(interval));
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(JobCommand::Cancel);
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Supplies interval jobs identified by a stable id; adding a job with an
/// id that is already registered cancels and replaces the existing one.
pub struct Scheduler {
    events_tx: mpsc::UnboundedSender<TimerEvent>,
    jobs: HashMap<&'static str, JobHandle>,
}

impl Scheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                events_tx,
                jobs: HashMap::new(),
            },
            events_rx,
        )
    }

    /// Register (or replace) a job, starting paused. Callers resume it
    /// explicitly, matching the source's pattern of creating every job
    /// paused except the one driving the handler's initial kick-off.
    pub fn add_job(&mut self, id: &'static str, interval: Duration, event: TimerEvent) {
        if let Some(existing) = self.jobs.remove(id) {
            existing.cancel();
        }

        let (tx, mut cmd_rx) = mpsc::unbounded_channel::<JobCommand>();
        let events_tx = self.events_tx.clone();

        let task = tokio::spawn(async move {
            let mut interval_dur = interval;
            let mut paused = true;
            let mut deadline = Instant::now() + interval_dur;

            loop {
                let sleep = tokio::time::sleep_until(deadline);
                tokio::select! {
                    _ = sleep, if !paused => {
                        if events_tx.send(event).is_err() {
                            return;
                        }
                        deadline = Instant::now() + interval_dur;
                    }
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(JobCommand::Pause) => paused = true,
                            Some(JobCommand::Resume(new_interval)) => {
                                if let Some(d) = new_interval {
                                    interval_dur = d;
                                }
                                paused = false;
                                deadline = Instant::now() + interval_dur;
                            }
                            Some(JobCommand::Reschedule(d)) => {
                                interval_dur = d;
                                deadline = Instant::now() + interval_dur;
                            }
                            Some(JobCommand::Cancel) | None => return,
                        }
                    }
                }
            }
        });

        self.jobs.insert(id, JobHandle { tx, task });
    }

    pub fn job(&self, id: &str) -> Option<&JobHandle> {
        self.jobs.get(id)
    }

    pub fn pause(&self, id: &str) {
        if let Some(job) = self.jobs.get(id) {
            job.pause();
        }
    }

    pub fn resume(&self, id: &str, interval: Duration) {
        if let Some(job) = self.jobs.get(id) {
            job.resume(Some(interval));
        }
    }

    pub fn reschedule(&self, id: &str, interval: Duration) {
        if let Some(job) = self.jobs.get(id) {
            job.reschedule(interval);
        }
    }
}
