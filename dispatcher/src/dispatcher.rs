//! A fixed pool of workers draining a shallow job queue.
//!
//! # Shutdown
//!
//! Shutdown is two-phase. [Dispatcher::submit] records an expected completion before a job is
//! queued and workers record the completion after the job's outcomes reach the [Sink].
//! [Dispatcher::shutdown] first waits until every expected completion was observed and only
//! then stops the workers, one signal each, and joins all of them. A worker is therefore never
//! told to exit while a job is queued or in flight, unless another worker died first.

use crate::{
    gateway::Gateway,
    job::Job,
    metrics::Metrics,
    outcome::Sink,
    sender::Sender,
    Error,
};
use futures::future::{join_all, pending, select_all};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::{
    sync::{mpsc, oneshot, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info};

/// Number of jobs the queue holds before [Dispatcher::submit] waits for a worker.
pub const QUEUE_DEPTH: usize = 1;

/// Counts jobs that were submitted but not yet completed.
struct Tracker {
    outstanding: watch::Sender<usize>,
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl Tracker {
    fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            outstanding,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    /// Record that one more completion is expected.
    fn expect(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.outstanding.send_modify(|outstanding| *outstanding += 1);
    }

    /// Withdraw an expected completion for a job that was never queued.
    fn withdraw(&self) {
        self.submitted.fetch_sub(1, Ordering::Relaxed);
        self.outstanding.send_modify(|outstanding| *outstanding -= 1);
    }

    /// Record that a job completed.
    fn complete(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.outstanding.send_modify(|outstanding| *outstanding -= 1);
    }

    /// Wait until every expected completion was recorded.
    async fn drained(&self) {
        let mut outstanding = self.outstanding.subscribe();
        // The sender is owned by `self`, so the channel cannot close while we wait
        let _ = outstanding.wait_for(|outstanding| *outstanding == 0).await;
    }
}

/// Totals of a finished dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub submitted: u64,
    pub completed: u64,
}

/// Handle to a running worker.
struct Worker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Executes [Job]s on a fixed number of concurrent workers.
pub struct Dispatcher {
    queue: mpsc::Sender<Job>,
    tracker: Arc<Tracker>,
    workers: Vec<Worker>,
    metrics: Metrics,
}

impl Dispatcher {
    /// Start `workers` workers executing jobs with `sender` and recording outcomes to `sink`.
    ///
    /// Workers are running (and waiting for jobs) when this returns.
    pub fn start<G: Gateway, S: Sink>(
        workers: usize,
        sender: Sender<G>,
        sink: S,
        metrics: Metrics,
    ) -> Self {
        let (queue, receiver) = mpsc::channel(QUEUE_DEPTH);
        let receiver = Arc::new(Mutex::new(receiver));
        let tracker = Arc::new(Tracker::new());

        let workers = (0..workers)
            .map(|index| {
                let (stop, stopped) = oneshot::channel();
                let handle = tokio::spawn(run(
                    index,
                    receiver.clone(),
                    stopped,
                    sender.clone(),
                    sink.clone(),
                    tracker.clone(),
                    metrics.clone(),
                ));
                Worker { stop, handle }
            })
            .collect::<Vec<_>>();
        info!(workers = workers.len(), "started workers");

        Self {
            queue,
            tracker,
            workers,
            metrics,
        }
    }

    /// Queue `job` for execution, waiting while the queue is full.
    pub async fn submit(&self, job: Job) -> Result<(), Error> {
        let phones = job.phones.len() as u64;
        self.tracker.expect();
        if self.queue.send(job).await.is_err() {
            self.tracker.withdraw();
            return Err(Error::Closed);
        }
        self.metrics.batches.inc();
        self.metrics.phones.inc_by(phones);
        Ok(())
    }

    /// Returns the number of jobs submitted and not yet completed.
    pub fn outstanding(&self) -> usize {
        *self.tracker.outstanding.borrow()
    }

    /// Wait for every submitted job to complete, then stop and join all workers.
    ///
    /// A worker that exits while jobs are outstanding (it panicked) ends the wait early: the
    /// remaining workers are stopped after their current job and the returned [Summary]
    /// reports fewer completed than submitted jobs.
    pub async fn shutdown(self) -> Summary {
        let Self {
            queue,
            tracker,
            workers,
            ..
        } = self;
        let (stops, mut handles): (Vec<_>, Vec<_>) = workers
            .into_iter()
            .map(|worker| (worker.stop, worker.handle))
            .unzip();

        let exited = async {
            if handles.is_empty() {
                return pending().await;
            }
            let (result, index, _) = select_all(handles.iter_mut()).await;
            (index, result)
        };
        let exited = tokio::select! {
            _ = tracker.drained() => None,
            exited = exited => Some(exited),
        };
        match exited {
            Some((index, result)) => {
                error!(
                    worker = index,
                    outstanding = *tracker.outstanding.borrow(),
                    ?result,
                    "worker failed"
                );
                handles.swap_remove(index);
            }
            None => debug!("drained queue"),
        }

        for stop in stops {
            // A worker that already exited has nothing left to stop
            let _ = stop.send(());
        }
        drop(queue);
        for result in join_all(handles).await {
            if let Err(err) = result {
                error!(?err, "worker failed");
            }
        }
        info!("stopped workers");

        Summary {
            submitted: tracker.submitted.load(Ordering::Relaxed),
            completed: tracker.completed.load(Ordering::Relaxed),
        }
    }
}

/// Execute jobs one at a time until stopped.
async fn run<G: Gateway, S: Sink>(
    index: usize,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    mut stopped: oneshot::Receiver<()>,
    sender: Sender<G>,
    mut sink: S,
    tracker: Arc<Tracker>,
    metrics: Metrics,
) {
    debug!(worker = index, "worker up");
    loop {
        let job = tokio::select! {
            biased;
            _ = &mut stopped => break,
            job = async { queue.lock().await.recv().await } => match job {
                Some(job) => job,
                None => break,
            },
        };
        let outcomes = sender.execute(&job).await;
        sink.record(outcomes).await;
        metrics.completed.inc();
        tracker.complete();
    }
    debug!(worker = index, "worker down");
}
