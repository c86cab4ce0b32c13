//! Bounded worker pool draining matching jobs.
//!
//! Jobs go through a `tokio::sync::mpsc` channel of fixed capacity. Producers
//! never wait: a full queue is reported as [`SubmitError::Overloaded`]. Workers
//! share the receiver and stop once the channel is closed and drained.

use std::sync::Arc;

use log::{debug, error, info};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::context::EngineContext;
use crate::orchestrator::run_job;

/// One request to match, to be finished before `deadline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchJob {
    pub request_id: Uuid,
    pub deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("matching queue is full")]
    Overloaded,
    #[error("matching workers are shutting down")]
    ShuttingDown,
}

/// Producer half of the job queue.
#[derive(Debug, Clone)]
pub struct JobSender {
    sender: mpsc::Sender<MatchJob>,
}

impl JobSender {
    pub fn submit(&self, job: MatchJob) -> Result<(), SubmitError> {
        self.sender.try_send(job).map_err(|err| match err {
            TrySendError::Full(_) => SubmitError::Overloaded,
            TrySendError::Closed(_) => SubmitError::ShuttingDown,
        })
    }
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<MatchJob>>>;

pub struct MatchWorkerPool {
    sender: JobSender,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl MatchWorkerPool {
    /// Spawn `config.worker_count` workers on the current runtime.
    pub fn start(ctx: Arc<EngineContext>, config: &WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let workers = (0..config.worker_count.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&ctx),
                    Arc::clone(&receiver),
                    shutdown_rx.clone(),
                ))
            })
            .collect::<Vec<_>>();
        info!(
            "matching workers started workers={} queue_capacity={}",
            workers.len(),
            config.queue_capacity
        );

        Self {
            sender: JobSender { sender },
            shutdown,
            workers,
        }
    }

    pub fn sender(&self) -> JobSender {
        self.sender.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue, let workers finish what is already queued, then join them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.workers {
            if let Err(err) = handle.await {
                error!("matching worker panicked: {err}");
            }
        }
        info!("matching workers stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<EngineContext>,
    receiver: SharedReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            if *shutdown.borrow() {
                rx.close();
            }
            tokio::select! {
                biased;
                job = rx.recv() => job,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        rx.close();
                    }
                    continue;
                }
            }
        };
        match next {
            Some(job) => {
                debug!("worker={worker_id} picked request_id={}", job.request_id);
                run_job(&ctx, job).await;
            }
            None => break,
        }
    }
    debug!("worker={worker_id} exiting");
}
