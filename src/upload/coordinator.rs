//! Fans part uploads out over a fixed pool of workers.
//!
//! Jobs sit in a queue drained by `min(parallel, parts)` spawned workers, and
//! each finished part reports back over a results channel. The first failure
//! ends the run: workers stop taking new parts, and parts already in flight
//! either finish in the background or are aborted, depending on
//! [`CoordinatorOptions::cancel_on_failure`].

use crate::api::Backend;
use crate::error::{Error, Result};
use crate::upload::part::{RetryPolicy, upload_part};
use crate::upload::progress::PartProgress;
use crate::upload::segment::Part;
use bytes::Bytes;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Everything one worker needs to upload a part.
#[derive(Debug, Clone)]
pub struct PartJob {
    pub part: Part,
    pub data: Bytes,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Maximum number of parts in flight.
    pub parallel: usize,
    pub retry: RetryPolicy,
    /// Abort in-flight siblings once any part fails permanently.
    pub cancel_on_failure: bool,
}

struct Worker<B: ?Sized> {
    id: usize,
    backend: Arc<B>,
    queue: Arc<Mutex<mpsc::Receiver<PartJob>>>,
    results: mpsc::Sender<Result<u64>>,
    retry: RetryPolicy,
    progress: Arc<PartProgress>,
    /// Aborts attempts in flight.
    abort: CancellationToken,
    /// Stops taking new jobs. A child of `abort`.
    halt: CancellationToken,
}

impl<B: Backend + ?Sized + 'static> Worker<B> {
    async fn run(self) {
        loop {
            if self.halt.is_cancelled() {
                break;
            }

            let job = self.queue.lock().await.recv().await;
            let Some(job) = job else {
                break;
            };

            let index = job.part.index;
            let progress = self.progress.clone();
            let result = upload_part(
                &*self.backend,
                &job.part,
                job.data,
                &job.url,
                &self.retry,
                &self.abort,
                move || progress.part_completed(),
            )
            .await;

            let failed = result.is_err();
            if self.results.send(result.map(|()| index)).await.is_err() {
                debug!("Worker {}: coordinator gone after part {index}", self.id);
            }
            if failed {
                break;
            }
        }
        debug!("Worker {} stopped", self.id);
    }
}

/// Uploads every job, returning once all parts succeeded or one failed.
///
/// # Errors
///
/// Returns the first [`Error::PartUploadError`] observed, or
/// [`Error::Cancelled`] if `cancel` fires before all parts are done.
pub async fn upload_parts<B: Backend + ?Sized + 'static>(
    backend: Arc<B>,
    jobs: Vec<PartJob>,
    options: &CoordinatorOptions,
    cancel: &CancellationToken,
    progress: Arc<PartProgress>,
) -> Result<()> {
    let total = jobs.len();
    if total == 0 {
        return Ok(());
    }

    let workers = options.parallel.clamp(1, total);
    info!("Uploading {total} parts with {workers} worker(s)");

    let (job_tx, job_rx) = mpsc::channel(total);
    for job in jobs {
        job_tx
            .send(job)
            .await
            .map_err(|_| Error::UploadError("Part queue closed unexpectedly".to_string()))?;
    }
    drop(job_tx);

    let queue = Arc::new(Mutex::new(job_rx));
    let (results_tx, mut results_rx) = mpsc::channel(total);
    let abort = cancel.child_token();
    let halt = abort.child_token();

    for id in 0..workers {
        let worker = Worker {
            id,
            backend: backend.clone(),
            queue: queue.clone(),
            results: results_tx.clone(),
            retry: options.retry.clone(),
            progress: progress.clone(),
            abort: abort.clone(),
            halt: halt.clone(),
        };
        tokio::spawn(worker.run());
    }
    drop(results_tx);

    let mut completed = 0;
    while let Some(result) = results_rx.recv().await {
        match result {
            Ok(index) => {
                completed += 1;
                debug!("Part {index} done ({completed}/{total})");
                if completed == total {
                    info!("All {total} parts uploaded");
                    return Ok(());
                }
            }
            Err(e) => {
                if options.cancel_on_failure {
                    warn!("Aborting in-flight parts after failure: {e}");
                    abort.cancel();
                } else {
                    warn!("Not scheduling further parts after failure: {e}");
                    halt.cancel();
                }
                return Err(e);
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Err(Error::UploadError(format!(
        "Only {completed} of {total} parts were uploaded"
    )))
}
