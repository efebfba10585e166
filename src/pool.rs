use crate::error::KafviewError;
use crate::error::Result;
use crate::message::TopicMessage;
use crate::record::RawRecord;
use crate::worker::JobSource;
use crate::worker::PipelineContext;
use crate::worker::Worker;
use crate::worker::WorkerExit;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How each worker of a pool ended.
#[rustfmt::skip]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    pub drained:     usize,
    pub cancelled:   usize,
    pub sink_closed: usize,
    pub crashed:     usize,
}

impl PoolSummary {
    fn record(&mut self, exit: WorkerExit) {
        match exit {
            WorkerExit::Drained => self.drained += 1,
            WorkerExit::Cancelled => self.cancelled += 1,
            WorkerExit::SinkClosed => self.sink_closed += 1,
            WorkerExit::Crashed => self.crashed += 1,
        }
    }

    pub fn total(&self) -> usize { self.drained + self.cancelled + self.sink_closed + self.crashed }
}

/// A fixed set of workers fed from one job queue and writing into one result queue.
///
/// The pool never reads or writes records itself. Workers stop when the job queue is closed and
/// drained, or as soon as `cancel` fires. No ordering holds across workers: two records taken by
/// different workers may be emitted in either order. Callers that need per-partition order must
/// shard records before they reach the pool.
///
/// Dropping the pool without [`join`](WorkerPool::join) aborts the workers.
pub struct WorkerPool {
    workers: JoinSet<WorkerExit>,
}

impl WorkerPool {
    pub fn spawn(
        ctx: Arc<PipelineContext>,
        jobs: mpsc::Receiver<RawRecord>,
        results: mpsc::Sender<TopicMessage>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Result<WorkerPool> {
        if workers == 0 {
            return Err(KafviewError::InvalidWorkerCount(workers));
        }
        let jobs = JobSource::new(jobs);
        let mut set = JoinSet::new();
        for id in 0..workers {
            let worker = Worker::new(id, Arc::clone(&ctx), jobs.clone(), results.clone(), cancel.clone());
            set.spawn(worker.run());
        }
        debug!("started {} message workers", workers);
        Ok(WorkerPool { workers: set })
    }

    pub fn len(&self) -> usize { self.workers.len() }

    pub fn is_empty(&self) -> bool { self.workers.is_empty() }

    /// Waits for every worker to stop. The result queue is exhausted once this returns.
    pub async fn join(mut self) -> PoolSummary {
        let mut summary = PoolSummary::default();
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(exit) => summary.record(exit),
                Err(err) if err.is_panic() => {
                    error!("message worker panicked outside record processing: {}", err);
                    summary.crashed += 1;
                },
                Err(err) => {
                    warn!("message worker task did not finish: {}", err);
                    summary.crashed += 1;
                },
            }
        }
        info!(
            "message workers stopped: {} drained, {} cancelled, {} sink closed, {} crashed",
            summary.drained, summary.cancelled, summary.sink_closed, summary.crashed
        );
        summary
    }
}

/// Spawns `workers` workers and waits for all of them.
pub async fn run(
    ctx: Arc<PipelineContext>,
    jobs: mpsc::Receiver<RawRecord>,
    results: mpsc::Sender<TopicMessage>,
    workers: usize,
    cancel: CancellationToken,
) -> Result<PoolSummary> {
    let pool = WorkerPool::spawn(ctx, jobs, results, workers, cancel)?;
    Ok(pool.join().await)
}

/// Exposes the result queue as a stream that ends when every worker has stopped.
pub fn result_stream(mut results: mpsc::Receiver<TopicMessage>) -> impl Stream<Item = TopicMessage> {
    async_stream::stream! {
        while let Some(message) = results.recv().await {
            yield message;
        }
    }
}
