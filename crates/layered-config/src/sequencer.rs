//! Single-worker job queue applying watch completions in arrival order.

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

/// A unit of work run on the sequencer.
pub(crate) type Job = BoxFuture<'static, ()>;

/// Handle to a worker task draining an unbounded queue of jobs.
///
/// The worker exits once every handle is dropped and the queue is empty.
#[derive(Debug, Clone)]
pub(crate) struct Sequencer {
    jobs: mpsc::UnboundedSender<Job>,
}

impl Sequencer {
    /// Spawns the worker on the current Tokio runtime.
    pub(crate) fn start() -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = queue.recv().await {
                job.await;
            }
            debug!("completion sequencer stopped");
        });
        Self { jobs }
    }

    /// Queues `job`, handing it back when the worker is gone.
    pub(crate) fn submit(&self, job: Job) -> Result<(), Job> {
        self.jobs.send(job).map_err(|rejected| rejected.0)
    }
}
