use super::{ControllerMessage, PartialResult, PassContext, PassStats, WorkerMessage};
use crate::aggregate::AggregateMap;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace};

/// The controller's end of one worker's channels.
pub struct WorkerHandle {
    pub id: usize,
    pub(crate) inbox: Sender<ControllerMessage>,
    pub(crate) outbox: Receiver<WorkerMessage>,
    thread: Option<JoinHandle<()>>,
}

/// Fixed-size set of worker threads owned by one volume controller.
pub struct WorkerPool {
    volume: u32,
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing `ctx`. Each worker gets its own pair of
    /// channels, so the controller always knows who it is talking to.
    pub fn spawn(ctx: Arc<PassContext>, size: usize) -> io::Result<Self> {
        Self::spawn_with(ctx, size, run_worker)
    }

    /// Like [`WorkerPool::spawn`], with `body` as the thread loop.
    pub(super) fn spawn_with<F>(ctx: Arc<PassContext>, size: usize, body: F) -> io::Result<Self>
    where
        F: Fn(usize, Arc<PassContext>, Receiver<ControllerMessage>, Sender<WorkerMessage>) + Clone + Send + 'static,
    {
        let volume = ctx.volume;
        let mut workers = Vec::with_capacity(size);

        for id in 0..size.max(1) {
            let (inbox_tx, inbox_rx) = unbounded();
            let (outbox_tx, outbox_rx) = unbounded();
            let ctx = Arc::clone(&ctx);
            let body = body.clone();
            let thread = thread::Builder::new()
                .name(format!("lurge-v{}-w{}", volume, id))
                .spawn(move || body(id, ctx, inbox_rx, outbox_tx))?;
            workers.push(WorkerHandle {
                id,
                inbox: inbox_tx,
                outbox: outbox_rx,
                thread: Some(thread),
            });
        }

        debug!("Volume {}: spawned {} workers", volume, workers.len());
        Ok(Self { volume, workers })
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub(crate) fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// Wait for every worker thread to exit. Callers must have sent `Done`
    /// to each worker first.
    pub(crate) fn join(&mut self) {
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    error!("Volume {}: worker {} panicked", self.volume, worker.id);
                }
            }
        }
    }
}

pub(super) fn run_worker(
    id: usize,
    ctx: Arc<PassContext>,
    inbox: Receiver<ControllerMessage>,
    outbox: Sender<WorkerMessage>,
) {
    let mut aggregates = AggregateMap::new();
    let mut stats = PassStats::default();

    loop {
        trace!("Volume {} worker {}: requesting work", ctx.volume, id);
        if outbox.send(WorkerMessage::Ready).is_err() {
            return;
        }

        match inbox.recv() {
            Ok(ControllerMessage::Batch(lines)) => {
                for line in &lines {
                    ctx.accumulate_line(line, &mut aggregates, &mut stats);
                }
            }
            Ok(ControllerMessage::Done) => {
                debug!(
                    "Volume {} worker {}: done, returning {} keys",
                    ctx.volume,
                    id,
                    aggregates.len()
                );
                let _ = outbox.send(WorkerMessage::Finished(PartialResult {
                    worker_id: id,
                    aggregates,
                    stats,
                }));
                return;
            }
            Err(_) => return,
        }
    }
}
