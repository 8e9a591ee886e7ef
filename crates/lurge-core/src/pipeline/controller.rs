use super::worker::WorkerPool;
use super::{ControllerMessage, PartialResult, WorkerMessage};
use crate::error::Error;
use crate::progress::ProgressReporter;
use crossbeam_channel::Select;
use std::io;
use tracing::{debug, trace, warn};

/// How often the controller reports lines read, in lines.
const PROGRESS_INTERVAL: u64 = 100_000;
/// How often a lines-read debug record is emitted, in lines.
const LOG_INTERVAL: u64 = 5_000_000;

/// Streams one census file to a worker pool and collects the partial
/// results.
///
/// The pass moves through three phases: dispatching full batches to
/// whichever worker reports ready, draining the trailing short batch, and
/// finishing by telling each worker in turn to hand back its results.
pub struct VolumeController {
    volume: u32,
    pool: WorkerPool,
    batch_size: usize,
}

impl VolumeController {
    pub fn new(pool: WorkerPool, batch_size: usize) -> Self {
        Self {
            volume: pool.volume(),
            pool,
            batch_size: batch_size.max(1),
        }
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    /// Run a full pass over `lines`. Returns one partial result per worker.
    ///
    /// A read error or a lost worker aborts the pass. Either way every
    /// remaining worker is stopped and joined before returning.
    pub fn run<I>(mut self, lines: I, progress: &dyn ProgressReporter) -> Result<Vec<PartialResult>, Error>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        if let Err(err) = self.dispatch_all(lines, progress) {
            warn!("Volume {}: aborting pass: {}", self.volume, err);
            self.stop_workers();
            return Err(err);
        }
        self.finish()
    }

    /// Stop the workers without reading anything, e.g. when there turns out
    /// to be no census to read.
    pub fn shutdown(mut self) {
        debug!("Volume {}: shutting down idle workers", self.volume);
        self.stop_workers();
    }

    fn dispatch_all<I>(&self, lines: I, progress: &dyn ProgressReporter) -> Result<(), Error>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut lines_read: u64 = 0;

        for line in lines {
            batch.push(line?);
            lines_read += 1;

            if batch.len() == self.batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                self.send_to_ready_worker(full)?;
            }
            if lines_read % PROGRESS_INTERVAL == 0 {
                progress.on_lines_read(self.volume, lines_read);
            }
            if lines_read % LOG_INTERVAL == 0 {
                debug!("Volume {}: {} lines read", self.volume, lines_read);
            }
        }

        // Trailing short batch
        if !batch.is_empty() {
            self.send_to_ready_worker(batch)?;
        }
        progress.on_lines_read(self.volume, lines_read);
        debug!("Volume {}: finished reading {} lines", self.volume, lines_read);
        Ok(())
    }

    /// Block until any worker announces it is ready, then hand it `batch`.
    fn send_to_ready_worker(&self, batch: Vec<String>) -> Result<(), Error> {
        let workers = self.pool.workers();
        let mut select = Select::new();
        for worker in workers {
            select.recv(&worker.outbox);
        }
        let op = select.select();
        let worker = &workers[op.index()];

        match op.recv(&worker.outbox) {
            Ok(WorkerMessage::Ready) => {
                trace!("Volume {}: batch of {} to worker {}", self.volume, batch.len(), worker.id);
                worker
                    .inbox
                    .send(ControllerMessage::Batch(batch))
                    .map_err(|_| self.lost(worker.id))
            }
            Ok(WorkerMessage::Finished(_)) => {
                // Workers only finish after `Done`, which has not been sent yet.
                warn!("Volume {}: worker {} finished early", self.volume, worker.id);
                Err(self.lost(worker.id))
            }
            Err(_) => Err(self.lost(worker.id)),
        }
    }

    /// Send `Done` to each worker in order and wait for its result. A worker
    /// may still have an unanswered `Ready` queued, which is skipped.
    fn finish(mut self) -> Result<Vec<PartialResult>, Error> {
        let mut partials = Vec::with_capacity(self.pool.len());
        let mut lost = None;

        for worker in self.pool.workers() {
            if worker.inbox.send(ControllerMessage::Done).is_err() {
                lost.get_or_insert(worker.id);
                continue;
            }
            loop {
                match worker.outbox.recv() {
                    Ok(WorkerMessage::Finished(partial)) => {
                        partials.push(partial);
                        break;
                    }
                    Ok(WorkerMessage::Ready) => continue,
                    Err(_) => {
                        lost.get_or_insert(worker.id);
                        break;
                    }
                }
            }
        }
        self.pool.join();

        match lost {
            Some(worker) => Err(self.lost(worker)),
            None => {
                debug!("Volume {}: collected {} partial results", self.volume, partials.len());
                Ok(partials)
            }
        }
    }

    fn stop_workers(&mut self) {
        for worker in self.pool.workers() {
            let _ = worker.inbox.send(ControllerMessage::Done);
        }
        self.pool.join();
    }

    fn lost(&self, worker: usize) -> Error {
        Error::WorkerLost {
            volume: self.volume,
            worker,
        }
    }
}
