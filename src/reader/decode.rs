//! Decode queue between the reader and the main-thread apply pass.
//!
//! Requests are decoded inline, or on a background worker when threaded
//! decoding is enabled. Results come back as epoch-tagged batches over a
//! bounded channel; the stream drains it once per tick.

use std::sync::mpsc::{channel, sync_channel, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rayon::prelude::*;

use super::{NodeId, Sample, SceneReader};
use crate::config::ReaderConfig;
use crate::util::{Chrono, Result};

/// Maximum number of decoded batches waiting for the apply pass.
pub const DECODE_QUEUE_DEPTH: usize = 4;

/// One node to decode, with its resolved configuration.
#[derive(Clone, Debug)]
pub struct DecodeRequest {
    pub node: NodeId,
    pub config: ReaderConfig,
}

/// Samples decoded for one tick.
#[derive(Debug)]
pub struct DecodeBatch {
    pub epoch: u64,
    pub time: Chrono,
    pub samples: Vec<(NodeId, Result<Sample>)>,
}

enum WorkerCommand {
    Decode {
        epoch: u64,
        time: Chrono,
        requests: Vec<DecodeRequest>,
    },
    Stop,
}

struct WorkerHandle {
    tx: Sender<WorkerCommand>,
    rx: Option<Receiver<DecodeBatch>>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    fn spawn(reader: Arc<dyn SceneReader>) -> Self {
        let (cmd_tx, cmd_rx) = channel::<WorkerCommand>();
        let (res_tx, res_rx) = sync_channel::<DecodeBatch>(DECODE_QUEUE_DEPTH);

        let handle = thread::Builder::new()
            .name("alembic-decode".into())
            .spawn(move || worker_loop(reader, cmd_rx, res_tx))
            .ok();

        Self {
            tx: cmd_tx,
            rx: Some(res_rx),
            handle,
        }
    }

    fn stop(&mut self) {
        // Dropping the receiver unblocks a worker waiting on a full queue.
        self.rx = None;
        let _ = self.tx.send(WorkerCommand::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(reader: Arc<dyn SceneReader>, rx: Receiver<WorkerCommand>, tx: SyncSender<DecodeBatch>) {
    loop {
        let cmd = match rx.recv() {
            Ok(cmd) => cmd,
            Err(_) => break,
        };

        match cmd {
            WorkerCommand::Decode {
                epoch,
                time,
                requests,
            } => {
                // Scrubbing queues requests faster than we decode; keep the latest.
                let Some((epoch, time, requests)) = drain_to_latest(&rx, epoch, time, requests) else {
                    break;
                };
                let _span = tracing::debug_span!("decode_batch", epoch, count = requests.len()).entered();
                let samples = requests
                    .par_iter()
                    .map(|r| (r.node, reader.sample(r.node, time, &r.config)))
                    .collect();
                if tx.send(DecodeBatch { epoch, time, samples }).is_err() {
                    break;
                }
            }
            WorkerCommand::Stop => break,
        }
    }
}

/// Returns `None` when a stop request was found in the queue.
fn drain_to_latest(
    rx: &Receiver<WorkerCommand>,
    mut epoch: u64,
    mut time: Chrono,
    mut requests: Vec<DecodeRequest>,
) -> Option<(u64, Chrono, Vec<DecodeRequest>)> {
    while let Ok(cmd) = rx.try_recv() {
        match cmd {
            WorkerCommand::Decode {
                epoch: e,
                time: t,
                requests: r,
            } => {
                epoch = e;
                time = t;
                requests = r;
            }
            WorkerCommand::Stop => return None,
        }
    }
    Some((epoch, time, requests))
}

/// Front end used by the stream: same API for inline and threaded decode.
pub struct Decoder {
    reader: Arc<dyn SceneReader>,
    worker: Option<WorkerHandle>,
    ready: Vec<DecodeBatch>,
}

impl Decoder {
    pub fn new(reader: Arc<dyn SceneReader>, threaded: bool) -> Self {
        let worker = threaded.then(|| WorkerHandle::spawn(Arc::clone(&reader)));
        Self {
            reader,
            worker,
            ready: Vec::new(),
        }
    }

    pub fn is_threaded(&self) -> bool {
        self.worker.is_some()
    }

    /// Queue a batch. Inline decoders decode immediately.
    pub fn submit(&mut self, epoch: u64, time: Chrono, requests: Vec<DecodeRequest>) {
        if requests.is_empty() {
            return;
        }
        match &self.worker {
            Some(worker) => {
                let _ = worker.tx.send(WorkerCommand::Decode { epoch, time, requests });
            }
            None => {
                let samples = requests
                    .iter()
                    .map(|r| (r.node, self.reader.sample(r.node, time, &r.config)))
                    .collect();
                self.ready.push(DecodeBatch { epoch, time, samples });
            }
        }
    }

    /// Take every batch that is ready, without blocking.
    pub fn drain(&mut self) -> Vec<DecodeBatch> {
        let mut batches = std::mem::take(&mut self.ready);
        if let Some(rx) = self.worker.as_ref().and_then(|w| w.rx.as_ref()) {
            while let Ok(batch) = rx.try_recv() {
                batches.push(batch);
            }
        }
        batches
    }

    /// Block until the next batch is available (threaded) or return the
    /// pending inline batches.
    pub fn wait(&mut self) -> Vec<DecodeBatch> {
        if !self.ready.is_empty() {
            return std::mem::take(&mut self.ready);
        }
        match self.worker.as_ref().and_then(|w| w.rx.as_ref()) {
            Some(rx) => rx.recv().map(|b| vec![b]).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Stop decoding and discard anything not yet consumed.
    pub fn quiesce(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        self.ready.clear();
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.quiesce();
    }
}
