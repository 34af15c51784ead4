//! A scripted in-process coordinator.
//!
//! Drives a [`WorkerNode`] running under [`run_node`] on its own thread, the
//! way a real coordinator would over the network: the first macro-chunk goes
//! out with `StartSearch`, later ones only in answer to `WorkRequest`, and
//! `NoMoreWork` once the script's range is used up.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::errors::{NodeError, Result};
use crate::worker_node::{
    CoordinatorMessage, NodeMessage, PipelineFactory, RecordRange, SearchKind, SearchResults,
    ShardProvider, WorkerNode, run_node,
};

/// One search to run through the node.
#[derive(Debug, Clone)]
pub struct SearchScript {
    /// Database to search.
    pub database: u32,
    /// Search direction.
    pub kind: SearchKind,
    /// Model or sequence bytes.
    pub query: Arc<[u8]>,
    /// Full range to cover.
    pub range: RecordRange,
    /// Records handed out per `StartSearch`/`AddWorkChunk`.
    pub macro_chunk: u64,
}

impl SearchScript {
    /// The script's range cut into macro-chunks.
    #[must_use]
    pub fn macro_chunks(&self) -> Vec<RecordRange> {
        self.range.chunks(self.macro_chunk.max(1)).collect()
    }
}

/// Coordinator end of the channels to a node thread.
pub struct ScriptedCoordinator {
    to_node: Sender<CoordinatorMessage>,
    from_node: Receiver<NodeMessage>,
    driver: Option<JoinHandle<Result<()>>>,
    work_requests: u64,
}

impl ScriptedCoordinator {
    /// Move `node` onto a driver thread and connect to it.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ThreadSpawn`] if the driver thread cannot start.
    pub fn spawn<S: ShardProvider, F: PipelineFactory>(node: WorkerNode<S, F>) -> Result<Self> {
        let (to_node, inbox) = unbounded();
        let (outbox, from_node) = unbounded();
        let driver = std::thread::Builder::new()
            .name("hmmnode-driver".to_string())
            .spawn(move || run_node(node, &inbox, &outbox))
            .map_err(|e| NodeError::ThreadSpawn { thread_id: usize::MAX, reason: e.to_string() })?;
        Ok(Self { to_node, from_node, driver: Some(driver), work_requests: 0 })
    }

    /// Work requests answered so far.
    #[must_use]
    pub fn work_requests(&self) -> u64 {
        self.work_requests
    }

    /// Run one search to completion.
    ///
    /// # Errors
    ///
    /// Returns the node's reason if it aborts the search, or
    /// [`NodeError::ShutDown`] if the node thread goes away.
    pub fn run_search(&mut self, script: &SearchScript) -> Result<SearchResults> {
        let mut chunks = script.macro_chunks().into_iter();
        let first = chunks.next().unwrap_or(RecordRange::EMPTY);
        self.send(CoordinatorMessage::StartSearch {
            database: script.database,
            range: first,
            query: Arc::clone(&script.query),
            kind: script.kind,
        })?;
        loop {
            match self.from_node.recv().map_err(|_| NodeError::ShutDown)? {
                NodeMessage::WorkRequest => {
                    self.work_requests += 1;
                    match chunks.next() {
                        Some(range) => self.send(CoordinatorMessage::AddWorkChunk { range })?,
                        None => self.send(CoordinatorMessage::NoMoreWork)?,
                    }
                }
                NodeMessage::SearchComplete(results) => return Ok(results),
                NodeMessage::SearchAborted { reason } => return Err(reason),
            }
        }
    }

    /// Send a raw message, for tests of protocol handling.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ShutDown`] if the node thread has exited.
    pub fn send(&self, message: CoordinatorMessage) -> Result<()> {
        self.to_node.send(message).map_err(|_| NodeError::ShutDown)
    }

    /// Receive the next raw message from the node.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ShutDown`] if the node thread has exited.
    pub fn recv(&self) -> Result<NodeMessage> {
        self.from_node.recv().map_err(|_| NodeError::ShutDown)
    }

    /// Tell the node to stop and wait for it.
    ///
    /// # Errors
    ///
    /// Returns the node's fatal error, if it had one.
    pub fn shutdown(mut self) -> Result<()> {
        // The node may already be gone; joining reports why.
        let _ = self.to_node.send(CoordinatorMessage::Shutdown);
        match self.driver.take() {
            Some(driver) => driver.join().map_err(|payload| NodeError::WorkerPanicked {
                thread_id: usize::MAX,
                message: crate::worker_node::extract_panic_message(payload),
            })?,
            None => Ok(()),
        }
    }
}

impl Drop for ScriptedCoordinator {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = self.to_node.send(CoordinatorMessage::Shutdown);
            let _ = driver.join();
        }
    }
}
