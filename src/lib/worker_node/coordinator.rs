//! Message contract with the coordinator and the driver loop that serves it.
//!
//! The coordinator hands a node one search at a time: `StartSearch` with the
//! first macro-chunk, then `AddWorkChunk` for each later one, answering every
//! `WorkRequest` with either more work or `NoMoreWork`. The node reports
//! `SearchComplete` once all of its threads have parked, nothing is queued,
//! and the coordinator has said there is no more work.
//!
//! Transport is a pair of `crossbeam-channel` channels; the driver polls with
//! a timeout so it can notice parked threads and raised requests between
//! messages.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;

use super::handshake::RequestState;
use super::node::{NodeActivity, SearchResults, WorkerNode};
use super::pipeline::{PipelineFactory, SearchKind, ShardProvider};
use super::range::RecordRange;
use crate::errors::{NodeError, Result};

/// Messages from the coordinator to a node.
#[derive(Debug, Clone)]
pub enum CoordinatorMessage {
    /// Begin a new search with its first macro-chunk.
    StartSearch {
        /// Database to search.
        database: u32,
        /// First macro-chunk of record ids.
        range: RecordRange,
        /// The model (sequence search) or sequence (HMM search).
        query: Arc<[u8]>,
        /// Search direction.
        kind: SearchKind,
    },
    /// Another macro-chunk for the running search.
    AddWorkChunk {
        /// Record ids to add.
        range: RecordRange,
    },
    /// Reply to a work request: nothing left for this search.
    NoMoreWork,
    /// End the running search now, discarding unprocessed work.
    EndSearch,
    /// Stop the node.
    Shutdown,
}

/// Messages from a node to the coordinator.
#[derive(Debug, Clone)]
pub enum NodeMessage {
    /// The node's queue is running low.
    WorkRequest,
    /// The search finished; hits are merged and sorted.
    SearchComplete(SearchResults),
    /// The search was abandoned; the node is idle again.
    SearchAborted {
        /// Why the search stopped.
        reason: NodeError,
    },
}

/// Serve coordinator messages until `Shutdown` arrives or either channel
/// closes, then destroy the node.
///
/// Protocol violations abort the running search, are reported as
/// [`NodeMessage::SearchAborted`], and leave the node usable.
///
/// # Errors
///
/// Returns the fatal error if a worker thread dies.
pub fn run_node<S: ShardProvider, F: PipelineFactory>(
    mut node: WorkerNode<S, F>,
    inbox: &Receiver<CoordinatorMessage>,
    outbox: &Sender<NodeMessage>,
) -> Result<()> {
    let poll_interval = node.config().idle_poll_interval;
    let outcome = loop {
        match drive(&mut node, outbox) {
            Ok(true) => {}
            Ok(false) => break Ok(()),
            Err(e) => break Err(e),
        }
        let message = match inbox.recv_timeout(poll_interval) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("Coordinator disconnected");
                break Ok(());
            }
        };
        match handle_message(&mut node, message, outbox) {
            Ok(true) => {}
            Ok(false) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    let destroyed = node.destroy();
    outcome.and(destroyed)
}

/// Forward raised work requests and finish a drained search.
///
/// Returns false if the coordinator has gone away.
fn drive<S: ShardProvider, F: PipelineFactory>(
    node: &mut WorkerNode<S, F>,
    outbox: &Sender<NodeMessage>,
) -> Result<bool> {
    match node.poll() {
        NodeActivity::Idle => return Ok(true),
        NodeActivity::Working => {}
        NodeActivity::Failed => return finish_search(node, outbox),
        NodeActivity::Drained => match node.work_request_state() {
            RequestState::Exhausted => return finish_search(node, outbox),
            RequestState::Idle => {
                node.raise_work_request();
            }
            RequestState::Pending | RequestState::Requested => {}
        },
    }
    if node.take_work_request() {
        log::debug!("Requesting more work from the coordinator");
        return Ok(outbox.send(NodeMessage::WorkRequest).is_ok());
    }
    Ok(true)
}

fn handle_message<S: ShardProvider, F: PipelineFactory>(
    node: &mut WorkerNode<S, F>,
    message: CoordinatorMessage,
    outbox: &Sender<NodeMessage>,
) -> Result<bool> {
    let result = match message {
        CoordinatorMessage::StartSearch { database, range, query, kind } => match kind {
            SearchKind::Sequence => node.start_range_vs_model(database, range, query),
            SearchKind::Hmm => node.start_model_vs_range(database, range, query),
        },
        CoordinatorMessage::AddWorkChunk { range } => node.add_work(range),
        CoordinatorMessage::NoMoreWork => {
            if node.phase().is_active() {
                node.no_more_work();
            } else {
                log::debug!("Ignoring NoMoreWork while idle");
            }
            Ok(())
        }
        CoordinatorMessage::EndSearch => {
            if node.phase().is_active() {
                return finish_search(node, outbox);
            }
            Err(NodeError::ProtocolViolation {
                operation: "EndSearch",
                phase: node.phase().to_string(),
            })
        }
        CoordinatorMessage::Shutdown => {
            log::info!("Coordinator requested shutdown");
            return Ok(false);
        }
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            log::warn!("Rejected coordinator message: {e}");
            node.abort_search(e.clone())?;
            Ok(outbox.send(NodeMessage::SearchAborted { reason: e }).is_ok())
        }
    }
}

/// End the running search and report how it went.
fn finish_search<S: ShardProvider, F: PipelineFactory>(
    node: &mut WorkerNode<S, F>,
    outbox: &Sender<NodeMessage>,
) -> Result<bool> {
    let message = match node.end_search() {
        Ok(results) => NodeMessage::SearchComplete(results),
        Err(e) if e.is_fatal() => return Err(e),
        Err(reason) => NodeMessage::SearchAborted { reason },
    };
    Ok(outbox.send(message).is_ok())
}
