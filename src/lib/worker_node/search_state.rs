//! Search phase machine and the per-search query snapshot.
//!
//! ```text
//! IDLE -> SEQUENCE_SEARCH -> SEQUENCE_SEARCH_CONTINUE* -> IDLE
//! IDLE -> HMM_SEARCH      -> HMM_SEARCH_CONTINUE*      -> IDLE
//! ```
//!
//! The first chunk of a search runs in the plain phase and threads do their
//! per-search setup; later chunks run in the `_CONTINUE` phase and threads
//! skip it. The query is published as an immutable [`Arc`] together with the
//! phase, so readers never observe a half-updated search.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::pipeline::{SearchKind, SearchQuery};
use crate::errors::{NodeError, Result};

/// What the node is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPhase {
    /// No search in progress.
    #[default]
    Idle,
    /// First chunk of a one-model many-sequence search.
    SequenceSearch,
    /// Later chunks of a one-model many-sequence search.
    SequenceSearchContinue,
    /// First chunk of a one-sequence many-model search.
    HmmSearch,
    /// Later chunks of a one-sequence many-model search.
    HmmSearchContinue,
}

impl SearchPhase {
    /// The phase that starts a search of `kind`.
    #[must_use]
    pub fn start_of(kind: SearchKind) -> Self {
        match kind {
            SearchKind::Sequence => Self::SequenceSearch,
            SearchKind::Hmm => Self::HmmSearch,
        }
    }

    /// The `_CONTINUE` variant of this phase, or `None` for `Idle`.
    #[must_use]
    pub fn continued(self) -> Option<Self> {
        match self {
            Self::Idle => None,
            Self::SequenceSearch | Self::SequenceSearchContinue => {
                Some(Self::SequenceSearchContinue)
            }
            Self::HmmSearch | Self::HmmSearchContinue => Some(Self::HmmSearchContinue),
        }
    }

    /// Returns true for the `_CONTINUE` variants.
    #[must_use]
    pub fn is_continue(self) -> bool {
        matches!(self, Self::SequenceSearchContinue | Self::HmmSearchContinue)
    }

    /// Returns true while a search is running.
    #[must_use]
    pub fn is_active(self) -> bool {
        self != Self::Idle
    }
}

impl fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::SequenceSearch => "SEQUENCE_SEARCH",
            Self::SequenceSearchContinue => "SEQUENCE_SEARCH_CONTINUE",
            Self::HmmSearch => "HMM_SEARCH",
            Self::HmmSearchContinue => "HMM_SEARCH_CONTINUE",
        };
        f.write_str(name)
    }
}

/// Consistent view of the current search.
#[derive(Debug, Clone, Default)]
pub struct SearchSnapshot {
    /// Current phase.
    pub phase: SearchPhase,
    /// Incremented by every search start; threads compare it with the
    /// generation they last set up for.
    pub generation: u64,
    /// The query, present while a search is active.
    pub query: Option<Arc<SearchQuery>>,
}

/// Shared search state, written by the coordinating path only.
#[derive(Debug, Default)]
pub struct SearchState {
    current: RwLock<SearchSnapshot>,
    failed: AtomicBool,
    failure: Mutex<Option<NodeError>>,
}

impl SearchState {
    /// Create an idle search state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SearchSnapshot {
        self.current.read().clone()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SearchPhase {
        self.current.read().phase
    }

    /// Start a search. Only legal from `Idle`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ProtocolViolation`] if a search is already running.
    pub fn begin(&self, query: SearchQuery) -> Result<u64> {
        let mut current = self.current.write();
        if current.phase.is_active() {
            return Err(NodeError::ProtocolViolation {
                operation: "StartSearch",
                phase: current.phase.to_string(),
            });
        }
        current.phase = SearchPhase::start_of(query.kind);
        current.generation += 1;
        current.query = Some(Arc::new(query));
        self.failed.store(false, Ordering::Release);
        *self.failure.lock() = None;
        Ok(current.generation)
    }

    /// Move to the `_CONTINUE` phase for a later chunk of the same search.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ProtocolViolation`] if no search is running.
    pub fn continue_search(&self) -> Result<SearchPhase> {
        let mut current = self.current.write();
        match current.phase.continued() {
            Some(next) => {
                current.phase = next;
                Ok(next)
            }
            None => Err(NodeError::ProtocolViolation {
                operation: "AddWork",
                phase: current.phase.to_string(),
            }),
        }
    }

    /// Return to `Idle`, dropping the query. Returns the phase that ended.
    pub fn finish(&self) -> SearchPhase {
        let mut current = self.current.write();
        let ended = current.phase;
        current.phase = SearchPhase::Idle;
        current.query = None;
        ended
    }

    /// Mark the running search as failed. The first failure wins.
    pub fn fail(&self, error: NodeError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            log::warn!("Search failed: {error}");
            *failure = Some(error);
        }
        self.failed.store(true, Ordering::Release);
    }

    /// Returns true if the running search has failed (lock-free).
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Take the failure of the running search, if any.
    pub fn take_failure(&self) -> Option<NodeError> {
        self.failed.store(false, Ordering::Release);
        self.failure.lock().take()
    }
}
