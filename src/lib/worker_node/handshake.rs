//! Work-request handshake with the coordinator.
//!
//! Three flags govern requests for more work: `request_work` (a request
//! should be sent), `work_requested` (a request is outstanding), and
//! `master_queue_empty` (the coordinator has nothing left). They are modelled
//! as one small state machine so that only legal flag combinations exist.
//!
//! | state       | request_work | work_requested | master_queue_empty |
//! |-------------|--------------|----------------|--------------------|
//! | `Idle`      | false        | false          | false              |
//! | `Pending`   | true         | true           | false              |
//! | `Requested` | false        | true           | false              |
//! | `Exhausted` | false        | false          | true               |
//!
//! | event            | Idle      | Pending   | Requested | Exhausted |
//! |------------------|-----------|-----------|-----------|-----------|
//! | `queue_low`      | Pending   | Pending   | Requested | Exhausted |
//! | `take_request`   | Idle      | Requested | Requested | Exhausted |
//! | `work_arrived`   | Idle      | Idle      | Idle      | Exhausted |
//! | `no_more_work`   | Exhausted | Exhausted | Exhausted | Exhausted |
//! | `reset`          | Idle      | Idle      | Idle      | Idle      |

use parking_lot::Mutex;

/// State of the request handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    /// No request needed or outstanding.
    #[default]
    Idle,
    /// The queue ran low; a request must be sent.
    Pending,
    /// A request has been sent and not yet answered with work.
    Requested,
    /// The coordinator has no more work for this search.
    Exhausted,
}

/// The handshake, guarded by the work-request lock.
#[derive(Debug, Default)]
pub struct WorkRequestHandshake {
    state: Mutex<RequestState>,
}

impl WorkRequestHandshake {
    /// Create a handshake in the `Idle` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RequestState {
        *self.state.lock()
    }

    /// The global queue dropped below the request threshold.
    ///
    /// Returns true if this call raised a new request.
    pub fn queue_low(&self) -> bool {
        let mut state = self.state.lock();
        if *state == RequestState::Idle {
            *state = RequestState::Pending;
            true
        } else {
            false
        }
    }

    /// Consume a pending request so it can be sent.
    ///
    /// Returns true exactly once per raised request.
    pub fn take_request(&self) -> bool {
        let mut state = self.state.lock();
        if *state == RequestState::Pending {
            *state = RequestState::Requested;
            true
        } else {
            false
        }
    }

    /// Work arrived from the coordinator.
    pub fn work_arrived(&self) {
        let mut state = self.state.lock();
        if *state != RequestState::Exhausted {
            *state = RequestState::Idle;
        }
    }

    /// The coordinator answered that it has no more work.
    pub fn no_more_work(&self) {
        *self.state.lock() = RequestState::Exhausted;
    }

    /// Return to `Idle` (end of search).
    pub fn reset(&self) {
        *self.state.lock() = RequestState::Idle;
    }

    /// A request should be sent.
    #[must_use]
    pub fn request_work(&self) -> bool {
        self.state() == RequestState::Pending
    }

    /// A request is outstanding.
    #[must_use]
    pub fn work_requested(&self) -> bool {
        matches!(self.state(), RequestState::Pending | RequestState::Requested)
    }

    /// The coordinator has no more work for this search.
    #[must_use]
    pub fn master_queue_empty(&self) -> bool {
        self.state() == RequestState::Exhausted
    }
}
