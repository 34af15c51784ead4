//! Custom error types for worker-node operations.

use thiserror::Error;

/// Result type alias for worker-node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Error type for worker-node operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// The shard does not hold the number of databases the node was set up with
    #[error("Shard holds {actual} database(s) but the node was set up for {expected}")]
    DatabaseMismatch {
        /// Number of databases requested at setup
        expected: usize,
        /// Number of databases the shard provides
        actual: usize,
    },

    /// A search named a database that this node does not hold
    #[error("Unknown database {database} (node holds {available})")]
    UnknownDatabase {
        /// The requested database index
        database: u32,
        /// Number of databases loaded on this node
        available: usize,
    },

    /// A record range that does not fit in the shard
    #[error("Invalid record range {start}..={end} for a shard of {records} record(s)")]
    InvalidRange {
        /// First record id of the range
        start: u64,
        /// Last record id of the range (inclusive)
        end: u64,
        /// Number of records in the database shard
        records: u64,
    },

    /// A worker thread could not be created
    #[error("Failed to spawn worker thread {thread_id}: {reason}")]
    ThreadSpawn {
        /// Index of the thread that failed to start
        thread_id: usize,
        /// OS error text
        reason: String,
    },

    /// A coordinator request arrived in a search phase that does not allow it
    #[error("Protocol violation: {operation} received while {phase}")]
    ProtocolViolation {
        /// The offending operation
        operation: &'static str,
        /// The search phase at the time
        phase: String,
    },

    /// A pool could not grow to satisfy a request
    #[error("Pool '{pool}' could not grow by {requested} byte(s)")]
    PoolExhausted {
        /// Name of the pool
        pool: &'static str,
        /// Size of the failed allocation
        requested: usize,
    },

    /// A worker thread panicked; the node can no longer synchronize its threads
    #[error("Worker thread {thread_id} panicked: {message}")]
    WorkerPanicked {
        /// Index of the thread that panicked
        thread_id: usize,
        /// Panic payload, if it was a string
        message: String,
    },

    /// The node has been destroyed
    #[error("Worker node has been shut down")]
    ShutDown,
}

impl NodeError {
    /// Returns true if the error leaves the node unable to run further searches.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::WorkerPanicked { .. } | Self::ShutDown | Self::ThreadSpawn { .. })
    }
}
