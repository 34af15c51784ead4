//! Integration tests for the hmmnode library and CLI.
//!
//! These tests drive a real worker node with its own threads, from the
//! node API, through the coordinator protocol, and through the binary.

mod helpers;
mod test_coordinator_protocol;
mod test_node_concurrency;
mod test_node_lifecycle;
mod test_work_stealing;
