//! Simulation commands for exercising a worker node.
//!
//! These commands run a real [`WorkerNode`](hmmnode_lib::worker_node::WorkerNode)
//! against generated shards with a toy k-mer pipeline, for benchmarking and
//! for shaking out scheduling problems.

pub mod common;
pub mod cycles;
pub mod search;

use crate::commands::command::Command;
use anyhow::Result;
use clap::{Parser, Subcommand};

pub use cycles::Cycles;
pub use search::Search;

/// Run a worker node against synthetic data.
#[derive(Parser, Debug)]
#[command(
    name = "simulate",
    about = "\x1b[38;5;166m[UTILITIES]\x1b[0m      \x1b[36mRun a worker node on synthetic shards\x1b[0m"
)]
pub struct Simulate {
    #[command(subcommand)]
    pub command: SimulateCommand,
}

impl Command for Simulate {
    fn execute(&self, command_line: &str) -> Result<()> {
        self.command.execute(command_line)
    }
}

#[derive(Subcommand, Debug)]
pub enum SimulateCommand {
    Search(Search),
    Cycles(Cycles),
}

impl SimulateCommand {
    fn execute(&self, command_line: &str) -> Result<()> {
        match self {
            Self::Search(cmd) => cmd.execute(command_line),
            Self::Cycles(cmd) => cmd.execute(command_line),
        }
    }
}
