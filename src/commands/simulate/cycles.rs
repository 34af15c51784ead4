//! Run many short searches back to back and check the node returns to rest.

use crate::commands::command::Command;
use crate::commands::common::NodeOptions;
use crate::commands::simulate::common::{PipelineArgs, ShardArgs};
use anyhow::{Result, bail, ensure};
use clap::Parser;
use hmmnode_lib::logging::OperationTimer;
use hmmnode_lib::simulate::{create_rng, random_protein};
use hmmnode_lib::worker_node::{
    NodeActivity, RecordRange, ShardInfo, ShardProvider, WorkerNode, lock_order,
};
use log::{debug, info};
use rand::RngExt;
use std::sync::Arc;
use std::time::Duration;

/// Stress the start barrier and pools with many short searches.
#[derive(Parser, Debug)]
#[command(
    name = "cycles",
    about = "Run many short searches and check pools and barrier",
    long_about = r#"
Run many short searches of random sub-ranges through one worker node without
a coordinator, alternating search directions.

After every search the node must be idle with no thread in back-end mode and
every pooled work chunk, back-end entry and hit returned.
"#
)]
pub struct Cycles {
    #[command(flatten)]
    pub shard: ShardArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub node: NodeOptions,

    /// Number of searches to run
    #[arg(short = 'c', long = "cycles", default_value = "1000")]
    pub cycles: usize,

    /// Largest range searched per cycle
    #[arg(long = "max-range", default_value = "500")]
    pub max_range: u64,
}

impl Command for Cycles {
    fn execute(&self, _command_line: &str) -> Result<()> {
        if self.shard.records == 0 {
            bail!("--records must be at least 1");
        }
        info!("Running {} search cycles", self.cycles);
        info!("  Threads: {}", self.node.num_threads());

        let shard = Arc::new(self.shard.build_shard());
        let mut node = WorkerNode::setup(
            shard.num_databases(),
            Arc::clone(&shard),
            ShardInfo::default(),
            self.node.to_config(),
            self.pipeline.to_pipeline(),
        )?;
        node.create_threads()?;

        let mut rng = create_rng(self.shard.seed);
        let query = random_protein(&mut rng, 30);
        let poll = Duration::from_millis(self.node.idle_poll_ms.max(1));
        let timer = OperationTimer::new("Cycling searches");
        let mut records = 0;
        for cycle in 0..self.cycles {
            let database = rng.random_range(0..shard.num_databases()) as u32;
            let size = shard.num_records(database).unwrap_or(0);
            let start = rng.random_range(0..size);
            let end = (start + rng.random_range(0..self.max_range.max(1))).min(size - 1);
            let range = RecordRange::new(start, end);
            if cycle % 2 == 0 {
                node.start_range_vs_model(database, range, query.clone())?;
            } else {
                node.start_model_vs_range(database, range, query.clone())?;
            }
            while node.poll() == NodeActivity::Working {
                std::thread::sleep(poll);
            }
            let results = node.end_search()?;
            ensure!(
                results.records_processed == range.len(),
                "cycle {cycle}: scanned {} records of {}",
                results.records_processed,
                range.len()
            );
            ensure!(node.backend_threads() == 0, "cycle {cycle}: back-end threads left promoted");
            let outstanding = node.pool_stats().outstanding();
            ensure!(outstanding == 0, "cycle {cycle}: {outstanding} pooled objects not returned");
            debug!("Cycle {cycle}: {}-{} ({} hits)", range.start, range.end, results.hit_count());
            records += results.records_processed;
        }
        timer.log_completion(records);

        let violations = lock_order::violations();
        ensure!(violations == 0, "{violations} lock-order violation(s) observed");
        node.destroy()?;
        info!("All {} cycles returned the node to rest", self.cycles);
        Ok(())
    }
}
