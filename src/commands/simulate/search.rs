//! Run searches through a worker node driven by a scripted coordinator.

use crate::commands::command::Command;
use crate::commands::common::NodeOptions;
use crate::commands::simulate::common::{KindArg, PipelineArgs, ShardArgs};
use ahash::AHashSet;
use anyhow::{Context, Result, bail};
use clap::Parser;
use hmmnode_lib::logging::{OperationTimer, format_count, format_percent};
use hmmnode_lib::simulate::{ScriptedCoordinator, SearchScript, create_rng, random_protein};
use hmmnode_lib::worker_node::{RecordRange, SearchResults, ShardInfo, ShardProvider, WorkerNode};
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Search a synthetic shard the way a coordinator would drive a worker node.
#[derive(Parser, Debug)]
#[command(
    name = "search",
    about = "Run searches against a synthetic shard",
    long_about = r#"
Generate a synthetic protein shard and run one or more searches through a
worker node.

Each search hands the node its first macro-chunk with StartSearch and further
macro-chunks only when the node asks for more work, then collects the merged
hit list. With --motif, the query defaults to the motif and recall against
the planted records is reported.
"#
)]
pub struct Search {
    #[command(flatten)]
    pub shard: ShardArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub node: NodeOptions,

    /// Search direction
    #[arg(long = "kind", value_enum, default_value_t = KindArg::default())]
    pub kind: KindArg,

    /// Query residues. Defaults to the motif, or a random protein.
    #[arg(short = 'q', long = "query")]
    pub query: Option<String>,

    /// Length of the random query when neither --query nor --motif is given
    #[arg(long = "query-length", default_value = "40")]
    pub query_length: usize,

    /// Number of searches to run; databases are searched in turn
    #[arg(long = "searches", default_value = "1")]
    pub searches: usize,

    /// Records per macro-chunk sent by the coordinator
    #[arg(long = "macro-chunk", default_value = "5000")]
    pub macro_chunk: u64,

    /// Optional TSV of every hit
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

impl Command for Search {
    fn execute(&self, _command_line: &str) -> Result<()> {
        if self.shard.databases == 0 {
            bail!("--databases must be at least 1");
        }
        if self.shard.records == 0 {
            bail!("--records must be at least 1");
        }

        info!("Simulating worker node searches");
        info!("  Databases: {}", self.shard.databases);
        info!("  Records per database: {}", format_count(self.shard.records as u64));
        info!("  Threads: {}", self.node.num_threads());
        info!("  Chunk size: {}", self.node.chunk_size);
        info!("  Macro-chunk: {}", self.macro_chunk);
        info!("  Searches: {}", self.searches);

        let timer = OperationTimer::new("Generating shard");
        let shard = Arc::new(self.shard.build_shard());
        timer.log_completion(shard.total_residues());

        let query = self.query_bytes();
        info!("  Query: {}", String::from_utf8_lossy(&query));

        let mut node = WorkerNode::setup(
            shard.num_databases(),
            Arc::clone(&shard),
            ShardInfo::default(),
            self.node.to_config(),
            self.pipeline.to_pipeline(),
        )?;
        node.create_threads()?;
        let mut coordinator = ScriptedCoordinator::spawn(node)?;

        let mut writer = match &self.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                let mut writer = BufWriter::new(file);
                writeln!(writer, "search\tdatabase\trank\trecord_id\tscore\tdetail")?;
                Some(writer)
            }
            None => None,
        };

        let timer = OperationTimer::new("Searching");
        let query: Arc<[u8]> = Arc::from(query);
        let mut total_records = 0;
        for search in 0..self.searches {
            let database = (search % self.shard.databases) as u32;
            let last = shard.num_records(database).unwrap_or(0).saturating_sub(1);
            let script = SearchScript {
                database,
                kind: self.kind.into(),
                query: Arc::clone(&query),
                range: RecordRange::new(0, last),
                macro_chunk: self.macro_chunk,
            };
            let results = coordinator.run_search(&script)?;
            total_records += results.records_processed;
            self.report_recall(&results, shard.planted_ids(database));
            if let Some(writer) = writer.as_mut() {
                write_hits(writer, search, &results)?;
            }
        }
        timer.log_completion(total_records);
        info!("Work requests answered: {}", coordinator.work_requests());

        if let Some(mut writer) = writer {
            writer.flush()?;
        }
        coordinator.shutdown()?;
        Ok(())
    }
}

impl Search {
    fn query_bytes(&self) -> Vec<u8> {
        if let Some(query) = &self.query {
            return query.as_bytes().to_vec();
        }
        if let Some(motif) = &self.shard.motif {
            return motif.as_bytes().to_vec();
        }
        let mut rng = create_rng(self.shard.seed.map(|s| s.wrapping_add(1)));
        random_protein(&mut rng, self.query_length)
    }

    fn report_recall(&self, results: &SearchResults, planted: &[u64]) {
        if planted.is_empty() {
            return;
        }
        let found: AHashSet<u64> = results.hits.iter().map(|hit| hit.record_id).collect();
        let recovered = planted.iter().filter(|id| found.contains(id)).count();
        info!(
            "  Planted records recovered: {}/{} ({})",
            format_count(recovered as u64),
            format_count(planted.len() as u64),
            format_percent(recovered as f64 / planted.len() as f64, 1)
        );
    }
}

fn write_hits<W: Write>(writer: &mut W, search: usize, results: &SearchResults) -> Result<()> {
    for (rank, hit) in results.hits.iter().enumerate() {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{:.1}\t{}",
            search,
            results.database,
            rank + 1,
            hit.record_id,
            hit.score,
            String::from_utf8_lossy(&hit.payload)
        )?;
    }
    Ok(())
}
