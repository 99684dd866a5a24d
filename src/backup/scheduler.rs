//! Bounded, batch-wise execution of set pipelines.

use crate::backup::archive::pipeline::SetPipeline;
use crate::backup::archive::{ArchiveSetConfig, ProducedArchive};
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::AddMsg;
use itertools::Itertools;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Runs at most `max_in_flight` pipelines at a time.
///
/// Work is released in whole batches: the next batch starts only after every
/// pipeline of the current one has returned, so a finished pipeline does not
/// free its slot early.
pub struct Scheduler {
    pool: ThreadPool,
    max_in_flight: usize,
}

impl Scheduler {
    pub fn new(max_in_flight: usize) -> Result<Self> {
        let max_in_flight = max_in_flight.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_in_flight)
            .thread_name(|i| format!("set-pipeline-{i}"))
            .build()?;
        Ok(Self {
            pool,
            max_in_flight,
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Runs one pipeline per set and returns the archives they produced.
    ///
    /// Fatal errors are collected once their batch has joined, so siblings in
    /// that batch still finish, but no later batch is started.
    pub fn run<'s, I>(&self, pipeline: SetPipeline<'_>, sets: I) -> Result<Vec<ProducedArchive>>
    where
        I: IntoIterator<Item = (&'s String, &'s ArchiveSetConfig)>,
    {
        let sets = sets.into_iter().collect_vec();
        let mut produced = Vec::with_capacity(sets.len());

        for (i, batch) in sets.chunks(self.max_in_flight).enumerate() {
            tracing::info!(
                "Starting batch {} with {} archive sets: {}",
                i + 1,
                batch.len(),
                batch.iter().map(|(name, _)| name.as_str()).join(", ")
            );
            let results: Vec<_> = self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|(name, set)| pipeline.run(name, set))
                    .collect()
            });
            tracing::info!("{} processes have finished", batch.len());

            let mut fatal = Vec::new();
            for result in results {
                match result {
                    Ok(Some(archive)) => produced.push(archive),
                    Ok(None) => {}
                    Err(e) => fatal.push(e),
                }
            }
            convert_error_vec(fatal).add_msg(format!("Batch {} aborted the run", i + 1))?;
        }

        Ok(produced)
    }
}
