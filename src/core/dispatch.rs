//! Worker pool for per-component classification.
//!
//! Jobs are independent: each reads its own raster windows and returns a
//! small verdict. Results come back in job order whatever the completion
//! order was.

use crate::core::classifier::{
    BandSelection, ComponentJob, ComponentVerdict, PassRasters, RefinementPhase,
};
use crate::io::store::BlockRasterStore;
use crate::types::{SarError, SarResult};

pub struct ParallelDispatcher {
    workers: usize,
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
}

impl ParallelDispatcher {
    pub fn new(workers: usize) -> SarResult<Self> {
        let workers = workers.max(1);

        #[cfg(feature = "parallel")]
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("sarwater-worker-{}", i))
                .build()
                .map_err(|e| SarError::Processing(format!("Failed to build worker pool: {}", e)))?;
            Ok(Self { workers, pool })
        }

        #[cfg(not(feature = "parallel"))]
        {
            Ok(Self { workers })
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Classify every job on `band`.
    ///
    /// A job that fails with an error is logged and rejected so that the
    /// remaining jobs still complete.
    pub fn dispatch<P, S>(
        &self,
        phase: &P,
        store: &S,
        jobs: &[ComponentJob],
        band: &BandSelection,
        rasters: &PassRasters<'_>,
    ) -> Vec<ComponentVerdict>
    where
        P: RefinementPhase,
        S: BlockRasterStore,
    {
        let run = |job: &ComponentJob| match phase.classify(store, job, band, rasters) {
            Ok(verdict) => verdict,
            Err(e) => {
                log::warn!(
                    "{}: component {} on {} failed, rejecting: {}",
                    phase.name(),
                    job.label,
                    band.band,
                    e
                );
                ComponentVerdict::rejected(job.label)
            }
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.pool.install(|| jobs.par_iter().map(run).collect())
        }

        #[cfg(not(feature = "parallel"))]
        {
            jobs.iter().map(run).collect()
        }
    }
}
