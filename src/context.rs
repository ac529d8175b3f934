//! Per-run diagnostic context.
//!
//! A [`RunContext`] is created at the start of a refinement run and threaded
//! through every stage. All log records of the run share its target, so a
//! logger can route or filter one run's output.

use crate::types::SarResult;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    target: String,
    started: DateTime<Utc>,
    scratch_dir: PathBuf,
    debug: bool,
}

impl RunContext {
    /// Open a run, creating `scratch_dir` if needed
    pub fn begin(name: &str, scratch_dir: impl Into<PathBuf>, debug: bool) -> SarResult<Self> {
        let scratch_dir = scratch_dir.into();
        std::fs::create_dir_all(&scratch_dir)?;

        let started = Utc::now();
        let run_id = format!("{}-{}", name, started.format("%Y%m%dT%H%M%S%.3f"));
        let target = format!("sarwater::{}", run_id);

        log::info!(
            target: target.as_str(),
            "Starting {} (scratch: {}, debug: {})",
            name,
            scratch_dir.display(),
            debug
        );

        Ok(Self {
            run_id,
            target,
            started,
            scratch_dir,
            debug,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Log target shared by every record of this run
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn scratch_path(&self, file_name: &str) -> PathBuf {
        self.scratch_dir.join(file_name)
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.started).to_std().unwrap_or_default()
    }

    /// Close the run and report its wall time
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        log::info!(
            target: self.target(),
            "Finished {} in {:.2} s",
            self.run_id,
            elapsed.as_secs_f64()
        );
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creates_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("nested").join("scratch");
        let ctx = RunContext::begin("refine", &scratch, true).unwrap();

        assert!(scratch.is_dir());
        assert!(ctx.target().starts_with("sarwater::refine-"));
        assert!(ctx.debug());
        assert_eq!(ctx.scratch_path("a.tif"), scratch.join("a.tif"));
        assert!(ctx.finish() < Duration::from_secs(60));
    }
}
