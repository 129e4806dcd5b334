use crate::core::error::RenderError;
use crate::core::registry::{JobGuard, JobRegistry, RenderJob};

pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

/// Rejects new jobs once the in-flight count reaches the ceiling.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionGate {
    max_jobs: usize,
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_JOBS)
    }
}

impl AdmissionGate {
    pub fn new(max_jobs: usize) -> Self {
        Self { max_jobs }
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    pub fn has_capacity(&self, registry: &JobRegistry) -> bool {
        registry.count() < self.max_jobs
    }

    /// Checks the ceiling and registers `job` in one step.
    pub fn admit(&self, registry: &JobRegistry, job: RenderJob) -> Result<JobGuard, RenderError> {
        registry
            .register_within(job, self.max_jobs)
            .map_err(|active| RenderError::ConcurrencyLimit {
                active,
                max: self.max_jobs,
            })
    }
}
