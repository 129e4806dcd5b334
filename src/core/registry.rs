use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Pdf,
    Image,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Pdf => "pdf",
            JobKind::Image => "image",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Rendering,
    Uploading,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One in-flight render, as tracked for admission and diagnostics.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub target_url: String,
    pub started_at: DateTime<Utc>,
    pub status: JobStatus,
}

impl RenderJob {
    pub fn new(kind: JobKind, target_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            target_url: target_url.into(),
            started_at: Utc::now(),
            status: JobStatus::Pending,
        }
    }
}

/// Keyed set of in-flight jobs.
///
/// Not a queue: it only records which jobs exist and what stage they are in.
/// Every operation takes the lock for a short, non-suspending section.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<Uuid, RenderJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job: RenderJob) {
        self.jobs.lock().insert(job.id, job);
    }

    /// Inserts `job` only while fewer than `max` jobs are registered.
    ///
    /// Count check and insert share one critical section, so two callers can
    /// never both claim the last slot. On rejection returns the live count.
    pub fn register_within(&self, job: RenderJob, max: usize) -> Result<JobGuard, usize> {
        let mut jobs = self.jobs.lock();
        if jobs.len() >= max {
            return Err(jobs.len());
        }
        let id = job.id;
        jobs.insert(id, job);

        Ok(JobGuard {
            registry: self.clone(),
            id,
        })
    }

    pub fn update_status(&self, id: Uuid, status: JobStatus) {
        if let Some(job) = self.jobs.lock().get_mut(&id) {
            job.status = status;
        }
    }

    pub fn remove(&self, id: Uuid) -> Option<RenderJob> {
        self.jobs.lock().remove(&id)
    }

    pub fn count(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.jobs.lock().contains_key(&id)
    }

    pub fn get(&self, id: Uuid) -> Option<RenderJob> {
        self.jobs.lock().get(&id).cloned()
    }

    /// Snapshot of all jobs, oldest first.
    pub fn list(&self) -> Vec<RenderJob> {
        let mut jobs: Vec<RenderJob> = self.jobs.lock().values().cloned().collect();
        jobs.sort_by_key(|job| job.started_at);
        jobs
    }
}

/// Registration handle owned by the request. Dropping it deregisters the job.
pub struct JobGuard {
    registry: JobRegistry,
    id: Uuid,
}

impl JobGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn set_status(&self, status: JobStatus) {
        self.registry.update_status(self.id, status);
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if self.registry.remove(self.id).is_some() {
            tracing::debug!(job_id = %self.id, "job deregistered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_status_on_missing_job_is_noop() {
        let registry = JobRegistry::new();
        registry.update_status(Uuid::new_v4(), JobStatus::Rendering);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn register_within_rejects_at_ceiling() {
        let registry = JobRegistry::new();
        let first = registry
            .register_within(RenderJob::new(JobKind::Pdf, "/a"), 2)
            .unwrap();
        let _second = registry
            .register_within(RenderJob::new(JobKind::Image, "/b"), 2)
            .unwrap();

        let rejected = registry.register_within(RenderJob::new(JobKind::Pdf, "/c"), 2);
        assert_eq!(rejected.err(), Some(2));

        drop(first);
        assert_eq!(registry.count(), 1);
        assert!(
            registry
                .register_within(RenderJob::new(JobKind::Pdf, "/c"), 2)
                .is_ok()
        );
    }

    #[test]
    fn guard_tracks_status_and_removes_on_drop() {
        let registry = JobRegistry::new();
        let guard = registry
            .register_within(RenderJob::new(JobKind::Pdf, "/report"), 1)
            .unwrap();
        let id = guard.id();

        assert_eq!(registry.get(id).unwrap().status, JobStatus::Pending);
        guard.set_status(JobStatus::Rendering);
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Rendering);

        drop(guard);
        assert!(!registry.contains(id));
    }

    #[test]
    fn guard_releases_slot_when_task_panics() {
        let registry = JobRegistry::new();
        let inner = registry.clone();

        let result = std::thread::spawn(move || {
            let _guard = inner
                .register_within(RenderJob::new(JobKind::Image, "/boom"), 1)
                .unwrap();
            panic!("capture exploded");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn list_is_ordered_by_start_time() {
        let registry = JobRegistry::new();
        let mut older = RenderJob::new(JobKind::Pdf, "/old");
        older.started_at = Utc::now() - chrono::Duration::seconds(5);
        let newer = RenderJob::new(JobKind::Image, "/new");

        registry.register(newer);
        registry.register(older);

        let targets: Vec<String> = registry.list().into_iter().map(|j| j.target_url).collect();
        assert_eq!(targets, vec!["/old", "/new"]);
    }
}
