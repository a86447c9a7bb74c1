//! Edge job dispatch
//!
//! Pending jobs are held per environment until the agent's next poll picks
//! them up and the caller acknowledges delivery.

use dashmap::DashMap;
use edgeward_proto::{EdgeJob, EdgeJobId, EnvironmentId};
use tracing::debug;

/// Per-environment pending job sets
#[derive(Debug, Default)]
pub struct EdgeJobDispatcher {
    pending: DashMap<EnvironmentId, Vec<EdgeJob>>,
}

impl EdgeJobDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job for an environment, replacing any entry with the same job ID
    pub fn attach(&self, environment_id: EnvironmentId, job: EdgeJob) {
        let mut jobs = self.pending.entry(environment_id).or_default();

        match jobs.iter_mut().find(|existing| existing.id == job.id) {
            Some(existing) => {
                debug!(environment_id = %environment_id, job_id = %job.id, "Replaced pending edge job");
                *existing = job;
            }
            None => {
                debug!(environment_id = %environment_id, job_id = %job.id, "Attached edge job");
                jobs.push(job);
            }
        }
    }

    /// Remove a job from every environment
    pub fn detach(&self, job_id: EdgeJobId) {
        self.pending.retain(|environment_id, jobs| {
            let before = jobs.len();
            jobs.retain(|job| job.id != job_id);
            if jobs.len() != before {
                debug!(environment_id = %environment_id, job_id = %job_id, "Detached edge job");
            }
            !jobs.is_empty()
        });
    }

    /// Current pending set; not cleared by reading
    pub fn pending_for(&self, environment_id: EnvironmentId) -> Vec<EdgeJob> {
        self.pending
            .get(&environment_id)
            .map(|jobs| jobs.clone())
            .unwrap_or_default()
    }

    /// Clear one job after the agent confirmed delivery
    ///
    /// Returns whether the job was pending.
    pub fn acknowledge(&self, environment_id: EnvironmentId, job_id: EdgeJobId) -> bool {
        let Some(mut jobs) = self.pending.get_mut(&environment_id) else {
            return false;
        };

        let before = jobs.len();
        jobs.retain(|job| job.id != job_id);
        let removed = jobs.len() != before;
        let empty = jobs.is_empty();
        drop(jobs);

        if empty {
            self.pending
                .remove_if(&environment_id, |_, jobs| jobs.is_empty());
        }
        removed
    }

    /// Drop all pending work for an environment
    pub fn forget(&self, environment_id: EnvironmentId) {
        if let Some((_, jobs)) = self.pending.remove(&environment_id) {
            debug!(environment_id = %environment_id, dropped = jobs.len(), "Dropped pending edge jobs");
        }
    }
}
