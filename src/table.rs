use indexmap::IndexMap;

use crate::error::{BoardError, BoardResult};
use crate::job::{Job, JobId};

/// The authoritative set of live jobs, in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobTable {
    jobs: IndexMap<JobId, Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub(crate) fn insert(&mut self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    pub(crate) fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&JobId, &mut Job) -> bool,
    {
        self.jobs.retain(keep);
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub(crate) fn jobs_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.jobs.values_mut()
    }

    /// Jobs ordered top to bottom.
    pub fn by_line(&self) -> Vec<&Job> {
        let mut jobs = self.jobs.values().collect::<Vec<&Job>>();
        jobs.sort_by_key(|job| job.line);
        jobs
    }

    pub fn job_at_line(&self, line: usize) -> Option<&Job> {
        self.jobs.values().find(|job| job.line == line)
    }

    pub fn any_active(&self) -> bool {
        self.jobs.values().any(|job| job.active)
    }

    /// Checks that lines are exactly `1..=len` and that no completed job
    /// sits below a running one.
    pub fn validate(&self) -> BoardResult<()> {
        let count = self.jobs.len();
        let mut seen = vec![false; count];
        for job in self.jobs.values() {
            if job.line == 0 || job.line > count {
                return Err(BoardError::corruption(format!(
                    "job {} has line {} outside 1..={count}",
                    job.id, job.line
                )));
            }
            if std::mem::replace(&mut seen[job.line - 1], true) {
                return Err(BoardError::corruption(format!(
                    "line {} is assigned to more than one job",
                    job.line
                )));
            }
        }

        let lowest_complete = self
            .jobs
            .values()
            .filter(|job| job.complete)
            .map(|job| job.line)
            .max();
        let highest_running = self
            .jobs
            .values()
            .filter(|job| !job.complete)
            .map(|job| job.line)
            .min();
        if let (Some(complete), Some(running)) = (lowest_complete, highest_running) {
            if complete > running {
                return Err(BoardError::corruption(format!(
                    "completed job at line {complete} is below running job at line {running}"
                )));
            }
        }
        Ok(())
    }
}
