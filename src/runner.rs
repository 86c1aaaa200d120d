//! Sequential per-book processing shared by `render` and `warm`.

use colored::*;
use tracing::{debug, error, info, warn};

use crate::books::BookInfo;
use crate::error::Result;
use crate::job::ExportJob;
use crate::timeout::TimeoutBudget;

const MAX_REASON_LEN: usize = 80;

/// Work done for a single book. Implementations are the exporter and the
/// cache warmer.
#[allow(async_fn_in_trait)]
pub trait BookTask {
    fn budget(&self, book: Option<&BookInfo>) -> TimeoutBudget;

    async fn process(&self, job: &ExportJob, budget: TimeoutBudget) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub successful: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    pub fn record_success(&mut self, name: String) {
        self.successful.push(name);
    }

    pub fn record_failure(&mut self, name: String, reason: String) {
        self.failed.push((name, reason));
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// `title` heads the block, `done` completes "Successfully ...".
    pub fn report(&self, title: &str, done: &str) {
        let rule = "=".repeat(60);
        info!("{}", rule);
        info!("{}", title.bold());
        info!("{}", rule);
        info!("Successfully {}: {} book(s)", done, self.successful.len());
        if !self.successful.is_empty() {
            info!("  {}", self.successful.join(", ").green());
        }
        if !self.failed.is_empty() {
            warn!("Failed: {} book(s)", self.failed.len());
            for (name, reason) in &self.failed {
                warn!("  {}: {}", name.red(), truncate(reason, MAX_REASON_LEN));
            }
        }
        info!("{}", rule);
    }
}

fn truncate(reason: &str, max: usize) -> String {
    reason.chars().take(max).collect()
}

/// Runs `task` for every job in order. A failing book is logged and
/// recorded; the remaining books still run.
pub async fn run_books<T: BookTask>(task: &T, jobs: &[ExportJob]) -> RunSummary {
    let mut summary = RunSummary::default();

    for job in jobs {
        let name = job.display_name();
        let budget = task.budget(job.book);
        debug!(
            "Timeouts for {}: navigation={}s work={}s",
            name,
            budget.navigation.as_secs(),
            budget.work.as_secs()
        );

        match task.process(job, budget).await {
            Ok(()) => {
                info!("Successfully completed {}", name.green());
                summary.record_success(name);
            }
            Err(e) => {
                error!("Failed to process {}: {}", name, e);
                warn!("Skipping {} and continuing with next book", name);
                summary.record_failure(name, e.to_string());
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        let reason = "é".repeat(100);
        assert_eq!(truncate(&reason, MAX_REASON_LEN).chars().count(), 80);
        assert_eq!(truncate("short", MAX_REASON_LEN), "short");
    }
}
