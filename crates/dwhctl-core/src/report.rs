//! Per-step outcomes of provisioning and teardown runs

use serde::Serialize;
use std::fmt;
use std::future::Future;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum StepOutcome {
    Succeeded { detail: Option<String> },
    Failed { error: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub name: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Ordered record of every attempted step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one step, log and record its outcome, and hand back its value.
    /// Errors never propagate: the caller moves on to the next step.
    pub async fn step<T, F>(&mut self, name: &str, fut: F) -> Option<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        info!(step = name, "Starting step");
        match fut.await {
            Ok(value) => {
                self.record(name, StepOutcome::Succeeded { detail: None });
                Some(value)
            }
            Err(e) => {
                error!(step = name, error = %format!("{:#}", e), "Step failed");
                self.record(
                    name,
                    StepOutcome::Failed {
                        error: format!("{:#}", e),
                    },
                );
                None
            }
        }
    }

    pub fn skip(&mut self, name: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(step = name, reason = %reason, "Skipping step");
        self.record(name, StepOutcome::Skipped { reason });
    }

    /// Attach a detail string to the most recent successful step
    pub fn annotate(&mut self, detail: impl Into<String>) {
        if let Some(StepRecord {
            outcome: StepOutcome::Succeeded { detail: slot },
            ..
        }) = self.steps.last_mut()
        {
            *slot = Some(detail.into());
        }
    }

    fn record(&mut self, name: &str, outcome: StepOutcome) {
        self.steps.push(StepRecord {
            name: name.to_string(),
            outcome,
        });
    }

    /// True when any step failed or could not run
    pub fn has_failures(&self) -> bool {
        self.steps
            .iter()
            .any(|s| !matches!(s.outcome, StepOutcome::Succeeded { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|s| !matches!(s.outcome, StepOutcome::Succeeded { .. }))
    }

    pub fn outcome_of(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.name == name).map(|s| &s.outcome)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            match &step.outcome {
                StepOutcome::Succeeded { detail: Some(detail) } => {
                    writeln!(f, "  ok    {} ({})", step.name, detail)?
                }
                StepOutcome::Succeeded { detail: None } => writeln!(f, "  ok    {}", step.name)?,
                StepOutcome::Failed { error } => writeln!(f, "  FAIL  {}: {}", step.name, error)?,
                StepOutcome::Skipped { reason } => writeln!(f, "  skip  {}: {}", step.name, reason)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[tokio::test]
    async fn failures_are_recorded_and_do_not_stop_the_run() {
        let mut report = RunReport::new();
        let first: Option<u32> = report.step("first", async { Err(anyhow!("boom")) }).await;
        let second = report.step("second", async { Ok(7) }).await;
        report.annotate("seven");

        assert_eq!(first, None);
        assert_eq!(second, Some(7));
        assert!(report.has_failures());
        assert_eq!(
            report.outcome_of("first"),
            Some(&StepOutcome::Failed {
                error: "boom".to_string()
            })
        );
        assert_eq!(
            report.outcome_of("second"),
            Some(&StepOutcome::Succeeded {
                detail: Some("seven".to_string())
            })
        );
    }

    #[test]
    fn skipped_steps_count_as_failures() {
        let mut report = RunReport::new();
        report.skip("create cluster", "no role ARN");
        assert!(report.has_failures());
        assert_eq!(report.failures().count(), 1);
        assert!(report.to_string().contains("skip  create cluster: no role ARN"));
    }

    #[test]
    fn empty_report_is_clean() {
        assert!(!RunReport::new().has_failures());
    }
}
