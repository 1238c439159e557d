//! Coordinator-side aggregation of task outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::emit::{CallWriter, EmitConfig};
use crate::store::CallRecord;
use crate::{ResultError, RunId, SnfPart, TaskOutcome};

/// What consuming one outcome did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumed {
    /// A success was emitted and cleaned up.
    Emitted { written: usize },
    /// A failure was recorded.
    Failed { message: String },
}

/// Totals for a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    pub records_written: usize,
    pub processed_read_count: u64,
    pub svcount: usize,
    /// Mean of the call results' average coverage, if there were any.
    pub coverage_average: Option<f64>,
    /// Side-channel parts to stitch, ordered by index.
    pub snf_parts: Vec<SnfPart>,
    /// Failure messages in arrival order.
    pub failures: Vec<String>,
}

/// Consumes outcomes in whatever order they complete.
#[derive(Debug)]
pub struct OutcomeAggregator {
    run_id: RunId,
    label: String,
    started_at: DateTime<Utc>,
    tasks_succeeded: usize,
    records_written: usize,
    processed_read_count: u64,
    svcount: usize,
    coverage_sum: f64,
    coverage_results: usize,
    snf_parts: Vec<SnfPart>,
    failures: Vec<String>,
}

impl OutcomeAggregator {
    pub fn new(config: &EmitConfig) -> Self {
        Self {
            run_id: config.run_id.clone(),
            label: config.label.clone(),
            started_at: Utc::now(),
            tasks_succeeded: 0,
            records_written: 0,
            processed_read_count: 0,
            svcount: 0,
            coverage_sum: 0.0,
            coverage_results: 0,
            snf_parts: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Handle one outcome.
    ///
    /// Successes are emitted to `writer` and then cleaned up. Cleanup runs
    /// even when emission fails; the emission error is returned after it.
    /// Failures are logged and recorded and never return an error.
    pub fn consume<C: CallRecord>(
        &mut self,
        outcome: TaskOutcome<C>,
        config: &EmitConfig,
        writer: Option<&mut dyn CallWriter<C>>,
    ) -> Result<Consumed, ResultError> {
        match outcome {
            TaskOutcome::Success(mut result) => {
                let emitted = result.emit(config, writer);
                let cleaned = result.cleanup();
                let written = emitted?;
                cleaned?;

                self.tasks_succeeded += 1;
                self.records_written += written;
                self.processed_read_count += result.processed_read_count();
                self.svcount += result.svcount();
                if let Some(summary) = result.summary() {
                    self.coverage_sum += summary.coverage_average_total;
                    self.coverage_results += 1;
                    if let Some(part) = &summary.snf {
                        self.snf_parts.push(part.clone());
                    }
                }

                info!(
                    run_id = %self.run_id,
                    label = %config.label,
                    task_id = %result.task_id(),
                    kind = result.kind().name(),
                    svcount = result.svcount(),
                    written = written,
                    "Task result consumed"
                );
                Ok(Consumed::Emitted { written })
            }
            TaskOutcome::Failure(failure) => {
                warn!(
                    run_id = %self.run_id,
                    label = %config.label,
                    error = %failure,
                    "Task failed"
                );
                self.failures.push(failure.message().to_string());
                Ok(Consumed::Failed {
                    message: failure.message().to_string(),
                })
            }
        }
    }

    pub fn tasks_seen(&self) -> usize {
        self.tasks_succeeded + self.failures.len()
    }

    pub fn finish(self) -> RunReport {
        let mut snf_parts = self.snf_parts;
        snf_parts.sort_by_key(|part| part.index);

        let coverage_average =
            (self.coverage_results > 0).then(|| self.coverage_sum / self.coverage_results as f64);

        RunReport {
            run_id: self.run_id,
            label: self.label,
            started_at: self.started_at,
            finished_at: Utc::now(),
            tasks_succeeded: self.tasks_succeeded,
            tasks_failed: self.failures.len(),
            records_written: self.records_written,
            processed_read_count: self.processed_read_count,
            svcount: self.svcount,
            coverage_average,
            snf_parts,
            failures: self.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallSummary, ErrorResult, TaskId, TaskResult};
    use std::fmt;
    use std::path::PathBuf;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Rec(u32);

    #[derive(Default)]
    struct VecWriter(Vec<Rec>);

    impl fmt::Display for VecWriter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "memory")
        }
    }

    impl CallWriter<Rec> for VecWriter {
        fn write_call(&mut self, call: &Rec) -> Result<(), ResultError> {
            self.0.push(call.clone());
            Ok(())
        }
    }

    struct RejectingWriter;

    impl fmt::Display for RejectingWriter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "rejecting")
        }
    }

    impl CallWriter<Rec> for RejectingWriter {
        fn write_call(&mut self, _call: &Rec) -> Result<(), ResultError> {
            Err(ResultError::Write("rejected".to_string()))
        }
    }

    fn snf(index: u32) -> SnfPart {
        SnfPart {
            filename: PathBuf::from(format!("part{index}.snf")),
            index,
            total_length: 100,
            candidate_count: 2,
        }
    }

    #[test]
    fn test_failure_does_not_disturb_other_results() {
        let config = EmitConfig::default();
        let mut agg = OutcomeAggregator::new(&config);
        let mut writer = VecWriter::default();

        let outcomes = vec![
            TaskOutcome::Success(TaskResult::combine(&TaskId::new(1), vec![Rec(1), Rec(2)], 5)),
            TaskOutcome::Failure(ErrorResult::new("boom")),
            TaskOutcome::Success(TaskResult::combine(&TaskId::new(3), vec![Rec(3)], 7)),
        ];
        for outcome in outcomes {
            agg.consume(outcome, &config, Some(&mut writer)).unwrap();
        }

        assert_eq!(agg.tasks_seen(), 3);
        let report = agg.finish();
        assert_eq!(report.tasks_succeeded, 2);
        assert_eq!(report.tasks_failed, 1);
        assert_eq!(report.failures, vec!["boom".to_string()]);
        assert_eq!(report.records_written, 3);
        assert_eq!(report.processed_read_count, 12);
        assert_eq!(writer.0, vec![Rec(1), Rec(2), Rec(3)]);
    }

    #[test]
    fn test_consume_reports_what_happened() {
        let config = EmitConfig::default();
        let mut agg = OutcomeAggregator::new(&config);

        let consumed = agg
            .consume(TaskOutcome::<Rec>::Failure(ErrorResult::new("bad input")), &config, None)
            .unwrap();
        assert_eq!(
            consumed,
            Consumed::Failed {
                message: "bad input".to_string()
            }
        );

        let success = TaskOutcome::Success(TaskResult::combine(&TaskId::new(1), vec![Rec(1)], 1));
        let consumed = agg.consume(success, &config, None).unwrap();
        assert_eq!(consumed, Consumed::Emitted { written: 0 });
    }

    #[test]
    fn test_call_results_aggregate_coverage_and_snf() {
        let config = EmitConfig::default();
        let mut agg = OutcomeAggregator::new(&config);

        let results = vec![
            TaskResult::call(
                &TaskId::new(2),
                vec![Rec(1)],
                10,
                CallSummary::new(20.0).with_snf(snf(2)),
            ),
            TaskResult::call(&TaskId::new(1), vec![Rec(2)], 10, CallSummary::new(30.0)),
            TaskResult::call(
                &TaskId::new(0),
                vec![Rec(3), Rec(4)],
                10,
                CallSummary::new(40.0).with_snf(snf(0)),
            ),
        ];
        for result in results {
            agg.consume(TaskOutcome::Success(result), &config, None).unwrap();
        }

        let report = agg.finish();
        assert_eq!(report.svcount, 4);
        assert_eq!(report.records_written, 0);
        assert_eq!(report.coverage_average, Some(30.0));
        let indices: Vec<u32> = report.snf_parts.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn test_no_call_results_means_no_coverage() {
        let config = EmitConfig::new("empty").with_run_id(RunId::new("run-empty"));
        let report = OutcomeAggregator::new(&config).finish();
        assert_eq!(report.coverage_average, None);
        assert_eq!(report.run_id.as_str(), "run-empty");
        assert_eq!(report.label, "empty");
    }

    #[test]
    fn test_emit_failure_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmitConfig::default();
        let mut agg = OutcomeAggregator::new(&config);
        let result =
            TaskResult::combine_spooled(&TaskId::new(9), vec![Rec(1)], 1, dir.path()).unwrap();
        let path = result.spool_path().unwrap().to_path_buf();

        let mut writer = RejectingWriter;
        let err = agg
            .consume(TaskOutcome::Success(result), &config, Some(&mut writer))
            .unwrap_err();
        assert!(matches!(err, ResultError::Write(_)));
        assert!(!path.exists());
        assert_eq!(agg.tasks_seen(), 0);
    }
}
