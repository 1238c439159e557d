//! Successful task results.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::emit::{CallWriter, EmitConfig};
use crate::store::{CallRecord, InMemoryStore, Payload, PayloadStore, StoreStrategy};
use crate::{ResultError, TaskId, WorkUnit};

/// Reference to the side-channel summary file a calling task produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnfPart {
    /// File the worker wrote.
    pub filename: PathBuf,
    /// Position of this part when parts are stitched together.
    pub index: u32,
    /// Length of the part in bytes. Zero is a valid, empty part.
    pub total_length: u64,
    /// Number of candidates the part describes.
    pub candidate_count: u64,
}

/// Summary fields carried by a calling task's result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    /// Average coverage over the task's region. May be non-finite when the
    /// region had no usable reads.
    #[serde(with = "lossless_f64")]
    pub coverage_average_total: f64,
    /// Side-channel summary part, if the task wrote one.
    pub snf: Option<SnfPart>,
}

impl CallSummary {
    pub fn new(coverage_average_total: f64) -> Self {
        Self {
            coverage_average_total,
            snf: None,
        }
    }

    /// Builder method to attach a side-channel part.
    pub fn with_snf(mut self, part: SnfPart) -> Self {
        self.snf = Some(part);
        self
    }

    pub fn has_snf(&self) -> bool {
        self.snf.is_some()
    }
}

/// JSON has no NaN or infinity. Finite values stay numbers; the rest are
/// written as the strings `"NaN"`, `"inf"` and `"-inf"`.
mod lossless_f64 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid coverage value '{other}'"))),
            },
        }
    }
}

/// Which kind of task produced a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultKind {
    /// Variant calling.
    Call(CallSummary),
    /// Genotyping against known calls.
    Genotype,
    /// Merging calls for output. The only kind that writes on emit.
    Combine,
}

impl ResultKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Call(_) => "call",
            Self::Genotype => "genotype",
            Self::Combine => "combine",
        }
    }
}

/// The outcome of one task that completed without error.
///
/// `svcount` is captured when the result is built and never requires
/// touching the payload. The calls themselves are reached through
/// [`TaskResult::svcalls`], which may read from disk.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskResult<C> {
    task_id: TaskId,
    processed_read_count: u64,
    svcount: usize,
    kind: ResultKind,
    payload: Payload<C>,
}

impl<C> TaskResult<C> {
    /// Success results are never errors.
    pub const ERROR: bool = false;

    pub fn error(&self) -> bool {
        Self::ERROR
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn processed_read_count(&self) -> u64 {
        self.processed_read_count
    }

    /// Number of calls the task produced.
    pub fn svcount(&self) -> usize {
        self.svcount
    }

    pub fn kind(&self) -> &ResultKind {
        &self.kind
    }

    /// Call summary when this is a calling result.
    pub fn summary(&self) -> Option<&CallSummary> {
        match &self.kind {
            ResultKind::Call(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn payload(&self) -> &Payload<C> {
        &self.payload
    }

    pub fn spool_path(&self) -> Option<&Path> {
        self.payload.spool_path()
    }

    pub(crate) fn disarm(&mut self) {
        self.payload.disarm();
    }

    fn in_memory(
        task: &impl WorkUnit,
        kind: ResultKind,
        svcalls: Vec<C>,
        processed_read_count: u64,
    ) -> Self {
        Self {
            task_id: task.id(),
            processed_read_count,
            svcount: svcalls.len(),
            kind,
            payload: Payload::InMemory(InMemoryStore::new(svcalls)),
        }
    }
}

impl<C: CallRecord> TaskResult<C> {
    /// Build a result, retaining `svcalls` according to `strategy`.
    pub fn new(
        task: &impl WorkUnit,
        kind: ResultKind,
        svcalls: Vec<C>,
        processed_read_count: u64,
        strategy: &StoreStrategy,
    ) -> Result<Self, ResultError> {
        let task_id = task.id();
        let svcount = svcalls.len();
        let payload = Payload::store(strategy, task_id, svcalls)?;

        debug!(
            task_id = %task_id,
            kind = kind.name(),
            svcount = svcount,
            spooled = payload.is_spooled(),
            "Built task result"
        );

        Ok(Self {
            task_id,
            processed_read_count,
            svcount,
            kind,
            payload,
        })
    }

    /// Calling result with calls in memory.
    pub fn call(
        task: &impl WorkUnit,
        svcalls: Vec<C>,
        processed_read_count: u64,
        summary: CallSummary,
    ) -> Self {
        Self::in_memory(task, ResultKind::Call(summary), svcalls, processed_read_count)
    }

    /// Genotyping result with calls in memory.
    pub fn genotype(task: &impl WorkUnit, svcalls: Vec<C>, processed_read_count: u64) -> Self {
        Self::in_memory(task, ResultKind::Genotype, svcalls, processed_read_count)
    }

    /// Combine result with calls in memory.
    pub fn combine(task: &impl WorkUnit, svcalls: Vec<C>, processed_read_count: u64) -> Self {
        Self::in_memory(task, ResultKind::Combine, svcalls, processed_read_count)
    }

    /// Combine result with calls spooled to `tmp{task_id}.part` under `dir`.
    pub fn combine_spooled(
        task: &impl WorkUnit,
        svcalls: Vec<C>,
        processed_read_count: u64,
        dir: impl Into<PathBuf>,
    ) -> Result<Self, ResultError> {
        Self::new(
            task,
            ResultKind::Combine,
            svcalls,
            processed_read_count,
            &StoreStrategy::spooled(dir),
        )
    }

    /// The calls this task produced, in order.
    ///
    /// Spooled results decode their whole file on every call. Bind the
    /// returned value once and reuse it.
    pub fn svcalls(&self) -> Result<Cow<'_, [C]>, ResultError> {
        self.payload.get()
    }

    /// Write this result's calls to `writer` and return how many were written.
    ///
    /// Only combine results have an output target; other kinds return 0.
    /// A missing writer is not an error either: nothing is written and 0 is
    /// returned.
    pub fn emit(
        &self,
        config: &EmitConfig,
        writer: Option<&mut dyn CallWriter<C>>,
    ) -> Result<usize, ResultError> {
        if self.kind != ResultKind::Combine {
            debug!(
                run_id = %config.run_id,
                label = %config.label,
                task_id = %self.task_id,
                kind = self.kind.name(),
                "Result kind has no output target"
            );
            return Ok(0);
        }

        let Some(writer) = writer else {
            info!(
                run_id = %config.run_id,
                label = %config.label,
                task_id = %self.task_id,
                "No call output specified"
            );
            return Ok(0);
        };

        let calls = self.svcalls()?;
        for call in calls.iter() {
            writer.write_call(call)?;
        }

        info!(
            run_id = %config.run_id,
            label = %config.label,
            task_id = %self.task_id,
            written = calls.len(),
            "Wrote {} calls to {}", calls.len(), writer
        );
        Ok(calls.len())
    }

    /// Release the payload's backing resources. Safe to call more than once.
    ///
    /// For spooled results this deletes the spool file; `svcalls` fails
    /// afterwards.
    pub fn cleanup(&mut self) -> Result<(), ResultError> {
        self.payload.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Rec(u32);

    struct VecWriter(Vec<Rec>);

    impl fmt::Display for VecWriter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "vec-writer")
        }
    }

    impl CallWriter<Rec> for VecWriter {
        fn write_call(&mut self, call: &Rec) -> Result<(), ResultError> {
            self.0.push(call.clone());
            Ok(())
        }
    }

    struct FailingWriter;

    impl fmt::Display for FailingWriter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "failing-writer")
        }
    }

    impl CallWriter<Rec> for FailingWriter {
        fn write_call(&mut self, _call: &Rec) -> Result<(), ResultError> {
            Err(ResultError::Write("disk full".to_string()))
        }
    }

    fn recs(n: u32) -> Vec<Rec> {
        (0..n).map(Rec).collect()
    }

    #[test]
    fn test_svcount_matches_calls_for_every_variant() {
        let dir = tempfile::tempdir().unwrap();
        let task = TaskId::new(1);
        let results = vec![
            TaskResult::call(&task, recs(3), 10, CallSummary::new(12.5)),
            TaskResult::genotype(&task, recs(4), 10),
            TaskResult::combine(&task, recs(5), 10),
            TaskResult::combine_spooled(&task, recs(6), 10, dir.path()).unwrap(),
        ];
        for result in &results {
            assert_eq!(result.svcount(), result.svcalls().unwrap().len());
            assert!(!result.error());
        }
    }

    #[test]
    fn test_task_id_comes_from_task() {
        let result = TaskResult::combine(&TaskId::new(77), recs(1), 3);
        assert_eq!(result.task_id(), TaskId::new(77));
        assert_eq!(result.processed_read_count(), 3);
    }

    #[test]
    fn test_error_flag_is_type_level() {
        assert!(!TaskResult::<Rec>::ERROR);
        let result = TaskResult::<Rec>::genotype(&TaskId::new(1), Vec::new(), 0);
        assert!(!result.error());
    }

    #[test]
    fn test_emit_writes_in_order() {
        let calls = vec![Rec(9), Rec(2), Rec(5)];
        let result = TaskResult::combine(&TaskId::new(1), calls.clone(), 3);
        let mut writer = VecWriter(Vec::new());

        let written = result.emit(&EmitConfig::default(), Some(&mut writer)).unwrap();
        assert_eq!(written, 3);
        assert_eq!(writer.0, calls);
    }

    #[test]
    fn test_emit_without_writer_returns_zero() {
        let result = TaskResult::combine(&TaskId::new(1), recs(3), 3);
        assert_eq!(result.emit(&EmitConfig::default(), None).unwrap(), 0);
    }

    #[test]
    fn test_emit_zero_for_non_combine_kinds() {
        let mut writer = VecWriter(Vec::new());
        let call = TaskResult::call(&TaskId::new(1), recs(3), 3, CallSummary::default());
        assert_eq!(call.emit(&EmitConfig::default(), Some(&mut writer)).unwrap(), 0);
        let genotype = TaskResult::genotype(&TaskId::new(2), recs(3), 3);
        assert_eq!(genotype.emit(&EmitConfig::default(), Some(&mut writer)).unwrap(), 0);
        assert!(writer.0.is_empty());
    }

    #[test]
    fn test_emit_spooled_then_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let mut result =
            TaskResult::combine_spooled(&TaskId::new(4), recs(100), 100, dir.path()).unwrap();
        let path = result.spool_path().unwrap().to_path_buf();
        assert!(path.exists());
        assert!(result.payload().is_spooled());

        let mut writer = VecWriter(Vec::new());
        assert_eq!(result.emit(&EmitConfig::default(), Some(&mut writer)).unwrap(), 100);
        assert_eq!(writer.0, recs(100));

        result.cleanup().unwrap();
        assert!(!path.exists());
        result.cleanup().unwrap();
        assert!(matches!(result.svcalls(), Err(ResultError::PayloadReleased { .. })));
    }

    #[test]
    fn test_emit_propagates_writer_error() {
        let result = TaskResult::combine(&TaskId::new(1), recs(2), 2);
        let mut writer = FailingWriter;
        let err = result.emit(&EmitConfig::default(), Some(&mut writer)).unwrap_err();
        assert!(matches!(err, ResultError::Write(_)));
    }

    #[test]
    fn test_call_summary_snf_absent_vs_empty() {
        let absent = CallSummary::new(1.0);
        assert!(!absent.has_snf());

        let empty = CallSummary::new(1.0).with_snf(SnfPart {
            filename: PathBuf::from("part0.snf"),
            index: 0,
            total_length: 0,
            candidate_count: 0,
        });
        assert!(empty.has_snf());
        assert_ne!(absent, empty);
    }

    #[test]
    fn test_in_memory_payload_has_no_spool_path() {
        let result = TaskResult::combine(&TaskId::new(1), recs(2), 2);
        assert!(!result.payload().is_spooled());
        assert!(result.spool_path().is_none());
    }

    #[test]
    fn test_non_finite_coverage_serializes_as_text() {
        let json = serde_json::to_value(CallSummary::new(f64::NEG_INFINITY)).unwrap();
        assert_eq!(json["coverage_average_total"], "-inf");

        let json = serde_json::to_value(CallSummary::new(12.5)).unwrap();
        assert_eq!(json["coverage_average_total"], 12.5);

        let parsed: CallSummary =
            serde_json::from_str(r#"{"coverage_average_total":"NaN","snf":null}"#).unwrap();
        assert!(parsed.coverage_average_total.is_nan());

        let bad = r#"{"coverage_average_total":"lots","snf":null}"#;
        assert!(serde_json::from_str::<CallSummary>(bad).is_err());
    }

    #[test]
    fn test_summary_only_on_call_results() {
        let call = TaskResult::call(&TaskId::new(1), recs(1), 1, CallSummary::new(30.0));
        assert_eq!(call.summary().unwrap().coverage_average_total, 30.0);
        assert!(TaskResult::combine(&TaskId::new(1), recs(1), 1).summary().is_none());
    }
}
