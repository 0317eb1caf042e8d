use crate::callable::Callable;
use crate::executor::{FuzzTarget, Outcome, panic_message, run_target};
use crate::oracle::{FailureOracle, FailureReport};
use crate::sink::LogSink;
use crate::value::ScriptValue;
use log::{info, warn};
use rand_core::RngCore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};

pub const DEFAULT_ROUNDS: u32 = 50;
pub const START_MARKER: &str = "------ FUZZING START ------";
pub const END_MARKER: &str = "------ FUZZING END ------";
/// Logged in place of the timestamp when the provider is missing or fails.
pub const UNKNOWN_TIMESTAMP: &str = "UNKNOWN_TIMESTAMP";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TargetTally {
    pub ok: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistinctFailure {
    #[serde(flatten)]
    pub report: FailureReport,
    pub occurrences: u64,
}

/// Counts gathered over a campaign. Reported at the end; never written to the log.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignSummary {
    pub timestamp: String,
    pub rounds_completed: u32,
    pub invocations: u64,
    pub ok: u64,
    pub failed: u64,
    pub per_target: BTreeMap<String, TargetTally>,
    /// One entry per failure signature, in order of first occurrence.
    pub distinct_failures: Vec<DistinctFailure>,
}

impl CampaignSummary {
    fn record(&mut self, target: &str, outcome: &Outcome, report: Option<FailureReport>) {
        self.invocations += 1;
        let tally = self.per_target.entry(target.to_string()).or_default();
        if outcome.is_ok() {
            self.ok += 1;
            tally.ok += 1;
        } else {
            self.failed += 1;
            tally.failed += 1;
        }
        if let Some(report) = report {
            match self
                .distinct_failures
                .iter_mut()
                .find(|seen| seen.report.signature == report.signature)
            {
                Some(seen) => seen.occurrences += 1,
                None => self.distinct_failures.push(DistinctFailure {
                    report,
                    occurrences: 1,
                }),
            }
        }
    }
}

/// Runs every registered target once per round for a fixed number of rounds.
///
/// `INIT -> ROUND x N -> DONE`: the log is reset and stamped, each round invokes every
/// target regardless of how the others fared, and an end marker closes the log. There is
/// no early exit; only a failure to write the log itself stops a campaign.
pub struct Campaign<'a> {
    rounds: u32,
    timestamp: Option<&'a dyn Callable>,
    oracle: FailureOracle,
}

impl<'a> Campaign<'a> {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds,
            timestamp: None,
            oracle: FailureOracle::new(),
        }
    }

    pub fn with_timestamp(mut self, provider: &'a dyn Callable) -> Self {
        self.timestamp = Some(provider);
        self
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    fn timestamp(&self) -> String {
        let Some(provider) = self.timestamp else {
            return UNKNOWN_TIMESTAMP.to_string();
        };
        match catch_unwind(AssertUnwindSafe(|| provider.call(&[]))) {
            Ok(Ok(ScriptValue::Str(stamp))) => stamp,
            Ok(Ok(other)) => other.to_string(),
            Ok(Err(e)) => {
                warn!("Timestamp provider `{}` failed: {e}", provider.name());
                UNKNOWN_TIMESTAMP.to_string()
            }
            Err(payload) => {
                warn!(
                    "Timestamp provider `{}` panicked: {}",
                    provider.name(),
                    panic_message(payload)
                );
                UNKNOWN_TIMESTAMP.to_string()
            }
        }
    }

    pub fn run(
        &self,
        targets: &mut [FuzzTarget],
        sink: &mut dyn LogSink,
        rng: &mut dyn RngCore,
    ) -> io::Result<CampaignSummary> {
        sink.reset()?;
        let mut summary = CampaignSummary {
            timestamp: self.timestamp(),
            ..CampaignSummary::default()
        };
        sink.write_line(START_MARKER)?;
        sink.write_line(&format!("Timestamp: {}", summary.timestamp))?;
        info!(
            "Starting campaign: {} rounds over {} targets",
            self.rounds,
            targets.len()
        );

        for round in 1..=self.rounds {
            sink.write_line(&format!("[ROUND {round}/{}]", self.rounds))?;
            for target in targets.iter_mut() {
                let outcome = run_target(target, rng, sink)?;
                let report = self.oracle.examine(target.name(), &outcome);
                summary.record(target.name(), &outcome, report);
            }
            summary.rounds_completed = round;
        }

        sink.write_line(END_MARKER)?;
        info!(
            "Campaign finished: {} invocations, {} ok, {} failed, {} distinct failures",
            summary.invocations,
            summary.ok,
            summary.failed,
            summary.distinct_failures.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::NativeFunction;
    use crate::generator::{FixedStrategy, FloatListStrategy};
    use crate::loader::load_module;
    use crate::sink::{FileLog, MemoryLog};
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;
    use std::path::PathBuf;

    fn native<F>(name: &str, f: F) -> FuzzTarget
    where
        F: Fn(&[ScriptValue]) -> Result<ScriptValue, String> + 'static,
    {
        FuzzTarget::new(
            Box::new(NativeFunction::new(name, f)),
            Box::new(FloatListStrategy),
        )
    }

    fn entries(contents: &str) -> (usize, usize) {
        let ok = contents.lines().filter(|l| l.starts_with("[OK]")).count();
        let err = contents.lines().filter(|l| l.starts_with("[ERROR]")).count();
        (ok, err)
    }

    #[test]
    fn fixed_average_scenario_logs_one_line_per_round() {
        let report_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../targets/empirical/report.py");
        let report = load_module("report", &report_path).unwrap();
        let mut targets = vec![FuzzTarget::new(
            Box::new(report.function("Average").unwrap()),
            Box::new(FixedStrategy::new(vec![ScriptValue::floats(&[1.0, 2.0, 3.0])])),
        )];
        let mut sink = MemoryLog::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let summary = Campaign::new(2).run(&mut targets, &mut sink, &mut rng).unwrap();

        assert_eq!(
            sink.lines(),
            [
                START_MARKER,
                "Timestamp: UNKNOWN_TIMESTAMP",
                "[ROUND 1/2]",
                "[OK] Average -> input_len=3, result=2.0",
                "[ROUND 2/2]",
                "[OK] Average -> input_len=3, result=2.0",
                END_MARKER,
            ]
        );
        assert_eq!(summary.rounds_completed, 2);
        assert_eq!(summary.ok, 2);
    }

    #[test]
    fn an_always_failing_target_does_not_stop_the_campaign() {
        let mut targets = vec![
            native("AlwaysRaises", |_| Err("error: injected failure".to_string())),
            native("AlwaysPanics", |_| panic!("injected panic")),
            native("Fine", |args| Ok(ScriptValue::Int(args.len() as i64))),
        ];
        let mut sink = MemoryLog::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let summary = Campaign::new(4).run(&mut targets, &mut sink, &mut rng).unwrap();

        assert_eq!(summary.rounds_completed, 4);
        assert_eq!(summary.invocations, 12);
        assert_eq!(summary.per_target["Fine"], TargetTally { ok: 4, failed: 0 });
        assert_eq!(summary.per_target["AlwaysRaises"], TargetTally { ok: 0, failed: 4 });
        assert_eq!(summary.per_target["AlwaysPanics"], TargetTally { ok: 0, failed: 4 });
        assert_eq!(summary.distinct_failures.len(), 2);
        assert!(summary.distinct_failures.iter().all(|f| f.occurrences == 4));
        assert_eq!(entries(&sink.contents()), (4, 8));
        assert_eq!(sink.lines().last().map(String::as_str), Some(END_MARKER));
    }

    #[test]
    fn log_file_is_truncated_once_and_holds_one_entry_per_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuzz_results.txt");
        std::fs::write(&path, "[OK] left over from an earlier run\n").unwrap();

        let mut targets = vec![
            native("Sometimes", |args| {
                let first = args[0].as_list().and_then(|l| l.first()).and_then(ScriptValue::as_float);
                match first {
                    Some(x) if x < 0.0 => Err(format!("error: negative head {x}\nsecond line")),
                    _ => Ok(ScriptValue::Bool(true)),
                }
            }),
            native("Fine", |_| Ok(ScriptValue::None)),
        ];
        let mut sink = FileLog::new(&path);
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let rounds = 7;

        let summary = Campaign::new(rounds).run(&mut targets, &mut sink, &mut rng).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("left over"));
        assert_eq!(contents.matches(START_MARKER).count(), 1);
        assert!(contents.trim_end().ends_with(END_MARKER));
        let (ok, err) = entries(&contents);
        assert_eq!(ok + err, rounds as usize * targets.len());
        assert_eq!(err as u64, summary.failed);
        assert_eq!(contents.lines().filter(|l| l.starts_with("[ROUND ")).count(), 7);
    }

    #[test]
    fn timestamp_failure_is_replaced_by_placeholder() {
        let failing = NativeFunction::new("giveTimeStamp", |_: &[ScriptValue]| {
            Err("clock unavailable".to_string())
        });
        let mut sink = MemoryLog::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        Campaign::new(0)
            .with_timestamp(&failing)
            .run(&mut [], &mut sink, &mut rng)
            .unwrap();
        assert_eq!(
            sink.lines(),
            [START_MARKER, "Timestamp: UNKNOWN_TIMESTAMP", END_MARKER]
        );
    }

    #[test]
    fn timestamp_provider_value_is_logged() {
        let clock = NativeFunction::new("giveTimeStamp", |_: &[ScriptValue]| {
            Ok(ScriptValue::str("2024-01-02 03:04:05"))
        });
        let mut sink = MemoryLog::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let summary = Campaign::new(1)
            .with_timestamp(&clock)
            .run(&mut [], &mut sink, &mut rng)
            .unwrap();
        assert_eq!(sink.lines()[1], "Timestamp: 2024-01-02 03:04:05");
        assert_eq!(summary.timestamp, "2024-01-02 03:04:05");
        assert_eq!(sink.resets(), 1);
    }

    #[test]
    fn summary_serializes_failures_flat() {
        let mut targets = vec![native("AlwaysRaises", |_| Err("error: nope".to_string()))];
        let mut sink = MemoryLog::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let summary = Campaign::new(2).run(&mut targets, &mut sink, &mut rng).unwrap();

        let json: serde_json::Value = serde_json::to_value(&summary).unwrap();
        let failure = &json["distinct_failures"][0];
        assert_eq!(failure["target"], "AlwaysRaises");
        assert_eq!(failure["kind"], "Raised");
        assert_eq!(failure["message"], "error: nope");
        assert_eq!(failure["occurrences"], 2);
        assert_eq!(json["per_target"]["AlwaysRaises"]["failed"], 2);
    }
}
