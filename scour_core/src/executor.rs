use crate::callable::{CallError, Callable};
use crate::input::InputStrategy;
use crate::sink::LogSink;
use log::debug;
use rand_core::RngCore;
use serde::Serialize;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// One fuzzed function together with its input-generation strategy.
pub struct FuzzTarget {
    name: String,
    callable: Box<dyn Callable>,
    strategy: Box<dyn InputStrategy>,
}

impl FuzzTarget {
    pub fn new(callable: Box<dyn Callable>, strategy: Box<dyn InputStrategy>) -> Self {
        Self {
            name: callable.name().to_string(),
            callable,
            strategy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for FuzzTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuzzTarget").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FailureKind {
    /// Preparing the generated input failed before the target was called.
    InputSetup,
    /// The target raised an error.
    Raised,
    /// The call panicked on the host side.
    Panicked,
    /// The target returned something its caller cannot consume.
    UnexpectedResult,
}

/// The result of one invocation. Logged immediately, then dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Ok { summary: String },
    Failed { kind: FailureKind, diagnostic: String },
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok { .. })
    }

    /// The log entry for this outcome; failures span several lines.
    pub fn log_entry(&self, target: &str) -> String {
        match self {
            Outcome::Ok { summary } => format!("[OK] {target} -> {summary}"),
            Outcome::Failed { diagnostic, .. } => {
                format!("[ERROR] {target} crashed:\n{}", diagnostic.trim_end())
            }
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic type".to_string()
    }
}

/// Calls `target` once with freshly generated input.
///
/// Every failure, including a panic inside the call, is captured in the returned
/// `Outcome`. Temp files owned by the input are released on every path.
pub fn invoke(target: &mut FuzzTarget, rng: &mut dyn RngCore) -> Outcome {
    let input = match target.strategy.generate(rng) {
        Ok(input) => input,
        Err(e) => {
            return Outcome::Failed {
                kind: FailureKind::InputSetup,
                diagnostic: format!("Failed to prepare input: {e}"),
            };
        }
    };

    let callable = &target.callable;
    let result = catch_unwind(AssertUnwindSafe(|| callable.call(&input.args)));

    let outcome = match result {
        Ok(Ok(value)) => match target.strategy.summarize(&input, &value) {
            Ok(summary) => Outcome::Ok { summary },
            Err(e) => Outcome::Failed {
                kind: FailureKind::UnexpectedResult,
                diagnostic: e.to_string(),
            },
        },
        Ok(Err(CallError::Raised { diagnostic })) => Outcome::Failed {
            kind: FailureKind::Raised,
            diagnostic,
        },
        Ok(Err(e @ CallError::UnexpectedResult(_))) => Outcome::Failed {
            kind: FailureKind::UnexpectedResult,
            diagnostic: e.to_string(),
        },
        Err(payload) => Outcome::Failed {
            kind: FailureKind::Panicked,
            diagnostic: format!("panicked: {}", panic_message(payload)),
        },
    };

    input.release();
    outcome
}

/// Invokes `target` and appends its log entry to `sink`.
///
/// Only a failure to write the log is returned as an error; target failures are not.
pub fn run_target(
    target: &mut FuzzTarget,
    rng: &mut dyn RngCore,
    sink: &mut dyn LogSink,
) -> std::io::Result<Outcome> {
    let outcome = invoke(target, rng);
    debug!(
        "{} -> {}",
        target.name(),
        if outcome.is_ok() { "ok" } else { "failed" }
    );
    sink.write_line(&outcome.log_entry(target.name()))?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::NativeFunction;
    use crate::generator::{FileDumpStrategy, FixedStrategy};
    use crate::sink::MemoryLog;
    use crate::value::ScriptValue;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn target<F>(name: &str, f: F) -> FuzzTarget
    where
        F: Fn(&[ScriptValue]) -> Result<ScriptValue, String> + 'static,
    {
        FuzzTarget::new(
            Box::new(NativeFunction::new(name, f)),
            Box::new(FixedStrategy::new(vec![ScriptValue::floats(&[1.0, 2.0])])),
        )
    }

    #[test]
    fn successful_call_is_summarized() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut ok = target("Echo", |_| Ok(ScriptValue::Float(1.5)));
        let outcome = invoke(&mut ok, &mut rng);
        assert_eq!(
            outcome,
            Outcome::Ok {
                summary: "input_len=2, result=1.5".to_string()
            }
        );
        assert_eq!(outcome.log_entry("Echo"), "[OK] Echo -> input_len=2, result=1.5");
    }

    #[test]
    fn raised_errors_are_captured_with_their_diagnostic() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut failing = target("Boom", |_| {
            Err("Traceback (most recent call last):\nerror: boom".to_string())
        });
        let outcome = invoke(&mut failing, &mut rng);
        match &outcome {
            Outcome::Failed { kind, diagnostic } => {
                assert_eq!(*kind, FailureKind::Raised);
                assert!(diagnostic.ends_with("error: boom"));
            }
            other => panic!("Expected Failed, got {other:?}"),
        }
        let entry = outcome.log_entry("Boom");
        assert!(entry.starts_with("[ERROR] Boom crashed:\nTraceback"));
    }

    #[test]
    fn panics_are_caught() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut panicking = target("Panics", |_| panic!("Boom!"));
        match invoke(&mut panicking, &mut rng) {
            Outcome::Failed { kind, diagnostic } => {
                assert_eq!(kind, FailureKind::Panicked);
                assert!(diagnostic.contains("Boom!"));
            }
            other => panic!("Expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn temp_files_are_removed_on_success_failure_and_panic() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let seen: Rc<RefCell<Vec<PathBuf>>> = Rc::default();
        for mode in ["ok", "raise", "panic"] {
            let seen_by_target = Rc::clone(&seen);
            let callable = NativeFunction::new("dump", move |args: &[ScriptValue]| {
                let path = PathBuf::from(args[1].as_str().unwrap_or_default());
                assert!(path.exists());
                seen_by_target.borrow_mut().push(path);
                match mode {
                    "ok" => Ok(ScriptValue::Int(0)),
                    "raise" => Err("write failed".to_string()),
                    _ => panic!("dump exploded"),
                }
            });
            let mut dump = FuzzTarget::new(Box::new(callable), Box::new(FileDumpStrategy));
            invoke(&mut dump, &mut rng);
        }
        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|path| !path.exists()));
    }

    #[test]
    fn run_target_writes_one_entry() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut sink = MemoryLog::new();
        let mut ok = target("Echo", |_| Ok(ScriptValue::Int(3)));
        let outcome = run_target(&mut ok, &mut rng, &mut sink).unwrap();
        assert!(outcome.is_ok());
        assert_eq!(sink.lines(), ["[OK] Echo -> input_len=2, result=3"]);
    }
}
