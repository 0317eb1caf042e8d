use crate::executor::{FailureKind, Outcome};
use serde::Serialize;

/// A failed invocation, reduced to what is needed to group it with similar failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub target: String,
    pub kind: FailureKind,
    /// The error line of the diagnostic.
    pub message: String,
    /// MD5 hex digest of target, kind and message; equal for repeats of the same failure.
    pub signature: String,
}

/// Examines outcomes and reports the failed ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailureOracle;

impl FailureOracle {
    pub fn new() -> Self {
        FailureOracle
    }

    pub fn examine(&self, target: &str, outcome: &Outcome) -> Option<FailureReport> {
        match outcome {
            Outcome::Ok { .. } => None,
            Outcome::Failed { kind, diagnostic } => {
                let message = error_line(diagnostic).to_string();
                let digest = md5::compute(format!("{target}\0{kind:?}\0{message}"));
                Some(FailureReport {
                    target: target.to_string(),
                    kind: *kind,
                    message,
                    signature: format!("{digest:x}"),
                })
            }
        }
    }
}

/// Picks the line naming the error out of a traceback: the first `error:` line if there
/// is one, else the last non-empty line.
fn error_line(diagnostic: &str) -> &str {
    diagnostic
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("error:"))
        .or_else(|| diagnostic.lines().map(str::trim).filter(|l| !l.is_empty()).last())
        .unwrap_or("")
}
