use crate::value::ScriptValue;
use thiserror::Error;

/// Errors raised by a single call into a fuzz target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The target raised; `diagnostic` carries the full traceback text.
    #[error("{diagnostic}")]
    Raised { diagnostic: String },
    /// The target returned, but not the shape its caller consumes.
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),
}

/// Anything the harness can invoke with a list of positional arguments.
///
/// Targets are opaque to the harness: it only knows their name and how to call them.
pub trait Callable {
    fn name(&self) -> &str;
    fn call(&self, args: &[ScriptValue]) -> Result<ScriptValue, CallError>;
}

/// A `Callable` backed by a Rust closure.
///
/// Used for host-side targets and for injecting deliberately failing targets.
pub struct NativeFunction<F>
where
    F: Fn(&[ScriptValue]) -> Result<ScriptValue, String>,
{
    name: String,
    function: F,
}

impl<F> NativeFunction<F>
where
    F: Fn(&[ScriptValue]) -> Result<ScriptValue, String>,
{
    pub fn new(name: impl Into<String>, function: F) -> Self {
        Self {
            name: name.into(),
            function,
        }
    }
}

impl<F> Callable for NativeFunction<F>
where
    F: Fn(&[ScriptValue]) -> Result<ScriptValue, String>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: &[ScriptValue]) -> Result<ScriptValue, CallError> {
        (self.function)(args).map_err(|diagnostic| CallError::Raised { diagnostic })
    }
}
