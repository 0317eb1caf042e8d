use crate::callable::CallError;
use crate::value::ScriptValue;
use log::debug;
use rand_core::RngCore;
use tempfile::TempPath;

/// Arguments for exactly one invocation, plus the temporary files they point at.
///
/// The temporary files belong to this value: they are removed by `release`, or on drop
/// if the invocation unwinds first.
#[derive(Debug)]
pub struct GeneratedInput {
    pub args: Vec<ScriptValue>,
    temp_paths: Vec<TempPath>,
}

impl GeneratedInput {
    pub fn new(args: Vec<ScriptValue>) -> Self {
        Self {
            args,
            temp_paths: Vec::new(),
        }
    }

    pub fn with_temp_paths(args: Vec<ScriptValue>, temp_paths: Vec<TempPath>) -> Self {
        Self { args, temp_paths }
    }

    pub fn temp_file_count(&self) -> usize {
        self.temp_paths.len()
    }

    /// Deletes the temporary files. A failed deletion is logged and otherwise ignored.
    pub fn release(self) {
        for temp_path in self.temp_paths {
            let display = temp_path.display().to_string();
            if let Err(e) = temp_path.close() {
                debug!("Ignoring failure to remove temp file {display}: {e}");
            }
        }
    }
}

/// The input-generation half of a fuzz target.
///
/// A strategy knows the shape of its target's arguments and how to describe a successful
/// result for the log.
pub trait InputStrategy {
    /// Produces fresh arguments. Errors are I/O failures while preparing temp files.
    fn generate(&mut self, rng: &mut dyn RngCore) -> std::io::Result<GeneratedInput>;

    /// Renders the salient metadata of a successful call, or rejects a result whose
    /// shape the caller cannot consume.
    fn summarize(&self, input: &GeneratedInput, result: &ScriptValue) -> Result<String, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn release_removes_temp_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "data").unwrap();
        let path = file.into_temp_path();
        let location = path.to_path_buf();
        let input = GeneratedInput::with_temp_paths(vec![ScriptValue::None], vec![path]);
        assert_eq!(input.temp_file_count(), 1);
        input.release();
        assert!(!location.exists());
    }

    #[test]
    fn release_tolerates_files_already_removed() {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        std::fs::remove_file(&path).unwrap();
        GeneratedInput::with_temp_paths(vec![], vec![path]).release();
    }
}
