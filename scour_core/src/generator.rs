use crate::callable::CallError;
use crate::input::{GeneratedInput, InputStrategy};
use crate::value::ScriptValue;
use rand::Rng;
use rand_core::RngCore;
use std::io::{self, Write};
use std::ops::RangeInclusive;
use tempfile::{NamedTempFile, TempPath};

/// Characters used for generated text: single-byte in every encoding the targets read.
const PRINTABLE: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 ";

const SOURCE_FILES: RangeInclusive<usize> = 1..=5;
const LINES_PER_FILE: RangeInclusive<usize> = 1..=30;
const CHARS_PER_LINE: RangeInclusive<usize> = 5..=40;
const FLOAT_LIST_LEN: RangeInclusive<usize> = 1..=25;
const VALUE_BOUND: f64 = 1000.0;
const INT_LIST_LEN: RangeInclusive<usize> = 0..=40;
const INT_BOUND: i64 = 1000;
const CHUNK_SIZE: RangeInclusive<i64> = 1..=10;
const DUMP_CONTENT_LEN: RangeInclusive<usize> = 0..=200;

/// Column holding the file paths in the line counter's input table.
pub const FILE_PATH_COLUMN: &str = "FILE_FULL_PATH";

pub fn random_string(rng: &mut dyn RngCore, len: usize) -> String {
    (0..len)
        .map(|_| char::from(PRINTABLE[rng.random_range(0..PRINTABLE.len())]))
        .collect()
}

fn path_arg(path: &TempPath) -> io::Result<ScriptValue> {
    path.to_str()
        .map(ScriptValue::str)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "temp path is not valid UTF-8"))
}

fn first_len(input: &GeneratedInput) -> usize {
    input.args.first().and_then(ScriptValue::len).unwrap_or(0)
}

/// One to five temporary source files of random printable lines, passed as a one-column
/// table of paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceTableStrategy;

impl InputStrategy for SourceTableStrategy {
    fn generate(&mut self, rng: &mut dyn RngCore) -> io::Result<GeneratedInput> {
        let file_count = rng.random_range(SOURCE_FILES);
        let mut temp_paths = Vec::with_capacity(file_count);
        let mut paths = Vec::with_capacity(file_count);
        for _ in 0..file_count {
            let mut file = NamedTempFile::new()?;
            for _ in 0..rng.random_range(LINES_PER_FILE) {
                let len = rng.random_range(CHARS_PER_LINE);
                writeln!(file, "{}", random_string(rng, len))?;
            }
            file.flush()?;
            let temp_path = file.into_temp_path();
            paths.push(path_arg(&temp_path)?);
            temp_paths.push(temp_path);
        }
        let table = ScriptValue::Table(vec![(FILE_PATH_COLUMN.to_string(), paths)]);
        Ok(GeneratedInput::with_temp_paths(vec![table], temp_paths))
    }

    fn summarize(&self, input: &GeneratedInput, result: &ScriptValue) -> Result<String, CallError> {
        Ok(format!(
            "total_sloc={result} for {} files",
            input.temp_file_count()
        ))
    }
}

/// A non-empty list of uniform floats in [-1000, 1000], for the statistics targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct FloatListStrategy;

impl InputStrategy for FloatListStrategy {
    fn generate(&mut self, rng: &mut dyn RngCore) -> io::Result<GeneratedInput> {
        let len = rng.random_range(FLOAT_LIST_LEN);
        let values: Vec<f64> = (0..len)
            .map(|_| rng.random_range(-VALUE_BOUND..=VALUE_BOUND))
            .collect();
        Ok(GeneratedInput::new(vec![ScriptValue::floats(&values)]))
    }

    fn summarize(&self, input: &GeneratedInput, result: &ScriptValue) -> Result<String, CallError> {
        Ok(format!("input_len={}, result={result}", first_len(input)))
    }
}

/// A possibly empty list of integers and an independent chunk size.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChunkingStrategy;

impl InputStrategy for ChunkingStrategy {
    fn generate(&mut self, rng: &mut dyn RngCore) -> io::Result<GeneratedInput> {
        let len = rng.random_range(INT_LIST_LEN);
        let values: Vec<i64> = (0..len)
            .map(|_| rng.random_range(-INT_BOUND..=INT_BOUND))
            .collect();
        let chunk_size = rng.random_range(CHUNK_SIZE);
        Ok(GeneratedInput::new(vec![
            ScriptValue::ints(&values),
            ScriptValue::Int(chunk_size),
        ]))
    }

    fn summarize(&self, input: &GeneratedInput, result: &ScriptValue) -> Result<String, CallError> {
        let chunks = result.as_list().ok_or_else(|| {
            CallError::UnexpectedResult(format!("expected a sequence of chunks, got {result}"))
        })?;
        let chunk_size = input.args.get(1).and_then(ScriptValue::as_int).unwrap_or(0);
        Ok(format!(
            "list_size={}, chunk_size={chunk_size}, num_chunks={}",
            first_len(input),
            chunks.len()
        ))
    }
}

/// Random printable content and a fresh, existing, empty file to dump it into.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileDumpStrategy;

impl InputStrategy for FileDumpStrategy {
    fn generate(&mut self, rng: &mut dyn RngCore) -> io::Result<GeneratedInput> {
        let len = rng.random_range(DUMP_CONTENT_LEN);
        let content = random_string(rng, len);
        let temp_path = NamedTempFile::new()?.into_temp_path();
        let path = path_arg(&temp_path)?;
        Ok(GeneratedInput::with_temp_paths(
            vec![ScriptValue::Str(content), path],
            vec![temp_path],
        ))
    }

    fn summarize(&self, input: &GeneratedInput, result: &ScriptValue) -> Result<String, CallError> {
        Ok(format!(
            "content_len={}, reported_size={result}",
            first_len(input)
        ))
    }
}

/// Replays the same arguments on every invocation.
#[derive(Debug, Clone)]
pub struct FixedStrategy {
    args: Vec<ScriptValue>,
}

impl FixedStrategy {
    pub fn new(args: Vec<ScriptValue>) -> Self {
        Self { args }
    }
}

impl InputStrategy for FixedStrategy {
    fn generate(&mut self, _rng: &mut dyn RngCore) -> io::Result<GeneratedInput> {
        Ok(GeneratedInput::new(self.args.clone()))
    }

    fn summarize(&self, input: &GeneratedInput, result: &ScriptValue) -> Result<String, CallError> {
        Ok(format!("input_len={}, result={result}", first_len(input)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(0x5c0)
    }

    #[test]
    fn source_table_writes_bounded_printable_files() {
        let mut rng = rng();
        for _ in 0..20 {
            let input = SourceTableStrategy.generate(&mut rng).unwrap();
            assert!(SOURCE_FILES.contains(&input.temp_file_count()));
            let ScriptValue::Table(columns) = &input.args[0] else {
                panic!("Expected a table, got {:?}", input.args[0]);
            };
            assert_eq!(columns.len(), 1);
            assert_eq!(columns[0].0, FILE_PATH_COLUMN);
            for path in &columns[0].1 {
                let text = std::fs::read_to_string(path.as_str().unwrap()).unwrap();
                let lines: Vec<&str> = text.lines().collect();
                assert!(LINES_PER_FILE.contains(&lines.len()));
                for line in lines {
                    assert!(CHARS_PER_LINE.contains(&line.len()));
                    assert!(line.bytes().all(|b| PRINTABLE.contains(&b)));
                }
            }
            input.release();
        }
    }

    #[test]
    fn float_lists_are_non_empty_and_bounded() {
        let mut rng = rng();
        for _ in 0..50 {
            let input = FloatListStrategy.generate(&mut rng).unwrap();
            let values = input.args[0].as_list().unwrap();
            assert!(FLOAT_LIST_LEN.contains(&values.len()));
            assert!(
                values
                    .iter()
                    .all(|v| v.as_float().unwrap().abs() <= VALUE_BOUND)
            );
        }
    }

    #[test]
    fn chunking_inputs_include_the_empty_list() {
        let mut rng = rng();
        let mut saw_empty = false;
        for _ in 0..500 {
            let input = ChunkingStrategy.generate(&mut rng).unwrap();
            let values = input.args[0].as_list().unwrap();
            assert!(INT_LIST_LEN.contains(&values.len()));
            assert!(CHUNK_SIZE.contains(&input.args[1].as_int().unwrap()));
            saw_empty |= values.is_empty();
        }
        assert!(saw_empty, "the empty-list boundary was never generated");
    }

    #[test]
    fn chunking_summary_rejects_non_sequences() {
        let input = GeneratedInput::new(vec![ScriptValue::ints(&[1, 2, 3]), ScriptValue::Int(2)]);
        let ok = ChunkingStrategy.summarize(
            &input,
            &ScriptValue::List(vec![ScriptValue::ints(&[1, 2]), ScriptValue::ints(&[3])]),
        );
        assert_eq!(ok.unwrap(), "list_size=3, chunk_size=2, num_chunks=2");
        assert!(matches!(
            ChunkingStrategy.summarize(&input, &ScriptValue::None),
            Err(CallError::UnexpectedResult(_))
        ));
    }

    #[test]
    fn file_dump_target_exists_and_is_empty() {
        let mut rng = rng();
        let input = FileDumpStrategy.generate(&mut rng).unwrap();
        let content = input.args[0].as_str().unwrap();
        assert!(DUMP_CONTENT_LEN.contains(&content.len()));
        let path = std::path::PathBuf::from(input.args[1].as_str().unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        input.release();
        assert!(!path.exists());
    }

    #[test]
    fn fixed_strategy_replays_its_arguments() {
        let mut rng = rng();
        let mut strategy = FixedStrategy::new(vec![ScriptValue::floats(&[1.0, 2.0, 3.0])]);
        let first = strategy.generate(&mut rng).unwrap();
        let second = strategy.generate(&mut rng).unwrap();
        assert_eq!(first.args, second.args);
        assert_eq!(
            strategy.summarize(&first, &ScriptValue::Float(2.0)).unwrap(),
            "input_len=3, result=2.0"
        );
    }
}
