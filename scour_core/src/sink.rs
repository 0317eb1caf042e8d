use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// An append-only sequence of log lines, the only record a campaign leaves behind.
pub trait LogSink {
    /// Discards everything written so far. Called once, when a campaign starts.
    fn reset(&mut self) -> io::Result<()>;

    /// Appends one entry. An entry may itself span several lines.
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

/// A log file on disk.
///
/// The file is reopened in append mode for every entry, so whatever was written before
/// the process is killed stays readable.
#[derive(Debug, Clone)]
pub struct FileLog {
    path: PathBuf,
}

impl FileLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLog {
    fn reset(&mut self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

/// Keeps the log in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    lines: Vec<String>,
    resets: usize,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    /// The log as it would read on disk.
    pub fn contents(&self) -> String {
        self.lines.iter().map(|line| format!("{line}\n")).collect()
    }
}

impl LogSink for MemoryLog {
    fn reset(&mut self) -> io::Result<()> {
        self.lines.clear();
        self.resets += 1;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }
}
