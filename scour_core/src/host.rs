//! Native functions exposed to target scripts.
//!
//! Sanitized sources get the core set only: standard Starlark plus plain file access,
//! the capability the target helpers need to read inputs and dump output. Trusted
//! modules additionally get the clock and Starlark's library extensions.

use chrono::Local;
use starlark::environment::{Globals, GlobalsBuilder, LibraryExtension};
use starlark::starlark_module;
use std::fmt::Write as _;

#[starlark_module]
fn file_builtins(builder: &mut GlobalsBuilder) {
    /// Reads `path` and returns its lines with terminators, like `readlines()`.
    fn read_lines(
        #[starlark(require = pos)] path: &str,
        #[starlark(require = pos)] encoding: Option<&str>,
    ) -> anyhow::Result<Vec<String>> {
        let bytes = std::fs::read(path)?;
        let text = decode(&bytes, encoding.unwrap_or("utf-8"))?;
        Ok(text.split_inclusive('\n').map(str::to_owned).collect())
    }

    /// Replaces the contents of `path` with `content`, returning the bytes written.
    fn write_text(
        #[starlark(require = pos)] path: &str,
        #[starlark(require = pos)] content: &str,
    ) -> anyhow::Result<i32> {
        std::fs::write(path, content)?;
        Ok(i32::try_from(content.len())?)
    }

    fn file_size(#[starlark(require = pos)] path: &str) -> anyhow::Result<i32> {
        let len = std::fs::metadata(path)?.len();
        Ok(i32::try_from(len)?)
    }
}

#[starlark_module]
fn clock_builtins(builder: &mut GlobalsBuilder) {
    /// Local time rendered with a strftime-style `format`.
    fn now(#[starlark(require = pos)] format: &str) -> anyhow::Result<String> {
        let mut out = String::new();
        write!(out, "{}", Local::now().format(format))
            .map_err(|_| anyhow::anyhow!("invalid time format: {format:?}"))?;
        Ok(out)
    }
}

fn decode(bytes: &[u8], encoding: &str) -> anyhow::Result<String> {
    match encoding.to_ascii_lowercase().as_str() {
        "latin-1" | "latin1" | "iso-8859-1" => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        "utf-8" | "utf8" => Ok(String::from_utf8(bytes.to_vec())?),
        other => Err(anyhow::anyhow!("unsupported encoding: {other}")),
    }
}

/// Globals for sanitized sources.
///
/// Each name in `tombstones` is bound to an inert string so that code mentioning a
/// removed import still compiles; any use of it fails when the function runs.
pub fn core_globals<'a>(tombstones: impl IntoIterator<Item = &'a str>) -> Globals {
    let mut builder = GlobalsBuilder::standard().with(file_builtins);
    for name in tombstones {
        builder.set(name, format!("<removed import: {name}>"));
    }
    builder.build()
}

/// Globals for trusted modules, which are loaded without sanitization.
pub fn trusted_globals() -> Globals {
    GlobalsBuilder::extended_by(&[
        LibraryExtension::StructType,
        LibraryExtension::Json,
        LibraryExtension::Map,
        LibraryExtension::Filter,
        LibraryExtension::Print,
    ])
    .with(file_builtins)
    .with(clock_builtins)
    .build()
}
