use crate::loader::LoadError;
use log::debug;
use std::path::{Path, PathBuf};

/// Modules whose import statements are removed from untrusted sources by default:
/// process spawning, filesystem copy/removal and version control.
pub const DEFAULT_DENYLIST: [&str; 3] = ["subprocess", "shutil", "git"];

/// Module names whose imports are stripped before a source is executed.
///
/// An entry denies the module itself and every submodule below it, so `git` covers
/// `git.repo` but not `gitdb`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denylist {
    modules: Vec<String>,
}

impl Denylist {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }

    pub fn denies(&self, module: &str) -> bool {
        self.modules.iter().any(|denied| {
            module == denied
                || (module.starts_with(denied.as_str())
                    && module.as_bytes().get(denied.len()) == Some(&b'.'))
        })
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }
}

impl Default for Denylist {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST)
    }
}

/// One module named by an import statement that was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedImport {
    /// 1-based line on which the removed statement started.
    pub line: usize,
    pub module: String,
    /// Names the statement would have bound in the importing namespace.
    pub bindings: Vec<String>,
}

/// Source text with denied imports removed, plus a record of what was removed.
#[derive(Debug, Clone)]
pub struct SanitizedSource {
    pub origin: PathBuf,
    pub text: String,
    pub stripped: Vec<StrippedImport>,
}

impl SanitizedSource {
    /// Every name a removed import would have bound, deduplicated, in source order.
    pub fn stripped_bindings(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for import in &self.stripped {
            for name in &import.bindings {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }
}

/// Reads `path` and removes every import statement that names a denied module.
pub fn sanitize_file(path: &Path, denylist: &Denylist) -> Result<SanitizedSource, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(sanitize_source(&text, path, denylist))
}

/// Removes denied import statements from `text`.
///
/// Statements are recognized structurally: `import a.b as c, d` and
/// `from a.b import (x as y, z)` forms, including backslash and parenthesized
/// continuations and `;`-separated statements. Every physical line of a denied
/// statement is dropped; all other lines are kept byte-for-byte and in order.
/// Text inside triple-quoted strings is never treated as an import.
pub fn sanitize_source(text: &str, origin: &Path, denylist: &Denylist) -> SanitizedSource {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut kept = String::with_capacity(text.len());
    let mut stripped = Vec::new();
    let mut triple: Option<&'static str> = None;
    let mut idx = 0;

    while idx < lines.len() {
        let start = idx;
        let mut scan = scan_line(strip_eol(lines[idx]), 0, triple);
        let starts_inside_string = triple.is_some();
        triple = scan.open_triple;
        idx += 1;

        // A line that opens inside a string starts with that string's tail; the tail ends
        // at the first top-level `;`, and only what follows it is code.
        let code_from = usize::from(starts_inside_string);
        let string_tail = starts_inside_string.then(|| scan.segments[0].len());
        let imports_here = scan.segments[code_from..].iter().any(|s| is_import(s));
        if imports_here {
            // Pull in continuation lines of the last statement on this line.
            while (scan.depth > 0 || scan.trailing_backslash) && idx < lines.len() {
                let next = scan_line(strip_eol(lines[idx]), scan.depth, triple);
                triple = next.open_triple;
                let mut segments = next.segments.into_iter();
                if let (Some(last), Some(first)) = (scan.segments.last_mut(), segments.next()) {
                    last.push(' ');
                    last.push_str(&first);
                }
                scan.segments.extend(segments);
                scan.depth = next.depth;
                scan.trailing_backslash = next.trailing_backslash;
                idx += 1;
            }

            let imported: Vec<ImportedModule> = scan.segments[code_from..]
                .iter()
                .filter_map(|segment| parse_import(segment))
                .flatten()
                .collect();
            if imported.iter().any(|m| denylist.denies(&m.module)) {
                debug!(
                    "Stripping import at {}:{}: {}",
                    origin.display(),
                    start + 1,
                    lines[start].trim_end()
                );
                stripped.extend(imported.into_iter().map(|m| StrippedImport {
                    line: start + 1,
                    module: m.module,
                    bindings: m.bindings,
                }));
                if let Some(tail) = string_tail {
                    kept.push_str(&lines[start][..tail]);
                    kept.push('\n');
                }
                continue;
            }
        }

        for line in &lines[start..idx] {
            kept.push_str(line);
        }
    }

    SanitizedSource {
        origin: origin.to_path_buf(),
        text: kept,
        stripped,
    }
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

struct LineScan {
    /// Code split on top-level `;`, comments removed.
    segments: Vec<String>,
    depth: i32,
    open_triple: Option<&'static str>,
    trailing_backslash: bool,
}

/// Splits one physical line into statement segments, tracking brackets and strings.
fn scan_line(line: &str, mut depth: i32, mut triple: Option<&'static str>) -> LineScan {
    let bytes = line.as_bytes();
    let mut segments = Vec::new();
    let mut seg_start = 0;
    let mut i = 0;
    let mut code_end = bytes.len();

    while i < bytes.len() {
        if let Some(quote) = triple {
            if bytes[i..].starts_with(quote.as_bytes()) {
                triple = None;
                i += quote.len();
            } else {
                i += if bytes[i] == b'\\' { 2 } else { 1 };
            }
            continue;
        }
        match bytes[i] {
            b'#' => {
                code_end = i;
                break;
            }
            q @ (b'"' | b'\'') => {
                let quote: &'static str = if q == b'"' { "\"\"\"" } else { "'''" };
                if bytes[i..].starts_with(quote.as_bytes()) {
                    triple = Some(quote);
                    i += quote.len();
                } else {
                    i += 1;
                    while i < bytes.len() && bytes[i] != q {
                        i += if bytes[i] == b'\\' { 2 } else { 1 };
                    }
                    i += 1;
                }
            }
            b'(' | b'[' | b'{' => {
                depth += 1;
                i += 1;
            }
            b')' | b']' | b'}' => {
                depth -= 1;
                i += 1;
            }
            b';' if depth <= 0 => {
                segments.push(line[seg_start..i].to_string());
                seg_start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }

    let code_end = code_end.min(bytes.len()).max(seg_start);
    let mut last = line[seg_start..code_end].trim_end().to_string();
    let trailing_backslash = triple.is_none() && last.ends_with('\\');
    if trailing_backslash {
        last.pop();
    }
    segments.push(last);

    LineScan {
        segments,
        depth: depth.max(0),
        open_triple: triple,
        trailing_backslash,
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ImportedModule {
    module: String,
    bindings: Vec<String>,
}

fn is_import(segment: &str) -> bool {
    let segment = segment.trim_start();
    strip_keyword(segment, "import").is_some() || strip_keyword(segment, "from").is_some()
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(keyword)?;
    match rest.chars().next() {
        Some(c) if c.is_whitespace() || c == '(' => Some(rest),
        _ => None,
    }
}

fn is_dotted_name(name: &str) -> bool {
    let name = name.trim_start_matches('.');
    !name.is_empty()
        && name
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'))
}

/// Parses one simple statement as an import, returning the modules it names.
fn parse_import(segment: &str) -> Option<Vec<ImportedModule>> {
    let segment = segment.trim();
    if let Some(rest) = strip_keyword(segment, "import") {
        let mut modules = Vec::new();
        for item in rest.split(',') {
            let words: Vec<&str> = item.split_whitespace().collect();
            let (module, binding) = match words.as_slice() {
                [] => continue,
                [module] => (*module, module.split('.').next().unwrap_or(module)),
                [module, "as", alias] => (*module, *alias),
                _ => return None,
            };
            if !is_dotted_name(module) {
                return None;
            }
            modules.push(ImportedModule {
                module: module.to_string(),
                bindings: vec![binding.to_string()],
            });
        }
        return (!modules.is_empty()).then_some(modules);
    }

    let rest = strip_keyword(segment, "from")?.trim_start();
    let split_at = rest.find(char::is_whitespace)?;
    let (module, rest) = rest.split_at(split_at);
    let names = strip_keyword(rest.trim_start(), "import")?;
    if module.starts_with('.') || !is_dotted_name(module) {
        // Relative imports never name a top-level package.
        return None;
    }
    let names = names.trim().trim_start_matches('(').trim_end_matches(')');
    let mut bindings = Vec::new();
    for item in names.split(',') {
        match item.split_whitespace().collect::<Vec<_>>().as_slice() {
            [] | ["*"] => {}
            [name] => bindings.push(name.to_string()),
            [_, "as", alias] => bindings.push(alias.to_string()),
            _ => return None,
        }
    }
    Some(vec![ImportedModule {
        module: module.to_string(),
        bindings,
    }])
}
