use crate::callable::{CallError, Callable};
use crate::host;
use crate::sanitizer::{Denylist, SanitizedSource, sanitize_file};
use crate::value::ScriptValue;
use log::{debug, info};
use starlark::environment::{FrozenModule, Globals, Module};
use starlark::eval::Evaluator;
use starlark::syntax::{AstModule, Dialect};
use starlark::values::{OwnedFrozenValue, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading fuzz targets. All of them are fatal to a campaign.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read source file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Executing {path:?} failed: {message}")]
    Execute { path: PathBuf, message: String },
    /// The name was absent after execution: either a wrong name, or sanitization removed
    /// something the definition depended on.
    #[error("Function `{name}` not found in sanitized {path:?}")]
    MissingFunction { name: String, path: PathBuf },
    #[error("Module `{module}` ({path:?}) has no public attribute `{name}`")]
    MissingAttribute {
        module: String,
        name: String,
        path: PathBuf,
    },
    #[error("Could not import module `{module}` from {path:?}: {source}")]
    Import {
        module: String,
        path: PathBuf,
        #[source]
        source: Box<LoadError>,
    },
}

/// A function taken out of a loaded source, frozen so it can be called any number of times.
///
/// Each call runs on its own disposable heap; nothing a call allocates survives it.
pub struct ScriptFunction {
    name: String,
    origin: PathBuf,
    value: OwnedFrozenValue,
}

impl std::fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish()
    }
}

impl ScriptFunction {
    pub fn origin(&self) -> &Path {
        &self.origin
    }
}

impl Callable for ScriptFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: &[ScriptValue]) -> Result<ScriptValue, CallError> {
        let module = Module::new();
        let heap = module.heap();
        let function = self.value.owned_value(module.frozen_heap());
        let args: Vec<Value> = args.iter().map(|arg| arg.alloc(heap)).collect();
        let mut eval = Evaluator::new(&module);
        let result = eval
            .eval_function(function, &args, &[])
            .map_err(|e| CallError::Raised {
                diagnostic: e.to_string(),
            })?;
        Ok(ScriptValue::from_value(result))
    }
}

/// Runs `text` once in a fresh module seeded only with `globals`, then freezes it.
///
/// `expect` is checked before freezing so a missing definition is reported as such
/// rather than as a lookup failure on the frozen module.
fn execute(
    origin: &Path,
    text: String,
    globals: &Globals,
    expect: Option<&str>,
) -> Result<FrozenModule, LoadError> {
    let ast = AstModule::parse(&origin.display().to_string(), text, &Dialect::Extended).map_err(
        |e| LoadError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        },
    )?;
    let module = Module::new();
    {
        let mut eval = Evaluator::new(&module);
        eval.eval_module(ast, globals)
            .map_err(|e| LoadError::Execute {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;
    }
    if let Some(name) = expect {
        if module.get(name).is_none() {
            return Err(LoadError::MissingFunction {
                name: name.to_string(),
                path: origin.to_path_buf(),
            });
        }
    }
    module.freeze().map_err(|e| LoadError::Execute {
        path: origin.to_path_buf(),
        message: format!("freezing module failed: {e:?}"),
    })
}

/// Executes an already sanitized source in an isolated namespace and returns `name` from it.
///
/// The namespace holds the core builtins and a tombstone for every name a removed import
/// would have bound. Top-level statements run once per call, so callers extract each
/// function once at startup.
pub fn extract_function(source: &SanitizedSource, name: &str) -> Result<ScriptFunction, LoadError> {
    let globals = host::core_globals(source.stripped_bindings());
    let frozen = execute(&source.origin, source.text.clone(), &globals, Some(name))?;
    let value = frozen.get(name).map_err(|_| LoadError::MissingFunction {
        name: name.to_string(),
        path: source.origin.clone(),
    })?;
    debug!("Extracted `{}` from {}", name, source.origin.display());
    Ok(ScriptFunction {
        name: name.to_string(),
        origin: source.origin.clone(),
        value,
    })
}

/// Sanitizes the untrusted file at `path` and extracts `name` from it.
pub fn load_function_from_file(
    path: &Path,
    name: &str,
    denylist: &Denylist,
) -> Result<ScriptFunction, LoadError> {
    let source = sanitize_file(path, denylist)?;
    if !source.stripped.is_empty() {
        info!(
            "Removed {} denied import(s) from {} before extracting `{}`",
            source.stripped.len(),
            path.display(),
            name
        );
    }
    extract_function(&source, name)
}

/// A whole source file loaded as a module, with all of its public names reachable.
pub struct LoadedModule {
    name: String,
    path: PathBuf,
    module: FrozenModule,
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl LoadedModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the public attribute `attr` as a callable.
    pub fn function(&self, attr: &str) -> Result<ScriptFunction, LoadError> {
        let missing = || LoadError::MissingAttribute {
            module: self.name.clone(),
            name: attr.to_string(),
            path: self.path.clone(),
        };
        if attr.starts_with('_') {
            return Err(missing());
        }
        let value = self.module.get(attr).map_err(|_| missing())?;
        Ok(ScriptFunction {
            name: attr.to_string(),
            origin: self.path.clone(),
            value,
        })
    }
}

/// Loads a trusted file as a module. Its top-level code runs unrestricted and unsanitized.
pub fn load_module(name: &str, path: &Path) -> Result<LoadedModule, LoadError> {
    let import_error = |source: LoadError| LoadError::Import {
        module: name.to_string(),
        path: path.to_path_buf(),
        source: Box::new(source),
    };
    let text = std::fs::read_to_string(path).map_err(|source| {
        import_error(LoadError::Read {
            path: path.to_path_buf(),
            source,
        })
    })?;
    let module = execute(path, text, &host::trusted_globals(), None).map_err(import_error)?;
    debug!("Loaded module `{}` from {}", name, path.display());
    Ok(LoadedModule {
        name: name.to_string(),
        path: path.to_path_buf(),
        module,
    })
}
