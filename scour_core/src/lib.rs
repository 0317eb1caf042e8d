pub mod callable;
pub mod campaign;
pub mod config;
pub mod executor;
pub mod generator;
pub mod host;
pub mod input;
pub mod loader;
pub mod oracle;
pub mod registry;
pub mod sanitizer;
pub mod sink;
pub mod value;

pub use callable::{CallError, Callable, NativeFunction};
pub use campaign::{Campaign, CampaignSummary, DistinctFailure, TargetTally};
pub use config::ScourConfig;
pub use executor::{FailureKind, FuzzTarget, Outcome, invoke, run_target};
pub use generator::{
    ChunkingStrategy, FileDumpStrategy, FixedStrategy, FloatListStrategy, SourceTableStrategy,
};
pub use input::{GeneratedInput, InputStrategy};
pub use loader::{
    LoadError, LoadedModule, ScriptFunction, extract_function, load_function_from_file,
    load_module,
};
pub use oracle::{FailureOracle, FailureReport};
pub use registry::{StandardTargets, load_standard_targets};
pub use sanitizer::{Denylist, SanitizedSource, StrippedImport, sanitize_file, sanitize_source};
pub use sink::{FileLog, LogSink, MemoryLog};
pub use value::ScriptValue;
