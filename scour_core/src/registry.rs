use crate::config::SourceSettings;
use crate::executor::FuzzTarget;
use crate::generator::{ChunkingStrategy, FileDumpStrategy, FloatListStrategy, SourceTableStrategy};
use crate::loader::{LoadError, ScriptFunction, load_function_from_file, load_module};
use crate::sanitizer::Denylist;
use log::info;

/// The fuzz targets of a standard campaign and the function that stamps its log.
#[derive(Debug)]
pub struct StandardTargets {
    /// `getAllSLOC`, `Average`, `Median`, `makeChunks`, `dumpContentIntoFile`, in that order.
    pub targets: Vec<FuzzTarget>,
    pub timestamp: ScriptFunction,
}

/// Loads every standard target exactly once.
///
/// `frequency` and `report` are trusted and loaded as modules; `mining` is sanitized with
/// `denylist` and only its two pure functions are extracted. Any failure here is fatal.
pub fn load_standard_targets(
    sources: &SourceSettings,
    denylist: &Denylist,
) -> Result<StandardTargets, LoadError> {
    let frequency = load_module("frequency", &sources.frequency_path())?;
    let report = load_module("report", &sources.report_path())?;
    let mining = sources.mining_path();

    let targets = vec![
        FuzzTarget::new(
            Box::new(frequency.function("getAllSLOC")?),
            Box::new(SourceTableStrategy),
        ),
        FuzzTarget::new(
            Box::new(report.function("Average")?),
            Box::new(FloatListStrategy),
        ),
        FuzzTarget::new(
            Box::new(report.function("Median")?),
            Box::new(FloatListStrategy),
        ),
        FuzzTarget::new(
            Box::new(load_function_from_file(&mining, "makeChunks", denylist)?),
            Box::new(ChunkingStrategy),
        ),
        FuzzTarget::new(
            Box::new(load_function_from_file(&mining, "dumpContentIntoFile", denylist)?),
            Box::new(FileDumpStrategy),
        ),
    ];
    let timestamp = frequency.function("giveTimeStamp")?;

    info!(
        "Loaded {} targets: {}",
        targets.len(),
        targets.iter().map(FuzzTarget::name).collect::<Vec<_>>().join(", ")
    );
    Ok(StandardTargets { targets, timestamp })
}
