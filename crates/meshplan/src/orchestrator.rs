//! The outer loop: alternates LP planning and GA refinement against a
//! scratch copy of the persistent store, and flushes once at the end.
//! Running the LP and GA against scratch rather than the persistent store
//! directly means a run that fails partway through (an infeasible LP, an
//! I/O error on load) never leaves the on-disk data file half-written.

use tracing::info;

use meshplan_core::DataStore;
use meshplan_core::persistence;
use meshplan_error::MeshResult;
use meshplan_ga::GaConfig;

use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub iterations: usize,
    pub ga: GaConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            iterations: 20,
            ga: GaConfig::default(),
        }
    }
}

/// Loads schema and data, alternates LP solve and GA refinement for
/// `config.iterations` rounds against a scratch store, then merges the
/// scratch store back into the persistent one and writes it out exactly
/// once. Returns the final round's quality score.
pub fn run_orchestration(
    schema_path: impl AsRef<Path>,
    data_path: impl AsRef<Path>,
    config: OrchestratorConfig,
) -> MeshResult<f64> {
    let schema = persistence::load_schema(schema_path)?;
    let mut persistent = persistence::load_data(&data_path)?;
    let mut scratch: DataStore = persistent.scratch_copy();

    let mut quality = f64::NEG_INFINITY;
    for iteration in 0..config.iterations {
        meshplan_lp::solve(&schema, &mut scratch)?;

        let outcome = meshplan_ga::run(&schema, &scratch, config.ga)?;
        scratch.merge_from(&outcome.store);
        quality = outcome.quality;

        info!(iteration, quality, "orchestration round complete");
    }

    persistent.merge_from(&scratch);
    persistence::save_data(&persistent, data_path)?;

    Ok(quality)
}
