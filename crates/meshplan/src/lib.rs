//! The facade crate: wires the schema/data persistence layer, the LP
//! planner, the discrete-event simulator, and the GA refiner into the
//! outer-loop orchestrator, and exposes the library entry points external
//! callers (a CLI, a notebook, a test harness) drive against.

pub mod orchestrator;

pub use orchestrator::{OrchestratorConfig, run_orchestration};

pub use meshplan_core::{DataStore, Schema};
pub use meshplan_error::{MeshError, MeshResult};
pub use meshplan_ga::GaConfig;
pub use meshplan_sim::RunConfig;

use std::path::Path;

use meshplan_core::persistence;

/// Initializes the process-wide `tracing` subscriber from `RUST_LOG` (or a
/// sensible default), idempotently.
pub fn init_logging() {
    use std::sync::Once;
    static INIT_LOGGING: Once = Once::new();

    INIT_LOGGING.call_once(|| {
        use tracing_subscriber::EnvFilter;

        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with_target(false)
            .compact()
            .init();
    });
}

/// Solves the flow-balance LP in place against the data loaded from
/// `data_path` and writes the result back to the same file.
pub fn solve_lp(schema_path: impl AsRef<Path>, data_path: impl AsRef<Path>) -> MeshResult<()> {
    let schema = persistence::load_schema(schema_path)?;
    let mut store = persistence::load_data(&data_path)?;
    meshplan_lp::solve(&schema, &mut store)?;
    persistence::save_data(&store, data_path)
}

/// Runs the discrete-event simulator once against the data loaded from
/// `data_path` and returns its quality score without persisting anything.
pub fn simulate(
    schema_path: impl AsRef<Path>,
    data_path: impl AsRef<Path>,
    run_config: RunConfig,
) -> MeshResult<f64> {
    let schema = persistence::load_schema(schema_path)?;
    let store = persistence::load_data(data_path)?;
    let mut sim = meshplan_sim::Simulator::new(&schema, &store, run_config)?;
    sim.run()
}
