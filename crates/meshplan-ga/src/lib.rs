//! Genetic-algorithm refinement of the intensity-fraction allocations
//! (`m_psi`, `m_v`, `m_phi`) the LP leaves underdetermined, scored by
//! running the discrete-event simulator against each candidate.

pub mod gene;
pub mod population;

pub use gene::{FRACTION_VAR_ORDER, Gene, cross_random_fraction, normalize, random_mutate};
pub use population::{evaluate_all, generate, select, sort};

use meshplan_core::{DataStore, RowIndex, Schema};
use meshplan_error::{MeshResult, mesh_err};
use meshplan_sim::RunConfig;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct GaConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_strength: f64,
    pub run_config: RunConfig,
}

impl Default for GaConfig {
    fn default() -> Self {
        GaConfig {
            population_size: 20,
            generations: 30,
            mutation_strength: 0.2,
            run_config: RunConfig::default(),
        }
    }
}

pub struct GaOutcome {
    pub store: DataStore,
    pub quality: f64,
}

fn gene_quality(gene: &Gene) -> f64 {
    gene.quality.unwrap_or(f64::NEG_INFINITY)
}

/// Runs the full generate -> evaluate -> sort -> select -> reproduce loop.
/// Crossover and mutation are not elitism-preserving, so the population's
/// top gene can regress between generations (noisy re-evaluation of an
/// unchanged survivor can also score it lower than before); the best gene
/// seen across all generations is therefore tracked explicitly rather than
/// read off the final population. Returns its scratch store (the base store
/// overwritten with its `m_psi`/`m_v`/`m_phi` values) and the quality it
/// scored.
pub fn run(schema: &Schema, base_store: &DataStore, config: GaConfig) -> MeshResult<GaOutcome> {
    let row = RowIndex::new(schema, &FRACTION_VAR_ORDER)?;

    let mut population = generate(config.population_size, &row, schema)?;
    evaluate_all(&mut population, schema, &row, base_store, config.run_config)?;
    sort(&mut population);

    let mut best = population
        .last()
        .cloned()
        .ok_or_else(|| mesh_err!(InvariantBroken: "GA population is empty"))?;
    info!(best = gene_quality(&best), "GA initial population evaluated");

    for generation in 0..config.generations {
        population = select(population, &row, schema, config.mutation_strength)?;
        evaluate_all(&mut population, schema, &row, base_store, config.run_config)?;
        sort(&mut population);

        let gen_best = population
            .last()
            .ok_or_else(|| mesh_err!(InvariantBroken: "GA population is empty"))?;
        if gene_quality(gen_best) > gene_quality(&best) {
            best = gen_best.clone();
        }
        debug!(generation, gen_best = gene_quality(gen_best), best = gene_quality(&best), "GA generation complete");
    }

    let quality = gene_quality(&best);
    let store = best
        .store
        .ok_or_else(|| mesh_err!(InvariantBroken: "winning gene has no evaluated store"))?;

    Ok(GaOutcome { store, quality })
}
