//! Population-level operations: generate, evaluate, sort, select, reproduce.
//! These are free functions over `Vec<Gene>` rather than methods on a
//! `Population` type, matching the granularity the LP and simulator modules
//! already use for their own data-flow.

use meshplan_core::{DataStore, RowIndex, Schema};
use meshplan_error::{MeshResult, mesh_err};
use meshplan_sim::{RunConfig, Simulator};

use crate::gene::{FRACTION_VAR_ORDER, Gene, cross_random_fraction, random_mutate};

pub fn generate(n: usize, row: &RowIndex, schema: &Schema) -> MeshResult<Vec<Gene>> {
    (0..n).map(|_| Gene::random(row, schema)).collect()
}

/// Writes a gene's fraction values into a scratch copy of the base store,
/// runs the simulator against it, and records the resulting quality and the
/// scratch store the gene was scored against.
pub fn evaluate_all(
    population: &mut [Gene],
    schema: &Schema,
    row: &RowIndex,
    base_store: &DataStore,
    run_config: RunConfig,
) -> MeshResult<()> {
    for gene in population.iter_mut() {
        let mut scratch = base_store.scratch_copy();
        write_gene(gene, row, schema, &mut scratch)?;

        let quality = {
            let mut sim = Simulator::new(schema, &scratch, run_config)?;
            sim.run()?
        };

        gene.quality = Some(quality);
        gene.store = Some(scratch);
    }
    Ok(())
}

fn write_gene(gene: &Gene, row: &RowIndex, schema: &Schema, store: &mut DataStore) -> MeshResult<()> {
    for &v in &FRACTION_VAR_ORDER {
        let order = schema.get_var_indices(v)?;
        for indices in schema.radix_map_iter_var(v)? {
            let pos = row.get_pos(v, &indices)?;
            let plain: Vec<i64> = order
                .iter()
                .map(|k| indices[k] as i64)
                .collect();
            store.set(v, &plain, gene.values[pos]);
        }
    }
    Ok(())
}

/// Ascending by quality; a gene not yet evaluated sorts as if it scored
/// `-infinity`.
pub fn sort(population: &mut [Gene]) {
    population.sort_by(|a, b| {
        let qa = a.quality.unwrap_or(f64::NEG_INFINITY);
        let qb = b.quality.unwrap_or(f64::NEG_INFINITY);
        qa.total_cmp(&qb)
    });
}

/// Retains the top (highest-quality) half of an ascending-sorted population
/// as survivors, then replenishes the rest via crossover and mutation of
/// randomly chosen survivor pairs, back up to the original size.
pub fn select(
    population: Vec<Gene>,
    row: &RowIndex,
    schema: &Schema,
    mutation_strength: f64,
) -> MeshResult<Vec<Gene>> {
    let target = population.len();
    if target == 0 {
        return Ok(population);
    }

    let keep = (target / 2).max(1);
    let mut survivors: Vec<Gene> = population.into_iter().rev().take(keep).collect();

    while survivors.len() < target {
        let a = meshplan_core::random::choose(&survivors)
            .ok_or_else(|| mesh_err!(InvariantBroken: "empty survivor pool"))?
            .clone();
        let b = meshplan_core::random::choose(&survivors)
            .ok_or_else(|| mesh_err!(InvariantBroken: "empty survivor pool"))?
            .clone();

        let (mut child_a, mut child_b) = cross_random_fraction(&a, &b, row, schema)?;
        random_mutate(&mut child_a, row, schema, mutation_strength)?;
        survivors.push(child_a);

        if survivors.len() < target {
            random_mutate(&mut child_b, row, schema, mutation_strength)?;
            survivors.push(child_b);
        }
    }

    Ok(survivors)
}
