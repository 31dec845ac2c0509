//! A gene is the concatenation of the three intensity-fraction segments
//! (`m_psi`, `m_v`, `m_phi`), laid out in the same dense row-index order the
//! LP uses for its decision variables, so a gene can be read and written
//! through the same [`RowIndex`] machinery.

use std::collections::HashMap;

use meshplan_core::{DataStore, RowIndex, Schema, random};
use meshplan_error::MeshResult;

pub const FRACTION_VAR_ORDER: [&str; 3] = ["m_psi", "m_v", "m_phi"];

#[derive(Debug, Clone)]
pub struct Gene {
    pub values: Vec<f64>,
    pub quality: Option<f64>,
    /// The scratch store this gene was last evaluated against, populated by
    /// [`crate::evaluate_all`].
    pub store: Option<DataStore>,
}

impl Gene {
    pub fn random(row: &RowIndex, schema: &Schema) -> MeshResult<Self> {
        let mut values = vec![0.0; row.row_len()];
        for &v in &FRACTION_VAR_ORDER {
            for indices in schema.radix_map_iter_var(v)? {
                let pos = row.get_pos(v, &indices)?;
                values[pos] = random::range_f64(0.0..1.0);
            }
        }
        normalize(&mut values, row, schema)?;
        Ok(Gene {
            values,
            quality: None,
            store: None,
        })
    }
}

/// Renormalizes every slice of every fraction variable so that, for fixed
/// non-`rho` indices, the cells varying only `rho` sum to 1. A slice that
/// summed to (near) zero is reset to a uniform split rather than left as
/// all-zero, since an all-zero share is not a valid allocation.
pub fn normalize(values: &mut [f64], row: &RowIndex, schema: &Schema) -> MeshResult<()> {
    for &v in &FRACTION_VAR_ORDER {
        let mut slices: HashMap<Vec<(String, usize)>, Vec<usize>> = HashMap::new();
        for indices in schema.radix_map_iter_var(v)? {
            let pos = row.get_pos(v, &indices)?;
            let mut key: Vec<(String, usize)> = indices
                .iter()
                .filter(|(k, _)| k.as_str() != "rho")
                .map(|(k, i)| (k.clone(), *i))
                .collect();
            key.sort();
            slices.entry(key).or_default().push(pos);
        }

        for positions in slices.values() {
            let sum: f64 = positions.iter().map(|&p| values[p]).sum();
            if sum > 1e-12 {
                for &p in positions {
                    values[p] /= sum;
                }
            } else {
                let uniform = 1.0 / positions.len() as f64;
                for &p in positions {
                    values[p] = uniform;
                }
            }
        }
    }
    Ok(())
}

/// Swaps a random contiguous sub-slice of each fraction segment between two
/// parents, producing two children, then renormalizes both.
pub fn cross_random_fraction(a: &Gene, b: &Gene, row: &RowIndex, schema: &Schema) -> MeshResult<(Gene, Gene)> {
    let mut child_a = a.values.clone();
    let mut child_b = b.values.clone();

    for &v in &FRACTION_VAR_ORDER {
        let start = row.var_offset(v)?;
        let len = row.var_size(v)?;
        if len < 2 {
            continue;
        }
        let p = random::range(0..len);
        let q = random::range(0..len);
        let (lo, hi) = (p.min(q), p.max(q) + 1);
        child_a[start + lo..start + hi].swap_with_slice(&mut child_b[start + lo..start + hi]);
    }

    normalize(&mut child_a, row, schema)?;
    normalize(&mut child_b, row, schema)?;

    Ok((
        Gene {
            values: child_a,
            quality: None,
            store: None,
        },
        Gene {
            values: child_b,
            quality: None,
            store: None,
        },
    ))
}

/// Perturbs one random cell by a uniform fraction of its current value,
/// clamps to `[0,1]`, and renormalizes.
pub fn random_mutate(gene: &mut Gene, row: &RowIndex, schema: &Schema, strength: f64) -> MeshResult<()> {
    if gene.values.is_empty() {
        return Ok(());
    }
    let pos = random::range(0..gene.values.len());
    let delta = gene.values[pos] * strength * random::range_f64(-1.0..1.0);
    gene.values[pos] = (gene.values[pos] + delta).clamp(0.0, 1.0);
    gene.quality = None;
    normalize(&mut gene.values, row, schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshplan_core::schema::SchemaDef;
    use std::collections::BTreeMap;

    fn schema() -> Schema {
        let mut index_bound = BTreeMap::new();
        index_bound.insert("j".to_string(), 2);
        index_bound.insert("i".to_string(), 2);
        index_bound.insert("rho".to_string(), 3);
        index_bound.insert("l".to_string(), 1);

        let mut variable_indices = BTreeMap::new();
        variable_indices.insert("m_psi".to_string(), vec!["j".into(), "i".into(), "rho".into(), "l".into()]);
        variable_indices.insert("m_v".to_string(), vec!["j".into(), "rho".into(), "l".into()]);
        variable_indices.insert("m_phi".to_string(), vec!["j".into(), "rho".into(), "l".into()]);

        Schema::from_def(SchemaDef { index_bound, variable_indices }).unwrap()
    }

    fn slice_sums(values: &[f64], row: &RowIndex, schema: &Schema) -> Vec<f64> {
        let mut sums = Vec::new();
        for &v in &FRACTION_VAR_ORDER {
            let mut seen: HashMap<Vec<(String, usize)>, f64> = HashMap::new();
            for indices in schema.radix_map_iter_var(v).unwrap() {
                let pos = row.get_pos(v, &indices).unwrap();
                let mut key: Vec<(String, usize)> = indices
                    .iter()
                    .filter(|(k, _)| k.as_str() != "rho")
                    .map(|(k, i)| (k.clone(), *i))
                    .collect();
                key.sort();
                *seen.entry(key).or_default() += values[pos];
            }
            sums.extend(seen.values().copied());
        }
        sums
    }

    #[test]
    fn random_gene_is_normalized() {
        let schema = schema();
        let row = RowIndex::new(&schema, &FRACTION_VAR_ORDER).unwrap();
        let gene = Gene::random(&row, &schema).unwrap();
        for sum in slice_sums(&gene.values, &row, &schema) {
            assert!((sum - 1.0).abs() < 1e-9, "slice sum was {sum}");
        }
    }

    #[test]
    fn crossover_and_mutation_preserve_normalization() {
        let schema = schema();
        let row = RowIndex::new(&schema, &FRACTION_VAR_ORDER).unwrap();
        let a = Gene::random(&row, &schema).unwrap();
        let b = Gene::random(&row, &schema).unwrap();

        let (mut child_a, mut child_b) = cross_random_fraction(&a, &b, &row, &schema).unwrap();
        for sum in slice_sums(&child_a.values, &row, &schema) {
            assert!((sum - 1.0).abs() < 1e-4);
        }
        for sum in slice_sums(&child_b.values, &row, &schema) {
            assert!((sum - 1.0).abs() < 1e-4);
        }

        random_mutate(&mut child_a, &row, &schema, 0.3).unwrap();
        random_mutate(&mut child_b, &row, &schema, 0.3).unwrap();
        for sum in slice_sums(&child_a.values, &row, &schema) {
            assert!((sum - 1.0).abs() < 1e-4);
        }
    }
}
