//! Builds the flow-balance equality system, the per-variable capacity
//! bounds, and the processed-minus-dropped objective, then invokes a linear
//! programming solver and writes the result back into the data store.
//!
//! The LP variables are `y`, `x`, `z`, `g`, in that order - this ordering is
//! part of the contract because it defines the linear vector layout that
//! [`meshplan_core::RowIndex`] assigns positions against.

use std::collections::HashMap;

use good_lp::solvers::microlp::microlp;
use good_lp::{Expression, Solution, SolverModel, Variable, constraint, variable, variables};
use thiserror::Error;
use tracing::{debug, info, warn};

use meshplan_core::schema::{VAR_ARRIVAL, VAR_DROP, VAR_PROCESS, VAR_STORE, VAR_TRANSFER};
use meshplan_core::{DataStore, RowIndex, Schema};
use meshplan_error::{MeshError, MeshResult, mesh_bail};

const LP_VAR_ORDER: [&str; 4] = [VAR_STORE, VAR_TRANSFER, VAR_DROP, VAR_PROCESS];

fn capacity_var(v: &str) -> &'static str {
    match v {
        VAR_TRANSFER => "psi",
        VAR_STORE => "v_mem",
        VAR_PROCESS => "phi",
        _ => unreachable!("capacity only defined for x, y, g"),
    }
}

#[derive(Debug, Error)]
enum SolveError {
    #[error("solver resolution failed: {0}")]
    Resolution(#[from] good_lp::ResolutionError),
}

impl From<SolveError> for MeshError {
    fn from(e: SolveError) -> Self {
        meshplan_error::mesh_err!(InfeasibleOrUnbounded: "{}", e)
    }
}

struct DecisionVariables {
    row: RowIndex,
    vars: Vec<Variable>,
    /// `(variable name, plain integer indices)` aligned with `vars`, used to
    /// write the solution back into the data store.
    entries: Vec<(String, Vec<i64>)>,
}

impl DecisionVariables {
    fn get(&self, v: &str, indices: &HashMap<String, usize>) -> MeshResult<Variable> {
        let pos = self.row.get_pos(v, indices)?;
        Ok(self.vars[pos])
    }
}

fn validate(schema: &Schema, store: &DataStore) -> MeshResult<()> {
    let j = schema.get_index_bound("j")?;
    let i = schema.get_index_bound("i")?;
    if j != i {
        mesh_bail!(SchemaViolation: "node index pair must be square: |j|={} != |i|={}", j, i);
    }
    if schema.get_var_indices(VAR_TRANSFER)? != ["j", "i", "rho", "l"] {
        mesh_bail!(SchemaViolation: "x must be indexed by [j,i,rho,l]");
    }
    for v in [VAR_STORE, VAR_PROCESS, VAR_DROP, VAR_ARRIVAL] {
        if schema.get_var_indices(v)? != ["j", "rho", "l"] {
            mesh_bail!(SchemaViolation: "{} must be indexed by [j,rho,l]", v);
        }
    }

    let alpha_0 = store.get_zeroing("alpha_0", &[]);
    let alpha_1 = store.get_zeroing("alpha_1", &[]);
    if (alpha_0 + alpha_1 - 1.0).abs() > 1e-9 {
        mesh_bail!(InvariantBroken: "alpha_0 + alpha_1 must equal 1, got {} + {} = {}", alpha_0, alpha_1, alpha_0 + alpha_1);
    }
    if alpha_0 == 0.0 || alpha_1 == 0.0 {
        mesh_bail!(InvariantBroken: "alpha_0 and alpha_1 must both be non-zero");
    }

    Ok(())
}

fn build_decision_variables(
    vars: &mut good_lp::ProblemVariables,
    schema: &Schema,
    store: &DataStore,
) -> MeshResult<DecisionVariables> {
    let row = RowIndex::new(schema, &LP_VAR_ORDER)?;
    let mut good_lp_vars = Vec::with_capacity(row.row_len());
    let mut entries = Vec::with_capacity(row.row_len());

    for &v in &LP_VAR_ORDER {
        for indices in schema.radix_map_iter_var(v)? {
            let order = schema.get_var_indices(v)?;
            let plain: Vec<i64> = order.iter().map(|k| indices[k] as i64).collect();

            let upper = if v == VAR_DROP {
                f64::INFINITY
            } else {
                let cap_indices: Vec<i64> = plain.clone();
                store.get_zeroing(capacity_var(v), &cap_indices)
            };

            let var = vars.add(
                variable()
                    .min(0.0)
                    .max(upper)
                    .name(format!("{v}_{plain:?}")),
            );
            good_lp_vars.push(var);
            entries.push((v.to_string(), plain));
        }
    }

    Ok(DecisionVariables {
        row,
        vars: good_lp_vars,
        entries,
    })
}

fn build_objective(schema: &Schema, store: &DataStore, dv: &DecisionVariables) -> MeshResult<Expression> {
    let alpha_0 = store.get_zeroing("alpha_0", &[]);
    let alpha_1 = store.get_zeroing("alpha_1", &[]);

    let mut objective = Expression::from(0.0);
    for indices in schema.radix_map_iter_var(VAR_PROCESS)? {
        objective += dv.get(VAR_PROCESS, &indices)? * -alpha_0;
    }
    for indices in schema.radix_map_iter_var(VAR_DROP)? {
        objective += dv.get(VAR_DROP, &indices)? * alpha_1;
    }

    Ok(objective)
}

fn extract_solution(
    solution: &impl Solution,
    dv: &DecisionVariables,
    store: &mut DataStore,
) -> MeshResult<()> {
    for ((name, indices), &var) in dv.entries.iter().zip(dv.vars.iter()) {
        store.set(name, indices, solution.value(var));
    }
    Ok(())
}

/// Solves the flow-balance LP for the current contents of `store` and
/// writes planned amounts for `y`, `x`, `z`, `g` back into it.
pub fn solve(schema: &Schema, store: &mut DataStore) -> MeshResult<()> {
    info!("starting LP solve");
    validate(schema, store)?;

    let mut vars = variables!();
    let dv = build_decision_variables(&mut vars, schema, store)?;
    debug!(variables = dv.vars.len(), "built decision variables");

    let objective = build_objective(schema, store, &dv)?;
    let mut problem = vars.minimise(objective).using(microlp);

    let j_bound = schema.get_index_bound("j")?;
    for indices in schema.radix_map_iter_var(VAR_ARRIVAL)? {
        let j = indices["j"];
        let rho = indices["rho"];
        let l = indices["l"];

        let mut expr: Expression = dv.get(VAR_PROCESS, &indices)?.into();
        expr += dv.get(VAR_STORE, &indices)?;
        expr += dv.get(VAR_DROP, &indices)?;

        if l > 0 {
            let mut prev = indices.clone();
            prev.insert("l".to_string(), l - 1);
            expr -= dv.get(VAR_STORE, &prev)?;
        }

        for i in 0..j_bound {
            if i == j {
                continue;
            }
            let mut out_idx = HashMap::new();
            out_idx.insert("j".to_string(), j);
            out_idx.insert("i".to_string(), i);
            out_idx.insert("rho".to_string(), rho);
            out_idx.insert("l".to_string(), l);
            expr += dv.get(VAR_TRANSFER, &out_idx)?;

            let mut in_idx = HashMap::new();
            in_idx.insert("j".to_string(), i);
            in_idx.insert("i".to_string(), j);
            in_idx.insert("rho".to_string(), rho);
            in_idx.insert("l".to_string(), l);
            expr -= dv.get(VAR_TRANSFER, &in_idx)?;
        }

        let plain: Vec<i64> = schema
            .get_var_indices(VAR_ARRIVAL)?
            .iter()
            .map(|k| indices[k] as i64)
            .collect();
        let x_eq = store.get_zeroing(VAR_ARRIVAL, &plain);
        problem = problem.with(constraint!(expr == x_eq));
    }

    debug!("solving LP");
    let solution = problem.solve().map_err(SolveError::from)?;
    info!("LP solve complete");

    extract_solution(&solution, &dv, store)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshplan_core::schema::SchemaDef;
    use std::collections::BTreeMap;

    fn schema_one_load_one_interval(nodes: usize) -> Schema {
        let mut index_bound = BTreeMap::new();
        index_bound.insert("j".to_string(), nodes);
        index_bound.insert("i".to_string(), nodes);
        index_bound.insert("rho".to_string(), 1);
        index_bound.insert("l".to_string(), 1);

        let mut variable_indices = BTreeMap::new();
        variable_indices.insert(
            "x".to_string(),
            vec!["j".into(), "i".into(), "rho".into(), "l".into()],
        );
        for v in ["y", "g", "z", "x_eq"] {
            variable_indices.insert(v.to_string(), vec!["j".into(), "rho".into(), "l".into()]);
        }

        Schema::from_def(SchemaDef {
            index_bound,
            variable_indices,
        })
        .unwrap()
    }

    fn schema_two_intervals() -> Schema {
        let mut index_bound = BTreeMap::new();
        index_bound.insert("j".to_string(), 1);
        index_bound.insert("i".to_string(), 1);
        index_bound.insert("rho".to_string(), 1);
        index_bound.insert("l".to_string(), 2);

        let mut variable_indices = BTreeMap::new();
        variable_indices.insert(
            "x".to_string(),
            vec!["j".into(), "i".into(), "rho".into(), "l".into()],
        );
        for v in ["y", "g", "z", "x_eq"] {
            variable_indices.insert(v.to_string(), vec!["j".into(), "rho".into(), "l".into()]);
        }

        Schema::from_def(SchemaDef {
            index_bound,
            variable_indices,
        })
        .unwrap()
    }

    fn with_alphas(mut store: DataStore, a0: f64, a1: f64) -> DataStore {
        store.set("alpha_0", &[], a0);
        store.set("alpha_1", &[], a1);
        store
    }

    #[test]
    fn rejects_alpha_not_summing_to_one() {
        let schema = schema_one_load_one_interval(2);
        let mut store = with_alphas(DataStore::new(), 0.5, 0.6);
        assert!(solve(&schema, &mut store).is_err());
    }

    #[test]
    fn s1_two_node_transfer() {
        let schema = schema_one_load_one_interval(2);
        let mut store = with_alphas(DataStore::new(), 0.5, 0.5);
        store.set("phi", &[0, 0, 0], 0.0);
        store.set("phi", &[1, 0, 0], 200.0);
        store.set("psi", &[0, 1, 0, 0], 300.0);
        store.set("psi", &[1, 0, 0, 0], 0.0);
        store.set("x_eq", &[0, 0, 0], 150.0);

        solve(&schema, &mut store).unwrap();

        assert!((store.get("x", &[0, 1, 0, 0]).unwrap() - 150.0).abs() < 1e-3);
        assert!((store.get("g", &[1, 0, 0]).unwrap() - 150.0).abs() < 1e-3);
        assert!((store.get("g", &[0, 0, 0]).unwrap() - 0.0).abs() < 1e-3);
        assert!((store.get("z", &[0, 0, 0]).unwrap() - 0.0).abs() < 1e-3);
    }

    #[test]
    fn s2_capped_processing_drops_excess() {
        let schema = schema_one_load_one_interval(2);
        let mut store = with_alphas(DataStore::new(), 0.5, 0.5);
        store.set("phi", &[0, 0, 0], 0.0);
        store.set("phi", &[1, 0, 0], 50.0);
        store.set("psi", &[0, 1, 0, 0], 300.0);
        store.set("psi", &[1, 0, 0, 0], 0.0);
        store.set("x_eq", &[0, 0, 0], 200.0);

        solve(&schema, &mut store).unwrap();

        assert!((store.get("g", &[1, 0, 0]).unwrap() - 50.0).abs() < 1e-3);
        let dropped = store.get("z", &[0, 0, 0]).unwrap() + store.get("z", &[1, 0, 0]).unwrap();
        assert!((dropped - 150.0).abs() < 1e-3);
    }

    #[test]
    fn s3_storage_carryover_across_intervals() {
        let schema = schema_two_intervals();
        let mut store = with_alphas(DataStore::new(), 0.5, 0.5);
        store.set("phi", &[0, 0, 0], 40.0);
        store.set("phi", &[0, 0, 1], 80.0);
        store.set("v_mem", &[0, 0, 0], 100.0);
        store.set("v_mem", &[0, 0, 1], 100.0);
        store.set("x_eq", &[0, 0, 0], 100.0);
        store.set("x_eq", &[0, 0, 1], 0.0);

        solve(&schema, &mut store).unwrap();

        assert!((store.get("g", &[0, 0, 0]).unwrap() - 40.0).abs() < 1e-3);
        assert!((store.get("y", &[0, 0, 0]).unwrap() - 60.0).abs() < 1e-3);
        assert!((store.get("g", &[0, 0, 1]).unwrap() - 60.0).abs() < 1e-3);
        assert!((store.get("y", &[0, 0, 1]).unwrap() - 0.0).abs() < 1e-3);
    }
}
