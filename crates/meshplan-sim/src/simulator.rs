//! The discrete-event simulator. A global clock advances by `dt` per step;
//! the current structural-stability interval is whichever `l` the clock
//! currently falls inside. Each step runs generators, then a (optionally
//! shuffled) pass of transfer/store/process ops, then teardown for
//! transfer/store, then drops.

use std::collections::HashMap;

use meshplan_core::schema::{VAR_ARRIVAL, VAR_DROP, VAR_PROCESS, VAR_STORE, VAR_TRANSFER};
use meshplan_core::{Container, DataStore, Schema, Trace};
use meshplan_error::{MeshResult, mesh_bail};
use tracing::debug;

use crate::operation::{ContainerKey2, ContainerKey3, Operation, OperationKind};

/// Run-configuration flags, passed into the constructor rather than held as
/// module-level globals; this keeps the simulator testable and removes
/// order-of-initialization hazards across test runs.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub use_noise: bool,
    pub shuffle_ops: bool,
    pub dt: f64,
    pub alpha_0: f64,
    pub alpha_1: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            use_noise: true,
            shuffle_ops: true,
            dt: 1.0,
            alpha_0: 0.5,
            alpha_1: 0.5,
        }
    }
}

fn debit_checked(container: &mut Container, amount: f64) -> MeshResult<()> {
    if container.amount - amount < -1e-6 {
        mesh_bail!(InvariantBroken: "container underflow: {} - {} < 0", container.amount, amount);
    }
    container.debit(amount);
    Ok(())
}

fn noise(use_noise: bool, scale: f64) -> f64 {
    if !use_noise || scale <= 0.0 {
        return 0.0;
    }
    meshplan_core::random::gaussian(0.0, scale / 4.0)
}

/// `remaining.min(input_amount)`, clamped to `[lower, upper] * dt`, then
/// clamped a second time to `[-stash, input_amount]` so an op can never
/// refund more than it has already accumulated.
fn clamp_delta(remaining: f64, input_amount: f64, stash: f64, lower: f64, upper: f64, dt: f64) -> f64 {
    let res = remaining.min(input_amount);
    let res = res.clamp(lower * dt, upper * dt);
    res.clamp(-stash, input_amount)
}

pub struct Simulator<'a> {
    schema: &'a Schema,
    store: &'a DataStore,
    config: RunConfig,
    tl: Vec<f64>,
    input_containers: HashMap<ContainerKey3, Container>,
    memory_containers: HashMap<ContainerKey2, Container>,
    ops: Vec<Operation>,
    trace: Option<Trace>,
}

impl<'a> Simulator<'a> {
    pub fn new(schema: &'a Schema, store: &'a DataStore, config: RunConfig) -> MeshResult<Self> {
        let l_bound = schema.get_index_bound("l")?;
        let mut tl = Vec::with_capacity(l_bound);
        for l in 0..l_bound {
            tl.push(store.get("tl", &[l as i64])?);
        }

        let mut input_containers = HashMap::new();
        for indices in schema.radix_map_iter(&["j", "rho", "l"])? {
            input_containers.insert((indices[0], indices[1], indices[2]), Container::default());
        }

        let mut memory_containers = HashMap::new();
        for indices in schema.radix_map_iter(&["j", "rho"])? {
            memory_containers.insert((indices[0], indices[1]), Container::default());
        }

        let ops = Self::build_ops(schema, store)?;

        Ok(Simulator {
            schema,
            store,
            config,
            tl,
            input_containers,
            memory_containers,
            ops,
            trace: None,
        })
    }

    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Trace::new());
        self
    }

    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    pub fn store(&self) -> &DataStore {
        self.store
    }

    fn build_ops(schema: &Schema, store: &DataStore) -> MeshResult<Vec<Operation>> {
        let mut ops = Vec::new();

        for indices in schema.radix_map_iter_var(VAR_ARRIVAL)? {
            let (j, rho, l) = (indices["j"], indices["rho"], indices["l"]);
            let plain = [j as i64, rho as i64, l as i64];
            let planned = store.get_zeroing(VAR_ARRIVAL, &plain);
            ops.push(Operation {
                kind: OperationKind::Generate { output: (j, rho, l) },
                j,
                i: None,
                rho,
                l,
                planned,
                capacity: 0.0,
                fraction: 0.0,
                input: (j, rho, l),
                processed: 0.0,
                staged: 0.0,
            });
        }

        for indices in schema.radix_map_iter_var(VAR_TRANSFER)? {
            let (j, i, rho, l) = (indices["j"], indices["i"], indices["rho"], indices["l"]);
            if i == j {
                continue;
            }
            let plain = [j as i64, i as i64, rho as i64, l as i64];
            let planned = store.get_zeroing(VAR_TRANSFER, &plain);
            let capacity = store.get_zeroing("mm_psi", &[j as i64, i as i64, l as i64]);
            let fraction = store.get_zeroing("m_psi", &plain);
            ops.push(Operation {
                kind: OperationKind::Transfer { output: (i, rho, l) },
                j,
                i: Some(i),
                rho,
                l,
                planned,
                capacity,
                fraction,
                input: (j, rho, l),
                processed: 0.0,
                staged: 0.0,
            });
        }

        for indices in schema.radix_map_iter_var(VAR_STORE)? {
            let (j, rho, l) = (indices["j"], indices["rho"], indices["l"]);
            let plain = [j as i64, rho as i64, l as i64];
            let planned = store.get_zeroing(VAR_STORE, &plain);
            let capacity = store.get_zeroing("mm_v", &[j as i64, l as i64]);
            let fraction = store.get_zeroing("m_v", &plain);
            ops.push(Operation {
                kind: OperationKind::Store { memory: (j, rho) },
                j,
                i: None,
                rho,
                l,
                planned,
                capacity,
                fraction,
                input: (j, rho, l),
                processed: 0.0,
                staged: 0.0,
            });
        }

        for indices in schema.radix_map_iter_var(VAR_PROCESS)? {
            let (j, rho, l) = (indices["j"], indices["rho"], indices["l"]);
            let plain = [j as i64, rho as i64, l as i64];
            let planned = store.get_zeroing(VAR_PROCESS, &plain);
            let capacity = store.get_zeroing("mm_phi", &[j as i64, l as i64]);
            let fraction = store.get_zeroing("m_phi", &plain);
            ops.push(Operation {
                kind: OperationKind::Process,
                j,
                i: None,
                rho,
                l,
                planned,
                capacity,
                fraction,
                input: (j, rho, l),
                processed: 0.0,
                staged: 0.0,
            });
        }

        for indices in schema.radix_map_iter_var(VAR_DROP)? {
            let (j, rho, l) = (indices["j"], indices["rho"], indices["l"]);
            ops.push(Operation {
                kind: OperationKind::Drop,
                j,
                i: None,
                rho,
                l,
                planned: 0.0,
                capacity: 0.0,
                fraction: 0.0,
                input: (j, rho, l),
                processed: 0.0,
                staged: 0.0,
            });
        }

        Ok(ops)
    }

    pub fn duration(&self) -> f64 {
        self.tl.iter().sum()
    }

    /// The smallest `l` such that `t < Σ_{k≤l} tl[k]`; returns the final
    /// interval index once `t` reaches or exceeds the total duration.
    pub fn t_to_l(&self, t: f64) -> usize {
        let mut acc = 0.0;
        for (l, dur) in self.tl.iter().enumerate() {
            acc += dur;
            if t < acc {
                return l;
            }
        }
        self.tl.len().saturating_sub(1)
    }

    pub fn quality(&self) -> f64 {
        let processed: f64 = self
            .ops
            .iter()
            .filter(|op| matches!(op.kind, OperationKind::Process))
            .map(|op| op.processed)
            .sum();
        let dropped: f64 = self
            .ops
            .iter()
            .filter(|op| matches!(op.kind, OperationKind::Drop))
            .map(|op| op.processed)
            .sum();
        self.config.alpha_0 * processed - self.config.alpha_1 * dropped
    }

    pub fn run(&mut self) -> MeshResult<f64> {
        let duration = self.duration();
        let mut t = 0.0;

        while t < duration {
            let l = self.t_to_l(t);
            self.tick(t, l)?;
            t += self.config.dt;
        }

        Ok(self.quality())
    }

    fn tick(&mut self, t: f64, l: usize) -> MeshResult<()> {
        debug!(t, l, "tick");
        let dt = self.config.dt;

        let generator_idx: Vec<usize> = self
            .ops
            .iter()
            .enumerate()
            .filter(|(_, op)| op.l == l && matches!(op.kind, OperationKind::Generate { .. }))
            .map(|(i, _)| i)
            .collect();
        for idx in generator_idx {
            self.generate_tick(idx)?;
        }

        let mut payload_idx: Vec<usize> = self
            .ops
            .iter()
            .enumerate()
            .filter(|(_, op)| {
                op.l == l
                    && matches!(
                        op.kind,
                        OperationKind::Transfer { .. } | OperationKind::Store { .. } | OperationKind::Process
                    )
            })
            .map(|(i, _)| i)
            .collect();
        if self.config.shuffle_ops {
            meshplan_core::random::shuffle(&mut payload_idx);
        }
        for &idx in &payload_idx {
            self.payload_tick(idx, dt)?;
        }
        for &idx in &payload_idx {
            self.teardown(idx)?;
        }

        let drop_idx: Vec<usize> = self
            .ops
            .iter()
            .enumerate()
            .filter(|(_, op)| op.l == l && matches!(op.kind, OperationKind::Drop))
            .map(|(i, _)| i)
            .collect();
        for idx in drop_idx {
            self.drop_tick(idx)?;
        }

        if let Some(trace) = &mut self.trace {
            for op in &self.ops {
                if op.l == l {
                    let input_amount = self.input_containers[&op.input].amount;
                    trace.record(t, format!("{:?}@j{}rho{}l{}", op.kind, op.j, op.rho, op.l), input_amount, op.processed);
                }
            }
        }

        Ok(())
    }

    fn generate_tick(&mut self, idx: usize) -> MeshResult<()> {
        let op = &self.ops[idx];
        let tl_l = self.tl[op.l];
        if tl_l <= 0.0 {
            mesh_bail!(InvariantBroken: "tl[{}] must be positive", op.l);
        }
        let rate = op.planned / tl_l;
        let amount = (op.planned - op.processed).min(rate).max(0.0);
        let input = self.input_containers.get_mut(&op.input).unwrap();
        input.credit(amount);

        let op = &mut self.ops[idx];
        op.processed += amount;
        Ok(())
    }

    fn payload_tick(&mut self, idx: usize, dt: f64) -> MeshResult<()> {
        let op = &self.ops[idx];
        let input_amount = self.input_containers[&op.input].amount;

        match op.kind {
            OperationKind::Transfer { .. } => {
                let upper = op.capacity * op.fraction + noise(self.config.use_noise, op.capacity * op.fraction);
                let delta = clamp_delta(op.remaining(), input_amount, op.processed, 0.0, upper, dt);
                debit_checked(self.input_containers.get_mut(&op.input).unwrap(), delta)?;
                self.ops[idx].staged = delta;
            }
            OperationKind::Store { memory } => {
                let stash = self.memory_containers[&memory].amount;
                self.ops[idx].processed = stash;
                let op = &self.ops[idx];
                let base = op.capacity * op.fraction;
                let upper = base + noise(self.config.use_noise, base);
                let lower = -base - noise(self.config.use_noise, base);
                let delta = clamp_delta(op.remaining(), input_amount, stash, lower, upper, dt);
                if delta > 0.0 {
                    debit_checked(self.input_containers.get_mut(&op.input).unwrap(), delta)?;
                }
                self.ops[idx].staged = delta;
            }
            OperationKind::Process => {
                let upper = op.capacity * op.fraction + noise(self.config.use_noise, op.capacity * op.fraction);
                let delta = clamp_delta(op.remaining(), input_amount, op.processed, 0.0, upper, dt);
                debit_checked(self.input_containers.get_mut(&op.input).unwrap(), delta)?;
                self.ops[idx].processed += delta;
            }
            OperationKind::Drop | OperationKind::Generate { .. } => {
                mesh_bail!(InvariantBroken: "drop/generate ops are not part of the payload phase");
            }
        }

        Ok(())
    }

    fn teardown(&mut self, idx: usize) -> MeshResult<()> {
        let op = &self.ops[idx];
        match op.kind {
            OperationKind::Transfer { output } => {
                let delta = op.staged;
                self.input_containers.get_mut(&output).unwrap().credit(delta);
                self.ops[idx].processed += delta;
            }
            OperationKind::Store { memory } => {
                let delta = op.staged;
                let mem = self.memory_containers.get_mut(&memory).unwrap();
                if delta >= 0.0 {
                    mem.credit(delta);
                } else {
                    mem.debit(-delta);
                    self.input_containers.get_mut(&op.input).unwrap().credit(-delta);
                }
                let new_processed = self.memory_containers[&memory].amount;
                self.ops[idx].processed = new_processed;
            }
            _ => {}
        }
        Ok(())
    }

    fn drop_tick(&mut self, idx: usize) -> MeshResult<()> {
        let op = &self.ops[idx];
        let residual = self.input_containers[&op.input].amount;
        debit_checked(self.input_containers.get_mut(&op.input).unwrap(), residual)?;
        self.ops[idx].processed += residual;
        Ok(())
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshplan_core::schema::SchemaDef;
    use std::collections::BTreeMap;

    fn schema_two_node() -> Schema {
        let mut index_bound = BTreeMap::new();
        index_bound.insert("j".to_string(), 2);
        index_bound.insert("i".to_string(), 2);
        index_bound.insert("rho".to_string(), 1);
        index_bound.insert("l".to_string(), 1);

        let mut variable_indices = BTreeMap::new();
        variable_indices.insert("x".to_string(), vec!["j".into(), "i".into(), "rho".into(), "l".into()]);
        for v in ["y", "g", "z", "x_eq"] {
            variable_indices.insert(v.to_string(), vec!["j".into(), "rho".into(), "l".into()]);
        }

        Schema::from_def(SchemaDef { index_bound, variable_indices }).unwrap()
    }

    fn planned_store() -> DataStore {
        let mut store = DataStore::new();
        store.set("tl", &[0], 10.0);
        store.set("x_eq", &[0, 0, 0], 150.0);
        store.set("x", &[0, 1, 0, 0], 150.0);
        store.set("g", &[1, 0, 0], 150.0);
        store.set("mm_psi", &[0, 1, 0], 50.0);
        store.set("m_psi", &[0, 1, 0, 0], 1.0);
        store.set("mm_phi", &[1, 0], 50.0);
        store.set("m_phi", &[1, 0, 0], 1.0);
        store
    }

    fn deterministic_config() -> RunConfig {
        RunConfig {
            use_noise: false,
            shuffle_ops: false,
            dt: 1.0,
            alpha_0: 1.0,
            alpha_1: 0.0,
        }
    }

    #[test]
    fn t_to_l_returns_final_interval_past_duration() {
        let schema = schema_two_node();
        let store = planned_store();
        let sim = Simulator::new(&schema, &store, deterministic_config()).unwrap();
        assert_eq!(sim.t_to_l(0.0), 0);
        assert_eq!(sim.t_to_l(9.9), 0);
        assert_eq!(sim.t_to_l(10.0), 0);
        assert_eq!(sim.t_to_l(1000.0), 0);
    }

    #[test]
    fn deterministic_runs_produce_identical_quality() {
        let schema = schema_two_node();
        let store = planned_store();

        let mut sim_a = Simulator::new(&schema, &store, deterministic_config()).unwrap();
        let q_a = sim_a.run().unwrap();

        let mut sim_b = Simulator::new(&schema, &store, deterministic_config()).unwrap();
        let q_b = sim_b.run().unwrap();

        assert_eq!(q_a, q_b);
    }

    #[test]
    fn quality_with_alpha0_one_equals_total_processed() {
        let schema = schema_two_node();
        let store = planned_store();
        let mut sim = Simulator::new(&schema, &store, deterministic_config()).unwrap();
        let quality = sim.run().unwrap();

        let processed: f64 = sim
            .ops()
            .iter()
            .filter(|op| matches!(op.kind, OperationKind::Process))
            .map(|op| op.processed)
            .sum();
        assert!((quality - processed).abs() < 1e-9);
    }

    fn schema_one_node_two_intervals() -> Schema {
        let mut index_bound = BTreeMap::new();
        index_bound.insert("j".to_string(), 1);
        index_bound.insert("i".to_string(), 1);
        index_bound.insert("rho".to_string(), 1);
        index_bound.insert("l".to_string(), 2);

        let mut variable_indices = BTreeMap::new();
        variable_indices.insert("x".to_string(), vec!["j".into(), "i".into(), "rho".into(), "l".into()]);
        for v in ["y", "g", "z", "x_eq"] {
            variable_indices.insert(v.to_string(), vec!["j".into(), "rho".into(), "l".into()]);
        }

        Schema::from_def(SchemaDef { index_bound, variable_indices }).unwrap()
    }

    /// Generates 100 in interval 0, planned store 40 in interval 0 and 30 in
    /// interval 1: the carried-over stash (40) already exceeds interval 1's
    /// planned total (30), so a correct `remaining()` goes negative on the
    /// first tick of interval 1 and withdraws the excess back to the input
    /// container, landing the store op's processed amount at 30. Interval 1
    /// is a single tick long, so if `processed` is stale (still 0 from
    /// `build_ops`) on that tick, `remaining()` reads as +30 instead, no
    /// input is available to cap it to, no withdrawal happens, and there is
    /// no later tick in the interval for the teardown resync to correct it -
    /// the op sticks at 40.
    #[test]
    fn store_processed_resyncs_from_memory_across_intervals() {
        let schema = schema_one_node_two_intervals();
        let mut store = DataStore::new();
        store.set("tl", &[0], 5.0);
        store.set("tl", &[1], 1.0);
        store.set("x_eq", &[0, 0, 0], 100.0);
        store.set("y", &[0, 0, 0], 40.0);
        store.set("y", &[0, 0, 1], 30.0);
        store.set("mm_v", &[0, 0], 1000.0);
        store.set("mm_v", &[0, 1], 1000.0);
        store.set("m_v", &[0, 0, 0], 1.0);
        store.set("m_v", &[0, 0, 1], 1.0);

        let mut sim = Simulator::new(&schema, &store, deterministic_config()).unwrap();
        sim.run().unwrap();

        let interval_1_store = sim
            .ops()
            .iter()
            .find(|op| op.l == 1 && matches!(op.kind, OperationKind::Store { .. }))
            .unwrap();
        assert!(
            (interval_1_store.processed - 30.0).abs() < 1e-9,
            "expected the excess stash carried from interval 0 to be withdrawn down to interval 1's planned total, got {}",
            interval_1_store.processed
        );
    }

    #[test]
    fn quality_with_alpha0_zero_equals_negative_dropped() {
        let schema = schema_two_node();
        let mut store = planned_store();
        store.set("mm_phi", &[1, 0], 0.0); // nothing can be processed, everything drops

        let config = RunConfig {
            alpha_0: 0.0,
            alpha_1: 1.0,
            ..deterministic_config()
        };
        let mut sim = Simulator::new(&schema, &store, config).unwrap();
        let quality = sim.run().unwrap();

        let dropped: f64 = sim
            .ops()
            .iter()
            .filter(|op| matches!(op.kind, OperationKind::Drop))
            .map(|op| op.processed)
            .sum();
        assert!((quality - (-dropped)).abs() < 1e-9);
    }
}
