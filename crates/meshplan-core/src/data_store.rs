//! A keyed map from `(variableName, index1, ..., indexN) -> float`.
//!
//! [`DataStore`] is the base, non-defaulting path: a missing key is a
//! `NoData` error. [`DefaultingStore`] wraps it to return a per-variable
//! default (globally `0.0` unless overridden, with mandatory variables
//! still propagating the error). Callers needing the zeroing access path
//! used by the LP planner and simulator call [`DataStore::get_zeroing`]
//! directly - that distinction is deliberate: LP capacity absence means
//! "pinned to zero", but schema-domain absence is a bug, so the two paths
//! are never collapsed into one tolerant getter.

use std::collections::{HashMap, HashSet};

use meshplan_error::{MeshResult, mesh_err};

pub type IndexKey = (String, Vec<i64>);

#[derive(Debug, Clone, Default)]
pub struct DataStore {
    values: HashMap<IndexKey, f64>,
}

impl DataStore {
    pub fn new() -> Self {
        DataStore {
            values: HashMap::new(),
        }
    }

    fn key(var: &str, indices: &[i64]) -> IndexKey {
        (var.to_string(), indices.to_vec())
    }

    pub fn get(&self, var: &str, indices: &[i64]) -> MeshResult<f64> {
        self.values
            .get(&Self::key(var, indices))
            .copied()
            .ok_or_else(|| mesh_err!(NoData: "no value for {}{:?}", var, indices))
    }

    pub fn set(&mut self, var: &str, indices: &[i64], value: f64) {
        self.values.insert(Self::key(var, indices), value);
    }

    /// Returns `0.0` for any absent key instead of erroring.
    pub fn get_zeroing(&self, var: &str, indices: &[i64]) -> f64 {
        self.get(var, indices).unwrap_or(0.0)
    }

    pub fn contains(&self, var: &str, indices: &[i64]) -> bool {
        self.values.contains_key(&Self::key(var, indices))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[i64], f64)> {
        self.values
            .iter()
            .map(|((var, idx), value)| (var.as_str(), idx.as_slice(), *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A scratch copy for GA gene evaluation / LP planning; independent of
    /// the original afterwards.
    pub fn scratch_copy(&self) -> DataStore {
        self.clone()
    }

    /// Overwrites every entry present in `other`, leaving keys absent from
    /// `other` untouched. Used to merge a winning gene's scratch store back
    /// into the shared scratch, and to merge scratch into the persistent
    /// store at orchestrator exit.
    pub fn merge_from(&mut self, other: &DataStore) {
        for (var, idx, value) in other.iter() {
            self.set(var, idx, value);
        }
    }
}

/// Wraps a base store with per-variable defaults. Variables in `no_default`
/// still propagate `NoData` instead of being defaulted.
pub struct DefaultingStore<'a> {
    store: &'a DataStore,
    defaults: HashMap<String, f64>,
    no_default: HashSet<String>,
}

impl<'a> DefaultingStore<'a> {
    pub fn new(store: &'a DataStore) -> Self {
        DefaultingStore {
            store,
            defaults: HashMap::new(),
            no_default: HashSet::new(),
        }
    }

    pub fn with_default(mut self, var: impl Into<String>, value: f64) -> Self {
        self.defaults.insert(var.into(), value);
        self
    }

    pub fn require(mut self, var: impl Into<String>) -> Self {
        self.no_default.insert(var.into());
        self
    }

    pub fn get(&self, var: &str, indices: &[i64]) -> MeshResult<f64> {
        match self.store.get(var, indices) {
            Ok(v) => Ok(v),
            Err(e) if !self.no_default.contains(var) && e.code() == meshplan_error::ErrorCode::NoData => {
                Ok(self.defaults.get(var).copied().unwrap_or(0.0))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_get_is_strict() {
        let store = DataStore::new();
        assert!(store.get("phi", &[0]).is_err());
    }

    #[test]
    fn zeroing_defaults_to_zero() {
        let store = DataStore::new();
        assert_eq!(store.get_zeroing("psi", &[0, 1]), 0.0);
    }

    #[test]
    fn defaulting_wrapper_uses_override_and_respects_required() {
        let mut store = DataStore::new();
        store.set("alpha_0", &[], 0.6);
        let view = DefaultingStore::new(&store)
            .with_default("alpha_1", 0.4)
            .require("x_eq");

        assert_eq!(view.get("alpha_0", &[]).unwrap(), 0.6);
        assert_eq!(view.get("alpha_1", &[]).unwrap(), 0.4);
        assert!(view.get("x_eq", &[0, 0, 0]).is_err());
    }

    #[test]
    fn merge_from_overwrites_only_present_keys() {
        let mut base = DataStore::new();
        base.set("x", &[0], 1.0);
        base.set("y", &[0], 2.0);

        let mut patch = DataStore::new();
        patch.set("x", &[0], 99.0);

        base.merge_from(&patch);
        assert_eq!(base.get("x", &[0]).unwrap(), 99.0);
        assert_eq!(base.get("y", &[0]).unwrap(), 2.0);
    }
}
