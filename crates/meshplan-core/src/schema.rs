//! The schema declares, for every variable, the ordered tuple of indices
//! that address its instances, and the cardinality of every index name. The
//! ordered index list is a mixed-radix numeral: position 0 is most
//! significant.

use std::collections::{BTreeMap, HashMap};

use meshplan_error::{MeshError, MeshResult, mesh_bail, mesh_err};
use serde::{Deserialize, Serialize};

use crate::indices::Indices;

pub const VAR_TRANSFER: &str = "x";
pub const VAR_STORE: &str = "y";
pub const VAR_PROCESS: &str = "g";
pub const VAR_DROP: &str = "z";
pub const VAR_ARRIVAL: &str = "x_eq";

const IDX_NODE_FROM: &str = "j";
const IDX_NODE_TO: &str = "i";

/// Wire format for the schema file: an object with `indexBound` and
/// `variableIndices` members. Unknown members are ignored by `serde`'s
/// default (non-deny_unknown_fields) behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaDef {
    #[serde(rename = "indexBound")]
    pub index_bound: BTreeMap<String, usize>,
    #[serde(rename = "variableIndices")]
    pub variable_indices: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Schema {
    index_bound: BTreeMap<String, usize>,
    variable_indices: BTreeMap<String, Vec<String>>,
}

impl Schema {
    pub fn from_def(def: SchemaDef) -> MeshResult<Self> {
        let schema = Schema {
            index_bound: def.index_bound,
            variable_indices: def.variable_indices,
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_json(text: &str) -> MeshResult<Self> {
        let def: SchemaDef = serde_json::from_str(text)
            .map_err(|e| mesh_err!(SchemaViolation: "malformed schema json: {}", e))?;
        Self::from_def(def)
    }

    pub fn get_var_indices(&self, v: &str) -> MeshResult<&[String]> {
        self.variable_indices
            .get(v)
            .map(|v| v.as_slice())
            .ok_or_else(|| mesh_err!(SchemaViolation: "unknown variable: {}", v))
    }

    pub fn get_index_bound(&self, k: &str) -> MeshResult<usize> {
        self.index_bound
            .get(k)
            .copied()
            .ok_or_else(|| mesh_err!(SchemaViolation: "unknown index: {}", k))
    }

    /// The bound of each index in `v`'s declared index list, in order.
    pub fn get_var_radix(&self, v: &str) -> MeshResult<Vec<usize>> {
        self.get_var_indices(v)?
            .to_vec()
            .iter()
            .map(|k| self.get_index_bound(k))
            .collect()
    }

    /// Number of distinct instances of variable `v`.
    pub fn var_size(&self, v: &str) -> MeshResult<usize> {
        Ok(self.get_var_radix(v)?.iter().product())
    }

    pub fn indices_dict_to_plain(
        &self,
        v: &str,
        dict: &HashMap<String, usize>,
    ) -> MeshResult<Vec<usize>> {
        let order = self.get_var_indices(v)?;
        if dict.len() != order.len() {
            mesh_bail!(IndexDomain: "variable {} expects indices {:?}, got keys {:?}", v, order, dict.keys().collect::<Vec<_>>());
        }
        order
            .iter()
            .map(|k| {
                dict.get(k)
                    .copied()
                    .ok_or_else(|| mesh_err!(IndexDomain: "variable {} missing index {}", v, k))
            })
            .collect()
    }

    pub fn indices_plain_to_dict(
        &self,
        v: &str,
        plain: &[usize],
    ) -> MeshResult<HashMap<String, usize>> {
        let order = self.get_var_indices(v)?;
        if plain.len() != order.len() {
            mesh_bail!(IndexDomain: "variable {} expects {} indices, got {}", v, order.len(), plain.len());
        }
        Ok(order.iter().cloned().zip(plain.iter().copied()).collect())
    }

    /// Enumerates every tuple of non-negative integers for the named index
    /// keys, in lexicographic order with the last key varying fastest.
    pub fn radix_map_iter(&self, keys: &[&str]) -> MeshResult<Indices> {
        let bounds = keys
            .iter()
            .map(|k| self.get_index_bound(k))
            .collect::<MeshResult<Vec<_>>>()?;
        Ok(Indices::new(bounds))
    }

    /// Enumerates every instance of `v` as a `(indices, plain)` pair, the
    /// dict keyed by `v`'s declared index names.
    pub fn radix_map_iter_var(
        &self,
        v: &str,
    ) -> MeshResult<impl Iterator<Item = HashMap<String, usize>> + '_> {
        let order = self.get_var_indices(v)?.to_vec();
        let bounds = self.get_var_radix(v)?;
        Ok(Indices::new(bounds).map(move |plain| {
            order
                .iter()
                .cloned()
                .zip(plain.into_iter())
                .collect::<HashMap<_, _>>()
        }))
    }

    pub fn index_bound_map(&self) -> &BTreeMap<String, usize> {
        &self.index_bound
    }

    pub fn variable_indices_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.variable_indices
    }

    fn validate(&self) -> MeshResult<()> {
        for (var, idxs) in &self.variable_indices {
            for k in idxs {
                let bound = self
                    .index_bound
                    .get(k)
                    .ok_or_else(|| mesh_err!(SchemaViolation: "variable {} references undeclared index {}", var, k))?;
                if *bound == 0 {
                    mesh_bail!(SchemaViolation: "index {} has non-positive bound", k);
                }
            }
        }

        if let (Some(j), Some(i)) = (
            self.index_bound.get(IDX_NODE_FROM),
            self.index_bound.get(IDX_NODE_TO),
        ) && j != i
        {
            mesh_bail!(SchemaViolation: "node index pair must be square: |j|={} != |i|={}", j, i);
        }

        let jril = ["j", "rho", "l"];
        for v in [VAR_STORE, VAR_PROCESS, VAR_DROP, VAR_ARRIVAL] {
            if let Some(idx) = self.variable_indices.get(v)
                && idx.as_slice() != jril
            {
                mesh_bail!(SchemaViolation: "variable {} must be indexed by [j,rho,l], got {:?}", v, idx);
            }
        }
        if let Some(idx) = self.variable_indices.get(VAR_TRANSFER)
            && idx.as_slice() != ["j", "i", "rho", "l"]
        {
            mesh_bail!(SchemaViolation: "variable x must be indexed by [j,i,rho,l], got {:?}", idx);
        }

        Ok(())
    }
}

impl TryFrom<SchemaDef> for Schema {
    type Error = MeshError;
    fn try_from(def: SchemaDef) -> MeshResult<Self> {
        Schema::from_def(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_schema() -> Schema {
        let json = r#"{
            "indexBound": {"j": 2, "i": 2, "rho": 1, "l": 1},
            "variableIndices": {
                "x": ["j", "i", "rho", "l"],
                "y": ["j", "rho", "l"],
                "g": ["j", "rho", "l"],
                "z": ["j", "rho", "l"],
                "x_eq": ["j", "rho", "l"]
            }
        }"#;
        Schema::from_json(json).unwrap()
    }

    #[test]
    fn rejects_non_square_node_pair() {
        let json = r#"{
            "indexBound": {"j": 2, "i": 3},
            "variableIndices": {"x": ["j", "i"]}
        }"#;
        assert!(Schema::from_json(json).is_err());
    }

    #[test]
    fn rejects_wrong_index_order_for_x() {
        let json = r#"{
            "indexBound": {"j": 2, "i": 2, "rho": 1, "l": 1},
            "variableIndices": {"x": ["i", "j", "rho", "l"]}
        }"#;
        assert!(Schema::from_json(json).is_err());
    }

    #[test]
    fn unknown_members_are_ignored() {
        let json = r#"{
            "indexBound": {"j": 1},
            "variableIndices": {},
            "chartTheme": "dark"
        }"#;
        assert!(Schema::from_json(json).is_ok());
    }

    #[test]
    fn round_trip_dict_to_plain_and_back() {
        let schema = two_node_schema();
        let mut dict = HashMap::new();
        dict.insert("j".to_string(), 1);
        dict.insert("i".to_string(), 0);
        dict.insert("rho".to_string(), 0);
        dict.insert("l".to_string(), 0);

        let plain = schema.indices_dict_to_plain("x", &dict).unwrap();
        let back = schema.indices_plain_to_dict("x", &plain).unwrap();
        assert_eq!(dict, back);
    }

    #[test]
    fn radix_map_iter_var_enumerates_all_instances() {
        let schema = two_node_schema();
        let count = schema.radix_map_iter_var("y").unwrap().count();
        assert_eq!(count, schema.var_size("y").unwrap());
        assert_eq!(count, 2); // j in {0,1}, rho/l fixed at 1 each
    }
}
