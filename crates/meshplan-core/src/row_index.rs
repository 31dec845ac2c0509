//! Translates a schema-declared variable instance into a single dense
//! linear position. Given an ordered subset of variables, instances of the
//! first variable occupy the first contiguous block of positions, then the
//! next variable's instances follow, and so on; within a variable,
//! instances are laid out as a row-major mixed-radix numeral over its
//! declared index list.

use std::collections::HashMap;

use meshplan_error::{MeshResult, mesh_bail, mesh_err};

use crate::schema::Schema;

#[derive(Debug, Clone)]
struct VarLayout {
    name: String,
    order: Vec<String>,
    bounds: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
    size: usize,
}

fn strides_of(bounds: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; bounds.len()];
    for t in (0..bounds.len().saturating_sub(1)).rev() {
        strides[t] = strides[t + 1] * bounds[t + 1];
    }
    strides
}

#[derive(Debug, Clone)]
pub struct RowIndex {
    layouts: Vec<VarLayout>,
    row_len: usize,
}

impl RowIndex {
    pub fn new(schema: &Schema, vars: &[&str]) -> MeshResult<Self> {
        let mut layouts = Vec::with_capacity(vars.len());
        let mut offset = 0usize;

        for &v in vars {
            let order = schema.get_var_indices(v)?.to_vec();
            let bounds = schema.get_var_radix(v)?;
            let size: usize = bounds.iter().product();
            let strides = strides_of(&bounds);

            layouts.push(VarLayout {
                name: v.to_string(),
                order,
                bounds,
                strides,
                offset,
                size,
            });
            offset += size;
        }

        Ok(RowIndex {
            layouts,
            row_len: offset,
        })
    }

    pub fn row_len(&self) -> usize {
        self.row_len
    }

    fn layout(&self, v: &str) -> MeshResult<&VarLayout> {
        self.layouts
            .iter()
            .find(|l| l.name == v)
            .ok_or_else(|| mesh_err!(SchemaViolation: "variable {} is not part of this row index", v))
    }

    /// Computes the dense linear position of `(v, indices)`.
    pub fn get_pos(&self, v: &str, indices: &HashMap<String, usize>) -> MeshResult<usize> {
        let layout = self.layout(v)?;
        if indices.len() != layout.order.len() {
            mesh_bail!(IndexDomain: "variable {} expects indices {:?}, got {:?}", v, layout.order, indices.keys().collect::<Vec<_>>());
        }

        let mut local = 0usize;
        for (t, key) in layout.order.iter().enumerate() {
            let i = indices
                .get(key)
                .ok_or_else(|| mesh_err!(IndexDomain: "variable {} missing index {}", v, key))?;
            if *i >= layout.bounds[t] {
                mesh_bail!(IndexDomain: "index {}={} out of bound {} for variable {}", key, i, layout.bounds[t], v);
            }
            local += i * layout.strides[t];
        }

        Ok(layout.offset + local)
    }

    pub fn var_offset(&self, v: &str) -> MeshResult<usize> {
        Ok(self.layout(v)?.offset)
    }

    pub fn var_size(&self, v: &str) -> MeshResult<usize> {
        Ok(self.layout(v)?.size)
    }
}
