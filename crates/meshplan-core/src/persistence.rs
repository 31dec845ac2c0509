//! Persistence adapter for the whitespace-delimited data file and the
//! JSON-shaped schema file. Sync is explicit: nothing here implies any
//! cross-process coherence guarantee.

use std::fs;
use std::path::Path;

use meshplan_error::{MeshResult, mesh_err};

use crate::data_store::DataStore;
use crate::schema::Schema;

pub fn load_schema(path: impl AsRef<Path>) -> MeshResult<Schema> {
    let text = fs::read_to_string(path.as_ref())
        .map_err(|e| mesh_err!(Io: "reading schema file {}: {}", path.as_ref().display(), e))?;
    Schema::from_json(&text)
}

/// Parses whitespace/tab-delimited rows `VAR i1 i2 ... iN VALUE`. Trailing
/// empty lines are tolerated.
pub fn load_data(path: impl AsRef<Path>) -> MeshResult<DataStore> {
    let text = fs::read_to_string(path.as_ref())
        .map_err(|e| mesh_err!(Io: "reading data file {}: {}", path.as_ref().display(), e))?;
    parse_data(&text)
}

pub fn parse_data(text: &str) -> MeshResult<DataStore> {
    let mut store = DataStore::new();

    for (line_no, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 2 {
            return Err(
                mesh_err!(Io: "data file line {}: expected at least a variable and a value", line_no + 1),
            );
        }

        let var = fields[0];
        let value_field = fields[fields.len() - 1];
        let index_fields = &fields[1..fields.len() - 1];

        let value: f64 = value_field
            .parse()
            .map_err(|_| mesh_err!(Io: "data file line {}: invalid value {:?}", line_no + 1, value_field))?;

        let indices = index_fields
            .iter()
            .map(|f| {
                f.parse::<i64>()
                    .map_err(|_| mesh_err!(Io: "data file line {}: invalid index {:?}", line_no + 1, f))
            })
            .collect::<MeshResult<Vec<_>>>()?;

        store.set(var, &indices, value);
    }

    Ok(store)
}

/// Emits one space between fields; key order is unspecified.
pub fn save_data(store: &DataStore, path: impl AsRef<Path>) -> MeshResult<()> {
    let text = render_data(store);
    fs::write(path.as_ref(), text)
        .map_err(|e| mesh_err!(Io: "writing data file {}: {}", path.as_ref().display(), e))
}

pub fn render_data(store: &DataStore) -> String {
    let mut out = String::new();
    for (var, indices, value) in store.iter() {
        out.push_str(var);
        for i in indices {
            out.push(' ');
            out.push_str(&i.to_string());
        }
        out.push(' ');
        out.push_str(&value.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whitespace_and_tab_delimited_rows() {
        let text = "phi 0 0 200.0\nx_eq\t0\t0\t0\t150.5\n\n";
        let store = parse_data(text).unwrap();
        assert_eq!(store.get("phi", &[0, 0]).unwrap(), 200.0);
        assert_eq!(store.get("x_eq", &[0, 0, 0]).unwrap(), 150.5);
    }

    #[test]
    fn round_trip_through_render_and_parse() {
        let mut store = DataStore::new();
        store.set("alpha_0", &[], 0.6);
        store.set("psi", &[0, 1, 0, 0], 300.0);

        let rendered = render_data(&store);
        let reparsed = parse_data(&rendered).unwrap();

        assert_eq!(reparsed.get("alpha_0", &[]).unwrap(), 0.6);
        assert_eq!(reparsed.get("psi", &[0, 1, 0, 0]).unwrap(), 300.0);
        assert_eq!(reparsed.len(), store.len());
    }

    #[test]
    fn rejects_malformed_value_field() {
        assert!(parse_data("phi 0 0 not-a-number\n").is_err());
    }
}
