//! Schema-driven indexing, the keyed data store, and the shared primitives
//! (containers, the process-wide RNG, an optional execution trace) used by
//! the LP planner, the simulator, and the GA refiner.

pub mod container;
pub mod data_store;
pub mod indices;
pub mod persistence;
pub mod random;
pub mod row_index;
pub mod schema;
pub mod trace;

pub use container::Container;
pub use data_store::{DataStore, DefaultingStore, IndexKey};
pub use indices::Indices;
pub use row_index::RowIndex;
pub use schema::{Schema, SchemaDef};
pub use trace::{Trace, TracePoint};
