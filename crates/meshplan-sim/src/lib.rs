//! The discrete-event simulator: replays a planned or GA-refined schedule
//! tick by tick and scores the result.

pub mod operation;
pub mod simulator;

pub use operation::{ContainerKey2, ContainerKey3, Operation, OperationKind};
pub use simulator::{RunConfig, Simulator};
