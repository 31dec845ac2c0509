//! A tagged union over the five operation variants, avoiding virtual
//! dispatch on the simulator's hot path. Per-variant data (the containers
//! an operation is wired to) lives in [`OperationKind`]; everything common
//! to every variant (identity, planned amount, capacity, fraction,
//! accumulated processed amount) lives directly on [`Operation`].

pub type ContainerKey3 = (usize, usize, usize);
pub type ContainerKey2 = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// `x`: sender's input container to receiver's input container.
    Transfer { output: ContainerKey3 },
    /// `y`: accumulates into a processed-memory container shared by every
    /// instance of this op across intervals at the same `(j, rho)`.
    Store { memory: ContainerKey2 },
    /// `g`: consumes from input, accumulates locally, no output.
    Process,
    /// `z`: absorbs the entire residual of its input container at teardown.
    Drop,
    /// `x_eq`: injects into its own node's input container.
    Generate { output: ContainerKey3 },
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub j: usize,
    pub i: Option<usize>,
    pub rho: usize,
    pub l: usize,
    pub planned: f64,
    /// The physical resource's upper intensity (`mm_psi`/`mm_v`/`mm_phi`),
    /// indexed without `rho` - shared by every load at this node/channel.
    pub capacity: f64,
    /// This op's share of `capacity`, in `[0,1]`, summing to 1 over `rho`
    /// for fixed `(j, [i,] l)`.
    pub fraction: f64,
    pub input: ContainerKey3,
    /// Accumulated processed amount. For `Store`, this mirrors the shared
    /// memory container's amount rather than being independently owned.
    pub processed: f64,
    /// Computed during the payload phase, applied during teardown.
    pub staged: f64,
}

impl Operation {
    pub fn remaining(&self) -> f64 {
        self.planned - self.processed
    }
}
