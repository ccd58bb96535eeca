#![forbid(unsafe_code)]

/// The split index `k`: the number of layers executed on the device, and so
/// also the index of the first layer the edge must run.
///
/// `Layer(0)` means "everything on the edge"; `Local` is the wire's `-1`
/// and is treated identically to `Layer(N)` (device ran every layer, edge
/// has nothing left to do) — these two are deliberately equivalent so
/// callers never need to special-case both.
///
/// Design note: "`k`" is ambiguous across this system's own components —
/// it can mean "count of device layers" (the
/// optimiser's convention, used to index `T_device`/`T_edge`/`net`) or "the
/// last layer index the device ran" (the suffix-execution convention, one
/// less). This type standardises on the optimiser's convention everywhere
/// in this crate — `Layer(k)` always means "device ran layers `0..k`, edge
/// runs layers `k..N-1`" — and the wire codec converts the device's raw
/// integer into this convention at the boundary (see `split-wire`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitIndex {
    /// Edge must run layers `k..N-1`.
    Layer(u32),
    /// Device ran the whole model; edge has nothing left to do.
    Local,
}

impl SplitIndex {
    /// Reconstructs a `SplitIndex` from the raw wire/optimiser integer.
    /// `raw < 0` or `raw >= num_layers` both mean "nothing left for the
    /// edge to run".
    pub fn from_wire(raw: i32, num_layers: u32) -> Self {
        if raw < 0 || raw as u32 >= num_layers {
            SplitIndex::Local
        } else {
            SplitIndex::Layer(raw as u32)
        }
    }

    /// The integer this split index would report back over the wire.
    pub fn to_wire(self) -> i32 {
        match self {
            SplitIndex::Layer(k) => k as i32,
            SplitIndex::Local => -1,
        }
    }

    /// First layer index the edge must execute, or `None` if there is
    /// nothing left to run.
    pub fn first_edge_layer(self, num_layers: u32) -> Option<u32> {
        match self {
            SplitIndex::Layer(k) if k < num_layers => Some(k),
            _ => None,
        }
    }
}
