mod slot;
pub use slot::{CellKey, Slot};

mod record;
pub use record::{OutputStream, RunRecord};

mod revision;
pub use revision::ResolvedRevision;

mod summary;
pub use summary::{PoolSummary, RunSummary};

/// Opaque browser version string (e.g. `"120.0.6099.109"`).
pub type Version = String;

/// Zero-based iteration index within a `(version, sha)` cell.
pub type Iteration = u32;
