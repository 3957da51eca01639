//! Layered core: identity atoms, logical clocks, the operation model, and
//! the RGA document engine. Nothing in this module performs I/O.

pub mod clock;
pub mod error;
pub mod identity;
pub mod op;
pub mod rga;

pub use clock::{LamportClock, WallClock};
pub use error::CoreError;
pub use identity::{CommitId, FileId, LineId, NodeId, StreamName};
pub use op::{Op, OpKey, OpKind};
pub use rga::{Document, Rga};
