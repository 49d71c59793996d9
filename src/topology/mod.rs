//! Topology-preserving edge routing.
//!
//! Edges run from source centre to target centre as polylines whose bends
//! sit on rectangle corners. A path is valid when no segment enters a
//! rectangle interior (other than the source or target at the ends), every
//! bend turns around the rectangle it is attached to, and no point repeats.

mod edge;
mod router;
mod visibility;

pub use edge::{Corner, EdgePoint, EdgeState, TopologyEdge};
pub use router::TopologyRouter;
