//! Model placement: the in-process cache, the decision engine and the
//! background reconciler.

mod cache;
mod placer;
mod reconciler;

pub use cache::PlacementCache;
pub use placer::{Placer, PlacerError};
pub use reconciler::Reconciler;
