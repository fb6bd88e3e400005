//! Hash collection aliases used for id lookups.
//!
//! With the `gxhash` feature the maps use gxhash (requires AES-NI/SSE2 or
//! NEON); without it they fall back to std collections. Iteration order is
//! never relied upon for output: anything user-visible follows ledger row
//! order, which is kept in separate vectors.
//!
//! gxhash maps have no inherent `new`/`with_capacity`; modules using them
//! import `HashMapExt`/`HashSetExt` behind the same feature gate.

#[cfg(feature = "gxhash")]
pub use gxhash::{HashMap, HashMapExt, HashSet, HashSetExt};

#[cfg(not(feature = "gxhash"))]
pub use std::collections::{HashMap, HashSet};

use crate::types::NodeId;

/// Map keyed by node id
pub type IdMap<V> = HashMap<NodeId, V>;

/// Set of node ids
pub type IdSet = HashSet<NodeId>;

/// Collect node ids into an [`IdSet`]
pub fn id_set<'a>(ids: impl IntoIterator<Item = &'a NodeId>) -> IdSet {
    let mut set = IdSet::new();
    for id in ids {
        set.insert(id.clone());
    }
    set
}
