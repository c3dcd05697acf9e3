use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::feed::diff::RowIndex;
use crate::types::Frame;

/// Last successfully fetched row set plus the snapshot view of it.
///
/// Both are replaced wholesale by pointer swap; readers never lock and always see
/// a complete map.
pub struct StateStore {
    current: ArcSwap<RowIndex>,
    last_snapshot: ArcSwapOption<Frame>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RowIndex::new()),
            last_snapshot: ArcSwapOption::empty(),
        }
    }

    pub fn current(&self) -> Arc<RowIndex> {
        self.current.load_full()
    }

    pub fn last_snapshot(&self) -> Option<Arc<Frame>> {
        self.last_snapshot.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Only called from the serialized apply path.
    pub(crate) fn publish(&self, fresh: Arc<RowIndex>, snapshot: Arc<Frame>) {
        self.current.store(fresh);
        self.last_snapshot.store(Some(snapshot));
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
