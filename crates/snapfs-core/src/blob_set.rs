//! Set algebra over blob handles, partitioned by blob type.

use std::collections::HashSet;
use std::fmt;

use snapfs_types::{BlobHandle, BlobHandles, BlobId, BlobType};

/// A set of [`BlobHandle`]s. The default value is the empty set.
///
/// Each blob type gets its own partition, created on first insert. A missing
/// partition behaves exactly like an empty one. Not synchronized: build one
/// set per worker and [`merge`](BlobSet::merge) afterwards.
#[derive(Debug, Clone, Default)]
pub struct BlobSet {
    by_type: [Option<HashSet<BlobId>>; BlobType::COUNT],
}

impl BlobSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, t: BlobType) -> Option<&HashSet<BlobId>> {
        self.by_type[t.index()].as_ref()
    }

    fn partition_len(&self, t: BlobType) -> usize {
        self.partition(t).map_or(0, HashSet::len)
    }

    /// Returns `true` iff `h` is contained in the set.
    pub fn contains(&self, h: &BlobHandle) -> bool {
        self.partition(h.blob_type)
            .is_some_and(|ids| ids.contains(&h.id))
    }

    /// Add `h` to the set. Inserting an existing handle is a no-op.
    pub fn insert(&mut self, h: BlobHandle) {
        self.by_type[h.blob_type.index()]
            .get_or_insert_with(HashSet::new)
            .insert(h.id);
    }

    /// Remove `h` from the set if present.
    pub fn delete(&mut self, h: &BlobHandle) {
        if let Some(ids) = self.by_type[h.blob_type.index()].as_mut() {
            ids.remove(&h.id);
        }
    }

    /// Returns `true` iff both sets hold exactly the same handles.
    pub fn equals(&self, other: &BlobSet) -> bool {
        if BlobType::ALL
            .iter()
            .any(|&t| self.partition_len(t) != other.partition_len(t))
        {
            return false;
        }

        BlobType::ALL.iter().all(|&t| match self.partition(t) {
            None => true,
            Some(ids) => {
                let theirs = other.partition(t);
                ids.iter()
                    .all(|id| theirs.is_some_and(|o| o.contains(id)))
            }
        })
    }

    /// Call `visit` for every handle, in no particular order. The first error
    /// returned by `visit` stops the iteration and is returned.
    pub fn for_each<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(BlobHandle) -> Result<(), E>,
    {
        for t in BlobType::ALL {
            if let Some(ids) = self.partition(t) {
                for id in ids {
                    visit(BlobHandle::new(t, *id))?;
                }
            }
        }
        Ok(())
    }

    /// Iterate all handles, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = BlobHandle> + '_ {
        BlobType::ALL.into_iter().flat_map(move |t| {
            self.partition(t)
                .into_iter()
                .flatten()
                .map(move |id| BlobHandle::new(t, *id))
        })
    }

    /// Number of handles across all partitions.
    pub fn len(&self) -> usize {
        BlobType::ALL.iter().map(|&t| self.partition_len(t)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add every handle of `other` to this set.
    pub fn merge(&mut self, other: &BlobSet) {
        for t in BlobType::ALL {
            let Some(theirs) = other.partition(t) else {
                continue;
            };
            if theirs.is_empty() {
                continue;
            }
            self.by_type[t.index()]
                .get_or_insert_with(HashSet::new)
                .extend(theirs.iter().copied());
        }
    }

    /// Handles present in both sets.
    ///
    /// Per partition only the smaller side is iterated and the larger side is
    /// probed, so the cost is bounded by the smaller set.
    pub fn intersect(&self, other: &BlobSet) -> BlobSet {
        let mut result = BlobSet::new();
        for t in BlobType::ALL {
            let (Some(mine), Some(theirs)) = (self.partition(t), other.partition(t)) else {
                continue;
            };
            let (small, large) = if theirs.len() < mine.len() {
                (theirs, mine)
            } else {
                (mine, theirs)
            };
            for id in small {
                if large.contains(id) {
                    result.insert(BlobHandle::new(t, *id));
                }
            }
        }
        result
    }

    /// Handles present in this set but not in `other`.
    pub fn sub(&self, other: &BlobSet) -> BlobSet {
        let mut result = BlobSet::new();
        for t in BlobType::ALL {
            let Some(mine) = self.partition(t) else {
                continue;
            };
            let theirs = other.partition(t);
            for id in mine {
                if !theirs.is_some_and(|o| o.contains(id)) {
                    result.insert(BlobHandle::new(t, *id));
                }
            }
        }
        result
    }

    /// All handles sorted by type, then id.
    pub fn list(&self) -> BlobHandles {
        let mut list = BlobHandles(Vec::with_capacity(self.len()));
        list.0.extend(self.iter());
        list.sort();
        list
    }
}

impl PartialEq for BlobSet {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for BlobSet {}

impl FromIterator<BlobHandle> for BlobSet {
    fn from_iter<I: IntoIterator<Item = BlobHandle>>(iter: I) -> Self {
        let mut set = BlobSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<BlobHandle> for BlobSet {
    fn extend<I: IntoIterator<Item = BlobHandle>>(&mut self, iter: I) {
        for h in iter {
            self.insert(h);
        }
    }
}

impl fmt::Display for BlobSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = self.list().to_string();
        write!(f, "{{{}}}", &list[1..list.len() - 1])
    }
}
