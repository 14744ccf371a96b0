use serde::{Deserialize, Serialize};
use std::fmt;

use crate::blob_id::BlobId;

/// Kind of content a blob holds. The discriminant order is the sort order
/// used by [`BlobHandles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobType {
    /// Raw file content chunk.
    Data,
    /// Serialized directory listing.
    Tree,
}

impl BlobType {
    pub const ALL: [BlobType; 2] = [BlobType::Data, BlobType::Tree];
    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlobType::Data => "data",
            BlobType::Tree => "tree",
        }
    }
}

impl fmt::Display for BlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a blob by its type and content address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlobHandle {
    pub blob_type: BlobType,
    pub id: BlobId,
}

impl BlobHandle {
    pub fn new(blob_type: BlobType, id: BlobId) -> Self {
        Self { blob_type, id }
    }

    pub fn data(id: BlobId) -> Self {
        Self::new(BlobType::Data, id)
    }

    pub fn tree(id: BlobId) -> Self {
        Self::new(BlobType::Tree, id)
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}/{}>", self.blob_type, self.id.short())
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}/{}>", self.blob_type, self.id.short())
    }
}

/// An ordered list of handles, as produced by `BlobSet::list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobHandles(pub Vec<BlobHandle>);

impl BlobHandles {
    pub fn sort(&mut self) {
        self.0.sort_unstable();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BlobHandle> {
        self.0.iter()
    }
}

impl fmt::Display for BlobHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, h) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{h}")?;
        }
        f.write_str("]")
    }
}

impl IntoIterator for BlobHandles {
    type Item = BlobHandle;
    type IntoIter = std::vec::IntoIter<BlobHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
