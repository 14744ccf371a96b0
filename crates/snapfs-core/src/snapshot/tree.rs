use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use snapfs_types::{BlobId, Result, SnapfsError};

/// Decoded contents of a tree blob: one directory level of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Dir,
    Symlink,
}

/// A single entry in a tree blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub mode: u32,
    pub mtime: DateTime<Utc>,
    /// Size recorded at backup time. Attributes report the sum of the content
    /// blob sizes instead.
    #[serde(default)]
    pub size: u64,
    /// For files: data blobs in content order.
    #[serde(default)]
    pub content: Vec<BlobId>,
    /// For directories: the tree blob holding the children.
    #[serde(default)]
    pub subtree: Option<BlobId>,
    #[serde(default)]
    pub link_target: Option<String>,
}

impl Tree {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let tree: Tree = serde_json::from_slice(data)?;
        tree.validate()?;
        Ok(tree)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            if node.name.is_empty() || node.name == "." || node.name == ".." || node.name.contains('/')
            {
                return Err(SnapfsError::InvalidFormat(format!(
                    "invalid tree entry name '{}'",
                    node.name
                )));
            }
            if node.node_type == NodeType::Dir && node.subtree.is_none() {
                return Err(SnapfsError::InvalidFormat(format!(
                    "directory '{}' has no subtree",
                    node.name
                )));
            }
        }
        Ok(())
    }
}
