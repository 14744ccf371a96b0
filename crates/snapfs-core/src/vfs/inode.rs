use blake2::digest::consts::U8;
use blake2::{Blake2b, Digest};

/// Inode of the filesystem root.
pub const ROOT_INODE: u64 = 1;

/// Derive the inode of `name` inside the directory `parent`.
///
/// A pure function of its inputs, so the same tree yields the same inodes on
/// every listing without keeping any table. Never returns 0 or
/// [`ROOT_INODE`].
pub fn dynamic_inode(parent: u64, name: &str) -> u64 {
    let mut hasher = Blake2b::<U8>::new();
    hasher.update(parent.to_le_bytes());
    hasher.update(name.as_bytes());
    loop {
        let digest = hasher.clone().finalize();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&digest);
        let inode = u64::from_le_bytes(buf);
        if inode > ROOT_INODE {
            return inode;
        }
        hasher.update(b"x");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_for_same_inputs() {
        assert_eq!(dynamic_inode(ROOT_INODE, "snapshots"), dynamic_inode(ROOT_INODE, "snapshots"));
    }

    #[test]
    fn depends_on_parent_and_name() {
        let a = dynamic_inode(ROOT_INODE, "tags");
        assert_ne!(a, dynamic_inode(ROOT_INODE, "hosts"));
        assert_ne!(a, dynamic_inode(a, "tags"));
    }

    #[test]
    fn never_reserved_values() {
        for i in 0..2000u64 {
            let inode = dynamic_inode(i, &format!("entry-{i}"));
            assert!(inode > ROOT_INODE);
        }
    }
}
