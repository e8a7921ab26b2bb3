//! Namespace index: a byte-keyed prefix trie mapping every exported path
//! to the storage server that owns it.
//!
//! Nodes live in an arena (`Vec<TrieNode>`) and children are addressed by
//! index, so concurrent readers never race a pointer free: deletion only
//! tombstones (`owner = None`), it never reclaims nodes.

use crate::registry::ServerId;
use log::debug;

const NO_CHILD: u32 = u32::MAX;
const BRANCH: usize = 256;

struct TrieNode {
    children: Box<[u32; BRANCH]>,
    owner: Option<ServerId>,
    /// Set at every `/` byte and at the terminal byte of an inserted path.
    /// A boundary node with no owner is a tombstone: everything at or
    /// below it is gone.
    is_boundary: bool,
    is_file: bool,
}

impl TrieNode {
    fn new() -> Self {
        Self {
            children: Box::new([NO_CHILD; BRANCH]),
            owner: None,
            is_boundary: false,
            is_file: false,
        }
    }

    fn child(&self, byte: u8) -> Option<usize> {
        let slot = self.children[byte as usize];
        (slot != NO_CHILD).then_some(slot as usize)
    }
}

pub struct PathIndex {
    nodes: Vec<TrieNode>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::new()],
        }
    }

    /// Number of arena nodes, root included. Monotonic: deletes tombstone.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Records `server` as the owner of `path`, creating trie nodes as
    /// needed. Every `/` byte marks an addressable directory boundary;
    /// a non-`/` terminal byte additionally marks a file. Re-inserting an
    /// existing path overwrites ownership (last writer wins).
    pub fn insert(&mut self, path: &str, server: ServerId) {
        let bytes = path.as_bytes();
        if bytes.is_empty() {
            return;
        }
        let mut current = 0usize;
        for (position, &byte) in bytes.iter().enumerate() {
            current = self.child_or_create(current, byte);
            let node = &mut self.nodes[current];
            let terminal = position + 1 == bytes.len();
            if byte == b'/' {
                node.is_boundary = true;
                node.owner = Some(server);
                node.is_file = false;
            } else if terminal {
                node.is_boundary = true;
                node.owner = Some(server);
                node.is_file = true;
            }
        }
        debug!("event=index_insert path={path} server={server}");
    }

    /// Resolves `path` to its owning server.
    ///
    /// Returns `None` when any byte has no child, when a tombstoned
    /// boundary is crossed on the way down (a deleted ancestor directory
    /// hides the whole subtree), or when the terminal node is not an
    /// addressable endpoint.
    pub fn search(&self, path: &str) -> Option<ServerId> {
        let bytes = path.as_bytes();
        if bytes.is_empty() {
            return None;
        }
        let mut current = 0usize;
        for &byte in bytes {
            current = self.nodes[current].child(byte)?;
            let node = &self.nodes[current];
            if node.is_boundary && node.owner.is_none() {
                return None;
            }
        }
        let node = &self.nodes[current];
        if node.is_boundary {
            node.owner
        } else {
            None
        }
    }

    /// Whether `path` resolves to a file (as opposed to a directory
    /// boundary or nothing at all).
    pub fn is_file(&self, path: &str) -> bool {
        let bytes = path.as_bytes();
        if bytes.is_empty() {
            return false;
        }
        let mut current = 0usize;
        for &byte in bytes {
            match self.nodes[current].child(byte) {
                Some(next) => current = next,
                None => return false,
            }
        }
        let node = &self.nodes[current];
        node.is_boundary && node.owner.is_some() && node.is_file
    }

    /// Tombstones the exact path: the terminal node keeps its children but
    /// loses its owner, so `search` treats the whole subtree as gone.
    /// Deleting an unknown path is a no-op.
    pub fn delete(&mut self, path: &str) -> bool {
        let bytes = path.as_bytes();
        if bytes.is_empty() {
            return false;
        }
        let mut current = 0usize;
        for &byte in bytes {
            match self.nodes[current].child(byte) {
                Some(next) => current = next,
                None => return false,
            }
        }
        let node = &mut self.nodes[current];
        if !node.is_boundary {
            return false;
        }
        node.owner = None;
        debug!("event=index_delete path={path}");
        true
    }

    fn child_or_create(&mut self, parent: usize, byte: u8) -> usize {
        if let Some(existing) = self.nodes[parent].child(byte) {
            return existing;
        }
        let index = self.nodes.len();
        self.nodes.push(TrieNode::new());
        self.nodes[parent].children[byte as usize] = index as u32;
        index
    }
}

impl Default for PathIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u16) -> ServerId {
        ServerId::new(raw)
    }

    #[test]
    fn last_insert_wins_for_exact_path() {
        let mut index = PathIndex::new();
        index.insert("/a/b.txt", id(1));
        assert_eq!(index.search("/a/b.txt"), Some(id(1)));
        index.insert("/a/b.txt", id(2));
        assert_eq!(index.search("/a/b.txt"), Some(id(2)));
    }

    #[test]
    fn missing_path_not_found() {
        let mut index = PathIndex::new();
        index.insert("/a/b.txt", id(1));
        assert_eq!(index.search("/a/c.txt"), None);
        assert_eq!(index.search("/a/b"), None);
        assert_eq!(index.search(""), None);
    }

    #[test]
    fn directory_boundaries_are_addressable() {
        let mut index = PathIndex::new();
        index.insert("/docs/manual.txt", id(4));
        assert_eq!(index.search("/docs/"), Some(id(4)));
        assert_eq!(index.search("/"), Some(id(4)));
    }

    #[test]
    fn prefix_without_boundary_not_found() {
        let mut index = PathIndex::new();
        index.insert("/docs/manual.txt", id(4));
        assert_eq!(index.search("/docs"), None);
        assert_eq!(index.search("/docs/man"), None);
    }

    #[test]
    fn delete_then_search_not_found() {
        let mut index = PathIndex::new();
        index.insert("/a/b.txt", id(1));
        assert!(index.delete("/a/b.txt"));
        assert_eq!(index.search("/a/b.txt"), None);
    }

    #[test]
    fn delete_unknown_path_is_noop() {
        let mut index = PathIndex::new();
        index.insert("/a/b.txt", id(1));
        assert!(!index.delete("/zzz"));
        assert!(!index.delete("/a/b"));
        assert_eq!(index.search("/a/b.txt"), Some(id(1)));
    }

    #[test]
    fn tombstoned_ancestor_hides_subtree() {
        let mut index = PathIndex::new();
        index.insert("/a/b/c", id(1));
        assert!(index.delete("/a/"));
        assert_eq!(index.search("/a/b/c"), None);
        assert_eq!(index.search("/a/"), None);
    }

    #[test]
    fn reinsert_after_tombstone_restores_subtree() {
        let mut index = PathIndex::new();
        index.insert("/a/b/c", id(1));
        index.delete("/a/");
        index.insert("/a/b/c", id(2));
        assert_eq!(index.search("/a/b/c"), Some(id(2)));
        assert_eq!(index.search("/a/"), Some(id(2)));
    }

    #[test]
    fn nodes_are_never_reclaimed() {
        let mut index = PathIndex::new();
        index.insert("/a/b/c", id(1));
        let before = index.node_count();
        index.delete("/a/b/c");
        index.delete("/a/");
        assert_eq!(index.node_count(), before);
    }

    #[test]
    fn files_and_directories_are_distinguished() {
        let mut index = PathIndex::new();
        index.insert("/docs/manual.txt", id(4));
        assert!(index.is_file("/docs/manual.txt"));
        assert!(!index.is_file("/docs/"));
        assert!(!index.is_file("/docs/man"));
        index.delete("/docs/manual.txt");
        assert!(!index.is_file("/docs/manual.txt"));
    }

    #[test]
    fn empty_directory_registration() {
        let mut index = PathIndex::new();
        index.insert("/empty/", id(7));
        assert_eq!(index.search("/empty/"), Some(id(7)));
        assert_eq!(index.search("/empty"), None);
    }
}
