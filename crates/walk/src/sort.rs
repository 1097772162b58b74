use crate::arena::{NodeArena, NodeId};
use crate::entry::EntryNode;
use logging::debug_log;
use std::cmp::Ordering;

/// Caller-supplied sibling ordering.
pub type Comparator = Box<dyn Fn(&EntryNode, &EntryNode) -> Ordering>;

/// Sibling count above which unsorted directories are reordered by inode
/// before their entries are stated, to turn random stat access into a
/// forward sweep of the inode table.
pub const DEFAULT_INODE_SORT_THRESHOLD: usize = 10_000;

/// Orders freshly read siblings in place.
///
/// A comparator always wins. Without one, large directories are reordered by
/// raw inode number and small ones are left in filesystem order.
pub(crate) fn order_children(
    arena: &NodeArena,
    ids: &mut [NodeId],
    comparator: Option<&Comparator>,
    inode_threshold: usize,
) {
    if let Some(compare) = comparator {
        ids.sort_by(|&a, &b| compare(arena.get(a), arena.get(b)));
    } else if ids.len() > inode_threshold {
        debug_log!(Sort, 1, "inode-ordering {} siblings", ids.len());
        ids.sort_by_key(|&id| arena.get(id).inode_hint());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryInfo, EntryNode};
    use std::ffi::OsStr;

    fn seed(arena: &mut NodeArena, name: &str, ino: u64) -> NodeId {
        let mut node =
            EntryNode::new(name.into(), name.into(), name.into(), 1, EntryInfo::File);
        node.ino_hint = ino;
        arena.insert(node)
    }

    fn names(arena: &NodeArena, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|&id| arena.get(id).name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn comparator_overrides_everything() {
        let mut arena = NodeArena::new();
        let mut ids = vec![
            seed(&mut arena, "charlie", 3),
            seed(&mut arena, "alpha", 2),
            seed(&mut arena, "bravo", 1),
        ];
        let by_name: Comparator = Box::new(|a, b| a.name().cmp(b.name()));
        order_children(&arena, &mut ids, Some(&by_name), 0);
        assert_eq!(names(&arena, &ids), ["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn small_directories_keep_filesystem_order() {
        let mut arena = NodeArena::new();
        let mut ids = vec![seed(&mut arena, "b", 9), seed(&mut arena, "a", 1)];
        order_children(&arena, &mut ids, None, 10);
        assert_eq!(names(&arena, &ids), ["b", "a"]);
    }

    #[test]
    fn large_directories_order_by_inode() {
        let mut arena = NodeArena::new();
        let mut ids = vec![
            seed(&mut arena, "high", 30),
            seed(&mut arena, "low", 10),
            seed(&mut arena, "mid", 20),
        ];
        order_children(&arena, &mut ids, None, 2);
        assert_eq!(names(&arena, &ids), ["low", "mid", "high"]);
        assert_eq!(arena.get(ids[0]).name(), OsStr::new("low"));
    }
}
