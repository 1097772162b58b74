use crate::entry::EntryNode;

/// Handle to an [`EntryNode`] owned by a session's arena.
///
/// Parent and sibling relationships are stored as handles rather than
/// references, so the node tree carries no lifetimes of its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

/// Slab-style owner of every live [`EntryNode`].
///
/// Nodes are released as soon as their subtree has been fully reported, so
/// the arena's live count tracks the open root-to-cursor chain plus unvisited
/// siblings, not the whole tree.
pub(crate) struct NodeArena {
    slots: Vec<Option<EntryNode>>,
    free: Vec<u32>,
    live: usize,
}

impl NodeArena {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub(crate) fn insert(&mut self, node: EntryNode) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(node);
            return NodeId(index);
        }
        let index = u32::try_from(self.slots.len()).expect("node arena exhausted");
        self.slots.push(Some(node));
        NodeId(index)
    }

    pub(crate) fn get(&self, id: NodeId) -> &EntryNode {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("released node handle")
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut EntryNode {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("released node handle")
    }

    pub(crate) fn release(&mut self, id: NodeId) -> EntryNode {
        let node = self.slots[id.0 as usize]
            .take()
            .expect("released node handle");
        self.free.push(id.0);
        self.live -= 1;
        node
    }

    #[cfg(test)]
    pub(crate) const fn live(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryInfo, EntryNode};
    use std::ffi::OsStr;

    fn node(name: &str) -> EntryNode {
        EntryNode::new(name.into(), name.into(), name.into(), 0, EntryInfo::Root)
    }

    #[test]
    fn insert_get_release() {
        let mut arena = NodeArena::new();
        let a = arena.insert(node("a"));
        let b = arena.insert(node("b"));
        assert_ne!(a, b);
        assert_eq!(arena.get(a).name(), OsStr::new("a"));
        assert_eq!(arena.get(b).name(), OsStr::new("b"));
        assert_eq!(arena.live(), 2);

        arena.release(a);
        assert_eq!(arena.live(), 1);
        assert_eq!(arena.get(b).name(), OsStr::new("b"));
    }

    #[test]
    fn released_slots_are_reused() {
        let mut arena = NodeArena::new();
        let a = arena.insert(node("a"));
        arena.release(a);
        let b = arena.insert(node("b"));
        assert_eq!(a, b);
        assert_eq!(arena.get(b).name(), OsStr::new("b"));
    }

    #[test]
    #[should_panic(expected = "released node handle")]
    fn double_release_panics() {
        let mut arena = NodeArena::new();
        let a = arena.insert(node("a"));
        arena.release(a);
        arena.release(a);
    }
}
