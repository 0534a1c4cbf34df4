//! Union-find arena of regions
//!
//! Every node starts in its own slot. Slots are merged by union with the
//! lower index becoming the root, so a root's id is also the topological
//! position of its earliest node. Each slot records the raw ids of the slots
//! it directly depends on; ids are resolved through [`RegionArena::find`]
//! whenever they are read, so merges never have to rewrite other slots.

use rustc_hash::FxHashSet;

/// Region identifier (index into the arena)
pub type RegionId = usize;

#[derive(Debug, Clone)]
struct Slot {
    parent: RegionId,
    native: bool,
    members: Vec<usize>,
    deps: FxHashSet<RegionId>,
}

/// Arena holding all regions created during partitioning
#[derive(Debug, Clone, Default)]
pub struct RegionArena {
    slots: Vec<Slot>,
}

impl RegionArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Create a singleton region for the node at topological position `node`
    pub fn push(&mut self, node: usize, native: bool) -> RegionId {
        let id = self.slots.len();
        self.slots.push(Slot {
            parent: id,
            native,
            members: vec![node],
            deps: FxHashSet::default(),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Root of the set containing `id`, compressing the path on the way
    pub fn find(&mut self, id: RegionId) -> RegionId {
        let mut root = id;
        while self.slots[root].parent != root {
            root = self.slots[root].parent;
        }

        let mut cur = id;
        while self.slots[cur].parent != root {
            let next = self.slots[cur].parent;
            self.slots[cur].parent = root;
            cur = next;
        }
        root
    }

    /// Root lookup without path compression
    pub fn root_of(&self, id: RegionId) -> RegionId {
        let mut root = id;
        while self.slots[root].parent != root {
            root = self.slots[root].parent;
        }
        root
    }

    pub fn is_root(&self, id: RegionId) -> bool {
        self.slots[id].parent == id
    }

    pub fn is_native(&self, id: RegionId) -> bool {
        self.slots[id].native
    }

    /// Node positions of a root region, ascending
    pub fn members(&self, id: RegionId) -> &[usize] {
        &self.slots[id].members
    }

    /// Record that region `id` consumes values produced by `deps`
    pub fn add_deps(&mut self, id: RegionId, deps: impl IntoIterator<Item = RegionId>) {
        let slot = &mut self.slots[id];
        for dep in deps {
            if dep != id {
                slot.deps.insert(dep);
            }
        }
    }

    /// Distinct roots region `id` directly depends on, excluding itself
    pub fn direct_deps(&mut self, id: RegionId) -> Vec<RegionId> {
        let root = self.find(id);
        let raw: Vec<RegionId> = self.slots[root].deps.iter().copied().collect();
        let mut deps: Vec<RegionId> = raw
            .into_iter()
            .map(|d| self.find(d))
            .filter(|&d| d != root)
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Whether merging roots `a` and `b` keeps the region graph acyclic
    ///
    /// The merge is unsafe exactly when some other region lies on a
    /// dependency path between the two: walking dependencies backwards from
    /// `a` and `b` through regions outside the pair must not lead back into
    /// the pair.
    pub fn can_merge(&mut self, a: RegionId, b: RegionId) -> bool {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return true;
        }

        let mut visited: FxHashSet<RegionId> = FxHashSet::default();
        let mut stack: Vec<RegionId> = self
            .direct_deps(a)
            .into_iter()
            .chain(self.direct_deps(b))
            .filter(|&r| r != a && r != b)
            .collect();

        while let Some(region) = stack.pop() {
            if !visited.insert(region) {
                continue;
            }
            for dep in self.direct_deps(region) {
                if dep == a || dep == b {
                    return false;
                }
                if !visited.contains(&dep) {
                    stack.push(dep);
                }
            }
        }
        true
    }

    /// Merge the sets containing `a` and `b`
    ///
    /// The lower root index survives and absorbs the other's members and
    /// dependencies. Returns the surviving root.
    pub fn union(&mut self, a: RegionId, b: RegionId) -> RegionId {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return a;
        }
        let (root, child) = if a < b { (a, b) } else { (b, a) };

        let members = std::mem::take(&mut self.slots[child].members);
        let deps = std::mem::take(&mut self.slots[child].deps);
        self.slots[child].parent = root;

        let slot = &mut self.slots[root];
        slot.members.extend(members);
        slot.members.sort_unstable();
        slot.deps.extend(deps);
        slot.deps.remove(&root);
        slot.deps.remove(&child);
        root
    }

    /// Root region ids in ascending order
    pub fn roots(&self) -> impl Iterator<Item = RegionId> + '_ {
        (0..self.slots.len()).filter(move |&id| self.is_root(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_keeps_lower_root() {
        let mut arena = RegionArena::new();
        for i in 0..3 {
            arena.push(i, true);
        }

        assert_eq!(arena.union(2, 1), 1);
        assert_eq!(arena.union(1, 0), 0);
        assert_eq!(arena.find(2), 0);
        assert_eq!(arena.members(0), &[0, 1, 2]);
        assert!(arena.members(2).is_empty());
        assert_eq!(arena.roots().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_can_merge_rejects_path_through_other_region() {
        // 0 -> 1 -> 2 and 0 -> 2
        let mut arena = RegionArena::new();
        for i in 0..3 {
            arena.push(i, i != 1);
        }
        arena.add_deps(1, [0]);
        arena.add_deps(2, [0, 1]);

        assert!(!arena.can_merge(0, 2));
        assert!(arena.can_merge(0, 1));
        assert!(arena.can_merge(1, 2));
    }

    #[test]
    fn test_dependencies_follow_merges() {
        let mut arena = RegionArena::new();
        for i in 0..4 {
            arena.push(i, true);
        }
        arena.add_deps(1, [0]);
        arena.add_deps(3, [2]);

        arena.union(1, 2);
        assert_eq!(arena.direct_deps(3), vec![1]);
        assert_eq!(arena.direct_deps(2), vec![0]);
    }
}
