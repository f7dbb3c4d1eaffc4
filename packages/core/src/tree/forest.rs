//! Parent-pointer forest indexing shared by the tree builder and the layout engine.
//!
//! Input is a flat list of `(id, parent_id)` pairs that is supposed to describe a
//! forest but may not:
//!
//! - duplicate ids: the first occurrence wins, later ones are ignored
//! - `parent_id` missing from the list, or equal to the node's own id: the node is a root
//! - cycles: members of a cycle are unreachable from any root; the first such node in
//!   input order is promoted to a root and the cycle is cut there
//!
//! Everything is ordered by input position, so the result never depends on hash map
//! iteration order. Traversal is iterative with an explicit visited set, so deep or
//! malformed inputs cannot overflow the stack or loop.

use std::collections::HashMap;

pub(crate) struct Forest {
    /// Input position of each member (index into the caller's slice)
    pub members: Vec<usize>,
    /// Roots in input order, followed by nodes promoted to break cycles
    pub roots: Vec<usize>,
    /// Tree children of each member, in input order
    pub children: Vec<Vec<usize>>,
    pub depth: Vec<usize>,
    /// Every member exactly once, each parent before its children
    pub preorder: Vec<usize>,
}

impl Forest {
    pub fn build<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut members = Vec::new();
        let mut parents = Vec::new();

        for (position, (id, parent_id)) in entries.into_iter().enumerate() {
            if index.contains_key(id) {
                continue;
            }
            index.insert(id, members.len());
            members.push(position);
            parents.push((id, parent_id));
        }

        let count = members.len();
        let mut declared_children: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut declared_roots = Vec::new();

        for (member, (id, parent_id)) in parents.iter().enumerate() {
            let parent = parent_id
                .filter(|parent| parent != id)
                .and_then(|parent| index.get(parent));
            match parent {
                Some(&parent) => declared_children[parent].push(member),
                None => declared_roots.push(member),
            }
        }

        let mut forest = Forest {
            members,
            roots: Vec::new(),
            children: vec![Vec::new(); count],
            depth: vec![0; count],
            preorder: Vec::with_capacity(count),
        };
        let mut visited = vec![false; count];

        for root in declared_roots {
            forest.walk(root, &declared_children, &mut visited);
        }
        for member in 0..count {
            if !visited[member] {
                forest.walk(member, &declared_children, &mut visited);
            }
        }

        forest
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    fn walk(&mut self, root: usize, declared_children: &[Vec<usize>], visited: &mut [bool]) {
        visited[root] = true;
        self.roots.push(root);

        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            self.preorder.push(current);

            for &child in &declared_children[current] {
                if visited[child] {
                    continue;
                }
                visited[child] = true;
                self.depth[child] = self.depth[current] + 1;
                self.children[current].push(child);
            }
            stack.extend(self.children[current].iter().rev());
        }
    }
}
