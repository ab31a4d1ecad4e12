//! Explicit worklist traversals over the entity graph
//!
//! The association graph may contain cycles, so every walk carries a visited
//! set. Neighbour expansion is supplied by the caller, which keeps these
//! walks independent of the container and testable on their own.

use std::collections::HashSet;

use crate::errors::Result;
use crate::model::EntityHandle;

/// Every node reachable from `roots`, in discovery order, roots first
///
/// `neighbours` is called once per visited node and decides which edges the
/// walk follows.
pub(crate) fn reachable<F>(roots: &[EntityHandle], mut neighbours: F) -> Result<Vec<EntityHandle>>
where
    F: FnMut(EntityHandle) -> Result<Vec<EntityHandle>>,
{
    let mut visited: HashSet<EntityHandle> = HashSet::new();
    let mut order = Vec::new();
    let mut cursor = 0;

    for &root in roots {
        if visited.insert(root) {
            order.push(root);
        }
    }
    while cursor < order.len() {
        let node = order[cursor];
        cursor += 1;
        for next in neighbours(node)? {
            if visited.insert(next) {
                order.push(next);
            }
        }
    }
    Ok(order)
}

/// Nodes reachable from `root` with every node after all nodes it reaches
///
/// Used where children must be processed before their parent. On a cycle
/// the node first entered wins; the back edge is ignored.
pub(crate) fn post_order<F>(root: EntityHandle, mut neighbours: F) -> Result<Vec<EntityHandle>>
where
    F: FnMut(EntityHandle) -> Result<Vec<EntityHandle>>,
{
    let mut visited: HashSet<EntityHandle> = HashSet::new();
    let mut order = Vec::new();
    // (node, children already pushed)
    let mut stack = vec![(root, false)];
    visited.insert(root);

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        stack.push((node, true));
        let children = neighbours(node)?;
        for child in children.into_iter().rev() {
            if visited.insert(child) {
                stack.push((child, false));
            }
        }
    }
    Ok(order)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::ContainerId;
    use std::collections::HashMap;

    fn graph(edges: &[(u64, u64)]) -> (Vec<EntityHandle>, HashMap<EntityHandle, Vec<EntityHandle>>) {
        let c = ContainerId::next();
        let nodes: Vec<EntityHandle> = (0..6).map(|i| EntityHandle::new(c, i)).collect();
        let mut adj: HashMap<EntityHandle, Vec<EntityHandle>> = HashMap::new();
        for &(a, b) in edges {
            adj.entry(nodes[a as usize])
                .or_default()
                .push(nodes[b as usize]);
        }
        (nodes, adj)
    }

    #[test]
    fn test_reachable_terminates_on_cycles() {
        let (n, adj) = graph(&[(0, 1), (1, 2), (2, 0), (2, 3)]);
        let order = reachable(&[n[0]], |h| Ok(adj.get(&h).cloned().unwrap_or_default())).unwrap();
        assert_eq!(order, vec![n[0], n[1], n[2], n[3]]);
    }

    #[test]
    fn test_post_order_puts_children_first() {
        // 0 -> {1, 2}, 1 -> 3
        let (n, adj) = graph(&[(0, 1), (0, 2), (1, 3)]);
        let order = post_order(n[0], |h| Ok(adj.get(&h).cloned().unwrap_or_default())).unwrap();
        assert_eq!(order, vec![n[3], n[1], n[2], n[0]]);
    }

    #[test]
    fn test_post_order_visits_each_node_once_on_cycle() {
        let (n, adj) = graph(&[(0, 1), (1, 0), (1, 2)]);
        let order = post_order(n[0], |h| Ok(adj.get(&h).cloned().unwrap_or_default())).unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order.last(), Some(&n[0]));
    }

    #[test]
    fn test_neighbour_errors_propagate() {
        let c = ContainerId::next();
        let root = EntityHandle::new(c, 0);
        let result = reachable(&[root], |_| {
            Err(crate::GraphSyncError::Internal {
                message: "boom".to_string(),
            })
        });
        assert!(result.is_err());
    }
}
