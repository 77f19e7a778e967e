//! Stream priority tree and scheduler
//!
//! Implements the dependency tree of RFC 7540 Section 5.3 as an arena keyed
//! by stream ID; the virtual root is stream 0. Nodes hold their parent and
//! an ordered child list, so reparenting is a list splice.
//!
//! Selection is deterministic: siblings are served by smooth weighted
//! round-robin, so over any run of `sum(weights)` picks among continuously
//! ready siblings each one is chosen exactly `weight` times. A stream that is
//! not ready passes its turn down to its subtree.

use super::error::{Error, Result};
use super::stream::StreamId;
use super::CONNECTION_STREAM_ID;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Default stream weight (RFC 7540 Section 5.3.5)
pub const DEFAULT_WEIGHT: u16 = 16;

/// Smallest weight
pub const MIN_WEIGHT: u16 = 1;

/// Largest weight
pub const MAX_WEIGHT: u16 = 256;

const ROOT: StreamId = CONNECTION_STREAM_ID;

/// Priority of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritySpec {
    /// Stream dependency (0 = root)
    pub dependency: StreamId,
    /// Exclusive flag
    pub exclusive: bool,
    /// Weight (1-256)
    pub weight: u16,
}

impl PrioritySpec {
    /// Create a new priority specification
    pub fn new(dependency: StreamId, exclusive: bool, weight: u16) -> Self {
        PrioritySpec {
            dependency,
            exclusive,
            weight,
        }
    }

    /// Create from PRIORITY frame fields, where the weight octet is `weight - 1`
    pub fn from_wire(dependency: StreamId, exclusive: bool, weight: u8) -> Self {
        PrioritySpec::new(dependency, exclusive, weight as u16 + 1)
    }

    /// Weight clamped into 1..=256
    pub fn clamped_weight(&self) -> u16 {
        self.weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
    }
}

impl Default for PrioritySpec {
    fn default() -> Self {
        PrioritySpec::new(ROOT, false, DEFAULT_WEIGHT)
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: StreamId,
    children: Vec<StreamId>,
    weight: u16,
    ready: bool,
    /// Smooth round-robin credit among siblings
    credit: i64,
}

impl Node {
    fn new(parent: StreamId, weight: u16) -> Self {
        Node {
            parent,
            children: Vec::new(),
            weight,
            ready: false,
            credit: 0,
        }
    }
}

/// Priority tree with weighted selection of the next ready stream
#[derive(Debug, Clone)]
pub struct StreamScheduler {
    nodes: HashMap<StreamId, Node>,
    reprioritizations: u64,
}

impl StreamScheduler {
    /// Create an empty tree holding only the root
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT, Node::new(ROOT, DEFAULT_WEIGHT));
        StreamScheduler {
            nodes,
            reprioritizations: 0,
        }
    }

    /// Get number of streams in the tree
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Check if the tree holds no streams
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if a stream is in the tree
    pub fn contains(&self, stream_id: StreamId) -> bool {
        stream_id != ROOT && self.nodes.contains_key(&stream_id)
    }

    /// Number of priority changes applied to existing streams
    pub fn reprioritizations(&self) -> u64 {
        self.reprioritizations
    }

    /// Resolve a requested dependency; unknown parents fall back to the root
    /// with default weight (RFC 7540 Section 5.3.1)
    fn resolve(&self, stream_id: StreamId, spec: PrioritySpec) -> Result<(StreamId, u16)> {
        if stream_id == ROOT {
            return Err(Error::InvalidStreamId(stream_id));
        }
        if spec.dependency == stream_id {
            return Err(Error::Protocol(format!(
                "Stream {} cannot depend on itself",
                stream_id
            )));
        }
        if self.nodes.contains_key(&spec.dependency) {
            Ok((spec.dependency, spec.clamped_weight()))
        } else {
            trace!(stream_id, dependency = spec.dependency, "unknown dependency, using root");
            Ok((ROOT, DEFAULT_WEIGHT))
        }
    }

    fn attach(&mut self, stream_id: StreamId, parent: StreamId, exclusive: bool) {
        let adopted = if exclusive {
            self.nodes
                .get_mut(&parent)
                .map(|p| std::mem::take(&mut p.children))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        for child in &adopted {
            if let Some(node) = self.nodes.get_mut(child) {
                node.parent = stream_id;
            }
        }
        if let Some(node) = self.nodes.get_mut(&stream_id) {
            node.parent = parent;
            node.children.extend(adopted);
        }
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(stream_id);
        }
    }

    fn detach(&mut self, stream_id: StreamId) {
        let Some(parent) = self.nodes.get(&stream_id).map(|n| n.parent) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|&c| c != stream_id);
        }
    }

    /// Check whether `node` lies in the subtree below `ancestor`
    fn is_descendant(&self, node: StreamId, ancestor: StreamId) -> bool {
        let mut current = node;
        // a well-formed tree reaches the root within len() steps
        for _ in 0..self.nodes.len() {
            match self.nodes.get(&current) {
                Some(n) if current != ROOT => {
                    if n.parent == ancestor {
                        return true;
                    }
                    current = n.parent;
                }
                _ => return false,
            }
        }
        false
    }

    /// Add a stream to the tree.
    ///
    /// With `exclusive`, the new stream becomes the sole child of its
    /// dependency and adopts the dependency's previous children in order.
    /// Adding a stream already present reprioritizes it.
    pub fn add_stream(&mut self, stream_id: StreamId, spec: PrioritySpec) -> Result<()> {
        if self.contains(stream_id) {
            return self.update_priority(stream_id, spec);
        }
        let (parent, weight) = self.resolve(stream_id, spec)?;
        self.nodes.insert(stream_id, Node::new(parent, weight));
        self.attach(stream_id, parent, spec.exclusive);
        debug!(
            stream_id,
            parent,
            weight,
            exclusive = spec.exclusive,
            "stream added to priority tree"
        );
        Ok(())
    }

    /// Move a stream to a new dependency and weight.
    ///
    /// If the new dependency currently sits below the stream, it is first
    /// moved up to the stream's old parent so no cycle forms (RFC 7540
    /// Section 5.3.3).
    pub fn update_priority(&mut self, stream_id: StreamId, spec: PrioritySpec) -> Result<()> {
        if !self.contains(stream_id) {
            return self.add_stream(stream_id, spec);
        }
        let (parent, weight) = self.resolve(stream_id, spec)?;
        let old_parent = self.nodes.get(&stream_id).map_or(ROOT, |n| n.parent);

        if self.is_descendant(parent, stream_id) {
            self.detach(parent);
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.parent = old_parent;
            }
            if let Some(p) = self.nodes.get_mut(&old_parent) {
                p.children.push(parent);
            }
            debug!(stream_id, moved = parent, to = old_parent, "dependency cycle resolved");
        }

        self.detach(stream_id);
        if let Some(node) = self.nodes.get_mut(&stream_id) {
            node.weight = weight;
            node.credit = 0;
        }
        self.attach(stream_id, parent, spec.exclusive);
        self.reprioritizations += 1;
        debug!(stream_id, parent, weight, exclusive = spec.exclusive, "stream reprioritized");
        Ok(())
    }

    /// Remove a stream; its children take its place under its parent,
    /// keeping their order and weights
    pub fn remove_stream(&mut self, stream_id: StreamId) {
        if stream_id == ROOT {
            return;
        }
        let Some(node) = self.nodes.remove(&stream_id) else {
            return;
        };

        for child in &node.children {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parent = node.parent;
            }
        }
        if let Some(p) = self.nodes.get_mut(&node.parent) {
            if let Some(pos) = p.children.iter().position(|&c| c == stream_id) {
                p.children.splice(pos..=pos, node.children.iter().copied());
            } else {
                p.children.extend(node.children.iter().copied());
            }
        }
        trace!(stream_id, "stream removed from priority tree");
    }

    /// Mark a stream as having data to send
    pub fn mark_ready(&mut self, stream_id: StreamId) {
        if stream_id == ROOT {
            return;
        }
        if let Some(node) = self.nodes.get_mut(&stream_id) {
            node.ready = true;
        }
    }

    /// Mark a stream as having nothing to send
    pub fn mark_not_ready(&mut self, stream_id: StreamId) {
        if let Some(node) = self.nodes.get_mut(&stream_id) {
            node.ready = false;
        }
    }

    /// Check if a stream is marked ready
    pub fn is_ready(&self, stream_id: StreamId) -> bool {
        self.nodes.get(&stream_id).is_some_and(|n| n.ready)
    }

    /// Check if any stream strictly below `stream_id` is ready
    pub fn has_ready_descendant(&self, stream_id: StreamId) -> bool {
        let Some(node) = self.nodes.get(&stream_id) else {
            return false;
        };
        let mut stack: Vec<StreamId> = node.children.clone();
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.get(&id) {
                if n.ready {
                    return true;
                }
                stack.extend(n.children.iter().copied());
            }
        }
        false
    }

    /// Pick the next stream to serve.
    ///
    /// Starting at the root, chooses among children that are ready or have
    /// a ready descendant; a chosen child that is not itself ready hands the
    /// pick down to its own children. Returns `None` if nothing is ready.
    pub fn get_next_stream(&mut self) -> Option<StreamId> {
        let mut current = ROOT;
        loop {
            let eligible: Vec<StreamId> = self
                .nodes
                .get(&current)?
                .children
                .iter()
                .copied()
                .filter(|&c| self.is_ready(c) || self.has_ready_descendant(c))
                .collect();
            if eligible.is_empty() {
                return None;
            }

            let mut total = 0i64;
            let mut chosen = eligible[0];
            let mut best = i64::MIN;
            for &id in &eligible {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.credit += node.weight as i64;
                    total += node.weight as i64;
                    if node.credit > best {
                        best = node.credit;
                        chosen = id;
                    }
                }
            }
            if let Some(node) = self.nodes.get_mut(&chosen) {
                node.credit -= total;
                if node.ready {
                    return Some(chosen);
                }
            }
            current = chosen;
        }
    }

    /// Get a stream's priority (the exclusive flag is not retained)
    pub fn get_priority(&self, stream_id: StreamId) -> Option<PrioritySpec> {
        if stream_id == ROOT {
            return None;
        }
        self.nodes
            .get(&stream_id)
            .map(|n| PrioritySpec::new(n.parent, false, n.weight))
    }

    /// Get a stream's children in order (0 for the root's)
    pub fn children(&self, stream_id: StreamId) -> Vec<StreamId> {
        self.nodes
            .get(&stream_id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Get a stream's parent
    pub fn parent(&self, stream_id: StreamId) -> Option<StreamId> {
        if stream_id == ROOT {
            return None;
        }
        self.nodes.get(&stream_id).map(|n| n.parent)
    }

    /// Get the number of edges from the root to a stream
    pub fn depth(&self, stream_id: StreamId) -> Option<usize> {
        let mut depth = 0;
        let mut current = stream_id;
        while current != ROOT {
            current = self.nodes.get(&current)?.parent;
            depth += 1;
            if depth > self.nodes.len() {
                return None;
            }
        }
        Some(depth)
    }

    /// List all streams depth-first, heavier siblings first
    pub fn streams_in_order(&self) -> Vec<StreamId> {
        let mut order = Vec::with_capacity(self.len());
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            if id != ROOT {
                order.push(id);
            }
            if let Some(node) = self.nodes.get(&id) {
                let mut children = node.children.clone();
                // stable: equal weights keep insertion order
                children
                    .sort_by_key(|c| std::cmp::Reverse(self.nodes.get(c).map_or(0, |n| n.weight)));
                stack.extend(children.into_iter().rev());
            }
        }
        order
    }
}

impl Default for StreamScheduler {
    fn default() -> Self {
        StreamScheduler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(dependency: StreamId, weight: u16) -> PrioritySpec {
        PrioritySpec::new(dependency, false, weight)
    }

    fn exclusive(dependency: StreamId, weight: u16) -> PrioritySpec {
        PrioritySpec::new(dependency, true, weight)
    }

    #[test]
    fn test_add_stream() {
        let mut tree = StreamScheduler::new();
        tree.add_stream(1, PrioritySpec::default()).unwrap();
        tree.add_stream(3, spec(1, 32)).unwrap();

        assert_eq!(tree.children(0), vec![1]);
        assert_eq!(tree.children(1), vec![3]);
        assert_eq!(tree.parent(3), Some(1));
        assert_eq!(tree.depth(3), Some(2));
        assert_eq!(tree.get_priority(3), Some(spec(1, 32)));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_weight_clamped() {
        let mut tree = StreamScheduler::new();
        tree.add_stream(1, spec(0, 0)).unwrap();
        tree.add_stream(3, spec(0, 1000)).unwrap();
        assert_eq!(tree.get_priority(1).unwrap().weight, 1);
        assert_eq!(tree.get_priority(3).unwrap().weight, 256);
        assert_eq!(PrioritySpec::from_wire(0, false, 255).weight, 256);
    }

    #[test]
    fn test_unknown_dependency_uses_root() {
        let mut tree = StreamScheduler::new();
        tree.add_stream(5, spec(99, 200)).unwrap();
        assert_eq!(tree.get_priority(5), Some(spec(0, DEFAULT_WEIGHT)));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut tree = StreamScheduler::new();
        assert!(matches!(
            tree.add_stream(1, spec(1, 16)),
            Err(Error::Protocol(_))
        ));
        assert!(tree.add_stream(0, spec(0, 16)).is_err());
    }

    #[test]
    fn test_exclusive_add() {
        let mut tree = StreamScheduler::new();
        tree.add_stream(1, spec(0, 16)).unwrap();
        tree.add_stream(3, spec(0, 8)).unwrap();
        tree.add_stream(5, exclusive(0, 16)).unwrap();

        assert_eq!(tree.children(0), vec![5]);
        assert_eq!(tree.children(5), vec![1, 3]);
        assert_eq!(tree.get_priority(3).unwrap().weight, 8);
    }

    #[test]
    fn test_remove_reparents_children() {
        let mut tree = StreamScheduler::new();
        tree.add_stream(1, spec(0, 16)).unwrap();
        tree.add_stream(3, spec(0, 16)).unwrap();
        tree.add_stream(5, spec(1, 16)).unwrap();
        tree.add_stream(7, spec(1, 16)).unwrap();

        tree.remove_stream(1);
        assert_eq!(tree.children(0), vec![5, 7, 3]);
        assert_eq!(tree.parent(7), Some(0));
        assert!(!tree.contains(1));
    }

    #[test]
    fn test_update_priority_resolves_cycle() {
        // 0 -> 1 -> 3 -> 5
        let mut tree = StreamScheduler::new();
        tree.add_stream(1, spec(0, 16)).unwrap();
        tree.add_stream(3, spec(1, 16)).unwrap();
        tree.add_stream(5, spec(3, 16)).unwrap();

        // 1 now depends on its own descendant 5
        tree.update_priority(1, spec(5, 32)).unwrap();
        assert_eq!(tree.parent(5), Some(0));
        assert_eq!(tree.parent(1), Some(5));
        assert_eq!(tree.parent(3), Some(1));
        assert_eq!(tree.get_priority(1).unwrap().weight, 32);
        assert_eq!(tree.reprioritizations(), 1);

        for id in [1, 3, 5] {
            assert!(tree.depth(id).is_some());
        }
    }

    #[test]
    fn test_update_priority_exclusive() {
        let mut tree = StreamScheduler::new();
        tree.add_stream(1, spec(0, 16)).unwrap();
        tree.add_stream(3, spec(0, 16)).unwrap();
        tree.add_stream(5, spec(0, 16)).unwrap();

        tree.update_priority(5, exclusive(1, 16)).unwrap();
        tree.update_priority(3, exclusive(0, 16)).unwrap();
        assert_eq!(tree.children(0), vec![3]);
        assert_eq!(tree.children(3), vec![1]);
        assert_eq!(tree.children(1), vec![5]);
    }

    #[test]
    fn test_no_cycles_after_arbitrary_updates() {
        let mut tree = StreamScheduler::new();
        let ids = [1, 3, 5, 7, 9, 11];
        for (i, &id) in ids.iter().enumerate() {
            let dep = if i == 0 { 0 } else { ids[i - 1] };
            tree.add_stream(id, spec(dep, 16)).unwrap();
        }
        for round in 0..50usize {
            let id = ids[round % ids.len()];
            let dep = ids[(round * 7 + 3) % ids.len()];
            if id != dep {
                let excl = round % 3 == 0;
                tree.update_priority(id, PrioritySpec::new(dep, excl, 16)).unwrap();
            }
            for &id in &ids {
                assert!(tree.depth(id).is_some_and(|d| d <= ids.len()));
            }
        }
        assert_eq!(tree.streams_in_order().len(), ids.len());
    }

    #[test]
    fn test_get_next_stream_none_ready() {
        let mut tree = StreamScheduler::new();
        assert_eq!(tree.get_next_stream(), None);
        tree.add_stream(1, spec(0, 16)).unwrap();
        assert_eq!(tree.get_next_stream(), None);
    }

    #[test]
    fn test_get_next_stream_parent_first() {
        let mut tree = StreamScheduler::new();
        tree.add_stream(1, spec(0, 16)).unwrap();
        tree.add_stream(3, spec(1, 16)).unwrap();
        tree.mark_ready(1);
        tree.mark_ready(3);

        assert_eq!(tree.get_next_stream(), Some(1));
        tree.mark_not_ready(1);
        assert!(tree.has_ready_descendant(1));
        assert_eq!(tree.get_next_stream(), Some(3));
    }

    #[test]
    fn test_weighted_share() {
        let mut tree = StreamScheduler::new();
        tree.add_stream(1, spec(0, 192)).unwrap();
        tree.add_stream(3, spec(0, 64)).unwrap();
        tree.mark_ready(1);
        tree.mark_ready(3);

        let mut counts = HashMap::new();
        for _ in 0..256 * 4 {
            let id = tree.get_next_stream().unwrap();
            *counts.entry(id).or_insert(0) += 1;
        }
        assert_eq!(counts[&1], 768);
        assert_eq!(counts[&3], 256);
    }

    #[test]
    fn test_streams_in_order() {
        let mut tree = StreamScheduler::new();
        tree.add_stream(1, spec(0, 8)).unwrap();
        tree.add_stream(3, spec(0, 32)).unwrap();
        tree.add_stream(5, spec(1, 16)).unwrap();
        tree.add_stream(7, spec(3, 16)).unwrap();

        assert_eq!(tree.streams_in_order(), vec![3, 7, 1, 5]);
    }
}
