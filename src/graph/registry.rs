//! Central ownership of operators and graph structure.
//!
//! All structural mutation happens through registry methods with the
//! registry mutex held, which serializes mutations against each other and
//! against delivery: a delivery thread resolving children takes this lock
//! only after releasing any operator lock, so it observes old or new
//! topology, never half an edge.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::graph::operator::{Operator, OPERATOR_TYPES};
use crate::graph::{GraphError, SharedOperator};

/// Default forward-path bound; configurable via `tree.max-depth`.
pub const DEFAULT_MAX_TREE_DEPTH: usize = 12;

/// Settle time after a panic before edges are torn down.
const QUIESCENCE_MS: u64 = 1;

pub type SharedRegistry = Arc<Mutex<Registry>>;

pub struct Registry {
    ops: HashMap<String, SharedOperator>,
    /// Device name -> operator name, so a device is bound at most once.
    input_cache: HashMap<String, String>,
    output_cache: HashMap<String, String>,
    max_tree_depth: usize,
}

pub fn create_shared_registry(max_tree_depth: usize) -> SharedRegistry {
    Arc::new(Mutex::new(Registry::new(max_tree_depth)))
}

impl Registry {
    pub fn new(max_tree_depth: usize) -> Self {
        Registry {
            ops: HashMap::new(),
            input_cache: HashMap::new(),
            output_cache: HashMap::new(),
            max_tree_depth: max_tree_depth.max(1),
        }
    }

    pub fn max_tree_depth(&self) -> usize {
        self.max_tree_depth
    }

    /// Construct one of the driverless operator types. Device-bound types
    /// go through the device-aware creation paths instead.
    pub fn create(
        &mut self,
        type_tag: &str,
        proposed_name: &str,
    ) -> Result<(String, SharedOperator), GraphError> {
        let op = match type_tag {
            "Monitor" => Operator::monitor(proposed_name),
            "ChannelFilter" => Operator::channel_filter(proposed_name),
            "SingleChannelFilter" => Operator::single_channel_filter(proposed_name),
            "Distributor" => Operator::distributor(proposed_name),
            "Transformer" => Operator::transformer(proposed_name),
            "Delay" => Operator::delay(proposed_name),
            "MIDIPlayer" => Operator::midi_player(proposed_name),
            "MIDIInput" | "MIDIOutput" => {
                return Err(GraphError::DeviceRequired(type_tag.to_string()))
            }
            other => return Err(GraphError::UnknownOperatorType(other.to_string())),
        };
        Ok(self.insert(op))
    }

    /// Register an operator under a unique name, auto-suffixing on
    /// collision. Returns the final name and the shared handle.
    pub fn insert(&mut self, mut op: Operator) -> (String, SharedOperator) {
        let name = self.assign_name(op.name());
        op.set_name(name.clone());
        let handle = Arc::new(Mutex::new(op));
        self.ops.insert(name.clone(), handle.clone());
        info!("registered operator {}", name);
        (name, handle)
    }

    /// Collision policy: keep a free name; otherwise strip any trailing
    /// `.suffix` and count up from `.1` until free.
    fn assign_name(&self, proposed: &str) -> String {
        if !self.ops.contains_key(proposed) {
            return proposed.to_string();
        }
        let stem = match proposed.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => proposed,
        };
        let mut counter = 1;
        loop {
            let candidate = format!("{}.{}", stem, counter);
            if !self.ops.contains_key(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    pub fn get(&self, name: &str) -> Result<SharedOperator, GraphError> {
        self.ops
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn operator_types(&self) -> Vec<String> {
        OPERATOR_TYPES.iter().map(|t| t.to_string()).collect()
    }

    /// `(name, type)` pairs, name-sorted.
    pub fn operators(&self) -> Vec<(String, String)> {
        let mut list: Vec<(String, String)> = self
            .ops
            .values()
            .filter_map(|op| {
                let guard = op.lock().ok()?;
                Some((guard.name().to_string(), guard.op_type().to_string()))
            })
            .collect();
        list.sort();
        list
    }

    /// Names of operators with no parents, sorted.
    pub fn roots(&self) -> Vec<String> {
        let mut list: Vec<String> = self
            .ops
            .values()
            .filter_map(|op| {
                let guard = op.lock().ok()?;
                guard.is_root().then(|| guard.name().to_string())
            })
            .collect();
        list.sort();
        list
    }

    /// `name (Type) -> child, child` lines, name-sorted.
    pub fn graph_lines(&self) -> Vec<String> {
        let mut list: Vec<String> = self
            .ops
            .values()
            .filter_map(|op| {
                let guard = op.lock().ok()?;
                Some(format!(
                    "{} ({}) -> [{}]",
                    guard.name(),
                    guard.op_type(),
                    guard.child_names().join(", ")
                ))
            })
            .collect();
        list.sort();
        list
    }

    /// Commit the edge `parent -> child`, enforcing acyclicity by bounded
    /// forward walk. On a depth violation the edge is rolled back and the
    /// graph left unchanged.
    pub fn connect(&self, parent: &str, child: &str) -> Result<(), GraphError> {
        if parent == child {
            return Err(GraphError::CircularConnection {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        let parent_op = self.get(parent)?;
        let child_op = self.get(child)?;

        if let Ok(mut guard) = parent_op.lock() {
            guard.remove_child(child);
            guard.add_child(child);
        }
        if let Ok(mut guard) = child_op.lock() {
            guard.add_parent(parent);
        }

        // Longest root-to-leaf path through the new edge. Both walks are
        // depth-bounded, so a freshly created cycle saturates instead of
        // recursing forever.
        let depth = self.depth_above(parent, 1) + self.depth_below(child, 1);
        if depth > self.max_tree_depth {
            if let Ok(mut guard) = parent_op.lock() {
                guard.remove_child(child);
            }
            if let Ok(mut guard) = child_op.lock() {
                guard.remove_parent(parent);
            }
            return Err(GraphError::TreeDepthExceeded {
                parent: parent.to_string(),
                child: child.to_string(),
                max: self.max_tree_depth,
            });
        }
        debug!("connected {} -> {}", parent, child);
        Ok(())
    }

    /// Longest path from any root down to `name`, in nodes.
    fn depth_above(&self, name: &str, depth: usize) -> usize {
        if depth > self.max_tree_depth {
            return depth;
        }
        let parents = match self.ops.get(name).and_then(|op| op.lock().ok()) {
            Some(guard) => guard.parent_names(),
            None => return depth,
        };
        parents
            .iter()
            .map(|parent| self.depth_above(parent, depth + 1))
            .max()
            .unwrap_or(depth)
    }

    /// Longest path from `name` down to any leaf, in nodes.
    fn depth_below(&self, name: &str, depth: usize) -> usize {
        if depth > self.max_tree_depth {
            return depth;
        }
        let children = match self.ops.get(name).and_then(|op| op.lock().ok()) {
            Some(guard) => guard.child_names(),
            None => return depth,
        };
        children
            .iter()
            .map(|child| self.depth_below(child, depth + 1))
            .max()
            .unwrap_or(depth)
    }

    /// Remove the edge in both directions; tolerant when absent.
    pub fn disconnect(&self, parent: &str, child: &str) -> Result<(), GraphError> {
        let parent_op = self.get(parent)?;
        let child_op = self.get(child)?;
        if let Ok(mut guard) = parent_op.lock() {
            guard.remove_child(child);
        }
        if let Ok(mut guard) = child_op.lock() {
            guard.remove_parent(parent);
        }
        Ok(())
    }

    /// Panic the subtree, then drop the operator's child edges
    /// (non-recursive).
    pub fn disconnect_all(&self, name: &str) -> Result<(), GraphError> {
        self.panic_op(name);
        for child in self.get(name)?.lock().map(|g| g.child_names()).unwrap_or_default() {
            let _ = self.disconnect(name, &child);
        }
        Ok(())
    }

    /// Panic the subtree, then recursively dismantle every edge below.
    pub fn disconnect_tree(&self, name: &str) -> Result<(), GraphError> {
        self.panic_op(name);
        self.disconnect_tree_inner(name);
        Ok(())
    }

    fn disconnect_tree_inner(&self, name: &str) {
        let children = match self.ops.get(name).and_then(|op| op.lock().ok()) {
            Some(guard) => guard.child_names(),
            None => return,
        };
        for child in children {
            let _ = self.disconnect(name, &child);
            self.disconnect_tree_inner(&child);
        }
    }

    /// Drop the operator's parent edges.
    pub fn disconnect_parents(&self, name: &str) -> Result<(), GraphError> {
        for parent in self.get(name)?.lock().map(|g| g.parent_names()).unwrap_or_default() {
            let _ = self.disconnect(&parent, name);
        }
        Ok(())
    }

    /// Recursive panic: each node runs its local panic action, then its
    /// children. Diamonds are visited once.
    pub fn panic_op(&self, name: &str) {
        let mut visited = BTreeSet::new();
        self.panic_walk(name, &mut visited);
    }

    fn panic_walk(&self, name: &str, visited: &mut BTreeSet<String>) {
        if !visited.insert(name.to_string()) {
            return;
        }
        let children = match self.ops.get(name).and_then(|op| op.lock().ok()) {
            Some(mut guard) => {
                guard.panic_local();
                guard.child_names()
            }
            None => return,
        };
        for child in children {
            self.panic_walk(&child, visited);
        }
    }

    /// Panic every root (and thereby everything reachable).
    pub fn panic_all(&self) {
        for root in self.roots() {
            self.panic_op(&root);
        }
    }

    /// Restore every operator's parameters to construction defaults.
    pub fn reset_all(&self) {
        for op in self.ops.values() {
            if let Ok(mut guard) = op.lock() {
                guard.reset();
            }
        }
    }

    /// Panic, short quiescence, full disconnect, close, remove.
    pub fn delete(&mut self, name: &str) -> Result<(), GraphError> {
        let op = self.get(name)?;
        self.panic_op(name);
        thread::sleep(Duration::from_millis(QUIESCENCE_MS));
        let _ = self.disconnect_parents(name);
        let _ = self.disconnect_all(name);
        if let Ok(mut guard) = op.lock() {
            guard.close();
        }
        self.ops.remove(name);
        self.input_cache.retain(|_, v| v != name);
        self.output_cache.retain(|_, v| v != name);
        info!("deleted operator {}", name);
        Ok(())
    }

    /// Panic every root, let in-flight emissions settle, then dismantle and
    /// close everything.
    pub fn clear(&mut self) {
        self.panic_all();
        thread::sleep(Duration::from_millis(QUIESCENCE_MS));
        for op in self.ops.values() {
            if let Ok(mut guard) = op.lock() {
                guard.clear_edges();
                guard.close();
            }
        }
        self.ops.clear();
        self.input_cache.clear();
        self.output_cache.clear();
        info!("registry cleared");
    }

    // Device caches: one operator per bound device.

    pub fn cached_input(&self, device: &str) -> Option<String> {
        self.input_cache.get(device).cloned()
    }

    pub fn cache_input(&mut self, device: &str, op_name: &str) {
        self.input_cache
            .insert(device.to_string(), op_name.to_string());
    }

    pub fn cached_output(&self, device: &str) -> Option<String> {
        self.output_cache.get(device).cloned()
    }

    pub fn cache_output(&mut self, device: &str, op_name: &str) {
        self.output_cache
            .insert(device.to_string(), op_name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_suffix_naming() {
        let mut registry = Registry::new(DEFAULT_MAX_TREE_DEPTH);
        let (a, _) = registry.create("Monitor", "mon").unwrap();
        let (b, _) = registry.create("Monitor", "mon").unwrap();
        let (c, _) = registry.create("Monitor", "mon").unwrap();
        assert_eq!(a, "mon");
        assert_eq!(b, "mon.1");
        assert_eq!(c, "mon.2");
        // A collision on an already-suffixed name counts up from the stem.
        let (d, _) = registry.create("Monitor", "mon.1").unwrap();
        assert_eq!(d, "mon.3");
    }

    #[test]
    fn test_unknown_type() {
        let mut registry = Registry::new(DEFAULT_MAX_TREE_DEPTH);
        assert!(matches!(
            registry.create("Mangler", "x"),
            Err(GraphError::UnknownOperatorType(_))
        ));
        assert!(matches!(
            registry.create("MIDIInput", "x"),
            Err(GraphError::DeviceRequired(_))
        ));
    }

    #[test]
    fn test_connect_symmetry() {
        let mut registry = Registry::new(DEFAULT_MAX_TREE_DEPTH);
        registry.create("Monitor", "a").unwrap();
        registry.create("Monitor", "b").unwrap();
        registry.connect("a", "b").unwrap();

        let a = registry.get("a").unwrap();
        let b = registry.get("b").unwrap();
        assert!(a.lock().unwrap().has_child("b"));
        assert_eq!(b.lock().unwrap().parent_names(), vec!["a"]);

        registry.disconnect("a", "b").unwrap();
        assert!(!a.lock().unwrap().has_child("b"));
        assert!(b.lock().unwrap().is_root());
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut registry = Registry::new(DEFAULT_MAX_TREE_DEPTH);
        registry.create("Monitor", "a").unwrap();
        registry.create("Monitor", "b").unwrap();
        registry.connect("a", "b").unwrap();
        registry.connect("a", "b").unwrap();
        let a = registry.get("a").unwrap();
        assert_eq!(a.lock().unwrap().child_names(), vec!["b"]);
    }

    #[test]
    fn test_cycle_rejected_and_rolled_back() {
        let mut registry = Registry::new(DEFAULT_MAX_TREE_DEPTH);
        for name in ["a", "b", "c"] {
            registry.create("Monitor", name).unwrap();
        }
        registry.connect("a", "b").unwrap();
        registry.connect("b", "c").unwrap();
        let err = registry.connect("c", "a").unwrap_err();
        assert!(matches!(err, GraphError::TreeDepthExceeded { .. }));

        // The failed edge left no trace.
        let a = registry.get("a").unwrap();
        let c = registry.get("c").unwrap();
        assert!(a.lock().unwrap().is_root());
        assert!(!c.lock().unwrap().has_child("a"));
    }

    #[test]
    fn test_self_edge_rejected() {
        let mut registry = Registry::new(DEFAULT_MAX_TREE_DEPTH);
        registry.create("Monitor", "a").unwrap();
        assert!(matches!(
            registry.connect("a", "a"),
            Err(GraphError::CircularConnection { .. })
        ));
    }

    #[test]
    fn test_depth_bound() {
        let mut registry = Registry::new(4);
        for i in 0..6 {
            registry.create("Monitor", &format!("op{}", i)).unwrap();
        }
        registry.connect("op0", "op1").unwrap();
        registry.connect("op1", "op2").unwrap();
        registry.connect("op2", "op3").unwrap();
        // op0..op3 is four levels; adding a fifth exceeds max depth 4.
        assert!(matches!(
            registry.connect("op3", "op4"),
            Err(GraphError::TreeDepthExceeded { .. })
        ));
        let op3 = registry.get("op3").unwrap();
        assert!(op3.lock().unwrap().child_names().is_empty());
    }

    #[test]
    fn test_delete_cleans_edges() {
        let mut registry = Registry::new(DEFAULT_MAX_TREE_DEPTH);
        for name in ["a", "b", "c"] {
            registry.create("Monitor", name).unwrap();
        }
        registry.connect("a", "b").unwrap();
        registry.connect("b", "c").unwrap();
        registry.delete("b").unwrap();

        assert!(!registry.contains("b"));
        let a = registry.get("a").unwrap();
        let c = registry.get("c").unwrap();
        assert!(a.lock().unwrap().child_names().is_empty());
        assert!(c.lock().unwrap().is_root());
    }

    #[test]
    fn test_disconnect_tree() {
        let mut registry = Registry::new(DEFAULT_MAX_TREE_DEPTH);
        for name in ["a", "b", "c", "d"] {
            registry.create("Monitor", name).unwrap();
        }
        registry.connect("a", "b").unwrap();
        registry.connect("b", "c").unwrap();
        registry.connect("b", "d").unwrap();
        registry.disconnect_tree("a").unwrap();

        for name in ["b", "c", "d"] {
            let op = registry.get(name).unwrap();
            assert!(op.lock().unwrap().is_root(), "{} should be a root", name);
        }
        let b = registry.get("b").unwrap();
        assert!(b.lock().unwrap().child_names().is_empty());
    }

    #[test]
    fn test_roots_listing() {
        let mut registry = Registry::new(DEFAULT_MAX_TREE_DEPTH);
        for name in ["a", "b", "c"] {
            registry.create("Monitor", name).unwrap();
        }
        registry.connect("a", "b").unwrap();
        assert_eq!(registry.roots(), vec!["a", "c"]);
    }
}
