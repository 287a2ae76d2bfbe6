//! Fixed-capacity node pool.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::invariant;
use crate::job::JobId;

/// Stable index of a node in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Idle,
    Occupied,
}

/// One compute node. Power is cached and refreshed by node-update events.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub status: NodeStatus,
    pub job: Option<JobId>,
    /// Watts, as of the last node update.
    pub power: f64,
}

/// The cluster's nodes plus a FIFO of idle ones.
#[derive(Debug, Clone)]
pub struct NodePool {
    nodes: Vec<Node>,
    idle: VecDeque<NodeId>,
}

impl NodePool {
    pub fn new(capacity: u32) -> Self {
        let nodes = (0..capacity)
            .map(|i| Node {
                id: NodeId(i),
                status: NodeStatus::Idle,
                job: None,
                power: 0.0,
            })
            .collect();
        Self {
            nodes,
            idle: (0..capacity).map(NodeId).collect(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn idle_count(&self) -> u32 {
        self.idle.len() as u32
    }

    pub fn occupied_count(&self) -> u32 {
        self.capacity() - self.idle_count()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Bind `count` idle nodes to `job`. Returns `None` and leaves the pool
    /// untouched when fewer than `count` nodes are idle.
    pub fn bind(&mut self, job: JobId, count: u32) -> Option<Vec<NodeId>> {
        if count > self.idle_count() {
            return None;
        }
        let bound: Vec<NodeId> = self.idle.drain(..count as usize).collect();
        for id in &bound {
            let node = &mut self.nodes[id.index()];
            invariant!(node.status == NodeStatus::Idle, "{} in idle list but occupied", id);
            node.status = NodeStatus::Occupied;
            node.job = Some(job);
        }
        Some(bound)
    }

    /// Return nodes to the idle list.
    pub fn release(&mut self, ids: &[NodeId]) {
        for id in ids {
            let Some(node) = self.nodes.get_mut(id.index()) else {
                invariant!(false, "release of unknown {}", id);
                continue;
            };
            invariant!(node.status == NodeStatus::Occupied, "release of idle {}", id);
            node.status = NodeStatus::Idle;
            node.job = None;
            self.idle.push_back(*id);
        }
    }

    /// Set the cached power of a node. Idle nodes draw nothing.
    pub fn refresh_power(&mut self, id: NodeId, job_power_per_node: Option<f64>) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.power = match node.status {
                NodeStatus::Occupied => job_power_per_node.unwrap_or(0.0),
                NodeStatus::Idle => 0.0,
            };
        }
    }

    /// Watts drawn by all nodes as of their last update.
    pub fn total_power(&self) -> f64 {
        self.nodes.iter().map(|n| n.power).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_takes_idle_nodes_in_order() {
        let mut pool = NodePool::new(4);
        let a = pool.bind(JobId(0), 3).unwrap();
        assert_eq!(a, vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert_eq!(pool.idle_count(), 1);
        assert!(pool.bind(JobId(1), 2).is_none());
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn release_returns_nodes_and_clears_power() {
        let mut pool = NodePool::new(2);
        let ids = pool.bind(JobId(0), 2).unwrap();
        for id in &ids {
            pool.refresh_power(*id, Some(150.0));
        }
        assert_eq!(pool.total_power(), 300.0);
        pool.release(&ids);
        for id in &ids {
            pool.refresh_power(*id, None);
        }
        assert_eq!(pool.total_power(), 0.0);
        assert_eq!(pool.occupied_count(), 0);
    }
}
