//! Storage placement for object content.
//!
//! The gateway only asks where `copies` replicas of an object should go;
//! how nodes are picked is up to the [`PlacementService`].

use std::future::Future;
use std::pin::Pin;

use rand::Rng;
use tracing::debug;

use crate::config::PlacementConfig;
use crate::metadata::record::StorageNode;

/// Async placement contract.
pub trait PlacementService: Send + Sync + 'static {
    /// Choose `copies` storage nodes for an object of `size` bytes.
    fn choose(
        &self,
        size: u64,
        copies: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<StorageNode>>> + Send + '_>>;
}

/// Placement over a fixed node list.
///
/// Walks the nodes round-robin from a random offset, taking at most one
/// node per datacenter before reusing a datacenter.
pub struct StaticPlacement {
    nodes: Vec<StorageNode>,
}

impl StaticPlacement {
    pub fn new(nodes: Vec<StorageNode>) -> Self {
        Self { nodes }
    }

    pub fn from_config(config: &PlacementConfig) -> Self {
        Self::new(config.nodes.clone())
    }

    fn pick(&self, start: usize, copies: usize) -> anyhow::Result<Vec<StorageNode>> {
        if copies > self.nodes.len() {
            anyhow::bail!(
                "not enough storage nodes: {} requested, {} available",
                copies,
                self.nodes.len()
            );
        }

        let order: Vec<usize> = (0..self.nodes.len())
            .map(|i| (start + i) % self.nodes.len())
            .collect();
        let mut chosen: Vec<usize> = Vec::with_capacity(copies);

        for &idx in &order {
            if chosen.len() == copies {
                break;
            }
            let dc = &self.nodes[idx].datacenter;
            if !chosen.iter().any(|&c| &self.nodes[c].datacenter == dc) {
                chosen.push(idx);
            }
        }
        for &idx in &order {
            if chosen.len() == copies {
                break;
            }
            if !chosen.contains(&idx) {
                chosen.push(idx);
            }
        }

        Ok(chosen.into_iter().map(|i| self.nodes[i].clone()).collect())
    }
}

impl PlacementService for StaticPlacement {
    fn choose(
        &self,
        size: u64,
        copies: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<StorageNode>>> + Send + '_>> {
        let start = if self.nodes.is_empty() {
            0
        } else {
            rand::thread_rng().gen_range(0..self.nodes.len())
        };
        Box::pin(async move {
            let nodes = self.pick(start, copies as usize)?;
            debug!(size, copies, nodes = ?nodes, "placement chosen");
            Ok(nodes)
        })
    }
}
