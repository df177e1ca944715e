//! Phrase-based stacks, one per number of covered source words.

use std::collections::HashMap;

use tracing::debug;

use crate::coverage::Coverage;
use crate::error::{DecodeError, DecodeResult};
use crate::settings::SearchSettings;

use super::arena::{Arena, NodeId};
use super::bucket::{AddOutcome, Bucket, BucketStats};

/// Representatives of one stack that share a coverage, best score first.
/// These are the predecessor lists the frontier expands.
#[derive(Debug, Clone)]
pub struct CoverageContainer {
    pub coverage: Coverage,
    pub nodes: Vec<NodeId>,
}

pub struct Stack {
    cardinality: usize,
    bucket: Bucket,
}

impl Stack {
    pub fn new(cardinality: usize, settings: &SearchSettings, keep_arcs: bool) -> Self {
        Self {
            cardinality,
            bucket: Bucket::new(settings.stack_size, settings.beam_width, keep_arcs),
        }
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn len(&self) -> usize {
        self.bucket.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bucket.is_empty()
    }

    pub fn stats(&self) -> BucketStats {
        self.bucket.stats()
    }

    pub fn add(&mut self, arena: &mut Arena, id: NodeId) -> DecodeResult<AddOutcome> {
        self.bucket.add(arena, id)
    }

    pub fn prune(&mut self, arena: &mut Arena) -> DecodeResult<usize> {
        let removed = self.bucket.prune(arena)?;
        let stats = self.bucket.stats();
        debug!(
            stack = self.cardinality,
            size = self.bucket.len(),
            pruned = removed,
            added = stats.added,
            recombined = stats.recombined,
            rejected = stats.rejected,
            "stack closed"
        );
        Ok(removed)
    }

    /// Representatives best first by future score.
    pub fn ranked(&self, arena: &Arena) -> DecodeResult<Vec<NodeId>> {
        self.bucket.sorted(arena)
    }

    /// Representatives best first by score.
    pub fn by_score(&self, arena: &Arena) -> DecodeResult<Vec<NodeId>> {
        self.bucket.sorted_by_score(arena)
    }

    /// Groups the representatives by coverage. Containers come in the order
    /// of their best member.
    pub fn containers(&self, arena: &Arena) -> DecodeResult<Vec<CoverageContainer>> {
        let mut containers: Vec<CoverageContainer> = Vec::new();
        let mut index: HashMap<Coverage, usize> = HashMap::new();
        for id in self.by_score(arena)? {
            let coverage = arena
                .get(id)?
                .coverage()
                .ok_or(DecodeError::DeadPredecessor {
                    span: format!("node {} has no coverage", id.index()),
                })?;
            match index.get(coverage) {
                Some(&i) => containers[i].nodes.push(id),
                None => {
                    index.insert(coverage.clone(), containers.len());
                    containers.push(CoverageContainer {
                        coverage: coverage.clone(),
                        nodes: vec![id],
                    });
                }
            }
        }
        Ok(containers)
    }
}
