//! Derivation search shared by the phrase-based and grammar-based drivers.

pub mod arena;
pub mod bucket;
pub mod frontier;
pub mod phrase;
pub mod stack;

#[cfg(test)]
pub(crate) mod testutil;

pub use arena::{Arena, Node, NodeId, NodeKind, NodeStatus};
pub use bucket::{AddOutcome, Bucket, BucketStats};
pub use frontier::{check_sorted, CubeSource, Frontier};
pub use phrase::decode_phrase;
pub use stack::{CoverageContainer, Stack};

use crate::error::DecodeResult;
use crate::phrase::Sentence;

/// Everything a finished search leaves behind: the node arena and the
/// complete derivations, best score first.
pub struct SearchResult {
    /// The decoded sentence, with any walls the search added.
    pub sentence: Sentence,
    pub arena: Arena,
    /// Representatives of the final stack or top chart cell.
    pub roots: Vec<NodeId>,
    /// Frontier pops over the whole sentence.
    pub pops: usize,
}

impl SearchResult {
    pub fn best(&self) -> Option<NodeId> {
        self.roots.first().copied()
    }

    pub fn best_node(&self) -> DecodeResult<Option<&Node>> {
        self.best().map(|id| self.arena.get(id)).transpose()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
