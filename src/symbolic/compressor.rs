//! Symbolic compressor: intent tree ↔ numeric series.

use crate::core::{RoutingMetadata, SymbolicError};
use crate::intent::node::IntentTree;
use crate::symbolic::packing::{self, NumericSeries};
use crate::symbolic::table::{DefaultSymbolTable, SymbolTable};
use crate::symbolic::tokenizer::{self, Segmentation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Which segmentation was chosen, and why.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionTrace {
    /// Every candidate with its packed length in bytes
    pub candidates: Vec<(Segmentation, usize)>,
    pub chosen: Segmentation,
    /// Two or more candidates had the same packed length
    pub tied: bool,
}

/// Reversible tree compressor. Pure; shareable across threads.
#[derive(Clone)]
pub struct SymbolicCompressor {
    table: Arc<dyn SymbolTable>,
}

impl Default for SymbolicCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolicCompressor {
    /// Compressor with the default symbol table.
    pub fn new() -> Self {
        Self::with_table(Arc::new(DefaultSymbolTable))
    }

    /// Compressor with a custom symbol table.
    pub fn with_table(table: Arc<dyn SymbolTable>) -> Self {
        Self { table }
    }

    pub fn table_id(&self) -> u8 {
        self.table.id()
    }

    /// Compress with default routing metadata.
    pub fn compress(&self, tree: &IntentTree) -> Result<NumericSeries, SymbolicError> {
        self.compress_with_routing(tree, RoutingMetadata::default())
    }

    /// Compress and embed routing metadata.
    pub fn compress_with_routing(
        &self,
        tree: &IntentTree,
        routing: RoutingMetadata,
    ) -> Result<NumericSeries, SymbolicError> {
        self.compress_traced(tree, routing).map(|(series, _)| series)
    }

    /// Compress, returning the segmentation decision as well.
    ///
    /// Both segmentations are equally good descriptions of the tree; the one
    /// with the shorter packed form wins, parent-indexed on an exact tie.
    pub fn compress_traced(
        &self,
        tree: &IntentTree,
        routing: RoutingMetadata,
    ) -> Result<(NumericSeries, CompressionTrace), SymbolicError> {
        let mut segmentations = vec![Segmentation::ParentIndexed];
        if tree.is_preorder() {
            segmentations.push(Segmentation::PreorderArity);
        }

        let mut best: Option<NumericSeries> = None;
        let mut candidates = Vec::with_capacity(segmentations.len());
        let mut chosen = Segmentation::ParentIndexed;
        for segmentation in segmentations {
            let unit = tokenizer::tokenize(tree, self.table.as_ref(), segmentation)?;
            let series = packing::pack(&unit, routing);
            let len = series.packed_len();
            candidates.push((segmentation, len));
            // strict comparison keeps the earlier candidate on ties
            if best.as_ref().map_or(true, |b| len < b.packed_len()) {
                best = Some(series);
                chosen = segmentation;
            }
        }

        let tied = candidates.len() > 1 && candidates.iter().all(|(_, len)| *len == candidates[0].1);
        let trace = CompressionTrace {
            candidates,
            chosen,
            tied,
        };
        debug!(
            resolution = %tree.resolution(),
            nodes = tree.len(),
            chosen = ?trace.chosen,
            candidates = ?trace.candidates,
            tied = trace.tied,
            "compressed intent tree"
        );

        let series = best.ok_or_else(|| SymbolicError::MalformedTree("no segmentation applies".into()))?;
        Ok((series, trace))
    }

    /// Expand a series back into a tree.
    pub fn expand(&self, series: &NumericSeries) -> Result<IntentTree, SymbolicError> {
        let unit = packing::unpack(series)?;
        tokenizer::detokenize(&unit, self.table.as_ref())
    }
}
