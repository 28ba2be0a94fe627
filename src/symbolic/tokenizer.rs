//! Tree ↔ token sequence.

use crate::core::{Resolution, SymbolicError};
use crate::intent::node::{AffectVector, Confidence, ContextFrame, IntentNode, IntentTree};
use crate::symbolic::table::{SymbolTable, MAX_SYMBOL};
use serde::{Deserialize, Serialize};

/// How tree structure is written into the token stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segmentation {
    /// Each token stores the distance back to its parent
    ParentIndexed,
    /// Tokens are in preorder and store their child count
    PreorderArity,
}

impl Segmentation {
    pub fn code(self) -> u8 {
        match self {
            Segmentation::ParentIndexed => 0,
            Segmentation::PreorderArity => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Segmentation::ParentIndexed),
            1 => Some(Segmentation::PreorderArity),
            _ => None,
        }
    }
}

/// One symbol of the token stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Base symbol from the symbol table
    pub symbol: u8,
    /// Log-scale duration class (1 - 12)
    pub duration_class: u8,
    /// Certainty band (1 - 9)
    pub tone_class: u8,
    /// Parent distance or child count, depending on segmentation
    pub structure: u32,
    pub context: ContextFrame,
    pub affect: AffectVector,
    pub ambiguity: f32,
    pub weight: f32,
}

/// Ordered token sequence for one tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymbolicUnit {
    pub table_id: u8,
    pub resolution: Resolution,
    pub confidence: Confidence,
    pub segmentation: Segmentation,
    pub tokens: Vec<Token>,
}

/// Duration class: 1 below 10 ms, then one class per doubling, capped at 12.
pub fn duration_class(duration_ms: u32) -> u8 {
    let bits = 32 - (duration_ms / 10).leading_zeros();
    (bits + 1).min(12) as u8
}

/// Tone class: 9 for fully certain, 1 for fully ambiguous.
pub fn tone_class(ambiguity: f32) -> u8 {
    1 + ((1.0 - ambiguity.clamp(0.0, 1.0)) * 8.0).round() as u8
}

/// Turn a tree into tokens.
pub fn tokenize(
    tree: &IntentTree,
    table: &dyn SymbolTable,
    segmentation: Segmentation,
) -> Result<SymbolicUnit, SymbolicError> {
    tree.validate()?;
    if segmentation == Segmentation::PreorderArity && !tree.is_preorder() {
        return Err(SymbolicError::MalformedTree(
            "arity segmentation needs preorder node ids".into(),
        ));
    }

    let mut arity = vec![0u32; tree.len()];
    for node in tree.nodes() {
        if let Some(parent) = node.parent {
            arity[parent as usize] += 1;
        }
    }

    let mut tokens = Vec::with_capacity(tree.len());
    for node in tree.nodes() {
        let symbol = table.symbol_for(node.label);
        if symbol > MAX_SYMBOL {
            return Err(SymbolicError::UnknownSymbol(symbol));
        }
        let structure = match segmentation {
            Segmentation::ParentIndexed => node.parent.map_or(0, |p| node.id - p),
            Segmentation::PreorderArity => arity[node.id as usize],
        };
        tokens.push(Token {
            symbol,
            duration_class: duration_class(node.context.duration_ms),
            tone_class: tone_class(node.ambiguity),
            structure,
            context: node.context,
            affect: node.affect,
            ambiguity: node.ambiguity,
            weight: node.weight,
        });
    }

    Ok(SymbolicUnit {
        table_id: table.id(),
        resolution: tree.resolution(),
        confidence: tree.confidence(),
        segmentation,
        tokens,
    })
}

/// Rebuild the tree, checking the redundant classes of every token.
pub fn detokenize(unit: &SymbolicUnit, table: &dyn SymbolTable) -> Result<IntentTree, SymbolicError> {
    if unit.table_id != table.id() {
        return Err(SymbolicError::TableMismatch {
            expected: table.id(),
            found: unit.table_id,
        });
    }

    let parents = match unit.segmentation {
        Segmentation::ParentIndexed => parents_from_offsets(&unit.tokens)?,
        Segmentation::PreorderArity => parents_from_arity(&unit.tokens)?,
    };

    let mut nodes = Vec::with_capacity(unit.tokens.len());
    for (index, (token, parent)) in unit.tokens.iter().zip(parents).enumerate() {
        if token.duration_class != duration_class(token.context.duration_ms)
            || token.tone_class != tone_class(token.ambiguity)
        {
            return Err(SymbolicError::RedundancyMismatch { token: index });
        }
        let label = table
            .label_for(token.symbol)
            .ok_or(SymbolicError::UnknownSymbol(token.symbol))?;
        nodes.push(IntentNode {
            id: index as u32,
            parent,
            label,
            context: token.context,
            affect: token.affect,
            ambiguity: token.ambiguity,
            weight: token.weight,
            resolution: unit.resolution,
        });
    }

    IntentTree::from_parts(unit.resolution, unit.confidence, nodes)
}

fn parents_from_offsets(tokens: &[Token]) -> Result<Vec<Option<u32>>, SymbolicError> {
    tokens
        .iter()
        .enumerate()
        .map(|(index, token)| {
            let index = index as u32;
            match (index, token.structure) {
                (0, 0) => Ok(None),
                (0, _) => Err(SymbolicError::MalformedTree("root token has a parent".into())),
                (_, offset) if offset == 0 || offset > index => Err(SymbolicError::MalformedTree(
                    format!("token {} has parent offset {}", index, offset),
                )),
                (_, offset) => Ok(Some(index - offset)),
            }
        })
        .collect()
}

fn parents_from_arity(tokens: &[Token]) -> Result<Vec<Option<u32>>, SymbolicError> {
    let mut parents = Vec::with_capacity(tokens.len());
    // (node id, children still expected)
    let mut open: Vec<(u32, u32)> = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        let index = index as u32;
        if index == 0 {
            parents.push(None);
        } else {
            while matches!(open.last(), Some((_, 0))) {
                open.pop();
            }
            let top = open.last_mut().ok_or_else(|| {
                SymbolicError::MalformedTree(format!("token {} has no open parent", index))
            })?;
            top.1 -= 1;
            parents.push(Some(top.0));
        }
        open.push((index, token.structure));
    }

    if open.iter().any(|(_, remaining)| *remaining > 0) {
        return Err(SymbolicError::MalformedTree("arity exceeds token count".into()));
    }
    Ok(parents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::node::IntentLabel;
    use crate::symbolic::table::DefaultSymbolTable;

    fn frame(duration_ms: u32) -> ContextFrame {
        ContextFrame {
            window_index: 0,
            start_ms: 0,
            duration_ms,
            event_count: 1,
        }
    }

    fn tree() -> IntentTree {
        let mut tree = IntentTree::with_root(Resolution::Medium, frame(400), AffectVector::neutral(), 0.2);
        let seg = tree.push(0, IntentLabel::Segment, frame(500), AffectVector::neutral(), 0.2, 0.8);
        tree.push(seg, IntentLabel::Attend, frame(40), AffectVector::new(0.1, 0.2, 0.8), 0.2, 0.4);
        tree.push(seg, IntentLabel::Select, frame(0), AffectVector::new(0.3, 0.4, 0.8), 0.2, 0.4);
        tree.push(0, IntentLabel::Idle, frame(500), AffectVector::neutral(), 0.0, 0.0);
        tree
    }

    #[test]
    fn test_classes() {
        assert_eq!(duration_class(0), 1);
        assert_eq!(duration_class(9), 1);
        assert_eq!(duration_class(10), 2);
        assert_eq!(duration_class(40), 4);
        assert_eq!(duration_class(u32::MAX), 12);
        assert_eq!(tone_class(0.0), 9);
        assert_eq!(tone_class(1.0), 1);
    }

    #[test]
    fn test_both_segmentations_invert() {
        let tree = tree();
        for segmentation in [Segmentation::ParentIndexed, Segmentation::PreorderArity] {
            let unit = tokenize(&tree, &DefaultSymbolTable, segmentation).unwrap();
            let back = detokenize(&unit, &DefaultSymbolTable).unwrap();
            assert_eq!(back, tree);
        }
    }

    #[test]
    fn test_arity_structure() {
        let unit = tokenize(&tree(), &DefaultSymbolTable, Segmentation::PreorderArity).unwrap();
        let arity: Vec<u32> = unit.tokens.iter().map(|t| t.structure).collect();
        assert_eq!(arity, vec![2, 2, 0, 0, 0]);
    }

    #[test]
    fn test_redundancy_mismatch_detected() {
        let mut unit = tokenize(&tree(), &DefaultSymbolTable, Segmentation::ParentIndexed).unwrap();
        unit.tokens[2].tone_class = 1;
        assert_eq!(
            detokenize(&unit, &DefaultSymbolTable),
            Err(SymbolicError::RedundancyMismatch { token: 2 })
        );
    }

    #[test]
    fn test_bad_arity_rejected() {
        let mut unit = tokenize(&tree(), &DefaultSymbolTable, Segmentation::PreorderArity).unwrap();
        unit.tokens[0].structure = 5;
        assert!(matches!(
            detokenize(&unit, &DefaultSymbolTable),
            Err(SymbolicError::MalformedTree(_))
        ));
    }
}
