//! Symbol tables map intent labels to base symbols.

use crate::intent::node::IntentLabel;

/// Largest base symbol a table may assign.
pub const MAX_SYMBOL: u8 = 15;

/// Pluggable label ↔ symbol mapping.
///
/// The table id is recorded in every packed series; expansion fails when
/// the series was produced with a different table.
pub trait SymbolTable: Send + Sync {
    /// Identifier recorded in the series layout word.
    fn id(&self) -> u8;

    /// Base symbol for a label, at most [`MAX_SYMBOL`].
    fn symbol_for(&self, label: IntentLabel) -> u8;

    /// Inverse of [`SymbolTable::symbol_for`].
    fn label_for(&self, symbol: u8) -> Option<IntentLabel>;
}

/// Canonical table: symbol = position in [`IntentLabel::ALL`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSymbolTable;

impl SymbolTable for DefaultSymbolTable {
    fn id(&self) -> u8 {
        1
    }

    fn symbol_for(&self, label: IntentLabel) -> u8 {
        IntentLabel::ALL
            .iter()
            .position(|l| *l == label)
            .map(|p| p as u8)
            .unwrap_or(0)
    }

    fn label_for(&self, symbol: u8) -> Option<IntentLabel> {
        IntentLabel::ALL.get(symbol as usize).copied()
    }
}
