//! Symbolic compression
//!
//! Three reversible stages turn an intent tree into a compact numeric
//! series: tokenization, oscillatory affect encoding and prime-factor
//! numeric packing.

pub mod compressor;
pub mod oscillator;
pub mod packing;
pub mod table;
pub mod tokenizer;

pub use compressor::{CompressionTrace, SymbolicCompressor};
pub use oscillator::Oscillation;
pub use packing::{ControlFrame, NumericSeries, SeriesKind};
pub use table::{DefaultSymbolTable, SymbolTable};
pub use tokenizer::{Segmentation, SymbolicUnit, Token};
