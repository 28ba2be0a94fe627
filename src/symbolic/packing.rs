//! Numeric packing.
//!
//! Series layout (one `u64` per entry):
//!
//! | index | content                                                        |
//! |-------|----------------------------------------------------------------|
//! | 0     | magic `0x5253` and series version                              |
//! | 1     | routing metadata: `tier << 8 \| priority`                      |
//! | 2     | layout: kind, table id, resolution, segmentation, confidence   |
//! | 3     | token count (intent) or string count (control)                 |
//! | 4..   | body                                                           |
//!
//! An intent body holds [`WORDS_PER_TOKEN`] words per token, starting with
//! the symbol word `2^duration · 3^tone · 5^symbol`.

use crate::core::{PriorityClass, Resolution, RoutingMetadata, SymbolicError, Tier};
use crate::intent::node::{ContextFrame, Confidence};
use crate::symbolic::oscillator::Oscillation;
use crate::symbolic::tokenizer::{Segmentation, SymbolicUnit, Token};
use serde::{Deserialize, Serialize};

pub const SERIES_MAGIC: u64 = 0x5253;
pub const SERIES_VERSION: u64 = 1;
const HEADER_WORD: u64 = (SERIES_MAGIC << 16) | SERIES_VERSION;

/// Words before the body.
pub const RESERVED_WORDS: usize = 4;
/// Body words per intent token.
pub const WORDS_PER_TOKEN: usize = 11;

const CONTROL_CHUNK: usize = 7;

/// What a series carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeriesKind {
    /// A packed intent tree
    Intent,
    /// A control command (verb and arguments)
    Control,
}

impl SeriesKind {
    pub fn code(self) -> u64 {
        match self {
            SeriesKind::Intent => 0,
            SeriesKind::Control => 1,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(SeriesKind::Intent),
            1 => Some(SeriesKind::Control),
            _ => None,
        }
    }
}

/// A verb with arguments, carried as a control series.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlFrame {
    pub verb: String,
    pub args: Vec<String>,
}

impl ControlFrame {
    pub fn new(verb: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            verb: verb.into(),
            args,
        }
    }
}

/// Compact integer encoding of a symbolic unit or control frame.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumericSeries {
    words: Vec<u64>,
}

impl NumericSeries {
    /// Wrap raw words after checking the reserved header.
    pub fn from_words(words: Vec<u64>) -> Result<Self, SymbolicError> {
        if words.len() < RESERVED_WORDS {
            return Err(SymbolicError::Truncated {
                expected: RESERVED_WORDS,
                found: words.len(),
            });
        }
        if words[0] != HEADER_WORD {
            return Err(SymbolicError::BadMagic(words[0]));
        }
        decode_routing(words[1])?;
        let kind = words[2] >> 32;
        if SeriesKind::from_code(kind).is_none() {
            return Err(SymbolicError::WrongKind(kind));
        }
        Ok(Self { words })
    }

    /// Pack a control frame.
    pub fn control(frame: &ControlFrame, routing: RoutingMetadata) -> Self {
        let strings = std::iter::once(&frame.verb).chain(frame.args.iter());
        let mut words = vec![
            HEADER_WORD,
            encode_routing(routing),
            SeriesKind::Control.code() << 32,
            (frame.args.len() + 1) as u64,
        ];
        for s in strings {
            let bytes = s.as_bytes();
            words.push(bytes.len() as u64);
            for chunk in bytes.chunks(CONTROL_CHUNK) {
                let mut word = 0u64;
                for b in chunk {
                    word = (word << 8) | u64::from(*b);
                }
                // left-align short chunks so every word holds 7 byte slots
                word <<= 8 * (CONTROL_CHUNK - chunk.len());
                words.push(word);
            }
        }
        Self { words }
    }

    /// Unpack a control frame.
    pub fn control_frame(&self) -> Result<ControlFrame, SymbolicError> {
        if self.kind() != SeriesKind::Control {
            return Err(SymbolicError::WrongKind(self.kind().code()));
        }
        let count = self.words[3] as usize;
        let mut pos = RESERVED_WORDS;
        let mut strings = Vec::new();
        for _ in 0..count {
            let len = *self
                .words
                .get(pos)
                .ok_or_else(|| SymbolicError::MalformedControl("missing string length".into()))?
                as usize;
            pos += 1;
            let chunks = len.div_ceil(CONTROL_CHUNK);
            let body = self
                .words
                .get(pos..pos + chunks)
                .ok_or_else(|| SymbolicError::MalformedControl("string runs past series end".into()))?;
            pos += chunks;

            let mut bytes = Vec::with_capacity(chunks * CONTROL_CHUNK);
            for word in body {
                for slot in (0..CONTROL_CHUNK).rev() {
                    bytes.push((word >> (8 * slot)) as u8);
                }
            }
            bytes.truncate(len);
            let text = String::from_utf8(bytes)
                .map_err(|e| SymbolicError::MalformedControl(e.to_string()))?;
            strings.push(text);
        }
        if pos != self.words.len() {
            return Err(SymbolicError::MalformedControl("trailing words".into()));
        }

        let mut strings = strings.into_iter();
        let verb = strings
            .next()
            .ok_or_else(|| SymbolicError::MalformedControl("missing verb".into()))?;
        Ok(ControlFrame {
            verb,
            args: strings.collect(),
        })
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn into_words(self) -> Vec<u64> {
        self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn kind(&self) -> SeriesKind {
        SeriesKind::from_code(self.words[2] >> 32).unwrap_or(SeriesKind::Intent)
    }

    /// Routing metadata from the reserved word.
    pub fn routing(&self) -> RoutingMetadata {
        decode_routing(self.words[1]).unwrap_or_default()
    }

    /// Copy with the routing word replaced.
    pub fn with_routing(mut self, routing: RoutingMetadata) -> Self {
        self.words[1] = encode_routing(routing);
        self
    }

    /// Bytes needed to write the series as LEB128 varints.
    pub fn packed_len(&self) -> usize {
        self.words.iter().map(|w| varint_len(*w)).sum()
    }

    /// Fraction of positions holding the same word (0.0 - 1.0).
    pub fn similarity(&self, other: &NumericSeries) -> f32 {
        let longest = self.words.len().max(other.words.len());
        if longest == 0 {
            return 1.0;
        }
        let same = self
            .words
            .iter()
            .zip(&other.words)
            .filter(|(a, b)| a == b)
            .count();
        same as f32 / longest as f32
    }
}

/// LEB128 length of one word.
pub fn varint_len(word: u64) -> usize {
    let bits = 64 - word.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

fn encode_routing(routing: RoutingMetadata) -> u64 {
    (u64::from(routing.tier.code()) << 8) | u64::from(routing.priority.code())
}

fn decode_routing(word: u64) -> Result<RoutingMetadata, SymbolicError> {
    if word >> 16 != 0 {
        return Err(SymbolicError::InvalidRouting(word));
    }
    let tier = Tier::from_code((word >> 8) as u16).ok_or(SymbolicError::InvalidRouting(word))?;
    let priority =
        PriorityClass::from_code((word & 0xff) as u8).ok_or(SymbolicError::InvalidRouting(word))?;
    Ok(RoutingMetadata { tier, priority })
}

/// `2^duration · 3^tone · 5^symbol`.
pub fn symbol_word(duration_class: u8, tone_class: u8, symbol: u8) -> u64 {
    2u64.pow(u32::from(duration_class))
        * 3u64.pow(u32::from(tone_class))
        * 5u64.pow(u32::from(symbol))
}

/// Factor a symbol word back into `(duration, tone, symbol)`.
pub fn split_symbol_word(index: usize, word: u64) -> Result<(u8, u8, u8), SymbolicError> {
    let invalid = SymbolicError::InvalidWord { index, word };
    if word == 0 {
        return Err(invalid);
    }
    let mut rest = word;
    let mut exponents = [0u8; 3];
    for (slot, prime) in [2u64, 3, 5].into_iter().enumerate() {
        while rest % prime == 0 {
            rest /= prime;
            exponents[slot] += 1;
        }
    }
    let [duration, tone, symbol] = exponents;
    if rest != 1 || !(1..=12).contains(&duration) || !(1..=9).contains(&tone) || symbol > 15 {
        return Err(invalid);
    }
    Ok((duration, tone, symbol))
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(word: u64) -> i64 {
    ((word >> 1) as i64) ^ -((word & 1) as i64)
}

/// Pack a symbolic unit.
pub fn pack(unit: &SymbolicUnit, routing: RoutingMetadata) -> NumericSeries {
    let layout = (SeriesKind::Intent.code() << 32)
        | (u64::from(unit.table_id) << 24)
        | (u64::from(unit.resolution.code()) << 16)
        | (u64::from(unit.segmentation.code()) << 8)
        | confidence_code(unit.confidence);

    let mut words = Vec::with_capacity(RESERVED_WORDS + unit.tokens.len() * WORDS_PER_TOKEN);
    words.extend([
        HEADER_WORD,
        encode_routing(routing),
        layout,
        unit.tokens.len() as u64,
    ]);

    let mut prev_start = 0u64;
    for token in &unit.tokens {
        let osc = Oscillation::from_affect(&token.affect);
        let delta = token.context.start_ms.wrapping_sub(prev_start) as i64;
        prev_start = token.context.start_ms;
        words.extend([
            symbol_word(token.duration_class, token.tone_class, token.symbol),
            u64::from(token.structure),
            u64::from(token.context.window_index),
            zigzag(delta),
            u64::from(token.context.duration_ms),
            u64::from(token.context.event_count),
            osc.frequency_ratio,
            osc.phase,
            osc.envelope,
            u64::from(token.ambiguity.to_bits()),
            u64::from(token.weight.to_bits()),
        ]);
    }

    NumericSeries { words }
}

/// Unpack an intent series into a symbolic unit.
pub fn unpack(series: &NumericSeries) -> Result<SymbolicUnit, SymbolicError> {
    let words = series.words();
    if series.kind() != SeriesKind::Intent {
        return Err(SymbolicError::WrongKind(series.kind().code()));
    }

    let layout = words[2];
    let invalid_layout = || SymbolicError::InvalidWord {
        index: 2,
        word: layout,
    };
    let table_id = (layout >> 24) as u8;
    let resolution = Resolution::from_code((layout >> 16) as u8).ok_or_else(invalid_layout)?;
    let segmentation = Segmentation::from_code((layout >> 8) as u8).ok_or_else(invalid_layout)?;
    let confidence = confidence_from_code(layout & 0xff).ok_or_else(invalid_layout)?;

    let count = usize::try_from(words[3]).unwrap_or(usize::MAX);
    let expected = count
        .checked_mul(WORDS_PER_TOKEN)
        .and_then(|n| n.checked_add(RESERVED_WORDS))
        .unwrap_or(usize::MAX);
    if words.len() != expected {
        return Err(SymbolicError::Truncated {
            expected,
            found: words.len(),
        });
    }

    let mut tokens = Vec::with_capacity(count);
    let mut prev_start = 0u64;
    for (t, chunk) in words[RESERVED_WORDS..].chunks_exact(WORDS_PER_TOKEN).enumerate() {
        let base = RESERVED_WORDS + t * WORDS_PER_TOKEN;
        let narrow = |offset: usize| -> Result<u32, SymbolicError> {
            u32::try_from(chunk[offset]).map_err(|_| SymbolicError::InvalidWord {
                index: base + offset,
                word: chunk[offset],
            })
        };

        let (duration_class, tone_class, symbol) = split_symbol_word(base, chunk[0])?;
        let start_ms = prev_start.wrapping_add(unzigzag(chunk[3]) as u64);
        prev_start = start_ms;
        let osc = Oscillation {
            frequency_ratio: chunk[6],
            phase: chunk[7],
            envelope: chunk[8],
        };

        tokens.push(Token {
            symbol,
            duration_class,
            tone_class,
            structure: narrow(1)?,
            context: ContextFrame {
                window_index: narrow(2)?,
                start_ms,
                duration_ms: narrow(4)?,
                event_count: narrow(5)?,
            },
            affect: osc.to_affect(),
            ambiguity: f32::from_bits(narrow(9)?),
            weight: f32::from_bits(narrow(10)?),
        });
    }

    Ok(SymbolicUnit {
        table_id,
        resolution,
        confidence,
        segmentation,
        tokens,
    })
}

fn confidence_code(confidence: Confidence) -> u64 {
    match confidence {
        Confidence::Nominal => 0,
        Confidence::Degraded => 1,
    }
}

fn confidence_from_code(code: u64) -> Option<Confidence> {
    match code {
        0 => Some(Confidence::Nominal),
        1 => Some(Confidence::Degraded),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_word_factorization() {
        let word = symbol_word(12, 9, 15);
        assert_eq!(split_symbol_word(0, word).unwrap(), (12, 9, 15));
        assert_eq!(split_symbol_word(0, symbol_word(1, 1, 0)).unwrap(), (1, 1, 0));
    }

    #[test]
    fn test_invalid_symbol_words() {
        assert!(split_symbol_word(4, 0).is_err());
        // factor of 7
        assert!(split_symbol_word(4, symbol_word(1, 1, 1) * 7).is_err());
        // duration class 0
        assert!(split_symbol_word(4, 3 * 5).is_err());
    }

    #[test]
    fn test_zigzag() {
        for v in [0i64, 1, -1, 500, -500, i64::MAX, i64::MIN] {
            assert_eq!(unzigzag(zigzag(v)), v);
        }
        assert_eq!(zigzag(-1), 1);
    }

    #[test]
    fn test_varint_len() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(u64::MAX), 10);
    }

    #[test]
    fn test_routing_word() {
        let routing = RoutingMetadata {
            tier: Tier::Strategic,
            priority: PriorityClass::Bypass,
        };
        let frame = ControlFrame::new("status", vec!["agent_7".into()]);
        let series = NumericSeries::control(&frame, RoutingMetadata::default()).with_routing(routing);
        assert_eq!(series.routing(), routing);
        assert_eq!(decode_routing(0x1_0000), Err(SymbolicError::InvalidRouting(0x1_0000)));
    }

    #[test]
    fn test_control_frame() {
        let frame = ControlFrame::new("status", vec!["agent_7".into(), "verbose mode".into(), String::new()]);
        let series = NumericSeries::control(&frame, RoutingMetadata::default());
        assert_eq!(series.kind(), SeriesKind::Control);
        assert_eq!(series.control_frame().unwrap(), frame);

        let parsed = NumericSeries::from_words(series.words().to_vec()).unwrap();
        assert_eq!(parsed, series);
    }

    #[test]
    fn test_from_words_checks_header() {
        assert!(matches!(
            NumericSeries::from_words(vec![1, 2]),
            Err(SymbolicError::Truncated { expected: 4, found: 2 })
        ));
        assert_eq!(
            NumericSeries::from_words(vec![7, 0x301, 0, 0]),
            Err(SymbolicError::BadMagic(7))
        );
        assert_eq!(
            NumericSeries::from_words(vec![HEADER_WORD, 0x301, 9 << 32, 0]),
            Err(SymbolicError::WrongKind(9))
        );
    }

    #[test]
    fn test_similarity() {
        let a = NumericSeries::control(&ControlFrame::new("ping", vec![]), RoutingMetadata::default());
        let b = NumericSeries::control(&ControlFrame::new("pong", vec![]), RoutingMetadata::default());
        assert_eq!(a.similarity(&a), 1.0);
        let s = a.similarity(&b);
        assert!(s > 0.5 && s < 1.0);
    }
}
