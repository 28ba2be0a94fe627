//! Binary codec: numeric series ↔ FEC-protected wire frames.

use crate::codec::fec::FecLayout;
use crate::codec::wire::{body_format, PolicyFlags, WireHeader, WireMessage, CRC_LEN, HEADER_LEN, SCHEMA_VERSION};
use crate::core::config::CodecConfig;
use crate::core::{CodecError, DecodeError, MessageId, PriorityClass, SessionId, Tier, UncorrectableReason};
use crate::monitoring::ProtocolMetrics;
use crate::symbolic::packing::NumericSeries;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Largest payload (prelude + body) a frame may carry.
pub const MAX_PAYLOAD: usize = 1 << 20;

const PRELUDE_LEN: usize = 1 + 8 + 4;

/// Per-message identity supplied by the sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageStamp {
    pub session: SessionId,
    pub sequence: u32,
    /// Extra policy bits; delta and compression bits are set by the codec
    pub flags: PolicyFlags,
}

/// A previously sent message usable as a delta reference.
#[derive(Clone, Copy, Debug)]
pub struct Reference<'a> {
    pub id: MessageId,
    pub series: &'a NumericSeries,
}

/// Result of decoding one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedMessage {
    pub series: NumericSeries,
    pub header: WireHeader,
    pub session: SessionId,
    pub sequence: u32,
    pub id: MessageId,
    pub reference: Option<MessageId>,
    /// `DecodeError::Correctable` when parity repaired the frame
    pub repair: Option<DecodeError>,
}

impl DecodedMessage {
    /// Symbols repaired by parity.
    pub fn corrected_symbols(&self) -> usize {
        match self.repair {
            Some(DecodeError::Correctable {
                corrected_symbols, ..
            }) => corrected_symbols,
            _ => 0,
        }
    }
}

/// Recently decoded messages, oldest evicted first.
#[derive(Clone, Debug)]
pub struct ReferenceCache {
    capacity: usize,
    order: VecDeque<MessageId>,
    entries: HashMap<MessageId, NumericSeries>,
}

impl ReferenceCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: MessageId, series: NumericSeries) {
        if self.entries.insert(id, series).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.entries.remove(&old);
            }
        }
    }

    pub fn get(&self, id: &MessageId) -> Option<&NumericSeries> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stateless frame encoder/decoder.
#[derive(Clone)]
pub struct BinaryCodec {
    config: CodecConfig,
    metrics: Option<Arc<ProtocolMetrics>>,
}

impl BinaryCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    /// Record frame counters in shared protocol metrics.
    pub fn with_metrics(mut self, metrics: Arc<ProtocolMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode a series into a wire message.
    ///
    /// Delta coding against `prior` is used only when the two series are at
    /// least `delta_similarity` alike.
    pub fn encode(
        &self,
        series: &NumericSeries,
        prior: Option<Reference<'_>>,
        stamp: MessageStamp,
    ) -> Result<WireMessage, CodecError> {
        let prior = prior.filter(|p| series.similarity(p.series) >= self.config.delta_similarity);

        let mut format = 0u8;
        let mut body = match prior {
            Some(reference) => {
                format |= body_format::DELTA;
                encode_delta(series.words(), reference.series.words())
            }
            None => encode_words(series.words().iter().copied()),
        };
        let compressed = compress_prepend_size(&body);
        if compressed.len() < body.len() {
            format |= body_format::LZ4;
            body = compressed;
        }

        let mut payload = Vec::with_capacity(PRELUDE_LEN + 8 + body.len());
        payload.push(format);
        payload.extend_from_slice(&stamp.session.0.to_be_bytes());
        payload.extend_from_slice(&stamp.sequence.to_be_bytes());
        if let Some(reference) = prior {
            payload.extend_from_slice(&reference.id.0.to_be_bytes());
        }
        payload.extend_from_slice(&body);
        if payload.len() > MAX_PAYLOAD {
            return Err(CodecError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }

        let routing = series.routing();
        let mut flags = stamp.flags;
        flags.remove(PolicyFlags::DELTA | PolicyFlags::COMPRESSED);
        if prior.is_some() {
            flags.insert(PolicyFlags::DELTA);
        }
        if format & body_format::LZ4 != 0 {
            flags.insert(PolicyFlags::COMPRESSED);
        }
        if routing.priority == PriorityClass::Bypass {
            flags.insert(PolicyFlags::BYPASS);
        }

        let header = WireHeader {
            schema_version: SCHEMA_VERSION,
            flags,
            tier: routing.tier,
            priority: routing.priority,
            payload_len: payload.len() as u32,
        };

        let mut protected = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
        protected.extend_from_slice(&header.to_bytes());
        protected.extend_from_slice(&payload);
        let id = MessageId::digest(&protected);
        let crc = crc32fast::hash(&protected);
        protected.extend_from_slice(&crc.to_be_bytes());

        let layout = FecLayout::for_protected(protected.len());
        let parity = layout.encode(&protected);

        let data_len = protected.len() - CRC_LEN;
        let mut frame = Vec::with_capacity(layout.frame_len());
        frame.extend_from_slice(&protected[..data_len]);
        frame.extend_from_slice(&parity);
        frame.extend_from_slice(&protected[data_len..]);

        if let Some(metrics) = &self.metrics {
            if prior.is_some() {
                metrics.frames_delta.inc();
            } else {
                metrics.frames_full.inc();
            }
        }
        debug!(
            message = %id,
            session = %stamp.session,
            sequence = stamp.sequence,
            words = series.len(),
            payload = payload.len(),
            frame = frame.len(),
            bucket = ?layout.bucket,
            delta = prior.is_some(),
            "encoded wire message"
        );

        Ok(WireMessage::new(
            header,
            stamp.session,
            stamp.sequence,
            prior.map(|p| p.id),
            id,
            frame,
        ))
    }

    /// Decode an encoded message.
    pub fn decode(&self, message: &WireMessage, references: &ReferenceCache) -> Result<DecodedMessage, DecodeError> {
        self.decode_frame(message.frame(), references)
    }

    /// Decode raw frame bytes, repairing them when parity allows.
    pub fn decode_frame(&self, frame: &[u8], references: &ReferenceCache) -> Result<DecodedMessage, DecodeError> {
        let result = self.decode_inner(frame, references);
        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(decoded) => {
                    if let Some(DecodeError::Correctable {
                        corrected_symbols, ..
                    }) = decoded.repair
                    {
                        metrics.frames_correctable.inc();
                        metrics.symbols_corrected.add(corrected_symbols as u64);
                    }
                }
                Err(DecodeError::SchemaMismatch { .. }) => metrics.schema_mismatches.inc(),
                Err(_) => metrics.frames_uncorrectable.inc(),
            }
        }
        if let Err(err) = &result {
            warn!(error = %err, frame = frame.len(), "frame rejected");
        }
        result
    }

    fn decode_inner(&self, frame: &[u8], references: &ReferenceCache) -> Result<DecodedMessage, DecodeError> {
        if frame.len() < HEADER_LEN + PRELUDE_LEN + CRC_LEN {
            return Err(DecodeError::uncorrectable(UncorrectableReason::Truncated));
        }
        let layout = FecLayout::for_frame(frame.len())
            .ok_or_else(|| DecodeError::uncorrectable(UncorrectableReason::LengthMismatch))?;
        if layout.protected_len < HEADER_LEN + PRELUDE_LEN + CRC_LEN {
            return Err(DecodeError::uncorrectable(UncorrectableReason::Truncated));
        }

        let data_len = layout.protected_len - CRC_LEN;
        let crc_start = frame.len() - CRC_LEN;
        let mut protected = Vec::with_capacity(layout.protected_len);
        protected.extend_from_slice(&frame[..data_len]);
        protected.extend_from_slice(&frame[crc_start..]);
        let mut parity = frame[data_len..crc_start].to_vec();

        // An intact frame from an unknown schema is rejected before repair.
        if protected[0] != SCHEMA_VERSION && checksum_matches(&protected) {
            return Err(DecodeError::SchemaMismatch {
                found: protected[0],
                supported: SCHEMA_VERSION,
            });
        }

        let (corrected, codewords) = layout.repair(&mut protected, &mut parity).map_err(|codeword| {
            DecodeError::uncorrectable(UncorrectableReason::TooManyErrors { codeword })
        })?;
        if !checksum_matches(&protected) {
            return Err(DecodeError::uncorrectable(UncorrectableReason::ChecksumMismatch));
        }
        if protected[0] != SCHEMA_VERSION {
            return Err(DecodeError::SchemaMismatch {
                found: protected[0],
                supported: SCHEMA_VERSION,
            });
        }

        let malformed = |msg: &str| DecodeError::uncorrectable(UncorrectableReason::MalformedPayload(msg.to_string()));
        let header = WireHeader::parse(&protected).ok_or_else(|| malformed("unknown tier or priority"))?;
        if header.payload_len as usize != data_len - HEADER_LEN {
            return Err(malformed("payload length disagrees with frame length"));
        }
        let payload = &protected[HEADER_LEN..data_len];
        if payload.len() < PRELUDE_LEN {
            return Err(malformed("payload shorter than prelude"));
        }

        let format = payload[0];
        let session = SessionId(read_u64(&payload[1..9]));
        let sequence = u32::from_be_bytes([payload[9], payload[10], payload[11], payload[12]]);
        let mut offset = PRELUDE_LEN;

        let is_delta = format & body_format::DELTA != 0;
        if is_delta != header.flags.contains(PolicyFlags::DELTA) {
            return Err(malformed("delta flag disagrees with body format"));
        }
        let reference = if is_delta {
            let bytes = payload
                .get(offset..offset + 8)
                .ok_or_else(|| malformed("missing reference id"))?;
            offset += 8;
            Some(MessageId(read_u64(bytes)))
        } else {
            None
        };

        let raw_body = &payload[offset..];
        let body = if format & body_format::LZ4 != 0 {
            if lz4_declared_len(raw_body).map_or(true, |len| len > MAX_PAYLOAD * 8) {
                return Err(malformed("compressed body size out of range"));
            }
            decompress_size_prepended(raw_body).map_err(|e| malformed(&e.to_string()))?
        } else {
            raw_body.to_vec()
        };

        let words = match reference {
            Some(id) => {
                let base = references
                    .get(&id)
                    .ok_or_else(|| DecodeError::uncorrectable(UncorrectableReason::MissingReference(id)))?;
                decode_delta(&body, base.words()).ok_or_else(|| malformed("truncated delta body"))?
            }
            None => decode_words(&body).ok_or_else(|| malformed("truncated body"))?,
        };

        let series = NumericSeries::from_words(words).map_err(|e| malformed(&e.to_string()))?;
        let routing = series.routing();
        if routing.tier != header.tier || routing.priority != header.priority {
            return Err(malformed("header routing disagrees with series"));
        }

        let id = MessageId::digest(&protected[..data_len]);
        let repair = (corrected > 0).then_some(DecodeError::Correctable {
            corrected_symbols: corrected,
            codewords,
        });
        if corrected > 0 {
            debug!(message = %id, corrected, codewords, "frame repaired by parity");
        }

        Ok(DecodedMessage {
            series,
            header,
            session,
            sequence,
            id,
            reference,
            repair,
        })
    }
}

/// Numbers outgoing messages of one session and tracks delta references.
pub struct SessionEncoder {
    codec: BinaryCodec,
    session: SessionId,
    next_sequence: u32,
    /// Last message per tier; deltas never cross tiers
    priors: HashMap<Tier, (MessageId, NumericSeries)>,
}

impl SessionEncoder {
    pub fn new(codec: BinaryCodec, session: SessionId) -> Self {
        Self {
            codec,
            session,
            next_sequence: 0,
            priors: HashMap::new(),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Sequence number the next message will carry.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Encode the next message of the session.
    pub fn encode(&mut self, series: NumericSeries, flags: PolicyFlags) -> Result<WireMessage, CodecError> {
        let tier = series.routing().tier;
        let prior = self.priors.get(&tier).map(|(id, s)| Reference { id: *id, series: s });
        let stamp = MessageStamp {
            session: self.session,
            sequence: self.next_sequence,
            flags,
        };
        let message = self.codec.encode(&series, prior, stamp)?;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.priors.insert(tier, (message.id(), series));
        Ok(message)
    }

    /// Forget delta references, e.g. after a redelivery request.
    pub fn reset_references(&mut self) {
        self.priors.clear();
    }
}

/// Decodes frames of any session, resolving delta references.
pub struct SessionDecoder {
    codec: BinaryCodec,
    references: ReferenceCache,
}

impl SessionDecoder {
    pub fn new(codec: BinaryCodec) -> Self {
        let capacity = codec.config().reference_cache_capacity;
        Self {
            codec,
            references: ReferenceCache::new(capacity),
        }
    }

    pub fn decode(&mut self, frame: &[u8]) -> Result<DecodedMessage, DecodeError> {
        let decoded = self.codec.decode_frame(frame, &self.references)?;
        self.references.insert(decoded.id, decoded.series.clone());
        Ok(decoded)
    }

    pub fn references(&self) -> &ReferenceCache {
        &self.references
    }
}

fn checksum_matches(protected: &[u8]) -> bool {
    let (data, crc) = protected.split_at(protected.len() - CRC_LEN);
    crc32fast::hash(data).to_be_bytes() == crc
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(arr)
}

fn lz4_declared_len(body: &[u8]) -> Option<usize> {
    let bytes: [u8; 4] = body.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes) as usize)
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> Option<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = *bytes.get(*pos)?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}

fn encode_words(words: impl ExactSizeIterator<Item = u64>) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 3 + 2);
    write_varint(&mut out, words.len() as u64);
    for word in words {
        write_varint(&mut out, word);
    }
    out
}

fn decode_words(bytes: &[u8]) -> Option<Vec<u64>> {
    let mut pos = 0;
    let count = usize::try_from(read_varint(bytes, &mut pos)?).ok()?;
    if count > bytes.len() {
        return None;
    }
    let words = (0..count)
        .map(|_| read_varint(bytes, &mut pos))
        .collect::<Option<Vec<u64>>>()?;
    (pos == bytes.len()).then_some(words)
}

fn encode_delta(words: &[u64], base: &[u64]) -> Vec<u8> {
    encode_words(
        words
            .iter()
            .enumerate()
            .map(|(i, w)| w ^ base.get(i).copied().unwrap_or(0)),
    )
}

fn decode_delta(bytes: &[u8], base: &[u64]) -> Option<Vec<u64>> {
    let mut words = decode_words(bytes)?;
    for (i, word) in words.iter_mut().enumerate() {
        *word ^= base.get(i).copied().unwrap_or(0);
    }
    Some(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RoutingMetadata;
    use crate::symbolic::packing::ControlFrame;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn codec() -> BinaryCodec {
        BinaryCodec::new(CodecConfig::default())
    }

    fn stamp(sequence: u32) -> MessageStamp {
        MessageStamp {
            session: SessionId(0xfeed),
            sequence,
            flags: PolicyFlags::REQUIRES_ACK,
        }
    }

    fn control(arg: &str) -> NumericSeries {
        NumericSeries::control(&ControlFrame::new("status", vec![arg.to_string()]), RoutingMetadata::default())
    }

    fn random_text(rng: &mut StdRng, len: usize) -> String {
        (0..len)
            .map(|_| char::from(rng.gen_range(b'0'..=b'z')))
            .collect()
    }

    #[test]
    fn test_varint_roundtrip() {
        let words = vec![0, 1, 127, 128, 300, u64::MAX];
        let bytes = encode_words(words.iter().copied());
        assert_eq!(decode_words(&bytes), Some(words));
        assert_eq!(decode_words(&bytes[..bytes.len() - 1]), None);
    }

    #[test]
    fn test_full_frame_roundtrip() {
        let codec = codec();
        let series = control("agent_7");
        let message = codec.encode(&series, None, stamp(3)).unwrap();
        assert!(!message.is_delta());
        assert!(message.header().flags.contains(PolicyFlags::REQUIRES_ACK));

        let decoded = codec.decode(&message, &ReferenceCache::new(4)).unwrap();
        assert_eq!(decoded.series, series);
        assert_eq!(decoded.sequence, 3);
        assert_eq!(decoded.session, SessionId(0xfeed));
        assert_eq!(decoded.id, message.id());
        assert!(decoded.repair.is_none());
    }

    #[test]
    fn test_session_delta_roundtrip() {
        let metrics = Arc::new(ProtocolMetrics::new());
        let codec = codec().with_metrics(Arc::clone(&metrics));
        let mut encoder = SessionEncoder::new(codec.clone(), SessionId(1));
        let mut decoder = SessionDecoder::new(codec);

        let first = encoder.encode(control("agent_7 verbose"), PolicyFlags::empty()).unwrap();
        let second = encoder.encode(control("agent_8 verbose"), PolicyFlags::empty()).unwrap();
        assert!(!first.is_delta());
        assert!(second.is_delta());
        assert_eq!(second.reference(), Some(first.id()));

        decoder.decode(first.frame()).unwrap();
        let decoded = decoder.decode(second.frame()).unwrap();
        assert_eq!(decoded.series, control("agent_8 verbose"));
        assert_eq!(decoded.sequence, 1);
        assert_eq!(metrics.frames_full.get(), 1);
        assert_eq!(metrics.frames_delta.get(), 1);
    }

    #[test]
    fn test_dissimilar_series_encoded_full() {
        let codec = codec();
        let a = control("a");
        let b = NumericSeries::control(
            &ControlFrame::new("reboot", vec!["x".into(), "y".into(), "z".into()]),
            RoutingMetadata::default(),
        );
        let prior = Reference { id: MessageId(9), series: &a };
        let message = codec.encode(&b, Some(prior), stamp(0)).unwrap();
        assert!(!message.is_delta());
    }

    #[test]
    fn test_missing_reference_requests_redelivery() {
        let codec = codec();
        let mut encoder = SessionEncoder::new(codec.clone(), SessionId(2));
        encoder.encode(control("one"), PolicyFlags::empty()).unwrap();
        let second = encoder.encode(control("two"), PolicyFlags::empty()).unwrap();

        let mut decoder = SessionDecoder::new(codec);
        let err = decoder.decode(second.frame()).unwrap_err();
        assert!(err.requests_redelivery());
        assert!(matches!(
            err,
            DecodeError::Uncorrectable {
                reason: UncorrectableReason::MissingReference(_)
            }
        ));

        encoder.reset_references();
        let third = encoder.encode(control("three"), PolicyFlags::empty()).unwrap();
        assert!(!third.is_delta());
        assert!(decoder.decode(third.frame()).is_ok());
    }

    #[test]
    fn test_burst_in_200_byte_message_is_correctable() {
        let metrics = Arc::new(ProtocolMetrics::new());
        let codec = codec().with_metrics(Arc::clone(&metrics));
        let mut rng = StdRng::seed_from_u64(200);
        let series = control(&random_text(&mut rng, 105));
        let message = codec.encode(&series, None, stamp(0)).unwrap();
        assert!((180..=220).contains(&message.len()), "frame is {} bytes", message.len());

        let mut frame = message.frame().to_vec();
        for b in &mut frame[60..65] {
            *b ^= 0xff;
        }
        let decoded = codec.decode_frame(&frame, &ReferenceCache::new(1)).unwrap();
        assert_eq!(decoded.series, series);
        assert_eq!(
            decoded.repair,
            Some(DecodeError::Correctable {
                corrected_symbols: 5,
                codewords: 1
            })
        );
        assert_eq!(decoded.corrected_symbols(), 5);
        assert_eq!(metrics.frames_correctable.get(), 1);
        assert_eq!(metrics.symbols_corrected.get(), 5);
    }

    #[test]
    fn test_fec_survives_bursts_up_to_three_percent() {
        let codec = codec();
        let references = ReferenceCache::new(1);
        let mut rng = StdRng::seed_from_u64(0x5253);
        let trials = 10_000;
        let mut recovered = 0;

        for i in 0..trials {
            let len = rng.gen_range(0..400);
            let series = control(&random_text(&mut rng, len));
            let message = codec.encode(&series, None, stamp(i)).unwrap();
            let mut frame = message.frame().to_vec();

            let mut budget = frame.len() * 3 / 100;
            while budget > 0 {
                let burst = rng.gen_range(1..=5usize).min(budget);
                let start = rng.gen_range(0..=frame.len() - burst);
                for b in &mut frame[start..start + burst] {
                    *b ^= rng.gen_range(1..=255u8);
                }
                budget -= burst;
            }

            if let Ok(decoded) = codec.decode_frame(&frame, &references) {
                if decoded.series == series {
                    recovered += 1;
                }
            }
        }

        assert!(recovered * 10_000 >= trials * 9_999, "recovered {}/{}", recovered, trials);
    }

    #[test]
    fn test_intact_unknown_schema_rejected_without_repair() {
        let metrics = Arc::new(ProtocolMetrics::new());
        let codec = codec().with_metrics(Arc::clone(&metrics));
        let message = codec.encode(&control("x"), None, stamp(0)).unwrap();
        let mut frame = message.frame().to_vec();

        let layout = FecLayout::for_frame(frame.len()).unwrap();
        let data_len = layout.protected_len - CRC_LEN;
        frame[0] = 9;
        let crc = crc32fast::hash(&frame[..data_len]);
        let crc_start = frame.len() - CRC_LEN;
        frame[crc_start..].copy_from_slice(&crc.to_be_bytes());

        let err = codec.decode_frame(&frame, &ReferenceCache::new(1)).unwrap_err();
        assert_eq!(err, DecodeError::SchemaMismatch { found: 9, supported: 1 });
        assert!(!err.requests_redelivery());
        assert_eq!(metrics.schema_mismatches.get(), 1);
    }

    #[test]
    fn test_corrupted_version_byte_is_repaired() {
        let codec = codec();
        let series = control("x");
        let message = codec.encode(&series, None, stamp(0)).unwrap();
        let mut frame = message.frame().to_vec();
        frame[0] = 9;
        let decoded = codec.decode_frame(&frame, &ReferenceCache::new(1)).unwrap();
        assert_eq!(decoded.series, series);
        assert_eq!(decoded.corrected_symbols(), 1);
    }

    #[test]
    fn test_heavy_corruption_uncorrectable() {
        let metrics = Arc::new(ProtocolMetrics::new());
        let codec = codec().with_metrics(Arc::clone(&metrics));
        let message = codec.encode(&control("agent_7"), None, stamp(0)).unwrap();
        let mut frame = message.frame().to_vec();
        for b in frame.iter_mut().take(30) {
            *b = !*b;
        }
        let err = codec.decode_frame(&frame, &ReferenceCache::new(1)).unwrap_err();
        assert!(err.requests_redelivery());
        assert_eq!(metrics.frames_uncorrectable.get(), 1);
    }

    #[test]
    fn test_truncated_and_odd_length_frames() {
        let codec = codec();
        let refs = ReferenceCache::new(1);
        assert_eq!(
            codec.decode_frame(&[1, 2, 3], &refs),
            Err(DecodeError::uncorrectable(UncorrectableReason::Truncated))
        );
        assert_eq!(
            codec.decode_frame(&[0u8; 90], &refs),
            Err(DecodeError::uncorrectable(UncorrectableReason::LengthMismatch))
        );
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let series = control(&random_text(&mut rng, 2 * MAX_PAYLOAD));
        let err = codec().encode(&series, None, stamp(0)).unwrap_err();
        assert!(matches!(err, CodecError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_bypass_priority_sets_flag() {
        let routing = RoutingMetadata {
            tier: Tier::Strategic,
            priority: PriorityClass::Bypass,
        };
        let series = control("urgent").with_routing(routing);
        let message = codec().encode(&series, None, stamp(0)).unwrap();
        assert!(message.header().flags.contains(PolicyFlags::BYPASS));
        assert_eq!(message.header().tier, Tier::Strategic);
    }

    #[test]
    fn test_reference_cache_evicts_oldest() {
        let mut cache = ReferenceCache::new(2);
        cache.insert(MessageId(1), control("a"));
        cache.insert(MessageId(2), control("b"));
        cache.insert(MessageId(3), control("c"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&MessageId(1)).is_none());
        assert!(cache.get(&MessageId(3)).is_some());
    }
}
