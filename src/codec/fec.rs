//! Forward error correction layout.
//!
//! The protected stream is `header || payload || crc`. It is split across
//! `D` interleaved Reed–Solomon codewords: stream byte `i` belongs to
//! codeword `i % D`. Parity byte `j` of codeword `c` sits at index
//! `j * D + c` of the parity block, so a burst on the wire is spread over
//! all codewords.

use crate::codec::rs::{ReedSolomon, TooManyErrors};

/// Largest protected stream a small frame may carry.
pub const SMALL_LIMIT: usize = 64;
/// Largest protected stream a single medium codeword may carry.
pub const MEDIUM_LIMIT: usize = 191;
/// Data bytes per large codeword.
pub const LARGE_DATA: usize = 175;

const SMALL_PARITY: usize = 16;
const MEDIUM_PARITY: usize = 32;
const LARGE_PARITY: usize = 48;

/// Size bucket of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    Small,
    Medium,
    Large,
}

/// FEC parameters for one protected length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FecLayout {
    pub bucket: Bucket,
    /// Protected stream length (header + payload + crc)
    pub protected_len: usize,
    /// Interleaved codewords
    pub codewords: usize,
    /// Parity symbols per codeword
    pub parity: usize,
}

impl FecLayout {
    /// Layout for a protected stream of `protected_len` bytes.
    pub fn for_protected(protected_len: usize) -> Self {
        let (bucket, codewords, parity) = if protected_len <= SMALL_LIMIT {
            (Bucket::Small, 1, SMALL_PARITY)
        } else if protected_len <= MEDIUM_LIMIT {
            (Bucket::Medium, 1, MEDIUM_PARITY)
        } else {
            (Bucket::Large, protected_len.div_ceil(LARGE_DATA), LARGE_PARITY)
        };
        Self {
            bucket,
            protected_len,
            codewords,
            parity,
        }
    }

    /// Recover the layout from a frame length.
    ///
    /// Frame length grows strictly with the protected length, so at most
    /// one layout matches.
    pub fn for_frame(frame_len: usize) -> Option<Self> {
        let small = frame_len.checked_sub(SMALL_PARITY)?;
        if small <= SMALL_LIMIT {
            return Some(Self::for_protected(small));
        }
        let medium = frame_len - MEDIUM_PARITY;
        if medium <= MEDIUM_LIMIT {
            return (medium > SMALL_LIMIT).then(|| Self::for_protected(medium));
        }
        let mut codewords = 2;
        while codewords * LARGE_PARITY < frame_len {
            let protected_len = frame_len - codewords * LARGE_PARITY;
            if protected_len > MEDIUM_LIMIT && protected_len.div_ceil(LARGE_DATA) == codewords {
                return Some(Self::for_protected(protected_len));
            }
            codewords += 1;
        }
        None
    }

    pub fn parity_len(&self) -> usize {
        self.codewords * self.parity
    }

    pub fn frame_len(&self) -> usize {
        self.protected_len + self.parity_len()
    }

    /// Parity block for a protected stream.
    pub fn encode(&self, protected: &[u8]) -> Vec<u8> {
        debug_assert_eq!(protected.len(), self.protected_len);
        let rs = ReedSolomon::new(self.parity);
        let mut block = vec![0u8; self.parity_len()];
        for c in 0..self.codewords {
            let data: Vec<u8> = protected.iter().skip(c).step_by(self.codewords).copied().collect();
            for (j, byte) in rs.encode(&data).into_iter().enumerate() {
                block[j * self.codewords + c] = byte;
            }
        }
        block
    }

    /// Repair a protected stream and its parity block in place.
    ///
    /// Returns `(corrected symbols, codewords that needed repair)`, or the
    /// index of the first codeword that could not be repaired.
    pub fn repair(&self, protected: &mut [u8], parity: &mut [u8]) -> Result<(usize, usize), usize> {
        let rs = ReedSolomon::new(self.parity);
        let mut corrected = 0;
        let mut touched = 0;
        for c in 0..self.codewords {
            let data_idx: Vec<usize> = (c..self.protected_len).step_by(self.codewords).collect();
            let parity_idx: Vec<usize> = (0..self.parity).map(|j| j * self.codewords + c).collect();

            let mut word: Vec<u8> = data_idx
                .iter()
                .map(|i| protected[*i])
                .chain(parity_idx.iter().map(|i| parity[*i]))
                .collect();

            match rs.correct(&mut word) {
                Ok(0) => {}
                Ok(n) => {
                    corrected += n;
                    touched += 1;
                    for (k, i) in data_idx.iter().enumerate() {
                        protected[*i] = word[k];
                    }
                    for (k, i) in parity_idx.iter().enumerate() {
                        parity[*i] = word[data_idx.len() + k];
                    }
                }
                Err(TooManyErrors) => return Err(c),
            }
        }
        Ok((corrected, touched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets() {
        assert_eq!(FecLayout::for_protected(40).bucket, Bucket::Small);
        assert_eq!(FecLayout::for_protected(64).parity_len(), 16);
        assert_eq!(FecLayout::for_protected(65).bucket, Bucket::Medium);
        assert_eq!(FecLayout::for_protected(191).frame_len(), 223);
        let large = FecLayout::for_protected(400);
        assert_eq!(large.bucket, Bucket::Large);
        assert_eq!(large.codewords, 3);
        assert_eq!(large.parity_len(), 144);
    }

    #[test]
    fn test_layout_recovered_from_frame_length() {
        for protected_len in 13..3_000 {
            let layout = FecLayout::for_protected(protected_len);
            assert_eq!(FecLayout::for_frame(layout.frame_len()), Some(layout));
        }
    }

    #[test]
    fn test_gap_lengths_match_no_layout() {
        // 81..=96 sit between the small and medium ranges
        assert_eq!(FecLayout::for_frame(90), None);
        assert_eq!(FecLayout::for_frame(5), None);
    }

    #[test]
    fn test_interleaved_burst_repair() {
        let protected: Vec<u8> = (0..600u32).map(|i| (i * 7 + 3) as u8).collect();
        let layout = FecLayout::for_protected(protected.len());
        let parity = layout.encode(&protected);

        let mut damaged = protected.clone();
        let mut damaged_parity = parity.clone();
        for b in damaged.iter_mut().skip(100).take(40) {
            *b ^= 0xa5;
        }
        for b in damaged_parity.iter_mut().take(20) {
            *b ^= 0x11;
        }

        let (corrected, touched) = layout.repair(&mut damaged, &mut damaged_parity).unwrap();
        assert_eq!(corrected, 60);
        assert_eq!(touched, layout.codewords);
        assert_eq!(damaged, protected);
        assert_eq!(damaged_parity, parity);
    }
}
