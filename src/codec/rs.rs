//! Reed–Solomon over GF(2^8).
//!
//! Systematic code with primitive polynomial 0x11d, generator α = 2 and
//! first consecutive root α^0. A codeword is `data || parity` with the
//! first byte as the highest-degree coefficient; at most 255 bytes.

const PRIMITIVE: u16 = 0x11d;

struct Tables {
    exp: [u8; 512],
    log: [u8; 256],
}

const fn build_tables() -> Tables {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= PRIMITIVE;
        }
        i += 1;
    }
    while i < 512 {
        exp[i] = exp[i - 255];
        i += 1;
    }
    Tables { exp, log }
}

static GF: Tables = build_tables();

/// Longest codeword the field supports.
pub const MAX_CODEWORD: usize = 255;

fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        0
    } else {
        GF.exp[GF.log[a as usize] as usize + GF.log[b as usize] as usize]
    }
}

fn div(a: u8, b: u8) -> u8 {
    debug_assert!(b != 0);
    if a == 0 {
        0
    } else {
        GF.exp[(GF.log[a as usize] as usize + 255 - GF.log[b as usize] as usize) % 255]
    }
}

/// α^power, power taken modulo 255.
fn alpha_pow(power: usize) -> u8 {
    GF.exp[power % 255]
}

/// Evaluate a highest-degree-first polynomial.
fn eval_high_first(poly: &[u8], x: u8) -> u8 {
    poly.iter().fold(0, |acc, coef| mul(acc, x) ^ coef)
}

/// Evaluate a lowest-degree-first polynomial.
fn eval_low_first(poly: &[u8], x: u8) -> u8 {
    poly.iter().rev().fold(0, |acc, coef| mul(acc, x) ^ coef)
}

/// Codeword did not decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TooManyErrors;

/// Encoder/decoder for a fixed number of parity symbols.
#[derive(Clone, Debug)]
pub struct ReedSolomon {
    parity: usize,
    /// Generator polynomial, highest degree first, monic
    generator: Vec<u8>,
}

impl ReedSolomon {
    pub fn new(parity: usize) -> Self {
        let mut generator = vec![1u8];
        for i in 0..parity {
            let root = alpha_pow(i);
            // multiply by (x + α^i)
            let mut next = vec![0u8; generator.len() + 1];
            for (j, coef) in generator.iter().enumerate() {
                next[j] ^= coef;
                next[j + 1] ^= mul(*coef, root);
            }
            generator = next;
        }
        Self { parity, generator }
    }

    pub fn parity_len(&self) -> usize {
        self.parity
    }

    /// Symbols that can be repaired per codeword.
    pub fn capacity(&self) -> usize {
        self.parity / 2
    }

    /// Parity bytes for `data`.
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        debug_assert!(data.len() + self.parity <= MAX_CODEWORD);
        let mut remainder = vec![0u8; self.parity];
        for byte in data {
            let factor = byte ^ remainder[0];
            remainder.rotate_left(1);
            if let Some(last) = remainder.last_mut() {
                *last = 0;
            }
            if factor != 0 {
                for (r, g) in remainder.iter_mut().zip(&self.generator[1..]) {
                    *r ^= mul(*g, factor);
                }
            }
        }
        remainder
    }

    fn syndromes(&self, codeword: &[u8]) -> Vec<u8> {
        (0..self.parity)
            .map(|i| eval_high_first(codeword, alpha_pow(i)))
            .collect()
    }

    /// Repair `codeword` (data followed by parity) in place.
    ///
    /// Returns the number of corrected symbols.
    pub fn correct(&self, codeword: &mut [u8]) -> Result<usize, TooManyErrors> {
        let n = codeword.len();
        if n > MAX_CODEWORD || n < self.parity {
            return Err(TooManyErrors);
        }
        let syndromes = self.syndromes(codeword);
        if syndromes.iter().all(|s| *s == 0) {
            return Ok(0);
        }

        let locator = berlekamp_massey(&syndromes);
        let errors = locator.len() - 1;
        if errors * 2 > self.parity {
            return Err(TooManyErrors);
        }

        // Chien search: power p is an error position when Λ(α^-p) == 0
        let positions: Vec<usize> = (0..n)
            .filter(|p| eval_low_first(&locator, alpha_pow(255 - p % 255)) == 0)
            .collect();
        if positions.len() != errors {
            return Err(TooManyErrors);
        }

        // Ω(x) = S(x)·Λ(x) mod x^parity
        let mut evaluator = vec![0u8; self.parity];
        for (i, s) in syndromes.iter().enumerate() {
            for (j, l) in locator.iter().enumerate() {
                if i + j < self.parity {
                    evaluator[i + j] ^= mul(*s, *l);
                }
            }
        }

        for p in &positions {
            let x = alpha_pow(*p);
            let x_inv = alpha_pow(255 - p % 255);
            // formal derivative keeps the odd-degree terms
            let derivative = locator
                .iter()
                .enumerate()
                .skip(1)
                .step_by(2)
                .fold(0u8, |acc, (i, coef)| acc ^ mul(*coef, pow(x_inv, i - 1)));
            if derivative == 0 {
                return Err(TooManyErrors);
            }
            let magnitude = div(mul(x, eval_low_first(&evaluator, x_inv)), derivative);
            codeword[n - 1 - p] ^= magnitude;
        }

        if self.syndromes(codeword).iter().any(|s| *s != 0) {
            return Err(TooManyErrors);
        }
        Ok(errors)
    }
}

fn pow(x: u8, e: usize) -> u8 {
    if e == 0 {
        return 1;
    }
    if x == 0 {
        return 0;
    }
    GF.exp[(GF.log[x as usize] as usize * e) % 255]
}

/// Error locator Λ(x), lowest degree first, Λ(0) = 1.
fn berlekamp_massey(syndromes: &[u8]) -> Vec<u8> {
    let mut current = vec![1u8];
    let mut previous = vec![1u8];
    let mut length = 0usize;
    let mut shift = 1usize;
    let mut last_discrepancy = 1u8;

    for n in 0..syndromes.len() {
        let mut discrepancy = syndromes[n];
        for i in 1..=length.min(current.len() - 1) {
            discrepancy ^= mul(current[i], syndromes[n - i]);
        }

        if discrepancy == 0 {
            shift += 1;
            continue;
        }

        let scale = div(discrepancy, last_discrepancy);
        let mut next = current.clone();
        if next.len() < previous.len() + shift {
            next.resize(previous.len() + shift, 0);
        }
        for (i, b) in previous.iter().enumerate() {
            next[i + shift] ^= mul(scale, *b);
        }

        if 2 * length <= n {
            length = n + 1 - length;
            previous = std::mem::replace(&mut current, next);
            last_discrepancy = discrepancy;
            shift = 1;
        } else {
            current = next;
            shift += 1;
        }
    }

    current.truncate(length + 1);
    current.resize(length + 1, 0);
    current
}
