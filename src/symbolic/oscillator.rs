//! Oscillatory affect encoding.
//!
//! Affect becomes the parameters of a periodic carrier:
//! arousal drives the frequency ratio (1.0 - 2.0), valence the phase
//! (0 - π) and dominance the envelope (0.0 - 1.0). Parameters are held in
//! 32.32 fixed point so they pack into integer words without loss beyond
//! f32 precision.

use crate::intent::node::AffectVector;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const FIXED_ONE: f64 = (1u64 << 32) as f64;

/// Fixed-point carrier parameters for one token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Oscillation {
    /// Frequency ratio, 32.32 fixed point
    pub frequency_ratio: u64,
    /// Phase in radians, 32.32 fixed point
    pub phase: u64,
    /// Envelope amplitude, 32.32 fixed point
    pub envelope: u64,
}

impl Oscillation {
    /// Modulate an affect vector.
    pub fn from_affect(affect: &AffectVector) -> Self {
        let frequency = 1.0 + f64::from(affect.arousal.clamp(0.0, 1.0));
        let phase = (f64::from(affect.valence.clamp(-1.0, 1.0)) + 1.0) * PI / 2.0;
        let envelope = f64::from(affect.dominance.clamp(0.0, 1.0));
        Self {
            frequency_ratio: to_fixed(frequency),
            phase: to_fixed(phase),
            envelope: to_fixed(envelope),
        }
    }

    /// Demodulate back to affect.
    pub fn to_affect(&self) -> AffectVector {
        let arousal = from_fixed(self.frequency_ratio) - 1.0;
        let valence = from_fixed(self.phase) * 2.0 / PI - 1.0;
        let dominance = from_fixed(self.envelope);
        AffectVector::new(valence as f32, arousal as f32, dominance as f32)
    }

    /// Carrier amplitude at time `t` (seconds), for inspection and plotting.
    pub fn sample(&self, t: f64) -> f64 {
        from_fixed(self.envelope)
            * (2.0 * PI * from_fixed(self.frequency_ratio) * t + from_fixed(self.phase)).sin()
    }
}

fn to_fixed(value: f64) -> u64 {
    (value * FIXED_ONE).round() as u64
}

fn from_fixed(word: u64) -> f64 {
    word as f64 / FIXED_ONE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affect_survives_modulation() {
        for affect in [
            AffectVector::new(-1.0, 0.0, 0.0),
            AffectVector::new(0.37, 0.91, 0.12),
            AffectVector::new(1.0, 1.0, 1.0),
            AffectVector::neutral(),
        ] {
            let restored = Oscillation::from_affect(&affect).to_affect();
            assert!(restored.approx_eq(&affect, 1e-6), "{:?} -> {:?}", affect, restored);
        }
    }

    #[test]
    fn test_arousal_raises_frequency() {
        let calm = Oscillation::from_affect(&AffectVector::new(0.0, 0.1, 0.5));
        let urgent = Oscillation::from_affect(&AffectVector::new(0.0, 0.9, 0.5));
        assert!(urgent.frequency_ratio > calm.frequency_ratio);
    }

    #[test]
    fn test_sample_bounded_by_envelope() {
        let osc = Oscillation::from_affect(&AffectVector::new(0.2, 0.5, 0.4));
        for i in 0..100 {
            assert!(osc.sample(i as f64 * 0.01).abs() <= 0.4 + 1e-9);
        }
    }
}
