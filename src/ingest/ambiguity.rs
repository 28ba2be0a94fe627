//! Pluggable ambiguity scoring.

use crate::ingest::event::ModalitySample;

/// Scores how ambiguous a sample is given the samples captured alongside it.
pub trait AmbiguityScorer: Send + Sync {
    /// Return a score in `[0, 1]`; `concurrent` excludes `sample` itself.
    fn score(&self, sample: &ModalitySample, concurrent: &[&ModalitySample]) -> f32;
}

/// Default scorer: device confidence, penalized by disagreement with
/// concurrent samples from other modalities.
#[derive(Clone, Debug)]
pub struct AgreementScorer {
    /// Weight of cross-modal disagreement (0.0 - 1.0)
    pub disagreement_weight: f32,
}

impl Default for AgreementScorer {
    fn default() -> Self {
        Self {
            disagreement_weight: 0.5,
        }
    }
}

impl AmbiguityScorer for AgreementScorer {
    fn score(&self, sample: &ModalitySample, concurrent: &[&ModalitySample]) -> f32 {
        let base = 1.0 - sample.confidence;
        let peers: Vec<f32> = concurrent
            .iter()
            .filter(|peer| peer.modality != sample.modality)
            .map(|peer| (sample.confidence - peer.confidence).abs())
            .collect();

        let disagreement = if peers.is_empty() {
            0.0
        } else {
            peers.iter().sum::<f32>() / peers.len() as f32
        };

        (base + sample.confidence * self.disagreement_weight * disagreement).clamp(0.0, 1.0)
    }
}

/// Scorer that ignores peers; useful when modalities are independent.
#[derive(Clone, Debug, Default)]
pub struct ConfidenceScorer;

impl AmbiguityScorer for ConfidenceScorer {
    fn score(&self, sample: &ModalitySample, _concurrent: &[&ModalitySample]) -> f32 {
        (1.0 - sample.confidence).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::event::Modality;

    #[test]
    fn test_agreeing_modalities_keep_base_score() {
        let scorer = AgreementScorer::default();
        let gaze = ModalitySample::new(Modality::Gaze, 0, vec![0.1], 0.9);
        let touch = ModalitySample::new(Modality::Touch, 5, vec![0.4], 0.9);
        let score = scorer.score(&gaze, &[&touch]);
        assert!((score - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_disagreement_raises_score() {
        let scorer = AgreementScorer::default();
        let gaze = ModalitySample::new(Modality::Gaze, 0, vec![0.1], 0.9);
        let voice = ModalitySample::new(Modality::Voice, 5, vec![0.4], 0.2);
        let alone = scorer.score(&gaze, &[]);
        let contested = scorer.score(&gaze, &[&voice]);
        assert!(contested > alone);
    }

    #[test]
    fn test_same_modality_peers_ignored() {
        let scorer = AgreementScorer::default();
        let a = ModalitySample::new(Modality::Touch, 0, vec![], 0.9);
        let b = ModalitySample::new(Modality::Touch, 1, vec![], 0.1);
        assert!((scorer.score(&a, &[&b]) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_scorer() {
        let sample = ModalitySample::new(Modality::Voice, 0, vec![], 0.25);
        assert!((ConfidenceScorer.score(&sample, &[]) - 0.75).abs() < 1e-6);
    }
}
