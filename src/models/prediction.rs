use serde::Serialize;
use crate::models::emotion::Emotion;

/// Classified emotion with the model's probability for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    #[serde(rename = "prediction")]
    pub emotion: Emotion,
    pub confidence: f32,
}

impl PredictionResult {
    /// from_probabilities picks the most likely emotion from a probability vector.
    ///
    /// Returns `None` unless the vector holds exactly one value per emotion.
    /// Ties resolve to the lowest index.
    ///
    /// # Arguments
    /// * `probabilities` - &[f32] aligned with `Emotion::index`
    ///
    /// # Returns
    /// * `Option<PredictionResult>`
    pub fn from_probabilities(probabilities: &[f32]) -> Option<Self> {
        if probabilities.len() != Emotion::COUNT {
            return None
        }

        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (idx, p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((idx, p)),
            })?;

        Some(PredictionResult {
            emotion: Emotion::from_index(index)?,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_picks_highest_probability() {
        let result = PredictionResult::from_probabilities(&[0.05, 0.05, 0.1, 0.6, 0.1, 0.05, 0.05]).unwrap();
        assert_eq!(result.emotion, Emotion::Happy);
        assert_eq!(result.confidence, 0.6);
    }

    #[test]
    fn test_argmax_tie_keeps_first() {
        let result = PredictionResult::from_probabilities(&[0.1, 0.3, 0.3, 0.1, 0.1, 0.05, 0.05]).unwrap();
        assert_eq!(result.emotion, Emotion::Disgusted);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        assert!(PredictionResult::from_probabilities(&[0.5; 6]).is_none());
        assert!(PredictionResult::from_probabilities(&[0.1; 8]).is_none());
        assert!(PredictionResult::from_probabilities(&[]).is_none());
    }

    #[test]
    fn test_serializes_to_api_shape() {
        let result = PredictionResult { emotion: Emotion::Sad, confidence: 0.5 };
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json, serde_json::json!({"prediction": "Sad", "confidence": 0.5}));
    }
}
