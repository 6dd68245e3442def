//! Translation of a verified mastery level into a course grade.

use crate::auth::MasteryMap;

/// Mastery level at which a review counts as complete.
pub const MASTERY_THRESHOLD: f64 = 0.7;

/// A grade ready to be published to the host. `value` is always in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grade {
    pub value: f64,
    pub max_value: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslationError {
    #[error("topic '{0}' not present in mastery map")]
    TopicNotFound(String),

    #[error("mastery value for '{0}' is not a finite number")]
    InvalidMasteryValue(String),
}

/// Rescale the mastery of `topic_id` against [`MASTERY_THRESHOLD`].
pub fn translate(verified: &MasteryMap, topic_id: &str) -> Result<Grade, TranslationError> {
    let mastery = *verified
        .get(topic_id)
        .ok_or_else(|| TranslationError::TopicNotFound(topic_id.to_string()))?;

    if !mastery.is_finite() {
        return Err(TranslationError::InvalidMasteryValue(topic_id.to_string()));
    }

    let value = (mastery / MASTERY_THRESHOLD).clamp(0.0, 1.0);
    Ok(Grade { value, max_value: 1.0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "algebra/multiplication";

    fn grade_for(mastery: f64) -> Result<Grade, TranslationError> {
        let map: MasteryMap = [(TOPIC.to_string(), mastery)].into_iter().collect();
        translate(&map, TOPIC)
    }

    #[test]
    fn threshold_mastery_is_full_marks() {
        assert_eq!(grade_for(0.7).unwrap(), Grade { value: 1.0, max_value: 1.0 });
    }

    #[test]
    fn half_threshold_is_half_marks() {
        let grade = grade_for(0.35).unwrap();
        assert!((grade.value - 0.5).abs() < 1e-12);
        assert_eq!(grade.max_value, 1.0);
    }

    #[test]
    fn out_of_range_mastery_is_clamped() {
        assert_eq!(grade_for(1.4).unwrap().value, 1.0);
        assert_eq!(grade_for(-0.1).unwrap().value, 0.0);
        assert_eq!(grade_for(0.0).unwrap().value, 0.0);
    }

    #[test]
    fn missing_topic_is_reported() {
        let map: MasteryMap = [("invalid_module_id".to_string(), 1.0)].into_iter().collect();
        assert_eq!(
            translate(&map, TOPIC),
            Err(TranslationError::TopicNotFound(TOPIC.to_string()))
        );
        assert_eq!(
            translate(&MasteryMap::new(), TOPIC),
            Err(TranslationError::TopicNotFound(TOPIC.to_string()))
        );
    }

    #[test]
    fn non_finite_mastery_is_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(
                grade_for(bad),
                Err(TranslationError::InvalidMasteryValue(TOPIC.to_string()))
            );
        }
    }
}
