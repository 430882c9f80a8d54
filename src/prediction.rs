use tracing::debug;

use crate::eligibility::{check_eligibility, EligibilityResult};
use crate::error::EngineError;
use crate::features::extract_features;
use crate::models::{ApplicantProfile, ApplicationOutcome, ModelScope, ScholarshipCriteria};
use crate::store::{ActiveModelCache, ModelStore};
use crate::training::sigmoid;

pub const PROBABILITY_FLOOR: f64 = 0.10;
pub const PROBABILITY_CEILING: f64 = 0.90;
pub const APPROVAL_NUDGE: f64 = 0.02;
pub const REJECTION_NUDGE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    fn from_probability(p: f64) -> Self {
        let distance = (p - 0.5).abs();
        if distance >= 0.30 {
            Confidence::High
        } else if distance >= 0.10 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Strong,
    Good,
    Moderate,
    Weak,
}

impl Recommendation {
    fn from_probability(p: f64) -> Self {
        if p >= 0.70 {
            Recommendation::Strong
        } else if p >= 0.55 {
            Recommendation::Good
        } else if p >= 0.40 {
            Recommendation::Moderate
        } else {
            Recommendation::Weak
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Strong => "strong match",
            Recommendation::Good => "good match",
            Recommendation::Moderate => "moderate match",
            Recommendation::Weak => "weak match",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FactorContribution {
    pub feature: &'static str,
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryAdjustment {
    pub prior_approvals: usize,
    pub prior_rejections: usize,
    pub delta: f64,
}

#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub probability: f64,
    pub base_probability: f64,
    pub approved: bool,
    pub confidence: Confidence,
    pub recommendation: Recommendation,
    pub model_scope: ModelScope,
    pub contributions: Vec<FactorContribution>,
    pub eligibility: EligibilityResult,
    pub history: HistoryAdjustment,
}

pub struct PredictionService<'a, S: ModelStore> {
    models: &'a ActiveModelCache<S>,
}

impl<'a, S: ModelStore> PredictionService<'a, S> {
    pub fn new(models: &'a ActiveModelCache<S>) -> Self {
        Self { models }
    }

    /// Selects the scholarship's model (global fallback), scores the
    /// applicant, and nudges the probability by their own application
    /// history. `history` is the applicant's prior outcomes as supplied by
    /// the application service.
    pub fn predict(
        &self,
        profile: &ApplicantProfile,
        criteria: &ScholarshipCriteria,
        history: &[ApplicationOutcome],
    ) -> Result<PredictionResult, EngineError> {
        let model = self.models.model_for(criteria.scholarship_id)?;
        debug!(scope = %model.scope, scholarship = %criteria.scholarship_id, "model selected");

        let features = extract_features(profile, criteria, None);
        let mut contributions: Vec<FactorContribution> = features
            .named()
            .map(|(feature, value)| {
                let weight = model.weight(feature);
                FactorContribution {
                    feature,
                    value,
                    weight,
                    contribution: weight * value,
                }
            })
            .collect();

        let z = model.bias + contributions.iter().map(|c| c.contribution).sum::<f64>();
        let base_probability = sigmoid(z);

        contributions.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let prior_approvals = history
            .iter()
            .filter(|o| {
                o.applicant_id == profile.applicant_id
                    && o.status == crate::models::ApplicationStatus::Approved
            })
            .count();
        let prior_rejections = history
            .iter()
            .filter(|o| {
                o.applicant_id == profile.applicant_id
                    && o.status == crate::models::ApplicationStatus::Rejected
            })
            .count();
        let delta =
            APPROVAL_NUDGE * prior_approvals as f64 - REJECTION_NUDGE * prior_rejections as f64;

        let probability =
            (base_probability + delta).clamp(PROBABILITY_FLOOR, PROBABILITY_CEILING);

        Ok(PredictionResult {
            probability,
            base_probability,
            approved: probability >= 0.5,
            confidence: Confidence::from_probability(base_probability),
            recommendation: Recommendation::from_probability(probability),
            model_scope: model.scope,
            contributions,
            eligibility: check_eligibility(profile, criteria),
            history: HistoryAdjustment {
                prior_approvals,
                prior_rejections,
                delta,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TrainedModel, TrainingMetrics, TrainingStats};
    use crate::store::InMemoryModelStore;
    use crate::testutil::{outcome, strong_profile, weak_profile};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn model_with(scope: ModelScope, bias: f64, weights: &[(&str, f64)]) -> TrainedModel {
        TrainedModel {
            id: Uuid::new_v4(),
            scope,
            weights: weights
                .iter()
                .map(|(n, w)| (n.to_string(), *w))
                .collect::<BTreeMap<_, _>>(),
            bias,
            metrics: TrainingMetrics::default(),
            stats: TrainingStats::default(),
            is_active: false,
            created_at: Utc::now(),
        }
    }

    fn criteria() -> ScholarshipCriteria {
        ScholarshipCriteria {
            scholarship_id: Uuid::from_u128(21),
            name: "Test Grant".to_string(),
            max_gwa: Some(2.5),
            max_income: Some(400_000.0),
            ..Default::default()
        }
    }

    #[test]
    fn missing_models_surface_model_unavailable() {
        let cache = ActiveModelCache::new(InMemoryModelStore::new());
        let service = PredictionService::new(&cache);

        let err = service
            .predict(&strong_profile(0), &criteria(), &[])
            .unwrap_err();
        assert!(matches!(err, EngineError::ModelUnavailable { .. }));
    }

    #[test]
    fn stronger_profiles_score_higher() {
        let cache = ActiveModelCache::new(InMemoryModelStore::new());
        cache.activate(model_with(
            ModelScope::Global,
            -1.0,
            &[("gwa_score", 2.0), ("income_match", 1.5)],
        ));
        let service = PredictionService::new(&cache);

        let strong = service.predict(&strong_profile(0), &criteria(), &[]).unwrap();
        let weak = service.predict(&weak_profile(0), &criteria(), &[]).unwrap();
        assert!(strong.probability > weak.probability);
        assert_eq!(strong.model_scope, ModelScope::Global);
    }

    #[test]
    fn probability_is_clamped_after_history_adjustment() {
        let cache = ActiveModelCache::new(InMemoryModelStore::new());
        cache.activate(model_with(ModelScope::Global, 3.0, &[("gwa_score", 5.0)]));
        let service = PredictionService::new(&cache);

        let result = service.predict(&strong_profile(0), &criteria(), &[]).unwrap();
        assert!(result.base_probability > 0.9);
        assert!(result.probability <= PROBABILITY_CEILING);
        assert!(result.probability >= PROBABILITY_FLOOR);

        let cache = ActiveModelCache::new(InMemoryModelStore::new());
        cache.activate(model_with(ModelScope::Global, -3.0, &[("gwa_score", -5.0)]));
        let service = PredictionService::new(&cache);
        let result = service.predict(&strong_profile(0), &criteria(), &[]).unwrap();
        assert!((result.probability - PROBABILITY_FLOOR).abs() < 1e-12);
    }

    #[test]
    fn history_nudges_the_probability() {
        let cache = ActiveModelCache::new(InMemoryModelStore::new());
        cache.activate(model_with(ModelScope::Global, 0.0, &[]));
        let service = PredictionService::new(&cache);

        let profile = strong_profile(0);
        let other = Uuid::from_u128(99);
        let history = vec![
            outcome(other, profile.clone(), true, 0),
            outcome(other, profile.clone(), true, 1),
            outcome(other, profile.clone(), true, 2),
            outcome(other, profile.clone(), false, 3),
            outcome(other, profile.clone(), false, 4),
        ];

        let result = service.predict(&profile, &criteria(), &history).unwrap();
        assert_eq!(result.history.prior_approvals, 3);
        assert_eq!(result.history.prior_rejections, 2);
        assert!((result.history.delta - 0.04).abs() < 1e-12);
        assert!((result.probability - 0.54).abs() < 1e-12);
        assert!((result.base_probability - 0.5).abs() < 1e-12);
    }

    #[test]
    fn someone_elses_history_does_not_count() {
        let cache = ActiveModelCache::new(InMemoryModelStore::new());
        cache.activate(model_with(ModelScope::Global, 0.0, &[]));
        let service = PredictionService::new(&cache);

        let profile = strong_profile(0);
        let stranger = strong_profile(5);
        let history = vec![outcome(Uuid::from_u128(99), stranger, true, 0)];

        let result = service.predict(&profile, &criteria(), &history).unwrap();
        assert_eq!(result.history.prior_approvals, 0);
        assert!((result.probability - 0.5).abs() < 1e-12);
    }

    #[test]
    fn confidence_tracks_the_base_probability() {
        assert_eq!(Confidence::from_probability(0.5), Confidence::Low);
        assert_eq!(Confidence::from_probability(0.62), Confidence::Medium);
        assert_eq!(Confidence::from_probability(0.85), Confidence::High);
        assert_eq!(Confidence::from_probability(0.15), Confidence::High);
    }

    #[test]
    fn recommendation_tiers_follow_thresholds() {
        assert_eq!(Recommendation::from_probability(0.80), Recommendation::Strong);
        assert_eq!(Recommendation::from_probability(0.60), Recommendation::Good);
        assert_eq!(Recommendation::from_probability(0.45), Recommendation::Moderate);
        assert_eq!(Recommendation::from_probability(0.20), Recommendation::Weak);
    }

    #[test]
    fn contributions_are_signed_products_sorted_by_magnitude() {
        let cache = ActiveModelCache::new(InMemoryModelStore::new());
        cache.activate(model_with(
            ModelScope::Global,
            0.0,
            &[("gwa_score", -2.0), ("income_match", 0.5)],
        ));
        let service = PredictionService::new(&cache);

        let result = service.predict(&strong_profile(0), &criteria(), &[]).unwrap();
        let top = &result.contributions[0];
        assert_eq!(top.feature, "gwa_score");
        assert!(top.contribution < 0.0);
        assert!((top.contribution - top.weight * top.value).abs() < 1e-12);
    }

    #[test]
    fn trained_model_flows_through_to_prediction() {
        use crate::training::{TrainingConfig, TrainingEngine};

        let scholarship = criteria();
        let records: Vec<_> = (0..60)
            .map(|i| {
                let approved = i % 2 == 0;
                let profile = if approved { strong_profile(i) } else { weak_profile(i) };
                outcome(scholarship.scholarship_id, profile, approved, i)
            })
            .collect();

        let engine = TrainingEngine::new(TrainingConfig::default());
        let model = engine
            .train_for_scholarship(scholarship.scholarship_id, &scholarship, &records)
            .unwrap();

        let cache = ActiveModelCache::new(InMemoryModelStore::new());
        cache.activate(model);
        let service = PredictionService::new(&cache);

        let strong = service.predict(&strong_profile(0), &scholarship, &[]).unwrap();
        let weak = service.predict(&weak_profile(1), &scholarship, &[]).unwrap();

        assert_eq!(
            strong.model_scope,
            ModelScope::Scholarship(scholarship.scholarship_id)
        );
        assert!(strong.probability > weak.probability);
        for result in [&strong, &weak] {
            assert!(result.probability >= PROBABILITY_FLOOR);
            assert!(result.probability <= PROBABILITY_CEILING);
            assert!(result.base_probability >= 0.0 && result.base_probability <= 1.0);
        }
    }

    #[test]
    fn scholarship_model_wins_over_global() {
        let cache = ActiveModelCache::new(InMemoryModelStore::new());
        let scholarship_scope = ModelScope::Scholarship(criteria().scholarship_id);
        cache.activate(model_with(ModelScope::Global, 0.0, &[]));
        cache.activate(model_with(scholarship_scope, 1.0, &[]));
        let service = PredictionService::new(&cache);

        let result = service.predict(&strong_profile(0), &criteria(), &[]).unwrap();
        assert_eq!(result.model_scope, scholarship_scope);
    }
}
