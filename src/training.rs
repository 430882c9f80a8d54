use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::features::{extract_features, ApplicationContext, FEATURE_COUNT, FEATURE_NAMES};
use crate::models::{
    ApplicationOutcome, ApplicationStatus, ModelScope, ScholarshipCriteria, TrainedModel,
    TrainingMetrics, TrainingStats,
};

pub const WEIGHT_LIMIT: f64 = 5.0;
pub const BIAS_LIMIT: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    pub l2: f64,
    pub convergence_loss: f64,
    pub patience: usize,
    pub folds: usize,
    pub seed: u64,
    pub initial_weight: f64,
    pub min_scholarship_samples: usize,
    pub min_global_samples: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_epochs: 300,
            batch_size: 32,
            l2: 0.01,
            convergence_loss: 0.05,
            patience: 25,
            folds: 5,
            seed: 42,
            initial_weight: 0.01,
            min_scholarship_samples: 30,
            min_global_samples: 50,
        }
    }
}

#[derive(Debug, Clone)]
struct Sample {
    features: [f64; FEATURE_COUNT],
    label: f64,
}

pub fn sigmoid(z: f64) -> f64 {
    // clip before exponentiation so extreme dot products stay finite
    let z = z.clamp(-500.0, 500.0);
    1.0 / (1.0 + (-z).exp())
}

fn dot(weights: &[f64; FEATURE_COUNT], features: &[f64; FEATURE_COUNT]) -> f64 {
    weights.iter().zip(features).map(|(w, x)| w * x).sum()
}

/// Inverse-frequency class weights, `total / (2 * count)`, so the minority
/// label pulls gradients as hard as the majority.
fn class_weights(samples: &[Sample]) -> (f64, f64) {
    let total = samples.len() as f64;
    let positives = samples.iter().filter(|s| s.label > 0.5).count().max(1) as f64;
    let negatives = samples.iter().filter(|s| s.label <= 0.5).count().max(1) as f64;
    (total / (2.0 * positives), total / (2.0 * negatives))
}

fn weighted_loss(
    samples: &[Sample],
    weights: &[f64; FEATURE_COUNT],
    bias: f64,
    pos_weight: f64,
    neg_weight: f64,
    l2: f64,
) -> f64 {
    let mut loss = 0.0;
    for sample in samples {
        let p = sigmoid(bias + dot(weights, &sample.features)).clamp(1e-12, 1.0 - 1e-12);
        let cross_entropy = if sample.label > 0.5 {
            -(p.ln()) * pos_weight
        } else {
            -((1.0 - p).ln()) * neg_weight
        };
        loss += cross_entropy;
    }
    let penalty: f64 = weights.iter().map(|w| w * w).sum::<f64>() * 0.5 * l2;
    loss / samples.len() as f64 + penalty
}

#[derive(Debug, Clone)]
struct Fit {
    weights: [f64; FEATURE_COUNT],
    bias: f64,
    loss: f64,
    epochs: usize,
}

/// Mini-batch gradient descent with decaying learning rate, L2, clipping
/// after every update, and best-snapshot early stopping.
fn fit(samples: &[Sample], config: &TrainingConfig, rng: &mut StdRng) -> Fit {
    let (pos_weight, neg_weight) = class_weights(samples);
    let mut weights = [config.initial_weight; FEATURE_COUNT];
    let mut bias = 0.0;
    let mut best = Fit {
        weights,
        bias,
        loss: f64::INFINITY,
        epochs: 0,
    };
    let mut stale_epochs = 0usize;
    let mut order: Vec<usize> = (0..samples.len()).collect();

    for epoch in 0..config.max_epochs {
        let lr = config.learning_rate / (1.0 + 0.001 * epoch as f64);
        order.shuffle(rng);

        for batch in order.chunks(config.batch_size) {
            let mut grad_w = [0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;

            for &index in batch {
                let sample = &samples[index];
                let p = sigmoid(bias + dot(&weights, &sample.features));
                let class_weight = if sample.label > 0.5 {
                    pos_weight
                } else {
                    neg_weight
                };
                let err = class_weight * (p - sample.label);
                for (g, x) in grad_w.iter_mut().zip(sample.features) {
                    *g += err * x;
                }
                grad_b += err;
            }

            let scale = lr / batch.len() as f64;
            for (w, g) in weights.iter_mut().zip(grad_w) {
                *w -= scale * g + lr * config.l2 * *w;
                *w = w.clamp(-WEIGHT_LIMIT, WEIGHT_LIMIT);
            }
            bias = (bias - scale * grad_b).clamp(-BIAS_LIMIT, BIAS_LIMIT);
        }

        let loss = weighted_loss(samples, &weights, bias, pos_weight, neg_weight, config.l2);
        if loss < best.loss {
            best = Fit {
                weights,
                bias,
                loss,
                epochs: epoch + 1,
            };
            stale_epochs = 0;
        } else {
            stale_epochs += 1;
        }

        if loss <= config.convergence_loss {
            debug!(epoch, loss, "converged below loss threshold");
            break;
        }
        if stale_epochs >= config.patience {
            debug!(epoch, best_loss = best.loss, "early stop, no improvement");
            break;
        }
    }

    best
}

#[derive(Debug, Clone, Default)]
struct FoldMetrics {
    accuracy: f64,
    precision: f64,
    recall: f64,
    f1: f64,
    true_positives: u32,
    false_positives: u32,
    true_negatives: u32,
    false_negatives: u32,
}

fn evaluate(samples: &[Sample], weights: &[f64; FEATURE_COUNT], bias: f64) -> FoldMetrics {
    let mut m = FoldMetrics::default();
    for sample in samples {
        let predicted = sigmoid(bias + dot(weights, &sample.features)) >= 0.5;
        let actual = sample.label > 0.5;
        match (predicted, actual) {
            (true, true) => m.true_positives += 1,
            (true, false) => m.false_positives += 1,
            (false, false) => m.true_negatives += 1,
            (false, true) => m.false_negatives += 1,
        }
    }

    let total = samples.len() as f64;
    let tp = f64::from(m.true_positives);
    let fp = f64::from(m.false_positives);
    let fn_ = f64::from(m.false_negatives);

    m.accuracy = (tp + f64::from(m.true_negatives)) / total.max(1.0);
    m.precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
    m.recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
    m.f1 = if m.precision + m.recall > 0.0 {
        2.0 * m.precision * m.recall / (m.precision + m.recall)
    } else {
        0.0
    };
    m
}

pub struct TrainingEngine {
    config: TrainingConfig,
}

impl TrainingEngine {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Trains on every terminal application across all scholarships.
    /// Records whose scholarship criteria are not supplied cannot be
    /// featurized and are dropped with a warning.
    pub fn train_global(
        &self,
        outcomes: &[ApplicationOutcome],
        criteria_by_scholarship: &HashMap<Uuid, ScholarshipCriteria>,
    ) -> Result<TrainedModel, EngineError> {
        let mut samples = Vec::new();
        for outcome in outcomes {
            if !outcome.status.is_terminal() {
                continue;
            }
            let Some(criteria) = criteria_by_scholarship.get(&outcome.scholarship_id) else {
                warn!(
                    scholarship_id = %outcome.scholarship_id,
                    "dropping outcome with unknown scholarship"
                );
                continue;
            };
            samples.push(to_sample(outcome, criteria));
        }

        self.train_scope(ModelScope::Global, samples, self.config.min_global_samples)
    }

    /// Trains on the terminal applications of a single scholarship.
    pub fn train_for_scholarship(
        &self,
        scholarship_id: Uuid,
        criteria: &ScholarshipCriteria,
        outcomes: &[ApplicationOutcome],
    ) -> Result<TrainedModel, EngineError> {
        let samples: Vec<Sample> = outcomes
            .iter()
            .filter(|o| o.scholarship_id == scholarship_id && o.status.is_terminal())
            .map(|o| to_sample(o, criteria))
            .collect();

        self.train_scope(
            ModelScope::Scholarship(scholarship_id),
            samples,
            self.config.min_scholarship_samples,
        )
    }

    fn train_scope(
        &self,
        scope: ModelScope,
        mut samples: Vec<Sample>,
        minimum: usize,
    ) -> Result<TrainedModel, EngineError> {
        if samples.len() < minimum {
            return Err(EngineError::InsufficientData {
                scope,
                actual: samples.len(),
                required: minimum,
            });
        }

        let positives = samples.iter().filter(|s| s.label > 0.5).count();
        let negatives = samples.len() - positives;
        info!(
            %scope,
            samples = samples.len(),
            positives,
            negatives,
            seed = self.config.seed,
            "training run started"
        );

        // One PRNG per run, threaded through every shuffle, so identical
        // inputs reproduce identical weights.
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        samples.shuffle(&mut rng);

        let k = self.config.folds.min(samples.len()).max(2);
        let mut fold_fits: Vec<Fit> = Vec::with_capacity(k);
        let mut fold_metrics: Vec<FoldMetrics> = Vec::with_capacity(k);

        for fold in 0..k {
            let (held_out, train_set) = split_fold(&samples, k, fold);
            let result = fit(&train_set, &self.config, &mut rng);
            let metrics = evaluate(&held_out, &result.weights, result.bias);
            info!(
                %scope,
                fold,
                accuracy = metrics.accuracy,
                f1 = metrics.f1,
                loss = result.loss,
                epochs = result.epochs,
                "fold finished"
            );
            fold_fits.push(result);
            fold_metrics.push(metrics);
        }

        let model = assemble_model(
            scope,
            &samples,
            positives,
            negatives,
            &fold_fits,
            &fold_metrics,
            self.config.seed,
        );
        info!(
            %scope,
            accuracy = model.metrics.accuracy,
            accuracy_std = model.metrics.accuracy_std,
            "training run finished"
        );
        Ok(model)
    }
}

fn to_sample(outcome: &ApplicationOutcome, criteria: &ScholarshipCriteria) -> Sample {
    let context = ApplicationContext::from(outcome);
    let features = extract_features(&outcome.snapshot, criteria, Some(&context));
    Sample {
        features: *features.values(),
        label: if outcome.status == ApplicationStatus::Approved {
            1.0
        } else {
            0.0
        },
    }
}

/// Contiguous fold split over the already-shuffled sample slice. The first
/// `len % k` folds absorb the remainder.
fn split_fold(samples: &[Sample], k: usize, fold: usize) -> (Vec<Sample>, Vec<Sample>) {
    let base = samples.len() / k;
    let remainder = samples.len() % k;
    let size = base + usize::from(fold < remainder);
    let start = fold * base + fold.min(remainder);
    let end = start + size;

    let held_out = samples[start..end].to_vec();
    let mut train_set = Vec::with_capacity(samples.len() - size);
    train_set.extend_from_slice(&samples[..start]);
    train_set.extend_from_slice(&samples[end..]);
    (held_out, train_set)
}

fn assemble_model(
    scope: ModelScope,
    samples: &[Sample],
    positives: usize,
    negatives: usize,
    fits: &[Fit],
    metrics: &[FoldMetrics],
    seed: u64,
) -> TrainedModel {
    let k = fits.len() as f64;

    let mut averaged = [0.0f64; FEATURE_COUNT];
    for fit in fits {
        for (avg, w) in averaged.iter_mut().zip(fit.weights) {
            *avg += w / k;
        }
    }
    let bias = fits.iter().map(|f| f.bias).sum::<f64>() / k;

    let mean = |f: fn(&FoldMetrics) -> f64| metrics.iter().map(f).sum::<f64>() / k;
    let mean_accuracy = mean(|m| m.accuracy);
    let accuracy_std = (metrics
        .iter()
        .map(|m| (m.accuracy - mean_accuracy).powi(2))
        .sum::<f64>()
        / k)
        .sqrt();

    let weights: BTreeMap<String, f64> = FEATURE_NAMES
        .iter()
        .zip(averaged)
        .map(|(name, w)| (name.to_string(), w))
        .collect();

    TrainedModel {
        id: Uuid::new_v4(),
        scope,
        weights,
        bias,
        metrics: TrainingMetrics {
            accuracy: mean_accuracy,
            precision: mean(|m| m.precision),
            recall: mean(|m| m.recall),
            f1: mean(|m| m.f1),
            accuracy_std,
            true_positives: metrics.iter().map(|m| m.true_positives).sum(),
            false_positives: metrics.iter().map(|m| m.false_positives).sum(),
            true_negatives: metrics.iter().map(|m| m.true_negatives).sum(),
            false_negatives: metrics.iter().map(|m| m.false_negatives).sum(),
            folds: fits.len() as u32,
        },
        stats: TrainingStats {
            sample_count: samples.len(),
            positive_count: positives,
            negative_count: negatives,
            mean_epochs: fits.iter().map(|f| f.epochs as f64).sum::<f64>() / k,
            best_loss: fits.iter().map(|f| f.loss).sum::<f64>() / k,
            seed,
        },
        is_active: true,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicantProfile;
    use crate::testutil::{outcome, strong_profile, weak_profile};

    fn criteria() -> ScholarshipCriteria {
        ScholarshipCriteria {
            scholarship_id: Uuid::from_u128(7),
            name: "Test Grant".to_string(),
            max_gwa: Some(2.5),
            max_income: Some(400_000.0),
            ..Default::default()
        }
    }

    fn outcomes(n: usize, scholarship_id: Uuid) -> Vec<ApplicationOutcome> {
        (0..n)
            .map(|i| {
                let approved = i % 2 == 0;
                let profile: ApplicantProfile = if approved {
                    strong_profile(i)
                } else {
                    weak_profile(i)
                };
                outcome(scholarship_id, profile, approved, i)
            })
            .collect()
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert!(sigmoid(1_000.0) > 0.999);
        assert!(sigmoid(-1_000.0) < 0.001);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn below_minimum_samples_is_an_error() {
        let engine = TrainingEngine::new(TrainingConfig::default());
        let id = Uuid::from_u128(7);

        let err = engine
            .train_for_scholarship(id, &criteria(), &outcomes(29, id))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientData {
                actual: 29,
                required: 30,
                ..
            }
        ));

        assert!(engine
            .train_for_scholarship(id, &criteria(), &outcomes(30, id))
            .is_ok());
    }

    #[test]
    fn global_minimum_is_higher() {
        let engine = TrainingEngine::new(TrainingConfig::default());
        let id = Uuid::from_u128(7);
        let mut by_scholarship = HashMap::new();
        by_scholarship.insert(id, criteria());

        let err = engine
            .train_global(&outcomes(49, id), &by_scholarship)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { required: 50, .. }));

        assert!(engine.train_global(&outcomes(60, id), &by_scholarship).is_ok());
    }

    #[test]
    fn pending_outcomes_never_become_samples() {
        let engine = TrainingEngine::new(TrainingConfig::default());
        let id = Uuid::from_u128(7);
        let mut records = outcomes(30, id);
        records[0].status = ApplicationStatus::Pending;

        let err = engine
            .train_for_scholarship(id, &criteria(), &records)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { actual: 29, .. }));
    }

    #[test]
    fn weights_and_bias_respect_the_clipping_bounds() {
        let engine = TrainingEngine::new(TrainingConfig {
            learning_rate: 5.0,
            ..Default::default()
        });
        let id = Uuid::from_u128(7);

        let model = engine
            .train_for_scholarship(id, &criteria(), &outcomes(40, id))
            .unwrap();
        for (_, w) in &model.weights {
            assert!(*w >= -WEIGHT_LIMIT && *w <= WEIGHT_LIMIT);
        }
        assert!(model.bias >= -BIAS_LIMIT && model.bias <= BIAS_LIMIT);
    }

    #[test]
    fn identical_data_and_seed_reproduce_identical_weights() {
        let engine = TrainingEngine::new(TrainingConfig::default());
        let id = Uuid::from_u128(7);
        let records = outcomes(40, id);

        let first = engine.train_for_scholarship(id, &criteria(), &records).unwrap();
        let second = engine.train_for_scholarship(id, &criteria(), &records).unwrap();

        assert_eq!(first.weights, second.weights);
        assert_eq!(first.bias.to_bits(), second.bias.to_bits());
        assert_eq!(first.metrics.accuracy, second.metrics.accuracy);
    }

    #[test]
    fn separable_data_trains_a_useful_model() {
        let engine = TrainingEngine::new(TrainingConfig::default());
        let id = Uuid::from_u128(7);

        let model = engine
            .train_for_scholarship(id, &criteria(), &outcomes(60, id))
            .unwrap();
        assert_eq!(model.metrics.folds, 5);
        assert!(model.metrics.accuracy > 0.7, "accuracy {}", model.metrics.accuracy);
        assert_eq!(model.stats.sample_count, 60);
        assert_eq!(model.stats.positive_count, 30);
    }

    #[test]
    fn every_feature_receives_a_weight() {
        let engine = TrainingEngine::new(TrainingConfig::default());
        let id = Uuid::from_u128(7);

        let model = engine
            .train_for_scholarship(id, &criteria(), &outcomes(30, id))
            .unwrap();
        assert_eq!(model.weights.len(), FEATURE_COUNT);
        for name in FEATURE_NAMES {
            assert!(model.weights.contains_key(name));
        }
    }

    #[test]
    fn fold_split_covers_every_sample_exactly_once() {
        let samples: Vec<Sample> = (0..23)
            .map(|i| Sample {
                features: [i as f64; FEATURE_COUNT],
                label: 0.0,
            })
            .collect();

        let mut held_total = 0;
        for fold in 0..5 {
            let (held, train) = split_fold(&samples, 5, fold);
            held_total += held.len();
            assert_eq!(held.len() + train.len(), samples.len());
        }
        assert_eq!(held_total, samples.len());
    }
}
