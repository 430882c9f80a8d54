use std::fmt::Write;

use crate::models::TrainedModel;
use crate::prediction::PredictionResult;

pub fn build_training_report(model: &TrainedModel) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Training Report");
    let _ = writeln!(
        output,
        "Model {} ({}) trained {}",
        model.id,
        model.scope,
        model.created_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Samples");
    let _ = writeln!(
        output,
        "- {} terminal applications ({} approved, {} rejected)",
        model.stats.sample_count, model.stats.positive_count, model.stats.negative_count
    );
    let _ = writeln!(
        output,
        "- {:.1} mean epochs per fold, mean best loss {:.4}, seed {}",
        model.stats.mean_epochs, model.stats.best_loss, model.stats.seed
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Cross-Validation ({} folds)", model.metrics.folds);
    let _ = writeln!(
        output,
        "- accuracy {:.3} (±{:.3}), precision {:.3}, recall {:.3}, F1 {:.3}",
        model.metrics.accuracy,
        model.metrics.accuracy_std,
        model.metrics.precision,
        model.metrics.recall,
        model.metrics.f1
    );
    let _ = writeln!(
        output,
        "- confusion: {} TP / {} FP / {} TN / {} FN",
        model.metrics.true_positives,
        model.metrics.false_positives,
        model.metrics.true_negatives,
        model.metrics.false_negatives
    );

    let mut ranked: Vec<(&String, f64)> =
        model.weights.iter().map(|(name, w)| (name, *w)).collect();
    ranked.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Strongest Weights");
    for (name, weight) in ranked.iter().take(5) {
        let _ = writeln!(output, "- {name}: {weight:+.4}");
    }
    let _ = writeln!(output, "- bias: {:+.4}", model.bias);

    output
}

pub fn build_prediction_report(scholarship_name: &str, result: &PredictionResult) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Prediction: {scholarship_name}");
    let _ = writeln!(
        output,
        "Approval probability {:.1}% ({} confidence, {}), using the {} model",
        result.probability * 100.0,
        result.confidence.as_str(),
        result.recommendation.as_str(),
        result.model_scope
    );
    if result.history.prior_approvals + result.history.prior_rejections > 0 {
        let _ = writeln!(
            output,
            "History adjustment {:+.2} from {} prior approvals and {} rejections (base {:.1}%)",
            result.history.delta,
            result.history.prior_approvals,
            result.history.prior_rejections,
            result.base_probability * 100.0
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Eligibility: {} (score {})",
        if result.eligibility.passed { "PASSED" } else { "NOT ELIGIBLE" },
        result.eligibility.score
    );
    for check in &result.eligibility.checks {
        let marker = if check.passed { "ok" } else { "FAIL" };
        let _ = writeln!(
            output,
            "- [{marker}] {} ({}, {}): {} vs {}",
            check.name,
            check.category.as_str(),
            check.importance.as_str(),
            check.applicant_value,
            check.required_value
        );
        if let Some(error) = &check.error {
            let _ = writeln!(output, "  condition error: {error}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Factors");
    for factor in result.contributions.iter().take(5) {
        let _ = writeln!(
            output,
            "- {}: {:+.4} (value {:.2}, weight {:+.2})",
            factor.feature, factor.contribution, factor.value, factor.weight
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelScope, TrainedModel, TrainingMetrics, TrainingStats};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    #[test]
    fn training_report_lists_metrics_and_weights() {
        let mut weights = BTreeMap::new();
        weights.insert("gwa_score".to_string(), 1.25);
        weights.insert("income_match".to_string(), -0.5);

        let model = TrainedModel {
            id: Uuid::from_u128(5),
            scope: ModelScope::Global,
            weights,
            bias: 0.1,
            metrics: TrainingMetrics {
                accuracy: 0.87,
                folds: 5,
                ..Default::default()
            },
            stats: TrainingStats {
                sample_count: 60,
                positive_count: 30,
                negative_count: 30,
                ..Default::default()
            },
            is_active: true,
            created_at: Utc::now(),
        };

        let report = build_training_report(&model);
        assert!(report.contains("# Training Report"));
        assert!(report.contains("60 terminal applications"));
        assert!(report.contains("accuracy 0.870"));
        assert!(report.contains("gwa_score: +1.2500"));
    }
}
