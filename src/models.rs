use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Applicant record as handed over by the profile service. Read-only here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicantProfile {
    pub applicant_id: Uuid,
    pub gwa: Option<f64>,
    pub year_level: Option<String>,
    pub college: Option<String>,
    pub course: Option<String>,
    pub major: Option<String>,
    pub units_enrolled: Option<f64>,
    pub units_passed: Option<f64>,
    pub annual_family_income: Option<f64>,
    pub st_bracket: Option<String>,
    pub household_size: Option<i32>,
    pub citizenship: Option<String>,
    pub province: Option<String>,
    pub has_existing_scholarship: bool,
    pub has_thesis_grant: bool,
    pub has_disciplinary_record: bool,
    pub has_failing_grade: bool,
    pub has_incomplete_grade: bool,
    pub is_graduating: bool,
}

/// Per-scholarship thresholds and lists. Immutable during one evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScholarshipCriteria {
    pub scholarship_id: Uuid,
    pub name: String,
    pub min_gwa: Option<f64>,
    pub max_gwa: Option<f64>,
    pub min_income: Option<f64>,
    pub max_income: Option<f64>,
    pub min_units: Option<f64>,
    pub eligible_colleges: Vec<String>,
    pub eligible_courses: Vec<String>,
    pub eligible_majors: Vec<String>,
    pub eligible_st_brackets: Vec<String>,
    pub eligible_provinces: Vec<String>,
    pub eligible_citizenships: Vec<String>,
    pub eligible_year_levels: Vec<String>,
    pub require_no_existing_scholarship: bool,
    pub require_no_thesis_grant: bool,
    pub require_no_disciplinary_record: bool,
    pub require_no_failing_grades: bool,
    pub require_no_incomplete_grades: bool,
    pub require_not_graduating: bool,
    pub required_documents: Vec<String>,
    pub opens_at: Option<DateTime<Utc>>,
    pub closes_at: Option<DateTime<Utc>>,
    pub custom_conditions: Vec<CustomCondition>,
}

/// Administrator-defined condition. The operator is free text and gets
/// parsed at evaluation time; a broken condition turns into a failed check
/// instead of aborting the evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCondition {
    pub name: String,
    pub field: String,
    pub operator: String,
    pub value: serde_json::Value,
    pub importance: Importance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Required,
    Preferred,
    Optional,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Required => "required",
            Importance::Preferred => "preferred",
            Importance::Optional => "optional",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    /// Terminal records are the only ones usable as labeled training samples.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

/// One historical application with the applicant's attributes frozen at
/// submission time.
#[derive(Debug, Clone)]
pub struct ApplicationOutcome {
    pub application_id: Uuid,
    pub applicant_id: Uuid,
    pub scholarship_id: Uuid,
    pub status: ApplicationStatus,
    pub snapshot: ApplicantProfile,
    pub documents_submitted: Vec<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelScope {
    Global,
    Scholarship(Uuid),
}

impl std::fmt::Display for ModelScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelScope::Global => write!(f, "global"),
            ModelScope::Scholarship(id) => write!(f, "scholarship {id}"),
        }
    }
}

/// Cross-fold evaluation metrics: fold means, the accuracy standard
/// deviation, and summed confusion counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy_std: f64,
    pub true_positives: u32,
    pub false_positives: u32,
    pub true_negatives: u32,
    pub false_negatives: u32,
    pub folds: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingStats {
    pub sample_count: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    pub mean_epochs: f64,
    pub best_loss: f64,
    pub seed: u64,
}

/// A finished training run. Never mutated after creation; retraining always
/// inserts a new record and the store flips activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub id: Uuid,
    pub scope: ModelScope,
    pub weights: BTreeMap<String, f64>,
    pub bias: f64,
    pub metrics: TrainingMetrics,
    pub stats: TrainingStats,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn weight(&self, feature: &str) -> f64 {
        self.weights.get(feature).copied().unwrap_or(0.0)
    }
}
