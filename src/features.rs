use chrono::{DateTime, Utc};

use crate::conditions::{fuzzy_matches, normalize};
use crate::eligibility::check_eligibility;
use crate::models::{ApplicantProfile, ApplicationOutcome, ScholarshipCriteria};

pub const FEATURE_COUNT: usize = 15;

/// Fixed feature ordering shared by the trainer, the stored weight maps, and
/// the contribution breakdown.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "gwa_score",
    "year_level_match",
    "income_match",
    "st_bracket_match",
    "college_match",
    "course_match",
    "citizenship_match",
    "document_completeness",
    "application_timing",
    "eligibility_score",
    "academic_strength",
    "financial_need",
    "program_fit",
    "application_quality",
    "overall_fit",
];

// Prediction time has no submission yet, so the two application-derived
// features fall back to fixed neutral-positive placeholders.
pub const DOCUMENT_PLACEHOLDER: f64 = 0.8;
pub const TIMING_PLACEHOLDER: f64 = 0.7;

const MISSING_GWA: f64 = 0.5;
const MISSING_INCOME: f64 = 0.5;
const UNRESTRICTED_INCOME: f64 = 0.8;
const UNRESTRICTED_BRACKET: f64 = 0.8;
const UNKNOWN_BRACKET: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().zip(self.values).map(|(n, v)| (*n, v))
    }
}

/// Submission context for a historical application. Prediction requests have
/// none and use the placeholders above.
#[derive(Debug, Clone, Default)]
pub struct ApplicationContext {
    pub documents_submitted: Vec<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl From<&ApplicationOutcome> for ApplicationContext {
    fn from(outcome: &ApplicationOutcome) -> Self {
        ApplicationContext {
            documents_submitted: outcome.documents_submitted.clone(),
            submitted_at: outcome.submitted_at,
        }
    }
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Rescales GWA (lower is better) to [0,1], with a bonus of up to +0.2 for
/// sitting below the scholarship's own cap.
fn gwa_score(gwa: Option<f64>, max_gwa: Option<f64>) -> f64 {
    let Some(gwa) = gwa else {
        return MISSING_GWA;
    };
    let base = clamp01((5.0 - gwa) / 4.0);
    let bonus = match max_gwa {
        Some(cap) if cap > 0.0 && gwa < cap => 0.2 * ((cap - gwa) / cap),
        _ => 0.0,
    };
    (base + bonus).min(1.0)
}

fn membership_match(value: &Option<String>, allowed: &[String]) -> f64 {
    if allowed.is_empty() {
        return 1.0;
    }
    match value {
        Some(v) => {
            if allowed.iter().any(|a| fuzzy_matches(v, a)) {
                1.0
            } else {
                0.0
            }
        }
        None => 0.0,
    }
}

fn income_match(income: Option<f64>, max_income: Option<f64>) -> f64 {
    let Some(threshold) = max_income else {
        return UNRESTRICTED_INCOME;
    };
    let Some(income) = income else {
        return MISSING_INCOME;
    };
    if threshold <= 0.0 || income > threshold {
        0.0
    } else {
        1.0 - 0.5 * (income / threshold)
    }
}

/// Need-intensity lookup for ST (tuition discount) brackets, full-subsidy
/// brackets at the top.
fn bracket_need(bracket: &str) -> f64 {
    match normalize(bracket).as_str() {
        "fds" | "fd" | "full discount" => 1.0,
        "e2" => 1.0,
        "e1" => 0.9,
        "d" => 0.7,
        "c" => 0.5,
        "b" => 0.3,
        "a" => 0.1,
        _ => UNKNOWN_BRACKET,
    }
}

fn st_bracket_match(bracket: &Option<String>, allowed: &[String]) -> f64 {
    if allowed.is_empty() {
        return UNRESTRICTED_BRACKET;
    }
    match bracket {
        Some(b) if allowed.iter().any(|a| normalize(a) == normalize(b)) => bracket_need(b),
        _ => 0.0,
    }
}

fn document_completeness(required: &[String], submitted: &[String]) -> f64 {
    if required.is_empty() {
        return 1.0;
    }
    let satisfied = required
        .iter()
        .filter(|r| submitted.iter().any(|s| fuzzy_matches(s, r)))
        .count();
    satisfied as f64 / required.len() as f64
}

/// Linear decay over the application window: ~1.0 well before it opens,
/// 0.1 at or past the deadline.
fn application_timing(
    submitted_at: Option<DateTime<Utc>>,
    opens_at: Option<DateTime<Utc>>,
    closes_at: Option<DateTime<Utc>>,
) -> f64 {
    let (Some(submitted), Some(opens), Some(closes)) = (submitted_at, opens_at, closes_at) else {
        return TIMING_PLACEHOLDER;
    };
    let window = (closes - opens).num_seconds();
    if window <= 0 {
        return TIMING_PLACEHOLDER;
    }
    let elapsed = (submitted - opens).num_seconds() as f64 / window as f64;
    1.0 - 0.9 * clamp01(elapsed)
}

/// Deterministic, side-effect-free mapping from one applicant-scholarship
/// pair to the fixed feature ordering in `FEATURE_NAMES`.
pub fn extract_features(
    profile: &ApplicantProfile,
    criteria: &ScholarshipCriteria,
    application: Option<&ApplicationContext>,
) -> FeatureVector {
    let gwa = gwa_score(profile.gwa, criteria.max_gwa);
    let year_level = membership_match(&profile.year_level, &criteria.eligible_year_levels);
    let income = income_match(profile.annual_family_income, criteria.max_income);
    let bracket = st_bracket_match(&profile.st_bracket, &criteria.eligible_st_brackets);
    let college = membership_match(&profile.college, &criteria.eligible_colleges);
    let course = membership_match(&profile.course, &criteria.eligible_courses);
    let citizenship = membership_match(&profile.citizenship, &criteria.eligible_citizenships);

    let (documents, timing) = match application {
        Some(ctx) => (
            document_completeness(&criteria.required_documents, &ctx.documents_submitted),
            application_timing(ctx.submitted_at, criteria.opens_at, criteria.closes_at),
        ),
        None => (DOCUMENT_PLACEHOLDER, TIMING_PLACEHOLDER),
    };

    let eligibility = f64::from(check_eligibility(profile, criteria).score) / 100.0;

    let academic_strength = gwa * year_level;
    let financial_need = income * bracket;
    let program_fit = college * course;
    let application_quality = documents * timing;
    let overall_fit = eligibility * academic_strength;

    FeatureVector {
        values: [
            gwa,
            year_level,
            income,
            bracket,
            college,
            course,
            citizenship,
            documents,
            timing,
            eligibility,
            academic_strength,
            financial_need,
            program_fit,
            application_quality,
            overall_fit,
        ],
    }
}
