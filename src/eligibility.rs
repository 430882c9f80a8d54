use crate::conditions::{
    evaluate_custom, BoolOp, Category, CheckResult, Condition, ConditionKind, FieldValue, ListOp,
    RangeOp,
};
use crate::models::{ApplicantProfile, Importance, ScholarshipCriteria};

#[derive(Debug, Clone)]
pub struct EligibilityResult {
    pub passed: bool,
    pub score: u8,
    pub checks: Vec<CheckResult>,
    pub category_summaries: Vec<CategorySummary>,
}

#[derive(Debug, Clone)]
pub struct CategorySummary {
    pub category: Category,
    pub passed_count: usize,
    pub total_count: usize,
}

fn number(v: Option<f64>) -> FieldValue {
    v.map(FieldValue::Number).unwrap_or(FieldValue::Missing)
}

fn text(v: &Option<String>) -> FieldValue {
    v.as_ref()
        .map(|s| FieldValue::Text(s.clone()))
        .unwrap_or(FieldValue::Missing)
}

fn range_condition(low: Option<f64>, high: Option<f64>) -> Option<ConditionKind> {
    match (low, high) {
        (Some(low), Some(high)) => Some(ConditionKind::Range {
            op: RangeOp::Between,
            low,
            high: Some(high),
        }),
        (Some(low), None) => Some(ConditionKind::Range {
            op: RangeOp::Gte,
            low,
            high: None,
        }),
        (None, Some(high)) => Some(ConditionKind::Range {
            op: RangeOp::Lte,
            low: high,
            high: None,
        }),
        (None, None) => None,
    }
}

/// Runs every criterion the scholarship actually defines and aggregates the
/// verdict. Absent criteria produce no check at all, so they are skipped
/// rather than failed; a scholarship with no stated requirements admits
/// everyone.
pub fn check_eligibility(
    profile: &ApplicantProfile,
    criteria: &ScholarshipCriteria,
) -> EligibilityResult {
    let mut checks: Vec<CheckResult> = Vec::new();

    let mut run = |name: &str, category: Category, kind: ConditionKind, value: FieldValue| {
        let condition = Condition {
            name: name.to_string(),
            category,
            importance: Importance::Required,
            kind,
        };
        checks.push(condition.evaluate(&value));
    };

    if let Some(kind) = range_condition(criteria.min_gwa, criteria.max_gwa) {
        run("GWA", Category::Academic, kind, number(profile.gwa));
    }
    if let Some(kind) = range_condition(criteria.min_income, criteria.max_income) {
        run(
            "Annual family income",
            Category::Financial,
            kind,
            number(profile.annual_family_income),
        );
    }
    if let Some(min_units) = criteria.min_units {
        run(
            "Units enrolled",
            Category::Academic,
            ConditionKind::Range {
                op: RangeOp::Gte,
                low: min_units,
                high: None,
            },
            number(profile.units_enrolled),
        );
    }

    let list_checks: [(&str, Category, &Vec<String>, FieldValue); 7] = [
        (
            "Year level",
            Category::Academic,
            &criteria.eligible_year_levels,
            text(&profile.year_level),
        ),
        (
            "College",
            Category::Academic,
            &criteria.eligible_colleges,
            text(&profile.college),
        ),
        (
            "Course",
            Category::Academic,
            &criteria.eligible_courses,
            text(&profile.course),
        ),
        (
            "Major",
            Category::Academic,
            &criteria.eligible_majors,
            text(&profile.major),
        ),
        (
            "ST bracket",
            Category::Financial,
            &criteria.eligible_st_brackets,
            text(&profile.st_bracket),
        ),
        (
            "Province",
            Category::Location,
            &criteria.eligible_provinces,
            text(&profile.province),
        ),
        (
            "Citizenship",
            Category::Demographic,
            &criteria.eligible_citizenships,
            text(&profile.citizenship),
        ),
    ];

    for (name, category, allowed, value) in list_checks {
        if allowed.is_empty() {
            continue;
        }
        run(
            name,
            category,
            ConditionKind::List {
                op: ListOp::MatchesAny,
                allowed: allowed.clone(),
            },
            value,
        );
    }

    let flag_checks: [(&str, bool, bool); 6] = [
        (
            "No existing scholarship",
            criteria.require_no_existing_scholarship,
            profile.has_existing_scholarship,
        ),
        (
            "No thesis grant",
            criteria.require_no_thesis_grant,
            profile.has_thesis_grant,
        ),
        (
            "No disciplinary record",
            criteria.require_no_disciplinary_record,
            profile.has_disciplinary_record,
        ),
        (
            "No failing grades",
            criteria.require_no_failing_grades,
            profile.has_failing_grade,
        ),
        (
            "No incomplete grades",
            criteria.require_no_incomplete_grades,
            profile.has_incomplete_grade,
        ),
        (
            "Not graduating",
            criteria.require_not_graduating,
            profile.is_graduating,
        ),
    ];

    for (name, required, flag) in flag_checks {
        if !required {
            continue;
        }
        run(
            name,
            Category::Status,
            ConditionKind::Boolean {
                op: BoolOp::IsFalse,
                expected: false,
            },
            FieldValue::Flag(flag),
        );
    }

    for custom in &criteria.custom_conditions {
        checks.push(evaluate_custom(profile, custom));
    }

    summarize(checks)
}

fn summarize(checks: Vec<CheckResult>) -> EligibilityResult {
    let total = checks.len();
    if total == 0 {
        return EligibilityResult {
            passed: true,
            score: 100,
            checks,
            category_summaries: Vec::new(),
        };
    }

    let passed_count = checks.iter().filter(|c| c.passed).count();
    let passed = checks
        .iter()
        .filter(|c| c.importance == Importance::Required)
        .all(|c| c.passed);
    let score = ((100.0 * passed_count as f64) / total as f64).round() as u8;

    let mut category_summaries: Vec<CategorySummary> = Vec::new();
    for check in &checks {
        match category_summaries
            .iter_mut()
            .find(|s| s.category == check.category)
        {
            Some(summary) => {
                summary.total_count += 1;
                summary.passed_count += usize::from(check.passed);
            }
            None => category_summaries.push(CategorySummary {
                category: check.category,
                passed_count: usize::from(check.passed),
                total_count: 1,
            }),
        }
    }

    EligibilityResult {
        passed,
        score,
        checks,
        category_summaries,
    }
}
