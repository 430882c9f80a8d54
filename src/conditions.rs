use serde_json::Value;

use crate::models::{ApplicantProfile, CustomCondition, Importance};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Academic,
    Financial,
    Status,
    Location,
    Demographic,
    Custom,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Academic => "academic",
            Category::Financial => "financial",
            Category::Status => "status",
            Category::Location => "location",
            Category::Demographic => "demographic",
            Category::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    Between,
    BetweenExclusive,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    Is,
    IsNot,
    IsTrue,
    IsFalse,
    IsTruthy,
    IsFalsy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOp {
    In,
    NotIn,
    Includes,
    IncludesAny,
    IncludesAll,
    Excludes,
    ExcludesAll,
    MatchesAny,
    MatchesAll,
}

#[derive(Debug, Clone)]
pub enum ConditionKind {
    Range {
        op: RangeOp,
        low: f64,
        high: Option<f64>,
    },
    Boolean {
        op: BoolOp,
        expected: bool,
    },
    List {
        op: ListOp,
        allowed: Vec<String>,
    },
}

/// One eligibility criterion, ready to evaluate against an applicant value.
#[derive(Debug, Clone)]
pub struct Condition {
    pub name: String,
    pub category: Category,
    pub importance: Importance,
    pub kind: ConditionKind,
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Flag(bool),
    TextList(Vec<String>),
    Missing,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub category: Category,
    pub applicant_value: String,
    pub required_value: String,
    pub importance: Importance,
    pub error: Option<String>,
}

pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Case-insensitive substring containment in both directions, tolerating
/// naming variance between canonical lists and applicant-entered text.
pub fn fuzzy_matches(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

pub fn range_passes(op: RangeOp, value: f64, low: f64, high: Option<f64>) -> bool {
    let high = high.unwrap_or(low);
    match op {
        RangeOp::Lt => value < low,
        RangeOp::Lte => value <= low,
        RangeOp::Gt => value > low,
        RangeOp::Gte => value >= low,
        RangeOp::Eq => (value - low).abs() < 1e-9,
        RangeOp::Neq => (value - low).abs() >= 1e-9,
        RangeOp::Between => value >= low && value <= high,
        RangeOp::BetweenExclusive => value > low && value < high,
        RangeOp::Outside => value < low || value > high,
    }
}

pub fn bool_passes(op: BoolOp, value: bool, expected: bool) -> bool {
    match op {
        BoolOp::Is => value == expected,
        BoolOp::IsNot => value != expected,
        BoolOp::IsTrue | BoolOp::IsTruthy => value,
        BoolOp::IsFalse | BoolOp::IsFalsy => !value,
    }
}

pub fn list_passes(op: ListOp, value: &FieldValue, allowed: &[String]) -> bool {
    match op {
        ListOp::In => match value {
            FieldValue::Text(v) => allowed.iter().any(|a| normalize(a) == normalize(v)),
            _ => false,
        },
        ListOp::NotIn => match value {
            FieldValue::Text(v) => !allowed.iter().any(|a| normalize(a) == normalize(v)),
            _ => false,
        },
        ListOp::Includes => match value {
            FieldValue::TextList(items) => allowed
                .first()
                .map(|a| items.iter().any(|i| normalize(i) == normalize(a)))
                .unwrap_or(false),
            _ => false,
        },
        ListOp::IncludesAny => match value {
            FieldValue::TextList(items) => allowed
                .iter()
                .any(|a| items.iter().any(|i| normalize(i) == normalize(a))),
            _ => false,
        },
        ListOp::IncludesAll => match value {
            FieldValue::TextList(items) => allowed
                .iter()
                .all(|a| items.iter().any(|i| normalize(i) == normalize(a))),
            _ => false,
        },
        ListOp::Excludes => match value {
            FieldValue::TextList(items) => allowed
                .first()
                .map(|a| !items.iter().any(|i| normalize(i) == normalize(a)))
                .unwrap_or(true),
            _ => false,
        },
        ListOp::ExcludesAll => match value {
            FieldValue::TextList(items) => !allowed
                .iter()
                .any(|a| items.iter().any(|i| normalize(i) == normalize(a))),
            _ => false,
        },
        ListOp::MatchesAny => match value {
            FieldValue::Text(v) => allowed.iter().any(|a| fuzzy_matches(v, a)),
            FieldValue::TextList(items) => allowed
                .iter()
                .any(|a| items.iter().any(|i| fuzzy_matches(i, a))),
            _ => false,
        },
        ListOp::MatchesAll => match value {
            FieldValue::Text(v) => allowed.iter().all(|a| fuzzy_matches(v, a)),
            FieldValue::TextList(items) => allowed
                .iter()
                .all(|a| items.iter().any(|i| fuzzy_matches(i, a))),
            _ => false,
        },
    }
}

impl FieldValue {
    fn display(&self) -> String {
        match self {
            FieldValue::Number(n) => format!("{n:.2}"),
            FieldValue::Text(t) => t.clone(),
            FieldValue::Flag(true) => "yes".to_string(),
            FieldValue::Flag(false) => "no".to_string(),
            FieldValue::TextList(items) => items.join(", "),
            FieldValue::Missing => "not provided".to_string(),
        }
    }
}

impl ConditionKind {
    fn describe(&self) -> String {
        match self {
            ConditionKind::Range { op, low, high } => {
                let high = high.unwrap_or(*low);
                match op {
                    RangeOp::Lt => format!("less than {low:.2}"),
                    RangeOp::Lte => format!("at most {low:.2}"),
                    RangeOp::Gt => format!("more than {low:.2}"),
                    RangeOp::Gte => format!("at least {low:.2}"),
                    RangeOp::Eq => format!("exactly {low:.2}"),
                    RangeOp::Neq => format!("anything but {low:.2}"),
                    RangeOp::Between => format!("between {low:.2} and {high:.2}"),
                    RangeOp::BetweenExclusive => {
                        format!("strictly between {low:.2} and {high:.2}")
                    }
                    RangeOp::Outside => format!("outside {low:.2} to {high:.2}"),
                }
            }
            ConditionKind::Boolean { op, expected } => match op {
                BoolOp::Is => format!("must be {}", if *expected { "yes" } else { "no" }),
                BoolOp::IsNot => format!("must not be {}", if *expected { "yes" } else { "no" }),
                BoolOp::IsTrue | BoolOp::IsTruthy => "must be yes".to_string(),
                BoolOp::IsFalse | BoolOp::IsFalsy => "must be no".to_string(),
            },
            ConditionKind::List { op, allowed } => {
                let joined = allowed.join(", ");
                match op {
                    ListOp::In | ListOp::MatchesAny => format!("one of: {joined}"),
                    ListOp::NotIn | ListOp::Excludes | ListOp::ExcludesAll => {
                        format!("none of: {joined}")
                    }
                    ListOp::Includes => format!("must include: {joined}"),
                    ListOp::IncludesAny => format!("any of: {joined}"),
                    ListOp::IncludesAll | ListOp::MatchesAll => format!("all of: {joined}"),
                }
            }
        }
    }
}

impl Condition {
    pub fn evaluate(&self, value: &FieldValue) -> CheckResult {
        let required_value = self.kind.describe();
        let applicant_value = value.display();

        // A missing value fails a hard requirement; softer tiers pass
        // neutrally so an incomplete profile is not punished twice.
        if matches!(value, FieldValue::Missing) {
            return CheckResult {
                name: self.name.clone(),
                passed: self.importance != Importance::Required,
                category: self.category,
                applicant_value,
                required_value,
                importance: self.importance,
                error: None,
            };
        }

        let (passed, error) = match (&self.kind, value) {
            (ConditionKind::Range { op, low, high }, FieldValue::Number(v)) => {
                (range_passes(*op, *v, *low, *high), None)
            }
            (ConditionKind::Boolean { op, expected }, FieldValue::Flag(v)) => {
                (bool_passes(*op, *v, *expected), None)
            }
            (ConditionKind::List { op, allowed }, v) => (list_passes(*op, v, allowed), None),
            _ => (false, Some("value type does not fit this condition".to_string())),
        };

        CheckResult {
            name: self.name.clone(),
            passed,
            category: self.category,
            applicant_value,
            required_value,
            importance: self.importance,
            error,
        }
    }
}

fn parse_operator(raw: &str) -> Option<Operator> {
    let key: String = raw.chars().filter(|c| *c != '_' && *c != '-').collect();
    let op = match key.to_lowercase().as_str() {
        "lt" | "<" => Operator::Range(RangeOp::Lt),
        "lte" | "<=" => Operator::Range(RangeOp::Lte),
        "gt" | ">" => Operator::Range(RangeOp::Gt),
        "gte" | ">=" => Operator::Range(RangeOp::Gte),
        "eq" | "=" | "==" => Operator::Range(RangeOp::Eq),
        "neq" | "!=" => Operator::Range(RangeOp::Neq),
        "between" => Operator::Range(RangeOp::Between),
        "betweenexclusive" => Operator::Range(RangeOp::BetweenExclusive),
        "outside" => Operator::Range(RangeOp::Outside),
        "is" => Operator::Bool(BoolOp::Is),
        "isnot" => Operator::Bool(BoolOp::IsNot),
        "istrue" => Operator::Bool(BoolOp::IsTrue),
        "isfalse" => Operator::Bool(BoolOp::IsFalse),
        "istruthy" => Operator::Bool(BoolOp::IsTruthy),
        "isfalsy" => Operator::Bool(BoolOp::IsFalsy),
        "in" => Operator::List(ListOp::In),
        "notin" => Operator::List(ListOp::NotIn),
        "includes" => Operator::List(ListOp::Includes),
        "includesany" => Operator::List(ListOp::IncludesAny),
        "includesall" => Operator::List(ListOp::IncludesAll),
        "excludes" => Operator::List(ListOp::Excludes),
        "excludesall" => Operator::List(ListOp::ExcludesAll),
        "matchesany" => Operator::List(ListOp::MatchesAny),
        "matchesall" => Operator::List(ListOp::MatchesAll),
        _ => return None,
    };
    Some(op)
}

enum Operator {
    Range(RangeOp),
    Bool(BoolOp),
    List(ListOp),
}

fn resolve_field(profile: &ApplicantProfile, field: &str) -> Option<FieldValue> {
    let key = field.strip_prefix("profile.").unwrap_or(field);
    let key: String = key.chars().filter(|c| *c != '_').collect::<String>().to_lowercase();

    let number = |v: Option<f64>| v.map(FieldValue::Number).unwrap_or(FieldValue::Missing);
    let text = |v: &Option<String>| {
        v.as_ref()
            .map(|s| FieldValue::Text(s.clone()))
            .unwrap_or(FieldValue::Missing)
    };

    let value = match key.as_str() {
        "gwa" => number(profile.gwa),
        "yearlevel" | "classification" => text(&profile.year_level),
        "college" => text(&profile.college),
        "course" => text(&profile.course),
        "major" => text(&profile.major),
        "unitsenrolled" => number(profile.units_enrolled),
        "unitspassed" => number(profile.units_passed),
        "annualfamilyincome" | "income" => number(profile.annual_family_income),
        "stbracket" => text(&profile.st_bracket),
        "householdsize" => number(profile.household_size.map(f64::from)),
        "citizenship" => text(&profile.citizenship),
        "province" => text(&profile.province),
        "hasexistingscholarship" => FieldValue::Flag(profile.has_existing_scholarship),
        "hasthesisgrant" => FieldValue::Flag(profile.has_thesis_grant),
        "hasdisciplinaryrecord" => FieldValue::Flag(profile.has_disciplinary_record),
        "hasfailinggrade" => FieldValue::Flag(profile.has_failing_grade),
        "hasincompletegrade" => FieldValue::Flag(profile.has_incomplete_grade),
        "isgraduating" => FieldValue::Flag(profile.is_graduating),
        _ => return None,
    };
    Some(value)
}

fn broken_check(cond: &CustomCondition, detail: String) -> CheckResult {
    CheckResult {
        name: cond.name.clone(),
        passed: false,
        category: Category::Custom,
        applicant_value: "not evaluated".to_string(),
        required_value: format!("{} {}", cond.operator, cond.value),
        importance: cond.importance,
        error: Some(detail),
    }
}

/// Evaluates a free-form administrator condition. A broken condition is
/// reported as a failed check with an error annotation; evaluation of the
/// remaining conditions continues at the caller.
pub fn evaluate_custom(profile: &ApplicantProfile, cond: &CustomCondition) -> CheckResult {
    let Some(op) = parse_operator(&cond.operator) else {
        return broken_check(cond, format!("unknown operator '{}'", cond.operator));
    };

    let Some(value) = resolve_field(profile, &cond.field) else {
        return broken_check(cond, format!("unknown field '{}'", cond.field));
    };

    let kind = match op {
        Operator::Range(op) => match &cond.value {
            Value::Number(n) => ConditionKind::Range {
                op,
                low: n.as_f64().unwrap_or(0.0),
                high: None,
            },
            Value::Array(items) if items.len() == 2 => {
                let bounds: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
                if bounds.len() != 2 {
                    return broken_check(cond, "range bounds must be numeric".to_string());
                }
                ConditionKind::Range {
                    op,
                    low: bounds[0],
                    high: Some(bounds[1]),
                }
            }
            other => {
                return broken_check(
                    cond,
                    format!("range condition needs a number or [low, high], got {other}"),
                )
            }
        },
        Operator::Bool(op) => {
            let expected = match &cond.value {
                Value::Bool(b) => *b,
                Value::Null => true,
                other => {
                    return broken_check(
                        cond,
                        format!("boolean condition needs true/false, got {other}"),
                    )
                }
            };
            ConditionKind::Boolean { op, expected }
        }
        Operator::List(op) => {
            let allowed = match &cond.value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => {
                    let strings: Vec<String> = items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect();
                    if strings.len() != items.len() {
                        return broken_check(cond, "list values must be strings".to_string());
                    }
                    strings
                }
                other => {
                    return broken_check(
                        cond,
                        format!("list condition needs a string or string array, got {other}"),
                    )
                }
            };
            ConditionKind::List { op, allowed }
        }
    };

    let condition = Condition {
        name: cond.name.clone(),
        category: Category::Custom,
        importance: cond.importance,
        kind,
    };
    condition.evaluate(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_profile() -> ApplicantProfile {
        ApplicantProfile {
            gwa: Some(1.75),
            year_level: Some("Junior".to_string()),
            college: Some("College of Engineering".to_string()),
            annual_family_income: Some(250_000.0),
            has_disciplinary_record: false,
            ..Default::default()
        }
    }

    #[test]
    fn range_operators_cover_bounds() {
        assert!(range_passes(RangeOp::Lte, 2.0, 2.0, None));
        assert!(!range_passes(RangeOp::Lt, 2.0, 2.0, None));
        assert!(range_passes(RangeOp::Between, 1.5, 1.0, Some(2.0)));
        assert!(!range_passes(RangeOp::BetweenExclusive, 2.0, 1.0, Some(2.0)));
        assert!(range_passes(RangeOp::Outside, 2.5, 1.0, Some(2.0)));
        assert!(range_passes(RangeOp::Eq, 1.75, 1.75, None));
        assert!(range_passes(RangeOp::Neq, 1.75, 2.0, None));
    }

    #[test]
    fn fuzzy_match_tolerates_containment_both_ways() {
        assert!(fuzzy_matches("College of Engineering", "engineering"));
        assert!(fuzzy_matches("Engineering", "College of Engineering"));
        assert!(!fuzzy_matches("Engineering", "Fine Arts"));
        assert!(!fuzzy_matches("", "Engineering"));
    }

    #[test]
    fn list_in_is_exact_while_matches_any_is_fuzzy() {
        let allowed = vec!["College of Engineering".to_string()];
        let exact = FieldValue::Text("college of engineering".to_string());
        let partial = FieldValue::Text("Engineering".to_string());

        assert!(list_passes(ListOp::In, &exact, &allowed));
        assert!(!list_passes(ListOp::In, &partial, &allowed));
        assert!(list_passes(ListOp::MatchesAny, &partial, &allowed));
    }

    #[test]
    fn missing_value_fails_only_required_conditions() {
        let required = Condition {
            name: "gwa".to_string(),
            category: Category::Academic,
            importance: Importance::Required,
            kind: ConditionKind::Range {
                op: RangeOp::Lte,
                low: 2.0,
                high: None,
            },
        };
        let preferred = Condition {
            importance: Importance::Preferred,
            ..required.clone()
        };

        assert!(!required.evaluate(&FieldValue::Missing).passed);
        assert!(preferred.evaluate(&FieldValue::Missing).passed);
    }

    #[test]
    fn custom_condition_evaluates_against_profile_field() {
        let profile = sample_profile();
        let cond = CustomCondition {
            name: "GWA cap".to_string(),
            field: "gwa".to_string(),
            operator: "lte".to_string(),
            value: json!(2.0),
            importance: Importance::Required,
        };

        let check = evaluate_custom(&profile, &cond);
        assert!(check.passed);
        assert!(check.error.is_none());
    }

    #[test]
    fn custom_condition_accepts_camel_case_operators() {
        let profile = sample_profile();
        let cond = CustomCondition {
            name: "GWA window".to_string(),
            field: "gwa".to_string(),
            operator: "betweenExclusive".to_string(),
            value: json!([1.0, 2.0]),
            importance: Importance::Required,
        };

        assert!(evaluate_custom(&profile, &cond).passed);
    }

    #[test]
    fn broken_custom_condition_is_reported_not_propagated() {
        let profile = sample_profile();
        let bad_op = CustomCondition {
            name: "weird".to_string(),
            field: "gwa".to_string(),
            operator: "approximately".to_string(),
            value: json!(2.0),
            importance: Importance::Required,
        };
        let bad_field = CustomCondition {
            name: "typo".to_string(),
            field: "gwaa".to_string(),
            operator: "lte".to_string(),
            value: json!(2.0),
            importance: Importance::Required,
        };

        let first = evaluate_custom(&profile, &bad_op);
        assert!(!first.passed);
        assert!(first.error.unwrap().contains("unknown operator"));

        let second = evaluate_custom(&profile, &bad_field);
        assert!(!second.passed);
        assert!(second.error.unwrap().contains("unknown field"));
    }

    #[test]
    fn boolean_must_not_flag_maps_to_is_false() {
        let cond = Condition {
            name: "no disciplinary record".to_string(),
            category: Category::Status,
            importance: Importance::Required,
            kind: ConditionKind::Boolean {
                op: BoolOp::IsFalse,
                expected: false,
            },
        };

        assert!(cond.evaluate(&FieldValue::Flag(false)).passed);
        assert!(!cond.evaluate(&FieldValue::Flag(true)).passed);
    }
}
