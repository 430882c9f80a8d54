use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    ApplicantProfile, ApplicationOutcome, ApplicationStatus, ModelScope, ScholarshipCriteria,
    TrainedModel,
};

const DDL: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS scholarship_match",
    r#"
    CREATE TABLE IF NOT EXISTS scholarship_match.applicants (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        full_name TEXT NOT NULL,
        profile TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scholarship_match.scholarships (
        id UUID PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        criteria TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scholarship_match.applications (
        id UUID PRIMARY KEY,
        applicant_id UUID NOT NULL REFERENCES scholarship_match.applicants(id),
        scholarship_id UUID NOT NULL REFERENCES scholarship_match.scholarships(id),
        status TEXT NOT NULL,
        snapshot TEXT NOT NULL,
        documents_submitted TEXT NOT NULL,
        submitted_at TIMESTAMPTZ,
        decided_at TIMESTAMPTZ,
        source_key TEXT UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scholarship_match.models (
        id UUID PRIMARY KEY,
        scope TEXT NOT NULL,
        scholarship_id UUID,
        weights TEXT NOT NULL,
        bias DOUBLE PRECISION NOT NULL,
        metrics TEXT NOT NULL,
        stats TEXT NOT NULL,
        is_active BOOLEAN NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_applications_scholarship
        ON scholarship_match.applications(scholarship_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_models_active
        ON scholarship_match.models(scope, scholarship_id) WHERE is_active
    "#,
];

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    for statement in DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

fn scope_columns(scope: ModelScope) -> (&'static str, Option<Uuid>) {
    match scope {
        ModelScope::Global => ("global", None),
        ModelScope::Scholarship(id) => ("scholarship", Some(id)),
    }
}

/// Persists a model and makes it the only active one of its scope, in a
/// single transaction so readers never see two active models.
pub async fn save_model(pool: &PgPool, model: &TrainedModel) -> anyhow::Result<()> {
    let (scope, scholarship_id) = scope_columns(model.scope);
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE scholarship_match.models
        SET is_active = false
        WHERE scope = $1 AND scholarship_id IS NOT DISTINCT FROM $2
        "#,
    )
    .bind(scope)
    .bind(scholarship_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO scholarship_match.models
        (id, scope, scholarship_id, weights, bias, metrics, stats, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, true, $8)
        "#,
    )
    .bind(model.id)
    .bind(scope)
    .bind(scholarship_id)
    .bind(serde_json::to_string(&model.weights)?)
    .bind(model.bias)
    .bind(serde_json::to_string(&model.metrics)?)
    .bind(serde_json::to_string(&model.stats)?)
    .bind(model.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

fn model_from_row(row: &PgRow) -> anyhow::Result<TrainedModel> {
    let scope: String = row.get("scope");
    let scholarship_id: Option<Uuid> = row.get("scholarship_id");
    let scope = match (scope.as_str(), scholarship_id) {
        ("scholarship", Some(id)) => ModelScope::Scholarship(id),
        _ => ModelScope::Global,
    };

    let weights: String = row.get("weights");
    let metrics: String = row.get("metrics");
    let stats: String = row.get("stats");

    Ok(TrainedModel {
        id: row.get("id"),
        scope,
        weights: serde_json::from_str(&weights).context("corrupt model weights")?,
        bias: row.get("bias"),
        metrics: serde_json::from_str(&metrics).context("corrupt model metrics")?,
        stats: serde_json::from_str(&stats).context("corrupt model stats")?,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    })
}

pub async fn fetch_active_model(
    pool: &PgPool,
    scope: ModelScope,
) -> anyhow::Result<Option<TrainedModel>> {
    let (scope, scholarship_id) = scope_columns(scope);
    let row = sqlx::query(
        r#"
        SELECT id, scope, scholarship_id, weights, bias, metrics, stats, is_active, created_at
        FROM scholarship_match.models
        WHERE scope = $1 AND scholarship_id IS NOT DISTINCT FROM $2 AND is_active
        "#,
    )
    .bind(scope)
    .bind(scholarship_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(model_from_row).transpose()
}

pub async fn deactivate_models(pool: &PgPool, scope: ModelScope) -> anyhow::Result<u64> {
    let (scope, scholarship_id) = scope_columns(scope);
    let result = sqlx::query(
        r#"
        UPDATE scholarship_match.models
        SET is_active = false
        WHERE scope = $1 AND scholarship_id IS NOT DISTINCT FROM $2 AND is_active
        "#,
    )
    .bind(scope)
    .bind(scholarship_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn fetch_applicant(pool: &PgPool, email: &str) -> anyhow::Result<ApplicantProfile> {
    let row = sqlx::query(
        "SELECT id, profile FROM scholarship_match.applicants WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no applicant with email {email}"))?;

    let profile: String = row.get("profile");
    let mut profile: ApplicantProfile =
        serde_json::from_str(&profile).context("corrupt applicant profile")?;
    profile.applicant_id = row.get("id");
    Ok(profile)
}

pub async fn fetch_scholarship(pool: &PgPool, code: &str) -> anyhow::Result<ScholarshipCriteria> {
    let row = sqlx::query(
        "SELECT id, name, criteria FROM scholarship_match.scholarships WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no scholarship with code {code}"))?;

    scholarship_from_row(&row)
}

fn scholarship_from_row(row: &PgRow) -> anyhow::Result<ScholarshipCriteria> {
    let criteria: String = row.get("criteria");
    let mut criteria: ScholarshipCriteria =
        serde_json::from_str(&criteria).context("corrupt scholarship criteria")?;
    criteria.scholarship_id = row.get("id");
    criteria.name = row.get("name");
    Ok(criteria)
}

pub async fn fetch_scholarships(pool: &PgPool) -> anyhow::Result<Vec<ScholarshipCriteria>> {
    let rows = sqlx::query("SELECT id, name, criteria FROM scholarship_match.scholarships")
        .fetch_all(pool)
        .await?;
    rows.iter().map(scholarship_from_row).collect()
}

fn outcome_from_row(row: &PgRow) -> anyhow::Result<ApplicationOutcome> {
    let status: String = row.get("status");
    let status = match status.as_str() {
        "approved" => ApplicationStatus::Approved,
        "rejected" => ApplicationStatus::Rejected,
        _ => ApplicationStatus::Pending,
    };

    let snapshot: String = row.get("snapshot");
    let documents: String = row.get("documents_submitted");

    Ok(ApplicationOutcome {
        application_id: row.get("id"),
        applicant_id: row.get("applicant_id"),
        scholarship_id: row.get("scholarship_id"),
        status,
        snapshot: serde_json::from_str(&snapshot).context("corrupt application snapshot")?,
        documents_submitted: serde_json::from_str(&documents)
            .context("corrupt document list")?,
        submitted_at: row.get("submitted_at"),
        decided_at: row.get("decided_at"),
    })
}

/// Historical applications, optionally narrowed to one scholarship. The
/// trainer filters terminal status itself.
pub async fn fetch_outcomes(
    pool: &PgPool,
    scholarship_id: Option<Uuid>,
) -> anyhow::Result<Vec<ApplicationOutcome>> {
    let mut query = String::from(
        "SELECT id, applicant_id, scholarship_id, status, snapshot, documents_submitted, \
         submitted_at, decided_at FROM scholarship_match.applications",
    );
    if scholarship_id.is_some() {
        query.push_str(" WHERE scholarship_id = $1");
    }

    let mut rows = sqlx::query(&query);
    if let Some(id) = scholarship_id {
        rows = rows.bind(id);
    }

    let records = rows.fetch_all(pool).await?;
    records.iter().map(outcome_from_row).collect()
}

pub async fn fetch_history(
    pool: &PgPool,
    applicant_id: Uuid,
) -> anyhow::Result<Vec<ApplicationOutcome>> {
    let rows = sqlx::query(
        "SELECT id, applicant_id, scholarship_id, status, snapshot, documents_submitted, \
         submitted_at, decided_at FROM scholarship_match.applications WHERE applicant_id = $1",
    )
    .bind(applicant_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(outcome_from_row).collect()
}

async fn upsert_applicant(
    pool: &PgPool,
    email: &str,
    full_name: &str,
    profile: &ApplicantProfile,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO scholarship_match.applicants (id, email, full_name, profile)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, profile = EXCLUDED.profile
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(full_name)
    .bind(serde_json::to_string(profile)?)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn upsert_scholarship(
    pool: &PgPool,
    code: &str,
    criteria: &ScholarshipCriteria,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO scholarship_match.scholarships (id, code, name, criteria)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (code) DO UPDATE
        SET name = EXCLUDED.name, criteria = EXCLUDED.criteria
        RETURNING id
        "#,
    )
    .bind(criteria.scholarship_id)
    .bind(code)
    .bind(&criteria.name)
    .bind(serde_json::to_string(criteria)?)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

#[allow(clippy::too_many_arguments)]
async fn insert_application(
    pool: &PgPool,
    applicant_id: Uuid,
    scholarship_id: Uuid,
    status: ApplicationStatus,
    snapshot: &ApplicantProfile,
    documents: &[String],
    submitted_at: Option<DateTime<Utc>>,
    decided_at: Option<DateTime<Utc>>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO scholarship_match.applications
        (id, applicant_id, scholarship_id, status, snapshot, documents_submitted,
         submitted_at, decided_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(applicant_id)
    .bind(scholarship_id)
    .bind(status.as_str())
    .bind(serde_json::to_string(snapshot)?)
    .bind(serde_json::to_string(documents)?)
    .bind(submitted_at)
    .bind(decided_at)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Imports terminal application outcomes from a CSV export. Applicants are
/// upserted by email; the scholarship must already exist.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        email: String,
        full_name: String,
        scholarship_code: String,
        status: String,
        gwa: Option<f64>,
        year_level: Option<String>,
        college: Option<String>,
        course: Option<String>,
        annual_family_income: Option<f64>,
        st_bracket: Option<String>,
        citizenship: Option<String>,
        province: Option<String>,
        units_enrolled: Option<f64>,
        documents: Option<String>,
        submitted_at: Option<DateTime<Utc>>,
        decided_at: Option<DateTime<Utc>>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let scholarship = fetch_scholarship(pool, &row.scholarship_code).await?;

        let status = match row.status.as_str() {
            "approved" => ApplicationStatus::Approved,
            "rejected" => ApplicationStatus::Rejected,
            other => anyhow::bail!("unknown application status '{other}' in CSV"),
        };

        let snapshot = ApplicantProfile {
            gwa: row.gwa,
            year_level: row.year_level.clone(),
            college: row.college.clone(),
            course: row.course.clone(),
            annual_family_income: row.annual_family_income,
            st_bracket: row.st_bracket.clone(),
            citizenship: row.citizenship.clone(),
            province: row.province.clone(),
            units_enrolled: row.units_enrolled,
            ..Default::default()
        };

        let applicant_id = upsert_applicant(pool, &row.email, &row.full_name, &snapshot).await?;
        let mut snapshot = snapshot;
        snapshot.applicant_id = applicant_id;

        let documents: Vec<String> = row
            .documents
            .as_deref()
            .unwrap_or("")
            .split('|')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_application(
            pool,
            applicant_id,
            scholarship.scholarship_id,
            status,
            &snapshot,
            &documents,
            row.submitted_at,
            row.decided_at,
            &source_key,
        )
        .await?
        {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let engineering = ScholarshipCriteria {
        scholarship_id: Uuid::parse_str("7b2f0c4e-51d3-4a8e-9a64-0c7f3d2e8b11")?,
        name: "Engineering Excellence Grant".to_string(),
        max_gwa: Some(2.0),
        max_income: Some(500_000.0),
        min_units: Some(15.0),
        eligible_colleges: vec!["College of Engineering".to_string()],
        eligible_year_levels: vec![
            "Sophomore".to_string(),
            "Junior".to_string(),
            "Senior".to_string(),
        ],
        require_no_disciplinary_record: true,
        require_no_failing_grades: true,
        required_documents: vec![
            "Certificate of Registration".to_string(),
            "Income Tax Return".to_string(),
        ],
        opens_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single(),
        closes_at: Utc.with_ymd_and_hms(2025, 7, 15, 0, 0, 0).single(),
        ..Default::default()
    };

    let needs_based = ScholarshipCriteria {
        scholarship_id: Uuid::parse_str("c8d4a2f6-93b1-4e57-8f20-5a6b7c8d9e03")?,
        name: "Student Assistance Fund".to_string(),
        max_gwa: Some(3.0),
        max_income: Some(300_000.0),
        eligible_st_brackets: vec![
            "E1".to_string(),
            "E2".to_string(),
            "FD".to_string(),
            "D".to_string(),
        ],
        require_no_existing_scholarship: true,
        required_documents: vec!["Income Tax Return".to_string()],
        opens_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single(),
        closes_at: Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).single(),
        ..Default::default()
    };

    upsert_scholarship(pool, "eng-excellence", &engineering).await?;
    upsert_scholarship(pool, "student-assist", &needs_based).await?;

    let colleges = [
        "College of Engineering",
        "College of Science",
        "College of Arts and Letters",
    ];
    let courses = ["BS Computer Science", "BS Civil Engineering", "BA Philosophy"];
    let year_levels = ["Sophomore", "Junior", "Senior"];
    let brackets = ["E1", "E2", "D", "C", "B"];
    let provinces = ["Laguna", "Rizal", "Cavite", "Bulacan"];

    for i in 0..80usize {
        let strong = i % 2 == 0;
        let profile = ApplicantProfile {
            gwa: Some(if strong {
                1.25 + (i % 4) as f64 * 0.15
            } else {
                2.75 + (i % 4) as f64 * 0.35
            }),
            year_level: Some(year_levels[i % year_levels.len()].to_string()),
            college: Some(colleges[i % colleges.len()].to_string()),
            course: Some(courses[i % courses.len()].to_string()),
            units_enrolled: Some(if strong { 18.0 } else { 12.0 }),
            units_passed: Some(if strong { 18.0 } else { 9.0 }),
            annual_family_income: Some(if strong {
                120_000.0 + (i as f64) * 2_000.0
            } else {
                450_000.0 + (i as f64) * 5_000.0
            }),
            st_bracket: Some(brackets[i % brackets.len()].to_string()),
            citizenship: Some("Filipino".to_string()),
            province: Some(provinces[i % provinces.len()].to_string()),
            has_failing_grade: !strong && i % 3 == 0,
            ..Default::default()
        };

        let email = format!("seed-applicant-{i:03}@university.edu.ph");
        let full_name = format!("Seed Applicant {i:03}");
        let applicant_id = upsert_applicant(pool, &email, &full_name, &profile).await?;
        let mut snapshot = profile;
        snapshot.applicant_id = applicant_id;

        let scholarship = if i < 40 { &engineering } else { &needs_based };
        // label noise: one in ten strong applications still gets rejected
        let approved = if strong { i % 10 != 8 } else { i % 10 == 1 };
        let submitted = Utc
            .with_ymd_and_hms(2025, 6, 1 + (i % 28) as u32, 12, 0, 0)
            .single()
            .context("invalid seed date")?;
        let decided = Utc
            .with_ymd_and_hms(2025, 8, 15, 12, 0, 0)
            .single()
            .context("invalid seed date")?;

        insert_application(
            pool,
            applicant_id,
            scholarship.scholarship_id,
            if approved {
                ApplicationStatus::Approved
            } else {
                ApplicationStatus::Rejected
            },
            &snapshot,
            &[
                "Certificate of Registration".to_string(),
                "Income Tax Return".to_string(),
            ],
            Some(submitted),
            Some(decided),
            &format!("seed-{i:03}"),
        )
        .await?;
    }

    Ok(())
}
