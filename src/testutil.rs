//! Deterministic sample builders shared by the module tests.

use uuid::Uuid;

use crate::models::{ApplicantProfile, ApplicationOutcome, ApplicationStatus};

pub fn strong_profile(i: usize) -> ApplicantProfile {
    ApplicantProfile {
        applicant_id: Uuid::from_u128(1_000 + i as u128),
        gwa: Some(1.2 + (i % 5) as f64 * 0.1),
        year_level: Some("Junior".to_string()),
        college: Some("College of Engineering".to_string()),
        course: Some("BS Computer Science".to_string()),
        units_enrolled: Some(18.0),
        units_passed: Some(18.0),
        annual_family_income: Some(100_000.0 + (i as f64) * 1_000.0),
        st_bracket: Some("E1".to_string()),
        citizenship: Some("Filipino".to_string()),
        province: Some("Laguna".to_string()),
        ..Default::default()
    }
}

pub fn weak_profile(i: usize) -> ApplicantProfile {
    ApplicantProfile {
        applicant_id: Uuid::from_u128(2_000 + i as u128),
        gwa: Some(3.5 + (i % 5) as f64 * 0.2),
        year_level: Some("Freshman".to_string()),
        college: Some("College of Fine Arts".to_string()),
        course: Some("BFA Visual Communication".to_string()),
        units_enrolled: Some(12.0),
        units_passed: Some(9.0),
        annual_family_income: Some(600_000.0 + (i as f64) * 1_000.0),
        st_bracket: Some("A".to_string()),
        citizenship: Some("Filipino".to_string()),
        province: Some("Rizal".to_string()),
        has_failing_grade: true,
        ..Default::default()
    }
}

pub fn outcome(
    scholarship_id: Uuid,
    profile: ApplicantProfile,
    approved: bool,
    i: usize,
) -> ApplicationOutcome {
    ApplicationOutcome {
        application_id: Uuid::from_u128(3_000 + i as u128),
        applicant_id: profile.applicant_id,
        scholarship_id,
        status: if approved {
            ApplicationStatus::Approved
        } else {
            ApplicationStatus::Rejected
        },
        snapshot: profile,
        documents_submitted: Vec::new(),
        submitted_at: None,
        decided_at: None,
    }
}
