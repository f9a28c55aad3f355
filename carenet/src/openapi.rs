//! OpenAPI documentation for the HTTP API.
//!
//! Served at `/api-docs/openapi.json`, with a RapiDoc UI on `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::change_password,
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::update_user,
        handlers::users::delete_user,
        handlers::users::set_kyc_status,
        handlers::agencies::create_agency,
        handlers::agencies::list_agencies,
        handlers::agencies::get_agency,
        handlers::agencies::update_agency,
        handlers::agencies::delete_agency,
        handlers::patients::create_patient,
        handlers::patients::list_patients,
        handlers::patients::get_patient,
        handlers::patients::update_patient,
        handlers::patients::delete_patient,
        handlers::jobs::create_job,
        handlers::jobs::list_jobs,
        handlers::jobs::get_job,
        handlers::jobs::update_job,
        handlers::jobs::assign_caregiver,
        handlers::jobs::set_job_status,
        handlers::jobs::delete_job,
        handlers::payments::create_payment,
        handlers::payments::confirm_payment,
        handlers::payments::list_payments,
        handlers::payments::get_payment,
        handlers::escrow::list_escrows,
        handlers::escrow::get_escrow,
        handlers::escrow::create_escrow,
        handlers::escrow::release_escrow,
        handlers::escrow::refund_escrow,
        handlers::escrow::open_dispute,
        handlers::disputes::list_disputes,
        handlers::disputes::get_dispute,
        handlers::disputes::resolve_dispute,
        handlers::feedback::create_feedback,
        handlers::feedback::list_feedback,
        handlers::feedback::get_feedback,
        handlers::feedback::delete_feedback,
        handlers::care_logs::create_care_log,
        handlers::care_logs::list_care_logs,
        handlers::care_logs::get_care_log,
        handlers::analytics::get_analytics,
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "authentication", description = "Registration, login and password management"),
        (name = "users", description = "User accounts, roles and KYC status"),
        (name = "agencies", description = "Care agency directory"),
        (name = "patients", description = "Care recipients under guardianship"),
        (name = "jobs", description = "Caregiving jobs and their lifecycle"),
        (name = "payments", description = "Payment initiation and confirmation"),
        (name = "escrows", description = "Escrowed funds: hold, release, refund"),
        (name = "disputes", description = "Dispute escalation and resolution"),
        (name = "feedback", description = "Post-job ratings"),
        (name = "care-logs", description = "Caregiver activity logs"),
        (name = "analytics", description = "Aggregated platform reports"),
    ),
    info(
        title = "CareNet API",
        description = "Caregiving marketplace backend connecting guardians, caregivers and agencies"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("carenet_session"))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_has_security_schemes() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components present");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.security_schemes.contains_key("session_cookie"));
    }

    #[test]
    fn test_spec_covers_core_paths() {
        let spec = ApiDoc::openapi();
        for path in [
            "/authentication/login",
            "/api/v1/users",
            "/api/v1/jobs/{job_id}/caregiver",
            "/api/v1/payments/{payment_id}/confirm",
            "/api/v1/escrows/{escrow_id}/refund",
            "/api/v1/disputes/{dispute_id}/resolve",
            "/api/v1/analytics",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing path {path}");
        }
    }
}
