//! OpenAPI document served at `/api-docs/openapi.json` and browsed through `/swagger-ui`.

use crate::routes::{
    analytics, appointments, auth, camps, clinical, clinics, health, notifications, patients,
    queue, staff, uploads,
};
use api_shared as dto;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Camp clinic records API",
        description = "Multi-tenant clinic and health-camp management"
    ),
    paths(
        health::health,
        auth::login,
        auth::me,
        auth::change_password,
        clinics::onboard,
        clinics::get_clinic,
        clinics::update_clinic,
        staff::list_roles,
        staff::create_role,
        staff::get_role,
        staff::update_role,
        staff::delete_role,
        staff::list_staff,
        staff::create_staff,
        staff::get_staff,
        staff::update_staff,
        staff::disable_staff,
        staff::enable_staff,
        staff::reset_password,
        camps::list_camps,
        camps::create_camp,
        camps::get_camp,
        camps::update_camp,
        camps::camp_analytics,
        patients::list_patients,
        patients::register_patient,
        patients::get_patient,
        patients::update_patient,
        patients::patient_summary,
        patients::notify_patient,
        appointments::list_appointments,
        appointments::book_appointment,
        appointments::get_appointment,
        appointments::reschedule_appointment,
        appointments::update_appointment_status,
        queue::list_queue,
        queue::enqueue,
        queue::call_next,
        queue::serve,
        queue::skip,
        clinical::list_diagnoses,
        clinical::record_diagnosis,
        clinical::get_diagnosis,
        clinical::supersede_diagnosis,
        clinical::list_treatments,
        clinical::record_treatment,
        clinical::list_mammography,
        clinical::record_mammography,
        clinical::list_gp_records,
        clinical::record_gp_record,
        clinical::history,
        uploads::list_files,
        uploads::upload_file,
        uploads::download_file,
        notifications::list_notifications,
        analytics::dashboard,
    ),
    components(schemas(
        dto::HealthRes,
        dto::ErrorRes,
        dto::Permission,
        dto::ClinicStatus,
        dto::UserStatus,
        dto::Sex,
        dto::CampStatus,
        dto::AppointmentService,
        dto::AppointmentStatus,
        dto::QueueStatus,
        dto::Severity,
        dto::BreastSide,
        dto::BreastDensity,
        dto::NotificationChannel,
        dto::NotificationStatus,
        dto::LoginReq,
        dto::LoginRes,
        dto::MeRes,
        dto::ChangePasswordReq,
        dto::OnboardClinicReq,
        dto::OnboardClinicRes,
        dto::ClinicView,
        dto::UpdateClinicReq,
        dto::RoleView,
        dto::CreateRoleReq,
        dto::UpdateRoleReq,
        dto::StaffView,
        dto::CreateStaffReq,
        dto::UpdateStaffReq,
        dto::ResetPasswordReq,
        dto::CampView,
        dto::CreateCampReq,
        dto::UpdateCampReq,
        dto::PatientView,
        dto::RegisterPatientReq,
        dto::UpdatePatientReq,
        dto::PatientSummary,
        dto::AppointmentView,
        dto::BookAppointmentReq,
        dto::RescheduleAppointmentReq,
        dto::AppointmentStatusReq,
        dto::AppointmentStatusRes,
        dto::QueueEntryView,
        dto::EnqueueReq,
        dto::QueueSelector,
        dto::DiagnosisView,
        dto::RecordDiagnosisReq,
        dto::SupersedeDiagnosisRes,
        dto::MedicationDto,
        dto::TreatmentView,
        dto::RecordTreatmentReq,
        dto::MammographyView,
        dto::RecordMammographyReq,
        dto::VitalsDto,
        dto::GpRecordView,
        dto::RecordGpReq,
        dto::HistoryEntry,
        dto::FileView,
        dto::NotificationView,
        dto::NotifyPatientReq,
        dto::CountRow,
        dto::CampAnalytics,
        dto::DayCount,
        dto::CampSummaryRow,
        dto::DoctorWorkload,
        dto::ClinicDashboard,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health"),
        (name = "auth", description = "Sign-in and the current session"),
        (name = "clinics", description = "Tenant onboarding and profile"),
        (name = "staff", description = "Staff accounts and roles"),
        (name = "camps"),
        (name = "patients"),
        (name = "appointments"),
        (name = "queue", description = "Daily token queues"),
        (name = "clinical", description = "Versioned clinical records"),
        (name = "uploads"),
        (name = "notifications"),
        (name = "analytics"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme that secured paths refer to.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("HMAC")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route_and_the_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        for path in [
            "/health",
            "/clinics/onboard",
            "/patients/{id}/diagnoses/{diagnosis_id}/supersede",
            "/patients/{id}/files/{hash}",
            "/queue/call-next",
            "/analytics/dashboard",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("PatientView"));
    }
}
