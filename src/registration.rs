// Registration code upload.

use tracing::{info, warn};

use crate::api::{BiotApi, EntityRef, NewRegistrationCode, Organization, Session};
use crate::error::{ApiError, HttpMethod, UploadError};

/// Create the registration code `code` under `organization` and return a
/// reference to the new record. The first registration-code template the
/// platform returns is used. No check is made for an existing code: a rerun
/// with the same code fails if the platform enforces uniqueness.
pub fn upload_registration_code<A: BiotApi + ?Sized>(
    api: &A,
    session: &Session,
    organization: &Organization,
    code: &str,
) -> Result<EntityRef, UploadError> {
    let templates = api
        .registration_code_templates(session)
        .map_err(|e| UploadError::from_step(e, UploadError::RegistrationTemplate))?;
    let template = templates.into_iter().next().ok_or_else(|| {
        UploadError::RegistrationTemplate(ApiError::Decode {
            method: HttpMethod::Get,
            url: session.endpoints().registration_code_templates.to_string(),
            message: "no registration code template available".into(),
        })
    })?;

    let body = NewRegistrationCode {
        owner_organization: EntityRef {
            id: organization.id.clone(),
        },
        code: code.to_string(),
        template_id: template.id,
    };
    info!(code, organization = %organization.name, "creating registration code");
    let created = api.create_registration_code(session, &body).map_err(|e| {
        warn!(error = %e, "registration code creation failed");
        UploadError::from_step(e, UploadError::CreateRegistrationCode)
    })?;
    info!(id = %created.id, "registration code created");
    Ok(EntityRef { id: created.id })
}
