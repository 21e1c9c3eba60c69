// Organization lookup. The tool never creates organizations; the target
// must already exist.

use tracing::{info, warn};

use crate::api::{BiotApi, Organization, Session};
use crate::error::UploadError;

/// Find `name` among the organizations visible to `session`. The match is
/// exact and case-sensitive.
pub fn verify_organization<A: BiotApi + ?Sized>(
    api: &A,
    session: &Session,
    name: &str,
) -> Result<Organization, UploadError> {
    info!(organization = name, "looking up organization");
    let organizations = api
        .list_organizations(session)
        .map_err(|e| UploadError::from_step(e, UploadError::OrganizationLookup))?;

    match organizations.into_iter().find(|org| org.name == name) {
        Some(org) => {
            info!(organization = name, id = %org.id, "organization found");
            Ok(org)
        }
        None => {
            warn!(organization = name, "organization not found");
            Err(UploadError::OrganizationNotFound(name.to_string()))
        }
    }
}
