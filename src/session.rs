// Session authentication against a BioT environment.

use tracing::{info, warn};

use crate::api::{BiotApi, Credentials, Endpoints, Session};
use crate::error::UploadError;

/// Exchange username/password for a bearer session. Any failure, whether the
/// server rejected the credentials or could not be reached, is code 11.
pub fn authenticate<A: BiotApi + ?Sized>(
    api: &A,
    endpoints: &Endpoints,
    credentials: &Credentials,
) -> Result<Session, UploadError> {
    info!(user = %credentials.username, base = %endpoints.base, "logging in");
    let session = api.login(endpoints, credentials).map_err(|e| {
        warn!(error = %e, "login failed");
        UploadError::Authentication(e)
    })?;
    info!("login succeeded");
    Ok(session)
}
