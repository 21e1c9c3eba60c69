// The onboarding run: authenticate, verify the organization, upload the
// registration code, upload the device. Steps run strictly in order and the
// first failure ends the run.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::thread;

use tracing::{error, info, info_span};

use crate::api::{BiotApi, Credentials, Endpoints};
use crate::config::{ClientConfig, Environment};
use crate::device::{upload_device, DeviceInfo, SerialNumber};
use crate::error::UploadError;
use crate::organization::verify_organization;
use crate::registration::upload_registration_code;
use crate::session::authenticate;

/// Validated inputs for one device.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub environment: Environment,
    pub credentials: Credentials,
    pub serial_number: String,
    pub organization: String,
    pub registration_code: String,
    pub description: String,
    pub version: String,
    pub output_directory: PathBuf,
}

/// Run the four remote steps for `request`.
///
/// The serial number is checked before anything is sent, so a malformed one
/// (code 5) never reaches the platform.
pub fn run<A: BiotApi + ?Sized>(
    api: &A,
    config: &ClientConfig,
    request: &UploadRequest,
) -> Result<(), UploadError> {
    let _span = info_span!("upload", serial = %request.serial_number).entered();

    let serial_number = SerialNumber::parse(&request.serial_number)?;
    let endpoints = Endpoints::new(&config.base_url)?;

    let session = authenticate(api, &endpoints, &request.credentials)?;
    let organization = verify_organization(api, &session, &request.organization)?;
    let registration_code =
        upload_registration_code(api, &session, &organization, &request.registration_code)?;

    if !config.settle_delay.is_zero() {
        thread::sleep(config.settle_delay);
    }

    let device = DeviceInfo {
        serial_number: &serial_number,
        description: &request.description,
        version: &request.version,
    };
    upload_device(api, &session, &organization, &registration_code, &device)?;

    info!(organization = %organization.name, "device onboarded");
    Ok(())
}

/// [`run`], with any panic turned into code 16 so the run still ends in a
/// traceability record.
pub fn run_guarded<A: BiotApi + ?Sized>(
    api: &A,
    config: &ClientConfig,
    request: &UploadRequest,
) -> Result<(), UploadError> {
    match panic::catch_unwind(AssertUnwindSafe(|| run(api, config, request))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            error!(%message, "upload aborted");
            Err(UploadError::Unexpected(message))
        }
    }
}
