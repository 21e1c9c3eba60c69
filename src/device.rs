// ONASPORT device upload and the serial number rule it relies on.

use tracing::{info, warn};

use crate::api::{BiotApi, EntityRef, NewDevice, Organization, Session};
use crate::error::UploadError;

/// Number of digits in an ONASPORT serial number.
pub const SERIAL_NUMBER_LENGTH: usize = 10;

/// A serial number that passed format validation: ten ASCII digits, the
/// first one non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialNumber(String);

impl SerialNumber {
    pub fn parse(raw: &str) -> Result<Self, UploadError> {
        let valid = raw.len() == SERIAL_NUMBER_LENGTH
            && raw.bytes().all(|b| b.is_ascii_digit())
            && !raw.starts_with('0');
        if valid {
            Ok(SerialNumber(raw.to_string()))
        } else {
            Err(UploadError::SerialNumber(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What gets registered for one physical device.
#[derive(Debug, Clone)]
pub struct DeviceInfo<'a> {
    pub serial_number: &'a SerialNumber,
    pub description: &'a str,
    pub version: &'a str,
}

/// Create the device record under `organization`, linked to the registration
/// code created earlier in the run. The record is not read back.
pub fn upload_device<A: BiotApi + ?Sized>(
    api: &A,
    session: &Session,
    organization: &Organization,
    registration_code: &EntityRef,
    device: &DeviceInfo<'_>,
) -> Result<(), UploadError> {
    let template = api
        .device_template(session)
        .map_err(|e| UploadError::from_step(e, UploadError::DeviceTemplate))?;

    let body = NewDevice {
        owner_organization: EntityRef {
            id: organization.id.clone(),
        },
        registration_code: registration_code.clone(),
        serial_number: device.serial_number.to_string(),
        description: device.description.to_string(),
        version: device.version.to_string(),
        template_id: template.id,
    };
    info!(serial = %device.serial_number, "creating device");
    api.create_device(session, &body).map_err(|e| {
        warn!(error = %e, "device creation failed");
        UploadError::from_step(e, UploadError::CreateDevice)
    })?;
    info!(serial = %device.serial_number, "device created");
    Ok(())
}
