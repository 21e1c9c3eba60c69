// Error taxonomy: every failing stage of a run maps to exactly one numeric
// code, which is what ends up in the traceability file.

use thiserror::Error;

/// HTTP verb of a failed request. Only used to pick the generic transport
/// code (8 for GET, 9 for POST) when a request never got a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// Failure of a single remote call, before it is attributed to a step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{method} {url} unreachable: {message}")]
    Unreachable {
        method: HttpMethod,
        url: String,
        message: String,
    },

    #[error("{method} {url} rejected with status {status}: {body}")]
    Rejected {
        method: HttpMethod,
        url: String,
        status: u16,
        body: String,
    },

    #[error("{method} {url} returned an unexpected body: {message}")]
    Decode {
        method: HttpMethod,
        url: String,
        message: String,
    },
}

/// Everything that can stop a run. `code()` gives the value written to
/// `outputExecutionResult`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("serial number {0:?} cannot be used as a file name")]
    Filename(String),

    #[error("failed to write traceability file: {0}")]
    WriteFile(String),

    #[error("failed to prepare traceability output: {0}")]
    PrepareOutput(String),

    #[error("failed to generate traceability content: {0}")]
    GenerateContent(String),

    #[error("invalid serial number {0:?}: expected 10 digits not starting with 0")]
    SerialNumber(String),

    #[error("invalid arguments: {0}")]
    Arguments(String),

    #[error("failed to convert traceability record: {0}")]
    Convert(String),

    #[error("GET request failed: {0}")]
    Get(ApiError),

    #[error("POST request failed: {0}")]
    Post(ApiError),

    #[error("invalid API URL: {0}")]
    Url(String),

    #[error("login failed: {0}")]
    Authentication(ApiError),

    #[error("organization listing failed: {0}")]
    OrganizationLookup(ApiError),

    #[error("organization {0:?} not found")]
    OrganizationNotFound(String),

    #[error("registration code template fetch failed: {0}")]
    RegistrationTemplate(ApiError),

    #[error("device template fetch failed: {0}")]
    DeviceTemplate(ApiError),

    #[error("registration code creation failed: {0}")]
    CreateRegistrationCode(ApiError),

    #[error("device creation failed: {0}")]
    CreateDevice(ApiError),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl UploadError {
    pub fn code(&self) -> u8 {
        match self {
            UploadError::Filename(_) => 1,
            UploadError::WriteFile(_) => 2,
            UploadError::PrepareOutput(_) => 3,
            UploadError::GenerateContent(_) => 4,
            UploadError::SerialNumber(_) => 5,
            UploadError::Arguments(_) => 6,
            UploadError::Convert(_) => 7,
            UploadError::Get(_) => 8,
            UploadError::Post(_) => 9,
            UploadError::Url(_) => 10,
            UploadError::Authentication(_) => 11,
            UploadError::OrganizationLookup(_) | UploadError::OrganizationNotFound(_) => 12,
            UploadError::RegistrationTemplate(_) => 13,
            UploadError::DeviceTemplate(_) => 14,
            UploadError::CreateRegistrationCode(_) | UploadError::CreateDevice(_) => 15,
            UploadError::Unexpected(_) => 16,
        }
    }

    /// Attributes a failed call to the step that made it. Requests that never
    /// got a response fall back to the generic GET/POST codes; anything the
    /// server answered belongs to the step.
    pub fn from_step(err: ApiError, step: fn(ApiError) -> UploadError) -> UploadError {
        match err {
            ApiError::Unreachable { method: HttpMethod::Get, .. } => UploadError::Get(err),
            ApiError::Unreachable { method: HttpMethod::Post, .. } => UploadError::Post(err),
            other => step(other),
        }
    }
}
