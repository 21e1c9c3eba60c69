// Command-line surface.
//
// The logistics spreadsheet calls the tool with single-dash long flags
// (`-env production -sn 1234567891 ...`). Those are rewritten to their
// double-dash form before clap sees them. When parsing fails, a second
// lenient pass recovers the serial number and output directory so the
// failure (code 6) can still be recorded.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use crate::api::Credentials;
use crate::config::Environment;
use crate::workflow::UploadRequest;

const LEGACY_FLAGS: &[&str] = &[
    "env",
    "user",
    "password",
    "sn",
    "org",
    "rc",
    "description",
    "version",
    "output",
];

/// Upload an ONASPORT device to BioT and assign it to an existing
/// organization under a new registration code.
#[derive(Parser, Debug)]
#[command(name = "biot-upload", disable_version_flag = true)]
pub struct UploadArgs {
    /// Environment in BioT.
    #[arg(long = "env", aliases = ["environment", "Environment"], value_enum)]
    pub environment: Environment,

    /// Username to log into BioT for the selected environment.
    #[arg(long = "user", aliases = ["username", "Username"])]
    pub username: String,

    /// Password to log into BioT for the selected environment.
    #[arg(long = "password", alias = "Password")]
    pub password: String,

    /// Serial number of the device.
    #[arg(long = "sn", aliases = ["serial-number", "SerialNumber"])]
    pub serial_number: String,

    /// Organization the device is assigned to.
    #[arg(long = "org", aliases = ["organization", "Organization"])]
    pub organization: String,

    /// Registration code the device is assigned to.
    #[arg(long = "rc", aliases = ["registration-code", "RegistrationCode"])]
    pub registration_code: String,

    /// Advertising name of the device, shown as its description in BioT.
    #[arg(long = "description", alias = "Description")]
    pub description: String,

    /// Version of the ONASPORT device.
    #[arg(long = "version", alias = "Version")]
    pub version: String,

    /// Directory where the traceability file is stored.
    #[arg(long = "output", aliases = ["output-directory", "OutputDirectory"])]
    pub output_directory: PathBuf,
}

/// Same flags as [`UploadArgs`], all optional and untyped, parsed with
/// errors ignored.
#[derive(Parser, Debug, Default)]
#[command(ignore_errors = true, disable_help_flag = true, disable_version_flag = true)]
struct RecoveredArgs {
    #[arg(long = "env", aliases = ["environment", "Environment"])]
    _environment: Option<String>,
    #[arg(long = "user", aliases = ["username", "Username"])]
    _username: Option<String>,
    #[arg(long = "password", alias = "Password")]
    _password: Option<String>,
    #[arg(long = "sn", aliases = ["serial-number", "SerialNumber"])]
    serial_number: Option<String>,
    #[arg(long = "org", aliases = ["organization", "Organization"])]
    _organization: Option<String>,
    #[arg(long = "rc", aliases = ["registration-code", "RegistrationCode"])]
    _registration_code: Option<String>,
    #[arg(long = "description", alias = "Description")]
    _description: Option<String>,
    #[arg(long = "version", alias = "Version")]
    _version: Option<String>,
    #[arg(long = "output", aliases = ["output-directory", "OutputDirectory"])]
    output_directory: Option<PathBuf>,
}

/// Arguments could not be parsed. Carries whatever could still be salvaged
/// for the traceability file.
#[derive(Debug)]
pub struct ArgumentFailure {
    pub error: clap::Error,
    pub serial_number: Option<String>,
    pub output_directory: Option<PathBuf>,
}

impl ArgumentFailure {
    /// `--help` ends up here too; it is not a failure.
    pub fn is_informational(&self) -> bool {
        matches!(
            self.error.kind(),
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
        )
    }
}

/// Rewrite `-env`, `-sn`, ... (and `-env=value`) to `--env`, `--sn`, ...
pub fn normalize_legacy_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            let legacy = arg.to_str().and_then(|s| {
                let rest = s.strip_prefix('-').filter(|r| !r.starts_with('-'))?;
                let name = rest.split('=').next().unwrap_or(rest);
                LEGACY_FLAGS.contains(&name).then(|| format!("-{s}"))
            });
            legacy.map(OsString::from).unwrap_or(arg)
        })
        .collect()
}

pub fn parse_from<I, T>(args: I) -> Result<UploadRequest, ArgumentFailure>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let args = normalize_legacy_flags(args);
    match UploadArgs::try_parse_from(&args) {
        Ok(parsed) => Ok(parsed.into()),
        Err(error) => {
            let recovered = RecoveredArgs::try_parse_from(&args).unwrap_or_default();
            Err(ArgumentFailure {
                error,
                serial_number: recovered.serial_number,
                output_directory: recovered.output_directory,
            })
        }
    }
}

impl From<UploadArgs> for UploadRequest {
    fn from(args: UploadArgs) -> Self {
        UploadRequest {
            environment: args.environment,
            credentials: Credentials {
                username: args.username,
                password: args.password,
            },
            serial_number: args.serial_number,
            organization: args.organization,
            registration_code: args.registration_code,
            description: args.description,
            version: args.version,
            output_directory: args.output_directory,
        }
    }
}
