// Entrypoint for the upload tool.
// - Keeps `main` small: parse arguments, run the workflow, write the
//   traceability file and print its path.
// - Logs go to stderr; stdout carries only the path of the written file.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use biot_upload::api::BiotClient;
use biot_upload::cli::{self, ArgumentFailure};
use biot_upload::config::ClientConfig;
use biot_upload::error::UploadError;
use biot_upload::traceability::{self, TraceabilityRecord, NO_SERIAL_NUMBER};
use biot_upload::workflow;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let request = match cli::parse_from(std::env::args_os()) {
        Ok(request) => request,
        Err(failure) if failure.is_informational() => failure.error.exit(),
        Err(failure) => return Ok(record_argument_failure(failure)),
    };

    let config = ClientConfig::from_env(request.environment);
    info!(base = %config.base_url, serial = %request.serial_number, "starting upload");

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("Uploading {} to BioT...", request.serial_number));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let outcome = BiotClient::new(&config)
        .and_then(|client| workflow::run_guarded(&client, &config, &request));
    spinner.finish_and_clear();

    if let Err(e) = &outcome {
        error!(code = e.code(), error = %e, "upload failed");
    }
    let record = TraceabilityRecord::new(&request.serial_number, &outcome);
    Ok(finish(&request.output_directory, record))
}

/// Arguments were rejected (code 6). Still write the traceability file when
/// the output directory could be recovered.
fn record_argument_failure(failure: ArgumentFailure) -> ExitCode {
    if let Err(e) = failure.error.print() {
        warn!(error = %e, "could not print argument error");
    }
    let err = UploadError::Arguments(format!("{:?}", failure.error.kind()));
    error!(code = err.code(), error = %err, "argument parsing failed");

    match failure.output_directory {
        Some(dir) => {
            let serial = failure
                .serial_number
                .unwrap_or_else(|| NO_SERIAL_NUMBER.to_string());
            finish(&dir, TraceabilityRecord::new(&serial, &Err(err)))
        }
        None => ExitCode::from(err.code()),
    }
}

fn finish(dir: &Path, record: TraceabilityRecord) -> ExitCode {
    match traceability::write_report(dir, record, traceability::today()) {
        Ok(path) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(code = e.code(), error = %e, "could not write traceability file");
            ExitCode::from(e.code())
        }
    }
}
