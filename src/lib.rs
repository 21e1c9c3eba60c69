// Library root
// -----------
// Onboards one ONASPORT device into BioT: log in, check the organization,
// create a registration code, create the device, then record the outcome in
// a traceability file. The binary (`main.rs`) only wires arguments, logging
// and the HTTP client together.
//
// Module responsibilities:
// - `cli`: argument parsing, including the legacy single-dash flags.
// - `config`: environment base URLs and client settings.
// - `api`: wire types, the `BiotApi` seam and its reqwest implementation.
// - `session`, `organization`, `registration`, `device`: one module per step.
// - `workflow`: runs the steps in order, stopping at the first failure.
// - `traceability`: writes the result file.
// - `error`: the numeric error codes.
pub mod api;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod organization;
pub mod registration;
pub mod session;
pub mod traceability;
pub mod workflow;
