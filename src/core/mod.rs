// ─── es-provision Core ───
// Provisions an Event Store server for integration builds.
//
// Architecture:
//   core/
//     catalog/     Version → OS family → OS variant model + JSON parsing
//     resolver     Host OS classification + latest-artifact lookup
//     downloader/  Catalog fetch + streamed archive download
//     archive/     Zip and tar.gz extraction with mode bits
//     supervisor/  Start with readiness wait, PID record, stop
//     config       JSON settings with OS-dependent defaults

pub mod archive;
pub mod catalog;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod resolver;
pub mod supervisor;
