use std::path::PathBuf;
use thiserror::Error;

/// Failures the command line has to tell apart from any other error.
///
/// These travel inside an [`eyre::Report`] and are recovered with
/// `downcast_ref`.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("APK not found at {}", .0.display())]
    MissingArchive(PathBuf),
    #[error("Entry '{name}' uses ZIP64 sizes or offsets that its central directory record does not carry")]
    Zip64Unsupported { name: String },
}
