//! error.rs - frame-graph build errors and fatal device errors

use thiserror::Error;

/// Errors returned from [`crate::framegraph::FrameGraphBuilder::compile`].
/// All are build-time: the frame is abandoned before anything is recorded.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("frame graph passes form a cycle")]
    FrameGraphCycle,

    #[error("pass `{pass}` references resource {resource:?} with no producer")]
    MissingInput { pass: String, resource: String },

    #[error("resource {0} cannot alias its assigned bucket: incompatible format or usage")]
    AliasingConflict(String),
}

/// Device-level failures. Per the project's fatal-at-record/submit-time
/// policy these are not meant to be recovered from — `latch_runtime`
/// reports the error and aborts rather than limping on with a partial
/// submission.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device allocation failed: out of memory")]
    OutOfMemory,

    #[error("timeline semaphore wait exceeded {0:?}")]
    TimelineTimeout(std::time::Duration),

    #[error("driver call failed: {0}")]
    DriverError(String),
}

/// Logs `err` at error level and aborts the process. Call at record/submit
/// time where `DeviceError` is fatal by contract.
pub fn abort_on_device_error(err: DeviceError) -> ! {
    tracing::error!(error = %err, "fatal device error, aborting");
    std::process::abort();
}
