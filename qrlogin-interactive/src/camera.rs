//! Camera collaborator. Capture and barcode decoding happen outside this crate.

/// What the platform reports about the camera before scanning starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraAvailability {
    Available,
    /// No usable camera.
    Unavailable,
    /// A camera exists but the user denied permission.
    AccessDenied,
}

/// Starts and stops the QR scanner.
///
/// Both `start_scanning` and `stop_scanning` must be idempotent; the
/// orchestrator may call either more than once.
#[async_trait::async_trait]
pub trait CameraAccess: Send + Sync {
    /// Check for a camera and request permission if needed.
    async fn availability(&self) -> CameraAvailability;

    async fn start_scanning(&self);

    async fn stop_scanning(&self);
}
