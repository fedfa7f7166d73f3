//! The immersive-platform seam.
//!
//! The host platform owns session lifecycle, per-frame input handles and the
//! hit-test primitives; the engine only consumes the surface below. The web
//! build implements these traits over WebXR (`wasm.rs`); tests implement
//! them over a scripted mock.
//!
//! Note: these are plain async fns in traits rather than `async_trait` —
//! everything here runs on one cooperative thread, so no `Send` bounds are
//! needed.

use glam::Mat4;

/// The two reference frames the tracker needs.
///
/// Hit-test rays are cast from the device, so the query is scoped to
/// `Viewer`; resolved poses are read out in `Local` so placed content stays
/// world-stable when the device moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceSpaceKind {
    /// Origin tracks the device's current pose.
    Viewer,
    /// Origin fixed to the real-world position established at session start.
    Local,
}

#[derive(Debug, thiserror::Error)]
pub enum XrError {
    #[error("reference space {0:?} unavailable")]
    ReferenceSpaceUnavailable(ReferenceSpaceKind),
    #[error("hit-test source unavailable")]
    HitTestSourceUnavailable,
    #[error("platform error: {0}")]
    Platform(String),
}

/// An active immersive session, as seen by the engine.
#[allow(async_fn_in_trait)]
pub trait XrSession {
    type Space: Clone;
    type HitTestSource;
    type Frame: XrFrame<Space = Self::Space, HitTestSource = Self::HitTestSource>;

    async fn request_reference_space(
        &self,
        kind: ReferenceSpaceKind,
    ) -> Result<Self::Space, XrError>;

    /// Request a hit-test source casting rays from `space` (viewer space in
    /// practice).
    async fn request_hit_test_source(
        &self,
        space: &Self::Space,
    ) -> Result<Self::HitTestSource, XrError>;
}

/// Per-frame input handle delivered by the platform's frame callback.
pub trait XrFrame {
    type Space;
    type HitTestSource;
    type Hit: XrHit<Space = Self::Space>;

    /// Ranked surface intersections for this frame, closest to the device
    /// first. Empty means no surface was detected.
    fn hit_test_results(&self, source: &Self::HitTestSource) -> Vec<Self::Hit>;
}

/// One ranked surface intersection.
pub trait XrHit {
    type Space;

    /// Resolve this hit's pose against a reference space. `None` when
    /// tracking was lost between query and readout.
    fn pose(&self, space: &Self::Space) -> Option<Mat4>;
}
