//! Per-frame surface hit-testing.
//!
//! The tracker is a small state machine tied 1:1 to one immersive session:
//!
//! ```text
//! Uninitialized --(first frame, request granted)--> Acquiring
//! Acquiring --(both async acquisitions resolve)--> Active
//! Active --(session end)--> Uninitialized
//! ```
//!
//! Acquisition happens lazily on the first frame callback and exactly once
//! per session; while it is pending the tracker answers every query with
//! [`TrackerStep::Inactive`]. Results from a session that already ended are
//! discarded via a generation counter so a later session always starts from
//! a clean two-step acquisition.

use glam::Mat4;

use crate::xr::{ReferenceSpaceKind, XrError, XrFrame, XrHit, XrSession};

/// Hit-test facility state for the current session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitTestState {
    Uninitialized,
    /// Acquisition requested, reference spaces / source not yet resolved.
    Acquiring,
    Active,
}

/// Token handed out by [`HitTestTracker::begin_acquisition`]; pass it back
/// with the finished acquisition so stale results can be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquisitionToken(u64);

/// The handles the tracker needs while active.
#[derive(Debug)]
pub struct Acquisition<S: XrSession> {
    pub hit_test_source: S::HitTestSource,
    pub local_space: S::Space,
}

/// Perform the session-scoped acquisitions, in order: a viewer-anchored
/// reference space, the hit-test source bound to it, then the local
/// reference space used to read out stable poses.
pub async fn acquire<S: XrSession>(session: &S) -> Result<Acquisition<S>, XrError> {
    let viewer_space = session
        .request_reference_space(ReferenceSpaceKind::Viewer)
        .await?;
    let hit_test_source = session.request_hit_test_source(&viewer_space).await?;
    let local_space = session
        .request_reference_space(ReferenceSpaceKind::Local)
        .await?;

    Ok(Acquisition {
        hit_test_source,
        local_space,
    })
}

/// Outcome of one per-frame tracker step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackerStep {
    /// Not active yet (or no longer); leave the marker alone.
    Inactive,
    /// Query ran but found no surface; hide the marker.
    NoSurface,
    /// Closest surface pose, resolved in local space; show the marker there.
    Surface(Mat4),
}

pub struct HitTestTracker<S: XrSession> {
    state: HitTestState,
    generation: u64,
    hit_test_source: Option<S::HitTestSource>,
    local_space: Option<S::Space>,
}

impl<S: XrSession> HitTestTracker<S> {
    pub fn new() -> Self {
        Self {
            state: HitTestState::Uninitialized,
            generation: 0,
            hit_test_source: None,
            local_space: None,
        }
    }

    pub fn state(&self) -> HitTestState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == HitTestState::Active
    }

    /// The local reference space, available while active. The placement
    /// action resolves controller poses against this.
    pub fn local_space(&self) -> Option<&S::Space> {
        self.local_space.as_ref()
    }

    /// Ask to start the lazy acquisition. Returns a token on the first call
    /// of a session and `None` afterwards, so the async acquisition is
    /// spawned at most once no matter how many frames arrive before it
    /// resolves.
    pub fn begin_acquisition(&mut self) -> Option<AcquisitionToken> {
        if self.state != HitTestState::Uninitialized {
            return None;
        }
        self.state = HitTestState::Acquiring;
        Some(AcquisitionToken(self.generation))
    }

    /// Deliver a finished acquisition. Returns `false` (and drops the
    /// handles) when the token is stale, i.e. the session ended while the
    /// acquisition was in flight.
    pub fn activate(&mut self, token: AcquisitionToken, acquisition: Acquisition<S>) -> bool {
        if token.0 != self.generation || self.state != HitTestState::Acquiring {
            tracing::debug!("discarding hit-test acquisition from an ended session");
            return false;
        }
        self.hit_test_source = Some(acquisition.hit_test_source);
        self.local_space = Some(acquisition.local_space);
        self.state = HitTestState::Active;
        true
    }

    /// Record a failed acquisition. The tracker falls back to
    /// `Uninitialized`; there is no retry beyond the next frame's lazy
    /// request.
    pub fn fail_acquisition(&mut self, token: AcquisitionToken, error: &XrError) {
        if token.0 != self.generation || self.state != HitTestState::Acquiring {
            return;
        }
        tracing::warn!("hit-test acquisition failed: {error}");
        self.state = HitTestState::Uninitialized;
    }

    /// Per-frame query. Policy: take the first (closest) ranked result and
    /// resolve it in local space verbatim — no smoothing, no interpolation.
    /// An empty result set, or a hit whose pose cannot be resolved, is the
    /// normal "no surface detected" case.
    pub fn step(&mut self, frame: &S::Frame) -> TrackerStep {
        if self.state != HitTestState::Active {
            return TrackerStep::Inactive;
        }
        let (Some(source), Some(local_space)) = (&self.hit_test_source, &self.local_space) else {
            return TrackerStep::Inactive;
        };

        let results = frame.hit_test_results(source);
        match results.first().and_then(|hit| hit.pose(local_space)) {
            Some(pose) => TrackerStep::Surface(pose),
            None => TrackerStep::NoSurface,
        }
    }

    /// Session-end notification: release every handle and reset, so a later
    /// session re-runs the full two-step acquisition.
    pub fn end_session(&mut self) {
        self.hit_test_source = None;
        self.local_space = None;
        self.generation += 1;
        self.state = HitTestState::Uninitialized;
    }
}

impl<S: XrSession> Default for HitTestTracker<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted XR platform used by the engine tests.

    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Mat4;

    use crate::xr::{ReferenceSpaceKind, XrError, XrFrame, XrHit, XrSession};

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum MockSpace {
        Viewer,
        Local,
    }

    #[derive(Clone, Debug)]
    pub struct MockSource;

    #[derive(Clone, Debug)]
    pub struct MockHit {
        /// Pose in local space; `None` simulates losing tracking between
        /// query and readout.
        pub local_pose: Option<Mat4>,
    }

    impl XrHit for MockHit {
        type Space = MockSpace;

        fn pose(&self, space: &MockSpace) -> Option<Mat4> {
            assert_eq!(
                *space,
                MockSpace::Local,
                "hit poses must be read out in local space"
            );
            self.local_pose
        }
    }

    pub struct MockFrame {
        pub hits: Vec<MockHit>,
    }

    impl MockFrame {
        pub fn empty() -> Self {
            Self { hits: Vec::new() }
        }

        pub fn with_pose(pose: Mat4) -> Self {
            Self {
                hits: vec![MockHit {
                    local_pose: Some(pose),
                }],
            }
        }
    }

    impl XrFrame for MockFrame {
        type Space = MockSpace;
        type HitTestSource = MockSource;
        type Hit = MockHit;

        fn hit_test_results(&self, _source: &MockSource) -> Vec<MockHit> {
            self.hits.clone()
        }
    }

    #[derive(Debug, Default)]
    pub struct MockCounters {
        pub reference_space_requests: usize,
        pub hit_test_source_requests: usize,
    }

    #[derive(Debug)]
    pub struct MockSession {
        pub counters: Rc<RefCell<MockCounters>>,
        pub fail_hit_test_source: bool,
    }

    impl MockSession {
        pub fn new() -> Self {
            Self {
                counters: Rc::new(RefCell::new(MockCounters::default())),
                fail_hit_test_source: false,
            }
        }
    }

    impl XrSession for MockSession {
        type Space = MockSpace;
        type HitTestSource = MockSource;
        type Frame = MockFrame;

        async fn request_reference_space(
            &self,
            kind: ReferenceSpaceKind,
        ) -> Result<MockSpace, XrError> {
            self.counters.borrow_mut().reference_space_requests += 1;
            Ok(match kind {
                ReferenceSpaceKind::Viewer => MockSpace::Viewer,
                ReferenceSpaceKind::Local => MockSpace::Local,
            })
        }

        async fn request_hit_test_source(
            &self,
            space: &MockSpace,
        ) -> Result<MockSource, XrError> {
            assert_eq!(
                *space,
                MockSpace::Viewer,
                "hit-test rays must be scoped to viewer space"
            );
            self.counters.borrow_mut().hit_test_source_requests += 1;
            if self.fail_hit_test_source {
                return Err(XrError::HitTestSourceUnavailable);
            }
            Ok(MockSource)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;
    use glam::Vec3;

    fn activated_tracker(session: &MockSession) -> HitTestTracker<MockSession> {
        let mut tracker = HitTestTracker::new();
        let token = tracker.begin_acquisition().unwrap();
        let acquisition = pollster::block_on(acquire(session)).unwrap();
        assert!(tracker.activate(token, acquisition));
        tracker
    }

    #[test]
    fn acquires_viewer_source_then_local_space() {
        let session = MockSession::new();
        let tracker = activated_tracker(&session);

        assert!(tracker.is_active());
        assert_eq!(tracker.local_space(), Some(&MockSpace::Local));

        let counters = session.counters.borrow();
        assert_eq!(counters.reference_space_requests, 2);
        assert_eq!(counters.hit_test_source_requests, 1);
    }

    #[test]
    fn initializes_once_per_session() {
        let session = MockSession::new();
        let mut tracker: HitTestTracker<MockSession> = HitTestTracker::new();

        let token = tracker.begin_acquisition();
        assert!(token.is_some());

        // more qualifying frames arrive before the acquisition resolves
        assert!(tracker.begin_acquisition().is_none());
        assert!(tracker.begin_acquisition().is_none());
        assert_eq!(tracker.state(), HitTestState::Acquiring);

        let acquisition = pollster::block_on(acquire(&session)).unwrap();
        assert!(tracker.activate(token.unwrap(), acquisition));
        assert!(tracker.is_active());

        // and none once active either
        assert!(tracker.begin_acquisition().is_none());
        assert_eq!(session.counters.borrow().hit_test_source_requests, 1);
    }

    #[test]
    fn pending_tracker_never_queries() {
        let session = MockSession::new();
        let mut tracker: HitTestTracker<MockSession> = HitTestTracker::new();
        tracker.begin_acquisition().unwrap();

        let frame = MockFrame::with_pose(Mat4::from_translation(Vec3::X));
        assert_eq!(tracker.step(&frame), TrackerStep::Inactive);
        let _ = session;
    }

    #[test]
    fn first_ranked_hit_wins() {
        let session = MockSession::new();
        let mut tracker = activated_tracker(&session);

        let closest = Mat4::from_translation(Vec3::new(0.0, 0.0, -1.0));
        let farther = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let frame = MockFrame {
            hits: vec![
                MockHit {
                    local_pose: Some(closest),
                },
                MockHit {
                    local_pose: Some(farther),
                },
            ],
        };

        assert_eq!(tracker.step(&frame), TrackerStep::Surface(closest));
    }

    #[test]
    fn empty_results_report_no_surface() {
        let session = MockSession::new();
        let mut tracker = activated_tracker(&session);

        assert_eq!(tracker.step(&MockFrame::empty()), TrackerStep::NoSurface);
    }

    #[test]
    fn unresolvable_pose_reports_no_surface() {
        let session = MockSession::new();
        let mut tracker = activated_tracker(&session);

        let frame = MockFrame {
            hits: vec![MockHit { local_pose: None }],
        };
        assert_eq!(tracker.step(&frame), TrackerStep::NoSurface);
    }

    #[test]
    fn session_end_releases_and_reinitializes() {
        let session = MockSession::new();
        let mut tracker = activated_tracker(&session);

        tracker.end_session();
        assert_eq!(tracker.state(), HitTestState::Uninitialized);
        assert!(tracker.local_space().is_none());

        let frame = MockFrame::with_pose(Mat4::IDENTITY);
        assert_eq!(tracker.step(&frame), TrackerStep::Inactive);

        // a new session re-runs the full two-step acquisition
        let token = tracker.begin_acquisition().unwrap();
        let acquisition = pollster::block_on(acquire(&session)).unwrap();
        assert!(tracker.activate(token, acquisition));
        assert!(tracker.is_active());
        assert_eq!(session.counters.borrow().hit_test_source_requests, 2);
    }

    #[test]
    fn stale_acquisition_is_discarded() {
        let session = MockSession::new();
        let mut tracker: HitTestTracker<MockSession> = HitTestTracker::new();

        let token = tracker.begin_acquisition().unwrap();
        let acquisition = pollster::block_on(acquire(&session)).unwrap();

        // the session ends while the acquisition is in flight
        tracker.end_session();
        assert!(!tracker.activate(token, acquisition));
        assert_eq!(tracker.state(), HitTestState::Uninitialized);
    }

    #[test]
    fn failed_acquisition_resets_to_uninitialized() {
        let mut session = MockSession::new();
        session.fail_hit_test_source = true;

        let mut tracker: HitTestTracker<MockSession> = HitTestTracker::new();
        let token = tracker.begin_acquisition().unwrap();

        let err = pollster::block_on(acquire(&session)).unwrap_err();
        tracker.fail_acquisition(token, &err);
        assert_eq!(tracker.state(), HitTestState::Uninitialized);

        // the next qualifying frame may request again
        assert!(tracker.begin_acquisition().is_some());
    }
}
