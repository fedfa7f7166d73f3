//! The demo application context.
//!
//! Camera, scene, marker handles and spin angles live here with single-owner
//! mutation rights; the frame step and the select handler are the only
//! writers.

use glam::{EulerRot, Mat4, Quat, Vec3};
use rand::Rng;

use crate::camera::Camera;
use crate::geometry::{
    generate_cone, generate_icosahedron, generate_ring, generate_torus, ConeOptions,
    IcosahedronOptions, RingOptions, TorusOptions,
};
use crate::hittest::{AcquisitionToken, HitTestTracker, TrackerStep};
use crate::loader::ModelFragment;
use crate::scene::{HemisphereLight, Material, Node, NodeId, Scene};
use crate::xr::XrSession;

/// Per-frame spin increment for the two procedural meshes (radians). Applied
/// per callback, not per second; rotation speed rides the host's frame rate.
pub const MESH_SPIN_STEP: f32 = 0.01;

/// Per-frame Y spin increment for the loaded model (radians).
pub const MODEL_SPIN_STEP: f32 = -0.0002;

/// Local offset pushed through the controller's world transform when
/// placing a cone.
pub const CONE_OFFSET: Vec3 = Vec3::new(0.0, 0.0, -0.6);

/// Vertical offset of the loaded model group.
pub const MODEL_HEIGHT: f32 = 5.0;

/// The model fetched at startup.
pub const MODEL_URL: &str =
    "https://raw.githubusercontent.com/immersive-web/webxr-samples/main/media/gltf/space/space.gltf";

const MESH_COLOR: Vec3 = Vec3::new(226.0 / 255.0, 35.0 / 255.0, 213.0 / 255.0);

fn shaded_material(color: Vec3) -> Material {
    Material {
        color,
        shininess: 6.0,
        opacity: 0.8,
        unlit: false,
    }
}

pub struct ArApp {
    pub scene: Scene,
    pub camera: Camera,

    icosahedron: NodeId,
    torus: NodeId,
    reticle: NodeId,
    model: Option<NodeId>,

    icosahedron_spin: (f32, f32),
    torus_spin: (f32, f32),
    model_spin: f32,
}

impl ArApp {
    /// Scene bootstrap: camera, light, the two procedural meshes and the
    /// hidden reticle. The model arrives later via [`ArApp::attach_model`]
    /// (or never, which every downstream path tolerates).
    pub fn new(aspect: f32) -> Self {
        let light = HemisphereLight {
            sky_color: Vec3::ONE,
            ground_color: Vec3::new(0xbb as f32 / 255.0, 0xbb as f32 / 255.0, 1.0),
            intensity: 1.0,
            position: Vec3::new(0.5, 1.0, 0.25),
        };
        let mut scene = Scene::new(light);

        let mut camera = Camera::new(70.0_f32.to_radians(), aspect, 0.01, 40.0);
        camera.position = Vec3::new(0.0, 0.0, 0.5);

        let icosahedron_mesh = scene.add_mesh(generate_icosahedron(IcosahedronOptions {
            radius: 0.1,
            detail: 1,
        }));
        let mut node = Node::with_mesh(icosahedron_mesh, shaded_material(MESH_COLOR));
        node.position = Vec3::new(0.0, 0.0, -0.5);
        let icosahedron = scene.add_node(node);

        let torus_mesh = scene.add_mesh(generate_torus(TorusOptions {
            radius: 1.0,
            tube: 0.4,
            radial_segments: 8,
            tubular_segments: 8,
        }));
        let mut node = Node::with_mesh(torus_mesh, shaded_material(MESH_COLOR));
        node.position = Vec3::new(2.0, 0.5, -3.0);
        let torus = scene.add_node(node);

        // Reticle: posed manually every frame from hit-test results, starts
        // hidden until a surface is found.
        let ring_mesh = scene.add_mesh(
            generate_ring(RingOptions {
                inner_radius: 0.15,
                outer_radius: 0.2,
                theta_segments: 32,
            })
            .rotate_x(-std::f32::consts::FRAC_PI_2),
        );
        let mut node = Node::with_mesh(
            ring_mesh,
            Material {
                unlit: true,
                ..Material::default()
            },
        );
        node.visible = false;
        node.set_matrix(Mat4::IDENTITY);
        let reticle = scene.add_node(node);

        Self {
            scene,
            camera,
            icosahedron,
            torus,
            reticle,
            model: None,
            icosahedron_spin: (0.0, 0.0),
            torus_spin: (0.0, 0.0),
            model_spin: 0.0,
        }
    }

    pub fn reticle(&self) -> NodeId {
        self.reticle
    }

    pub fn icosahedron(&self) -> NodeId {
        self.icosahedron
    }

    pub fn torus(&self) -> NodeId {
        self.torus
    }

    pub fn model(&self) -> Option<NodeId> {
        self.model
    }

    /// One frame-loop invocation. With an XR frame handle present this runs
    /// the hit-test tracker (kicking off its lazy acquisition on the first
    /// qualifying frame); the mesh rotations always advance. Returns a token
    /// when the caller should spawn [`crate::hittest::acquire`] for this
    /// session.
    pub fn frame<S: XrSession>(
        &mut self,
        tracker: &mut HitTestTracker<S>,
        xr_frame: Option<&S::Frame>,
    ) -> Option<AcquisitionToken> {
        let mut token = None;

        if let Some(frame) = xr_frame {
            token = tracker.begin_acquisition();
            match tracker.step(frame) {
                TrackerStep::Surface(pose) => {
                    let reticle = self.scene.node_mut(self.reticle);
                    reticle.visible = true;
                    reticle.set_matrix(pose);
                }
                TrackerStep::NoSurface => {
                    // transform stays stale on purpose; the marker is hidden
                    self.scene.node_mut(self.reticle).visible = false;
                }
                TrackerStep::Inactive => {}
            }
        }

        self.advance();
        token
    }

    /// The unconditional per-frame mutation: spin the procedural meshes and,
    /// when present, the loaded model.
    pub fn advance(&mut self) {
        self.icosahedron_spin.0 += MESH_SPIN_STEP;
        self.icosahedron_spin.1 += MESH_SPIN_STEP;
        self.torus_spin.0 += MESH_SPIN_STEP;
        self.torus_spin.1 += MESH_SPIN_STEP;

        let (ix, iy) = self.icosahedron_spin;
        self.scene.node_mut(self.icosahedron).rotation = Quat::from_euler(EulerRot::XYZ, ix, iy, 0.0);
        let (tx, ty) = self.torus_spin;
        self.scene.node_mut(self.torus).rotation = Quat::from_euler(EulerRot::XYZ, tx, ty, 0.0);

        if let Some(model) = self.model {
            self.model_spin += MODEL_SPIN_STEP;
            self.scene.node_mut(model).rotation = Quat::from_rotation_y(self.model_spin);
        }
    }

    /// Attach the asynchronously fetched model at its fixed vertical offset.
    pub fn attach_model(&mut self, fragment: ModelFragment) {
        let mut group = Node::new();
        group.position = Vec3::new(0.0, MODEL_HEIGHT, 0.0);
        let group_id = self.scene.add_node(group);

        for part in fragment.meshes {
            let mesh = self.scene.add_mesh(part.mesh);
            let mut node = Node::with_mesh(mesh, part.material);
            node.parent = Some(group_id);
            node.set_matrix(part.transform);
            self.scene.add_node(node);
        }

        self.model = Some(group_id);
        tracing::info!("model attached ({} nodes)", self.scene.node_count());
    }

    /// Placement action for a select gesture: a random-hue cone pushed
    /// through the controller's current world transform.
    ///
    /// Known demo limitation: there is no cap on spawned cones, they
    /// accumulate for the session's lifetime.
    pub fn place_cone(&mut self, controller_world: Mat4) -> NodeId {
        let hue = rand::thread_rng().gen::<f32>();
        self.place_cone_with_hue(controller_world, hue)
    }

    pub fn place_cone_with_hue(&mut self, controller_world: Mat4, hue: f32) -> NodeId {
        let mesh = self.scene.add_mesh(
            generate_cone(ConeOptions {
                radius: 0.1,
                height: 0.2,
                radial_segments: 32,
            })
            .rotate_x(std::f32::consts::FRAC_PI_2),
        );

        let mut node = Node::with_mesh(mesh, shaded_material(hue_to_rgb(hue)));
        node.position = controller_world.transform_point3(CONE_OFFSET);
        // orient toward the camera, same as the controller
        let (_, rotation, _) = controller_world.to_scale_rotation_translation();
        node.rotation = rotation;

        self.scene.add_node(node)
    }

    /// Viewport resize: camera aspect first, the renderer follows with the
    /// surface before the next render.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.set_aspect(width, height);
    }
}

/// Map a hue in [0, 1) to a fully saturated RGB color.
fn hue_to_rgb(hue: f32) -> Vec3 {
    let h = hue.rem_euclid(1.0) * 6.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    match h as u32 {
        0 => Vec3::new(1.0, x, 0.0),
        1 => Vec3::new(x, 1.0, 0.0),
        2 => Vec3::new(0.0, 1.0, x),
        3 => Vec3::new(0.0, x, 1.0),
        4 => Vec3::new(x, 0.0, 1.0),
        _ => Vec3::new(1.0, 0.0, x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::MeshData;
    use crate::hittest::mock::{MockFrame, MockSession};
    use crate::hittest::{acquire, HitTestState};
    use crate::loader::ModelMesh;

    fn quat_approx_eq(a: Quat, b: Quat) -> bool {
        a.dot(b).abs() > 1.0 - 1e-6
    }

    fn test_fragment() -> ModelFragment {
        ModelFragment {
            meshes: vec![ModelMesh {
                mesh: MeshData::default(),
                transform: Mat4::IDENTITY,
                material: Material::default(),
            }],
        }
    }

    /// Drive one full XR frame against a scripted session, delivering the
    /// acquisition synchronously the way `spawn_local` would between frames.
    fn drive_frame(
        app: &mut ArApp,
        tracker: &mut HitTestTracker<MockSession>,
        session: &MockSession,
        frame: &MockFrame,
    ) {
        if let Some(token) = app.frame(tracker, Some(frame)) {
            let acquisition = pollster::block_on(acquire(session)).unwrap();
            assert!(tracker.activate(token, acquisition));
        }
    }

    #[test]
    fn meshes_spin_by_fixed_step() {
        let mut app = ArApp::new(1.0);

        for _ in 0..10 {
            app.advance();
        }

        let expected = Quat::from_euler(EulerRot::XYZ, 0.1, 0.1, 0.0);
        assert!(quat_approx_eq(
            app.scene.node(app.icosahedron()).rotation,
            expected
        ));
        assert!(quat_approx_eq(app.scene.node(app.torus()).rotation, expected));
    }

    #[test]
    fn missing_model_is_a_per_frame_noop() {
        let mut app = ArApp::new(1.0);
        let nodes_before = app.scene.node_count();

        // the fetch never resolves; N frames later nothing blew up and the
        // procedural meshes kept spinning
        for _ in 0..100 {
            app.advance();
        }

        assert!(app.model().is_none());
        assert_eq!(app.scene.node_count(), nodes_before);
        let expected = Quat::from_euler(EulerRot::XYZ, 1.0, 1.0, 0.0);
        assert!(quat_approx_eq(
            app.scene.node(app.icosahedron()).rotation,
            expected
        ));
    }

    #[test]
    fn attached_model_spins_slowly() {
        let mut app = ArApp::new(1.0);
        app.attach_model(test_fragment());
        let model = app.model().unwrap();

        let world = app.scene.world_matrix(model);
        let origin = world.transform_point3(Vec3::ZERO);
        assert!((origin.y - MODEL_HEIGHT).abs() < 1e-6);

        for _ in 0..5 {
            app.advance();
        }
        let expected = Quat::from_rotation_y(5.0 * MODEL_SPIN_STEP);
        assert!(quat_approx_eq(app.scene.node(model).rotation, expected));
    }

    #[test]
    fn resize_updates_camera_aspect() {
        let mut app = ArApp::new(1.0);
        app.resize(1024, 768);
        assert!((app.camera.aspect - 1024.0 / 768.0).abs() < 1e-6);
    }

    #[test]
    fn cone_lands_in_front_of_controller() {
        let mut app = ArApp::new(1.0);

        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let controller = Mat4::from_rotation_translation(rotation, Vec3::new(1.0, 2.0, 3.0));

        let before = app.scene.node_count();
        let cone = app.place_cone_with_hue(controller, 0.3);
        assert_eq!(app.scene.node_count(), before + 1);

        let node = app.scene.node(cone);
        let expected = controller.transform_point3(CONE_OFFSET);
        assert!((node.position - expected).length() < 1e-5);
        assert!(quat_approx_eq(node.rotation, rotation));
    }

    #[test]
    fn every_gesture_appends_exactly_one_cone() {
        let mut app = ArApp::new(1.0);
        let before = app.scene.node_count();

        for i in 0..4 {
            app.place_cone(Mat4::from_translation(Vec3::splat(i as f32)));
        }
        assert_eq!(app.scene.node_count(), before + 4);
    }

    #[test]
    fn reticle_follows_first_hit_in_local_space() {
        let mut app = ArApp::new(1.0);
        let mut tracker = HitTestTracker::new();
        let session = MockSession::new();

        // frame 1: lazy acquisition kicks off, tracker not active yet
        drive_frame(&mut app, &mut tracker, &session, &MockFrame::empty());
        assert!(tracker.is_active());
        assert!(!app.scene.node(app.reticle()).visible);

        // frame 2: a surface is found
        let pose = Mat4::from_translation(Vec3::new(0.2, 0.0, -1.5));
        drive_frame(&mut app, &mut tracker, &session, &MockFrame::with_pose(pose));

        let reticle = app.scene.node(app.reticle());
        assert!(reticle.visible);
        assert_eq!(reticle.local_matrix(), pose);
    }

    #[test]
    fn lost_surface_hides_reticle_but_keeps_transform() {
        let mut app = ArApp::new(1.0);
        let mut tracker = HitTestTracker::new();
        let session = MockSession::new();

        let pose = Mat4::from_translation(Vec3::new(0.0, 0.5, -2.0));
        drive_frame(&mut app, &mut tracker, &session, &MockFrame::empty());
        drive_frame(&mut app, &mut tracker, &session, &MockFrame::with_pose(pose));
        assert!(app.scene.node(app.reticle()).visible);

        drive_frame(&mut app, &mut tracker, &session, &MockFrame::empty());

        let reticle = app.scene.node(app.reticle());
        assert!(!reticle.visible);
        // stale transform is fine while hidden
        assert_eq!(reticle.local_matrix(), pose);
    }

    #[test]
    fn non_immersive_frames_skip_the_tracker() {
        let mut app = ArApp::new(1.0);
        let mut tracker: HitTestTracker<MockSession> = HitTestTracker::new();

        // no frame handle: no acquisition, rotations still advance
        assert!(app.frame(&mut tracker, None).is_none());
        assert_eq!(tracker.state(), HitTestState::Uninitialized);

        let expected = Quat::from_euler(EulerRot::XYZ, MESH_SPIN_STEP, MESH_SPIN_STEP, 0.0);
        assert!(quat_approx_eq(
            app.scene.node(app.icosahedron()).rotation,
            expected
        ));
    }

    #[test]
    fn session_end_then_restart_reinitializes() {
        let mut app = ArApp::new(1.0);
        let mut tracker = HitTestTracker::new();
        let session = MockSession::new();

        drive_frame(&mut app, &mut tracker, &session, &MockFrame::empty());
        assert!(tracker.is_active());

        tracker.end_session();
        assert_eq!(tracker.state(), HitTestState::Uninitialized);

        drive_frame(&mut app, &mut tracker, &session, &MockFrame::empty());
        assert!(tracker.is_active());
        assert_eq!(session.counters.borrow().hit_test_source_requests, 2);
    }
}
