//! WASM bindings for the web viewer.
//!
//! The JS host owns the WebGL presentation layer; this module owns the scene
//! state, the frame loop and the WebXR hit-test plumbing, and exports flat
//! buffers for the host to upload. Session acquisition itself stays on the
//! host side — `install_ar_button` only declares the `hit-test` requirement.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Mat4;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};

use crate::app::{ArApp, MODEL_URL};
use crate::camera::CameraUniform;
use crate::hittest::{acquire, HitTestTracker};
use crate::loader;
use crate::xr::{ReferenceSpaceKind, XrError, XrFrame, XrHit, XrSession};

fn js_err(e: JsValue) -> XrError {
    XrError::Platform(format!("{e:?}"))
}

// -----------------------------
// WebXR adapter
// -----------------------------

/// `xr::XrSession` implemented over the browser session object.
#[derive(Clone)]
pub struct WebXrSession {
    raw: web_sys::XrSession,
}

impl WebXrSession {
    pub fn new(raw: web_sys::XrSession) -> Self {
        Self { raw }
    }
}

impl XrSession for WebXrSession {
    type Space = web_sys::XrReferenceSpace;
    type HitTestSource = web_sys::XrHitTestSource;
    type Frame = WebXrFrame;

    async fn request_reference_space(
        &self,
        kind: ReferenceSpaceKind,
    ) -> Result<Self::Space, XrError> {
        let ty = match kind {
            ReferenceSpaceKind::Viewer => web_sys::XrReferenceSpaceType::Viewer,
            ReferenceSpaceKind::Local => web_sys::XrReferenceSpaceType::Local,
        };
        let value = JsFuture::from(self.raw.request_reference_space(ty))
            .await
            .map_err(js_err)?;
        value
            .dyn_into()
            .map_err(|_| XrError::ReferenceSpaceUnavailable(kind))
    }

    async fn request_hit_test_source(
        &self,
        space: &Self::Space,
    ) -> Result<Self::HitTestSource, XrError> {
        let options = web_sys::XrHitTestOptionsInit::new(space.as_ref());
        let value = JsFuture::from(self.raw.request_hit_test_source(&options))
            .await
            .map_err(js_err)?;
        value
            .dyn_into()
            .map_err(|_| XrError::HitTestSourceUnavailable)
    }
}

pub struct WebXrFrame(web_sys::XrFrame);

impl XrFrame for WebXrFrame {
    type Space = web_sys::XrReferenceSpace;
    type HitTestSource = web_sys::XrHitTestSource;
    type Hit = WebXrHit;

    fn hit_test_results(&self, source: &Self::HitTestSource) -> Vec<WebXrHit> {
        self.0
            .get_hit_test_results(source)
            .iter()
            .filter_map(|v| v.dyn_into::<web_sys::XrHitTestResult>().ok())
            .map(WebXrHit)
            .collect()
    }
}

pub struct WebXrHit(web_sys::XrHitTestResult);

impl XrHit for WebXrHit {
    type Space = web_sys::XrReferenceSpace;

    fn pose(&self, space: &Self::Space) -> Option<Mat4> {
        let pose = self.0.get_pose(space)?;
        let matrix = pose.transform().matrix();
        if matrix.len() != 16 {
            return None;
        }
        Some(Mat4::from_cols_slice(&matrix))
    }
}

// -----------------------------
// Engine handle
// -----------------------------

struct EngineInner {
    app: ArApp,
    tracker: HitTestTracker<WebXrSession>,
    session: Option<WebXrSession>,
}

#[wasm_bindgen]
pub struct Engine {
    inner: Rc<RefCell<EngineInner>>,
}

#[wasm_bindgen]
impl Engine {
    #[wasm_bindgen(constructor)]
    pub fn new(width: u32, height: u32) -> Engine {
        let inner = Rc::new(RefCell::new(EngineInner {
            app: ArApp::new(width.max(1) as f32 / height.max(1) as f32),
            tracker: HitTestTracker::new(),
            session: None,
        }));

        // one-shot model fetch; a failure just leaves the model absent
        {
            let inner = Rc::clone(&inner);
            spawn_local(async move {
                match loader::fetch_fragment(MODEL_URL).await {
                    Ok(fragment) => inner.borrow_mut().app.attach_model(fragment),
                    Err(e) => tracing::warn!("model fetch failed, continuing without it: {e:#}"),
                }
            });
        }

        Engine { inner }
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.inner.borrow_mut().app.resize(width, height);
    }

    /// Advance one non-immersive frame (the plain-canvas loop).
    pub fn advance(&self) {
        self.inner.borrow_mut().app.advance();
    }

    pub fn camera_view_projection(&self) -> Vec<f32> {
        let inner = self.inner.borrow();
        let uniform = CameraUniform::from_camera(&inner.app.camera);
        uniform.view_proj.iter().flatten().copied().collect()
    }

    pub fn mesh_count(&self) -> u32 {
        self.inner.borrow().app.scene.mesh_count() as u32
    }

    pub fn mesh_positions(&self, index: u32) -> Vec<f32> {
        let inner = self.inner.borrow();
        let mesh = inner.app.scene.mesh(crate::scene::MeshId::from_index(index as usize));
        mesh.positions.iter().flatten().copied().collect()
    }

    pub fn mesh_normals(&self, index: u32) -> Vec<f32> {
        let inner = self.inner.borrow();
        let mesh = inner.app.scene.mesh(crate::scene::MeshId::from_index(index as usize));
        mesh.normals.iter().flatten().copied().collect()
    }

    pub fn mesh_indices(&self, index: u32) -> Vec<u32> {
        let inner = self.inner.borrow();
        let mesh = inner.app.scene.mesh(crate::scene::MeshId::from_index(index as usize));
        mesh.indices.clone()
    }

    /// Flat draw list for the host renderer, 21 floats per visible node:
    /// mesh index, world matrix (16, column major), rgb color, opacity.
    pub fn draw_list(&self) -> Vec<f32> {
        let inner = self.inner.borrow();
        let scene = &inner.app.scene;

        let mut out = Vec::new();
        for id in scene.node_ids() {
            let node = scene.node(id);
            let mesh = match node.mesh {
                Some(mesh) if scene.effectively_visible(id) => mesh,
                _ => continue,
            };
            out.push(mesh.index() as f32);
            out.extend_from_slice(&scene.world_matrix(id).to_cols_array());
            let c = node.material.color;
            out.extend_from_slice(&[c.x, c.y, c.z, node.material.opacity]);
        }
        out
    }

    /// Adopt an immersive session the host just acquired: hook `end` and
    /// `select`, then drive the XR frame loop.
    pub fn start_session(&self, session: web_sys::XrSession) {
        let session = WebXrSession::new(session);
        self.inner.borrow_mut().session = Some(session.clone());

        self.hook_session_end(&session);
        self.hook_select(&session);
        self.run_frame_loop(session);
    }
}

impl Engine {
    fn hook_session_end(&self, session: &WebXrSession) {
        let inner = Rc::clone(&self.inner);
        let on_end = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event| {
            let mut inner = inner.borrow_mut();
            inner.tracker.end_session();
            inner.session = None;
            tracing::info!("immersive session ended");
        });
        let _ = session
            .raw
            .add_event_listener_with_callback("end", on_end.as_ref().unchecked_ref());
        on_end.forget();
    }

    fn hook_select(&self, session: &WebXrSession) {
        let inner = Rc::clone(&self.inner);
        let on_select = Closure::<dyn FnMut(web_sys::XrInputSourceEvent)>::new(
            move |event: web_sys::XrInputSourceEvent| {
                let mut inner = inner.borrow_mut();
                let Some(local_space) = inner.tracker.local_space().cloned() else {
                    return;
                };
                let ray_space = event.input_source().target_ray_space();
                let Some(pose) = event.frame().get_pose(&ray_space, local_space.as_ref()) else {
                    return;
                };
                let matrix = pose.transform().matrix();
                if matrix.len() == 16 {
                    inner.app.place_cone(Mat4::from_cols_slice(&matrix));
                }
            },
        );
        let _ = session
            .raw
            .add_event_listener_with_callback("select", on_select.as_ref().unchecked_ref());
        on_select.forget();
    }

    fn run_frame_loop(&self, session: WebXrSession) {
        let inner = Rc::clone(&self.inner);
        let first_frame_session = session.clone();

        // self-rescheduling rAF closure
        let callback: Rc<RefCell<Option<Closure<dyn FnMut(f64, web_sys::XrFrame)>>>> =
            Rc::new(RefCell::new(None));
        let callback_handle = Rc::clone(&callback);

        *callback.borrow_mut() = Some(Closure::new(move |_time: f64, raw: web_sys::XrFrame| {
            let frame = WebXrFrame(raw);

            let token = {
                let mut guard = inner.borrow_mut();
                let state = &mut *guard;
                if state.session.is_none() {
                    // session ended; stop rescheduling
                    return;
                }
                state.app.frame(&mut state.tracker, Some(&frame))
            };

            if let Some(token) = token {
                let inner = Rc::clone(&inner);
                let session = session.clone();
                spawn_local(async move {
                    match acquire(&session).await {
                        Ok(acquisition) => {
                            inner.borrow_mut().tracker.activate(token, acquisition);
                        }
                        Err(e) => inner.borrow_mut().tracker.fail_acquisition(token, &e),
                    }
                });
            }

            if let Some(cb) = callback_handle.borrow().as_ref() {
                session.raw.request_animation_frame(cb.as_ref().unchecked_ref());
            }
        }));

        if let Some(cb) = callback.borrow().as_ref() {
            first_frame_session
                .raw
                .request_animation_frame(cb.as_ref().unchecked_ref());
        }
    }
}

// -----------------------------
// Session gate
// -----------------------------

/// Check for immersive AR support; absent `navigator.xr` counts as
/// unsupported.
pub async fn ar_supported() -> bool {
    let Some(win) = web_sys::window() else {
        return false;
    };
    let xr = win.navigator().xr();
    if xr.is_undefined() {
        return false;
    }
    match JsFuture::from(xr.is_session_supported(web_sys::XrSessionMode::ImmersiveAr)).await {
        Ok(value) => value.as_bool().unwrap_or(false),
        Err(_) => false,
    }
}

/// Request an immersive AR session declaring the `hit-test` requirement.
/// Lifecycle beyond this call belongs to the host platform.
pub async fn request_ar_session() -> Result<web_sys::XrSession, XrError> {
    let win = web_sys::window().ok_or_else(|| XrError::Platform("no window".into()))?;
    let xr = win.navigator().xr();

    let required = js_sys::Array::new();
    required.push(&JsValue::from_str("hit-test"));
    let init = web_sys::XrSessionInit::new();
    init.set_required_features(required.as_ref());

    let value = JsFuture::from(
        xr.request_session_with_options(web_sys::XrSessionMode::ImmersiveAr, &init),
    )
    .await
    .map_err(js_err)?;
    value
        .dyn_into()
        .map_err(|_| XrError::Platform("request_session returned a non-session".into()))
}

/// Append the activation control, or a visible warning when the capability
/// check fails. Non-fatal either way.
#[wasm_bindgen]
pub fn install_ar_button(engine: &Engine) {
    let inner = Rc::clone(&engine.inner);

    spawn_local(async move {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };
        let Some(body) = document.body() else {
            return;
        };

        if !ar_supported().await {
            if let Ok(warning) = document.create_element("div") {
                warning.set_text_content(Some(
                    "Immersive AR is not available on this device or browser.",
                ));
                let _ = body.append_child(&warning);
            }
            return;
        }

        let Ok(button) = document.create_element("button") else {
            return;
        };
        button.set_text_content(Some("ENTER AR"));

        let on_click = Closure::<dyn FnMut()>::new(move || {
            let inner = Rc::clone(&inner);
            spawn_local(async move {
                match request_ar_session().await {
                    Ok(session) => Engine {
                        inner: Rc::clone(&inner),
                    }
                    .start_session(session),
                    Err(e) => tracing::warn!("failed to start immersive session: {e}"),
                }
            });
        });
        let _ = button.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref());
        on_click.forget();

        let _ = body.append_child(&button);
    });
}

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}
