use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use arview::loader;
use arview::renderer::Renderer;
use arview::ArApp;

/// Looked for at startup; absence just means "no model", same as a failed
/// fetch in the web viewer.
const MODEL_PATH: &str = "assets/model.gltf";

struct State {
    renderer: Renderer,
    app: ArApp,
}

impl State {
    async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        let renderer = Renderer::new(window).await?;

        let mut app = ArApp::new(size.width.max(1) as f32 / size.height.max(1) as f32);

        // fire-once asset load; a failure leaves the model absent and every
        // per-frame path no-ops on it
        match loader::load_fragment(Path::new(MODEL_PATH)) {
            Ok(fragment) => app.attach_model(fragment),
            Err(e) => tracing::warn!("model unavailable, continuing without it: {e:#}"),
        }

        Ok(Self { renderer, app })
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.renderer.resize(new_size);
        self.app.resize(new_size.width, new_size.height);
    }

    fn frame(&mut self) {
        // native build runs the loop without an immersive session; only the
        // web viewer feeds XR frames into the tracker
        self.app.advance();
        if let Err(e) = self.renderer.render(&self.app.scene, &self.app.camera) {
            tracing::error!("render failed: {e:#}");
        }
    }
}

struct App {
    window: Option<Arc<Window>>,
    state: Option<State>,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            state: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let attrs = Window::default_attributes()
            .with_title("AR Viewer")
            .with_inner_size(PhysicalSize::new(1280, 720));

        let window = Arc::new(event_loop.create_window(attrs).unwrap());

        // capability gate: no usable adapter is non-fatal, it just means no
        // rendering loop on this machine
        match pollster::block_on(State::new(Arc::clone(&window))) {
            Ok(state) => {
                self.window = Some(window);
                self.state = Some(state);
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }
            Err(e) => {
                tracing::warn!("rendering capability unavailable: {e:#}");
                eprintln!("Your system does not support the required rendering capability.");
                eprintln!("The scene cannot be displayed here.");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.resize(size);
                }
            }

            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    state.frame();
                }

                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            _ => {}
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arview=info,wgpu_core=warn,wgpu_hal=warn".into()),
        )
        .init();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}
