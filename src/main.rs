//! Ripple - an interactive water pool
//!
//! A windowed demo: a shadow-lit pool scene with a simulated water surface.
//! Click the water to disturb it, drag with the right button to orbit.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use glam::Vec3;
use rand::Rng;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use ripple::camera::Camera;
use ripple::cli::Args;
use ripple::lights::{DirectionalLight, Light, LightColor, PointLight, SpotLight};
use ripple::params::{CameraConfig, RecordingConfig, RenderConfig, TouchConfig, WaterPhysics};
use ripple::rendering::{FrameInputs, GfxContext, RenderSystem};
use ripple::scene::Scene;
use ripple::shadow::{PointShadowMap, SpotShadowMap};
use ripple::water::{BackendKind, WaterSurface};

/// GPU-backed state, created once the window exists.
struct Gpu {
    gfx: GfxContext,
    renderer: RenderSystem,
    scene: Scene,
    water: WaterSurface,
    point_shadow: PointShadowMap,
    spot_shadow: SpotShadowMap,
}

/// Main application state
struct App {
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,

    camera: Camera,
    lights: Vec<Light>,

    physics: WaterPhysics,
    backend: BackendKind,
    shadow_resolution: u32,
    render_config: RenderConfig,
    touch_config: TouchConfig,
    recording: Option<RecordingConfig>,

    start_time: Instant,
    frame_num: usize,
    frames_since_title: u32,
    last_title_update: Instant,

    // Pointer state
    cursor_pos: (f32, f32),
    left_down: bool,
    right_down: bool,
    track_anchor: (f32, f32),
    track_rot: (f32, f32),
}

impl App {
    fn new(args: &Args) -> Result<Self> {
        let render_config = RenderConfig::default();
        let camera = Camera::new(&CameraConfig::default(), &render_config);

        // One shadow-casting light of each kind, plus a directional fill
        // that the current shading pass does not consume.
        let lights = vec![
            Light::Point(PointLight {
                color: LightColor {
                    ambient: Vec3::new(0.06, 0.06, 0.07),
                    intensity: Vec3::new(0.9, 0.85, 0.8),
                },
                position: Vec3::new(0.0, 2.5, 0.0),
                range: 16.0,
                linear_att: 0.35,
            }),
            Light::Spot(SpotLight {
                color: LightColor {
                    ambient: Vec3::new(0.03, 0.03, 0.03),
                    intensity: Vec3::new(0.8, 0.75, 0.6),
                },
                position: Vec3::new(-5.0, 4.0, -3.0),
                range: 24.0,
                linear_att: 0.25,
                direction: Vec3::new(0.55, -0.45, 0.33),
                fov: 0.6,
                directional_att: 2.0,
            }),
            Light::Directional(DirectionalLight {
                color: LightColor {
                    ambient: Vec3::splat(0.02),
                    intensity: Vec3::splat(0.1),
                },
                direction: Vec3::new(-0.3, -1.0, -0.2),
            }),
        ];

        Ok(Self {
            window: None,
            gpu: None,
            camera,
            lights,
            physics: args.water_physics(),
            backend: args.parse_backend(),
            shadow_resolution: args.shadow_config().resolution,
            render_config,
            touch_config: TouchConfig::default(),
            recording: args.create_recording_config()?,
            start_time: Instant::now(),
            frame_num: 0,
            frames_since_title: 0,
            last_title_update: Instant::now(),
            cursor_pos: (0.0, 0.0),
            left_down: false,
            right_down: false,
            track_anchor: (0.0, 0.0),
            track_rot: (0.0, 0.0),
        })
    }

    fn first_point_light(&self) -> Option<&PointLight> {
        self.lights.iter().find_map(|l| match l {
            Light::Point(p) => Some(p),
            _ => None,
        })
    }

    fn first_spot_light(&self) -> Option<&SpotLight> {
        self.lights.iter().find_map(|l| match l {
            Light::Spot(s) => Some(s),
            _ => None,
        })
    }

    fn build_gpu(&mut self, window: Arc<Window>) -> Result<Gpu> {
        let gfx = pollster::block_on(GfxContext::new(window, self.recording.is_some()))?;

        let point_shadow = PointShadowMap::new(&gfx.device, self.shadow_resolution)?;
        let spot_shadow = SpotShadowMap::new(&gfx.device, self.shadow_resolution)?;
        let renderer = RenderSystem::new(&gfx, &point_shadow, &spot_shadow, self.recording.clone())?;
        let scene = Scene::demo(
            &gfx.device,
            &gfx.queue,
            self.physics.dim_x_m / 2.0,
            self.physics.dim_z_m / 2.0,
        )?;
        let water = WaterSurface::new(
            &gfx.device,
            &gfx.queue,
            gfx.config.format,
            renderer.sky_view(),
            self.physics.clone(),
            self.backend,
        )?;

        Ok(Gpu {
            gfx,
            renderer,
            scene,
            water,
            point_shadow,
            spot_shadow,
        })
    }

    fn pixel_to_ndc(&self, x: f32, y: f32) -> (f32, f32) {
        let Some(gpu) = &self.gpu else {
            return (0.0, 0.0);
        };
        (
            x / gpu.gfx.config.width as f32 * 2.0 - 1.0,
            -(y / gpu.gfx.config.height as f32) * 2.0 + 1.0,
        )
    }

    /// Map the cursor onto the water plane and disturb the surface there.
    fn touch_at_cursor(&mut self, strength: f64) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let (width, height) = (gpu.gfx.config.width as f32, gpu.gfx.config.height as f32);
        let proj = self.camera.projection(width / height, &self.render_config);
        let Some((world_x, world_z)) = self.camera.pick_plane(
            self.cursor_pos.0,
            self.cursor_pos.1,
            width,
            height,
            self.physics.surface_y_m,
            &proj,
        ) else {
            return;
        };
        let (gx, gz) = self.physics.world_to_grid(world_x, world_z);
        gpu.water.touch(
            &gpu.gfx.device,
            &gpu.gfx.queue,
            gx,
            gz,
            strength,
            self.touch_config.radius_m,
        );
    }

    /// Drop a random rain touch somewhere on the grid.
    fn rain_touch(&mut self) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let mut rng = rand::thread_rng();
        let gx = rng.gen_range(0..self.physics.grid_x) as i64;
        let gz = rng.gen_range(0..self.physics.grid_z) as i64;
        let distance = rng.gen_range(
            self.touch_config.rain_radius_min_m..self.touch_config.rain_radius_max_m,
        );
        gpu.water.touch(
            &gpu.gfx.device,
            &gpu.gfx.queue,
            gx,
            gz,
            self.touch_config.rain_strength,
            distance,
        );
    }

    fn handle_key(&mut self, code: KeyCode, event_loop: &ActiveEventLoop) {
        match code {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::KeyW => self.camera.fly(Vec3::new(0.0, 0.0, -1.0)),
            KeyCode::KeyS => self.camera.fly(Vec3::new(0.0, 0.0, 1.0)),
            KeyCode::KeyA => self.camera.fly(Vec3::new(-1.0, 0.0, 0.0)),
            KeyCode::KeyD => self.camera.fly(Vec3::new(1.0, 0.0, 0.0)),
            KeyCode::KeyQ => self.camera.fly(Vec3::new(0.0, 1.0, 0.0)),
            KeyCode::KeyE => self.camera.fly(Vec3::new(0.0, -1.0, 0.0)),
            KeyCode::KeyT => self.rain_touch(),
            _ => {}
        }
    }

    fn render_frame(&mut self, event_loop: &ActiveEventLoop) {
        let now_usec = self.start_time.elapsed().as_micros() as u64;

        let Some(point_light) = self.first_point_light().copied() else {
            return;
        };
        let Some(spot_light) = self.first_spot_light().copied() else {
            return;
        };
        let Some(gpu) = &mut self.gpu else {
            return;
        };

        gpu.water
            .update_model(&gpu.gfx.device, &gpu.gfx.queue, now_usec, false);

        let aspect = gpu.gfx.config.width as f32 / gpu.gfx.config.height as f32;
        let proj = self.camera.projection(aspect, &self.render_config);
        let view_proj = proj * self.camera.view_matrix();

        let inputs = FrameInputs {
            view_proj,
            camera_pos: self.camera.position,
            scene: &gpu.scene,
            water: &gpu.water,
            point_shadow: &gpu.point_shadow,
            spot_shadow: &gpu.spot_shadow,
            point_light: &point_light,
            spot_light: &spot_light,
            frame_num: self.frame_num,
        };

        match gpu.renderer.render(&gpu.gfx, &inputs) {
            Ok(()) => {
                self.frame_num += 1;
                self.frames_since_title += 1;
            }
            Err(wgpu::SurfaceError::Lost) => {
                let size = gpu.gfx.size;
                gpu.gfx.resize(size);
                gpu.renderer.resize(&gpu.gfx);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("wgpu out of memory, exiting");
                event_loop.exit();
            }
            Err(e) => log::error!("render error: {:?}", e),
        }

        if let Some(recording) = &self.recording {
            if self.frame_num >= recording.total_frames() {
                log::info!("recording finished after {} frames", self.frame_num);
                event_loop.exit();
            }
        }

        // Title-bar frame time readout, refreshed about once a second.
        if self.last_title_update.elapsed().as_secs_f32() >= 1.0 {
            let ms = self.last_title_update.elapsed().as_secs_f32() * 1000.0
                / self.frames_since_title.max(1) as f32;
            if let Some(window) = &self.window {
                window.set_title(&format!("Ripple - water pool, frame {:5.2} ms", ms));
            }
            self.frames_since_title = 0;
            self.last_title_update = Instant::now();
        }
    }
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized
        }

        let window_attributes = Window::default_attributes()
            .with_title("Ripple - water pool")
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.render_config.window_width,
                self.render_config.window_height,
            ));
        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match self.build_gpu(Arc::clone(&window)) {
            Ok(gpu) => {
                self.window = Some(window);
                self.gpu = Some(gpu);
                self.start_time = Instant::now();
                log::info!("ripple is running, press ESC to quit");
            }
            Err(e) => {
                // Construction failures are fatal; there is no degraded mode.
                log::error!("initialization failed: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.gfx.resize(size);
                    gpu.renderer.resize(&gpu.gfx);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(code),
                        ..
                    },
                ..
            } => self.handle_key(code, event_loop),
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_pos = (position.x as f32, position.y as f32);
                if self.right_down {
                    let (ndc_x, ndc_y) = self.pixel_to_ndc(self.cursor_pos.0, self.cursor_pos.1);
                    let two_pi = std::f32::consts::TAU;
                    self.camera.rot_y = (self.track_rot.1 + (ndc_x - self.track_anchor.0)) % two_pi;
                    self.camera.rot_x = (self.track_rot.0 + (ndc_y - self.track_anchor.1)) % two_pi;
                }
                if self.left_down {
                    self.touch_at_cursor(self.touch_config.drag_strength);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match (button, state) {
                (MouseButton::Left, ElementState::Pressed) => {
                    self.left_down = true;
                    self.touch_at_cursor(self.touch_config.click_strength);
                }
                (MouseButton::Left, ElementState::Released) => self.left_down = false,
                (MouseButton::Right, ElementState::Pressed) => {
                    self.right_down = true;
                    self.track_anchor = self.pixel_to_ndc(self.cursor_pos.0, self.cursor_pos.1);
                    self.track_rot = (self.camera.rot_x, self.camera.rot_y);
                }
                (MouseButton::Right, ElementState::Released) => self.right_down = false,
                _ => {}
            },
            WindowEvent::MouseWheel { delta, .. } => {
                let y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32,
                };
                self.camera.wheel(y);
            }
            WindowEvent::RedrawRequested => self.render_frame(event_loop),
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging; default to "info" if RUST_LOG is unset.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut app = App::new(&args)?;

    let event_loop = EventLoop::new()?;
    event_loop.run_app(&mut app)?;
    Ok(())
}
