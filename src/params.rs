//! Parameter definitions with physical units and documented semantics.

/// Water surface simulation parameters.
///
/// The solver integrates the 2D wave equation on a `grid_x` x `grid_z` field
/// spanning `dim_x_m` x `dim_z_m` meters, in fixed steps of `step_usec`
/// wall-clock microseconds.
#[derive(Debug, Clone)]
pub struct WaterPhysics {
    /// Pool extent along X (meters)
    pub dim_x_m: f32,

    /// Pool extent along Z (meters)
    pub dim_z_m: f32,

    /// Resting water level (meters, world Y)
    pub surface_y_m: f32,

    /// Interior simulation cells along X
    pub grid_x: usize,

    /// Interior simulation cells along Z
    pub grid_z: usize,

    /// Wave propagation speed (meters per second)
    pub wave_speed: f64,

    /// Integration time step (seconds)
    pub dt_s: f64,

    /// Per-step velocity damping factor (dimensionless, < 1 keeps the
    /// explicit scheme stable in practice and models energy loss)
    pub damp_factor: f64,

    /// Fixed simulation step duration (wall-clock microseconds)
    pub step_usec: u64,
}

impl Default for WaterPhysics {
    fn default() -> Self {
        Self {
            dim_x_m: 8.0,
            dim_z_m: 4.0,
            surface_y_m: -0.07,
            grid_x: 400,
            grid_z: 200,
            wave_speed: 0.4,
            dt_s: 0.01,
            damp_factor: 0.995,
            step_usec: 10_000,
        }
    }
}

impl WaterPhysics {
    /// Cell extent along X (meters)
    pub fn cell_x_m(&self) -> f64 {
        self.dim_x_m as f64 / self.grid_x as f64
    }

    /// Cell extent along Z (meters)
    pub fn cell_z_m(&self) -> f64 {
        self.dim_z_m as f64 / self.grid_z as f64
    }

    /// Map a world-space point on the surface plane to grid cell coordinates.
    /// The result may lie outside the grid; `touch` clamps its window.
    pub fn world_to_grid(&self, world_x: f32, world_z: f32) -> (i64, i64) {
        let gx = (world_x + self.dim_x_m / 2.0) / self.dim_x_m * self.grid_x as f32;
        let gz = (world_z + self.dim_z_m / 2.0) / self.dim_z_m * self.grid_z as f32;
        (gx as i64, gz as i64)
    }
}

/// Pointer/key interaction parameters for disturbing the surface.
#[derive(Debug, Clone)]
pub struct TouchConfig {
    /// Disturbance depth on a single click (meters)
    pub click_strength: f64,

    /// Disturbance depth while dragging (meters)
    pub drag_strength: f64,

    /// Falloff radius of pointer disturbances (meters)
    pub radius_m: f64,

    /// Disturbance depth of a random "rain drop" (meters)
    pub rain_strength: f64,

    /// Minimum falloff radius of a rain drop (meters)
    pub rain_radius_min_m: f64,

    /// Maximum falloff radius of a rain drop (meters)
    pub rain_radius_max_m: f64,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            click_strength: 0.04,
            drag_strength: 0.01,
            radius_m: 10.0,
            rain_strength: 0.07,
            rain_radius_min_m: 4.0,
            rain_radius_max_m: 7.0,
        }
    }
}

/// Camera placement and control parameters.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Initial camera position (meters)
    pub position: [f32; 3],

    /// Initial pitch (radians)
    pub rot_x: f32,

    /// Initial yaw (radians)
    pub rot_y: f32,

    /// Distance moved per key press (meters)
    pub move_step_m: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [3.0, 2.0, -4.0],
            rot_x: -0.3,
            rot_y: -0.7,
            move_step_m: 0.125,
        }
    }
}

/// Rendering configuration.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Window width (pixels)
    pub window_width: u32,

    /// Window height (pixels)
    pub window_height: u32,

    /// Vertical half-extent of the view frustum at the near plane (meters).
    /// The mouse wheel rescales this by powers of two.
    pub fov_scale: f32,

    /// Near clipping plane (meters)
    pub near_plane_m: f32,

    /// Far clipping plane (meters)
    pub far_plane_m: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_width: 1400,
            window_height: 900,
            fov_scale: 0.0625,
            near_plane_m: 0.125,
            far_plane_m: 256.0,
        }
    }
}

/// Shadow mapping configuration.
#[derive(Debug, Clone)]
pub struct ShadowConfig {
    /// Shadow map resolution (texels per side, per face for cube maps)
    pub resolution: u32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self { resolution: 1024 }
    }
}

/// Recording mode configuration.
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Duration to record (seconds)
    pub duration_secs: f32,

    /// Output directory for frames
    pub output_dir: String,

    /// Frame rate (FPS)
    pub fps: u32,
}

impl RecordingConfig {
    pub fn new(duration_secs: f32) -> Self {
        Self {
            duration_secs,
            output_dir: "recording".to_string(),
            fps: 60,
        }
    }

    /// Total number of frames to capture
    pub fn total_frames(&self) -> usize {
        (self.duration_secs * self.fps as f32).ceil() as usize
    }

    /// Frame directory path
    pub fn frames_dir(&self) -> String {
        format!("{}/frames", self.output_dir)
    }
}
