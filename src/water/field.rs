//! CPU wave-height field: explicit finite-difference integration of the 2D
//! wave equation on a halo-padded grid.

use std::f64::consts::PI;

use anyhow::{ensure, Result};

use crate::params::WaterPhysics;

/// Cell window half-width affected by a single touch.
const TOUCH_WINDOW: i64 = 10;

/// Height/velocity field over a `(grid_x + 2) x (grid_z + 2)` grid. The
/// outermost ring is a halo mirrored from the nearest interior cells after
/// every step (zero-gradient boundary); only interior cells are integrated.
///
/// Heights live in two flat buffers addressed by `cur`; each step writes the
/// other buffer and toggles the flag, so a step never reads its own output.
pub struct WaveField {
    grid_x: usize,
    grid_z: usize,
    stride: usize,
    cell_x: f64,
    cell_z: f64,
    wave_speed: f64,
    dt: f64,
    damp: f64,
    height: [Vec<f64>; 2],
    cur: usize,
    velocity: Vec<f64>,
}

impl WaveField {
    /// Allocate a resting (all-zero) field. Fails on non-positive physical
    /// extents or zero grid counts.
    pub fn new(physics: &WaterPhysics) -> Result<Self> {
        ensure!(
            physics.dim_x_m > 0.0 && physics.dim_z_m > 0.0,
            "water surface extents must be positive, got {} x {}",
            physics.dim_x_m,
            physics.dim_z_m
        );
        ensure!(
            physics.grid_x > 0 && physics.grid_z > 0,
            "water grid must have at least one cell per axis, got {} x {}",
            physics.grid_x,
            physics.grid_z
        );

        let cells = (physics.grid_x + 2) * (physics.grid_z + 2);
        Ok(Self {
            grid_x: physics.grid_x,
            grid_z: physics.grid_z,
            stride: physics.grid_z + 2,
            cell_x: physics.cell_x_m(),
            cell_z: physics.cell_z_m(),
            wave_speed: physics.wave_speed,
            dt: physics.dt_s,
            damp: physics.damp_factor,
            height: [vec![0.0; cells], vec![0.0; cells]],
            cur: 0,
            velocity: vec![0.0; cells],
        })
    }

    pub fn grid_x(&self) -> usize {
        self.grid_x
    }

    pub fn grid_z(&self) -> usize {
        self.grid_z
    }

    /// Current height at grid coordinates, halo included (`0..grid + 2`).
    pub fn height(&self, x: usize, z: usize) -> f64 {
        self.height[self.cur][x * self.stride + z]
    }

    /// Run exactly one integration pass over the interior, swap the height
    /// slots, and refresh the halo.
    pub fn step(&mut self) {
        let stride = self.stride;
        let scale = self.wave_speed * self.wave_speed / (self.cell_x * self.cell_z);

        {
            let (lo, hi) = self.height.split_at_mut(1);
            let (src, dst) = if self.cur == 0 {
                (&lo[0], &mut hi[0])
            } else {
                (&hi[0], &mut lo[0])
            };

            for i in 1..=self.grid_x {
                let row = i * stride;
                for j in 1..=self.grid_z {
                    let idx = row + j;
                    let u = src[idx];
                    let force = scale
                        * (src[idx - stride] + src[idx + stride] + src[idx - 1] + src[idx + 1]
                            - 4.0 * u);
                    let v = (self.velocity[idx] + force * self.dt) * self.damp;
                    self.velocity[idx] = v;
                    dst[idx] = u + v * self.dt;
                }
            }
        }
        self.cur ^= 1;

        // Mirror the halo from the nearest interior row/column.
        let u = &mut self.height[self.cur];
        for i in 0..self.grid_x + 2 {
            let row = i * stride;
            u[row] = u[row + 1];
            u[row + self.grid_z + 1] = u[row + self.grid_z];
        }
        for j in 0..self.grid_z + 2 {
            u[j] = u[stride + j];
            u[(self.grid_x + 1) * stride + j] = u[self.grid_x * stride + j];
        }
    }

    /// Push the surface down around cell `(x, z)` with a raised-cosine
    /// falloff of radius `distance` (meters), then redistribute the removed
    /// height uniformly over the whole grid so the total surface height is
    /// conserved. Out-of-range centers are clamped, not rejected.
    pub fn touch(&mut self, x: i64, z: i64, strength: f64, distance: f64) {
        let lo_x = (x - TOUCH_WINDOW).max(0);
        let hi_x = (x + TOUCH_WINDOW).min(self.grid_x as i64 + 1);
        let lo_z = (z - TOUCH_WINDOW).max(0);
        let hi_z = (z + TOUCH_WINDOW).min(self.grid_z as i64 + 1);

        let u = &mut self.height[self.cur];
        let mut change_sum = 0.0;
        for i in lo_x..hi_x {
            for j in lo_z..hi_z {
                let dx = (i - x) as f64 * self.cell_x;
                let dz = (j - z) as f64 * self.cell_z;
                let dist = (dx * dx + dz * dz).sqrt();
                let norm = if distance > 0.0 && dist <= distance {
                    dist / distance
                } else {
                    1.0
                };
                let change = strength * ((norm * PI).cos() + 1.0) / 2.0;
                u[i as usize * self.stride + j as usize] -= change;
                change_sum += change;
            }
        }

        let correction = change_sum / ((self.grid_x + 2) * (self.grid_z + 2)) as f64;
        for h in u.iter_mut() {
            *h += correction;
        }
    }

    /// Sum of heights over every cell, halo included.
    pub fn height_sum(&self) -> f64 {
        self.height[self.cur].iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn physics(dim_x: f32, dim_z: f32, grid_x: usize, grid_z: usize) -> WaterPhysics {
        WaterPhysics {
            dim_x_m: dim_x,
            dim_z_m: dim_z,
            grid_x,
            grid_z,
            wave_speed: 1.0,
            dt_s: 0.01,
            damp_factor: 0.995,
            ..WaterPhysics::default()
        }
    }

    #[test]
    fn test_rejects_degenerate_dimensions() {
        assert!(WaveField::new(&physics(0.0, 4.0, 10, 10)).is_err());
        assert!(WaveField::new(&physics(8.0, -1.0, 10, 10)).is_err());
        assert!(WaveField::new(&physics(8.0, 4.0, 0, 10)).is_err());
        assert!(WaveField::new(&physics(8.0, 4.0, 10, 0)).is_err());
    }

    #[test]
    fn test_touch_conserves_total_height() {
        let mut field = WaveField::new(&physics(8.0, 4.0, 40, 20)).unwrap();
        // Start from a non-flat state so conservation is tested generally.
        field.touch(10, 10, 0.2, 0.5);
        let before = field.height_sum();

        field.touch(20, 5, 0.3, 1.0);
        let after = field.height_sum();
        assert!(
            (after - before).abs() < 1e-9,
            "total height drifted: {before} -> {after}"
        );
    }

    #[test]
    fn test_touch_out_of_range_is_clamped() {
        let mut field = WaveField::new(&physics(8.0, 4.0, 16, 16)).unwrap();
        field.touch(-50, 3, 0.1, 1.0);
        field.touch(3, 500, 0.1, 1.0);
        // Nothing to assert beyond "no panic and still finite".
        assert!(field.height_sum().is_finite());
    }

    #[test]
    fn test_falloff_shape() {
        // Cell size 1 m in both axes so grid distance equals physical
        // distance.
        let mut field = WaveField::new(&physics(32.0, 32.0, 32, 32)).unwrap();
        let (cx, cz) = (16i64, 16i64);
        let strength = 0.25;
        let radius = 3.0;
        field.touch(cx, cz, strength, radius);

        // A cell far outside the touch window received only the uniform
        // correction; use it as the correction reference.
        let correction = field.height(1, 1);
        assert!(correction > 0.0);

        // Center: change equals full strength.
        let center = field.height(cx as usize, cz as usize);
        assert!((center - (correction - strength)).abs() < 1e-12);

        // Exactly at the falloff radius: change is zero.
        let rim = field.height((cx + radius as i64) as usize, cz as usize);
        assert!((rim - correction).abs() < 1e-12);
    }

    #[test]
    fn test_boundary_mirrors_interior_after_step() {
        let mut field = WaveField::new(&physics(8.0, 4.0, 12, 9)).unwrap();
        field.touch(4, 4, 0.3, 1.5);
        field.step();
        field.step();

        let (gx, gz) = (field.grid_x(), field.grid_z());
        for i in 0..gx + 2 {
            assert_eq!(field.height(i, 0), field.height(i, 1));
            assert_eq!(field.height(i, gz + 1), field.height(i, gz));
        }
        for j in 0..gz + 2 {
            assert_eq!(field.height(0, j), field.height(1, j));
            assert_eq!(field.height(gx + 1, j), field.height(gx, j));
        }
    }

    #[test]
    fn test_identical_inputs_are_bit_reproducible() {
        let run = || {
            let mut field = WaveField::new(&physics(8.0, 4.0, 24, 16)).unwrap();
            field.touch(6, 6, 0.12, 0.8);
            for _ in 0..5 {
                field.step();
            }
            field.touch(18, 10, 0.05, 0.4);
            for _ in 0..5 {
                field.step();
            }
            field
        };

        let a = run();
        let b = run();
        for i in 0..a.grid_x() + 2 {
            for j in 0..a.grid_z() + 2 {
                assert_eq!(a.height(i, j).to_bits(), b.height(i, j).to_bits());
            }
        }
    }

    #[test]
    fn test_touch_then_forced_step_scenario() {
        // 4x4 interior (6x6 with halo), unit cells, flat start.
        let mut field = WaveField::new(&physics(4.0, 4.0, 4, 4)).unwrap();
        let pre_sum = field.height_sum();

        field.touch(2, 2, 0.3, 1.0);
        // The local subtraction is exactly offset by the uniform addition.
        assert!((field.height_sum() - pre_sum).abs() < 1e-9);

        let interior_sum = |f: &WaveField| -> f64 {
            let mut sum = 0.0;
            for i in 1..=f.grid_x() {
                for j in 1..=f.grid_z() {
                    sum += f.height(i, j);
                }
            }
            sum
        };
        let interior_before = interior_sum(&field);
        field.step();

        // The struck cell is strictly below rest level; all cells away from
        // the disturbance carry a small positive uniform offset.
        assert!(field.height(2, 2) < 0.0);
        assert!(field.height(5, 5) > 0.0);

        // The stencil moves height between neighbors, never creates it:
        // with the halo matching its neighbors, the interior total is
        // unchanged by the step.
        assert!((interior_sum(&field) - interior_before).abs() < 1e-9);
    }
}
