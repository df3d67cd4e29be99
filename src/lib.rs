//! Ripple - interactive water pool rendering demo

pub mod camera;
pub mod cli;
pub mod lights;
pub mod params;
pub mod rendering;
pub mod scene;
pub mod shadow;
pub mod water;
