use crate::camera::Camera;
use crate::config::{DemoConfig, SceneKind};
use na::Point3;

pub mod cornell;
pub mod instanced;
pub mod random;
pub mod sphere_grid;

/// A procedurally generated test scene.
pub trait Scene {
    fn build_camera(config: &DemoConfig) -> Camera;
    /// The whole scene as a flat triangle soup.
    fn build_scene(config: &DemoConfig) -> Vec<Point3<f32>>;
}

/// Camera and flattened geometry of the configured scene.
pub fn load(config: &DemoConfig) -> (Camera, Vec<Point3<f32>>) {
    match config.scene {
        SceneKind::Cornell => (cornell::Cornell::build_camera(config), cornell::Cornell::build_scene(config)),
        SceneKind::SphereGrid => (
            sphere_grid::SphereGrid::build_camera(config),
            sphere_grid::SphereGrid::build_scene(config),
        ),
        SceneKind::Random => (random::Random::build_camera(config), random::Random::build_scene(config)),
        SceneKind::Instanced => (
            instanced::Instanced::build_camera(config),
            instanced::Instanced::build_scene(config),
        ),
    }
}
