use crate::bvh::compressed::TriPayload;
use crate::error::Result;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneKind {
    #[default]
    Cornell,
    SphereGrid,
    Random,
    Instanced,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builder {
    Quick,
    #[default]
    Sah,
    Spatial,
}

/// Settings of the demo binary. Every field is optional in the TOML source.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    pub scene: SceneKind,
    pub builder: Builder,
    pub payload: TriPayload,
    pub image_width: u32,
    pub aspect_ratio: f32,
    pub packets: bool,
    pub seed: u64,
    /// Triangle count of the `random` scene.
    pub triangles: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            scene: SceneKind::default(),
            builder: Builder::default(),
            payload: TriPayload::default(),
            image_width: 256,
            aspect_ratio: 1.0,
            packets: true,
            seed: 42,
            triangles: 4096,
        }
    }
}

impl DemoConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn image_height(&self) -> u32 {
        ((self.image_width as f32 / self.aspect_ratio) as u32).max(1)
    }
}
