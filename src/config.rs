use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Upper bound of the sample-offset table shared with the shader.
pub const MAX_SAMPLE_COUNT: u32 = 64;

/// Shadow filtering algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShadowAlgorithm {
    Hard,
    #[default]
    Pcf,
    Pcss,
}

impl ShadowAlgorithm {
    /// Value written to the `shadowAlgorithm` uniform.
    pub fn shader_index(self) -> u32 {
        match self {
            Self::Hard => 0,
            Self::Pcf => 1,
            Self::Pcss => 2,
        }
    }
}

impl FromStr for ShadowAlgorithm {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "hard" | "hard_shadows" => Ok(Self::Hard),
            "pcf" => Ok(Self::Pcf),
            "pcss" => Ok(Self::Pcss),
            other => Err(anyhow!("unknown shadow algorithm: {other}")),
        }
    }
}

impl fmt::Display for ShadowAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hard => "hard",
            Self::Pcf => "pcf",
            Self::Pcss => "pcss",
        })
    }
}

/// Distribution of the filter taps used by PCF and PCSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterPattern {
    #[default]
    RegularGrid,
    PoissonDisk,
    RotatedPoisson,
}

impl FilterPattern {
    /// Value written to the `filterPattern` uniform.
    pub fn shader_index(self) -> u32 {
        match self {
            Self::RegularGrid => 0,
            Self::PoissonDisk => 1,
            Self::RotatedPoisson => 2,
        }
    }
}

impl FromStr for FilterPattern {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "grid" | "regular" | "regular_grid" => Ok(Self::RegularGrid),
            "poisson" | "poisson_disk" => Ok(Self::PoissonDisk),
            "rotated" | "rotated_poisson" => Ok(Self::RotatedPoisson),
            other => Err(anyhow!("unknown filter pattern: {other}")),
        }
    }
}

impl fmt::Display for FilterPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RegularGrid => "grid",
            Self::PoissonDisk => "poisson",
            Self::RotatedPoisson => "rotated",
        })
    }
}

/// Shadow filtering parameters.
///
/// Fields are private so that every write goes through the clamping setters:
/// the sample count stays within `1..=MAX_SAMPLE_COUNT` and the radii stay
/// non-negative no matter what the input layer hands over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowConfig {
    algorithm: ShadowAlgorithm,
    pattern: FilterPattern,
    sample_count: u32,
    filter_radius: f32,
    light_width: f32,
    depth_bias: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            algorithm: ShadowAlgorithm::Pcf,
            pattern: FilterPattern::RegularGrid,
            sample_count: 8,
            filter_radius: 0.006,
            light_width: 0.08,
            depth_bias: 0.0005,
        }
    }
}

impl ShadowConfig {
    pub fn algorithm(&self) -> ShadowAlgorithm {
        self.algorithm
    }

    pub fn pattern(&self) -> FilterPattern {
        self.pattern
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn filter_radius(&self) -> f32 {
        self.filter_radius
    }

    pub fn light_width(&self) -> f32 {
        self.light_width
    }

    pub fn depth_bias(&self) -> f32 {
        self.depth_bias
    }

    pub fn set_algorithm(&mut self, algorithm: ShadowAlgorithm) {
        self.algorithm = algorithm;
    }

    pub fn set_pattern(&mut self, pattern: FilterPattern) {
        self.pattern = pattern;
    }

    pub fn set_sample_count(&mut self, count: i64) {
        self.sample_count = count.clamp(1, MAX_SAMPLE_COUNT as i64) as u32;
    }

    pub fn set_filter_radius(&mut self, radius: f32) {
        self.filter_radius = non_negative(radius);
    }

    pub fn set_light_width(&mut self, width: f32) {
        self.light_width = non_negative(width);
    }

    pub fn set_depth_bias(&mut self, bias: f32) {
        self.depth_bias = non_negative(bias);
    }

    pub fn adjust_sample_count(&mut self, delta: i64) {
        self.set_sample_count(self.sample_count as i64 + delta);
    }

    pub fn adjust_filter_radius(&mut self, delta: f32) {
        self.set_filter_radius(self.filter_radius + delta);
    }

    pub fn adjust_light_width(&mut self, delta: f32) {
        self.set_light_width(self.light_width + delta);
    }
}

fn non_negative(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.max(0.0)
    }
}

/// Ambient and diffuse light colors used by the color pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightingConfig {
    pub ambient: Vec3,
    pub diffuse: Vec3,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: Vec3::new(0.43, 0.44, 0.53),
            diffuse: Vec3::new(0.95, 0.92, 0.84),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_is_clamped_to_table() {
        let mut config = ShadowConfig::default();
        config.set_sample_count(0);
        assert_eq!(config.sample_count(), 1);
        config.set_sample_count(-12);
        assert_eq!(config.sample_count(), 1);
        config.set_sample_count(1_000);
        assert_eq!(config.sample_count(), MAX_SAMPLE_COUNT);
        config.adjust_sample_count(-1);
        assert_eq!(config.sample_count(), MAX_SAMPLE_COUNT - 1);
    }

    #[test]
    fn negative_light_width_is_rejected() {
        let mut config = ShadowConfig::default();
        config.adjust_light_width(-1.0);
        assert_eq!(config.light_width(), 0.0);
        config.set_light_width(f32::NAN);
        assert_eq!(config.light_width(), 0.0);
        config.set_filter_radius(-0.5);
        assert_eq!(config.filter_radius(), 0.0);
    }

    #[test]
    fn parses_algorithm_and_pattern_names() {
        assert_eq!("PCSS".parse::<ShadowAlgorithm>().unwrap(), ShadowAlgorithm::Pcss);
        assert_eq!("hard".parse::<ShadowAlgorithm>().unwrap(), ShadowAlgorithm::Hard);
        assert_eq!(
            "rotated".parse::<FilterPattern>().unwrap(),
            FilterPattern::RotatedPoisson
        );
        assert!("vsm".parse::<ShadowAlgorithm>().is_err());
    }

    #[test]
    fn shader_indices_follow_declaration_order() {
        assert_eq!(ShadowAlgorithm::Hard.shader_index(), 0);
        assert_eq!(ShadowAlgorithm::Pcss.shader_index(), 2);
        assert_eq!(FilterPattern::PoissonDisk.shader_index(), 1);
    }
}
