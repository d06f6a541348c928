use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub document: DocumentSettings,
    pub camera: CameraSettings,
    pub monitor: MonitorConfig,
    pub crt: CrtSettings,
    pub printer: PrinterSettings,
}

impl Config {
    pub fn default_path(dirs: &ProjectDirs) -> PathBuf {
        dirs.config_dir().join(CONFIG_FILE_NAME)
    }

    /// Reads the config at `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&raw).with_context(|| format!("failed to parse config file {:?}", path))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the renderer cannot use.
    pub fn validate(&self) -> Result<()> {
        let crt = &self.crt;
        let values = [
            ("crt.tint_alpha", crt.tint_alpha as f64),
            ("crt.scanline_alpha", crt.scanline_alpha as f64),
            ("crt.noise_probability", crt.noise_probability),
            ("crt.noise_amplitude", crt.noise_amplitude as f64),
            ("document.render_scale", self.document.render_scale as f64),
            ("document.page_gap", self.document.page_gap as f64),
            ("document.scroll_factor", self.document.scroll_factor as f64),
        ];
        for (name, value) in values {
            if !value.is_finite() {
                bail!("{name} must be a finite number, got {value}");
            }
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    /// Document shown on the monitor. Paths, `file://` and `http(s)://` URLs.
    pub url: String,
    /// Document handed out by the printer.
    pub download_url: String,
    pub download_name: String,
    pub render_scale: f32,
    pub page_gap: f32,
    pub max_width: u32,
    pub viewport_height: u32,
    /// Multiplier from wheel delta to surface pixels while zoomed in.
    pub scroll_factor: f32,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            url: "resume.pdf".to_owned(),
            download_url: "resume.pdf".to_owned(),
            download_name: "resume.pdf".to_owned(),
            render_scale: 1.5,
            page_gap: 20.0,
            max_width: 1024,
            viewport_height: 768,
            scroll_factor: 0.5,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub start_distance: f32,
    pub zoom_distance: f32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub transition: Duration,
    /// Radians per pixel of secondary-button drag.
    pub rotate_sensitivity: f32,
    /// World units per pixel of middle-button drag.
    pub pan_speed: f32,
    /// World units per wheel event in free mode.
    pub dolly_step: f32,
    /// World units per frame of held movement keys.
    pub move_speed: f32,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            start_distance: 2.5,
            zoom_distance: 0.6,
            transition: Duration::from_millis(1000),
            rotate_sensitivity: 0.002,
            pan_speed: 0.003,
            dolly_step: 0.5,
            move_speed: 0.1,
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Placement of the monitor's screen quad in world space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub screen_position: Vec3,
    pub screen_normal: Vec3,
    pub screen_size: Vec2,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            screen_position: Vec3::new(0.0, 1.75, 0.501),
            screen_normal: Vec3::Z,
            screen_size: Vec2::new(1.0, 0.75),
        }
    }
}

impl MonitorConfig {
    pub fn camera_position_at(&self, distance: f32) -> Vec3 {
        self.screen_position + self.screen_normal.normalize_or_zero() * distance
    }

    pub fn target(&self) -> Vec3 {
        self.screen_position
    }

    /// Screen corners, counter-clockwise from the top-left as seen from the front.
    pub fn screen_corners(&self) -> [Vec3; 4] {
        let normal = self.screen_normal.normalize_or_zero();
        let mut right = Vec3::Y.cross(normal).normalize_or_zero();
        if right == Vec3::ZERO {
            right = Vec3::X;
        }
        let up = normal.cross(right).normalize_or_zero();
        let half_w = right * self.screen_size.x * 0.5;
        let half_h = up * self.screen_size.y * 0.5;
        let c = self.screen_position;
        [
            c - half_w + half_h,
            c - half_w - half_h,
            c + half_w - half_h,
            c + half_w + half_h,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrtSettings {
    pub tint_alpha: f32,
    pub scanline_spacing: u32,
    pub scanline_alpha: f32,
    pub noise_probability: f64,
    pub noise_amplitude: f32,
}

impl Default for CrtSettings {
    fn default() -> Self {
        Self {
            tint_alpha: 0.08,
            scanline_spacing: 4,
            scanline_alpha: 0.03,
            noise_probability: 0.005,
            noise_amplitude: 15.0,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSettings {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub duration: Duration,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [document]
            url = "https://example.com/cv.pdf"

            [camera]
            transition = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.document.url, "https://example.com/cv.pdf");
        assert_eq!(config.document.render_scale, 1.5);
        assert_eq!(config.camera.transition, Duration::from_millis(250));
        assert_eq!(config.camera.zoom_distance, 0.6);
        assert_eq!(config.printer.duration, Duration::from_secs(5));
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = Config::default();
        config.crt.scanline_spacing = 2;
        config.monitor.screen_position = Vec3::new(1.0, 2.0, 3.0);
        fs::write(&path, config.to_toml().unwrap()).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[camera\nfov_degrees = ").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn non_finite_crt_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[crt]\nnoise_probability = nan\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("crt.noise_probability"));

        let err = Config::from_toml("[crt]\nnoise_amplitude = inf\n").unwrap_err();
        assert!(err.to_string().contains("crt.noise_amplitude"));
    }

    #[test]
    fn monitor_positions_follow_normal() {
        let monitor = MonitorConfig::default();
        let start = monitor.camera_position_at(2.5);
        assert!((start - Vec3::new(0.0, 1.75, 3.001)).length() < 1e-5);

        let corners = monitor.screen_corners();
        assert!((corners[0] - Vec3::new(-0.5, 2.125, 0.501)).length() < 1e-5);
        assert!((corners[2] - Vec3::new(0.5, 1.375, 0.501)).length() < 1e-5);
    }
}
