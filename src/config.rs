// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.
// The backend never reads files; it receives `BackendConfig` built from here.

use anyhow::{Context, Result};
use ash::vk;
use glam::Vec4;
use serde::Deserialize;
use std::path::Path;

use crate::backend::device_selector::{DeviceRequirements, Requirement};
use crate::backend::BackendConfig;

/// Upper bound for frames in flight; more only adds latency.
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 4;

/// Root configuration structure
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub device: DeviceConfig,
}

/// Window settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Lumen".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    /// "mailbox", "fifo", "immediate" or "fifo_relaxed"
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.1, 0.2, 0.8, 1.0],
            max_frames_in_flight: 2,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    /// env_logger filter; `RUST_LOG` wins when set
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
            show_fps: true,
        }
    }
}

/// `{ required = bool, weight = u32 }` entry of the [device] section.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RequirementConfig {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub weight: u32,
}

impl From<Requirement> for RequirementConfig {
    fn from(requirement: Requirement) -> Self {
        Self {
            required: requirement.required,
            weight: requirement.weight,
        }
    }
}

impl From<RequirementConfig> for Requirement {
    fn from(config: RequirementConfig) -> Self {
        Self {
            required: config.required,
            weight: config.weight,
        }
    }
}

/// GPU selection settings. Graphics and present queues are always required.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    pub discrete_gpu: RequirementConfig,
    pub sampler_anisotropy: RequirementConfig,
    pub compute_queue: RequirementConfig,
    pub transfer_queue: RequirementConfig,
    pub low_score_threshold: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let defaults = DeviceRequirements::default();
        Self {
            discrete_gpu: defaults.discrete_gpu.into(),
            sampler_anisotropy: defaults.sampler_anisotropy.into(),
            compute_queue: defaults.compute_queue.into(),
            transfer_queue: defaults.transfer_queue.into(),
            low_score_threshold: defaults.low_score_threshold,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Parse TOML text; missing sections and keys take their defaults.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Frames in flight clamped to 1..=MAX_FRAMES_IN_FLIGHT_LIMIT.
    pub fn max_frames_in_flight(&self) -> usize {
        let requested = self.graphics.max_frames_in_flight;
        let clamped = requested.clamp(1, MAX_FRAMES_IN_FLIGHT_LIMIT);
        if clamped != requested {
            log::warn!(
                "max_frames_in_flight = {} is out of range, using {}",
                requested,
                clamped
            );
        }
        clamped
    }

    pub fn device_requirements(&self) -> DeviceRequirements {
        let device = &self.device;
        DeviceRequirements {
            graphics_queue: Requirement::required(DeviceRequirements::default().graphics_queue.weight),
            present_queue: Requirement::required(DeviceRequirements::default().present_queue.weight),
            discrete_gpu: device.discrete_gpu.into(),
            sampler_anisotropy: device.sampler_anisotropy.into(),
            compute_queue: device.compute_queue.into(),
            transfer_queue: device.transfer_queue.into(),
            low_score_threshold: device.low_score_threshold,
            ..DeviceRequirements::default()
        }
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            app_name: self.window.title.clone(),
            enable_validation: self.debug.validation_layers,
            max_frames_in_flight: self.max_frames_in_flight(),
            present_mode: self.present_mode(),
            clear_colour: Vec4::from_array(self.graphics.clear_color),
            device_requirements: self.device_requirements(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.max_frames_in_flight(), 2);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "Demo"
            width = 800

            [graphics]
            present_mode = "FIFO"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Demo");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.graphics.clear_color, [0.1, 0.2, 0.8, 1.0]);
    }

    #[test]
    fn unknown_present_mode_falls_back_to_fifo() {
        let config = Config::parse("[graphics]\npresent_mode = \"warp\"").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn frames_in_flight_is_clamped() {
        let zero = Config::parse("[graphics]\nmax_frames_in_flight = 0").unwrap();
        let many = Config::parse("[graphics]\nmax_frames_in_flight = 16").unwrap();

        assert_eq!(zero.max_frames_in_flight(), 1);
        assert_eq!(many.max_frames_in_flight(), MAX_FRAMES_IN_FLIGHT_LIMIT);
    }

    #[test]
    fn device_section_maps_to_requirements() {
        let config = Config::parse(
            r#"
            [device]
            discrete_gpu = { required = true, weight = 5000 }
            compute_queue = { required = true }
            low_score_threshold = 10
            "#,
        )
        .unwrap();

        let requirements = config.device_requirements();
        assert_eq!(requirements.discrete_gpu, Requirement::required(5000));
        assert_eq!(requirements.compute_queue, Requirement::required(0));
        assert_eq!(requirements.low_score_threshold, 10);
        assert!(requirements.graphics_queue.required);
        assert!(requirements.present_queue.required);
        assert_eq!(requirements.device_extensions, vec!["VK_KHR_swapchain".to_string()]);
    }

    #[test]
    fn default_device_section_matches_selector_defaults() {
        assert_eq!(
            Config::default().device_requirements(),
            DeviceRequirements::default()
        );
    }

    #[test]
    fn backend_config_carries_graphics_settings() {
        let config = Config::parse(
            r#"
            [graphics]
            clear_color = [0.0, 0.0, 0.0, 1.0]
            max_frames_in_flight = 3

            [debug]
            validation_layers = false
            "#,
        )
        .unwrap();

        let backend = config.backend_config();
        assert_eq!(backend.max_frames_in_flight, 3);
        assert_eq!(backend.clear_colour, Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert!(!backend.enable_validation);
        assert_eq!(backend.app_name, "Lumen");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::parse("[window\nwidth = ").is_err());
    }
}
