use serde::{Deserialize, Serialize};

use crate::platform::browser;

pub const MOBILE_MAX_WIDTH: u32 = 768;
pub const TABLET_MAX_WIDTH: u32 = 1024;

/// Viewport reported by hosts without a window.
pub const DEFAULT_VIEWPORT: (u32, u32) = (1920, 1080);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    pub fn from_width(width: u32) -> Self {
        if width < MOBILE_MAX_WIDTH {
            DeviceType::Mobile
        } else if width < TABLET_MAX_WIDTH {
            DeviceType::Tablet
        } else {
            DeviceType::Desktop
        }
    }
}

/// Ambient values stamped onto UI payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentInfo {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub page_path: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            viewport_width: DEFAULT_VIEWPORT.0,
            viewport_height: DEFAULT_VIEWPORT.1,
            page_path: "/".to_string(),
        }
    }
}

impl EnvironmentInfo {
    /// Reads the browser's navigator, window size and location when available.
    pub fn detect() -> Self {
        let mut info = Self::default();
        if let Some(agent) = browser::user_agent() {
            info.user_agent = agent;
        }
        if let Some((width, height)) = browser::viewport() {
            info.viewport_width = width;
            info.viewport_height = height;
        }
        if let Some(path) = browser::page_path() {
            info.page_path = path;
        }
        info
    }

    pub fn device_type(&self) -> DeviceType {
        DeviceType::from_width(self.viewport_width)
    }
}

fn default_user_agent() -> String {
    format!(
        "observability-client-rust/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
