use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod camera;
pub mod config;
pub mod input;
pub mod layout;
pub mod printer;
pub mod scene;

pub use camera::{
    ease_out_cubic, CameraControls, CameraMode, CameraPose, CameraTransition, ControlState,
    FrameMotion, ZoomState,
};
pub use config::{
    CameraSettings, Config, CrtSettings, DocumentSettings, MonitorConfig, PrinterSettings,
};
pub use input::{InputEvent, InputState, KeyboardState, MoveKey, PointerButton, WheelInput};
pub use layout::{PageLayout, VisiblePage};
pub use printer::{PrintJob, Printer, PrinterTick};
pub use scene::{FrameReport, Scene, ScrollTarget};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub source: String,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

/// Page dimensions in pixels at a given render scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Rectangle in viewport space, `0.0..=1.0` on both axes with the origin at
/// the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl NormalizedRect {
    pub fn clamp(self) -> Self {
        Self {
            left: self.left.clamp(0.0, 1.0),
            top: self.top.clamp(0.0, 1.0),
            right: self.right.clamp(0.0, 1.0),
            bottom: self.bottom.clamp(0.0, 1.0),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.right > self.left && self.bottom > self.top
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// Failures the document surface substitutes with its error image.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("failed to load document {url}: {reason}")]
    DocumentLoad { url: String, reason: String },
    #[error("failed to render page {page}: {reason}")]
    PageRender { page: usize, reason: String },
    #[error("document {url} has no pages")]
    EmptyDocument { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ToggleZoom,
    Print,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    ZoomChanged { zoomed: bool },
    TransitionFinished(CameraMode),
    PrintStarted,
    PrintCompleted,
    RedrawNeeded,
}

pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    fn page_size(&self, page_index: usize, scale: f32) -> Result<PageSize>;
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, source: &str) -> Result<Arc<dyn DocumentBackend>>;
}

/// Receives the printed document once the printer animation finishes.
pub trait DownloadSink: Send + Sync {
    fn deliver(&self) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_rect_clamps_and_validates() {
        let rect = NormalizedRect {
            left: -0.5,
            top: 0.2,
            right: 1.5,
            bottom: 0.8,
        }
        .clamp();
        assert_eq!(rect.left, 0.0);
        assert_eq!(rect.right, 1.0);
        assert!(rect.is_valid());
        assert!(rect.contains(0.5, 0.5));
        assert!(!rect.contains(0.5, 0.9));

        let empty = NormalizedRect {
            left: 0.4,
            top: 0.4,
            right: 0.4,
            bottom: 0.6,
        };
        assert!(!empty.is_valid());
    }
}
