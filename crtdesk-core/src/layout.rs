//! Vertical page stacking and scroll math for the monitor surface.

use crate::PageSize;

/// A page that intersects the viewport, with its top edge in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisiblePage {
    pub index: usize,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    page_heights: Vec<f32>,
    total_height: f32,
    viewport_height: f32,
}

impl PageLayout {
    /// Each slot height already includes the gap below the page.
    pub fn new(page_heights: Vec<f32>, viewport_height: f32) -> Self {
        let total_height = page_heights.iter().sum();
        Self {
            page_heights,
            total_height,
            viewport_height: viewport_height.max(0.0),
        }
    }

    pub fn from_page_sizes(sizes: &[PageSize], gap: f32, viewport_height: f32) -> Self {
        Self::new(
            sizes.iter().map(|size| size.height + gap).collect(),
            viewport_height,
        )
    }

    pub fn page_heights(&self) -> &[f32] {
        &self.page_heights
    }

    pub fn page_count(&self) -> usize {
        self.page_heights.len()
    }

    pub fn total_height(&self) -> f32 {
        self.total_height
    }

    pub fn viewport_height(&self) -> f32 {
        self.viewport_height
    }

    pub fn max_scroll(&self) -> f32 {
        (self.total_height - self.viewport_height).max(0.0)
    }

    pub fn clamp_scroll(&self, offset: f32) -> f32 {
        if offset.is_nan() {
            return 0.0;
        }
        offset.clamp(0.0, self.max_scroll())
    }

    pub fn scroll_progress(&self, offset: f32) -> f32 {
        offset / self.max_scroll().max(1.0)
    }

    /// Pages intersecting `[0, viewport_height)` at the given scroll offset.
    /// The walk stops at the first page starting below the viewport.
    pub fn visible_pages(&self, scroll_offset: f32) -> Vec<VisiblePage> {
        let mut visible = Vec::new();
        let mut y = -scroll_offset;
        for (index, height) in self.page_heights.iter().enumerate() {
            if y + height > 0.0 && y < self.viewport_height {
                visible.push(VisiblePage { index, y });
            }
            y += height;
            if y > self.viewport_height {
                break;
            }
        }
        visible
    }
}
