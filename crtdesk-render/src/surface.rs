use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use crtdesk_core::{
    CrtSettings, DocumentBackend, DocumentProvider, DocumentSettings, PageLayout, RenderImage,
    RenderRequest, ScrollTarget, SurfaceError,
};
use image::{imageops, Rgba, RgbaImage};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::crt::apply_crt_effect;
use crate::text::draw_text_centered;

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 768;

const PAGE_CACHE_CAPACITY: usize = 6;

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    Loading,
    Ready,
    Failed,
}

type OpenResult = anyhow::Result<Arc<dyn DocumentBackend>>;

struct PendingLoad {
    url: String,
    task: JoinHandle<OpenResult>,
}

/// Offscreen raster showing a scrollable window onto a paginated document.
pub struct DocumentSurface {
    settings: DocumentSettings,
    crt: CrtSettings,
    canvas: RgbaImage,
    status: SurfaceStatus,
    scroll_offset: f32,
    layout: Option<PageLayout>,
    backend: Option<Arc<dyn DocumentBackend>>,
    page_cache: Mutex<HashMap<usize, Arc<RgbaImage>>>,
    rng: StdRng,
    dirty: bool,
    generation: u64,
    pending: Option<PendingLoad>,
}

impl DocumentSurface {
    pub fn new(settings: DocumentSettings, crt: CrtSettings) -> Self {
        Self::with_rng(settings, crt, StdRng::from_entropy())
    }

    pub fn with_rng(settings: DocumentSettings, crt: CrtSettings, rng: StdRng) -> Self {
        let mut surface = Self {
            settings,
            crt,
            canvas: RgbaImage::new(DEFAULT_WIDTH, DEFAULT_HEIGHT),
            status: SurfaceStatus::Loading,
            scroll_offset: 0.0,
            layout: None,
            backend: None,
            page_cache: Mutex::new(HashMap::new()),
            rng,
            dirty: false,
            generation: 0,
            pending: None,
        };
        surface.draw_placeholder();
        surface.mark_dirty();
        surface
    }

    pub fn status(&self) -> SurfaceStatus {
        self.status
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn texture(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn layout(&self) -> Option<&PageLayout> {
        self.layout.as_ref()
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset
    }

    pub fn max_scroll(&self) -> f32 {
        self.layout.as_ref().map_or(0.0, PageLayout::max_scroll)
    }

    /// Scroll position in `[0, 1]`; zero when the document fits without scrolling.
    pub fn scroll_progress(&self) -> f32 {
        self.layout
            .as_ref()
            .map_or(0.0, |layout| layout.scroll_progress(self.scroll_offset))
    }

    /// Bumped on every mutation of the texture.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns whether the texture changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn to_render_image(&self) -> RenderImage {
        RenderImage {
            width: self.canvas.width(),
            height: self.canvas.height(),
            pixels: self.canvas.as_raw().clone(),
        }
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Opens `url` through `provider` and renders the first view. Never fails:
    /// any error leaves the static error display on the texture.
    #[instrument(skip(self, provider))]
    pub async fn load<P>(&mut self, provider: &P, url: &str) -> &RgbaImage
    where
        P: DocumentProvider + ?Sized,
    {
        let opened = provider.open(url).await;
        self.finish_load(url, opened)
    }

    /// Starts opening `url` on the runtime and returns at once. The placeholder
    /// stays up until [`poll_load`](Self::poll_load) sees the task finish.
    pub fn begin_load(&mut self, provider: Arc<dyn DocumentProvider>, url: &str) {
        if let Some(previous) = self.pending.take() {
            previous.task.abort();
        }
        let owned = url.to_owned();
        let task = tokio::spawn(async move { provider.open(&owned).await });
        debug!(url, "document load started");
        self.pending = Some(PendingLoad {
            url: url.to_owned(),
            task,
        });
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Installs the document once its open task has finished. Returns whether
    /// the surface changed; never waits on an unfinished task.
    pub async fn poll_load(&mut self) -> bool {
        if !self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.task.is_finished())
        {
            return false;
        }
        let Some(pending) = self.pending.take() else {
            return false;
        };
        let opened = pending
            .task
            .await
            .unwrap_or_else(|err| Err(anyhow!("document loader stopped: {err}")));
        self.finish_load(&pending.url, opened);
        true
    }

    /// Builds the layout from an opened document and renders the first view,
    /// or shows the error display.
    pub fn finish_load(
        &mut self,
        url: &str,
        opened: anyhow::Result<Arc<dyn DocumentBackend>>,
    ) -> &RgbaImage {
        let installed = opened
            .map_err(|err| SurfaceError::DocumentLoad {
                url: url.to_owned(),
                reason: format!("{err:#}"),
            })
            .and_then(|backend| self.install(url, backend));
        match installed {
            Ok(()) => {
                self.status = SurfaceStatus::Ready;
                info!(
                    url,
                    pages = self.layout.as_ref().map_or(0, PageLayout::page_count),
                    total_height = self.layout.as_ref().map_or(0.0, PageLayout::total_height),
                    "document loaded"
                );
            }
            Err(err) => self.fail(err),
        }
        self.mark_dirty();
        &self.canvas
    }

    fn install(
        &mut self,
        url: &str,
        backend: Arc<dyn DocumentBackend>,
    ) -> Result<(), SurfaceError> {
        let page_count = backend.info().page_count;
        if page_count == 0 {
            return Err(SurfaceError::EmptyDocument {
                url: url.to_owned(),
            });
        }

        let scale = self.settings.render_scale;
        let mut sizes = Vec::with_capacity(page_count);
        for page in 0..page_count {
            let size = backend
                .page_size(page, scale)
                .map_err(|err| SurfaceError::DocumentLoad {
                    url: url.to_owned(),
                    reason: format!("page {page}: {err:#}"),
                })?;
            sizes.push(size);
        }

        let width = (sizes[0].width.round().max(1.0) as u32).min(self.settings.max_width.max(1));
        let height = self.settings.viewport_height.max(1);
        self.canvas = RgbaImage::new(width, height);
        self.layout = Some(PageLayout::from_page_sizes(
            &sizes,
            self.settings.page_gap,
            height as f32,
        ));
        self.backend = Some(backend);
        self.scroll_offset = 0.0;
        self.page_cache.lock().clear();

        self.try_render_view()
    }

    /// Redraws the visible pages and the CRT pass at the current offset.
    pub fn render_current_view(&mut self) {
        if let Err(err) = self.try_render_view() {
            self.fail(err);
        }
        self.mark_dirty();
    }

    #[instrument(level = "debug", skip(self))]
    fn try_render_view(&mut self) -> Result<(), SurfaceError> {
        let (Some(backend), Some(layout)) = (self.backend.clone(), self.layout.as_ref()) else {
            return Ok(());
        };
        let visible = layout.visible_pages(self.scroll_offset);

        for px in self.canvas.pixels_mut() {
            *px = WHITE;
        }
        for page in &visible {
            let raster = self.page_raster(backend.as_ref(), page.index)?;
            imageops::overlay(&mut self.canvas, &*raster, 0, page.y.round() as i64);
        }
        if let Some(first) = visible.first() {
            self.evict_pages(first.index);
        }

        apply_crt_effect(&mut self.canvas, &self.crt, &mut self.rng);
        Ok(())
    }

    fn page_raster(
        &self,
        backend: &dyn DocumentBackend,
        page_index: usize,
    ) -> Result<Arc<RgbaImage>, SurfaceError> {
        if let Some(cached) = self.page_cache.lock().get(&page_index) {
            return Ok(Arc::clone(cached));
        }

        let request = RenderRequest {
            page_index,
            scale: self.settings.render_scale,
        };
        let image = backend
            .render_page(request)
            .map_err(|err| SurfaceError::PageRender {
                page: page_index,
                reason: format!("{err:#}"),
            })?;
        let raster = RgbaImage::from_raw(image.width, image.height, image.pixels).ok_or(
            SurfaceError::PageRender {
                page: page_index,
                reason: "pixel buffer does not match page dimensions".to_owned(),
            },
        )?;
        let raster = Arc::new(raster);
        self.page_cache.lock().insert(page_index, Arc::clone(&raster));
        debug!(page = page_index, "page rasterised");
        Ok(raster)
    }

    fn evict_pages(&self, reference_page: usize) {
        let mut cache = self.page_cache.lock();
        if cache.len() <= PAGE_CACHE_CAPACITY {
            return;
        }
        let mut keys: Vec<usize> = cache.keys().copied().collect();
        keys.sort_by_key(|page| page.abs_diff(reference_page));
        for stale in keys.into_iter().skip(PAGE_CACHE_CAPACITY) {
            cache.remove(&stale);
        }
    }

    pub fn cached_pages(&self) -> usize {
        self.page_cache.lock().len()
    }

    /// Moves the window by `delta` pixels, clamped to the document.
    pub fn scroll(&mut self, delta: f32) {
        let Some(layout) = self.layout.as_ref() else {
            return;
        };
        if self.status == SurfaceStatus::Failed {
            return;
        }
        self.scroll_offset = layout.clamp_scroll(self.scroll_offset + delta);
        self.render_current_view();
    }

    fn fail(&mut self, err: SurfaceError) {
        warn!(%err, "document surface showing error display");
        self.status = SurfaceStatus::Failed;
        self.backend = None;
        self.page_cache.lock().clear();
        self.draw_error_display();
    }

    fn draw_placeholder(&mut self) {
        for px in self.canvas.pixels_mut() {
            *px = BLACK;
        }
        let (cx, cy) = self.centre();
        draw_text_centered(&mut self.canvas, "Loading PDF...", cx, cy, 3, GREEN);
        let scanlines_only = CrtSettings {
            tint_alpha: 0.0,
            noise_probability: 0.0,
            ..self.crt.clone()
        };
        apply_crt_effect(&mut self.canvas, &scanlines_only, &mut self.rng);
    }

    fn draw_error_display(&mut self) {
        for px in self.canvas.pixels_mut() {
            *px = BLACK;
        }
        let (cx, cy) = self.centre();
        draw_text_centered(&mut self.canvas, "PDF LOAD ERROR", cx, cy - 50, 4, RED);
        draw_text_centered(&mut self.canvas, "Resume display failed", cx, cy, 2, GREEN);
    }

    fn centre(&self) -> (i64, i64) {
        (
            self.canvas.width() as i64 / 2,
            self.canvas.height() as i64 / 2,
        )
    }
}

impl ScrollTarget for DocumentSurface {
    fn scroll(&mut self, delta: f32) {
        DocumentSurface::scroll(self, delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use std::time::{Duration, Instant};

    use anyhow::{anyhow, Result};
    use crtdesk_core::{
        Config, DocumentInfo, DocumentMetadata, InputEvent, MoveKey, PageSize, Scene,
    };
    use tokio::sync::oneshot;

    use crate::fetch_document_bytes;

    struct FakeBackend {
        info: DocumentInfo,
        heights: Vec<u32>,
        width: u32,
        renders: AtomicUsize,
        broken_page: Option<usize>,
    }

    impl DocumentBackend for FakeBackend {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        fn page_size(&self, page_index: usize, _scale: f32) -> Result<PageSize> {
            let height = self
                .heights
                .get(page_index)
                .ok_or_else(|| anyhow!("page {} out of range", page_index))?;
            Ok(PageSize {
                width: self.width as f32,
                height: *height as f32,
            })
        }

        fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
            if self.broken_page == Some(request.page_index) {
                return Err(anyhow!("corrupt content stream"));
            }
            self.renders.fetch_add(1, Ordering::SeqCst);
            let height = self.heights[request.page_index];
            let shade = 40 * (request.page_index as u8 + 1);
            Ok(RenderImage {
                width: self.width,
                height,
                pixels: [shade, shade, shade, 255].repeat((self.width * height) as usize),
            })
        }
    }

    struct FakeProvider {
        heights: Vec<u32>,
        width: u32,
        broken_page: Option<usize>,
    }

    impl FakeProvider {
        fn new(heights: Vec<u32>) -> Self {
            Self {
                heights,
                width: 600,
                broken_page: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl DocumentProvider for FakeProvider {
        async fn open(&self, source: &str) -> Result<Arc<dyn DocumentBackend>> {
            Ok(Arc::new(FakeBackend {
                info: DocumentInfo {
                    source: source.to_owned(),
                    page_count: self.heights.len(),
                    metadata: DocumentMetadata::default(),
                },
                heights: self.heights.clone(),
                width: self.width,
                renders: AtomicUsize::new(0),
                broken_page: self.broken_page,
            }))
        }
    }

    /// Holds `open` until the test releases it.
    struct GatedProvider {
        gate: Mutex<Option<oneshot::Receiver<()>>>,
        inner: FakeProvider,
    }

    #[async_trait::async_trait]
    impl DocumentProvider for GatedProvider {
        async fn open(&self, source: &str) -> Result<Arc<dyn DocumentBackend>> {
            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                gate.await?;
            }
            self.inner.open(source).await
        }
    }

    /// Resolves the source the way the pdfium provider does, then gives up.
    struct FetchOnlyProvider;

    #[async_trait::async_trait]
    impl DocumentProvider for FetchOnlyProvider {
        async fn open(&self, source: &str) -> Result<Arc<dyn DocumentBackend>> {
            let bytes = fetch_document_bytes(source)?;
            Err(anyhow!("unexpected {} bytes", bytes.len()))
        }
    }

    fn settings() -> DocumentSettings {
        DocumentSettings {
            page_gap: 0.0,
            ..DocumentSettings::default()
        }
    }

    fn quiet_crt() -> CrtSettings {
        CrtSettings {
            noise_probability: 0.0,
            ..CrtSettings::default()
        }
    }

    fn surface() -> DocumentSurface {
        DocumentSurface::with_rng(settings(), quiet_crt(), StdRng::seed_from_u64(1))
    }

    #[test]
    fn starts_with_loading_placeholder() {
        let surface = surface();
        assert_eq!(surface.status(), SurfaceStatus::Loading);
        assert_eq!((surface.width(), surface.height()), (1024, 768));
        assert!(surface.is_dirty());
        assert_eq!(surface.scroll_progress(), 0.0);
    }

    #[tokio::test]
    async fn load_sizes_canvas_from_first_page() {
        let mut surface = surface();
        let provider = FakeProvider::new(vec![400, 500, 300]);
        surface.load(&provider, "resume.pdf").await;

        assert_eq!(surface.status(), SurfaceStatus::Ready);
        assert_eq!((surface.width(), surface.height()), (600, 768));
        let layout = surface.layout().unwrap();
        assert_eq!(layout.total_height(), 1200.0);
        assert_eq!(surface.max_scroll(), 432.0);
        // page 0 is white-ish grey, page 1 starts at y = 400
        assert_ne!(surface.texture().get_pixel(10, 401), surface.texture().get_pixel(10, 399));
    }

    #[tokio::test]
    async fn wide_pages_are_capped() {
        let mut surface = surface();
        let mut provider = FakeProvider::new(vec![900]);
        provider.width = 2000;
        surface.load(&provider, "wide.pdf").await;
        assert_eq!(surface.width(), 1024);
    }

    #[tokio::test]
    async fn scroll_is_clamped_and_marks_dirty() {
        let mut surface = surface();
        let provider = FakeProvider::new(vec![400, 500, 300]);
        surface.load(&provider, "resume.pdf").await;
        assert!(surface.take_dirty());
        let generation = surface.generation();

        surface.scroll(-50.0);
        assert_eq!(surface.scroll_offset(), 0.0);
        assert!(surface.take_dirty());

        surface.scroll(10_000.0);
        assert_eq!(surface.scroll_offset(), 432.0);
        assert_eq!(surface.scroll_progress(), 1.0);
        assert!(surface.generation() > generation);

        surface.scroll(-216.0);
        assert!((surface.scroll_progress() - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn pages_are_rasterised_once() {
        let mut surface = surface();
        let provider = FakeProvider::new(vec![400, 500, 300]);
        surface.load(&provider, "resume.pdf").await;
        assert_eq!(surface.cached_pages(), 2);

        for _ in 0..10 {
            surface.scroll(40.0);
            surface.scroll(-40.0);
        }
        surface.scroll(500.0);
        assert_eq!(surface.cached_pages(), 3);
    }

    #[tokio::test]
    async fn short_document_never_scrolls() {
        let mut surface = surface();
        let provider = FakeProvider::new(vec![300, 200]);
        surface.load(&provider, "short.pdf").await;

        surface.scroll(250.0);
        assert_eq!(surface.scroll_offset(), 0.0);
        assert_eq!(surface.scroll_progress(), 0.0);
    }

    #[tokio::test]
    async fn unreachable_url_yields_error_texture() {
        let mut surface = surface();
        let texture = surface
            .load(&FetchOnlyProvider, "file:///nonexistent/crtdesk/resume.pdf")
            .await;
        assert_eq!(texture.dimensions(), (1024, 768));
        assert!(texture.pixels().any(|px| *px == RED));
        assert_eq!(surface.status(), SurfaceStatus::Failed);
        assert!(surface.is_dirty());

        surface.scroll(100.0);
        assert_eq!(surface.scroll_offset(), 0.0);
    }

    #[tokio::test]
    async fn empty_document_is_a_load_failure() {
        let mut surface = surface();
        surface.load(&FakeProvider::new(Vec::new()), "empty.pdf").await;
        assert_eq!(surface.status(), SurfaceStatus::Failed);
    }

    #[tokio::test]
    async fn page_render_failure_substitutes_error_display() {
        let mut surface = surface();
        let mut provider = FakeProvider::new(vec![400, 500, 300]);
        provider.broken_page = Some(2);
        surface.load(&provider, "resume.pdf").await;
        assert_eq!(surface.status(), SurfaceStatus::Ready);

        surface.scroll(500.0);
        assert_eq!(surface.status(), SurfaceStatus::Failed);
        assert!(surface.texture().pixels().any(|px| *px == RED));
        assert!(surface.is_dirty());

        let frozen = (surface.scroll_offset(), surface.scroll_progress());
        surface.scroll(-300.0);
        surface.scroll(120.0);
        assert_eq!((surface.scroll_offset(), surface.scroll_progress()), frozen);
        assert_eq!(surface.status(), SurfaceStatus::Failed);
    }

    #[tokio::test]
    async fn frames_advance_while_document_opens() {
        let (release, gate) = oneshot::channel();
        let provider = Arc::new(GatedProvider {
            gate: Mutex::new(Some(gate)),
            inner: FakeProvider::new(vec![400, 500, 300]),
        });
        let mut surface = surface();
        surface.begin_load(provider, "resume.pdf");
        assert!(surface.take_dirty());

        let mut scene = Scene::new(&Config::default());
        let start = *scene.controls().pose();
        let t0 = Instant::now();
        for frame in 0..5u64 {
            scene.handle_input(InputEvent::KeyTap(MoveKey::Left));
            let report = scene.frame(t0 + Duration::from_millis(16 * frame), &mut surface);
            assert!(report.camera_moved);
            assert!(!surface.poll_load().await);
            tokio::task::yield_now().await;
        }
        assert_ne!(*scene.controls().pose(), start);
        assert!(surface.is_loading());
        assert_eq!(surface.status(), SurfaceStatus::Loading);
        assert!(!surface.is_dirty());

        release.send(()).unwrap();
        while !surface.poll_load().await {
            tokio::task::yield_now().await;
        }
        assert!(!surface.is_loading());
        assert_eq!(surface.status(), SurfaceStatus::Ready);
        assert_eq!(surface.max_scroll(), 432.0);
        assert!(surface.take_dirty());
    }

    #[tokio::test]
    async fn background_load_failure_shows_error_display() {
        let mut surface = surface();
        surface.begin_load(
            Arc::new(FetchOnlyProvider),
            "file:///nonexistent/crtdesk/resume.pdf",
        );
        while !surface.poll_load().await {
            tokio::task::yield_now().await;
        }
        assert_eq!(surface.status(), SurfaceStatus::Failed);
        assert!(surface.texture().pixels().any(|px| *px == RED));
    }
}
