use std::mem;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use crtdesk_core::{
    DocumentBackend, DocumentInfo, DocumentMetadata, DocumentProvider, PageSize, RenderImage,
    RenderRequest,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{info, instrument, warn};

use crate::source::fetch_document_bytes;

const PDFIUM_PATH_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    #[instrument(skip(self))]
    async fn open(&self, source: &str) -> Result<Arc<dyn DocumentBackend>> {
        let pdfium = Arc::clone(&self.pdfium);
        let owned = source.to_owned();
        // reading, downloading and parsing all block
        let document = tokio::task::spawn_blocking(move || {
            let bytes = fetch_document_bytes(&owned)?;
            PdfiumDocument::load(pdfium, &owned, bytes)
        })
        .await
        .context("pdf loader task stopped")??;
        info!(
            source,
            pages = document.info.page_count,
            title = document.info.metadata.title.as_deref().unwrap_or(""),
            "pdf opened"
        );
        Ok(Arc::new(document))
    }
}

struct PdfiumDocument {
    info: DocumentInfo,
    page_points: Vec<PageSize>,
    document: Mutex<PdfDocument<'static>>,
    #[allow(dead_code)]
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocument {
    fn load(pdfium: Arc<Pdfium>, source: &str, bytes: Vec<u8>) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .with_context(|| format!("failed to parse {source} as pdf"))?;
        // SAFETY: the document borrows the bindings owned by `pdfium`. Fields drop in
        // declaration order, so `document` is released before the Arc it borrows from.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };

        let page_points = document
            .pages()
            .iter()
            .map(|page| PageSize {
                width: page.width().value,
                height: page.height().value,
            })
            .collect::<Vec<_>>();
        let info = DocumentInfo {
            source: source.to_owned(),
            page_count: page_points.len(),
            metadata: read_metadata(&document),
        };

        Ok(Self {
            info,
            page_points,
            document: Mutex::new(document),
            pdfium,
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, page_index: usize, scale: f32) -> Result<PageSize> {
        let points = self
            .page_points
            .get(page_index)
            .with_context(|| format!("page {} out of range", page_index))?;
        Ok(PageSize {
            width: points.width * scale,
            height: points.height * scale,
        })
    }

    #[instrument(skip(self))]
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        let page_index: PdfPageIndex = request
            .page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", request.page_index))?;

        let document = self.document.lock();
        let page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("page {} out of range", request.page_index))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.1));
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", request.page_index))?;
        let image = bitmap.as_image().to_rgba8();

        Ok(RenderImage {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        })
    }
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();
    DocumentMetadata {
        title: metadata
            .get(PdfDocumentMetadataTagType::Title)
            .map(|tag| tag.value().to_owned()),
        author: metadata
            .get(PdfDocumentMetadataTagType::Author)
            .map(|tag| tag.value().to_owned()),
    }
}

pub type PdfRenderFactory = PdfiumRenderFactory;

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = std::env::var(PDFIUM_PATH_ENV).ok().filter(|p| !p.is_empty())?;
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!("failed to load Pdfium from {PDFIUM_PATH_ENV}={}: {}", path, err);
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                PDFIUM_PATH_ENV,
                errors.join(", ")
            ))
        }
    }
}
