use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use crtdesk_core::{DocumentBackend, DocumentProvider};

pub mod crt;
#[cfg(feature = "pdf")]
mod pdfium;
pub mod source;
pub mod surface;
pub mod text;

#[cfg(feature = "pdf")]
pub use pdfium::{PdfRenderFactory, PdfiumRenderFactory};
pub use source::{fetch_document_bytes, resolve_location, DocumentLocation};
pub use surface::{DocumentSurface, SurfaceStatus};

/// Stands in for a renderer that could not be initialised; every open fails
/// with the underlying reason so the surface shows its error display.
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl DocumentProvider for UnavailableProvider {
    async fn open(&self, source: &str) -> Result<Arc<dyn DocumentBackend>> {
        Err(anyhow!("cannot open {source}: {}", self.reason))
    }
}

/// Picks the pdf renderer when it is compiled in and loadable.
pub fn default_provider() -> Box<dyn DocumentProvider> {
    #[cfg(feature = "pdf")]
    {
        match PdfRenderFactory::new() {
            Ok(factory) => Box::new(factory),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "pdf renderer unavailable");
                Box::new(UnavailableProvider::new(format!("{err:#}")))
            }
        }
    }
    #[cfg(not(feature = "pdf"))]
    {
        Box::new(UnavailableProvider::new("built without pdf support"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crtdesk_core::{CrtSettings, DocumentSettings};

    #[tokio::test]
    async fn unavailable_provider_reports_reason() {
        let provider = UnavailableProvider::new("no pdfium");
        let err = match provider.open("resume.pdf").await {
            Ok(_) => panic!("open should fail"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("no pdfium"));
    }

    #[tokio::test]
    async fn surface_falls_back_when_renderer_missing() {
        let provider: Box<dyn DocumentProvider> =
            Box::new(UnavailableProvider::new("no pdfium"));
        let mut surface = DocumentSurface::new(DocumentSettings::default(), CrtSettings::default());
        surface.load(provider.as_ref(), "resume.pdf").await;
        assert_eq!(surface.status(), SurfaceStatus::Failed);
    }
}
