//! Zip packaging of a rendered site.
//!
//! Layout inside the archive:
//!
//! ```text
//! index.html
//! <other pages>.html
//! css/tailwind.css
//! ```

use std::io::{Cursor, Write};
use std::sync::Arc;

use async_trait::async_trait;
use sitepress_core::job::ArtifactHandle;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::artifact::ArtifactStore;
use crate::error::PipelineError;
use crate::{Archiver, RenderedSite};

/// Path of the stylesheet inside the archive; the templates link to it.
pub const STYLESHEET_PATH: &str = "css/tailwind.css";

/// Build the zip bytes for a site. Synchronous; run it off the async runtime.
pub fn build_zip(site: &RenderedSite, stylesheet: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let archive_err = |e: zip::result::ZipError| {
        PipelineError::Archive(format!("failed to create zip file: {e}"))
    };
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, html) in &site.pages {
        zip.start_file(name.as_str(), options).map_err(archive_err)?;
        zip.write_all(html)?;
    }
    zip.start_file(STYLESHEET_PATH, options).map_err(archive_err)?;
    zip.write_all(stylesheet)?;

    let cursor = zip
        .finish()
        .map_err(|e| PipelineError::Archive(format!("failed to close zip file: {e}")))?;
    Ok(cursor.into_inner())
}

/// Zips the site and hands the bytes to an [`ArtifactStore`].
pub struct ZipArchiver {
    store: Arc<dyn ArtifactStore>,
}

impl ZipArchiver {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Archiver for ZipArchiver {
    async fn archive(
        &self,
        job_id: &str,
        site: &RenderedSite,
        stylesheet: &[u8],
    ) -> Result<ArtifactHandle, PipelineError> {
        let site = site.clone();
        let stylesheet = stylesheet.to_vec();
        let bytes = tokio::task::spawn_blocking(move || build_zip(&site, &stylesheet))
            .await
            .map_err(|e| PipelineError::Archive(format!("zip task failed: {e}")))??;

        let handle = self.store.put(job_id, bytes).await?;
        tracing::debug!(job_id, key = %handle.key, size = handle.size, "Site archived");
        Ok(handle)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
