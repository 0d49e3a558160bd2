// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page loading — decodes uploaded scans and photos into `DynamicImage`s.

use image::{DynamicImage, ImageFormat};
use marksheet_core::error::MarksheetError;
use tracing::{debug, info, instrument};

/// Decode a page from raw encoded bytes (JPEG, PNG, TIFF, etc.).
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn load_page(data: &[u8]) -> Result<DynamicImage, MarksheetError> {
    let page = image::load_from_memory(data)
        .map_err(|err| MarksheetError::ImageDecode(err.to_string()))?;
    debug!(width = page.width(), height = page.height(), "Page decoded from bytes");
    Ok(page)
}

/// Load a page from a file path.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn open_page(path: impl AsRef<std::path::Path>) -> Result<DynamicImage, MarksheetError> {
    let page = image::open(path.as_ref()).map_err(|err| {
        MarksheetError::ImageDecode(format!(
            "failed to open {}: {}",
            path.as_ref().display(),
            err
        ))
    })?;
    info!(width = page.width(), height = page.height(), "Page loaded");
    Ok(page)
}

/// Encode an image as PNG, e.g. a rectified page handed to a reviewer.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, MarksheetError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|err| MarksheetError::ImageEncode(err.to_string()))?;
    debug!(bytes = buffer.len(), "Image encoded as PNG");
    Ok(buffer)
}
