mod openai;

pub use openai::OpenAiService;

use anyhow::{Context, Result};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use std::path::Path;

use crate::config::TitleConfig;

/// Trait for image captioning services.
///
/// The crate ships [`OpenAiService`]; tests and other backends implement this
/// directly. A service returns the raw caption text; cleanup happens in
/// [`infer_title`].
#[async_trait::async_trait]
pub trait TitleService: Send + Sync {
    /// The display name of this service (e.g., "OpenAI").
    fn name(&self) -> &str;
    /// Caption a base64-encoded JPEG.
    async fn caption(&self, image_base64: &str) -> Result<String>;
}

/// Downsample and re-encode an image for captioning.
///
/// The image is shrunk to fit in `max_edge`×`max_edge` (aspect ratio kept,
/// never enlarged), re-encoded as JPEG at `jpeg_quality` in memory, and
/// returned as base64. The file on disk is not modified.
pub fn encode_for_caption(path: &Path, settings: &TitleConfig) -> Result<String> {
    let img = image::open(path).with_context(|| format!("Failed to decode {}", path.display()))?;

    let max_edge = settings.max_edge.max(1);
    let img = if img.width() > max_edge || img.height() > max_edge {
        img.thumbnail(max_edge, max_edge)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, settings.jpeg_quality.clamp(1, 100))
        .encode_image(&rgb)
        .context("Failed to re-encode image for captioning")?;

    Ok(base64::engine::general_purpose::STANDARD.encode(&buf))
}

/// Strip whitespace and enclosing quotation marks / corner brackets from a caption.
pub fn clean_title(raw: &str) -> String {
    const PAIRS: &[(char, char)] = &[
        ('「', '」'),
        ('『', '』'),
        ('"', '"'),
        ('\'', '\''),
        ('“', '”'),
        ('‘', '’'),
        ('《', '》'),
    ];

    let mut title = raw.trim();
    loop {
        let mut chars = title.chars();
        let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
            break;
        };
        if PAIRS.iter().any(|&(open, close)| open == first && close == last) {
            title = title[first.len_utf8()..title.len() - last.len_utf8()].trim();
        } else {
            break;
        }
    }

    // Stray corner brackets anywhere in the text
    title.replace(['「', '」'], "").trim().to_string()
}

/// Encode an image, caption it, and clean the result.
///
/// An empty caption is an error, like a failed request: the caller skips
/// the file and moves on.
pub async fn infer_title(
    service: &dyn TitleService,
    path: &Path,
    settings: &TitleConfig,
) -> Result<String> {
    let image_base64 = encode_for_caption(path, settings)?;
    let raw = service
        .caption(&image_base64)
        .await
        .with_context(|| format!("{} captioning failed", service.name()))?;
    log::debug!("Raw caption: {raw}");

    let title = clean_title(&raw);
    if title.is_empty() {
        anyhow::bail!("{} returned an empty caption", service.name());
    }
    Ok(title)
}
