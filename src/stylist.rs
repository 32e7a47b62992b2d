use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use tracing::{error, info};

use crate::{
    error::GenerationError,
    models::{ComponentSlot, Components, Occasion, StylePreference},
};

#[derive(Debug, Clone)]
pub struct OutfitRequest {
    pub image: Bytes,
    pub style: StylePreference,
    pub occasion: Occasion,
}

/// Output of one generation: the styled image and the garments detected on
/// it. The two are only ever produced together.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedLook {
    pub image: Bytes,
    pub components: Components,
}

#[async_trait]
pub trait OutfitGenerator: Send + Sync {
    async fn generate(&self, request: &OutfitRequest) -> Result<GeneratedLook, GenerationError>;
}

/// Placeholder for the image generation model. Validates that the upload
/// decodes as an image, then hands it back unchanged with a fixed set of
/// detected components.
pub struct PlaceholderStylist {
    delay: Duration,
}

impl PlaceholderStylist {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn detected_components() -> Components {
        [
            (ComponentSlot::Top, "Kurti"),
            (ComponentSlot::Bottom, "Palazzo"),
            (ComponentSlot::Accessory, "Tote Bag"),
        ]
        .into_iter()
        .map(|(slot, label)| (slot, label.to_string()))
        .collect()
    }
}

#[async_trait]
impl OutfitGenerator for PlaceholderStylist {
    async fn generate(&self, request: &OutfitRequest) -> Result<GeneratedLook, GenerationError> {
        info!("🎨 Generating a {} outfit for {} ({} bytes uploaded)", request.style, request.occasion, request.image.len());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let decoded = image::load_from_memory(&request.image).map_err(|e| {
            error!("❌ Error during outfit generation: {}", e);
            GenerationError::Decode(e.to_string())
        })?;
        info!("🖼️ Decoded {}x{} upload, preview: {}", decoded.width(), decoded.height(), preview(&request.image));

        let look = GeneratedLook { image: request.image.clone(), components: Self::detected_components() };
        info!("✅ Outfit generated with components: {}", look.components.values().cloned().collect::<Vec<_>>().join(", "));
        Ok(look)
    }
}

/// Short base64 prefix of an image payload for log lines.
fn preview(image: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(image);
    if encoded.len() > 50 {
        format!("{}...[{} chars total]", &encoded[..50], encoded.len())
    } else {
        encoded
    }
}

#[cfg(test)]
pub(crate) fn sample_png() -> Bytes {
    use std::io::Cursor;
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 4, image::Rgb([200, 80, 120])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).expect("encode png");
    Bytes::from(buf.into_inner())
}
