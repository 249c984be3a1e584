use std::collections::HashMap;

use crate::common::ChatMessage;

/// Texture mỗi ảnh chỉ được giải mã và upload lên GPU một lần, theo message id.
/// A failed decode is remembered too, so broken bytes are not retried every frame.
#[derive(Default)]
pub struct PhotoCache {
    textures: HashMap<String, Option<egui::TextureHandle>>,
}

impl PhotoCache {
    pub fn texture(
        &mut self,
        ctx: &egui::Context,
        message: &ChatMessage,
    ) -> Option<egui::TextureHandle> {
        let data = message.attachment_data.as_deref()?;
        self.textures
            .entry(message.id.clone())
            .or_insert_with(|| {
                decode(data).map(|image| {
                    ctx.load_texture(
                        format!("photo-{}", message.id),
                        image,
                        egui::TextureOptions::LINEAR,
                    )
                })
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

pub fn decode(data: &[u8]) -> Option<egui::ColorImage> {
    match image::load_from_memory(data) {
        Ok(decoded) => {
            let rgba = decoded.to_rgba8();
            let size = [rgba.width() as usize, rgba.height() as usize];
            Some(egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
        }
        Err(err) => {
            log::warn!("Could not decode photo ({} bytes): {err}", data.len());
            None
        }
    }
}
