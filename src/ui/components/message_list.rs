use chrono::{DateTime, Local};

use crate::common::ChatMessage;

use super::photo::PhotoCache;

/// Distance from the tail (in points) that still counts as "at the bottom".
const BOTTOM_TOLERANCE: f32 = 24.0;
const DATE_HEADER_EVERY: usize = 4;
const PHOTO_MAX_SIDE: f32 = 240.0;

/// Draws the thread and returns whether the viewer is at the bottom.
pub fn render(
    ui: &mut egui::Ui,
    messages: &[ChatMessage],
    own_id: &str,
    scroll_to_bottom: bool,
    photos: &mut PhotoCache,
) -> bool {
    let output = egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui| {
            for (index, message) in messages.iter().enumerate() {
                if index % DATE_HEADER_EVERY == 0 {
                    ui.vertical_centered(|ui| {
                        ui.label(
                            egui::RichText::new(date_header(message.sent_at))
                                .small()
                                .strong(),
                        );
                    });
                }

                if message.is_from(own_id) {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::TOP), |ui| {
                        draw_body(ui, message, photos);
                    });
                } else {
                    ui.horizontal(|ui| {
                        ui.colored_label(
                            egui::Color32::from_rgb(201, 161, 240),
                            message.sender_display_name.as_str(),
                        );
                        draw_body(ui, message, photos);
                    });
                }
            }

            if scroll_to_bottom {
                ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
            }
        });

    let max_offset = (output.content_size.y - output.inner_rect.height()).max(0.0);
    output.state.offset.y >= max_offset - BOTTOM_TOLERANCE
}

fn draw_body(ui: &mut egui::Ui, message: &ChatMessage, photos: &mut PhotoCache) {
    let ctx = ui.ctx().clone();
    match photos.texture(&ctx, message) {
        Some(texture) => {
            ui.add(
                egui::Image::new(egui::load::SizedTexture::from_handle(&texture))
                    .max_size(egui::vec2(PHOTO_MAX_SIDE, PHOTO_MAX_SIDE)),
            );
        }
        None => {
            ui.label(body(message));
        }
    }
}

/// Text shown for a message; photos that cannot be drawn fall back to a placeholder.
pub fn body(message: &ChatMessage) -> String {
    if let Some(content) = &message.content {
        return content.clone();
    }
    match &message.attachment_data {
        Some(data) => format!("[photo, {:.1} KB]", data.len() as f64 / 1024.0),
        None => "[photo]".to_string(),
    }
}

pub fn date_header(sent_at: i64) -> String {
    DateTime::from_timestamp_millis(sent_at)
        .map(|time| time.with_timezone(&Local).format("%b %-d, %Y").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AttachmentRef;

    fn message(content: Option<&str>, data: Option<Vec<u8>>) -> ChatMessage {
        ChatMessage {
            id: "m".to_string(),
            sender_id: "bob".to_string(),
            sender_display_name: "Bob".to_string(),
            sent_at: 0,
            content: content.map(str::to_string),
            attachment_ref: data
                .as_ref()
                .map(|_| AttachmentRef::new("https://cdn.example.com/x.jpg")),
            attachment_data: data,
        }
    }

    #[test]
    fn text_body_is_the_content() {
        assert_eq!(body(&message(Some("hello"), None)), "hello");
    }

    #[test]
    fn photo_body_shows_size() {
        assert_eq!(body(&message(None, Some(vec![0; 2048]))), "[photo, 2.0 KB]");
    }

    #[test]
    fn date_header_formats_valid_timestamps() {
        assert!(!date_header(1_700_000_000_000).is_empty());
        assert!(date_header(i64::MAX).is_empty());
    }
}
