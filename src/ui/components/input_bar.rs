pub enum InputAction {
    SendText(String),
    AttachPhoto(String),
}

pub fn render(
    ui: &mut egui::Ui,
    input_text: &mut String,
    photo_path: &mut String,
    sending_photo: bool,
) -> Option<InputAction> {
    let mut send = false;
    let mut attach = false;

    ui.horizontal(|ui| {
        let response = ui.text_edit_singleline(input_text);
        if ui.button("Send").clicked() {
            send = true;
        }

        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = true;
        }
    });

    ui.horizontal(|ui| {
        ui.add(egui::TextEdit::singleline(photo_path).hint_text("Path to an image, or drop one here"));
        let label = if sending_photo { "Uploading..." } else { "Attach" };
        // Khóa nút trong lúc đang upload ảnh trước đó.
        if ui
            .add_enabled(!sending_photo, egui::Button::new(label))
            .clicked()
        {
            attach = true;
        }
    });

    if send && !input_text.trim().is_empty() {
        let message = input_text.clone();
        input_text.clear();
        return Some(InputAction::SendText(message));
    }

    // Kéo thả file ảnh vào cửa sổ cũng gửi như bấm Attach.
    let dropped = ui.ctx().input(|i| {
        i.raw
            .dropped_files
            .iter()
            .find_map(|file| file.path.clone())
    });
    if let Some(path) = dropped.filter(|_| !sending_photo) {
        return Some(InputAction::AttachPhoto(path.display().to_string()));
    }

    if attach && !photo_path.trim().is_empty() {
        let path = photo_path.clone();
        photo_path.clear();
        return Some(InputAction::AttachPhoto(path));
    }

    None
}
