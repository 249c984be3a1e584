use crate::ui::state::{LoginRequest, LoginState};

pub fn render(ui: &mut egui::Ui, state: &mut LoginState) -> Option<LoginRequest> {
    ui.vertical_centered(|ui| {
        ui.add_space(40.0);
        ui.heading("Welcome back!");
    });
    ui.add_space(24.0);

    ui.label("Email");
    ui.text_edit_singleline(&mut state.email);
    ui.label("Display name");
    ui.add(egui::TextEdit::singleline(&mut state.display_name).hint_text("optional"));
    ui.label("Password");
    ui.add(egui::TextEdit::singleline(&mut state.password).password(true));
    ui.label("Chat with");
    ui.add(egui::TextEdit::singleline(&mut state.friend_id).hint_text("friend@example.com"));

    if let Some(error) = &state.error {
        ui.colored_label(egui::Color32::RED, error.as_str());
    }

    ui.add_space(16.0);
    if !ui
        .add_enabled(state.is_ready(), egui::Button::new("Login"))
        .clicked()
    {
        return None;
    }

    match state.submit() {
        Ok(request) => {
            state.error = None;
            Some(request)
        }
        Err(error) => {
            state.error = Some(error);
            None
        }
    }
}
