use eframe::egui;
use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::backend::Backend;
use crate::error::Result;
use crate::session::ThreadSession;

use super::components::input_bar::{self, InputAction};
use super::components::{login_form, message_list};
use super::state::{LoginRequest, LoginState, ThreadViewState};

enum Screen {
    Login(LoginState),
    Opening {
        friend_id: String,
        session: oneshot::Receiver<Result<ThreadSession>>,
    },
    Thread(Box<ThreadViewState>),
}

pub struct ChatApp {
    screen: Screen,
    backend: Backend,
    channel_capacity: usize,
    runtime: Handle,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        backend: Backend,
        channel_capacity: usize,
        runtime: Handle,
    ) -> Self {
        Self {
            screen: Screen::Login(LoginState::default()),
            backend,
            channel_capacity,
            runtime,
        }
    }
}

/// Subscribing may wait on the network, so it runs on the runtime and the
/// result is picked up by a later frame.
fn open_thread(
    backend: &Backend,
    runtime: &Handle,
    channel_capacity: usize,
    request: LoginRequest,
) -> Screen {
    let (reply, session) = oneshot::channel();
    let backend = backend.clone();
    let friend_id = request.friend_id.clone();

    runtime.spawn(async move {
        let result = ThreadSession::open(
            &backend,
            request.profile,
            request.thread_id,
            channel_capacity,
        )
        .await;
        let _ = reply.send(result);
    });

    Screen::Opening { friend_id, session }
}

fn render_thread(ctx: &egui::Context, view: &mut ThreadViewState) -> bool {
    view.handle_notices();
    let mut logout = false;

    egui::TopBottomPanel::top("thread_header").show(ctx, |ui| {
        ui.horizontal(|ui| {
            ui.heading(view.friend_id.as_str());
            if ui.button("Log out").clicked() {
                logout = true;
            }
        });
    });

    egui::TopBottomPanel::bottom("input_bar").show(ctx, |ui| {
        let sending_photo = view.is_uploading_photo();
        match input_bar::render(ui, &mut view.input_text, &mut view.photo_path, sending_photo) {
            Some(InputAction::SendText(text)) => view.send_text(text),
            Some(InputAction::AttachPhoto(path)) => view.attach_photo(path),
            None => {}
        }
    });

    egui::CentralPanel::default().show(ctx, |ui| {
        let own_id = view.session.profile().id.clone();
        view.viewer_at_bottom = message_list::render(
            ui,
            view.session.messages(),
            &own_id,
            view.scroll_to_bottom,
            &mut view.photos,
        );
        view.scroll_to_bottom = false;
    });

    let mut dismiss = false;
    if let Some(alert) = &view.alert {
        egui::Window::new(alert.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(alert.message.as_str());
                if ui.button("OK").clicked() {
                    dismiss = true;
                }
            });
    }
    if dismiss {
        view.dismiss_alert();
    }

    logout
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let mut next = None;

        match &mut self.screen {
            Screen::Login(login) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    if let Some(request) = login_form::render(ui, login) {
                        next = Some(open_thread(
                            &self.backend,
                            &self.runtime,
                            self.channel_capacity,
                            request,
                        ));
                    }
                });
            }
            Screen::Opening { friend_id, session } => {
                match session.try_recv() {
                    Ok(Ok(opened)) => {
                        next = Some(Screen::Thread(Box::new(ThreadViewState::new(
                            opened,
                            friend_id.clone(),
                        ))));
                    }
                    Ok(Err(err)) => {
                        log::error!("Failed to open thread: {err}");
                        next = Some(Screen::Login(LoginState {
                            error: Some(err.to_string()),
                            ..LoginState::default()
                        }));
                    }
                    Err(TryRecvError::Closed) => {
                        next = Some(Screen::Login(LoginState {
                            error: Some("Could not open the conversation".to_string()),
                            ..LoginState::default()
                        }));
                    }
                    Err(TryRecvError::Empty) => {
                        egui::CentralPanel::default().show(ctx, |ui| {
                            ui.centered_and_justified(|ui| ui.spinner());
                        });
                    }
                }
            }
            Screen::Thread(view) => {
                if render_thread(ctx, view) {
                    log::info!("Closing thread {}", view.session.thread_id());
                    // Drop ThreadViewState => subscription được giải phóng.
                    next = Some(Screen::Login(LoginState::default()));
                }
            }
        }

        if let Some(screen) = next {
            self.screen = screen;
        }

        ctx.request_repaint();
    }
}
