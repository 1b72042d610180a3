// GUI Controller - Bridges the Slint window with the scanner
//
// This module contains the GuiController which coordinates between:
// - Slint UI (MainWindow)
// - StateManager (view model, settings, history)
// - ScanOrchestrator (file and camera scans)
// - EventLoopBridge (delivers background results to the UI thread)
//
// It handles:
// - Setting up UI callbacks → orchestrator calls
// - Applying StateChanges to widget properties
// - File picker dialog and drag-and-drop
// - Flushing settings and history when the window closes

use crate::metrics::Metrics;
use crate::models::CAMERA_PLACEHOLDER;
use crate::services::files::{SUPPORTED_IMAGE_EXTENSIONS, is_supported_image, normalize_dropped_path};
use crate::services::{ClipboardService, ScanChannels, ScanEvent, ScanOrchestrator};
use crate::state::{StateChange, StateManager};
use crate::ui::bridge::EventLoopBridge;
use anyhow::{Context, Result};
use image::RgbaImage;
use slint::{ComponentHandle, Rgba8Pixel, SharedPixelBuffer};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

// Include the generated Slint code
slint::include_modules!();

/// Label of the copy button at rest.
pub const COPY_LABEL: &str = "Copy to clipboard";

/// Label of the copy button right after a copy.
pub const COPIED_LABEL: &str = "Copied!";

/// How long the copy button reads [`COPIED_LABEL`].
pub const COPIED_FEEDBACK: Duration = Duration::from_millis(1500);

/// How long the progress indicator stays at 100% after a successful scan.
pub const PROGRESS_LINGER: Duration = Duration::from_secs(1);

/// Everything the callbacks share, owned by the UI thread.
struct Session {
    state: StateManager,
    orchestrator: ScanOrchestrator,
    clipboard: ClipboardService,
    metrics: Arc<Metrics>,
}

type SharedSession = Rc<RefCell<Session>>;

/// GUI Controller that wires up the Slint UI with the scanner
///
/// This is the main coordinator for the GUI layer. It:
/// - Starts the EventLoopBridge that feeds scan events to the StateManager
/// - Sets up Slint callbacks to trigger scans and camera control
/// - Applies StateChanges to the window
/// - Handles the file dialog using the `rfd` crate and file drops via winit
///
/// # Example
/// ```ignore
/// let (orchestrator, channels) = ScanOrchestrator::new(pipeline, backend, handle, metrics.clone());
/// let controller = GuiController::new(state_manager, orchestrator, channels, metrics)?;
/// controller.run()?;  // Blocks until window is closed
/// ```
pub struct GuiController {
    /// The Slint UI window
    ui: MainWindow,

    /// Drains scan results on the UI thread while alive
    _bridge: EventLoopBridge,

    session: SharedSession,
}

impl GuiController {
    /// Create a new GUI controller
    ///
    /// Must be called on the thread that will run the event loop.
    pub fn new(
        state: StateManager,
        orchestrator: ScanOrchestrator,
        channels: ScanChannels,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create Slint UI")?;

        let session = Rc::new(RefCell::new(Session {
            state,
            orchestrator,
            clipboard: ClipboardService::new(),
            metrics,
        }));

        Self::sync_ui_with_state(&ui, &session.borrow().state);

        let bridge = EventLoopBridge::new();
        Self::setup_event_delivery(&ui, &bridge, &session, channels);
        Self::setup_callbacks(&ui, &session);
        Self::setup_window_hooks(&ui, &session);

        tracing::info!("GUI controller initialized");

        Ok(Self {
            ui,
            _bridge: bridge,
            session,
        })
    }

    /// Run the GUI (blocks until window is closed)
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        self.ui.run()
    }

    /// Scan `path` as if it had been chosen in the file picker.
    pub fn open_path(&self, path: &Path) {
        scan_path(&self.session, path);
    }

    /// Synchronize UI with current state
    ///
    /// This is called once at startup.
    fn sync_ui_with_state(ui: &MainWindow, state_manager: &StateManager) {
        let state = state_manager.state();

        ui.set_dark_mode(state.theme.is_dark());
        ui.set_theme_icon(state.theme.toggle_icon().into());
        ui.set_camera_placeholder(CAMERA_PLACEHOLDER.into());
        ui.set_camera_active(state.camera_active);
        ui.set_progress_visible(state.progress.is_some());
        ui.set_progress(state.progress.unwrap_or(0.0));
        ui.set_result_text(state.result_text.clone().into());
        ui.set_result_is_error(state.result_is_error);
        ui.set_copy_enabled(state.copy_enabled());
        ui.set_copy_label(COPY_LABEL.into());
        ui.set_history_text(state.history_text.clone().into());

        tracing::debug!("UI synchronized with initial state");
    }

    /// Route scan events and camera previews from the bridge into the session.
    fn setup_event_delivery(
        ui: &MainWindow,
        bridge: &EventLoopBridge,
        session: &SharedSession,
        channels: ScanChannels,
    ) {
        let ui_weak = ui.as_weak();
        let session_for_events = Rc::clone(session);
        let on_event = move |event: ScanEvent| {
            let Some(ui) = ui_weak.upgrade() else {
                return;
            };

            let changes = {
                let mut session = session_for_events.borrow_mut();
                session.metrics.record_ui_event();
                if matches!(event, ScanEvent::CameraFailed { .. }) {
                    tracing::error!("Camera stopped unexpectedly");
                    session.orchestrator.stop_camera();
                }
                session.state.apply_scan_event(event)
            };

            apply_changes(&ui, &session_for_events, changes);
        };

        let ui_weak = ui.as_weak();
        let session_for_previews = Rc::clone(session);
        let on_preview = move |frame: RgbaImage| {
            let Some(ui) = ui_weak.upgrade() else {
                return;
            };
            // Frames still queued when the camera stopped are dropped
            if !session_for_previews.borrow().state.state().camera_active {
                return;
            }
            ui.set_camera_image(to_slint_image(&frame));
            ui.set_camera_has_frame(true);
        };

        bridge.start(channels, on_event, on_preview);
    }

    /// Set up Slint UI callbacks
    fn setup_callbacks(ui: &MainWindow, session: &SharedSession) {
        let ui_weak = ui.as_weak();
        let session_clone = Rc::clone(session);
        ui.on_toggle_theme(move || {
            let Some(ui) = ui_weak.upgrade() else { return };
            let changes = session_clone.borrow_mut().state.toggle_theme();
            apply_changes(&ui, &session_clone, changes);
        });

        let session_clone = Rc::clone(session);
        ui.on_choose_file(move || {
            tracing::debug!("Choose file clicked");
            if let Some(path) = Self::show_file_picker("Select an image with a QR code") {
                scan_path(&session_clone, &path);
            }
        });

        let ui_weak = ui.as_weak();
        let session_clone = Rc::clone(session);
        ui.on_toggle_camera(move || {
            let Some(ui) = ui_weak.upgrade() else { return };

            let changes = {
                let mut session = session_clone.borrow_mut();
                let device = session.state.settings().camera_device;
                match session.orchestrator.toggle_camera(device) {
                    Ok(active) => {
                        if active {
                            ui.set_camera_has_frame(false);
                        }
                        session.state.set_camera_active(active)
                    }
                    Err(e) => {
                        tracing::error!("Failed to start camera {}: {}", device, e);
                        let mut changes = session.state.set_camera_active(false);
                        changes.extend(session.state.show_error(e.to_string()));
                        changes
                    }
                }
            };
            apply_changes(&ui, &session_clone, changes);
        });

        let ui_weak = ui.as_weak();
        let session_clone = Rc::clone(session);
        ui.on_capture_frame(move || {
            let Some(ui) = ui_weak.upgrade() else { return };

            let changes = {
                let mut session = session_clone.borrow_mut();
                match session.orchestrator.scan_from_camera_capture() {
                    Ok(_task) => Vec::new(),
                    Err(e) => {
                        tracing::warn!("Capture rejected: {}", e);
                        let mut changes = session.state.set_camera_active(false);
                        changes.extend(session.state.show_error(e.to_string()));
                        changes
                    }
                }
            };
            apply_changes(&ui, &session_clone, changes);
        });

        let ui_weak = ui.as_weak();
        let session_clone = Rc::clone(session);
        ui.on_copy_result(move || {
            let Some(ui) = ui_weak.upgrade() else { return };

            let copied = {
                let mut session = session_clone.borrow_mut();
                let Some(payload) = session.state.state().last_payload.clone() else {
                    return;
                };
                session.clipboard.copy_text(&payload)
            };

            match copied {
                Ok(()) => {
                    ui.set_copy_label(COPIED_LABEL.into());
                    let ui_weak = ui.as_weak();
                    slint::Timer::single_shot(COPIED_FEEDBACK, move || {
                        if let Some(ui) = ui_weak.upgrade() {
                            ui.set_copy_label(COPY_LABEL.into());
                        }
                    });
                }
                Err(e) => tracing::error!("Failed to copy to clipboard: {}", e),
            }
        });
    }

    /// Hook window-level events: file drops and closing.
    fn setup_window_hooks(ui: &MainWindow, session: &SharedSession) {
        use i_slint_backend_winit::WinitWindowAccessor;
        use i_slint_backend_winit::{EventResult, winit::event::WindowEvent};

        let ui_weak = ui.as_weak();
        let session_clone = Rc::clone(session);
        ui.window().on_winit_window_event(move |_window, event| {
            let Some(ui) = ui_weak.upgrade() else {
                return EventResult::Propagate;
            };

            match event {
                WindowEvent::HoveredFile(_) => ui.set_drop_highlight(true),
                WindowEvent::HoveredFileCancelled => ui.set_drop_highlight(false),
                WindowEvent::DroppedFile(path) => {
                    ui.set_drop_highlight(false);
                    let path = normalize_dropped_path(&path.to_string_lossy());
                    tracing::info!("File dropped: {}", path.display());
                    scan_path(&session_clone, &path);
                }
                _ => {}
            }

            EventResult::Propagate
        });

        let session_clone = Rc::clone(session);
        ui.window().on_close_requested(move || {
            tracing::info!("Window closing");
            let mut session = session_clone.borrow_mut();
            session.orchestrator.shutdown();
            if let Err(e) = session.state.flush() {
                tracing::error!("Failed to save on exit: {:#}", e);
            }
            slint::CloseRequestResponse::HideWindow
        });
    }

    /// Show a native file picker dialog
    ///
    /// Offers the supported image types first, with an "All files" fallback.
    ///
    /// # Returns
    /// The selected file path, or None if cancelled
    fn show_file_picker(title: &str) -> Option<PathBuf> {
        use rfd::FileDialog;

        FileDialog::new()
            .set_title(title)
            .add_filter("Image files", SUPPORTED_IMAGE_EXTENSIONS)
            .add_filter("All files", &["*"])
            .pick_file()
    }
}

/// Start a file scan; its progress and outcome arrive through the bridge.
fn scan_path(session: &SharedSession, path: &Path) {
    if !is_supported_image(path) {
        tracing::debug!("{} has no image extension, trying anyway", path.display());
    }

    // Errors arrive as a Finished event as well; they are shown from there
    if let Err(e) = session.borrow_mut().orchestrator.scan_from_file(path) {
        tracing::warn!("Scan of {} failed: {}", path.display(), e);
    }
}

/// Apply StateChanges to the window.
fn apply_changes(ui: &MainWindow, session: &SharedSession, changes: Vec<StateChange>) {
    for change in changes {
        tracing::trace!("Applying state change: {:?}", change);

        match change {
            StateChange::ThemeChanged { theme } => {
                ui.set_dark_mode(theme.is_dark());
                ui.set_theme_icon(theme.toggle_icon().into());
            }
            StateChange::ProgressUpdated { value } => {
                let (visible, value) = progress_display(value);
                ui.set_progress_visible(visible);
                ui.set_progress(value);
            }
            StateChange::ResultChanged {
                text,
                is_error,
                copy_enabled,
            } => {
                ui.set_result_text(text.into());
                ui.set_result_is_error(is_error);
                ui.set_copy_enabled(copy_enabled);
            }
            StateChange::CameraStateChanged { active } => {
                ui.set_camera_active(active);
                if !active {
                    ui.set_camera_has_frame(false);
                }
            }
            StateChange::HistoryUpdated { text } => {
                ui.set_history_text(text.into());
            }
            StateChange::PreviewUpdated { image } => {
                ui.set_preview_image(to_slint_image(&image));
                ui.set_has_preview(true);
            }
            StateChange::ScanFinished { scan_id, success } => {
                if success {
                    schedule_progress_hide(ui, Rc::downgrade(session), scan_id);
                }
            }
        }
    }
}

/// Hide the progress indicator of `scan_id` after [`PROGRESS_LINGER`].
fn schedule_progress_hide(ui: &MainWindow, session: Weak<RefCell<Session>>, scan_id: u64) {
    let ui_weak = ui.as_weak();
    slint::Timer::single_shot(PROGRESS_LINGER, move || {
        let (Some(ui), Some(session)) = (ui_weak.upgrade(), session.upgrade()) else {
            return;
        };
        let changes = session.borrow_mut().state.hide_progress_for(scan_id);
        apply_changes(&ui, &session, changes);
    });
}

/// Visibility and value of the progress indicator.
fn progress_display(value: Option<f32>) -> (bool, f32) {
    match value {
        Some(value) => (true, value.clamp(0.0, 1.0)),
        None => (false, 0.0),
    }
}

fn to_slint_image(image: &RgbaImage) -> slint::Image {
    let buffer = SharedPixelBuffer::<Rgba8Pixel>::clone_from_slice(
        image.as_raw(),
        image.width(),
        image.height(),
    );
    slint::Image::from_rgba8(buffer)
}
