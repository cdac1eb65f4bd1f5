//! LifecycleController - owns window creation and process exit decisions
//!
//! The controller is a plain state machine. Platform work goes through a
//! [`WindowBackend`], which the host implements with tao/wry and tests
//! replace with a fake.

use crate::{WindowError, WindowHandle, WindowSpec};
use ext_csp::RuntimeMode;
use tracing::{debug, info, warn};

/// Platform side of window creation
pub trait WindowBackend {
    /// Create a window, install the header middleware and load the bundle
    fn create_window(&mut self, spec: &WindowSpec) -> Result<WindowHandle, WindowError>;
    fn open_devtools(&mut self, window: WindowHandle) -> Result<(), WindowError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Running,
    AllWindowsClosed,
    Terminated,
}

/// Whether the event loop should keep running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlDecision {
    Continue,
    Exit,
}

/// Close-last-window-quits on every platform except macOS
pub fn platform_quits_on_last_window_closed() -> bool {
    !cfg!(target_os = "macos")
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub mode: RuntimeMode,
    pub quit_on_last_window_closed: bool,
    pub window: WindowSpec,
}

impl LifecycleConfig {
    pub fn new(mode: RuntimeMode, window: WindowSpec) -> Self {
        Self {
            mode,
            quit_on_last_window_closed: platform_quits_on_last_window_closed(),
            window,
        }
    }

    pub fn with_quit_on_last_window_closed(mut self, quit: bool) -> Self {
        self.quit_on_last_window_closed = quit;
        self
    }
}

pub struct LifecycleController {
    config: LifecycleConfig,
    state: LifecycleState,
    windows: Vec<WindowHandle>,
}

impl LifecycleController {
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config,
            state: LifecycleState::NotStarted,
            windows: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn windows(&self) -> &[WindowHandle] {
        &self.windows
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Process is ready: create the first window
    pub fn on_ready<B: WindowBackend>(&mut self, backend: &mut B) -> ControlDecision {
        if self.state != LifecycleState::NotStarted {
            debug!(state = ?self.state, "Ignoring ready signal");
            return self.decision();
        }

        match self.open_window(backend) {
            Ok(window) => {
                info!(window = %window, mode = %self.config.mode, "Host running");
                self.state = LifecycleState::Running;
            }
            Err(e) => {
                warn!(error = %e, "Failed to create initial window");
                self.enter_all_windows_closed();
            }
        }
        self.decision()
    }

    /// The user closed `window`
    pub fn on_window_closed(&mut self, window: WindowHandle) -> ControlDecision {
        if self.state == LifecycleState::Terminated {
            return self.decision();
        }

        let before = self.windows.len();
        self.windows.retain(|w| *w != window);
        if self.windows.len() == before {
            debug!(window = %window, "Close for untracked window");
            return self.decision();
        }

        info!(window = %window, "Window closed");
        if self.windows.is_empty() {
            self.enter_all_windows_closed();
        }
        self.decision()
    }

    /// Dock or taskbar icon invoked: re-create the window if none exists
    pub fn on_activate<B: WindowBackend>(&mut self, backend: &mut B) -> ControlDecision {
        if self.state != LifecycleState::AllWindowsClosed || !self.windows.is_empty() {
            debug!(state = ?self.state, windows = self.windows.len(), "Ignoring activate");
            return self.decision();
        }

        match self.open_window(backend) {
            Ok(window) => {
                info!(window = %window, "Window re-created on activate");
                self.state = LifecycleState::Running;
            }
            Err(e) => warn!(error = %e, "Failed to re-create window"),
        }
        self.decision()
    }

    /// Explicit quit request
    pub fn on_quit(&mut self) -> ControlDecision {
        if self.state != LifecycleState::Terminated {
            info!(state = ?self.state, "Quit requested");
            self.state = LifecycleState::Terminated;
        }
        self.decision()
    }

    fn open_window<B: WindowBackend>(
        &mut self,
        backend: &mut B,
    ) -> Result<WindowHandle, WindowError> {
        let window = backend.create_window(&self.config.window)?;
        self.windows.push(window);

        if self.config.mode.is_development() {
            if let Err(e) = backend.open_devtools(window) {
                warn!(window = %window, error = %e, "Failed to open devtools");
            }
        }
        Ok(window)
    }

    fn enter_all_windows_closed(&mut self) {
        self.state = LifecycleState::AllWindowsClosed;
        if self.config.quit_on_last_window_closed {
            info!("All windows closed, quitting");
            self.state = LifecycleState::Terminated;
        } else {
            info!("All windows closed, staying alive");
        }
    }

    fn decision(&self) -> ControlDecision {
        if self.state == LifecycleState::Terminated {
            ControlDecision::Exit
        } else {
            ControlDecision::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeBackend {
        next_id: u64,
        created: Vec<WindowHandle>,
        devtools: Vec<WindowHandle>,
        fail_create: bool,
    }

    impl WindowBackend for FakeBackend {
        fn create_window(&mut self, spec: &WindowSpec) -> Result<WindowHandle, WindowError> {
            assert_eq!((spec.width, spec.height), (1024, 768));
            if self.fail_create {
                return Err(WindowError::create_failed("no display"));
            }
            self.next_id += 1;
            let handle = WindowHandle::new(self.next_id);
            self.created.push(handle);
            Ok(handle)
        }

        fn open_devtools(&mut self, window: WindowHandle) -> Result<(), WindowError> {
            self.devtools.push(window);
            Ok(())
        }
    }

    fn controller(mode: RuntimeMode, quit_on_last: bool) -> LifecycleController {
        LifecycleController::new(
            LifecycleConfig::new(mode, WindowSpec::new("Test"))
                .with_quit_on_last_window_closed(quit_on_last),
        )
    }

    #[test]
    fn test_ready_creates_one_window() {
        let mut backend = FakeBackend::default();
        let mut ctl = controller(RuntimeMode::Production, true);
        assert_eq!(ctl.state(), LifecycleState::NotStarted);

        assert_eq!(ctl.on_ready(&mut backend), ControlDecision::Continue);
        assert_eq!(ctl.state(), LifecycleState::Running);
        assert_eq!(ctl.window_count(), 1);
        assert_eq!(backend.created.len(), 1);
        assert!(backend.devtools.is_empty());

        // A second ready signal is not a second start
        ctl.on_ready(&mut backend);
        assert_eq!(backend.created.len(), 1);
    }

    #[test]
    fn test_devtools_only_in_development() {
        let mut backend = FakeBackend::default();
        let mut ctl = controller(RuntimeMode::Development, true);
        ctl.on_ready(&mut backend);
        assert_eq!(backend.devtools, backend.created);
    }

    #[test]
    fn test_last_window_closed_quits() {
        let mut backend = FakeBackend::default();
        let mut ctl = controller(RuntimeMode::Production, true);
        ctl.on_ready(&mut backend);

        let window = ctl.windows()[0];
        assert_eq!(ctl.on_window_closed(window), ControlDecision::Exit);
        assert_eq!(ctl.state(), LifecycleState::Terminated);
    }

    #[test]
    fn test_last_window_closed_stays_alive_on_mac_style() {
        let mut backend = FakeBackend::default();
        let mut ctl = controller(RuntimeMode::Production, false);
        ctl.on_ready(&mut backend);

        let window = ctl.windows()[0];
        assert_eq!(ctl.on_window_closed(window), ControlDecision::Continue);
        assert_eq!(ctl.state(), LifecycleState::AllWindowsClosed);
        assert_eq!(ctl.window_count(), 0);
    }

    #[test]
    fn test_activate_with_open_window_is_ignored() {
        let mut backend = FakeBackend::default();
        let mut ctl = controller(RuntimeMode::Production, false);
        ctl.on_ready(&mut backend);

        assert_eq!(ctl.on_activate(&mut backend), ControlDecision::Continue);
        assert_eq!(backend.created.len(), 1);
        assert_eq!(ctl.window_count(), 1);
    }

    #[test]
    fn test_activate_without_windows_recreates_one() {
        let mut backend = FakeBackend::default();
        let mut ctl = controller(RuntimeMode::Development, false);
        ctl.on_ready(&mut backend);
        let first = ctl.windows()[0];
        ctl.on_window_closed(first);

        ctl.on_activate(&mut backend);
        assert_eq!(ctl.state(), LifecycleState::Running);
        assert_eq!(ctl.window_count(), 1);
        assert_eq!(backend.created.len(), 2);
        assert_ne!(ctl.windows()[0], first);
        assert_eq!(backend.devtools.len(), 2);

        // Re-entrant activate while the new window is open
        ctl.on_activate(&mut backend);
        assert_eq!(backend.created.len(), 2);
    }

    #[test]
    fn test_activate_before_ready_is_ignored() {
        let mut backend = FakeBackend::default();
        let mut ctl = controller(RuntimeMode::Production, false);
        ctl.on_activate(&mut backend);
        assert_eq!(ctl.state(), LifecycleState::NotStarted);
        assert!(backend.created.is_empty());
    }

    #[test]
    fn test_quit_from_any_state() {
        let mut backend = FakeBackend::default();

        let mut running = controller(RuntimeMode::Production, false);
        running.on_ready(&mut backend);
        assert_eq!(running.on_quit(), ControlDecision::Exit);
        assert_eq!(running.state(), LifecycleState::Terminated);

        let mut idle = controller(RuntimeMode::Production, false);
        idle.on_ready(&mut backend);
        let window = idle.windows()[0];
        idle.on_window_closed(window);
        assert_eq!(idle.on_quit(), ControlDecision::Exit);
    }

    #[test]
    fn test_signals_after_termination_ignored() {
        let mut backend = FakeBackend::default();
        let mut ctl = controller(RuntimeMode::Production, true);
        ctl.on_ready(&mut backend);
        ctl.on_quit();

        assert_eq!(ctl.on_activate(&mut backend), ControlDecision::Exit);
        assert_eq!(ctl.on_ready(&mut backend), ControlDecision::Exit);
        assert_eq!(ctl.on_window_closed(WindowHandle::new(1)), ControlDecision::Exit);
        assert_eq!(ctl.state(), LifecycleState::Terminated);
        assert_eq!(backend.created.len(), 1);
    }

    #[test]
    fn test_unknown_window_close_ignored() {
        let mut backend = FakeBackend::default();
        let mut ctl = controller(RuntimeMode::Production, true);
        ctl.on_ready(&mut backend);
        assert_eq!(
            ctl.on_window_closed(WindowHandle::new(99)),
            ControlDecision::Continue
        );
        assert_eq!(ctl.state(), LifecycleState::Running);
    }

    #[test]
    fn test_failed_initial_window() {
        let mut backend = FakeBackend {
            fail_create: true,
            ..Default::default()
        };
        let mut quitting = controller(RuntimeMode::Production, true);
        assert_eq!(quitting.on_ready(&mut backend), ControlDecision::Exit);

        let mut lingering = controller(RuntimeMode::Production, false);
        assert_eq!(lingering.on_ready(&mut backend), ControlDecision::Continue);
        assert_eq!(lingering.state(), LifecycleState::AllWindowsClosed);

        backend.fail_create = false;
        lingering.on_activate(&mut backend);
        assert_eq!(lingering.state(), LifecycleState::Running);
    }
}
