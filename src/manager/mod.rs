//! The compositor core itself, and associated modules.

use std::env;
use std::fmt;
use std::iter::FromIterator;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use calloop::signals::{Signal, Signals};
use calloop::{EventLoop, LoopHandle, LoopSignal};

use tracing::{debug, error, info, instrument, warn};

use crate::bindings::{Action, Keybind, Toggle, WorkspaceTarget};
use crate::core::desktop::Desktop;
use crate::core::output::Output;
use crate::core::ring::Ring;
use crate::core::types::{Direction, Rect};
use crate::core::view::{
    FocusPolicy, Maximized, View, ViewFilter, ViewId, ViewRing, WorkspaceBinding,
};
use crate::ctl::{self, CtlCommand, KeybindCmd, TilingCmd, WorkspaceCmd};
use crate::input::{transition, CycleState, InputMode, KeyboardState};
use crate::log::basic_error_handler;
use crate::scene::core::{OutputId, SceneConn};
use crate::scene::event::ViewMapEvent;
use crate::tiling::{AnchorState, TilingState};
use crate::{ErrorHandler, Result, TatamiError};

/// The central configuration object for the compositor core.
pub mod config;
/// A translation layer for converting scene events into `Server` actions.
pub mod event;
/// The focus controller.
pub mod focus;

#[doc(inline)]
pub use config::Config;
#[doc(inline)]
pub use event::EventAction;
#[doc(inline)]
pub use focus::{CursorContext, SsdContext};

macro_rules! handle_err {
    ($call:expr, $_self:expr) => {
        if let Err(e) = $call {
            $_self.report_error(e.into());
        }
    };
}

/// The server aggregate that owns all window-management state and
/// responds to events from the scene backend, the keyboard engine and
/// the control channel.
///
/// The server is generic over a type argument C that implements the
/// [`SceneConn`] trait, but this is never directly exposed by its
/// public API and is only used when constructing a new instance.
///
/// # Usage
///
/// ```no_run
/// use calloop::EventLoop;
/// use tatamiwm::{Config, HeadlessConn, Server};
///
/// let event_loop = EventLoop::try_new().unwrap();
/// let conn = HeadlessConn::with_output(
///     tatamiwm::types::Rect::new(0, 0, 1920, 1080),
/// );
///
/// let server = Server::new(conn, Config::default(), &event_loop);
///
/// /* run the compositor until it is asked to exit */
/// server.run(event_loop).unwrap();
/// ```
pub struct Server<C: SceneConn> {
    /// The scene backend connection.
    pub(crate) conn: C,
    /// The core configuration.
    pub(crate) config: Config,
    /// Every view the compositor manages.
    pub(crate) views: ViewRing,
    /// Workspaces and the global stacking bands.
    pub(crate) desktop: Desktop,
    /// All connected outputs.
    pub(crate) outputs: Ring<Output>,
    /// The live keybind list, rebuilt on reconfigure.
    pub(crate) bindings: Vec<Keybind>,
    /// Keyboard engine state.
    pub(crate) keyboard: KeyboardState,
    /// The seat's interaction mode.
    pub(crate) input_mode: InputMode,
    /// Window-switcher state while in cycle mode.
    pub(crate) cycle: Option<CycleState>,
    /// Tiling engine state.
    pub(crate) tiling: TilingState,
    /// The view currently holding keyboard focus.
    pub(crate) focused: Option<ViewId>,
    /// A main error handler function.
    ehandler: ErrorHandler,
    pub(crate) loop_handle: LoopHandle<'static, Server<C>>,
    loop_signal: LoopSignal,
    /// The primary session client; the compositor exits with it.
    session_child: Option<Child>,
    // If the server is running.
    running: bool,
}

impl<C: SceneConn> fmt::Debug for Server<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("views", &self.views)
            .field("desktop", &self.desktop)
            .field("outputs", &self.outputs)
            .field("input_mode", &self.input_mode)
            .field("tiling", &self.tiling)
            .field("focused", &self.focused)
            .finish()
    }
}

impl<C: SceneConn + 'static> Server<C> {
    /// Constructs a new Server object.
    pub fn new(conn: C, config: Config, event_loop: &EventLoop<'static, Server<C>>) -> Server<C> {
        let mut outputs = Ring::from_iter(
            conn.all_outputs()
                .unwrap_or_else(|e| fatal!("Could not get outputs: {}", e)),
        );
        if !outputs.is_empty() {
            outputs.set_focused(0);
        }
        debug!("Got outputs: {:?}", outputs);

        let bindings = Self::build_bindings(&config);
        let desktop = Desktop::new(config.workspaces.iter());
        let tiling = TilingState {
            enabled: config.tiling_enabled,
            grid_mode: config.tiling_grid_mode,
            anchor: None,
        };

        Self {
            conn,
            config,
            views: ViewRing::new(),
            desktop,
            outputs,
            bindings,
            keyboard: KeyboardState::default(),
            input_mode: InputMode::default(),
            cycle: None,
            tiling,
            focused: None,
            ehandler: Box::new(basic_error_handler),
            loop_handle: event_loop.handle(),
            loop_signal: event_loop.get_signal(),
            session_child: None,
            running: true,
        }
    }

    fn build_bindings(config: &Config) -> Vec<Keybind> {
        let mut bindings = Vec::with_capacity(config.keybinds.len());
        for spec in &config.keybinds {
            match Keybind::from_spec(spec) {
                Ok(kb) => bindings.push(kb),
                // bad bindings are skipped, not fatal
                Err(e) => error!("{}", e),
            }
        }
        bindings
    }

    //* Public Methods

    /// Registers signal handling and runtime files, exports the
    /// control environment, and runs the main event loop until the
    /// server is asked to exit.
    pub fn run(mut self, mut event_loop: EventLoop<'static, Server<C>>) -> Result<()> {
        self.startup()?;

        info!("Setup complete, beginning event loop");
        let result = event_loop
            .run(Duration::from_millis(16), &mut self, |server| {
                server.dispatch_events();
            })
            .map_err(|e| TatamiError::OtherError(e.to_string()));

        self.shutdown();
        result
    }

    /// Registers the control-channel signal sources and writes the
    /// initial status files.
    pub fn startup(&mut self) -> Result<()> {
        env::set_var(ctl::PID_ENV, std::process::id().to_string());
        env::set_var(ctl::VERSION_ENV, env!("CARGO_PKG_VERSION"));

        let signals = Signals::new(&[Signal::SIGUSR1, Signal::SIGHUP, Signal::SIGTERM])
            .map_err(|e| TatamiError::OtherError(format!("could not set up signals: {}", e)))?;
        self.loop_handle
            .insert_source(signals, |event, _, server: &mut Server<C>| {
                match event.signal() {
                    Signal::SIGUSR1 => server.handle_control_commands(),
                    Signal::SIGHUP => handle_err!(server.reconfigure(), server),
                    Signal::SIGTERM => server.quit(),
                    _ => {}
                }
            })
            .map_err(|_| TatamiError::OtherError("could not register signal source".into()))?;

        self.refresh_status_files();
        Ok(())
    }

    /// Drains and handles all pending backend events, then checks the
    /// session client.
    pub fn dispatch_events(&mut self) {
        loop {
            match self.conn.poll_next_event() {
                Ok(Some(event)) => {
                    for action in EventAction::from_scene_event(event) {
                        handle_err!(self.handle_event(action), self);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.report_error(e.into());
                    break;
                }
            }
        }

        if let Some(child) = self.session_child.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                info!("session client exited ({}), shutting down", status);
                self.session_child = None;
                self.quit();
            }
        }

        if !self.running {
            self.loop_signal.stop();
        }
    }

    /// Spawns the startup command once the loop is idle.
    pub fn spawn_startup(&mut self, command: String) {
        let _ = self.loop_handle.insert_idle(move |server: &mut Server<C>| {
            server.run_external(&command);
        });
    }

    /// Spawns the primary session client; the compositor exits when
    /// it dies.
    pub fn set_session_command(&mut self, command: &str) -> Result<()> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| TatamiError::SpawnProc(e.to_string()))?;
        self.session_child = Some(child);
        Ok(())
    }

    /// Run an external command.
    pub fn run_external(&mut self, command: &str) {
        debug!("Running command [{}]", command);
        let result = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match result {
            Ok(_) => {}
            Err(e) => self.report_error(TatamiError::SpawnProc(e.to_string())),
        }
    }

    /// Set an error handler for the server.
    pub fn set_error_handler<E>(&mut self, ehandler: E)
    where
        E: FnMut(TatamiError) + 'static,
    {
        self.ehandler = Box::new(ehandler);
    }

    /// Quits the event loop.
    pub fn quit(&mut self) {
        self.running = false;
    }

    /// Rebuilds all runtime keybind and tiling state from the held
    /// configuration.
    pub fn reconfigure(&mut self) -> Result<()> {
        self.reconfigure_with(None)
    }

    /// Like [`Server::reconfigure`], replacing the configuration with
    /// a freshly parsed one first.
    #[instrument(level = "debug", skip(self, new))]
    pub fn reconfigure_with(&mut self, new: Option<Config>) -> Result<()> {
        info!("Reconfiguring");
        self.cancel_repeat();
        self.cancel_conditions();
        self.keyboard.bound.clear();
        self.keyboard.on_release.clear();
        self.cycle = None;
        self.input_mode = transition(self.input_mode, InputMode::Passthrough);

        if let Some(config) = new {
            self.config = config;
        }
        self.bindings = Self::build_bindings(&self.config);
        self.tiling.enabled = self.config.tiling_enabled;
        self.tiling.grid_mode = self.config.tiling_grid_mode;

        self.retile_all()?;
        self.refresh_status_files();
        Ok(())
    }

    //* Event handling

    fn handle_event(&mut self, action: EventAction) -> Result<()> {
        use EventAction::*;

        match action {
            MapView(ev) => self.map_view(ev),
            UnmapView(id) => self.unmap_view(id),
            DestroyView(id) => self.destroy_view(id),
            TitleChange(id, title) => {
                if let Some(view) = self.views.lookup_mut(id) {
                    view.title = title;
                }
                Ok(())
            }
            SetFullscreen(id, on) => self.set_view_fullscreen(id, on),
            SetMinimized(id, on) => self.set_view_minimized(id, on),
            UserResize(id, geom) => self.user_resized(id, geom),
            RunKeyPress(ev) => self.handle_key_press(ev),
            RunKeyRelease(ev) => self.handle_key_release(ev),
            UpdateModifiers(ev) => {
                self.handle_modifiers(ev);
                Ok(())
            }
            LayoutChanged(idx) => {
                for kb in &self.bindings {
                    kb.invalidate_resolved();
                }
                if let Some(view) = self.focused.and_then(|id| self.views.lookup_mut(id)) {
                    view.layout_index = idx;
                }
                Ok(())
            }
            OutputAdded(output) => self.output_added(output),
            OutputRemoved(id) => self.output_removed(id),
            UsableAreaChanged(id, usable) => {
                if let Some((_, output)) = self.outputs.element_by_mut(|o| o.id() == id) {
                    output.set_usable(usable);
                }
                self.retile_all()
            }
        }
    }

    #[instrument(level = "debug", skip(self, ev))]
    fn map_view(&mut self, ev: ViewMapEvent) -> Result<()> {
        if self.views.contains(ev.id) {
            // the remap path: an unminimized or re-shown view
            if let Some(view) = self.views.lookup_mut(ev.id) {
                view.mapped = true;
                view.minimized = false;
            }
            self.conn.set_view_hidden(ev.id, false)?;
            self.focus_view(ev.id, true)?;
            self.retile_all()?;
            self.update_top_layers();
            return Ok(());
        }

        let ws = self.desktop.current_idx();
        let mut view = View::new(ev.id, ws);
        view.app_id = ev.app_id;
        view.title = ev.title;
        view.current = ev.geometry;
        view.pending = ev.geometry;
        view.natural = ev.geometry;
        view.mapped = true;
        view.been_mapped = true;
        view.parent = ev.parent;
        view.modal = ev.modal;
        view.margins = ev.margins;
        view.rules = self.config.rules_for(&view.app_id);
        view.focus_policy = ev
            .focus_policy
            .or_else(|| self.config.focus_policy_for(&view.app_id))
            .unwrap_or(FocusPolicy::Likely);
        view.output = self.output_for(ev.geometry);
        view.update_output_mask(self.outputs.iter());

        let id = view.id();
        debug!("managing new view {} ({})", id, view.app_id());
        self.views.append(view);
        self.desktop.add_view(id, WorkspaceBinding::Workspace(ws));

        if ev.wants_fullscreen {
            self.set_view_fullscreen(id, true)?;
        }

        self.focus_view(id, true)?;
        self.retile_all()?;
        self.update_top_layers();
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn unmap_view(&mut self, id: ViewId) -> Result<()> {
        if let Some(view) = self.views.lookup_mut(id) {
            view.mapped = false;
        } else {
            // spurious unmaps are dropped silently
            return Ok(());
        }
        if self.focused == Some(id) {
            self.focused = None;
            self.focus_topmost_view()?;
        }
        self.retile_all()?;
        self.update_top_layers();
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn destroy_view(&mut self, id: ViewId) -> Result<()> {
        self.desktop.remove_view(id);
        self.views.remove_by_id(id);
        if self.tiling.anchor.map(|a| a.view) == Some(id) {
            self.tiling.anchor = None;
        }
        if self.cycle.as_ref().and_then(|c| c.selected) == Some(id) {
            self.abort_cycling();
        }
        if self.focused == Some(id) {
            self.focused = None;
            self.focus_topmost_view()?;
        }
        self.retile_all()?;
        self.update_top_layers();
        Ok(())
    }

    fn set_view_fullscreen(&mut self, id: ViewId, on: bool) -> Result<()> {
        let full = match self.output_rect_of(id) {
            Some(rect) => rect,
            None => return Ok(()),
        };
        let conn = &self.conn;
        match self.views.expect_mut(id)?.set_fullscreen(conn, on, full) {
            Ok(()) | Err(TatamiError::NotMapped(_)) => {}
            Err(e) => return Err(e),
        }
        self.update_top_layers();
        self.retile_all()
    }

    fn set_view_minimized(&mut self, id: ViewId, on: bool) -> Result<()> {
        let conn = &self.conn;
        self.views.expect_mut(id)?.set_minimized(conn, on)?;
        if on && self.focused == Some(id) {
            self.focused = None;
            self.focus_topmost_view()?;
        } else if !on {
            self.focus_view(id, true)?;
        }
        self.retile_all()?;
        self.update_top_layers();
        Ok(())
    }

    /// A user resize finished: the view keeps its geometry and
    /// becomes the tiling anchor.
    fn user_resized(&mut self, id: ViewId, geom: Rect) -> Result<()> {
        let output = self.output_for(geom);
        let outer = {
            let view = self.views.expect_mut(id)?;
            view.current = geom;
            view.pending = geom;
            view.maximized = Maximized::None;
            view.set_tiled(false);
            view.output = output;
            match view.margins() {
                Some(m) => m.outset(geom),
                None => geom,
            }
        };
        if let Some(view) = self.views.lookup_mut(id) {
            // recompute intersections after the move
            let outputs: Vec<Output> = self.outputs.iter().cloned().collect();
            view.update_output_mask(outputs.iter());
        }

        self.tiling.anchor = Some(AnchorState {
            view: id,
            geometry: outer,
        });
        if self.tiling.enabled {
            self.retile_all()?;
        }
        Ok(())
    }

    fn output_added(&mut self, output: Output) -> Result<()> {
        info!("output {} connected", output.name());
        self.outputs.append(output);
        if self.outputs.focused_idx().is_none() {
            self.outputs.set_focused(0);
        }
        let outputs: Vec<Output> = self.outputs.iter().cloned().collect();
        for view in self.views.iter_mut() {
            if view.output().is_none() {
                view.output = Some(outputs[outputs.len() - 1].id());
            }
            view.update_output_mask(outputs.iter());
        }
        self.retile_all()
    }

    fn output_removed(&mut self, id: OutputId) -> Result<()> {
        info!("output {} disconnected", id);
        if let Some((idx, _)) = self.outputs.element_by(|o| o.id() == id) {
            self.outputs.remove(idx);
        }
        if !self.outputs.is_empty() && self.outputs.focused_idx().is_none() {
            self.outputs.set_focused(0);
        }

        let fallback = self.outputs.get(0).map(|o| o.id());
        let outputs: Vec<Output> = self.outputs.iter().cloned().collect();
        for view in self.views.iter_mut() {
            if view.output() == Some(id) {
                view.output = fallback;
            }
            view.update_output_mask(outputs.iter());
        }
        self.retile_all()
    }

    //* Actions

    /// Dispatches an ordered list of action records.
    ///
    /// Dispatch is total: individual failures are routed to the error
    /// handler and the remaining actions still run.
    pub fn dispatch_actions(&mut self, actions: Vec<Action>) -> Result<()> {
        for action in actions {
            handle_err!(self.dispatch_action(action), self);
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn dispatch_action(&mut self, action: Action) -> Result<()> {
        use Action::*;

        match action {
            Execute { command } => {
                self.run_external(&command);
                Ok(())
            }
            Close => {
                if let Some(id) = self.focused {
                    self.conn.close_view(id)?;
                } else {
                    warn!("Could not find focused view to close");
                }
                Ok(())
            }
            Focus(direction) => {
                self.cycle_step(direction);
                Ok(())
            }
            Raise => {
                if let Some(id) = self.focused {
                    self.raise_view(id)?;
                }
                Ok(())
            }
            Lower => {
                if let Some(id) = self.focused {
                    self.lower_view(id)?;
                }
                Ok(())
            }
            ToggleMaximize => self.toggle_maximize(),
            ToggleFullscreen => {
                if let Some(id) = self.focused {
                    let on = !self.views.expect(id)?.is_fullscreen();
                    self.set_view_fullscreen(id, on)?;
                }
                Ok(())
            }
            Minimize => {
                if let Some(id) = self.focused {
                    self.set_view_minimized(id, true)?;
                }
                Ok(())
            }
            ToggleAlwaysOnTop => self.toggle_band(WorkspaceBinding::AlwaysOnTop),
            ToggleAlwaysOnBottom => self.toggle_band(WorkspaceBinding::AlwaysOnBottom),
            GoToWorkspace(target) => {
                let idx = self.resolve_workspace(&target)?;
                self.switch_workspace(idx, true)
            }
            SendToWorkspace(target) => {
                let idx = self.resolve_workspace(&target)?;
                self.send_focused_to(idx)
            }
            EnableTiling => self.set_tiling_enabled(true),
            DisableTiling => self.set_tiling_enabled(false),
            ToggleTiling => {
                let on = !self.tiling.enabled;
                self.set_tiling_enabled(on)
            }
            TilingGridMode(setting) => self.set_grid_mode(setting),
            RetileAll => self.retile_all(),
            Reconfigure => self.reconfigure(),
            Exit => {
                self.quit();
                Ok(())
            }
        }
    }

    fn toggle_maximize(&mut self) -> Result<()> {
        let Some(id) = self.focused else {
            return Ok(());
        };
        let usable = match self.usable_rect_of(id) {
            Some(rect) => rect,
            None => return Ok(()),
        };
        let conn = &self.conn;
        let view = self.views.expect_mut(id)?;
        if view.maximized() == Maximized::None {
            view.maximize(conn, Maximized::Both, usable, true)
        } else {
            view.restore(conn)
        }
    }

    fn toggle_band(&mut self, band: WorkspaceBinding) -> Result<()> {
        let Some(id) = self.focused else {
            return Ok(());
        };
        let current = self.views.expect(id)?.binding();
        let new_binding = if current == band {
            WorkspaceBinding::Workspace(self.desktop.current_idx())
        } else {
            band
        };

        self.desktop.remove_view(id);
        self.desktop.add_view(id, new_binding);
        self.views.expect_mut(id)?.binding = new_binding;
        self.update_top_layers();
        self.retile_all()
    }

    fn send_focused_to(&mut self, idx: usize) -> Result<()> {
        let Some(id) = self.focused else {
            return Ok(());
        };
        debug!("sending view {} to workspace {}", id, idx);
        self.desktop.remove_view(id);
        self.desktop.add_view(id, WorkspaceBinding::Workspace(idx));
        self.views.expect_mut(id)?.binding = WorkspaceBinding::Workspace(idx);

        if idx != self.desktop.current_idx() {
            self.conn.set_view_hidden(id, true)?;
            self.focused = None;
            self.focus_topmost_view()?;
        }
        self.retile_all()
    }

    //* Workspaces

    fn resolve_workspace(&self, target: &WorkspaceTarget) -> Result<usize> {
        match target {
            WorkspaceTarget::Next => Ok(self.desktop.next_idx()),
            WorkspaceTarget::Prev => Ok(self.desktop.prev_idx()),
            WorkspaceTarget::Named(name) => self
                .desktop
                .lookup(name)
                .ok_or_else(|| TatamiError::UnknownWorkspace(name.clone())),
        }
    }

    /// Switches to a workspace, optionally chaining into the focus
    /// controller.
    #[instrument(level = "debug", skip(self))]
    pub fn switch_workspace(&mut self, idx: usize, update_focus: bool) -> Result<()> {
        let changed = self.desktop.switch_to(&self.conn, &mut self.views, idx)?;
        if !changed {
            return Ok(());
        }
        if update_focus {
            self.focus_topmost_view()?;
        }
        self.retile_all()?;
        self.update_top_layers();
        handle_err!(
            ctl::write_workspace_status(self.desktop.current().name()),
            self
        );
        Ok(())
    }

    //* Stacking

    /// Raises a view and its modal dialogs, in the model and on the
    /// scene.
    pub(crate) fn raise_view(&mut self, id: ViewId) -> Result<()> {
        self.desktop.move_to_front(id, &self.views);
        self.conn.raise_view(id)?;
        if let Some(dialog) = self.views.modal_dialog_of(id) {
            self.conn.raise_view(dialog)?;
        }
        self.update_top_layers();
        Ok(())
    }

    pub(crate) fn lower_view(&mut self, id: ViewId) -> Result<()> {
        self.desktop.move_to_back(id, &self.views);
        self.conn.lower_view(id)?;
        self.update_top_layers();
        Ok(())
    }

    /// Re-evaluates the "top" layer-shell layer on every output: it
    /// stays enabled unless the topmost mapped, non-minimized view on
    /// the output is fullscreen with nothing stacked above it.
    pub(crate) fn update_top_layers(&mut self) {
        let order = self.desktop.stacking();
        for output in self.outputs.iter() {
            let topmost = order
                .iter()
                .rev()
                .filter_map(|id| self.views.lookup(*id))
                .find(|v| {
                    v.is_mapped()
                        && !v.is_minimized()
                        && v.current().intersects(&output.geometry())
                });
            let enabled = !topmost.map(|v| v.is_fullscreen()).unwrap_or(false);
            self.conn.set_top_layer_enabled(output.id(), enabled);
        }
    }

    //* Window switcher

    /// Steps the window switcher, entering cycle mode if needed.
    pub(crate) fn cycle_step(&mut self, direction: Direction) {
        if self.input_mode != InputMode::Cycle {
            let next = transition(self.input_mode, InputMode::Cycle);
            if next != InputMode::Cycle {
                return;
            }
            self.input_mode = next;
            self.cycle = Some(CycleState {
                selected: self.focused,
                cancel_on_next_release: false,
            });
        }

        let order: Vec<ViewId> = self
            .desktop
            .stacking()
            .iter()
            .copied()
            .filter(|id| {
                self.views
                    .lookup(*id)
                    .map(|v| v.is_focusable())
                    .unwrap_or(false)
            })
            .collect();
        if order.is_empty() {
            self.abort_cycling();
            return;
        }

        let Some(cycle) = self.cycle.as_mut() else {
            return;
        };
        let len = order.len();
        let pos = cycle
            .selected
            .and_then(|sel| order.iter().position(|v| *v == sel));
        let next = match (pos, direction) {
            (Some(i), Direction::Forward) => order[(i + len - 1) % len],
            (Some(i), Direction::Backward) => order[(i + 1) % len],
            (None, Direction::Forward) => order[len - 1],
            (None, Direction::Backward) => order[0],
        };
        debug!("switcher selected view {}", next);
        cycle.selected = Some(next);
    }

    /// Leaves cycle mode and focuses the selected view.
    pub(crate) fn finish_cycling(&mut self) {
        let selected = self.cycle.take().and_then(|c| c.selected);
        self.input_mode = transition(self.input_mode, InputMode::Passthrough);
        if let Some(id) = selected {
            handle_err!(self.focus_view(id, true), self);
        }
    }

    /// Leaves cycle mode without changing focus.
    pub(crate) fn abort_cycling(&mut self) {
        self.cycle = None;
        self.input_mode = transition(self.input_mode, InputMode::Passthrough);
    }

    //* Control channel

    /// Reads and applies all pending control-channel commands.
    pub fn handle_control_commands(&mut self) {
        for command in ctl::drain_commands() {
            handle_err!(self.apply_control(command), self);
        }
    }

    fn apply_control(&mut self, command: CtlCommand) -> Result<()> {
        debug!("control command: {:?}", command);
        match command {
            CtlCommand::Keybind(cmd) => {
                match cmd {
                    KeybindCmd::Enable(id) => self.set_keybind_enabled(&id, |_| true),
                    KeybindCmd::Disable(id) => self.set_keybind_enabled(&id, |_| false),
                    KeybindCmd::Toggle(id) => self.set_keybind_enabled(&id, |on| !on),
                }
                Ok(())
            }
            CtlCommand::Workspace(cmd) => {
                let idx = match cmd {
                    WorkspaceCmd::Switch(target) => self
                        .desktop
                        .lookup(&target)
                        .ok_or(TatamiError::UnknownWorkspace(target))?,
                    WorkspaceCmd::Next => self.desktop.next_idx(),
                    WorkspaceCmd::Prev => self.desktop.prev_idx(),
                };
                self.switch_workspace(idx, true)
            }
            CtlCommand::Tiling(cmd) => match cmd {
                TilingCmd::Enable => self.set_tiling_enabled(true),
                TilingCmd::Disable => self.set_tiling_enabled(false),
                TilingCmd::Toggle => {
                    let on = !self.tiling.enabled;
                    self.set_tiling_enabled(on)
                }
                TilingCmd::GridMode(setting) => self.set_grid_mode(setting),
                TilingCmd::Recalculate => self.retile_all(),
            },
        }
    }

    fn set_keybind_enabled(&mut self, id: &str, op: impl Fn(bool) -> bool) {
        let mut found = false;
        for kb in self.bindings.iter_mut().filter(|k| k.id() == Some(id)) {
            found = true;
            if !kb.toggleable {
                warn!("keybind {} is not toggleable", id);
                continue;
            }
            kb.enabled = op(kb.enabled);
            debug!("keybind {} now enabled={}", id, kb.enabled);
        }
        if !found {
            warn!("no keybind with id {}", id);
        }
    }

    /// Turns the tiling engine on or off.
    pub fn set_tiling_enabled(&mut self, on: bool) -> Result<()> {
        if self.tiling.enabled != on {
            self.tiling.enabled = on;
            if on {
                self.retile_all()?;
            }
            self.refresh_status_files();
        }
        Ok(())
    }

    /// Changes the tiling engine's grid mode.
    pub fn set_grid_mode(&mut self, setting: Toggle) -> Result<()> {
        let mode = setting.apply(self.tiling.grid_mode);
        if self.tiling.grid_mode != mode {
            self.tiling.grid_mode = mode;
            if self.tiling.enabled {
                self.retile_all()?;
            }
            self.refresh_status_files();
        }
        Ok(())
    }

    fn refresh_status_files(&mut self) {
        handle_err!(
            ctl::write_workspace_status(self.desktop.current().name()),
            self
        );
        handle_err!(ctl::write_tiling_status(self.tiling.status()), self);
    }

    //* Private methods

    fn shutdown(&mut self) {
        info!("Shutting down");
        self.cancel_repeat();
        self.cancel_conditions();
        if let Some(mut child) = self.session_child.take() {
            let _ = child.try_wait();
        }
    }

    pub(crate) fn report_error(&mut self, error: TatamiError) {
        (self.ehandler)(error);
    }

    /// Applies a closure to every view matching a filter, in stacking
    /// order, back to front.
    ///
    /// `ViewFilter::Any` walks every workspace; the other filters are
    /// scoped to the current one.
    pub fn for_each_view<F: FnMut(&View)>(&self, filter: ViewFilter, mut f: F) {
        let ws = self.desktop.current_idx();
        let order = match filter {
            ViewFilter::Any => self.desktop.all_stacking(),
            _ => self.desktop.stacking(),
        };
        for id in order {
            if let Some(view) = self.views.lookup(id) {
                if filter.matches(view, ws) {
                    f(view);
                }
            }
        }
    }

    /// Bookkeeping shared by every successful focus change.
    pub(crate) fn note_focused(&mut self, new: Option<ViewId>) {
        if self.focused == new {
            return;
        }
        if let Some(old) = self.focused {
            self.conn
                .set_activated(old, false)
                .unwrap_or_else(|e| debug!("{}", e));
        }
        if let Some(id) = new {
            self.conn
                .set_activated(id, true)
                .unwrap_or_else(|e| debug!("{}", e));
            // per-window keyboard layout memory
            if let Some(view) = self.views.lookup(id) {
                self.conn.set_keyboard_layout(view.layout_index);
            }
        }
        self.focused = new;
    }

    /// The output a freshly placed geometry belongs to.
    fn output_for(&self, geom: Rect) -> Option<OutputId> {
        let center = geom.center();
        if let Some((_, output)) = self.outputs.element_by(|o| o.contains_point(center)) {
            return Some(output.id());
        }
        self.outputs
            .focused()
            .or_else(|| self.outputs.get(0))
            .map(|o| o.id())
    }

    fn output_rect_of(&self, id: ViewId) -> Option<Rect> {
        let output = self.views.lookup(id).and_then(|v| v.output());
        self.outputs
            .element_by(|o| Some(o.id()) == output)
            .map(|(_, o)| o.geometry())
            .or_else(|| self.outputs.get(0).map(|o| o.geometry()))
    }

    fn usable_rect_of(&self, id: ViewId) -> Option<Rect> {
        let output = self.views.lookup(id).and_then(|v| v.output());
        self.outputs
            .element_by(|o| Some(o.id()) == output)
            .map(|(_, o)| o.usable())
            .or_else(|| self.outputs.get(0).map(|o| o.usable()))
    }
}

#[cfg(test)]
mod tests;
