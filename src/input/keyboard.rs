//! The keyboard engine: keybind resolution, key repeat, cycle-mode
//! routing, and asynchronous condition gating.
//!
//! All state lives in [`KeyboardState`] on the server. Handlers are
//! total: they log and return instead of propagating panics into the
//! event loop.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::rc::Rc;
use std::time::Duration;

use calloop::generic::Generic;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{Interest, Mode, PostAction, RegistrationToken};

use custom_debug_derive::Debug;

use tracing::{debug, trace, warn};

use crate::bindings::{Action, Condition, Keybind};
use crate::core::types::Direction;
use crate::input::InputMode;
use crate::manager::Server;
use crate::scene::core::SceneConn;
use crate::scene::event::{KeyEvent, ModifiersEvent};
use crate::scene::input::{is_modifier, keysym, vt_switch, KeyCode, MenuKey};
use crate::{Result, TatamiError};

/// How long a condition command may run before it is aborted.
pub const CONDITION_TIMEOUT: Duration = Duration::from_millis(2000);

/// Mutable keyboard-engine state owned by the server.
#[derive(Debug, Default)]
pub struct KeyboardState {
    /// Keycodes whose press was consumed; their release is absorbed.
    pub(crate) bound: HashSet<KeyCode>,
    /// Held keybinds that fire on release, by keycode.
    pub(crate) on_release: HashMap<KeyCode, usize>,
    /// The running key-repeat timer, if any.
    #[debug(skip)]
    pub(crate) repeat_token: Option<RegistrationToken>,
    pub(crate) repeat_bind: Option<usize>,
    /// Condition checks currently in flight.
    pub(crate) conditions: Vec<Rc<RefCell<ConditionCtx>>>,
}

/// State shared between a condition command's pipe source and its
/// timeout timer.
///
/// Cleanup runs exactly once; whichever side fires first flips
/// `done` and the other side becomes a no-op.
#[derive(Debug)]
pub(crate) struct ConditionCtx {
    pub(crate) actions: Vec<Action>,
    pub(crate) condition: Condition,
    pub(crate) event: KeyEvent,
    pub(crate) pressed: bool,
    pub(crate) buf: Vec<u8>,
    #[debug(skip)]
    pub(crate) child: Option<Child>,
    #[debug(skip)]
    pub(crate) fd_token: Option<RegistrationToken>,
    #[debug(skip)]
    pub(crate) timer_token: Option<RegistrationToken>,
    pub(crate) done: bool,
}

impl<C: SceneConn + 'static> Server<C> {
    /// Handles a key press from a seat keyboard.
    pub fn handle_key_press(&mut self, ev: KeyEvent) -> Result<()> {
        trace!("key press: code {} mods {:?}", ev.keycode, ev.mods);
        self.cancel_repeat();

        // VT switches always fire and take the privileged path.
        if let Some(vt) = ev
            .translated
            .iter()
            .chain(ev.raw.iter())
            .find_map(|s| vt_switch(*s))
        {
            debug!("switching to VT {}", vt);
            self.conn.switch_vt(vt)?;
            return Ok(());
        }

        match self.input_mode {
            InputMode::Menu => {
                for sym in &ev.translated {
                    if let Some(key) = MenuKey::from_keysym(*sym) {
                        self.conn.notify_menu_key(key);
                        break;
                    }
                }
                self.keyboard.bound.insert(ev.keycode);
                return Ok(());
            }
            InputMode::Cycle => {
                self.handle_cycle_key(&ev);
                return Ok(());
            }
            _ => {}
        }

        if let Some(idx) = self.resolve_keybind(&ev) {
            self.keyboard.bound.insert(ev.keycode);

            let bind = &self.bindings[idx];
            if bind.on_release {
                self.keyboard.on_release.insert(ev.keycode, idx);
                return Ok(());
            }
            if bind.condition.is_some() {
                // repeat is never started for condition-gated binds
                return self.spawn_condition(idx, ev, true);
            }

            let actions = bind.actions.clone();
            self.maybe_start_repeat(idx, &ev);
            return self.dispatch_actions(actions);
        }

        self.keyboard.bound.remove(&ev.keycode);
        self.conn.forward_key(&ev, true);
        Ok(())
    }

    /// Handles a key release from a seat keyboard.
    pub fn handle_key_release(&mut self, ev: KeyEvent) -> Result<()> {
        trace!("key release: code {}", ev.keycode);
        self.cancel_repeat();

        if let Some(idx) = self.keyboard.on_release.remove(&ev.keycode) {
            self.keyboard.bound.remove(&ev.keycode);
            let bind = &self.bindings[idx];
            if bind.condition.is_some() {
                return self.spawn_condition(idx, ev, false);
            }
            let actions = bind.actions.clone();
            return self.dispatch_actions(actions);
        }

        if self.keyboard.bound.remove(&ev.keycode) {
            return Ok(());
        }

        if self.input_mode == InputMode::Cycle {
            let pending = self
                .cycle
                .as_ref()
                .map(|c| c.cancel_on_next_release)
                .unwrap_or(false);
            if pending {
                self.finish_cycling();
                return Ok(());
            }
        }

        self.conn.forward_key(&ev, false);
        Ok(())
    }

    /// Handles a modifier-only change from a seat keyboard.
    pub fn handle_modifiers(&mut self, ev: ModifiersEvent) {
        if self.input_mode == InputMode::Cycle && ev.mods.is_empty() {
            if self.keyboard.bound.is_empty() {
                self.finish_cycling();
            } else if let Some(cycle) = self.cycle.as_mut() {
                // keys still held; finishing now would leave the
                // client with a stuck key after the switch
                cycle.cancel_on_next_release = true;
            }
        }

        // virtual keyboards would overwrite the group modifier on
        // every unfocused client, so they are not broadcast
        self.conn.forward_modifiers(ev.mods, !ev.virtual_device);
    }

    /// Resolves a keybind for a physical press.
    ///
    /// Precedence: keycode match (non-virtual devices only), then
    /// translated keysyms, then raw keysyms.
    pub(crate) fn resolve_keybind(&self, ev: &KeyEvent) -> Option<usize> {
        let locked = self.conn.session_locked();
        let inhibited = self
            .focused
            .and_then(|id| self.views.lookup(id))
            .map(|v| v.inhibited.clone())
            .unwrap_or_default();

        let eligible = |kb: &Keybind| {
            kb.enabled
                && kb.matches_mods(ev.mods)
                && kb.device_allowed(&ev.device)
                && (!locked || kb.allow_when_locked)
                && !kb.action_kinds().any(|k| inhibited.contains(&k))
        };

        if !ev.virtual_device {
            for (i, kb) in self.bindings.iter().enumerate() {
                if eligible(kb) && kb.matches_keycode(&self.conn, ev.keycode) {
                    return Some(i);
                }
            }
        }

        for sym in &ev.translated {
            for (i, kb) in self.bindings.iter().enumerate() {
                if eligible(kb) && kb.matches_keysym(*sym) {
                    return Some(i);
                }
            }
        }

        for sym in &ev.raw {
            for (i, kb) in self.bindings.iter().enumerate() {
                if eligible(kb) && kb.matches_keysym(*sym) {
                    return Some(i);
                }
            }
        }

        None
    }

    fn handle_cycle_key(&mut self, ev: &KeyEvent) {
        let Some(sym) = ev.translated.first().copied() else {
            return;
        };
        if is_modifier(sym) {
            return;
        }
        self.keyboard.bound.insert(ev.keycode);
        match sym {
            keysym::XK_Escape => self.abort_cycling(),
            keysym::XK_Up | keysym::XK_Left => self.cycle_step(Direction::Backward),
            keysym::XK_Down | keysym::XK_Right => self.cycle_step(Direction::Forward),
            _ => {}
        }
    }

    //* Key repeat

    fn maybe_start_repeat(&mut self, idx: usize, ev: &KeyEvent) {
        let (rate, delay) = self.conn.repeat_info();
        if rate <= 0 || delay <= 0 {
            return;
        }
        if ev
            .translated
            .iter()
            .chain(ev.raw.iter())
            .any(|s| is_modifier(*s))
        {
            return;
        }

        let interval = Duration::from_millis(1000 / rate as u64);
        let timer = Timer::from_duration(Duration::from_millis(delay as u64));
        match self.loop_handle.insert_source(timer, move |_, _, server| {
            server.repeat_fire();
            TimeoutAction::ToDuration(interval)
        }) {
            Ok(token) => {
                self.keyboard.repeat_token = Some(token);
                self.keyboard.repeat_bind = Some(idx);
            }
            Err(_) => warn!("could not register key repeat timer"),
        }
    }

    fn repeat_fire(&mut self) {
        let Some(idx) = self.keyboard.repeat_bind else {
            return;
        };
        let Some(bind) = self.bindings.get(idx) else {
            self.cancel_repeat();
            return;
        };
        if !bind.enabled {
            self.cancel_repeat();
            return;
        }
        let actions = bind.actions.clone();
        if let Err(e) = self.dispatch_actions(actions) {
            self.report_error(e);
        }
    }

    /// Cancels any running key-repeat timer.
    pub(crate) fn cancel_repeat(&mut self) {
        if let Some(token) = self.keyboard.repeat_token.take() {
            self.loop_handle.remove(token);
        }
        self.keyboard.repeat_bind = None;
    }

    //* Condition gating

    /// Spawns a keybind's condition command and registers its pipe
    /// and timeout on the event loop.
    ///
    /// The press is already marked bound, so the matching release is
    /// absorbed whatever the condition decides.
    fn spawn_condition(&mut self, idx: usize, ev: KeyEvent, pressed: bool) -> Result<()> {
        let bind = &self.bindings[idx];
        let condition = match bind.condition.clone() {
            Some(c) => c,
            None => return Ok(()),
        };
        let actions = bind.actions.clone();

        debug!("running condition command `{}`", condition.command);
        let spawned = Command::new("sh")
            .arg("-c")
            .arg(&condition.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                // treat as condition false: the key goes to the client
                self.keyboard.bound.remove(&ev.keycode);
                self.conn.forward_key(&ev, pressed);
                return Err(TatamiError::SpawnProc(e.to_string()));
            }
        };
        let stdout = match child.stdout.take() {
            Some(out) => out,
            None => {
                self.keyboard.bound.remove(&ev.keycode);
                self.conn.forward_key(&ev, pressed);
                return Err(TatamiError::SpawnProc("no stdout pipe".into()));
            }
        };

        let ctx = Rc::new(RefCell::new(ConditionCtx {
            actions,
            condition,
            event: ev,
            pressed,
            buf: Vec::new(),
            child: Some(child),
            fd_token: None,
            timer_token: None,
            done: false,
        }));

        let fd_ctx = Rc::clone(&ctx);
        let fd_token = self
            .loop_handle
            .insert_source(
                Generic::new(stdout, Interest::READ, Mode::Level),
                move |_, file, server: &mut Server<C>| {
                    let mut buf = [0u8; 1024];
                    match unsafe { file.get_mut() }.read(&mut buf) {
                        Ok(0) => {
                            server.finish_condition(&fd_ctx);
                            Ok(PostAction::Remove)
                        }
                        Ok(n) => {
                            fd_ctx.borrow_mut().buf.extend_from_slice(&buf[..n]);
                            Ok(PostAction::Continue)
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            Ok(PostAction::Continue)
                        }
                        Err(_) => {
                            server.finish_condition(&fd_ctx);
                            Ok(PostAction::Remove)
                        }
                    }
                },
            )
            .map_err(|_| TatamiError::OtherError("could not register condition pipe".into()))?;

        let timer_ctx = Rc::clone(&ctx);
        let timer_token = self
            .loop_handle
            .insert_source(
                Timer::from_duration(CONDITION_TIMEOUT),
                move |_, _, server: &mut Server<C>| {
                    server.abort_condition(&timer_ctx);
                    TimeoutAction::Drop
                },
            )
            .map_err(|_| TatamiError::OtherError("could not register condition timeout".into()))?;

        {
            let mut c = ctx.borrow_mut();
            c.fd_token = Some(fd_token);
            c.timer_token = Some(timer_token);
        }
        self.keyboard.conditions.push(ctx);
        Ok(())
    }

    /// Completes a condition check after its command hit EOF.
    pub(crate) fn finish_condition(&mut self, ctx: &Rc<RefCell<ConditionCtx>>) {
        let (actions, event, pressed, matched) = {
            let mut c = ctx.borrow_mut();
            if c.done {
                return;
            }
            c.done = true;
            if let Some(token) = c.timer_token.take() {
                self.loop_handle.remove(token);
            }
            if let Some(mut child) = c.child.take() {
                let _ = child.try_wait();
            }
            let output = String::from_utf8_lossy(&c.buf).into_owned();
            let matched = c.condition.matches(&output);
            debug!(
                "condition `{}` output {:?}: {}",
                c.condition.command,
                output.trim_end(),
                if matched { "matched" } else { "no match" }
            );
            (c.actions.clone(), c.event.clone(), c.pressed, matched)
        };
        self.keyboard.conditions.retain(|o| !Rc::ptr_eq(o, ctx));

        if matched {
            if let Err(e) = self.dispatch_actions(actions) {
                self.report_error(e);
            }
        } else {
            // re-inject the original event with its original timestamp
            self.keyboard.bound.remove(&event.keycode);
            self.conn.forward_key(&event, pressed);
        }
    }

    /// Aborts a condition check whose timeout fired.
    ///
    /// The keybind is dropped for this event; the original press is
    /// not forwarded, preserving the already-absorbed release.
    pub(crate) fn abort_condition(&mut self, ctx: &Rc<RefCell<ConditionCtx>>) {
        let command = {
            let mut c = ctx.borrow_mut();
            if c.done {
                return;
            }
            c.done = true;
            if let Some(token) = c.fd_token.take() {
                self.loop_handle.remove(token);
            }
            if let Some(mut child) = c.child.take() {
                let _ = child.kill();
                let _ = child.try_wait();
            }
            c.condition.command.clone()
        };
        self.keyboard.conditions.retain(|o| !Rc::ptr_eq(o, ctx));
        self.report_error(TatamiError::ConditionTimeout(command));
    }

    /// Drops every in-flight condition check and its loop sources.
    pub(crate) fn cancel_conditions(&mut self) {
        let pending = std::mem::take(&mut self.keyboard.conditions);
        for ctx in pending {
            let mut c = ctx.borrow_mut();
            if c.done {
                continue;
            }
            c.done = true;
            if let Some(token) = c.fd_token.take() {
                self.loop_handle.remove(token);
            }
            if let Some(token) = c.timer_token.take() {
                self.loop_handle.remove(token);
            }
            if let Some(mut child) = c.child.take() {
                let _ = child.kill();
                let _ = child.try_wait();
            }
        }
    }
}
