//! Types for parsing and creating key bindings.
//!
//! A [`Keybind`] is an immutable-shape, mutable-state entity: its
//! trigger, actions and filters are fixed at config load, while its
//! enabled state can be flipped at runtime through the control
//! channel. Keybinds are rebuilt wholesale on reconfigure.

use std::cell::RefCell;
use std::str::FromStr;

use strum::*;

use tracing::warn;

use crate::core::types::Direction;
use crate::scene::core::SceneConn;
use crate::scene::input::{keysym, keysym::Keysym, keysym_to_lower, KeyCode, ModKey, ModMask};
use crate::{Result, TatamiError};

/// A workspace referenced by an action or a control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceTarget {
    /// A 1-based workspace index or a workspace name.
    Named(String),
    Next,
    Prev,
}

/// A three-valued setting toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Toggle {
    On,
    Off,
    Toggle,
}

impl Toggle {
    /// Applies this toggle to a boolean state.
    pub fn apply(self, current: bool) -> bool {
        match self {
            Toggle::On => true,
            Toggle::Off => false,
            Toggle::Toggle => !current,
        }
    }
}

/// An action record that a keybind or control command dispatches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Spawn an external command.
    Execute { command: String },
    /// Ask the active view to close.
    Close,
    /// Cycle focus through the current workspace.
    Focus(Direction),
    /// Raise the active view to the front of its workspace.
    Raise,
    /// Lower the active view to the back of its workspace.
    Lower,
    /// Toggle maximization of the active view.
    ToggleMaximize,
    /// Toggle fullscreen on the active view.
    ToggleFullscreen,
    /// Minimize the active view.
    Minimize,
    /// Move the active view in or out of the always-on-top band.
    ToggleAlwaysOnTop,
    /// Move the active view in or out of the always-on-bottom band.
    ToggleAlwaysOnBottom,
    /// Switch to a workspace.
    GoToWorkspace(WorkspaceTarget),
    /// Send the active view to a workspace.
    SendToWorkspace(WorkspaceTarget),
    /// Turn the tiling engine on.
    EnableTiling,
    /// Turn the tiling engine off.
    DisableTiling,
    /// Flip the tiling engine.
    ToggleTiling,
    /// Change grid mode of the tiling engine.
    TilingGridMode(Toggle),
    /// Recompute the tiled layout on every output.
    RetileAll,
    /// Reload runtime state from the configuration.
    Reconfigure,
    /// Shut the compositor down.
    Exit,
}

/// The kind of an [`Action`], without its payload.
///
/// Clients can declare kinds of actions they inhibit while focused;
/// a keybind whose actions include an inhibited kind is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Execute,
    Close,
    Focus,
    Raise,
    Lower,
    ToggleMaximize,
    ToggleFullscreen,
    Minimize,
    ToggleAlwaysOnTop,
    ToggleAlwaysOnBottom,
    GoToWorkspace,
    SendToWorkspace,
    EnableTiling,
    DisableTiling,
    ToggleTiling,
    TilingGridMode,
    RetileAll,
    Reconfigure,
    Exit,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        use Action::*;
        match self {
            Execute { .. } => ActionKind::Execute,
            Close => ActionKind::Close,
            Focus(_) => ActionKind::Focus,
            Raise => ActionKind::Raise,
            Lower => ActionKind::Lower,
            ToggleMaximize => ActionKind::ToggleMaximize,
            ToggleFullscreen => ActionKind::ToggleFullscreen,
            Minimize => ActionKind::Minimize,
            ToggleAlwaysOnTop => ActionKind::ToggleAlwaysOnTop,
            ToggleAlwaysOnBottom => ActionKind::ToggleAlwaysOnBottom,
            GoToWorkspace(_) => ActionKind::GoToWorkspace,
            SendToWorkspace(_) => ActionKind::SendToWorkspace,
            EnableTiling => ActionKind::EnableTiling,
            DisableTiling => ActionKind::DisableTiling,
            ToggleTiling => ActionKind::ToggleTiling,
            TilingGridMode(_) => ActionKind::TilingGridMode,
            RetileAll => ActionKind::RetileAll,
            Reconfigure => ActionKind::Reconfigure,
            Exit => ActionKind::Exit,
        }
    }
}

/// A shell command whose trimmed stdout gates whether a keybind's
/// actions run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// The command, run through `sh -c`.
    pub command: String,
    /// Accepted stdout values after trimming. An empty set accepts
    /// any non-empty output.
    pub values: Vec<String>,
}

impl Condition {
    /// Tests trimmed command output against the accepted values.
    pub fn matches(&self, output: &str) -> bool {
        let trimmed = output.trim_end_matches(|c: char| c.is_whitespace());
        if self.values.is_empty() {
            !trimmed.is_empty()
        } else {
            self.values.iter().any(|v| v == trimmed)
        }
    }
}

/// The trigger half of a keybind: a set of keysyms, or a set of raw
/// keycodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyTrigger {
    /// Keysyms, matched case-insensitively; the keycodes producing
    /// them are resolved lazily against the active keymap layout.
    Keysyms(Vec<Keysym>),
    /// Raw keycodes, matched directly.
    Keycodes(Vec<KeyCode>),
}

/// Representation of a keybind that can be run by tatamiwm.
#[derive(Debug, Clone)]
pub struct Keybind {
    pub(crate) mods: ModMask,
    pub(crate) trigger: KeyTrigger,
    pub(crate) on_release: bool,
    pub(crate) allow_when_locked: bool,
    pub(crate) enabled: bool,
    pub(crate) toggleable: bool,
    pub(crate) id: Option<String>,
    blacklist: Vec<String>,
    whitelist: Vec<String>,
    pub(crate) actions: Vec<Action>,
    pub(crate) condition: Option<Condition>,
    resolved: RefCell<Option<Vec<KeyCode>>>,
}

impl Keybind {
    /// Creates an enabled keybind with the given trigger and actions.
    pub fn new<M: Into<ModMask>>(mods: M, trigger: KeyTrigger, actions: Vec<Action>) -> Self {
        let trigger = match trigger {
            KeyTrigger::Keysyms(syms) => {
                KeyTrigger::Keysyms(syms.into_iter().map(keysym_to_lower).collect())
            }
            t => t,
        };
        Self {
            mods: mods.into(),
            trigger,
            on_release: false,
            allow_when_locked: false,
            enabled: true,
            toggleable: false,
            id: None,
            blacklist: Vec::new(),
            whitelist: Vec::new(),
            actions,
            condition: None,
            resolved: RefCell::new(None),
        }
    }

    /// Builds a keybind from its configuration-level description.
    pub fn from_spec(spec: &KeybindSpec) -> Result<Keybind> {
        let trigger = if !spec.keycodes.is_empty() {
            KeyTrigger::Keycodes(spec.keycodes.clone())
        } else if let Some(combo) = &spec.combo {
            let (mods, sym) = parse_combo(combo)?;
            let mut kb = Keybind::new(mods, KeyTrigger::Keysyms(vec![sym]), spec.actions.clone());
            kb.on_release = spec.on_release;
            kb.allow_when_locked = spec.allow_when_locked;
            kb.enabled = spec.enabled;
            kb.toggleable = spec.toggleable;
            kb.id = spec.id.clone();
            kb.blacklist = lowered(&spec.blacklist);
            kb.whitelist = lowered(&spec.whitelist);
            kb.condition = spec.condition.clone();
            return Ok(kb);
        } else {
            return Err(TatamiError::Config(
                "keybind has neither a key combo nor keycodes".into(),
            ));
        };

        let mods = parse_mods(&spec.modifiers)?;
        let mut kb = Keybind::new(mods, trigger, spec.actions.clone());
        kb.on_release = spec.on_release;
        kb.allow_when_locked = spec.allow_when_locked;
        kb.enabled = spec.enabled;
        kb.toggleable = spec.toggleable;
        kb.id = spec.id.clone();
        kb.blacklist = lowered(&spec.blacklist);
        kb.whitelist = lowered(&spec.whitelist);
        kb.condition = spec.condition.clone();
        Ok(kb)
    }

    #[inline(always)]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Strict modifier match.
    #[inline(always)]
    pub fn matches_mods(&self, mods: ModMask) -> bool {
        (mods ^ self.mods).is_empty()
    }

    /// Tests whether events from the given device may trigger this
    /// keybind. Names are compared case-insensitively; an empty
    /// whitelist allows all devices.
    pub fn device_allowed(&self, device: &str) -> bool {
        let name = device.to_ascii_lowercase();
        if self.blacklist.iter().any(|d| *d == name) {
            return false;
        }
        self.whitelist.is_empty() || self.whitelist.iter().any(|d| *d == name)
    }

    /// Tests a raw keycode against the trigger, resolving keysym
    /// triggers lazily against the active keymap layout.
    pub fn matches_keycode<C: SceneConn>(&self, conn: &C, code: KeyCode) -> bool {
        match &self.trigger {
            KeyTrigger::Keycodes(codes) => codes.contains(&code),
            KeyTrigger::Keysyms(syms) => {
                let mut resolved = self.resolved.borrow_mut();
                if resolved.is_none() {
                    let codes = syms
                        .iter()
                        .flat_map(|s| conn.keycodes_for_keysym(*s))
                        .collect();
                    *resolved = Some(codes);
                }
                resolved.as_ref().unwrap().contains(&code)
            }
        }
    }

    /// Tests a keysym against the trigger, case-insensitively.
    pub fn matches_keysym(&self, sym: Keysym) -> bool {
        match &self.trigger {
            KeyTrigger::Keysyms(syms) => syms.contains(&keysym_to_lower(sym)),
            KeyTrigger::Keycodes(_) => false,
        }
    }

    /// Drops the cached keycode resolution, forcing a fresh lookup on
    /// the next match. Called when the keymap layout changes.
    pub fn invalidate_resolved(&self) {
        *self.resolved.borrow_mut() = None;
    }

    /// The kinds of this keybind's actions.
    pub fn action_kinds(&self) -> impl Iterator<Item = ActionKind> + '_ {
        self.actions.iter().map(Action::kind)
    }
}

fn lowered(names: &[String]) -> Vec<String> {
    names.iter().map(|n| n.to_ascii_lowercase()).collect()
}

/// A configuration-level description of a keybind, as handed over by
/// the config layer.
#[derive(Debug, Clone, Default)]
pub struct KeybindSpec {
    /// A textual key combination, e.g. `"M-S-Tab"`.
    pub combo: Option<String>,
    /// Modifier names used together with raw `keycodes`.
    pub modifiers: Vec<String>,
    /// Raw keycodes triggering the bind, if no combo is given.
    pub keycodes: Vec<KeyCode>,
    pub on_release: bool,
    pub allow_when_locked: bool,
    pub enabled: bool,
    pub toggleable: bool,
    pub id: Option<String>,
    pub blacklist: Vec<String>,
    pub whitelist: Vec<String>,
    pub actions: Vec<Action>,
    pub condition: Option<Condition>,
}

impl KeybindSpec {
    /// Creates an always-enabled spec from a combo and actions.
    pub fn new<S: Into<String>>(combo: S, actions: Vec<Action>) -> Self {
        Self {
            combo: Some(combo.into()),
            enabled: true,
            ..Default::default()
        }
        .with_actions(actions)
    }

    fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }
}

/// Parses a string as a key combination.
///
/// Follows the format "mod-key":
///
/// Ctrl = C,
/// Shift = S,
/// Alt = A,
/// Meta = M.
pub fn parse_combo(combo: &str) -> Result<(ModMask, Keysym)> {
    let mut modifiers: Vec<ModKey> = Vec::new();
    let mut sym = None;
    for token in combo.split('-') {
        match token {
            "C" => {
                modifiers.push(ModKey::Ctrl);
            }
            "S" => {
                modifiers.push(ModKey::Shift);
            }
            "A" => {
                modifiers.push(ModKey::Alt);
            }
            "M" => {
                modifiers.push(ModKey::Logo);
            }
            n => {
                sym = keysym_from_name(n);
                if sym.is_none() {
                    warn!("unknown keysym `{}` in combo `{}`", n, combo);
                }
            }
        }
    }

    if let Some(sym) = sym {
        Ok((modifiers.into(), keysym_to_lower(sym)))
    } else {
        Err(TatamiError::Config(format!(
            "could not parse key combo \"{}\"",
            combo
        )))
    }
}

fn parse_mods(names: &[String]) -> Result<ModMask> {
    let mut mask = ModMask::empty();
    for name in names {
        match name.to_ascii_lowercase().as_str() {
            "ctrl" | "control" | "c" => mask |= ModMask::CTRL,
            "shift" | "s" => mask |= ModMask::SHIFT,
            "alt" | "a" => mask |= ModMask::ALT,
            "meta" | "super" | "logo" | "m" | "w" => mask |= ModMask::LOGO,
            other => {
                return Err(TatamiError::Config(format!(
                    "unknown modifier name \"{}\"",
                    other
                )))
            }
        }
    }
    Ok(mask)
}

/// Looks up a keysym by its textual name.
///
/// Single printable characters map onto their Latin-1 keysym; a
/// table covers the named keys a combo specification can use.
pub fn keysym_from_name(name: &str) -> Option<Keysym> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        let cp = c.to_ascii_lowercase() as u32;
        if (0x20..=0x7e).contains(&cp) || (0xa0..=0xff).contains(&cp) {
            return Some(cp);
        }
    }

    if let Some(n) = name.strip_prefix('F').and_then(|s| s.parse::<u32>().ok()) {
        if (1..=12).contains(&n) {
            return Some(keysym::XK_F1 + n - 1);
        }
    }

    let sym = match name {
        "Return" => keysym::XK_Return,
        "Escape" => keysym::XK_Escape,
        "space" => keysym::XK_space,
        "Tab" => keysym::XK_Tab,
        "BackSpace" => keysym::XK_BackSpace,
        "Delete" => keysym::XK_Delete,
        "Up" => keysym::XK_Up,
        "Down" => keysym::XK_Down,
        "Left" => keysym::XK_Left,
        "Right" => keysym::XK_Right,
        "Home" => keysym::XK_Home,
        "End" => keysym::XK_End,
        "Prior" => keysym::XK_Prior,
        "Next" => keysym::XK_Next,
        "Print" => keysym::XK_Print,
        "XF86AudioRaiseVolume" => keysym::XF86XK_AudioRaiseVolume,
        "XF86AudioLowerVolume" => keysym::XF86XK_AudioLowerVolume,
        "XF86AudioMute" => keysym::XF86XK_AudioMute,
        "XF86MonBrightnessUp" => keysym::XF86XK_MonBrightnessUp,
        "XF86MonBrightnessDown" => keysym::XF86XK_MonBrightnessDown,
        _ => return None,
    };
    Some(sym)
}

impl FromStr for WorkspaceTarget {
    type Err = TatamiError;

    fn from_str(s: &str) -> Result<WorkspaceTarget> {
        match s {
            "next" => Ok(WorkspaceTarget::Next),
            "prev" => Ok(WorkspaceTarget::Prev),
            "" => Err(TatamiError::UnknownWorkspace(String::new())),
            name => Ok(WorkspaceTarget::Named(name.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_combo() {
        let (mods, sym) = parse_combo("M-S-Down").unwrap();
        assert_eq!(mods, ModMask::LOGO | ModMask::SHIFT);
        assert_eq!(sym, keysym::XK_Down);

        let (mods, sym) = parse_combo("A-a").unwrap();
        assert_eq!(mods, ModMask::ALT);
        assert_eq!(sym, keysym::XK_a);

        // uppercase letters fold to their lowercase keysym
        let (_, sym) = parse_combo("C-X").unwrap();
        assert_eq!(sym, keysym::XK_x);

        assert!(parse_combo("M-NoSuchKey").is_err());
    }

    #[test]
    fn device_filters() {
        let mut spec = KeybindSpec::new("M-t", vec![Action::ToggleTiling]);
        spec.blacklist = vec!["Virtual Keyboard".into()];
        let kb = Keybind::from_spec(&spec).unwrap();

        assert!(!kb.device_allowed("virtual keyboard"));
        assert!(kb.device_allowed("AT Translated Set 2 keyboard"));

        let mut spec = KeybindSpec::new("M-t", vec![Action::ToggleTiling]);
        spec.whitelist = vec!["usb keyboard".into()];
        let kb = Keybind::from_spec(&spec).unwrap();

        assert!(kb.device_allowed("USB Keyboard"));
        assert!(!kb.device_allowed("AT Translated Set 2 keyboard"));
    }

    #[test]
    fn lazy_keycode_resolution() {
        use crate::scene::headless::HeadlessConn;

        let conn = HeadlessConn::new();
        conn.map_keysym(keysym::XK_t, vec![28]);

        let kb = Keybind::new(
            ModMask::LOGO,
            KeyTrigger::Keysyms(vec![keysym::XK_t]),
            vec![Action::ToggleTiling],
        );
        assert!(kb.matches_keycode(&conn, 28));
        assert!(!kb.matches_keycode(&conn, 29));

        // after a layout change the cache is rebuilt
        conn.map_keysym(keysym::XK_t, vec![40]);
        assert!(kb.matches_keycode(&conn, 28));
        kb.invalidate_resolved();
        assert!(kb.matches_keycode(&conn, 40));
    }

    #[test]
    fn condition_value_matching() {
        let cond = Condition {
            command: "echo on".into(),
            values: vec!["on".into()],
        };
        assert!(cond.matches("on\n"));
        assert!(!cond.matches("off\n"));

        let any = Condition {
            command: "true".into(),
            values: vec![],
        };
        assert!(any.matches("whatever\n"));
        assert!(!any.matches("\n"));
    }
}
