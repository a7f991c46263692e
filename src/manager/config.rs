//! The central configuration object for the compositor core.
//!
//! Config parsing itself lives outside the core; this is the
//! already-parsed value the core consumes. On reconfigure the whole
//! value is replaced atomically and runtime state is rebuilt from it.

use crate::bindings::KeybindSpec;
use crate::core::view::{FocusPolicy, TileDirection, WindowRules};

#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace names, in order. At least one.
    pub workspaces: Vec<String>,
    /// Gap between tiled views and around the usable area, in pixels.
    pub gap: i32,
    /// Keybind descriptions, turned into live keybinds at load.
    pub keybinds: Vec<KeybindSpec>,
    /// Whether the tiling engine starts enabled.
    pub tiling_enabled: bool,
    /// Whether the tiling engine starts in grid mode.
    pub tiling_grid_mode: bool,
    /// Per-application window rules.
    pub window_rules: Vec<WindowRuleSpec>,
}

/// A window rule keyed on the client's application id.
#[derive(Debug, Clone, Default)]
pub struct WindowRuleSpec {
    pub app_id: String,
    pub fixed_position: bool,
    pub no_tile: bool,
    pub tile_direction: Option<TileDirection>,
    pub focus_policy: Option<FocusPolicy>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            workspaces: vec!["1".into(), "2".into(), "3".into(), "4".into()],
            gap: 10,
            keybinds: Vec::new(),
            tiling_enabled: false,
            tiling_grid_mode: false,
            window_rules: Vec::new(),
        }
    }
}

impl Config {
    /// The window rules applying to a given application id.
    pub fn rules_for(&self, app_id: &str) -> WindowRules {
        for rule in &self.window_rules {
            if rule.app_id == app_id {
                return WindowRules {
                    fixed_position: rule.fixed_position,
                    no_tile: rule.no_tile,
                    tile_direction: rule.tile_direction,
                };
            }
        }
        WindowRules::default()
    }

    /// The focus policy a rule assigns to an application id, if any.
    pub fn focus_policy_for(&self, app_id: &str) -> Option<FocusPolicy> {
        self.window_rules
            .iter()
            .find(|r| r.app_id == app_id)
            .and_then(|r| r.focus_policy)
    }
}

//todo: add validation, builder, etc
