//! This module exports `Desktop`, the stacking model handled directly
//! by the `Server`.
//!
//! A `Desktop` encapsulates the fixed set of workspaces plus the two
//! global bands (always-on-top and always-on-bottom) that are visible
//! on every workspace. It owns all stacking order; the views
//! themselves live in the server's `ViewRing`.

use tracing::{debug, warn};

use crate::core::ring::Ring;
use crate::core::view::{ViewRing, ViewId, WorkspaceBinding};
use crate::core::workspace::Workspace;
use crate::scene::core::SceneConn;
use crate::Result;

#[derive(Debug, Clone)]
pub struct Desktop {
    pub(crate) workspaces: Ring<Workspace>,
    pub(crate) top: Vec<ViewId>,
    pub(crate) bottom: Vec<ViewId>,
    current: usize,
}

impl Desktop {
    /// Creates a desktop with the given workspace names.
    ///
    /// There is always at least one workspace; an empty name list
    /// yields a single workspace called "1".
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut workspaces: Ring<Workspace> = names
            .into_iter()
            .map(|n| Workspace::new(n.as_ref()))
            .collect();
        if workspaces.is_empty() {
            workspaces.append(Workspace::new("1"));
        }
        workspaces.set_focused(0);

        Self {
            workspaces,
            top: Vec::new(),
            bottom: Vec::new(),
            current: 0,
        }
    }

    /// The number of workspaces.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    /// Returns a reference to the current workspace.
    pub fn current(&self) -> &Workspace {
        &self.workspaces[self.current]
    }

    /// Returns a mutable reference to the current workspace.
    pub fn current_mut(&mut self) -> &mut Workspace {
        &mut self.workspaces[self.current]
    }

    #[inline(always)]
    pub fn current_idx(&self) -> usize {
        self.current
    }

    /// The index of the workspace after the current one, wrapping.
    pub fn next_idx(&self) -> usize {
        (self.current + 1) % self.workspaces.len()
    }

    /// The index of the workspace before the current one, wrapping.
    pub fn prev_idx(&self) -> usize {
        (self.current + self.workspaces.len() - 1) % self.workspaces.len()
    }

    /// Get a reference to a workspace by its index.
    pub fn get(&self, idx: usize) -> Option<&Workspace> {
        self.workspaces.get(idx)
    }

    /// Get a mutable reference to a workspace by index.
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Workspace> {
        self.workspaces.get_mut(idx)
    }

    /// Resolves a workspace from a 1-based index or a name.
    ///
    /// All-digit arguments are tried as indices first; otherwise an
    /// exact name match wins over a case-insensitive one.
    pub fn lookup(&self, name_or_index: &str) -> Option<usize> {
        if let Ok(n) = name_or_index.parse::<usize>() {
            if n >= 1 && n <= self.workspaces.len() {
                return Some(n - 1);
            }
        }
        if let Some((i, _)) = self.workspaces.element_by(|ws| ws.name == name_or_index) {
            return Some(i);
        }
        self.workspaces
            .element_by(|ws| ws.name.eq_ignore_ascii_case(name_or_index))
            .map(|(i, _)| i)
    }

    /// Test whether a view is tracked anywhere on the desktop.
    pub fn is_managing(&self, id: ViewId) -> bool {
        self.top.contains(&id)
            || self.bottom.contains(&id)
            || self.workspaces.iter().any(|ws| ws.contains(id))
    }

    /// The workspace index holding the given view, if it is not in a band.
    pub fn workspace_of(&self, id: ViewId) -> Option<usize> {
        self.workspaces
            .element_by(|ws| ws.contains(id))
            .map(|(i, _)| i)
    }

    /// Inserts a view at the front of the stack for its binding.
    pub fn add_view(&mut self, id: ViewId, binding: WorkspaceBinding) {
        match binding {
            WorkspaceBinding::Workspace(idx) => {
                if let Some(ws) = self.workspaces.get_mut(idx) {
                    ws.add(id);
                } else {
                    warn!("add_view: no workspace with index {}", idx);
                    self.current_mut().add(id);
                }
            }
            WorkspaceBinding::AlwaysOnTop => self.top.push(id),
            WorkspaceBinding::AlwaysOnBottom => self.bottom.push(id),
        }
    }

    /// Removes a view from wherever it is stacked.
    pub fn remove_view(&mut self, id: ViewId) -> bool {
        self.top.retain(|v| *v != id);
        self.bottom.retain(|v| *v != id);
        let mut removed = false;
        for ws in self.workspaces.iter_mut() {
            removed |= ws.remove(id);
        }
        removed
    }

    /// The full stacking order visible on the given workspace,
    /// back to front: bottom band, workspace views, top band.
    pub fn stacking_of(&self, ws: usize) -> Vec<ViewId> {
        let mut order = self.bottom.clone();
        if let Some(ws) = self.workspaces.get(ws) {
            order.extend_from_slice(ws.stacking());
        }
        order.extend_from_slice(&self.top);
        order
    }

    /// The stacking order of the current workspace.
    pub fn stacking(&self) -> Vec<ViewId> {
        self.stacking_of(self.current)
    }

    /// Every managed view: bottom band, each workspace in index
    /// order, top band.
    pub fn all_stacking(&self) -> Vec<ViewId> {
        let mut order = self.bottom.clone();
        for ws in self.workspaces.iter() {
            order.extend_from_slice(ws.stacking());
        }
        order.extend_from_slice(&self.top);
        order
    }

    /// Raises a view (and its modal dialogs) within its stacking layer.
    pub fn move_to_front(&mut self, id: ViewId, views: &ViewRing) {
        if let Some(i) = self.top.iter().position(|v| *v == id) {
            let v = self.top.remove(i);
            self.top.push(v);
        } else if let Some(i) = self.bottom.iter().position(|v| *v == id) {
            let v = self.bottom.remove(i);
            self.bottom.push(v);
        } else if let Some(ws) = self.workspace_of(id) {
            self.workspaces[ws].move_to_front(id, views);
        } else {
            warn!("move_to_front: view {} not managed", id);
        }
    }

    /// Lowers a view (and its modal dialogs) within its stacking layer.
    pub fn move_to_back(&mut self, id: ViewId, views: &ViewRing) {
        if let Some(i) = self.top.iter().position(|v| *v == id) {
            let v = self.top.remove(i);
            self.top.insert(0, v);
        } else if let Some(i) = self.bottom.iter().position(|v| *v == id) {
            let v = self.bottom.remove(i);
            self.bottom.insert(0, v);
        } else if let Some(ws) = self.workspace_of(id) {
            self.workspaces[ws].move_to_back(id, views);
        } else {
            warn!("move_to_back: view {} not managed", id);
        }
    }

    /// Switches to a given workspace by index.
    ///
    /// All views bound to other workspaces are hidden first, then the
    /// target's views are shown; views in the top and bottom bands
    /// are visible on every workspace and never touched. Focus is the
    /// caller's responsibility.
    ///
    /// Returns whether the current workspace actually changed.
    pub fn switch_to<C: SceneConn>(
        &mut self,
        conn: &C,
        views: &mut ViewRing,
        target: usize,
    ) -> Result<bool> {
        if target >= self.workspaces.len() {
            return Err(crate::TatamiError::UnknownWorkspace(target.to_string()));
        }
        if target == self.current {
            return Ok(false);
        }
        debug!("switching to workspace {}", target);

        for (i, ws) in self.workspaces.iter().enumerate() {
            if i == target {
                continue;
            }
            for id in ws.stacking() {
                if let Some(view) = views.lookup_mut(*id) {
                    if view.mapped {
                        conn.set_view_hidden(*id, true)?;
                    }
                }
            }
        }

        for id in self.workspaces[target].stacking().to_vec() {
            if let Some(view) = views.lookup_mut(id) {
                if view.mapped && !view.minimized {
                    conn.set_view_hidden(id, false)?;
                }
            }
        }

        self.current = target;
        self.workspaces.set_focused(target);
        Ok(true)
    }
}
