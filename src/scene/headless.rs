//! A `SceneConn` implementation that runs without a display.
//!
//! `HeadlessConn` keeps the whole scene in plain data structures:
//! committed geometries, visibility, stacking requests, focus and
//! forwarded input are all recorded instead of being pushed to a
//! display stack. The binary uses it when no backend is available,
//! and the test suite drives the entire core through it, injecting
//! events with [`HeadlessConn::push_event`] and asserting on what the
//! core committed back.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::output::Output;
use crate::core::types::{Point, Rect};
use crate::scene::core::{NodeId, NodeTag, OutputId, Result, SceneConn, SceneError, ViewId};
use crate::scene::event::{KeyEvent, SceneEvent};
use crate::scene::input::{keysym::Keysym, KeyCode, MenuKey, ModMask};

#[derive(Debug, Clone, Copy, Default)]
struct NodeInfo {
    parent: Option<NodeId>,
    tag: Option<NodeTag>,
}

/// A scene backend with no display behind it.
#[derive(Debug, Default)]
pub struct HeadlessConn {
    outputs: RefCell<Vec<Output>>,
    events: RefCell<VecDeque<SceneEvent>>,

    mapped: RefCell<HashSet<ViewId>>,
    committed: RefCell<HashMap<ViewId, Rect>>,
    hidden: RefCell<HashSet<ViewId>>,
    raised: RefCell<Vec<ViewId>>,
    activated: RefCell<HashMap<ViewId, bool>>,
    closed: RefCell<Vec<ViewId>>,

    keyboard_focus: RefCell<Option<ViewId>>,
    offers: RefCell<Vec<ViewId>>,
    cursor: Cell<Point>,
    locked: Cell<bool>,
    layout_index: Cell<usize>,

    nodes: RefCell<HashMap<NodeId, NodeInfo>>,
    node_regions: RefCell<Vec<(Rect, NodeId)>>,
    surface_sizes: RefCell<HashMap<ViewId, (f64, f64)>>,

    top_layers: RefCell<HashMap<OutputId, bool>>,

    repeat: Cell<(i32, i32)>,
    keymap: RefCell<HashMap<Keysym, Vec<KeyCode>>>,
    forwarded: RefCell<Vec<(KeyCode, bool, u32)>>,
    modifier_updates: RefCell<Vec<(ModMask, bool)>>,
    vt_switches: RefCell<Vec<u32>>,
    menu_keys: RefCell<Vec<MenuKey>>,
}

impl HeadlessConn {
    pub fn new() -> Self {
        let conn = Self::default();
        conn.repeat.set((25, 600));
        conn
    }

    /// Creates a headless connection with a single output of the
    /// given geometry.
    pub fn with_output(geometry: Rect) -> Self {
        let conn = Self::new();
        conn.add_output(Output::new(0, "HEADLESS-1", geometry));
        conn
    }

    //* Injection API

    pub fn add_output(&self, output: Output) {
        self.outputs.borrow_mut().push(output);
    }

    /// Queues an event for the core to pick up.
    pub fn push_event(&self, event: SceneEvent) {
        self.events.borrow_mut().push_back(event);
    }

    /// Marks a view as having a mapped surface, so commits reach it.
    pub fn note_mapped(&self, view: ViewId) {
        self.mapped.borrow_mut().insert(view);
    }

    pub fn note_unmapped(&self, view: ViewId) {
        self.mapped.borrow_mut().remove(&view);
    }

    pub fn set_locked(&self, locked: bool) {
        self.locked.set(locked);
    }

    pub fn set_repeat_info(&self, rate: i32, delay: i32) {
        self.repeat.set((rate, delay));
    }

    /// Registers keymap knowledge: the keycodes producing a keysym.
    pub fn map_keysym(&self, sym: Keysym, codes: Vec<KeyCode>) {
        self.keymap.borrow_mut().insert(sym, codes);
    }

    /// Registers a scene node with a parent and an optional tag.
    pub fn add_node(&self, node: NodeId, parent: Option<NodeId>, tag: Option<NodeTag>) {
        self.nodes.borrow_mut().insert(node, NodeInfo { parent, tag });
    }

    /// Declares the layout region a node occupies, for `node_at`.
    /// Later declarations win, matching scene stacking.
    pub fn set_node_region(&self, node: NodeId, region: Rect) {
        self.node_regions.borrow_mut().push((region, node));
    }

    pub fn set_surface_size(&self, view: ViewId, w: f64, h: f64) {
        self.surface_sizes.borrow_mut().insert(view, (w, h));
    }

    //* Inspection API

    /// The geometry last committed to a view, if any.
    pub fn committed(&self, view: ViewId) -> Option<Rect> {
        self.committed.borrow().get(&view).copied()
    }

    pub fn is_hidden(&self, view: ViewId) -> bool {
        self.hidden.borrow().contains(&view)
    }

    /// Views raised, in request order.
    pub fn raise_log(&self) -> Vec<ViewId> {
        self.raised.borrow().clone()
    }

    pub fn keyboard_focus(&self) -> Option<ViewId> {
        *self.keyboard_focus.borrow()
    }

    /// Whether a view was last told it is activated.
    pub fn is_activated(&self, view: ViewId) -> bool {
        self.activated.borrow().get(&view).copied().unwrap_or(false)
    }

    /// The keyboard layout index last activated by the core.
    pub fn active_layout(&self) -> usize {
        self.layout_index.get()
    }

    /// Views that were offered focus, in request order.
    pub fn focus_offers(&self) -> Vec<ViewId> {
        self.offers.borrow().clone()
    }

    /// Key events forwarded to the focused client: (keycode, pressed, time).
    pub fn forwarded_keys(&self) -> Vec<(KeyCode, bool, u32)> {
        self.forwarded.borrow().clone()
    }

    /// Modifier updates sent to clients: (mods, broadcast).
    pub fn modifier_updates(&self) -> Vec<(ModMask, bool)> {
        self.modifier_updates.borrow().clone()
    }

    pub fn vt_switch_log(&self) -> Vec<u32> {
        self.vt_switches.borrow().clone()
    }

    pub fn closed_views(&self) -> Vec<ViewId> {
        self.closed.borrow().clone()
    }

    pub fn menu_key_log(&self) -> Vec<MenuKey> {
        self.menu_keys.borrow().clone()
    }

    /// Whether the "top" layer is enabled on an output. Defaults to
    /// enabled until the core says otherwise.
    pub fn top_layer_enabled(&self, output: OutputId) -> bool {
        self.top_layers.borrow().get(&output).copied().unwrap_or(true)
    }
}

impl SceneConn for HeadlessConn {
    fn poll_next_event(&self) -> Result<Option<SceneEvent>> {
        Ok(self.events.borrow_mut().pop_front())
    }

    fn all_outputs(&self) -> Result<Vec<Output>> {
        Ok(self.outputs.borrow().clone())
    }

    fn configure_view(&self, view: ViewId, geom: Rect) -> Result<()> {
        if !self.mapped.borrow().contains(&view) {
            return Err(SceneError::NotMapped(view));
        }
        self.committed.borrow_mut().insert(view, geom);
        Ok(())
    }

    fn close_view(&self, view: ViewId) -> Result<()> {
        self.closed.borrow_mut().push(view);
        Ok(())
    }

    fn set_view_hidden(&self, view: ViewId, hidden: bool) -> Result<()> {
        if hidden {
            self.hidden.borrow_mut().insert(view);
        } else {
            self.hidden.borrow_mut().remove(&view);
        }
        Ok(())
    }

    fn raise_view(&self, view: ViewId) -> Result<()> {
        self.raised.borrow_mut().push(view);
        Ok(())
    }

    fn lower_view(&self, _view: ViewId) -> Result<()> {
        Ok(())
    }

    fn set_activated(&self, view: ViewId, activated: bool) -> Result<()> {
        self.activated.borrow_mut().insert(view, activated);
        Ok(())
    }

    fn focus_view_surface(&self, view: ViewId) -> Result<()> {
        if !self.mapped.borrow().contains(&view) {
            return Err(SceneError::NotMapped(view));
        }
        *self.keyboard_focus.borrow_mut() = Some(view);
        Ok(())
    }

    fn offer_focus(&self, view: ViewId) -> Result<()> {
        self.offers.borrow_mut().push(view);
        // a headless client always takes the offer
        *self.keyboard_focus.borrow_mut() = Some(view);
        Ok(())
    }

    fn clear_keyboard_focus(&self) {
        *self.keyboard_focus.borrow_mut() = None;
    }

    fn warp_cursor(&self, to: Point) {
        self.cursor.set(to);
    }

    fn cursor_pos(&self) -> Point {
        self.cursor.get()
    }

    fn update_pointer_focus(&self) {}

    fn session_locked(&self) -> bool {
        self.locked.get()
    }

    fn set_keyboard_layout(&self, index: usize) {
        self.layout_index.set(index);
    }

    fn node_at(&self, at: Point) -> Option<NodeId> {
        self.node_regions
            .borrow()
            .iter()
            .rev()
            .find(|(region, _)| region.contains_point(at))
            .map(|(_, node)| *node)
    }

    fn node_parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow().get(&node).and_then(|n| n.parent)
    }

    fn node_tag(&self, node: NodeId) -> Option<NodeTag> {
        self.nodes.borrow().get(&node).and_then(|n| n.tag)
    }

    fn surface_local(&self, view: ViewId, at: Point) -> Option<(f64, f64)> {
        let geom = self.committed(view)?;
        Some((f64::from(at.x - geom.x), f64::from(at.y - geom.y)))
    }

    fn view_surface_size(&self, view: ViewId) -> Option<(f64, f64)> {
        if let Some(size) = self.surface_sizes.borrow().get(&view) {
            return Some(*size);
        }
        self.committed(view)
            .map(|g| (f64::from(g.width), f64::from(g.height)))
    }

    fn set_top_layer_enabled(&self, output: OutputId, enabled: bool) {
        self.top_layers.borrow_mut().insert(output, enabled);
    }

    fn repeat_info(&self) -> (i32, i32) {
        self.repeat.get()
    }

    fn keycodes_for_keysym(&self, sym: Keysym) -> Vec<KeyCode> {
        self.keymap.borrow().get(&sym).cloned().unwrap_or_default()
    }

    fn forward_key(&self, event: &KeyEvent, pressed: bool) {
        self.forwarded
            .borrow_mut()
            .push((event.keycode, pressed, event.time_msec));
    }

    fn forward_modifiers(&self, mods: ModMask, broadcast: bool) {
        self.modifier_updates.borrow_mut().push((mods, broadcast));
    }

    fn switch_vt(&self, vt: u32) -> Result<()> {
        self.vt_switches.borrow_mut().push(vt);
        Ok(())
    }

    fn notify_menu_key(&self, key: MenuKey) {
        self.menu_keys.borrow_mut().push(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_requires_mapped_surface() {
        let conn = HeadlessConn::new();
        let err = conn
            .configure_view(1, Rect::new(0, 0, 10, 10))
            .unwrap_err();
        assert!(matches!(err, SceneError::NotMapped(1)));

        conn.note_mapped(1);
        conn.configure_view(1, Rect::new(0, 0, 10, 10)).unwrap();
        assert_eq!(conn.committed(1), Some(Rect::new(0, 0, 10, 10)));
    }

    #[test]
    fn tag_walk_stops_at_first_tag() {
        let conn = HeadlessConn::new();
        // root <- ssd <- untagged child
        conn.add_node(1, None, Some(NodeTag::Root));
        conn.add_node(2, Some(1), Some(NodeTag::View(7)));
        conn.add_node(3, Some(2), None);
        conn.set_node_region(3, Rect::new(0, 0, 100, 100));

        assert_eq!(conn.tag_at(Point::new(50, 50)), Some(NodeTag::View(7)));
        assert_eq!(conn.tag_at(Point::new(500, 500)), None);
    }

    #[test]
    fn surface_local_clamps_fractional_edges() {
        let conn = HeadlessConn::new();
        conn.note_mapped(4);
        conn.configure_view(4, Rect::new(0, 0, 100, 80)).unwrap();
        conn.set_surface_size(4, 100.0, 80.0);

        let (x, y) = conn
            .surface_local_clamped(4, Point::new(100, 80))
            .unwrap();
        assert_eq!((x, y), (99.0, 79.0));
    }
}
