//! This module exports `Output`, which represents a display that
//! views can be arranged on.
//!
//! An `Output` tracks two rectangles: its full geometry in layout
//! coordinates, and the usable area left over after layer-shell
//! surfaces have reserved their exclusive zones. The tiling engine
//! and focus controller only ever work with the usable area.

use crate::core::types::{Point, Rect};
use crate::scene::core::OutputId;

/// Represents a physical or virtual display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub(crate) id: OutputId,
    pub(crate) name: String,
    pub(crate) geometry: Rect,
    pub(crate) usable: Rect,
}

impl Output {
    pub fn new(id: OutputId, name: &str, geometry: Rect) -> Self {
        Self {
            id,
            name: name.into(),
            geometry,
            usable: geometry,
        }
    }

    #[inline(always)]
    pub fn id(&self) -> OutputId {
        self.id
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full geometry of the output in layout coordinates.
    #[inline(always)]
    pub fn geometry(&self) -> Rect {
        self.geometry
    }

    /// The geometry remaining after layer-shell exclusive zones.
    #[inline(always)]
    pub fn usable(&self) -> Rect {
        self.usable
    }

    pub fn set_usable(&mut self, usable: Rect) {
        self.usable = usable;
    }

    pub fn contains_point(&self, pt: Point) -> bool {
        self.geometry.contains_point(pt)
    }
}
