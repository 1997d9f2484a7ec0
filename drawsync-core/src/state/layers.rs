//! # Layers
//!
//! The authoritative document: an ordered stack of equally sized raster layers, bottom to top.
//! A layer's z-order is its index in the stack and is never stored on the layer itself.

use crate::{
    blend::Opacity,
    commands::Command,
    id::LayerID,
    raster::{Patch, Raster},
    util::Rect,
};

/// Notifications are dropped rather than blocking once a listener falls this far behind.
pub const DEFAULT_NOTIFY_CAPACITY: usize = 256;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    #[error("{0} not found")]
    NotFound(LayerID),
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
}

/// Change notifications, pushed to every [`LayerStack::listen`]er.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackEvent {
    Created(LayerID),
    Deleted(LayerID),
    Moved {
        layer: LayerID,
        from: usize,
        to: usize,
    },
    /// Name, opacity, or visibility changed.
    Attributes(LayerID),
    /// Pixels within `rect` need repainting.
    Dirty { layer: LayerID, rect: Rect },
    /// The whole document was replaced.
    Reset,
}

#[derive(Clone, Debug)]
pub struct Layer {
    id: LayerID,
    pub name: String,
    pub opacity: Opacity,
    /// Local view state. Hidden layers are skipped when compositing and merged sampling.
    pub visible: bool,
    raster: Raster,
}
impl Layer {
    fn new(id: LayerID, name: String, width: u32, height: u32) -> Self {
        Self {
            id,
            name,
            opacity: Opacity::OPAQUE,
            visible: true,
            raster: Raster::new(width, height),
        }
    }
    #[must_use]
    pub fn id(&self) -> LayerID {
        self.id
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn raster(&self) -> &Raster {
        &self.raster
    }
}

/// Read access to an ordered set of layers, shared by the live stack and its snapshots.
pub trait LayerSource {
    /// Canvas `(width, height)`. Every layer has exactly this size.
    fn size(&self) -> (u32, u32);
    /// All layers, bottom to top.
    fn layers(&self) -> &[Layer];
    fn layer(&self, id: LayerID) -> Option<&Layer> {
        self.layers().iter().find(|layer| layer.id == id)
    }
}

/// An owned copy of the layers at one point in time, for off-thread work such as filling.
#[derive(Clone, Debug)]
pub struct Snapshot {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
}
impl LayerSource for Snapshot {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
    fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

pub struct LayerStack {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
    /// Rebuilt on every structural change. Always consistent with `layers`.
    index: hashbrown::HashMap<LayerID, usize>,
    next_id: u32,
    on_change: bus::Bus<StackEvent>,
}
impl LayerStack {
    pub const BACKGROUND_NAME: &'static str = "Background";
    /// Create a stack with a single empty background layer, id 1.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_capacity(width, height, DEFAULT_NOTIFY_CAPACITY)
    }
    /// Create a stack, choosing how far a notification listener may lag.
    #[must_use]
    pub fn with_capacity(width: u32, height: u32, notify_capacity: usize) -> Self {
        let mut this = Self {
            width,
            height,
            layers: Vec::new(),
            index: hashbrown::HashMap::new(),
            next_id: 1,
            on_change: bus::Bus::new(notify_capacity.max(1)),
        };
        this.push_background();
        this
    }
    fn push_background(&mut self) {
        let id = self.allocate_id();
        self.layers.push(Layer::new(
            id,
            Self::BACKGROUND_NAME.to_owned(),
            self.width,
            self.height,
        ));
        self.rebuild_index();
    }
    /// Replace the document with a fresh one, keeping the listeners.
    pub fn reset(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.layers.clear();
        self.next_id = 1;
        self.push_background();
        self.notify(StackEvent::Reset);
    }
    /// Subscribe to change notifications. Dropping the reader unsubscribes.
    pub fn listen(&mut self) -> bus::BusReader<StackEvent> {
        self.on_change.add_rx()
    }
    fn notify(&mut self, event: StackEvent) {
        log::trace!("Stack event {event:?}");
        if let Err(event) = self.on_change.try_broadcast(event) {
            log::warn!("Stack listener lagging, dropped {event:?}");
        }
    }
    /// Report a repaint region that did not come from a stack mutation, e.g. retired previews.
    pub fn mark_dirty(&mut self, layer: LayerID, rect: Rect) {
        if let Some(rect) = rect.clip_to(self.width, self.height) {
            self.notify(StackEvent::Dirty { layer, rect });
        }
    }
    fn allocate_id(&mut self) -> LayerID {
        let id = LayerID(self.next_id);
        // Ids are never reused, a saturated counter would be a 4-billion layer session.
        self.next_id = self.next_id.saturating_add(1);
        id
    }
    fn rebuild_index(&mut self) {
        self.index.clear();
        self.index.extend(
            self.layers
                .iter()
                .enumerate()
                .map(|(idx, layer)| (layer.id, idx)),
        );
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::of_size(self.width, self.height)
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
    /// Current z-position of the layer, 0 being the bottom.
    #[must_use]
    pub fn index_of(&self, id: LayerID) -> Option<usize> {
        self.index.get(&id).copied()
    }
    #[must_use]
    pub fn is_bottommost(&self, id: LayerID) -> bool {
        self.index_of(id) == Some(0)
    }
    /// The bottommost layer.
    #[must_use]
    pub fn bottom(&self) -> Option<LayerID> {
        self.layers.first().map(Layer::id)
    }
    /// The topmost layer.
    #[must_use]
    pub fn top(&self) -> Option<LayerID> {
        self.layers.last().map(Layer::id)
    }
    fn require(&self, id: LayerID) -> Result<usize, StackError> {
        self.index_of(id).ok_or(StackError::NotFound(id))
    }
    fn get_mut(&mut self, id: LayerID) -> Result<&mut Layer, StackError> {
        let idx = self.require(id)?;
        Ok(&mut self.layers[idx])
    }
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            width: self.width,
            height: self.height,
            layers: self.layers.clone(),
        }
    }

    /// Append a new empty layer on top, returning its id.
    pub fn create_layer(&mut self, name: impl Into<String>) -> LayerID {
        let id = self.allocate_id();
        self.layers
            .push(Layer::new(id, name.into(), self.width, self.height));
        self.index.insert(id, self.layers.len() - 1);
        self.notify(StackEvent::Created(id));
        id
    }
    fn check_delete(&self, id: LayerID, merge_down: bool) -> Result<usize, StackError> {
        let idx = self.require(id)?;
        if self.layers.len() <= 1 {
            return Err(StackError::InvalidOperation("cannot delete the last layer"));
        }
        if merge_down && idx == 0 {
            return Err(StackError::InvalidOperation("no layer below to merge into"));
        }
        Ok(idx)
    }
    /// Remove a layer, optionally compositing it onto the layer directly below first.
    pub fn delete_layer(&mut self, id: LayerID, merge_down: bool) -> Result<(), StackError> {
        let idx = self.check_delete(id, merge_down)?;
        let removed = self.layers.remove(idx);
        if merge_down {
            let below = &mut self.layers[idx - 1];
            below.raster.composite(&removed.raster, removed.opacity);
            let below = below.id;
            self.notify(StackEvent::Dirty {
                layer: below,
                rect: Rect::of_size(self.width, self.height),
            });
        }
        self.rebuild_index();
        self.notify(StackEvent::Deleted(id));
        Ok(())
    }
    /// Move a layer to a new z-position, clamped to the valid range. Returns the final position.
    pub fn move_layer(&mut self, id: LayerID, new_index: usize) -> Result<usize, StackError> {
        let from = self.require(id)?;
        let to = new_index.min(self.layers.len() - 1);
        if from != to {
            let layer = self.layers.remove(from);
            self.layers.insert(to, layer);
            self.rebuild_index();
            self.notify(StackEvent::Moved { layer: id, from, to });
        }
        Ok(to)
    }
    /// Apply a patch to a layer, clipped to the canvas. Returns the touched area, `None` if the
    /// patch fell outside the canvas entirely.
    pub fn apply_patch(&mut self, id: LayerID, patch: &Patch) -> Result<Option<Rect>, StackError> {
        let touched = self.get_mut(id)?.raster.apply_patch(patch);
        if let Some(rect) = touched {
            self.notify(StackEvent::Dirty { layer: id, rect });
        }
        Ok(touched)
    }
    pub fn set_opacity(&mut self, id: LayerID, opacity: Opacity) -> Result<(), StackError> {
        self.get_mut(id)?.opacity = opacity;
        self.notify(StackEvent::Attributes(id));
        Ok(())
    }
    pub fn set_visible(&mut self, id: LayerID, visible: bool) -> Result<(), StackError> {
        self.get_mut(id)?.visible = visible;
        self.notify(StackEvent::Attributes(id));
        Ok(())
    }
    pub fn set_name(&mut self, id: LayerID, name: impl Into<String>) -> Result<(), StackError> {
        self.get_mut(id)?.name = name.into();
        self.notify(StackEvent::Attributes(id));
        Ok(())
    }
    /// Check whether `command` could be applied right now, without changing anything.
    pub fn validate(&self, command: &Command) -> Result<(), StackError> {
        match command {
            Command::LayerDelete { layer, merge_down } => {
                self.check_delete(*layer, *merge_down).map(|_| ())
            }
            other => match other.layer() {
                Some(layer) => self.require(layer).map(|_| ()),
                None => Ok(()),
            },
        }
    }
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.index.len(), self.layers.len());
        for (idx, layer) in self.layers.iter().enumerate() {
            assert_eq!(self.index.get(&layer.id), Some(&idx));
        }
    }
}
impl LayerSource for LayerStack {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
    fn layers(&self) -> &[Layer] {
        &self.layers
    }
    fn layer(&self, id: LayerID) -> Option<&Layer> {
        self.index_of(id).map(|idx| &self.layers[idx])
    }
}
