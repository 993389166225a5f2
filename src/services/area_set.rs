//! Loaded floor content: live area objects, walkable surface, output ownership
//!
//! An `AreaSet` is what a floor's area-set id resolves to once loaded. It is
//! owned by the floor's `FloorManager` while the floor is active and handed
//! back to the loader on unload.

use crate::domain::types::{AreaId, TriggerVolume, Vec3};
use crate::nav::NavSurface;
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// Index of a live area object within its area-set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AreaHandle(pub usize);

impl std::fmt::Display for AreaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live, per-floor instance of an area
#[derive(Debug, Clone)]
pub struct AreaObject {
    /// Definition this object stands for; unbound objects are ignored by the registry
    pub definition: Option<AreaId>,
    pub trigger: Option<TriggerVolume>,
    active: bool,
}

impl AreaObject {
    pub fn new(definition: Option<AreaId>, trigger: Option<TriggerVolume>) -> Self {
        Self { definition, trigger, active: true }
    }

    pub fn bound(id: &str, trigger: TriggerVolume) -> Self {
        Self::new(Some(AreaId::new(id)), Some(trigger))
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Trigger volume if it can actually be entered
    pub fn usable_trigger(&self) -> Option<&TriggerVolume> {
        self.trigger.as_ref().filter(|t| t.is_usable())
    }

    /// True when the object is active and `p` lies inside its trigger
    pub fn triggers_at(&self, p: Vec3) -> bool {
        self.active && self.usable_trigger().is_some_and(|t| t.contains(p))
    }
}

/// Rendering surface and audio destination shipped with the content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSurfaces {
    pub camera: bool,
    pub listener: bool,
}

impl Default for OutputSurfaces {
    fn default() -> Self {
        Self { camera: true, listener: true }
    }
}

/// Loaded content for one floor
#[derive(Clone)]
pub struct AreaSet {
    name: String,
    spawn: Option<Vec3>,
    objects: Vec<AreaObject>,
    surface: Option<Arc<dyn NavSurface>>,
    outputs: OutputSurfaces,
}

impl std::fmt::Debug for AreaSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AreaSet")
            .field("name", &self.name)
            .field("spawn", &self.spawn)
            .field("objects", &self.objects.len())
            .field("has_surface", &self.surface.is_some())
            .field("outputs", &self.outputs)
            .finish()
    }
}

impl AreaSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            spawn: None,
            objects: Vec::new(),
            surface: None,
            outputs: OutputSurfaces::default(),
        }
    }

    pub fn with_spawn(mut self, spawn: Vec3) -> Self {
        self.spawn = Some(spawn);
        self
    }

    pub fn with_surface(mut self, surface: Arc<dyn NavSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_object(mut self, object: AreaObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn with_outputs(mut self, outputs: OutputSurfaces) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spawn(&self) -> Option<Vec3> {
        self.spawn
    }

    pub fn surface(&self) -> Option<&Arc<dyn NavSurface>> {
        self.surface.as_ref()
    }

    pub fn objects(&self) -> impl Iterator<Item = (AreaHandle, &AreaObject)> {
        self.objects.iter().enumerate().map(|(i, o)| (AreaHandle(i), o))
    }

    pub fn object(&self, handle: AreaHandle) -> Option<&AreaObject> {
        self.objects.get(handle.0)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn set_active(&mut self, handle: AreaHandle, active: bool) {
        if let Some(object) = self.objects.get_mut(handle.0) {
            object.active = active;
        }
    }

    /// Activate `handle` and deactivate every other object
    pub fn activate_only(&mut self, handle: AreaHandle) {
        for (i, object) in self.objects.iter_mut().enumerate() {
            object.active = i == handle.0;
        }
    }

    pub fn deactivate_all(&mut self) {
        for object in &mut self.objects {
            object.active = false;
        }
    }

    pub fn active_count(&self) -> usize {
        self.objects.iter().filter(|o| o.active).count()
    }

    pub fn outputs(&self) -> OutputSurfaces {
        self.outputs
    }

    pub fn set_outputs(&mut self, outputs: OutputSurfaces) {
        self.outputs = outputs;
    }
}

/// Loads and unloads floor content by area-set id
///
/// Loading is the one suspension point of the navigation core; the
/// orchestrator awaits it before any floor work happens.
#[async_trait]
pub trait AreaSetLoader: Send + Sync {
    async fn load(&self, area_set: &str) -> anyhow::Result<AreaSet>;

    /// Release content; called after `FloorUnloaded` has been raised
    async fn unload(&self, area_set: AreaSet);
}

/// Serves pre-built area-sets, recording load/unload order
#[derive(Default)]
pub struct InMemoryAreaSetLoader {
    sets: FxHashMap<String, AreaSet>,
    log: Mutex<Vec<String>>,
}

impl InMemoryAreaSetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set(mut self, set: AreaSet) -> Self {
        self.sets.insert(set.name().to_string(), set);
        self
    }

    /// Ordered `load:<name>` / `unload:<name>` entries
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl AreaSetLoader for InMemoryAreaSetLoader {
    async fn load(&self, area_set: &str) -> anyhow::Result<AreaSet> {
        let set = self
            .sets
            .get(area_set)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown area-set {area_set}"))?;
        self.log.lock().push(format!("load:{area_set}"));
        debug!(area_set = %area_set, objects = %set.len(), "area_set_loaded");
        Ok(set)
    }

    async fn unload(&self, area_set: AreaSet) {
        debug!(area_set = %area_set.name(), "area_set_unloaded");
        self.log.lock().push(format!("unload:{}", area_set.name()));
    }
}
