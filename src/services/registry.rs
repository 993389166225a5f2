//! Area registry - resolves area definitions to live objects of the loaded floor

use crate::domain::types::{AreaDefinition, AreaId, FloorDefinition};
use crate::services::area_set::{AreaHandle, AreaSet};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// `AreaId → AreaHandle` map for the currently loaded floor
#[derive(Debug, Default)]
pub struct AreaRegistry {
    map: FxHashMap<AreaId, AreaHandle>,
}

impl AreaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from freshly loaded content
    pub fn from_area_set(area_set: &AreaSet) -> Self {
        let mut registry = Self::new();
        registry.refresh(area_set);
        registry
    }

    /// Rebuild the map from every object in `area_set`
    ///
    /// Objects without a definition are skipped. When two objects reference
    /// the same definition the first one wins.
    pub fn refresh(&mut self, area_set: &AreaSet) {
        self.map.clear();

        for (handle, object) in area_set.objects() {
            let Some(id) = object.definition.as_ref() else {
                debug!(area_set = %area_set.name(), handle = %handle, "area_object_unbound");
                continue;
            };

            if let Some(existing) = self.map.get(id) {
                warn!(
                    area_set = %area_set.name(),
                    area = %id,
                    kept = %existing,
                    ignored = %handle,
                    "area_duplicate_mapping"
                );
                continue;
            }
            self.map.insert(id.clone(), handle);
        }

        debug!(area_set = %area_set.name(), mapped = %self.map.len(), "area_registry_refreshed");
    }

    pub fn try_get(&self, id: &AreaId) -> Option<AreaHandle> {
        self.map.get(id).copied()
    }

    /// Resolvable areas of `floor`, in floor order
    ///
    /// Unresolved definitions are logged and skipped, producing a shorter
    /// effective sequence.
    pub fn for_floor<'a>(
        &'a self,
        floor: &'a FloorDefinition,
    ) -> impl Iterator<Item = (Arc<AreaDefinition>, AreaHandle)> + 'a {
        floor.areas.iter().filter_map(move |def| match self.try_get(&def.id) {
            Some(handle) => Some((def.clone(), handle)),
            None => {
                warn!(floor = %floor.name, area = %def.id, "area_unresolved");
                None
            }
        })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{TriggerVolume, Vec3};
    use crate::services::area_set::AreaObject;

    fn volume(x: f32) -> TriggerVolume {
        TriggerVolume::new(Vec3::new(x, 0.0, 0.0), Vec3::new(0.5, 1.0, 0.5))
    }

    fn floor(ids: &[&str]) -> FloorDefinition {
        FloorDefinition {
            name: "ground".to_string(),
            area_set: "ground".to_string(),
            transition_text: String::new(),
            areas: ids.iter().map(|id| Arc::new(AreaDefinition::new(id, id))).collect(),
        }
    }

    #[test]
    fn test_duplicate_definition_keeps_first() {
        let set = AreaSet::new("ground")
            .with_object(AreaObject::bound("lobby", volume(0.0)))
            .with_object(AreaObject::bound("lobby", volume(5.0)));

        let registry = AreaRegistry::from_area_set(&set);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.try_get(&AreaId::new("lobby")), Some(AreaHandle(0)));
    }

    #[test]
    fn test_unbound_objects_skipped() {
        let set = AreaSet::new("ground")
            .with_object(AreaObject::new(None, Some(volume(0.0))))
            .with_object(AreaObject::bound("gallery", volume(2.0)));

        let registry = AreaRegistry::from_area_set(&set);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.try_get(&AreaId::new("gallery")), Some(AreaHandle(1)));
    }

    #[test]
    fn test_for_floor_preserves_order_and_skips_missing() {
        let set = AreaSet::new("ground")
            .with_object(AreaObject::bound("c", volume(4.0)))
            .with_object(AreaObject::bound("a", volume(0.0)));
        let registry = AreaRegistry::from_area_set(&set);
        let floor = floor(&["a", "b", "c"]);

        let resolved: Vec<_> =
            registry.for_floor(&floor).map(|(def, handle)| (def.id.0.clone(), handle)).collect();

        assert_eq!(resolved, vec![("a".to_string(), AreaHandle(1)), ("c".to_string(), AreaHandle(0))]);
    }

    #[test]
    fn test_refresh_replaces_previous_floor() {
        let mut registry =
            AreaRegistry::from_area_set(&AreaSet::new("one").with_object(AreaObject::bound("a", volume(0.0))));
        registry.refresh(&AreaSet::new("two").with_object(AreaObject::bound("b", volume(0.0))));

        assert!(registry.try_get(&AreaId::new("a")).is_none());
        assert_eq!(registry.try_get(&AreaId::new("b")), Some(AreaHandle(0)));
    }
}
