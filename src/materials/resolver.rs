//! Classifies a hit into a surface type, hit-zone flags and material
//! properties.
//!
//! Lookup order: component gameplay tags, plain component/actor tags,
//! pawn material inference, the hit's physical material, the table
//! default. Safe to use from worker threads: it only reads the scene and a
//! material table snapshot.

use super::{MaterialTable, PhysMatProperties, SurfaceType};
use crate::scene::{tags, HitResult, MaterialRef, SceneQuery};

/// Outcome of classifying a hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceClassification {
    pub surface: SurfaceType,
    pub properties: PhysMatProperties,
    pub is_hit_zone: bool,
    pub is_flesh: bool,
    pub is_bone: bool,
    pub is_dead: bool,
}

impl SurfaceClassification {
    fn from_material(properties: PhysMatProperties) -> Self {
        Self {
            surface: properties.surface_type,
            properties,
            is_hit_zone: false,
            is_flesh: false,
            is_bone: false,
            is_dead: false,
        }
    }

    pub fn is_fluid(&self) -> bool {
        self.properties.is_fluid
    }
}

/// Gameplay tag match: `tag` equals `query` or is a child of it
/// (`HitZone.Flesh` matches `HitZone`).
pub fn matches_tag(tag: &str, query: &str) -> bool {
    tag == query || (tag.len() > query.len() && tag.starts_with(query) && tag.as_bytes()[query.len()] == b'.')
}

/// Resolves materials for hits against a scene.
pub struct PhysicalMaterialResolver<'a> {
    scene: &'a dyn SceneQuery,
    table: &'a MaterialTable,
}

impl<'a> PhysicalMaterialResolver<'a> {
    pub fn new(scene: &'a dyn SceneQuery, table: &'a MaterialTable) -> Self {
        Self { scene, table }
    }

    pub fn table(&self) -> &MaterialTable {
        self.table
    }

    /// Whether the hit component or its actor carries a plain tag.
    pub fn has_tag(&self, hit: &HitResult, tag: &str) -> bool {
        self.scene.component_tags(hit.component).iter().any(|t| t == tag)
            || hit
                .actor
                .is_some_and(|actor| self.scene.actor_tags(actor).iter().any(|t| t == tag))
    }

    /// Physical material of the hit, falling back to the table default.
    pub fn material_of(&self, hit: &HitResult) -> PhysMatProperties {
        self.lookup(hit).cloned().unwrap_or_else(|| self.table.default_material().clone())
    }

    fn lookup(&self, hit: &HitResult) -> Option<&PhysMatProperties> {
        match self.scene.physical_material_of(hit.component, hit.face_index)? {
            MaterialRef::Surface(surface) => Some(self.table.surface(surface)),
            MaterialRef::Named(name) => self.table.named(&name),
        }
    }

    /// Classifies a hit.
    pub fn classify(&self, hit: &HitResult) -> SurfaceClassification {
        let explicit = self.lookup(hit).cloned();
        let has_material = explicit.is_some();
        let mut result =
            SurfaceClassification::from_material(explicit.unwrap_or_else(|| self.table.default_material().clone()));

        let gameplay_tags = self.scene.gameplay_tags(hit.component);
        if gameplay_tags.iter().any(|t| matches_tag(t, tags::HIT_ZONE)) {
            result.is_hit_zone = true;
            result.is_flesh = gameplay_tags.iter().any(|t| t == tags::HIT_ZONE_FLESH);
            result.is_bone = gameplay_tags.iter().any(|t| t == tags::HIT_ZONE_BONE);
            result.is_dead = gameplay_tags.iter().any(|t| t == tags::HIT_ZONE_DEAD);
            return self.with_zone_material(result, has_material);
        }

        let mut plain = self.scene.component_tags(hit.component);
        if let Some(actor) = hit.actor {
            plain.extend(self.scene.actor_tags(actor));
        }
        let flesh = plain.iter().any(|t| t == tags::FLESH);
        let bone = plain.iter().any(|t| t == tags::BONE);
        if flesh || bone || plain.iter().any(|t| t == tags::HIT_ZONE) {
            result.is_hit_zone = true;
            result.is_flesh = flesh;
            result.is_bone = bone;
            return self.with_zone_material(result, has_material);
        }

        if hit.actor.is_some_and(|actor| self.scene.is_pawn(actor)) && has_material {
            result.is_flesh = result.properties.is_flesh();
            result.is_bone = result.properties.is_bone();
            result.is_hit_zone = result.is_flesh || result.is_bone;
        }
        result
    }

    /// Hit zones without their own material take the tissue preset.
    fn with_zone_material(&self, mut result: SurfaceClassification, has_material: bool) -> SurfaceClassification {
        if has_material {
            return result;
        }
        let surface = if result.is_bone {
            SurfaceType::Bone
        } else {
            SurfaceType::Flesh
        };
        result.properties = self.table.surface(surface).clone();
        result.surface = surface;
        result
    }
}
