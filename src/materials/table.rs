//! Built-in material presets and the lookup table the engine snapshots.

use std::collections::HashMap;

use super::{PhysMatProperties, SurfaceType};

/// Preset properties for a surface type.
///
/// Columns follow [`PhysMatProperties::new`]: density (g/cm³), fracture
/// toughness (MPa·√m), UTS, yield, compressive and shear strength (MPa),
/// Poisson's ratio and Young's modulus (GPa). A yield of -1 means "derive
/// from UTS".
pub fn preset(surface: SurfaceType) -> PhysMatProperties {
    use SurfaceType::*;
    let p = PhysMatProperties::new;
    match surface {
        Acrylic => p(surface, 1.18, 1.0, 75.0, 70.0, 80.0, 70.0, 0.35, 2.7),
        Aluminum => p(surface, 2.7, 27.0, 200.0, 120.0, 120.0, 70.0, 0.33, 69.0),
        Asphalt => p(surface, 2.3, 0.5, 300.0, 200.0, 15.0, 0.3, 0.3, 1.5),
        Bone => p(surface, 2.0, 3.0, 155.0, 100.0, 100.0, 40.0, 0.3, 1.8),
        Brass => p(surface, 8.5, 1.5, 530.0, 375.0, 350.0, 220.0, 0.33, 125.0),
        Brick => p(surface, 2.0, 0.5, 20.0, 10.0, 15.0, 10.0, 0.2, 15.0),
        CarbonFiber => p(surface, 1.7, 20.0, 5250.0, 3500.0, 400.0, 300.0, 0.3, 430.0),
        CastIron => p(surface, 7.2, 4.0, 590.0, 420.0, 650.0, 370.0, 0.3, 170.0),
        Ceramic => p(surface, 2.75, 5.0, 200.0, -1.0, 800.0, 350.0, 0.25, 200.0),
        Concrete | Default => p(Concrete, 2.3, 0.5, 140.0, 20.0, 30.0, 20.0, 0.2, 25.0),
        Copper => p(surface, 8.9, 1.5, 210.0, 70.0, 210.0, 120.0, 0.34, 130.0),
        Drywall => p(surface, 0.75, 1.1, 50.0, -1.0, 1.5, 1.5, 0.3, 1.5),
        Flesh => p(surface, 1.1, 0.007, 27.0, 5.0, 6.0, 0.3, 0.0006, 0.43),
        Glass => p(surface, 2.5, 0.85, 100.0, -1.0, 1500.0, 35.0, 0.25, 70.0),
        HardenedSteel => {
            p(surface, 7.8, 40.0, 1300.0, 1100.0, 1250.0, 850.0, 0.3, 200.0).with_strain_rate_factor(2.0)
        }
        HardPlastic => p(surface, 1.2, 1.4, 70.0, 60.0, 80.0, 70.0, 0.37, 2.4),
        Hardwood => p(surface, 0.6, 0.6, 60.0, 40.0, 45.0, 20.0, 0.3, 12.0).with_strain_rate_factor(1.1),
        Ice => p(surface, 0.9, 0.2, 1.5, 1.5, 2.0, 0.3, 0.33, 9.0),
        Kevlar => p(surface, 1.44, 15.0, 3620.0, 2750.0, 150.0, 25.0, 0.35, 120.0),
        Lead => p(surface, 11.34, 0.18, 17.0, 12.0, 17.0, 4.5, 0.44, 16.0),
        Limestone => p(surface, 2.71, 0.6, 8.0, -1.0, 125.0, 30.0, 0.25, 40.0),
        Paper => p(surface, 0.6, 0.1, 30.0, -1.0, 30.0, 12.0, 0.43, 3.0),
        Plastic => p(surface, 0.95, 1.0, 20.0, 20.0, 25.0, 22.5, 0.4, 1.5),
        Polystyrene => p(surface, 1.05, 0.5, 38.0, 45.0, 0.5, 30.0, 0.33, 3.5),
        Rubber => p(surface, 1.2, 0.2, 25.0, 15.0, 5.0, 30.0, 0.5, 0.2),
        Softwood => p(surface, 0.5, 0.5, 60.0, 30.0, 30.0, 20.0, 0.3, 11.0),
        Steel => p(surface, 7.8, 30.0, 690.0, 590.0, 660.0, 450.0, 0.3, 200.0),
        Titanium => p(surface, 4.5, 6.0, 900.0, 800.0, 900.0, 600.0, 0.34, 116.0),
        TungstenCarbide => p(surface, 15.0, 10.0, 2600.0, 2400.0, 2500.0, 2200.0, 0.25, 650.0),
        Water => p(surface, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5, 2.2)
            .with_fluid(1.0e-6)
            .with_friction(0.05),
    }
}

/// Material lookup used while resolving hits.
///
/// Surfaces map to their preset unless overridden; named materials cover
/// anything the surface list does not. Unknown lookups fall back to the
/// default surface (concrete).
#[derive(Debug, Clone)]
pub struct MaterialTable {
    surfaces: HashMap<SurfaceType, PhysMatProperties>,
    named: HashMap<String, PhysMatProperties>,
    default_surface: SurfaceType,
}

impl Default for MaterialTable {
    fn default() -> Self {
        let surfaces = SurfaceType::ALL.iter().map(|&s| (s, preset(s))).collect();
        Self {
            surfaces,
            named: HashMap::new(),
            default_surface: SurfaceType::Concrete,
        }
    }
}

impl MaterialTable {
    /// Table with only the built-in presets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the properties used for a surface type.
    pub fn with_surface(mut self, surface: SurfaceType, properties: PhysMatProperties) -> Self {
        self.set_surface(surface, properties);
        self
    }

    /// Registers a material under a name (case-insensitive).
    pub fn with_named(mut self, name: impl Into<String>, properties: PhysMatProperties) -> Self {
        self.insert_named(name, properties);
        self
    }

    pub fn with_default_surface(mut self, surface: SurfaceType) -> Self {
        self.default_surface = surface;
        self
    }

    pub fn set_surface(&mut self, surface: SurfaceType, properties: PhysMatProperties) {
        self.surfaces.insert(surface, properties);
    }

    pub fn insert_named(&mut self, name: impl Into<String>, properties: PhysMatProperties) {
        self.named.insert(name.into().to_ascii_lowercase(), properties);
    }

    pub fn default_surface(&self) -> SurfaceType {
        self.default_surface
    }

    /// Properties of the default surface.
    pub fn default_material(&self) -> &PhysMatProperties {
        self.surface(self.default_surface)
    }

    /// Properties for a surface type, falling back to the default surface.
    pub fn surface(&self, surface: SurfaceType) -> &PhysMatProperties {
        self.surfaces
            .get(&surface)
            .or_else(|| self.surfaces.get(&self.default_surface))
            .or_else(|| self.surfaces.get(&SurfaceType::Concrete))
            .unwrap_or_else(|| default_concrete())
    }

    /// Looks a material up by name: custom entries first, then surface
    /// names.
    pub fn named(&self, name: &str) -> Option<&PhysMatProperties> {
        self.named
            .get(&name.to_ascii_lowercase())
            .or_else(|| SurfaceType::from_name(name).and_then(|s| self.surfaces.get(&s)))
    }

    pub fn len(&self) -> usize {
        self.surfaces.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn default_concrete() -> &'static PhysMatProperties {
    static CONCRETE: std::sync::OnceLock<PhysMatProperties> = std::sync::OnceLock::new();
    CONCRETE.get_or_init(|| preset(SurfaceType::Concrete))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_surface_has_a_preset() {
        let table = MaterialTable::new();
        for surface in SurfaceType::ALL {
            let m = table.surface(surface);
            assert_eq!(m.surface_type, surface);
            assert!(m.density > 0.0, "{surface:?}");
            assert!(m.youngs_modulus > 0.0, "{surface:?}");
        }
        assert_eq!(table.len(), SurfaceType::ALL.len());
    }

    #[test]
    fn test_default_is_concrete() {
        let table = MaterialTable::new();
        assert_eq!(table.surface(SurfaceType::Default).surface_type, SurfaceType::Concrete);
        assert_eq!(table.default_material().name, "Concrete");
        assert_eq!(PhysMatProperties::default().surface_type, SurfaceType::Concrete);
    }

    #[test]
    fn test_water_is_fluid() {
        let water = preset(SurfaceType::Water);
        assert!(water.is_fluid);
        assert_eq!(water.friction, 0.05);
        assert_eq!(water.in_base_units().density, 1000.0);
    }

    #[test]
    fn test_named_lookup_and_overrides() {
        let armor = preset(SurfaceType::HardenedSteel).with_name("RHA");
        let table = MaterialTable::new()
            .with_named("RHA", armor)
            .with_surface(SurfaceType::Steel, preset(SurfaceType::Titanium));

        assert_eq!(table.named("rha").map(|m| m.name.as_str()), Some("RHA"));
        assert_eq!(table.named("drywall").map(|m| m.surface_type), Some(SurfaceType::Drywall));
        assert!(table.named("nothing").is_none());
        assert_eq!(table.surface(SurfaceType::Steel).surface_type, SurfaceType::Titanium);
    }
}
