//! Physical materials: the surface-type table and per-material mechanical
//! properties.
//!
//! Properties are authored in engineering units (g/cm³, MPa, MPa·√m, GPa)
//! and converted with [`PhysMatProperties::in_base_units`] before they
//! enter any formula.

pub mod resolver;
pub mod table;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::math::units::{g_cm3_to_kg_m3, gpa_to_pa, mpa_to_pa};

pub use resolver::{PhysicalMaterialResolver, SurfaceClassification};
pub use table::MaterialTable;

/// Surface categories known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Reflect)]
pub enum SurfaceType {
    #[default]
    Default,
    Acrylic,
    Aluminum,
    Asphalt,
    Bone,
    Brass,
    Brick,
    CarbonFiber,
    CastIron,
    Ceramic,
    Concrete,
    Copper,
    Drywall,
    Flesh,
    Glass,
    HardenedSteel,
    HardPlastic,
    Hardwood,
    Ice,
    Kevlar,
    Lead,
    Limestone,
    Paper,
    Plastic,
    Polystyrene,
    Rubber,
    Softwood,
    Steel,
    Titanium,
    TungstenCarbide,
    Water,
}

impl SurfaceType {
    /// Every concrete surface type (excludes `Default`).
    pub const ALL: [SurfaceType; 30] = [
        SurfaceType::Acrylic,
        SurfaceType::Aluminum,
        SurfaceType::Asphalt,
        SurfaceType::Bone,
        SurfaceType::Brass,
        SurfaceType::Brick,
        SurfaceType::CarbonFiber,
        SurfaceType::CastIron,
        SurfaceType::Ceramic,
        SurfaceType::Concrete,
        SurfaceType::Copper,
        SurfaceType::Drywall,
        SurfaceType::Flesh,
        SurfaceType::Glass,
        SurfaceType::HardenedSteel,
        SurfaceType::HardPlastic,
        SurfaceType::Hardwood,
        SurfaceType::Ice,
        SurfaceType::Kevlar,
        SurfaceType::Lead,
        SurfaceType::Limestone,
        SurfaceType::Paper,
        SurfaceType::Plastic,
        SurfaceType::Polystyrene,
        SurfaceType::Rubber,
        SurfaceType::Softwood,
        SurfaceType::Steel,
        SurfaceType::Titanium,
        SurfaceType::TungstenCarbide,
        SurfaceType::Water,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SurfaceType::Default => "Default",
            SurfaceType::Acrylic => "Acrylic",
            SurfaceType::Aluminum => "Aluminum",
            SurfaceType::Asphalt => "Asphalt",
            SurfaceType::Bone => "Bone",
            SurfaceType::Brass => "Brass",
            SurfaceType::Brick => "Brick",
            SurfaceType::CarbonFiber => "CarbonFiber",
            SurfaceType::CastIron => "CastIron",
            SurfaceType::Ceramic => "Ceramic",
            SurfaceType::Concrete => "Concrete",
            SurfaceType::Copper => "Copper",
            SurfaceType::Drywall => "Drywall",
            SurfaceType::Flesh => "Flesh",
            SurfaceType::Glass => "Glass",
            SurfaceType::HardenedSteel => "HardenedSteel",
            SurfaceType::HardPlastic => "HardPlastic",
            SurfaceType::Hardwood => "Hardwood",
            SurfaceType::Ice => "Ice",
            SurfaceType::Kevlar => "Kevlar",
            SurfaceType::Lead => "Lead",
            SurfaceType::Limestone => "Limestone",
            SurfaceType::Paper => "Paper",
            SurfaceType::Plastic => "Plastic",
            SurfaceType::Polystyrene => "Polystyrene",
            SurfaceType::Rubber => "Rubber",
            SurfaceType::Softwood => "Softwood",
            SurfaceType::Steel => "Steel",
            SurfaceType::Titanium => "Titanium",
            SurfaceType::TungstenCarbide => "TungstenCarbide",
            SurfaceType::Water => "Water",
        }
    }

    /// Looks a surface up by name, case-insensitively.
    pub fn from_name(name: &str) -> Option<SurfaceType> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }
}

/// Per-material ricochet overrides.
///
/// # Fields
/// * `allow_ricochets` - When false the material never deflects projectiles
/// * `limit_ricochet_angle` - Enables `ricochet_angle_cutoff`
/// * `add_ricochet_randomness` - Enables the `ricochet_probability` roll
/// * `probability_overrides_material` - Skip material calculations and rely only on the roll
/// * `ricochet_angle_cutoff` - Impacts above this angle (degrees, 90 = head on) never ricochet
/// * `ricochet_probability` - Likelihood of a ricochet in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
pub struct RicochetProperties {
    pub allow_ricochets: bool,
    pub limit_ricochet_angle: bool,
    pub add_ricochet_randomness: bool,
    pub probability_overrides_material: bool,
    pub ricochet_angle_cutoff: f64,
    pub ricochet_probability: f64,
}

impl Default for RicochetProperties {
    fn default() -> Self {
        Self {
            allow_ricochets: true,
            limit_ricochet_angle: false,
            add_ricochet_randomness: false,
            probability_overrides_material: false,
            ricochet_angle_cutoff: 80.0,
            ricochet_probability: 1.0,
        }
    }
}

/// Mechanical properties of a material in engineering units.
///
/// # Fields
/// * `density` - g/cm³
/// * `fracture_toughness` - MPa·√m
/// * `ultimate_tensile_strength` - MPa
/// * `yield_strength` - MPa; non-positive values are derived from UTS and Poisson's ratio
/// * `compressive_strength` - MPa
/// * `shear_strength` - MPa
/// * `poissons_ratio` - dimensionless
/// * `youngs_modulus` - GPa
/// * `friction` - Coefficient of friction
/// * `viscosity` - Kinematic viscosity (m²/s), fluids only
/// * `strain_rate_factor` - Dynamic hardening multiplier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysMatProperties {
    pub name: String,
    pub surface_type: SurfaceType,
    pub gameplay_tag: String,
    pub density: f64,
    pub fracture_toughness: f64,
    pub ultimate_tensile_strength: f64,
    pub yield_strength: f64,
    pub compressive_strength: f64,
    pub shear_strength: f64,
    pub poissons_ratio: f64,
    pub youngs_modulus: f64,
    pub friction: f64,
    pub viscosity: f64,
    pub strain_rate_factor: f64,
    pub is_fluid: bool,
    pub is_particulate: bool,
    pub use_custom_ricochet_properties: bool,
    pub ricochet: RicochetProperties,
}

impl Default for PhysMatProperties {
    fn default() -> Self {
        table::preset(SurfaceType::Concrete)
    }
}

/// Material properties converted to SI units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BaseUnitProperties {
    /// kg/m³
    pub density: f64,
    /// Pa·√m
    pub fracture_toughness: f64,
    /// Pa
    pub ultimate_tensile_strength: f64,
    /// Pa
    pub yield_strength: f64,
    /// Pa
    pub compressive_strength: f64,
    /// Pa
    pub shear_strength: f64,
    pub poissons_ratio: f64,
    /// Pa
    pub youngs_modulus: f64,
    pub friction: f64,
    pub viscosity: f64,
    pub strain_rate_factor: f64,
    pub is_fluid: bool,
}

impl BaseUnitProperties {
    /// Coefficient of restitution estimate, `√(σy/E)` clamped to [0, 1].
    pub fn restitution(&self) -> f64 {
        if self.youngs_modulus <= 0.0 || self.yield_strength <= 0.0 {
            return 0.0;
        }
        (self.yield_strength / self.youngs_modulus).sqrt().min(1.0)
    }

    /// Strength that resists indentation: the weaker of yield and
    /// compressive strength when both are known.
    pub fn flow_strength(&self) -> f64 {
        if self.compressive_strength > 0.0 {
            self.yield_strength.min(self.compressive_strength).max(f64::MIN_POSITIVE)
        } else {
            self.yield_strength.max(f64::MIN_POSITIVE)
        }
    }
}

impl PhysMatProperties {
    /// Creates a solid material with default friction and strain-rate factor.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        surface_type: SurfaceType,
        density: f64,
        fracture_toughness: f64,
        ultimate_tensile_strength: f64,
        yield_strength: f64,
        compressive_strength: f64,
        shear_strength: f64,
        poissons_ratio: f64,
        youngs_modulus: f64,
    ) -> Self {
        Self {
            name: surface_type.name().to_string(),
            surface_type,
            gameplay_tag: format!("PhysMat.{}", surface_type.name()),
            density,
            fracture_toughness,
            ultimate_tensile_strength,
            yield_strength,
            compressive_strength,
            shear_strength,
            poissons_ratio,
            youngs_modulus,
            friction: 0.2,
            viscosity: 0.0,
            strain_rate_factor: 1.5,
            is_fluid: false,
            is_particulate: false,
            use_custom_ricochet_properties: false,
            ricochet: RicochetProperties::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_strain_rate_factor(mut self, factor: f64) -> Self {
        self.strain_rate_factor = factor;
        self
    }

    pub fn with_fluid(mut self, viscosity: f64) -> Self {
        self.is_fluid = true;
        self.viscosity = viscosity;
        self
    }

    pub fn with_ricochet_properties(mut self, ricochet: RicochetProperties) -> Self {
        self.use_custom_ricochet_properties = true;
        self.ricochet = ricochet;
        self
    }

    /// Yield strength (MPa), derived as `UTS / (1 + ν/3)` when not given.
    pub fn yield_strength(&self) -> f64 {
        if self.yield_strength > 0.0 {
            self.yield_strength
        } else {
            self.ultimate_tensile_strength / (1.0 + self.poissons_ratio / 3.0)
        }
    }

    pub fn is_flesh(&self) -> bool {
        self.surface_type == SurfaceType::Flesh
    }

    pub fn is_bone(&self) -> bool {
        self.surface_type == SurfaceType::Bone
    }

    /// Converts to SI units.
    pub fn in_base_units(&self) -> BaseUnitProperties {
        BaseUnitProperties {
            density: g_cm3_to_kg_m3(self.density),
            fracture_toughness: mpa_to_pa(self.fracture_toughness),
            ultimate_tensile_strength: mpa_to_pa(self.ultimate_tensile_strength),
            yield_strength: mpa_to_pa(self.yield_strength()),
            compressive_strength: mpa_to_pa(self.compressive_strength),
            shear_strength: mpa_to_pa(self.shear_strength),
            poissons_ratio: self.poissons_ratio,
            youngs_modulus: gpa_to_pa(self.youngs_modulus),
            friction: self.friction,
            viscosity: self.viscosity,
            strain_rate_factor: self.strain_rate_factor,
            is_fluid: self.is_fluid,
        }
    }

    /// False when custom properties rule out any ricochet on this material.
    pub fn can_ever_ricochet(&self) -> bool {
        if !self.use_custom_ricochet_properties {
            return true;
        }
        let r = &self.ricochet;
        r.allow_ricochets
            && (!r.limit_ricochet_angle || r.ricochet_angle_cutoff > 0.0)
            && (!r.add_ricochet_randomness || r.ricochet_probability > 0.0)
    }

    pub fn uses_ricochet_roll(&self) -> bool {
        self.use_custom_ricochet_properties && self.ricochet.add_ricochet_randomness
    }

    /// Whether the roll alone decides ricochets on this material.
    pub fn probability_overrides_material(&self) -> bool {
        self.uses_ricochet_roll() && self.ricochet.probability_overrides_material
    }

    /// Impact angle (degrees from the surface) above which a solid is
    /// very unlikely to deflect a projectile.
    pub fn critical_ricochet_angle(&self) -> f64 {
        let base = self.in_base_units();
        let ratio = (base.youngs_modulus / base.yield_strength) / (2.0 * base.density);
        let mut critical = ratio.sqrt().clamp(0.0, 1.0).acos().to_degrees() * 0.85;
        if self.use_custom_ricochet_properties && self.ricochet.limit_ricochet_angle {
            critical = critical.min(self.ricochet.ricochet_angle_cutoff);
        }
        critical
    }

    /// Whether the custom probability roll (if any) allows a ricochet.
    ///
    /// # Arguments
    /// * `roll` - Uniform sample in [0, 1)
    /// * `likelihood` - Angle-dependent ricochet likelihood in [0, 1]
    pub fn roll_ricochet(&self, roll: f64, likelihood: f64) -> bool {
        if self.uses_ricochet_roll() {
            self.ricochet.ricochet_probability * likelihood >= roll
        } else {
            true
        }
    }
}
