//! Surface materials: per-band absorption and diffusion coefficients.

use crate::float_types::Real;
use log::warn;
use std::collections::HashMap;

/// Number of frequency bands carried per material.
pub const NUM_BANDS: usize = 10;

/// Acoustic coefficients of one surface material.
///
/// The default material is fully reflective (zero absorption, zero
/// diffusion), which is also the fallback for unknown material names.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub absorption: [Real; NUM_BANDS],
    pub diffusion: [Real; NUM_BANDS],
}

impl Default for Material {
    fn default() -> Self {
        Material {
            absorption: [0.0; NUM_BANDS],
            diffusion: [0.0; NUM_BANDS],
        }
    }
}

impl Material {
    /// Uniform absorption across all bands, no diffusion.
    pub fn uniform(absorption: Real) -> Self {
        Material {
            absorption: [absorption; NUM_BANDS],
            diffusion: [0.0; NUM_BANDS],
        }
    }

    /// Per-band reflectance `1 - absorption`.
    pub fn reflectance(&self) -> [Real; NUM_BANDS] {
        let mut r = [0.0; NUM_BANDS];
        for (r, a) in r.iter_mut().zip(self.absorption.iter()) {
            *r = 1.0 - a;
        }
        r
    }
}

/// A name-keyed material database.
#[derive(Debug, Clone, Default)]
pub struct MaterialLibrary {
    materials: HashMap<String, Material>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a material; a second insert under the same name replaces the
    /// first and returns it.
    pub fn insert(&mut self, name: impl Into<String>, material: Material) -> Option<Material> {
        self.materials.insert(name.into(), material)
    }

    /// Look up a material by name, falling back to the fully reflective
    /// default for names the library does not know.
    pub fn get(&self, name: &str) -> Material {
        match self.materials.get(name) {
            Some(m) => *m,
            None => {
                warn!("unknown material '{name}', using default");
                Material::default()
            },
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.materials.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_material_falls_back_to_default() {
        let lib = MaterialLibrary::new();
        assert_eq!(lib.get("concrete"), Material::default());
    }

    #[test]
    fn insert_and_get() {
        let mut lib = MaterialLibrary::new();
        lib.insert("carpet", Material::uniform(0.4));
        assert_eq!(lib.get("carpet").absorption[0], 0.4);
        assert_eq!(lib.get("carpet").reflectance()[3], 0.6);
    }
}
