//! A single atom: a name (as the file spells it, e.g. "CA" or "HG22"), a
//! type (element-like symbol, e.g. "C" or "H"), a mass, a charge, and
//! arbitrary typed properties. Positions are not stored here; they live in
//! the [`Frame`](crate::Frame) so per-frame arrays stay contiguous.

use crate::{
    element,
    property::{Property, PropertyMap},
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Atom {
    name: String,
    type_: String,
    mass: f64,
    charge: f64,
    properties: PropertyMap,
}

impl Atom {
    /// Create an atom whose type is the same as its `name`. The mass is
    /// taken from the periodic table when the type matches an element.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let type_ = name.clone();
        Self::with_type(name, type_)
    }

    /// Create an atom with distinct `name` and `type_`.
    pub fn with_type(name: impl Into<String>, type_: impl Into<String>) -> Self {
        let type_ = type_.into();
        let mass = element::lookup(&type_).map(|e| e.mass).unwrap_or(0.0);

        Self {
            name: name.into(),
            type_,
            mass,
            charge: 0.0,
            properties: PropertyMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn atomic_type(&self) -> &str {
        &self.type_
    }

    /// Change the atomic type. If the new type matches an element, the mass
    /// is reset from the periodic table.
    pub fn set_type(&mut self, type_: impl Into<String>) {
        self.type_ = type_.into();
        if let Some(element) = element::lookup(&self.type_) {
            self.mass = element.mass;
        }
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn set_mass(&mut self, mass: f64) {
        self.mass = mass;
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn set_charge(&mut self, charge: f64) {
        self.charge = charge;
    }

    /// Full element name ("Oxygen") for this atom's type, if it is an
    /// element symbol.
    pub fn full_name(&self) -> Option<&'static str> {
        element::lookup(&self.type_).map(|e| e.name)
    }

    pub fn vdw_radius(&self) -> Option<f64> {
        element::lookup(&self.type_).and_then(|e| e.vdw_radius)
    }

    pub fn covalent_radius(&self) -> Option<f64> {
        element::lookup(&self.type_).and_then(|e| e.covalent_radius)
    }

    pub fn atomic_number(&self) -> Option<u64> {
        element::lookup(&self.type_).map(|e| e.number)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Property>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_from_type() {
        let atom = Atom::new("O");
        assert_eq!(atom.mass(), 15.999);
        assert_eq!(atom.atomic_number(), Some(8));
        assert_eq!(atom.full_name(), Some("Oxygen"));

        let atom = Atom::with_type("OW1", "OW");
        assert_eq!(atom.mass(), 0.0);
        assert_eq!(atom.full_name(), None);
    }

    #[test]
    fn set_type_resets_mass() {
        let mut atom = Atom::new("C");
        assert_eq!(atom.mass(), 12.011);
        atom.set_type("N");
        assert_eq!(atom.mass(), 14.007);

        atom.set_mass(42.0);
        assert_eq!(atom.mass(), 42.0);
    }

    #[test]
    fn radii() {
        let atom = Atom::new("Zn");
        assert_eq!(atom.vdw_radius(), Some(1.39));
        assert_eq!(atom.covalent_radius(), Some(1.22));
    }

    #[test]
    fn properties() {
        let mut atom = Atom::new("H");
        atom.set("occupancy", 0.5);
        assert_eq!(atom.get("occupancy").unwrap().as_double().unwrap(), 0.5);
        assert!(atom.get("missing").is_none());
    }
}
