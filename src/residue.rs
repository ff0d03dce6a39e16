//! A residue: a named group of atoms (amino acid, nucleotide, ligand,
//! solvent molecule) with an optional id and typed properties. Residues
//! refer to atoms by index in the parent topology, never by pointer.

use crate::property::{Property, PropertyMap};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Residue {
    name: String,
    id: Option<i64>,
    /// Atom indices, in insertion order, without duplicates.
    atoms: Vec<usize>,
    properties: PropertyMap,
}

impl Residue {
    pub fn new(name: impl Into<String>) -> Self {
        Residue {
            name: name.into(),
            id: None,
            atoms: Vec::new(),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_id(name: impl Into<String>, id: i64) -> Self {
        Residue {
            name: name.into(),
            id: Some(id),
            atoms: Vec::new(),
            properties: PropertyMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Add the atom at `index` to this residue. Adding an index twice is a
    /// no-op.
    pub fn add_atom(&mut self, index: usize) {
        if !self.atoms.contains(&index) {
            self.atoms.push(index);
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.atoms.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.atoms.iter().copied()
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

    /// Rewrite atom indices after the atom at `removed` was deleted from
    /// the parent topology: drop `removed`, shift larger indices down.
    pub(crate) fn atom_removed(&mut self, removed: usize) {
        self.atoms.retain(|&i| i != removed);
        for index in &mut self.atoms {
            if *index > removed {
                *index -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_no_duplicates() {
        let mut residue = Residue::new("ALA");
        residue.add_atom(4);
        residue.add_atom(2);
        residue.add_atom(4);
        residue.add_atom(7);

        assert_eq!(residue.atoms(), &[4, 2, 7]);
        assert_eq!(residue.len(), 3);
        assert!(residue.contains(2));
        assert!(!residue.contains(3));
    }

    #[test]
    fn ids_and_properties() {
        let residue = Residue::new("GLY");
        assert_eq!(residue.id(), None);

        let mut residue = Residue::with_id("GLY", 24);
        assert_eq!(residue.id(), Some(24));

        residue.set("is_standard_pdb", true);
        assert!(residue.get("is_standard_pdb").unwrap().as_bool().unwrap());
    }

    #[test]
    fn shifting_after_removal() {
        let mut residue = Residue::new("HOH");
        residue.add_atom(1);
        residue.add_atom(3);
        residue.add_atom(5);

        residue.atom_removed(3);
        assert_eq!(residue.atoms(), &[1, 4]);
    }
}
