//! The graph structure over atoms: bonds (with orders), the derived
//! angles / dihedrals / impropers, and residues. Angles and everything
//! above are recomputed whenever the bond list or the atom count changes;
//! they can not be set from outside.

use std::collections::{BTreeSet, HashMap};
use std::ops::{Index, IndexMut};

use crate::{
    atom::Atom,
    connectivity::{Angle, Bond, BondOrder, Dihedral, Improper},
    error::{Error, Result},
    residue::Residue,
};

#[derive(Clone, Debug, Default)]
pub struct Topology {
    atoms: Vec<Atom>,
    /// Sorted canonical bonds, paralleled by `bond_orders`.
    bonds: Vec<Bond>,
    bond_orders: Vec<BondOrder>,
    angles: Vec<Angle>,
    dihedrals: Vec<Dihedral>,
    impropers: Vec<Improper>,
    residues: Vec<Residue>,
    /// atom index → residue index, maintained alongside `residues`.
    residue_of: HashMap<usize, usize>,
}

impl Topology {
    pub fn new() -> Topology {
        Topology::default()
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn add_atom(&mut self, atom: Atom) {
        self.atoms.push(atom);
    }

    /// Remove the atom at `index`. All connectivity referring to it is
    /// dropped, and indices above it shift down by one.
    pub fn remove(&mut self, index: usize) -> Result<()> {
        if index >= self.atoms.len() {
            return Err(Error::OutOfBounds(format!(
                "can not remove atom {index} from a topology with {} atoms",
                self.atoms.len()
            )));
        }
        self.atoms.remove(index);

        let mut bonds = Vec::with_capacity(self.bonds.len());
        let mut orders = Vec::with_capacity(self.bonds.len());
        for (bond, order) in self.bonds.iter().zip(&self.bond_orders) {
            if bond[0] == index || bond[1] == index {
                continue;
            }
            let shift = |i: usize| if i > index { i - 1 } else { i };
            // Shifting both endpoints by the same amount keeps them distinct.
            bonds.push(Bond::new(shift(bond[0]), shift(bond[1])).expect("shifted bond"));
            orders.push(*order);
        }
        self.bonds = bonds;
        self.bond_orders = orders;

        for residue in &mut self.residues {
            residue.atom_removed(index);
        }
        self.rebuild_residue_map();
        self.recompute_derived();
        Ok(())
    }

    /// Resize to `size` atoms. Growing appends default atoms; shrinking is
    /// rejected if it would break a bond.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        for bond in &self.bonds {
            if bond[1] >= size {
                return Err(Error::Other(format!(
                    "can not resize the topology to {size} as there is a bond between atoms {} and {}",
                    bond[0], bond[1]
                )));
            }
        }
        self.atoms.resize_with(size, Atom::default);
        self.recompute_derived();
        Ok(())
    }

    pub fn add_bond(&mut self, i: usize, j: usize) -> Result<()> {
        self.add_bond_with_order(i, j, BondOrder::Unknown)
    }

    pub fn add_bond_with_order(&mut self, i: usize, j: usize, order: BondOrder) -> Result<()> {
        self.check_atom(i, "add a bond")?;
        self.check_atom(j, "add a bond")?;
        let bond = Bond::new(i, j)?;

        match self.bonds.binary_search(&bond) {
            Ok(position) => {
                // The bond already exists: only update an unknown order.
                if self.bond_orders[position] == BondOrder::Unknown {
                    self.bond_orders[position] = order;
                }
            }
            Err(position) => {
                self.bonds.insert(position, bond);
                self.bond_orders.insert(position, order);
                self.recompute_derived();
            }
        }
        Ok(())
    }

    pub fn remove_bond(&mut self, i: usize, j: usize) -> Result<()> {
        self.check_atom(i, "remove a bond")?;
        self.check_atom(j, "remove a bond")?;
        let bond = Bond::new(i, j)?;
        if let Ok(position) = self.bonds.binary_search(&bond) {
            self.bonds.remove(position);
            self.bond_orders.remove(position);
            self.recompute_derived();
        }
        Ok(())
    }

    pub fn clear_bonds(&mut self) {
        self.bonds.clear();
        self.bond_orders.clear();
        self.recompute_derived();
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bond_orders(&self) -> &[BondOrder] {
        &self.bond_orders
    }

    pub fn bond_order(&self, i: usize, j: usize) -> Result<BondOrder> {
        let bond = Bond::new(i, j)?;
        match self.bonds.binary_search(&bond) {
            Ok(position) => Ok(self.bond_orders[position]),
            Err(_) => Err(Error::OutOfBounds(format!(
                "there is no bond between atoms {i} and {j}"
            ))),
        }
    }

    pub fn angles(&self) -> &[Angle] {
        &self.angles
    }

    pub fn dihedrals(&self) -> &[Dihedral] {
        &self.dihedrals
    }

    pub fn impropers(&self) -> &[Improper] {
        &self.impropers
    }

    /// Add a residue. Every atom of the residue must exist and belong to no
    /// other residue.
    pub fn add_residue(&mut self, residue: Residue) -> Result<()> {
        for index in residue.iter() {
            if index >= self.atoms.len() {
                return Err(Error::OutOfBounds(format!(
                    "residue '{}' contains atom {index}, but the topology only has {} atoms",
                    residue.name(),
                    self.atoms.len()
                )));
            }
            if self.residue_of.contains_key(&index) {
                return Err(Error::Other(format!(
                    "atom {index} is already in another residue"
                )));
            }
        }

        let position = self.residues.len();
        for index in residue.iter() {
            self.residue_of.insert(index, position);
        }
        self.residues.push(residue);
        Ok(())
    }

    pub fn residues(&self) -> &[Residue] {
        &self.residues
    }

    /// Add the atom at `atom` to the residue at `residue`. A no-op when the
    /// atom is already there; an error when it belongs to another residue.
    pub(crate) fn add_atom_to_residue(&mut self, residue: usize, atom: usize) -> Result<()> {
        if atom >= self.atoms.len() {
            return Err(Error::OutOfBounds(format!(
                "can not add atom {atom} to a residue: the topology only has {} atoms",
                self.atoms.len()
            )));
        }
        if residue >= self.residues.len() {
            return Err(Error::OutOfBounds(format!(
                "no residue at index {residue} in this topology"
            )));
        }
        if let Some(&existing) = self.residue_of.get(&atom) {
            if existing != residue {
                return Err(Error::Other(format!(
                    "atom {atom} is already in another residue"
                )));
            }
            return Ok(());
        }
        self.residues[residue].add_atom(atom);
        self.residue_of.insert(atom, residue);
        Ok(())
    }

    pub fn residue(&self, index: usize) -> Option<&Residue> {
        self.residues.get(index)
    }

    /// The residue containing the atom at `index`, if any.
    pub fn residue_for_atom(&self, index: usize) -> Option<&Residue> {
        self.residue_of.get(&index).map(|&r| &self.residues[r])
    }

    fn check_atom(&self, index: usize, action: &str) -> Result<()> {
        if index >= self.atoms.len() {
            return Err(Error::OutOfBounds(format!(
                "can not {action} with atom {index}: the topology only has {} atoms",
                self.atoms.len()
            )));
        }
        Ok(())
    }

    fn rebuild_residue_map(&mut self) {
        self.residue_of.clear();
        for (position, residue) in self.residues.iter().enumerate() {
            for index in residue.iter() {
                self.residue_of.insert(index, position);
            }
        }
    }

    fn recompute_derived(&mut self) {
        let size = self.atoms.len();
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); size];
        for bond in &self.bonds {
            neighbors[bond[0]].push(bond[1]);
            neighbors[bond[1]].push(bond[0]);
        }
        for list in &mut neighbors {
            list.sort_unstable();
        }

        let mut angles = BTreeSet::new();
        for (j, around) in neighbors.iter().enumerate() {
            for (n, &i) in around.iter().enumerate() {
                for &k in &around[n + 1..] {
                    angles.insert(Angle::new(i, j, k).expect("distinct atoms"));
                }
            }
        }

        let mut dihedrals = BTreeSet::new();
        for bond in &self.bonds {
            let (j, k) = (bond[0], bond[1]);
            for &i in &neighbors[j] {
                if i == k {
                    continue;
                }
                for &m in &neighbors[k] {
                    if m == j || m == i {
                        continue;
                    }
                    dihedrals.insert(Dihedral::new(i, j, k, m).expect("distinct atoms"));
                }
            }
        }

        let mut impropers = BTreeSet::new();
        for (center, around) in neighbors.iter().enumerate() {
            if around.len() < 3 {
                continue;
            }
            for (a, &p) in around.iter().enumerate() {
                for (b, &q) in around.iter().enumerate().skip(a + 1) {
                    for &r in &around[b + 1..] {
                        impropers.insert(Improper::new(p, center, q, r).expect("distinct atoms"));
                    }
                }
            }
        }

        self.angles = angles.into_iter().collect();
        self.dihedrals = dihedrals.into_iter().collect();
        self.impropers = impropers.into_iter().collect();
    }
}

impl Index<usize> for Topology {
    type Output = Atom;

    fn index(&self, index: usize) -> &Atom {
        &self.atoms[index]
    }
}

impl IndexMut<usize> for Topology {
    fn index_mut(&mut self, index: usize) -> &mut Atom {
        &mut self.atoms[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water() -> Topology {
        let mut topology = Topology::new();
        topology.add_atom(Atom::new("H"));
        topology.add_atom(Atom::new("O"));
        topology.add_atom(Atom::new("H"));
        topology.add_bond(0, 1).unwrap();
        topology.add_bond(2, 1).unwrap();
        topology
    }

    #[test]
    fn bonds_are_canonical_and_sorted() {
        let topology = water();
        assert_eq!(topology.bonds(), &[
            Bond::new(0, 1).unwrap(),
            Bond::new(1, 2).unwrap(),
        ]);
    }

    #[test]
    fn derived_angles() {
        let topology = water();
        assert_eq!(topology.angles(), &[Angle::new(0, 1, 2).unwrap()]);
        assert!(topology.dihedrals().is_empty());
        assert!(topology.impropers().is_empty());
    }

    #[test]
    fn derived_dihedrals_and_impropers() {
        // A four atom chain: 0-1-2-3
        let mut topology = Topology::new();
        for _ in 0..4 {
            topology.add_atom(Atom::new("C"));
        }
        topology.add_bond(0, 1).unwrap();
        topology.add_bond(1, 2).unwrap();
        topology.add_bond(2, 3).unwrap();
        assert_eq!(topology.dihedrals(), &[Dihedral::new(0, 1, 2, 3).unwrap()]);

        // Methane-like: 4 hydrogens around atom 0
        let mut topology = Topology::new();
        topology.add_atom(Atom::new("C"));
        for _ in 0..4 {
            topology.add_atom(Atom::new("H"));
        }
        for i in 1..5 {
            topology.add_bond(0, i).unwrap();
        }
        assert_eq!(topology.angles().len(), 6);
        assert_eq!(topology.impropers().len(), 4);
        for improper in topology.impropers() {
            assert_eq!(improper[1], 0);
            assert!(improper[0] < improper[2] && improper[2] < improper[3]);
        }
    }

    #[test]
    fn bond_orders() {
        let mut topology = water();
        assert_eq!(topology.bond_order(0, 1).unwrap(), BondOrder::Unknown);

        topology
            .add_bond_with_order(0, 1, BondOrder::Single)
            .unwrap();
        assert_eq!(topology.bond_order(0, 1).unwrap(), BondOrder::Single);
        assert!(topology.bond_order(0, 2).is_err());
    }

    #[test]
    fn removing_atoms_shifts_connectivity() {
        let mut topology = Topology::new();
        for _ in 0..4 {
            topology.add_atom(Atom::new("C"));
        }
        topology.add_bond(0, 1).unwrap();
        topology.add_bond(1, 2).unwrap();
        topology.add_bond(2, 3).unwrap();

        topology.remove(0).unwrap();
        assert_eq!(topology.len(), 3);
        assert_eq!(topology.bonds(), &[
            Bond::new(0, 1).unwrap(),
            Bond::new(1, 2).unwrap(),
        ]);
        assert_eq!(topology.angles(), &[Angle::new(0, 1, 2).unwrap()]);
    }

    #[test]
    fn resize_rules() {
        let mut topology = water();
        assert!(topology.resize(2).is_err());
        topology.resize(5).unwrap();
        assert_eq!(topology.len(), 5);
        assert_eq!(topology[4].name(), "");
        topology.clear_bonds();
        topology.resize(2).unwrap();
    }

    #[test]
    fn residues() {
        let mut topology = water();
        let mut residue = Residue::with_id("HOH", 1);
        residue.add_atom(0);
        residue.add_atom(1);
        topology.add_residue(residue).unwrap();

        assert_eq!(topology.residue_for_atom(0).unwrap().name(), "HOH");
        assert!(topology.residue_for_atom(2).is_none());

        let mut overlapping = Residue::new("BAD");
        overlapping.add_atom(1);
        assert!(topology.add_residue(overlapping).is_err());

        let mut out_of_range = Residue::new("BAD");
        out_of_range.add_atom(12);
        assert!(matches!(
            topology.add_residue(out_of_range),
            Err(Error::OutOfBounds(_))
        ));
    }
}
