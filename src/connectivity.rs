//! Connectivity elements: bonds and the angles / dihedrals / impropers
//! derived from them. All tuples are stored in canonical form so that two
//! equivalent paths through the bond graph compare equal.

use std::ops::Index;

use crate::error::{Error, Result};

/// The order of a bond, as far as the file format reports it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BondOrder {
    #[default]
    Unknown,
    Single,
    Double,
    Triple,
    Quadruple,
    Quintuple,
    /// Four-and-a-half, as some aromatic metal-metal bonds are encoded.
    QuadrupleAndAHalf,
    Amide,
    Aromatic,
    /// Single bond drawn "up" in 2D formats (SMILES `/`).
    Up,
    /// Single bond drawn "down" in 2D formats (SMILES `\`).
    Down,
    /// Dative bond where the electrons come from the left atom.
    DativeLeft,
    /// Dative bond where the electrons come from the right atom.
    DativeRight,
}

/// Two bonded atoms, stored as (low, high).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bond([usize; 2]);

impl Bond {
    pub fn new(i: usize, j: usize) -> Result<Bond> {
        if i == j {
            return Err(Error::Other(format!(
                "can not have a bond between an atom and itself (index {i})"
            )));
        }
        Ok(Bond([i.min(j), i.max(j)]))
    }
}

impl Index<usize> for Bond {
    type Output = usize;

    fn index(&self, index: usize) -> &usize {
        &self.0[index]
    }
}

/// Three atoms `i-j-k` forming an angle around `j`, stored with `i < k`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Angle([usize; 3]);

impl Angle {
    pub fn new(i: usize, j: usize, k: usize) -> Result<Angle> {
        if i == j || j == k || i == k {
            return Err(Error::Other(
                "atoms in an angle must be all distinct".to_owned(),
            ));
        }
        Ok(Angle([i.min(k), j, i.max(k)]))
    }
}

impl Index<usize> for Angle {
    type Output = usize;

    fn index(&self, index: usize) -> &usize {
        &self.0[index]
    }
}

/// Four atoms `i-j-k-m` bonded along a path, stored with the two central
/// atoms ordered (`j < k`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dihedral([usize; 4]);

impl Dihedral {
    pub fn new(i: usize, j: usize, k: usize, m: usize) -> Result<Dihedral> {
        let indexes = [i, j, k, m];
        for (n, &a) in indexes.iter().enumerate() {
            for &b in &indexes[n + 1..] {
                if a == b {
                    return Err(Error::Other(
                        "atoms in a dihedral angle must be all distinct".to_owned(),
                    ));
                }
            }
        }

        if j < k {
            Ok(Dihedral([i, j, k, m]))
        } else {
            Ok(Dihedral([m, k, j, i]))
        }
    }
}

impl Index<usize> for Dihedral {
    type Output = usize;

    fn index(&self, index: usize) -> &usize {
        &self.0[index]
    }
}

/// An improper dihedral: three peripheral atoms all bonded to a central
/// one. Stored as `(p, center, q, r)` with the peripherals sorted
/// (`p < q < r`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Improper([usize; 4]);

impl Improper {
    pub fn new(i: usize, center: usize, j: usize, k: usize) -> Result<Improper> {
        let indexes = [i, center, j, k];
        for (n, &a) in indexes.iter().enumerate() {
            for &b in &indexes[n + 1..] {
                if a == b {
                    return Err(Error::Other(
                        "atoms in an improper angle must be all distinct".to_owned(),
                    ));
                }
            }
        }

        let mut peripheral = [i, j, k];
        peripheral.sort_unstable();
        Ok(Improper([
            peripheral[0],
            center,
            peripheral[1],
            peripheral[2],
        ]))
    }
}

impl Index<usize> for Improper {
    type Output = usize;

    fn index(&self, index: usize) -> &usize {
        &self.0[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_forms() {
        assert_eq!(Bond::new(5, 2).unwrap(), Bond::new(2, 5).unwrap());
        assert_eq!(Angle::new(4, 1, 2).unwrap(), Angle::new(2, 1, 4).unwrap());
        assert_eq!(
            Dihedral::new(0, 3, 1, 2).unwrap(),
            Dihedral::new(2, 1, 3, 0).unwrap()
        );
        assert_eq!(
            Improper::new(7, 1, 3, 5).unwrap(),
            Improper::new(5, 1, 7, 3).unwrap()
        );

        let improper = Improper::new(7, 1, 3, 5).unwrap();
        assert_eq!(improper[0], 3);
        assert_eq!(improper[1], 1);
        assert_eq!(improper[2], 5);
        assert_eq!(improper[3], 7);
    }

    #[test]
    fn distinct_atoms_required() {
        assert!(Bond::new(2, 2).is_err());
        assert!(Angle::new(1, 1, 2).is_err());
        assert!(Dihedral::new(0, 1, 2, 0).is_err());
        assert!(Improper::new(0, 1, 2, 1).is_err());
    }
}
