//! A single snapshot along a trajectory: positions (and optionally
//! velocities) for every atom, a topology, a unit cell, a step number, and
//! frame-level properties. The per-atom arrays and the topology are kept
//! the same length at all times.

use lin_alg::f64::Vec3;

use crate::{
    atom::Atom,
    cell::UnitCell,
    error::{Error, Result},
    property::{Property, PropertyMap},
    topology::Topology,
};

#[derive(Clone, Debug, Default)]
pub struct Frame {
    step: usize,
    positions: Vec<Vec3>,
    velocities: Option<Vec<Vec3>>,
    topology: Topology,
    cell: UnitCell,
    properties: PropertyMap,
}

impl Frame {
    pub fn new() -> Frame {
        Frame::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn set_step(&mut self, step: usize) {
        self.step = step;
    }

    pub fn cell(&self) -> &UnitCell {
        &self.cell
    }

    pub fn set_cell(&mut self, cell: UnitCell) {
        self.cell = cell;
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Replace the topology. The new topology must describe the same number
    /// of atoms as this frame contains.
    pub fn set_topology(&mut self, topology: Topology) -> Result<()> {
        if topology.len() != self.len() {
            return Err(Error::Other(format!(
                "the topology contains {} atoms, but the frame contains {} atoms",
                topology.len(),
                self.len()
            )));
        }
        self.topology = topology;
        Ok(())
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Vec3] {
        &mut self.positions
    }

    pub fn velocities(&self) -> Option<&[Vec3]> {
        self.velocities.as_deref()
    }

    pub fn velocities_mut(&mut self) -> Option<&mut [Vec3]> {
        self.velocities.as_deref_mut()
    }

    /// Add zeroed velocity storage to this frame if not already present.
    pub fn add_velocities(&mut self) {
        if self.velocities.is_none() {
            self.velocities = Some(vec![Vec3::new_zero(); self.positions.len()]);
        }
    }

    /// Add an atom with its position, and optionally its velocity. The
    /// position, velocity, and topology entries are pushed together.
    pub fn add_atom(&mut self, atom: Atom, position: Vec3, velocity: Option<Vec3>) {
        self.topology.add_atom(atom);
        self.positions.push(position);
        if let Some(velocities) = &mut self.velocities {
            velocities.push(velocity.unwrap_or_else(Vec3::new_zero));
        } else if let Some(velocity) = velocity {
            self.add_velocities();
            if let Some(velocities) = &mut self.velocities {
                *velocities.last_mut().expect("just pushed an atom") = velocity;
            }
        }
    }

    /// Remove the atom at `index` from positions, velocities, and topology
    /// together.
    pub fn remove(&mut self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(Error::OutOfBounds(format!(
                "can not remove atom {index} from a frame with {} atoms",
                self.len()
            )));
        }
        self.topology.remove(index)?;
        self.positions.remove(index);
        if let Some(velocities) = &mut self.velocities {
            velocities.remove(index);
        }
        Ok(())
    }

    /// Resize positions, velocities, and topology together. Shrinking fails
    /// if it would break a bond.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        self.topology.resize(size)?;
        self.positions.resize_with(size, Vec3::new_zero);
        if let Some(velocities) = &mut self.velocities {
            velocities.resize_with(size, Vec3::new_zero);
        }
        Ok(())
    }

    /// Remove all atoms, keeping the cell and step.
    pub fn clear(&mut self) {
        self.topology = Topology::new();
        self.positions.clear();
        self.velocities = None;
        self.properties.clear();
    }

    pub fn add_bond(&mut self, i: usize, j: usize) -> Result<()> {
        self.topology.add_bond(i, j)
    }

    pub fn add_bond_with_order(
        &mut self,
        i: usize,
        j: usize,
        order: crate::connectivity::BondOrder,
    ) -> Result<()> {
        self.topology.add_bond_with_order(i, j, order)
    }

    pub(crate) fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
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

    /// Distance between atoms `i` and `j`, wrapped by the unit cell, in
    /// Angstroms.
    pub fn distance(&self, i: usize, j: usize) -> Result<f64> {
        self.check_atom(i)?;
        self.check_atom(j)?;
        let rij = self.cell.wrap(self.positions[j] - self.positions[i]);
        Ok(norm(rij))
    }

    /// Angle formed by atoms `i-j-k`, in radians.
    pub fn angle(&self, i: usize, j: usize, k: usize) -> Result<f64> {
        self.check_atom(i)?;
        self.check_atom(j)?;
        self.check_atom(k)?;
        let u = self.cell.wrap(self.positions[i] - self.positions[j]);
        let v = self.cell.wrap(self.positions[k] - self.positions[j]);
        let cos = (dot(u, v) / (norm(u) * norm(v))).clamp(-1.0, 1.0);
        Ok(cos.acos())
    }

    /// Dihedral angle along the `i-j-k-m` path, in radians.
    pub fn dihedral(&self, i: usize, j: usize, k: usize, m: usize) -> Result<f64> {
        self.check_atom(i)?;
        self.check_atom(j)?;
        self.check_atom(k)?;
        self.check_atom(m)?;
        let r12 = self.cell.wrap(self.positions[j] - self.positions[i]);
        let r23 = self.cell.wrap(self.positions[k] - self.positions[j]);
        let r34 = self.cell.wrap(self.positions[m] - self.positions[k]);

        let a = cross(r12, r23);
        let b = cross(r23, r34);
        Ok(f64::atan2(norm(r23) * dot(r12, b), dot(a, b)))
    }

    /// Signed distance between atom `j` and the plane through atom `i`
    /// spanned by the `i→k` and `i→m` directions, in Angstroms.
    pub fn out_of_plane(&self, i: usize, j: usize, k: usize, m: usize) -> Result<f64> {
        self.check_atom(i)?;
        self.check_atom(j)?;
        self.check_atom(k)?;
        self.check_atom(m)?;
        let rij = self.cell.wrap(self.positions[j] - self.positions[i]);
        let rik = self.cell.wrap(self.positions[k] - self.positions[i]);
        let rim = self.cell.wrap(self.positions[m] - self.positions[i]);

        let n = cross(rik, rim);
        let norm_n = norm(n);
        if norm_n < 1e-12 {
            // Degenerate plane, fall back to the plain distance.
            return Ok(norm(rij));
        }
        Ok(dot(rij, n) / norm_n)
    }

    /// Add bonds from a distance heuristic: two atoms closer than 1.2 times
    /// the sum of their covalent radii (and farther apart than 0.03 A) are
    /// considered bonded. Atoms without a known covalent radius never bond.
    pub fn guess_bonds(&mut self) -> Result<()> {
        let radii: Vec<Option<f64>> = self
            .topology
            .atoms()
            .iter()
            .map(|atom| atom.covalent_radius())
            .collect();

        let mut found = Vec::new();
        for i in 0..self.len() {
            let Some(ri) = radii[i] else { continue };
            for j in (i + 1)..self.len() {
                let Some(rj) = radii[j] else { continue };
                let distance = self.distance(i, j)?;
                if distance > 0.03 && distance < 1.2 * (ri + rj) {
                    found.push((i, j));
                }
            }
        }

        for (i, j) in found {
            self.topology.add_bond(i, j)?;
        }
        Ok(())
    }

    fn check_atom(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(Error::OutOfBounds(format!(
                "atom index {index} is out of bounds in a frame with {} atoms",
                self.len()
            )));
        }
        Ok(())
    }
}

pub(crate) fn dot(a: Vec3, b: Vec3) -> f64 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

pub(crate) fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

pub(crate) fn norm(v: Vec3) -> f64 {
    dot(v, v).sqrt()
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    fn water() -> Frame {
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("O"), Vec3::new(0.0, 0.0, 0.0), None);
        frame.add_atom(Atom::new("H"), Vec3::new(0.0, 0.757, 0.587), None);
        frame.add_atom(Atom::new("H"), Vec3::new(0.0, -0.757, 0.587), None);
        frame
    }

    #[test]
    fn sizes_stay_consistent() {
        let mut frame = water();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.topology().len(), 3);
        assert!(frame.velocities().is_none());

        frame.add_velocities();
        assert_eq!(frame.velocities().unwrap().len(), 3);

        frame.add_atom(Atom::new("He"), Vec3::new(4.0, 4.0, 4.0), None);
        assert_eq!(frame.positions().len(), 4);
        assert_eq!(frame.velocities().unwrap().len(), 4);
        assert_eq!(frame.topology().len(), 4);

        frame.remove(0).unwrap();
        assert_eq!(frame.positions().len(), 3);
        assert_eq!(frame.velocities().unwrap().len(), 3);
        assert_eq!(frame.topology().len(), 3);

        frame.resize(10).unwrap();
        assert_eq!(frame.positions().len(), 10);
        assert_eq!(frame.velocities().unwrap().len(), 10);
        assert_eq!(frame.topology().len(), 10);
    }

    #[test]
    fn velocity_on_add_atom() {
        let mut frame = Frame::new();
        frame.add_atom(
            Atom::new("O"),
            Vec3::new(0.0, 0.0, 0.0),
            Some(Vec3::new(1.0, 2.0, 3.0)),
        );
        assert_eq!(frame.velocities().unwrap()[0].y, 2.0);
    }

    #[test]
    fn topology_size_check() {
        let mut frame = water();
        assert!(frame.set_topology(Topology::new()).is_err());

        let mut topology = Topology::new();
        for name in ["O", "H", "H"] {
            topology.add_atom(Atom::new(name));
        }
        frame.set_topology(topology).unwrap();
    }

    #[test]
    fn geometry() {
        let frame = water();
        assert_approx_eq!(frame.distance(0, 1).unwrap(), 0.9584, 1e-3);
        assert_approx_eq!(
            frame.angle(1, 0, 2).unwrap(),
            104.45f64.to_radians(),
            1e-2
        );
        assert!(matches!(
            frame.distance(0, 12),
            Err(Error::OutOfBounds(_))
        ));
    }

    #[test]
    fn geometry_with_pbc() {
        let mut frame = Frame::new();
        frame.set_cell(UnitCell::new([10.0; 3]).unwrap());
        frame.add_atom(Atom::new("O"), Vec3::new(0.5, 0.0, 0.0), None);
        frame.add_atom(Atom::new("O"), Vec3::new(9.5, 0.0, 0.0), None);
        assert_approx_eq!(frame.distance(0, 1).unwrap(), 1.0, 1e-9);
    }

    #[test]
    fn dihedral_angle() {
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("C"), Vec3::new(1.0, 0.0, 0.0), None);
        frame.add_atom(Atom::new("C"), Vec3::new(0.0, 0.0, 0.0), None);
        frame.add_atom(Atom::new("C"), Vec3::new(0.0, 1.0, 0.0), None);
        frame.add_atom(Atom::new("C"), Vec3::new(-1.0, 1.0, 0.0), None);
        assert_approx_eq!(
            frame.dihedral(0, 1, 2, 3).unwrap().abs(),
            std::f64::consts::PI,
            1e-9
        );
    }

    #[test]
    fn bond_guessing() {
        let mut frame = water();
        frame.guess_bonds().unwrap();
        assert_eq!(frame.topology().bonds().len(), 2);
        assert_eq!(frame.topology().angles().len(), 1);
    }
}
