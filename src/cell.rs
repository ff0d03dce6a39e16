//! The periodic boundary box. A cell is described by six scalars (three
//! lengths in Angstroms, three angles in degrees); its matrix form uses an
//! upper-triangular convention where the columns are the cell vectors
//! **a**, **b**, **c** and **a** lies along x.

use lin_alg::f64::{Mat3, Vec3};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellShape {
    /// No periodic boundaries: zero lengths, 90 degree angles.
    Infinite,
    /// A rectangular box.
    Orthorhombic,
    /// A box with at least one non-90-degree angle.
    Triclinic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnitCell {
    shape: CellShape,
    lengths: [f64; 3],
    /// Degrees.
    angles: [f64; 3],
}

impl Default for UnitCell {
    fn default() -> Self {
        UnitCell::infinite()
    }
}

impl UnitCell {
    pub fn infinite() -> UnitCell {
        UnitCell {
            shape: CellShape::Infinite,
            lengths: [0.0; 3],
            angles: [90.0; 3],
        }
    }

    /// An orthorhombic cell. All-zero lengths give an infinite cell.
    pub fn new(lengths: [f64; 3]) -> Result<UnitCell> {
        check_lengths(&lengths)?;
        if lengths == [0.0; 3] {
            return Ok(UnitCell::infinite());
        }
        Ok(UnitCell {
            shape: CellShape::Orthorhombic,
            lengths,
            angles: [90.0; 3],
        })
    }

    /// A cell from six scalars. All-90 angles give an orthorhombic cell.
    pub fn triclinic(lengths: [f64; 3], angles: [f64; 3]) -> Result<UnitCell> {
        check_lengths(&lengths)?;
        check_angles(&angles)?;
        if angles == [90.0; 3] {
            return UnitCell::new(lengths);
        }
        Ok(UnitCell {
            shape: CellShape::Triclinic,
            lengths,
            angles,
        })
    }

    /// Build a cell from its three cell vectors (the columns of the cell
    /// matrix). Vectors that are not in the canonical upper-triangular
    /// orientation are accepted: only lengths and angles are kept.
    pub fn from_vectors(a: Vec3, b: Vec3, c: Vec3) -> Result<UnitCell> {
        let la = norm(a);
        let lb = norm(b);
        let lc = norm(c);

        if la == 0.0 && lb == 0.0 && lc == 0.0 {
            return Ok(UnitCell::infinite());
        }

        let alpha = angle_between(b, c);
        let beta = angle_between(a, c);
        let gamma = angle_between(a, b);
        UnitCell::triclinic([la, lb, lc], [round_angle(alpha), round_angle(beta), round_angle(gamma)])
    }

    pub fn shape(&self) -> CellShape {
        self.shape
    }

    pub fn lengths(&self) -> [f64; 3] {
        self.lengths
    }

    pub fn angles(&self) -> [f64; 3] {
        self.angles
    }

    /// Set the cell lengths. This is rejected on an infinite cell.
    pub fn set_lengths(&mut self, lengths: [f64; 3]) -> Result<()> {
        if self.shape == CellShape::Infinite {
            return Err(Error::Other(
                "can not set lengths on an infinite cell".to_owned(),
            ));
        }
        check_lengths(&lengths)?;
        self.lengths = lengths;
        Ok(())
    }

    /// Set the cell angles. Only triclinic cells accept this; change the
    /// shape first to set a non-90-degree angle.
    pub fn set_angles(&mut self, angles: [f64; 3]) -> Result<()> {
        if self.shape != CellShape::Triclinic {
            return Err(Error::Other(
                "can not set angles on a cell which is not triclinic".to_owned(),
            ));
        }
        check_angles(&angles)?;
        self.angles = angles;
        Ok(())
    }

    /// Change the cell shape. Transitions that would lose information are
    /// rejected: a cell must have 90 degree angles to become orthorhombic,
    /// and additionally zero lengths to become infinite.
    pub fn set_shape(&mut self, shape: CellShape) -> Result<()> {
        match shape {
            CellShape::Triclinic => {}
            CellShape::Orthorhombic => {
                if self.angles != [90.0; 3] {
                    return Err(Error::Other(
                        "can not set cell shape to orthorhombic: the angles are not all 90 degrees"
                            .to_owned(),
                    ));
                }
            }
            CellShape::Infinite => {
                if self.angles != [90.0; 3] {
                    return Err(Error::Other(
                        "can not set cell shape to infinite: the angles are not all 90 degrees"
                            .to_owned(),
                    ));
                }
                if self.lengths != [0.0; 3] {
                    return Err(Error::Other(
                        "can not set cell shape to infinite: the lengths are not all 0".to_owned(),
                    ));
                }
            }
        }
        self.shape = shape;
        Ok(())
    }

    /// First cell vector, along x: `(a, 0, 0)`.
    pub fn a_vector(&self) -> Vec3 {
        Vec3::new(self.lengths[0], 0.0, 0.0)
    }

    /// Second cell vector, in the xy plane.
    pub fn b_vector(&self) -> Vec3 {
        Vec3::new(
            self.lengths[1] * cos_degrees(self.angles[2]),
            self.lengths[1] * sin_degrees(self.angles[2]),
            0.0,
        )
    }

    /// Third cell vector.
    pub fn c_vector(&self) -> Vec3 {
        let cos_alpha = cos_degrees(self.angles[0]);
        let cos_beta = cos_degrees(self.angles[1]);
        let cos_gamma = cos_degrees(self.angles[2]);
        let sin_gamma = sin_degrees(self.angles[2]);

        let cx = self.lengths[2] * cos_beta;
        let cy = self.lengths[2] * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let cz = (self.lengths[2] * self.lengths[2] - cx * cx - cy * cy)
            .max(0.0)
            .sqrt();
        Vec3::new(cx, cy, cz)
    }

    /// The cell matrix, columns being the cell vectors. This is a pure
    /// function of the six scalars.
    pub fn matrix(&self) -> Mat3 {
        Mat3::from_cols(self.a_vector(), self.b_vector(), self.c_vector())
    }

    /// Cell volume, 0 for an infinite cell.
    pub fn volume(&self) -> f64 {
        match self.shape {
            CellShape::Infinite => 0.0,
            CellShape::Orthorhombic => self.lengths[0] * self.lengths[1] * self.lengths[2],
            CellShape::Triclinic => {
                let [alpha, beta, gamma] = self.angles.map(f64::to_radians);
                let factor = 1.0 - alpha.cos().powi(2) - beta.cos().powi(2) - gamma.cos().powi(2)
                    + 2.0 * alpha.cos() * beta.cos() * gamma.cos();
                self.lengths[0] * self.lengths[1] * self.lengths[2] * factor.max(0.0).sqrt()
            }
        }
    }

    /// Wrap `vector` into the cell, centered on the origin. The identity
    /// for infinite cells.
    pub fn wrap(&self, vector: Vec3) -> Vec3 {
        match self.shape {
            CellShape::Infinite => vector,
            CellShape::Orthorhombic => {
                let mut wrapped = vector;
                for (value, length) in [
                    (&mut wrapped.x, self.lengths[0]),
                    (&mut wrapped.y, self.lengths[1]),
                    (&mut wrapped.z, self.lengths[2]),
                ] {
                    if length > 0.0 {
                        *value -= (*value / length).round() * length;
                    }
                }
                wrapped
            }
            CellShape::Triclinic => {
                let matrix = self.matrix();
                let inverse = match matrix.inverse() {
                    Some(inverse) => inverse,
                    // Degenerate cell, nothing sensible to do.
                    None => return vector,
                };
                let mut fractional = inverse * vector;
                fractional.x -= fractional.x.round();
                fractional.y -= fractional.y.round();
                fractional.z -= fractional.z.round();
                self.matrix() * fractional
            }
        }
    }
}

fn check_lengths(lengths: &[f64; 3]) -> Result<()> {
    for &length in lengths {
        if length < 0.0 || !length.is_finite() {
            return Err(Error::Other(format!(
                "cell lengths must be positive and finite, got {length}"
            )));
        }
    }
    Ok(())
}

fn check_angles(angles: &[f64; 3]) -> Result<()> {
    for &angle in angles {
        if angle <= 0.0 || angle >= 180.0 || !angle.is_finite() {
            return Err(Error::Other(format!(
                "cell angles must be between 0 and 180 degrees, got {angle}"
            )));
        }
    }
    Ok(())
}

/// cos of an angle in degrees, exactly 0 at 90 so that orthorhombic cell
/// vectors keep exact zero components.
fn cos_degrees(angle: f64) -> f64 {
    if angle == 90.0 {
        0.0
    } else {
        angle.to_radians().cos()
    }
}

fn sin_degrees(angle: f64) -> f64 {
    if angle == 90.0 {
        1.0
    } else {
        angle.to_radians().sin()
    }
}

fn norm(v: Vec3) -> f64 {
    (v.x * v.x + v.y * v.y + v.z * v.z).sqrt()
}

/// Angle between two vectors, in degrees.
fn angle_between(a: Vec3, b: Vec3) -> f64 {
    let dot = a.x * b.x + a.y * b.y + a.z * b.z;
    let cos = (dot / (norm(a) * norm(b))).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Snap angles like 89.99999999998 back to exactly 90, so that cells built
/// from vectors keep their shape classification.
fn round_angle(angle: f64) -> f64 {
    if (angle - 90.0).abs() < 1e-10 { 90.0 } else { angle }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    #[test]
    fn shapes() {
        assert_eq!(UnitCell::infinite().shape(), CellShape::Infinite);
        assert_eq!(UnitCell::new([0.0; 3]).unwrap().shape(), CellShape::Infinite);
        assert_eq!(
            UnitCell::new([10.0, 10.0, 10.0]).unwrap().shape(),
            CellShape::Orthorhombic
        );
        assert_eq!(
            UnitCell::triclinic([10.0, 10.0, 10.0], [90.0, 90.0, 90.0])
                .unwrap()
                .shape(),
            CellShape::Orthorhombic
        );
        assert_eq!(
            UnitCell::triclinic([10.0, 10.0, 10.0], [80.0, 90.0, 90.0])
                .unwrap()
                .shape(),
            CellShape::Triclinic
        );

        assert!(UnitCell::new([-3.0, 1.0, 1.0]).is_err());
        assert!(UnitCell::triclinic([1.0; 3], [0.0, 90.0, 90.0]).is_err());
    }

    #[test]
    fn shape_transitions() {
        let mut cell = UnitCell::infinite();
        assert!(cell.set_lengths([10.0; 3]).is_err());
        assert!(cell.set_angles([80.0, 90.0, 90.0]).is_err());

        let mut cell = UnitCell::new([10.0; 3]).unwrap();
        assert!(cell.set_angles([80.0, 90.0, 90.0]).is_err());
        cell.set_shape(CellShape::Triclinic).unwrap();
        cell.set_angles([80.0, 90.0, 90.0]).unwrap();
        assert!(cell.set_shape(CellShape::Orthorhombic).is_err());

        let mut cell = UnitCell::new([10.0; 3]).unwrap();
        cell.set_lengths([5.0, 6.0, 7.0]).unwrap();
        assert!(cell.set_shape(CellShape::Infinite).is_err());
    }

    #[test]
    fn vectors_roundtrip() {
        let cell = UnitCell::triclinic([5.0, 6.0, 7.0], [80.0, 100.0, 110.0]).unwrap();
        let rebuilt = UnitCell::from_vectors(cell.a_vector(), cell.b_vector(), cell.c_vector())
            .unwrap();
        for i in 0..3 {
            assert_approx_eq!(cell.lengths()[i], rebuilt.lengths()[i], 1e-9);
            assert_approx_eq!(cell.angles()[i], rebuilt.angles()[i], 1e-9);
        }

        let cell = UnitCell::new([10.0, 11.0, 12.0]).unwrap();
        let rebuilt = UnitCell::from_vectors(cell.a_vector(), cell.b_vector(), cell.c_vector())
            .unwrap();
        assert_eq!(rebuilt.shape(), CellShape::Orthorhombic);
    }

    #[test]
    fn volume() {
        assert_eq!(UnitCell::infinite().volume(), 0.0);
        assert_eq!(UnitCell::new([2.0, 3.0, 4.0]).unwrap().volume(), 24.0);

        let cell = UnitCell::triclinic([2.0, 3.0, 4.0], [60.0, 90.0, 90.0]).unwrap();
        assert_approx_eq!(cell.volume(), 24.0 * (60f64).to_radians().sin(), 1e-9);
    }

    #[test]
    fn wrapping() {
        let v = Vec3::new(4.2, -7.1, 0.3);
        let wrapped = UnitCell::infinite().wrap(v);
        assert_eq!((wrapped.x, wrapped.y, wrapped.z), (4.2, -7.1, 0.3));

        let cell = UnitCell::new([10.0; 3]).unwrap();
        let wrapped = cell.wrap(Vec3::new(12.0, -8.0, 4.0));
        assert_approx_eq!(wrapped.x, 2.0, 1e-12);
        assert_approx_eq!(wrapped.y, 2.0, 1e-12);
        assert_approx_eq!(wrapped.z, 4.0, 1e-12);

        let cell = UnitCell::triclinic([10.0, 10.0, 10.0], [90.0, 90.0, 80.0]).unwrap();
        let wrapped = cell.wrap(Vec3::new(22.0, 0.0, 0.0));
        assert!(wrapped.x.abs() <= 10.0);
    }
}
