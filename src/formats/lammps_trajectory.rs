//! LAMMPS dump files (`dump atom` / `dump custom`): frames framed by
//! `ITEM:` headers, with a per-file column order declared on the
//! `ITEM: ATOMS` line. The best available position representation is
//! picked in order: unwrapped (`xu yu zu`), wrapped (`x y z`), then the
//! scaled variants which are transformed back through the box vectors.

use std::collections::HashMap;
use std::io::Write;

use lin_alg::f64::Vec3;

use crate::{
    atom::Atom,
    cell::{CellShape, UnitCell},
    error::{Error, Result},
    files::{Compression, Mode, Source, TextFile},
    formats::{Format, FormatMetadata},
    frame::Frame,
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "LAMMPS",
    extension: Some(".lammpstrj"),
    description: "LAMMPS text trajectory (dump) format",
    reference: Some("https://docs.lammps.org/dump.html"),
    read: true,
    write: true,
    memory: true,
    positions: true,
    velocities: true,
    unit_cell: true,
    atoms: true,
    bonds: false,
    residues: false,
};

pub(crate) fn builder(
    source: Source,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>> {
    Ok(Box::new(LammpsTrajectoryFormat::new(source, mode, compression)?))
}

pub(crate) struct LammpsTrajectoryFormat {
    file: TextFile,
    steps: Vec<u64>,
}

impl LammpsTrajectoryFormat {
    pub fn new(
        source: Source,
        mode: Mode,
        compression: Compression,
    ) -> Result<LammpsTrajectoryFormat> {
        let mut file = TextFile::open(source, mode, compression)?;

        let mut steps = Vec::new();
        if mode == Mode::Read {
            loop {
                let position = file.tell()?;
                let line = match file.readline_opt()? {
                    Some(line) => line,
                    None => break,
                };
                if line.starts_with("ITEM: TIMESTEP") {
                    steps.push(position);
                }
            }
            file.rewind()?;
        }

        Ok(LammpsTrajectoryFormat { file, steps })
    }

    fn expect_item(&mut self, item: &str) -> Result<String> {
        let line = self.file.readline()?;
        if !line.starts_with(&format!("ITEM: {item}")) {
            return Err(Error::Format(format!(
                "expected 'ITEM: {item}' in LAMMPS trajectory '{}', got '{line}'",
                self.file.path()
            )));
        }
        Ok(line)
    }
}

/// How to turn the selected columns into cartesian coordinates.
#[derive(Clone, Copy, PartialEq, Eq)]
enum PositionRepresentation {
    Cartesian,
    Scaled,
}

impl Format for LammpsTrajectoryFormat {
    fn name(&self) -> &'static str {
        "LAMMPS"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(self.steps.len())
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        self.expect_item("TIMESTEP")?;
        let timestep: f64 = self.file.readline()?.trim().parse().map_err(|_| {
            Error::Format(format!(
                "invalid timestep in LAMMPS trajectory '{}'",
                self.file.path()
            ))
        })?;

        self.expect_item("NUMBER OF ATOMS")?;
        let natoms: usize = self.file.readline()?.trim().parse().map_err(|_| {
            Error::Format(format!(
                "invalid atom count in LAMMPS trajectory '{}'",
                self.file.path()
            ))
        })?;

        let bounds_line = self.expect_item("BOX BOUNDS")?;
        let triclinic = bounds_line.contains("xy xz yz");
        let mut lo = [0.0f64; 3];
        let mut hi = [0.0f64; 3];
        let mut tilt = [0.0f64; 3];
        for axis in 0..3 {
            let line = self.file.readline()?;
            let fields: Vec<f64> = line
                .split_whitespace()
                .map(str::parse)
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| {
                    Error::Format(format!("invalid LAMMPS box bounds line: '{line}'"))
                })?;
            if fields.len() < 2 || (triclinic && fields.len() < 3) {
                return Err(Error::Format(format!(
                    "invalid LAMMPS box bounds line: '{line}'"
                )));
            }
            lo[axis] = fields[0];
            hi[axis] = fields[1];
            if triclinic {
                tilt[axis] = fields[2];
            }
        }
        // For triclinic boxes, LAMMPS prints the *bounding* box: recover the
        // actual edge lengths from the tilt factors.
        let (xy, xz, yz) = (tilt[0], tilt[1], tilt[2]);
        let lx = if triclinic {
            (hi[0] - 0.0f64.max(xy).max(xz).max(xy + xz))
                - (lo[0] - 0.0f64.min(xy).min(xz).min(xy + xz))
        } else {
            hi[0] - lo[0]
        };
        let ly = if triclinic {
            (hi[1] - 0.0f64.max(yz)) - (lo[1] - 0.0f64.min(yz))
        } else {
            hi[1] - lo[1]
        };
        let lz = hi[2] - lo[2];

        let cell = if lx <= 0.0 && ly <= 0.0 && lz <= 0.0 {
            UnitCell::infinite()
        } else if triclinic {
            UnitCell::from_vectors(
                Vec3::new(lx, 0.0, 0.0),
                Vec3::new(xy, ly, 0.0),
                Vec3::new(xz, yz, lz),
            )?
        } else {
            UnitCell::new([lx, ly, lz])?
        };

        let atoms_line = self.expect_item("ATOMS")?;
        let columns: Vec<&str> = atoms_line
            .trim_start_matches("ITEM: ATOMS")
            .split_whitespace()
            .collect();
        let index_of = |name: &str| columns.iter().position(|c| *c == name);

        let (position_columns, representation) = select_positions(&index_of).ok_or_else(|| {
            Error::Format(format!(
                "no usable position columns in LAMMPS trajectory '{}'",
                self.file.path()
            ))
        })?;
        let id_column = index_of("id");
        let type_column = index_of("type");
        let element_column = index_of("element");
        let charge_column = index_of("q");
        let mass_column = index_of("mass");
        let velocity_columns = match (index_of("vx"), index_of("vy"), index_of("vz")) {
            (Some(vx), Some(vy), Some(vz)) => Some([vx, vy, vz]),
            _ => None,
        };

        let mut rows: Vec<(i64, Atom, Vec3, Option<Vec3>)> = Vec::with_capacity(natoms);
        for line in self.file.readlines(natoms)? {
            let fields: Vec<&str> = line.split_whitespace().collect();

            let get = |column: usize| -> Result<f64> {
                fields
                    .get(column)
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| {
                        Error::Format(format!("invalid LAMMPS atom line: '{line}'"))
                    })
            };

            let raw = Vec3::new(
                get(position_columns[0])?,
                get(position_columns[1])?,
                get(position_columns[2])?,
            );
            let position = match representation {
                PositionRepresentation::Cartesian => raw,
                PositionRepresentation::Scaled => {
                    cell.a_vector() * raw.x + cell.b_vector() * raw.y + cell.c_vector() * raw.z
                        + Vec3::new(lo[0], lo[1], lo[2])
                }
            };

            let name = match element_column.and_then(|c| fields.get(c)) {
                Some(element) => (*element).to_owned(),
                None => match type_column.and_then(|c| fields.get(c)) {
                    Some(type_) => (*type_).to_owned(),
                    None => String::new(),
                },
            };
            let mut atom = Atom::new(name);
            if let Some(column) = charge_column {
                atom.set_charge(get(column)?);
            }
            if let Some(column) = mass_column {
                atom.set_mass(get(column)?);
            }

            let velocity = match velocity_columns {
                Some([vx, vy, vz]) => Some(Vec3::new(get(vx)?, get(vy)?, get(vz)?)),
                None => None,
            };

            let id = match id_column.and_then(|c| fields.get(c)) {
                Some(id) => id.parse().unwrap_or(rows.len() as i64 + 1),
                None => rows.len() as i64 + 1,
            };
            rows.push((id, atom, position, velocity));
        }

        // Dumps are not necessarily sorted.
        rows.sort_by_key(|(id, ..)| *id);

        let mut parsed = Frame::new();
        parsed.set_cell(cell);
        parsed.set("simulation_step", timestep);
        for (_, atom, position, velocity) in rows {
            parsed.add_atom(atom, position, velocity);
        }

        *frame = parsed;
        Ok(())
    }

    fn read_step(&mut self, step: usize, frame: &mut Frame) -> Result<()> {
        self.file.seek(self.steps[step])?;
        self.read(frame)
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let position = self.file.tell()?;

        let step = frame
            .get("simulation_step")
            .and_then(|p| p.as_double().ok())
            .unwrap_or(frame.step() as f64);
        writeln!(self.file, "ITEM: TIMESTEP")?;
        writeln!(self.file, "{}", step as i64)?;
        writeln!(self.file, "ITEM: NUMBER OF ATOMS")?;
        writeln!(self.file, "{}", frame.len())?;

        let cell = frame.cell();
        if cell.shape() == CellShape::Triclinic {
            let a = cell.a_vector();
            let b = cell.b_vector();
            let c = cell.c_vector();
            let (xy, xz, yz) = (b.x, c.x, c.y);
            writeln!(self.file, "ITEM: BOX BOUNDS xy xz yz pp pp pp")?;
            let xlo = 0.0f64.min(xy).min(xz).min(xy + xz);
            let xhi = a.x + 0.0f64.max(xy).max(xz).max(xy + xz);
            writeln!(self.file, "{xlo:e} {xhi:e} {xy:e}")?;
            writeln!(self.file, "{:e} {:e} {yz:e}", 0.0f64.min(yz), b.y + 0.0f64.max(yz))?;
            writeln!(self.file, "{:e} {:e} {:e}", 0.0, c.z, 0.0)?;
        } else {
            let [a, b, c] = cell.lengths();
            writeln!(self.file, "ITEM: BOX BOUNDS pp pp pp")?;
            writeln!(self.file, "0 {a:e}")?;
            writeln!(self.file, "0 {b:e}")?;
            writeln!(self.file, "0 {c:e}")?;
        }

        let velocities = frame.velocities();
        if velocities.is_some() {
            writeln!(self.file, "ITEM: ATOMS id type x y z vx vy vz")?;
        } else {
            writeln!(self.file, "ITEM: ATOMS id type x y z")?;
        }

        // Types are numbered by first appearance.
        let mut types: HashMap<String, usize> = HashMap::new();
        for i in 0..frame.len() {
            let atom = &frame.topology()[i];
            let next = types.len() + 1;
            let type_ = *types
                .entry(atom.atomic_type().to_owned())
                .or_insert(next);
            let p = frame.positions()[i];
            write!(self.file, "{} {} {} {} {}", i + 1, type_, p.x, p.y, p.z)?;
            if let Some(velocities) = velocities {
                let v = velocities[i];
                write!(self.file, " {} {} {}", v.x, v.y, v.z)?;
            }
            writeln!(self.file)?;
        }

        self.file.flush()?;
        self.steps.push(position);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// Pick the best positional representation available in the dump columns.
fn select_positions(
    index_of: &dyn Fn(&str) -> Option<usize>,
) -> Option<([usize; 3], PositionRepresentation)> {
    for (names, representation) in [
        (["xu", "yu", "zu"], PositionRepresentation::Cartesian),
        (["x", "y", "z"], PositionRepresentation::Cartesian),
        (["xsu", "ysu", "zsu"], PositionRepresentation::Scaled),
        (["xs", "ys", "zs"], PositionRepresentation::Scaled),
    ] {
        if let (Some(a), Some(b), Some(c)) =
            (index_of(names[0]), index_of(names[1]), index_of(names[2]))
        {
            return Some(([a, b, c], representation));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
ITEM: TIMESTEP
1000
ITEM: NUMBER OF ATOMS
2
ITEM: BOX BOUNDS pp pp pp
0 10
0 10
0 10
ITEM: ATOMS id type x y z vx vy vz
2 1 5.0 5.0 5.0 0.1 0.0 0.0
1 2 1.0 2.0 3.0 0.0 0.2 0.0
ITEM: TIMESTEP
2000
ITEM: NUMBER OF ATOMS
2
ITEM: BOX BOUNDS pp pp pp
0 10
0 10
0 10
ITEM: ATOMS id type xu yu zu
1 2 11.0 2.0 3.0
2 1 5.0 5.0 5.0
";

    #[test]
    fn dump_file() {
        let mut format = LammpsTrajectoryFormat::new(
            Source::MemoryRead(DUMP.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert_eq!(format.nsteps().unwrap(), 2);

        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();

        assert_eq!(frame.len(), 2);
        // Atoms are sorted by id, so atom 0 has type "2".
        assert_eq!(frame.topology()[0].name(), "2");
        assert_eq!(frame.positions()[0].x, 1.0);
        assert_eq!(frame.velocities().unwrap()[0].y, 0.2);
        assert_eq!(frame.cell().lengths(), [10.0, 10.0, 10.0]);
        assert_eq!(
            frame
                .get("simulation_step")
                .unwrap()
                .as_double()
                .unwrap(),
            1000.0
        );

        // Unwrapped coordinates are used as-is.
        format.read(&mut frame).unwrap();
        assert_eq!(frame.positions()[0].x, 11.0);
    }

    #[test]
    fn scaled_positions() {
        let content = "\
ITEM: TIMESTEP
0
ITEM: NUMBER OF ATOMS
1
ITEM: BOX BOUNDS pp pp pp
0 10
0 10
0 10
ITEM: ATOMS id type xs ys zs
1 1 0.5 0.25 1.0
";
        let mut format = LammpsTrajectoryFormat::new(
            Source::MemoryRead(content.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();
        assert!((frame.positions()[0].x - 5.0).abs() < 1e-9);
        assert!((frame.positions()[0].y - 2.5).abs() < 1e-9);
        assert!((frame.positions()[0].z - 10.0).abs() < 1e-9);
    }
}
