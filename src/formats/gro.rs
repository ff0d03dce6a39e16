//! GROMACS GRO files: fixed-column atom lines with optional velocities and
//! a box line. GRO stores nanometers; everything is converted to Angstroms
//! in memory.

use std::io::Write;

use lin_alg::f64::Vec3;

use crate::{
    atom::Atom,
    cell::{CellShape, UnitCell},
    error::{Error, Result},
    files::{Compression, Mode, Source, TextFile},
    formats::{Format, FormatMetadata},
    frame::Frame,
    residue::Residue,
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "GRO",
    extension: Some(".gro"),
    description: "GROMACS GRO text format",
    reference: Some("http://manual.gromacs.org/current/reference-manual/file-formats.html#gro"),
    read: true,
    write: true,
    memory: true,
    positions: true,
    velocities: true,
    unit_cell: true,
    atoms: true,
    bonds: false,
    residues: true,
};

pub(crate) fn builder(
    source: Source,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>> {
    Ok(Box::new(GroFormat::new(source, mode, compression)?))
}

const NM_TO_ANGSTROM: f64 = 10.0;

pub(crate) struct GroFormat {
    file: TextFile,
    steps: Vec<u64>,
}

impl GroFormat {
    pub fn new(source: Source, mode: Mode, compression: Compression) -> Result<GroFormat> {
        let mut file = TextFile::open(source, mode, compression)?;

        let mut steps = Vec::new();
        if mode == Mode::Read {
            loop {
                let position = file.tell()?;
                // Title line; tolerate blank lines at the end of the file.
                match file.readline_opt()? {
                    Some(title) if title.trim().is_empty() && file.eof() => break,
                    Some(_) => {}
                    None => break,
                }
                let natoms: usize = file.readline()?.trim().parse().map_err(|_| {
                    Error::Format(format!(
                        "invalid atom count in GRO file '{}'",
                        file.path()
                    ))
                })?;
                // Atom lines and the box line
                file.readlines(natoms + 1).map_err(|_| {
                    Error::Format(format!(
                        "not enough lines in '{}' for GRO format",
                        file.path()
                    ))
                })?;
                steps.push(position);
            }
            file.rewind()?;
        }

        Ok(GroFormat { file, steps })
    }
}

impl Format for GroFormat {
    fn name(&self) -> &'static str {
        "GRO"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(self.steps.len())
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        let title = self.file.readline()?;
        let natoms: usize = self.file.readline()?.trim().parse().map_err(|_| {
            Error::Format(format!(
                "invalid atom count in GRO file '{}'",
                self.file.path()
            ))
        })?;

        let mut parsed = Frame::new();
        if !title.trim().is_empty() {
            parsed.set("name", title.trim());
        }

        let mut residues: Vec<((i64, String), Residue)> = Vec::new();
        for line in self.file.readlines(natoms)? {
            let (atom, resid, resname, position, velocity) = read_atom_line(&line)?;

            let index = parsed.len();
            parsed.add_atom(atom, position, velocity);

            let key = (resid, resname.clone());
            match residues.iter_mut().find(|(k, _)| *k == key) {
                Some((_, residue)) => residue.add_atom(index),
                None => {
                    let mut residue = Residue::with_id(resname, resid);
                    residue.add_atom(index);
                    residues.push((key, residue));
                }
            }
        }
        for (_, residue) in residues {
            parsed.topology_mut().add_residue(residue)?;
        }

        parsed.set_cell(read_box_line(&self.file.readline()?)?);

        *frame = parsed;
        Ok(())
    }

    fn read_step(&mut self, step: usize, frame: &mut Frame) -> Result<()> {
        self.file.seek(self.steps[step])?;
        self.read(frame)
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let position = self.file.tell()?;

        match frame.get("name").and_then(|p| p.as_string().ok()) {
            Some(name) => writeln!(self.file, "{name}")?,
            None => writeln!(self.file, "Written by the mol_files library")?,
        }
        writeln!(self.file, "{:>5}", frame.len())?;

        let topology = frame.topology();
        let velocities = frame.velocities();
        for i in 0..frame.len() {
            let residue = topology.residue_for_atom(i);
            let resid = residue.and_then(|r| r.id()).unwrap_or(i as i64 + 1);
            let resname = residue.map(|r| r.name()).unwrap_or("XXX");

            let p = frame.positions()[i] / NM_TO_ANGSTROM;
            write!(
                self.file,
                "{:>5}{:<5}{:>5}{:>5}{:>8.3}{:>8.3}{:>8.3}",
                resid % 100_000,
                truncate(resname, 5),
                truncate(topology[i].name(), 5),
                (i + 1) % 100_000,
                p.x,
                p.y,
                p.z,
            )?;
            if let Some(velocities) = velocities {
                let v = velocities[i] / NM_TO_ANGSTROM;
                write!(self.file, "{:>8.4}{:>8.4}{:>8.4}", v.x, v.y, v.z)?;
            }
            writeln!(self.file)?;
        }

        let cell = frame.cell();
        match cell.shape() {
            CellShape::Infinite => writeln!(self.file, "{:>10.5}{:>10.5}{:>10.5}", 0.0, 0.0, 0.0)?,
            CellShape::Orthorhombic => {
                let [a, b, c] = cell.lengths();
                writeln!(
                    self.file,
                    "{:>10.5}{:>10.5}{:>10.5}",
                    a / NM_TO_ANGSTROM,
                    b / NM_TO_ANGSTROM,
                    c / NM_TO_ANGSTROM
                )?;
            }
            CellShape::Triclinic => {
                let a = cell.a_vector() / NM_TO_ANGSTROM;
                let b = cell.b_vector() / NM_TO_ANGSTROM;
                let c = cell.c_vector() / NM_TO_ANGSTROM;
                writeln!(
                    self.file,
                    "{:>10.5}{:>10.5}{:>10.5}{:>10.5}{:>10.5}{:>10.5}{:>10.5}{:>10.5}{:>10.5}",
                    a.x, b.y, c.z, a.y, a.z, b.x, b.z, c.x, c.y
                )?;
            }
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

fn read_atom_line(line: &str) -> Result<(Atom, i64, String, Vec3, Option<Vec3>)> {
    if line.len() < 44 {
        return Err(Error::Format(format!("GRO atom line is too short: '{line}'")));
    }

    let resid = slice(line, 0, 5).parse::<i64>().map_err(|_| {
        Error::Format(format!("invalid residue number in GRO line '{line}'"))
    })?;
    let resname = slice(line, 5, 10).to_owned();
    let name = slice(line, 10, 15).to_owned();

    let x = parse_float(line, 20, 28)? * NM_TO_ANGSTROM;
    let y = parse_float(line, 28, 36)? * NM_TO_ANGSTROM;
    let z = parse_float(line, 36, 44)? * NM_TO_ANGSTROM;

    let velocity = if line.len() >= 68 {
        Some(Vec3::new(
            parse_float(line, 44, 52)? * NM_TO_ANGSTROM,
            parse_float(line, 52, 60)? * NM_TO_ANGSTROM,
            parse_float(line, 60, 68)? * NM_TO_ANGSTROM,
        ))
    } else {
        None
    };

    Ok((Atom::new(name), resid, resname, Vec3::new(x, y, z), velocity))
}

fn read_box_line(line: &str) -> Result<UnitCell> {
    let values: Vec<f64> = line
        .split_whitespace()
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Format(format!("invalid GRO box line: '{line}'")))?;

    match values.len() {
        3 => {
            if values == [0.0, 0.0, 0.0] {
                Ok(UnitCell::infinite())
            } else {
                UnitCell::new([
                    values[0] * NM_TO_ANGSTROM,
                    values[1] * NM_TO_ANGSTROM,
                    values[2] * NM_TO_ANGSTROM,
                ])
            }
        }
        9 => {
            // v1(x) v2(y) v3(z) v1(y) v1(z) v2(x) v2(z) v3(x) v3(y)
            let a = Vec3::new(values[0], values[3], values[4]) * NM_TO_ANGSTROM;
            let b = Vec3::new(values[5], values[1], values[6]) * NM_TO_ANGSTROM;
            let c = Vec3::new(values[7], values[8], values[2]) * NM_TO_ANGSTROM;
            UnitCell::from_vectors(a, b, c)
        }
        _ => Err(Error::Format(format!("invalid GRO box line: '{line}'"))),
    }
}

fn slice(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).map(str::trim).unwrap_or("")
}

fn parse_float(line: &str, start: usize, end: usize) -> Result<f64> {
    slice(line, start, end).parse().map_err(|_| {
        Error::Format(format!(
            "could not parse a number in columns {start}-{end} of GRO line '{line}'"
        ))
    })
}

fn truncate(text: &str, width: usize) -> &str {
    if text.len() > width { &text[..width] } else { text }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATER: &str = "\
Water, t= 0.0
    3
    1HOH     OW    1   0.126   0.639   0.322  0.0001  0.0002  0.0003
    1HOH    HW1    2   0.190   0.701   0.351
    1HOH    HW2    3   0.063   0.684   0.281
   1.50000   1.50000   1.50000
";

    #[test]
    fn water_file() {
        let mut format = GroFormat::new(
            Source::MemoryRead(WATER.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert_eq!(format.nsteps().unwrap(), 1);

        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.topology()[0].name(), "OW");
        // nm converted to Angstroms
        assert!((frame.positions()[0].x - 1.26).abs() < 1e-9);
        assert_eq!(frame.cell().lengths(), [15.0, 15.0, 15.0]);

        // The first atom has velocities; storage is frame-wide.
        let velocities = frame.velocities().unwrap();
        assert!((velocities[0].y - 0.002).abs() < 1e-9);

        let residue = frame.topology().residue_for_atom(1).unwrap();
        assert_eq!(residue.name(), "HOH");
        assert_eq!(residue.id(), Some(1));
    }

    #[test]
    fn triclinic_box() {
        let content = "\
box
    1
    1HOH     OW    1   0.000   0.000   0.000
   1.00000   1.00000   1.00000   0.00000   0.00000   0.10000   0.00000   0.20000   0.30000
";
        let mut format = GroFormat::new(
            Source::MemoryRead(content.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();
        assert_eq!(frame.cell().shape(), CellShape::Triclinic);
    }
}
