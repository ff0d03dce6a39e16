//! CSSR (Cambridge Structure Search and Retrieval) files: a fixed-column
//! crystallographic format holding exactly one structure per file, with
//! fractional or orthogonal coordinates and up to eight bond references per
//! atom line.

use std::io::Write;

use lin_alg::f64::Vec3;

use crate::{
    atom::Atom,
    cell::CellShape,
    cell::UnitCell,
    error::{Error, Result},
    files::{Compression, Mode, Source, TextFile},
    formats::{Format, FormatMetadata},
    frame::Frame,
    warnings::warning,
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "CSSR",
    extension: Some(".cssr"),
    description: "CSSR text format",
    reference: Some("http://www.chem.cmu.edu/courses/09-560/docs/msi/modenv/D_Files.html#944777"),
    read: true,
    write: true,
    memory: true,
    positions: true,
    velocities: false,
    unit_cell: true,
    atoms: true,
    bonds: true,
    residues: false,
};

pub(crate) fn builder(
    source: Source,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>> {
    Ok(Box::new(CssrFormat::new(source, mode, compression)?))
}

pub(crate) struct CssrFormat {
    file: TextFile,
    mode: Mode,
    read_done: bool,
    written: bool,
}

impl CssrFormat {
    pub fn new(source: Source, mode: Mode, compression: Compression) -> Result<CssrFormat> {
        let file = TextFile::open(source, mode, compression)?;
        Ok(CssrFormat {
            file,
            mode,
            read_done: false,
            written: false,
        })
    }
}

impl Format for CssrFormat {
    fn name(&self) -> &'static str {
        "CSSR"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(if self.mode == Mode::Read { 1 } else { 0 })
    }

    fn read_step(&mut self, step: usize, frame: &mut Frame) -> Result<()> {
        if step != 0 {
            return Err(Error::Format(
                "CSSR files only contain one frame".to_owned(),
            ));
        }
        self.file.rewind()?;
        self.read_done = false;
        self.read(frame)
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        if self.read_done {
            return Err(Error::Format(
                "CSSR files only contain one frame".to_owned(),
            ));
        }

        // Line 1: cell lengths, usually after an "A,B,C =" label.
        let first = self.file.readline()?;
        let lengths_text = match first.rsplit_once('=') {
            Some((_, tail)) => tail,
            None => first.as_str(),
        };
        let lengths: Vec<f64> = lengths_text
            .split_whitespace()
            .filter_map(|f| f.parse().ok())
            .collect();
        // Line 2: angles after "ALPHA,BETA,GAMMA =", then "SPGR = ..."
        let second = self.file.readline()?;
        let angles_part = match second.split_once("SPGR") {
            Some((head, _)) => head,
            None => second.as_str(),
        };
        let angles_text = match angles_part.rsplit_once('=') {
            Some((_, tail)) => tail,
            None => angles_part,
        };
        let angles: Vec<f64> = angles_text
            .split_whitespace()
            .filter_map(|f| f.parse().ok())
            .collect();

        let mut parsed = Frame::new();
        if lengths.len() >= 3 && angles.len() >= 3 {
            parsed.set_cell(UnitCell::triclinic(
                [lengths[0], lengths[1], lengths[2]],
                [angles[0], angles[1], angles[2]],
            )?);
        }

        // Line 3: atom count and the coordinate flag (0 = fractional).
        let third = self.file.readline()?;
        let mut fields = third.split_whitespace();
        let natoms: usize = fields.next().and_then(|f| f.parse().ok()).ok_or_else(|| {
            Error::Format(format!(
                "invalid atom count in CSSR file '{}'",
                self.file.path()
            ))
        })?;
        let fractional = fields.next().and_then(|f| f.parse::<i32>().ok()) == Some(0);

        // Line 4: title.
        let title = self.file.readline()?;
        if !title.trim().is_empty() {
            parsed.set("name", title.trim());
        }

        let mut bonds = Vec::new();
        for line in self.file.readlines(natoms)? {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return Err(Error::Format(format!(
                    "not enough columns in CSSR atom line '{line}'"
                )));
            }

            let name = fields[1].trim_end_matches(|c: char| c.is_ascii_digit());
            let raw = Vec3::new(
                parse_float(fields[2], &line)?,
                parse_float(fields[3], &line)?,
                parse_float(fields[4], &line)?,
            );
            let position = if fractional {
                let cell = parsed.cell();
                cell.a_vector() * raw.x + cell.b_vector() * raw.y + cell.c_vector() * raw.z
            } else {
                raw
            };

            let index = parsed.len();
            let mut atom = Atom::with_type(fields[1], name);
            if let Some(charge) = fields.get(13).and_then(|f| f.parse::<f64>().ok()) {
                atom.set_charge(charge);
            }
            parsed.add_atom(atom, position, None);

            // Up to eight bond references follow the coordinates.
            for reference in fields.iter().skip(5).take(8) {
                if let Ok(other) = reference.parse::<usize>() {
                    if other >= 1 && other != index + 1 {
                        bonds.push((index, other - 1));
                    }
                }
            }
        }

        for (i, j) in bonds {
            if j < parsed.len() {
                parsed.add_bond(i, j)?;
            }
        }

        self.read_done = true;
        *frame = parsed;
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.written {
            return Err(Error::Format(
                "CSSR files can only contain one frame".to_owned(),
            ));
        }

        // CSSR stores fractional coordinates, so a cell is not optional: an
        // infinite cell degrades to a unit cubic one, which makes the
        // fractional values equal to the cartesian ones.
        let cell = if frame.cell().shape() == CellShape::Infinite {
            warning!("CSSR files require a unit cell, using a unit cubic cell");
            UnitCell::new([1.0, 1.0, 1.0])?
        } else {
            frame.cell().clone()
        };

        let [a, b, c] = cell.lengths();
        let [alpha, beta, gamma] = cell.angles();
        writeln!(
            self.file,
            " REFERENCE STRUCTURE = 00000   A,B,C ={a:>8.3}{b:>8.3}{c:>8.3}"
        )?;
        writeln!(
            self.file,
            "   ALPHA,BETA,GAMMA ={alpha:>8.3}{beta:>8.3}{gamma:>8.3}    SPGR =  1 P1"
        )?;
        // 0 marks fractional coordinates.
        writeln!(self.file, "{:>4}   0", frame.len())?;
        match frame.get("name").and_then(|p| p.as_string().ok()) {
            Some(name) => writeln!(self.file, "{name}")?,
            None => writeln!(self.file, " written by mol_files")?,
        }

        let inverse = cell.matrix().inverse().ok_or_else(|| {
            Error::Format(
                "the unit cell is degenerate, can not compute fractional coordinates".to_owned(),
            )
        })?;

        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); frame.len()];
        for bond in frame.topology().bonds() {
            neighbors[bond[0]].push(bond[1]);
            neighbors[bond[1]].push(bond[0]);
        }

        for i in 0..frame.len() {
            let atom = &frame.topology()[i];
            let fractional = inverse.clone() * frame.positions()[i];
            write!(
                self.file,
                "{:>4} {:<4} {:>9.5} {:>9.5} {:>9.5}",
                i + 1,
                atom.name(),
                fractional.x,
                fractional.y,
                fractional.z
            )?;
            for n in 0..8 {
                let reference = neighbors[i].get(n).map(|&j| j + 1).unwrap_or(0);
                write!(self.file, "{reference:>4}")?;
            }
            writeln!(self.file, " {:>7.3}", atom.charge())?;
        }

        self.file.flush()?;
        self.written = true;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

fn parse_float(value: &str, line: &str) -> Result<f64> {
    value.parse().map_err(|_| {
        Error::Format(format!("invalid coordinate in CSSR atom line '{line}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_fractional() {
        let mut frame = Frame::new();
        frame.set_cell(UnitCell::new([10.0, 10.0, 12.0]).unwrap());
        frame.add_atom(Atom::new("O"), Vec3::new(1.0, 2.0, 3.0), None);
        frame.add_atom(Atom::new("H"), Vec3::new(2.0, 2.0, 3.0), None);
        frame.add_bond(0, 1).unwrap();

        let buffer = crate::files::memory::new_shared_buffer();
        {
            let mut format = CssrFormat::new(
                Source::MemoryWrite(buffer.clone()),
                Mode::Write,
                Compression::None,
            )
            .unwrap();
            format.write(&frame).unwrap();
            // Only one frame fits in a CSSR file.
            assert!(format.write(&frame).is_err());
        }

        let content = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].contains("A,B,C =  10.000  10.000  12.000"));
        assert!(lines[1].contains("ALPHA,BETA,GAMMA =  90.000  90.000  90.000"));
        // The coordinate flag is 0: fractional coordinates.
        assert_eq!(lines[2], "   2   0");
        assert!(lines[4].contains("0.10000   0.20000   0.25000"));

        let mut format = CssrFormat::new(
            Source::MemoryRead(content.into_bytes()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert_eq!(format.nsteps().unwrap(), 1);

        let mut read = Frame::new();
        format.read(&mut read).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read.topology()[0].atomic_type(), "O");
        assert_eq!(read.cell().lengths(), [10.0, 10.0, 12.0]);
        assert_eq!(read.topology().bonds().len(), 1);
        assert!((read.positions()[0].x - 1.0).abs() < 1e-9);
        assert!((read.positions()[0].y - 2.0).abs() < 1e-9);
        assert!((read.positions()[0].z - 3.0).abs() < 1e-9);
    }

    #[test]
    fn infinite_cells_degrade_to_a_unit_cell() {
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("O"), Vec3::new(0.417, 8.303, 11.737), None);

        let buffer = crate::files::memory::new_shared_buffer();
        {
            let mut format = CssrFormat::new(
                Source::MemoryWrite(buffer.clone()),
                Mode::Write,
                Compression::None,
            )
            .unwrap();
            format.write(&frame).unwrap();
        }

        let content = buffer.lock().unwrap().clone();
        let mut format = CssrFormat::new(
            Source::MemoryRead(content),
            Mode::Read,
            Compression::None,
        )
        .unwrap();

        // With a 1 x 1 x 1 cell the fractional values are the cartesian
        // ones, so positions survive the trip.
        let mut read = Frame::new();
        format.read(&mut read).unwrap();
        assert_eq!(read.cell().lengths(), [1.0, 1.0, 1.0]);
        assert!((read.positions()[0].y - 8.303).abs() < 1e-4);
    }
}
