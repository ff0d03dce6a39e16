//! Tinker XYZ files, and their multi-frame concatenation (`.arc` archives).
//! Each frame is a header line (atom count and optional title), an optional
//! unit-cell line, and one line per atom carrying its bonded neighbors.

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
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "Tinker",
    extension: Some(".arc"),
    description: "Tinker XYZ text format",
    reference: Some("http://chembytes.wikidot.com/tnk-tut00#toc2"),
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
    Ok(Box::new(TinkerFormat::new(source, mode, compression)?))
}

pub(crate) struct TinkerFormat {
    file: TextFile,
    steps: Vec<u64>,
}

impl TinkerFormat {
    pub fn new(source: Source, mode: Mode, compression: Compression) -> Result<TinkerFormat> {
        let mut file = TextFile::open(source, mode, compression)?;

        let mut steps = Vec::new();
        if mode == Mode::Read {
            loop {
                let position = file.tell()?;
                let line = match file.readline_opt()? {
                    Some(line) => line,
                    None => break,
                };
                let natoms: usize = match line.split_whitespace().next() {
                    Some(first) => first.parse().map_err(|_| {
                        Error::Format(format!(
                            "invalid atom count in Tinker file '{}'",
                            file.path()
                        ))
                    })?,
                    None => continue,
                };

                let mut remaining = natoms;
                let mut first = true;
                while remaining > 0 {
                    let line = file.readline().map_err(|_| {
                        Error::Format(format!(
                            "not enough lines in '{}' for the Tinker format",
                            file.path()
                        ))
                    })?;
                    if first && is_cell_line(&line) {
                        first = false;
                        continue;
                    }
                    first = false;
                    remaining -= 1;
                }
                steps.push(position);
            }
            file.rewind()?;
        }

        Ok(TinkerFormat { file, steps })
    }
}

impl Format for TinkerFormat {
    fn name(&self) -> &'static str {
        "Tinker"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(self.steps.len())
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        let header = self.file.readline()?;
        let mut fields = header.split_whitespace();
        let natoms: usize = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| {
                Error::Format(format!(
                    "invalid atom count in Tinker file '{}'",
                    self.file.path()
                ))
            })?;

        let mut parsed = Frame::new();
        let title: Vec<&str> = fields.collect();
        if !title.is_empty() {
            parsed.set("name", title.join(" "));
        }

        let mut bonds = Vec::new();
        let mut read_atoms = 0;
        let mut first = true;
        while read_atoms < natoms {
            let line = self.file.readline()?;
            if first {
                first = false;
                if is_cell_line(&line) {
                    let values: Vec<f64> = line
                        .split_whitespace()
                        .map(|f| f.parse().expect("checked by is_cell_line"))
                        .collect();
                    parsed.set_cell(UnitCell::triclinic(
                        [values[0], values[1], values[2]],
                        [values[3], values[4], values[5]],
                    )?);
                    continue;
                }
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return Err(Error::Format(format!(
                    "not enough columns in Tinker atom line '{line}'"
                )));
            }

            let name = fields[1];
            let x = parse_float(fields[2], &line)?;
            let y = parse_float(fields[3], &line)?;
            let z = parse_float(fields[4], &line)?;

            let mut atom = Atom::new(name);
            if let Some(type_) = fields.get(5).and_then(|f| f.parse::<f64>().ok()) {
                atom.set("tinker_type", type_);
            }
            parsed.add_atom(atom, Vec3::new(x, y, z), None);

            for neighbor in &fields[6..] {
                if let Ok(other) = neighbor.parse::<usize>() {
                    if other >= 1 {
                        bonds.push((read_atoms, other - 1));
                    }
                }
            }
            read_atoms += 1;
        }

        for (i, j) in bonds {
            if j < parsed.len() && i != j {
                parsed.add_bond(i, j)?;
            }
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
        let topology = frame.topology();

        let title = frame
            .get("name")
            .and_then(|p| p.as_string().ok())
            .unwrap_or("written by mol_files");
        writeln!(self.file, "{:>6}  {title}", frame.len())?;

        // The cell line is always present; no cell writes as zero lengths
        // with 90 degree angles.
        let (lengths, angles) = match frame.cell().shape() {
            CellShape::Infinite => ([0.0; 3], [90.0; 3]),
            _ => (frame.cell().lengths(), frame.cell().angles()),
        };
        let [a, b, c] = lengths;
        let [alpha, beta, gamma] = angles;
        writeln!(
            self.file,
            "{a:>12.6}{b:>12.6}{c:>12.6}{alpha:>12.6}{beta:>12.6}{gamma:>12.6}"
        )?;

        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); frame.len()];
        for bond in topology.bonds() {
            neighbors[bond[0]].push(bond[1]);
            neighbors[bond[1]].push(bond[0]);
        }

        for i in 0..frame.len() {
            let atom = &topology[i];
            let p = frame.positions()[i];
            write!(
                self.file,
                "{:>6}  {:<3}{:>12.6}{:>12.6}{:>12.6}{:>6}",
                i + 1,
                atom.name(),
                p.x,
                p.y,
                p.z,
                i + 1,
            )?;
            for &j in &neighbors[i] {
                write!(self.file, "{:>6}", j + 1)?;
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

/// A cell line holds exactly six floats, and its second field is numeric
/// where an atom line has the atom name.
fn is_cell_line(line: &str) -> bool {
    let fields: Vec<&str> = line.split_whitespace().collect();
    fields.len() == 6 && fields.iter().all(|f| f.parse::<f64>().is_ok())
}

fn parse_float(value: &str, line: &str) -> Result<f64> {
    value.parse().map_err(|_| {
        Error::Format(format!("invalid coordinate in Tinker atom line '{line}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARC: &str = "\
     3  water
     1  O      0.000000    0.000000    0.000000     1     2     3
     2  H      0.957200    0.000000    0.000000     2     1
     3  H     -0.240000    0.927000    0.000000     2     1
     3  water
     1  O      1.000000    0.000000    0.000000     1     2     3
     2  H      1.957200    0.000000    0.000000     2     1
     3  H      0.760000    0.927000    0.000000     2     1
";

    #[test]
    fn archive() {
        let mut format = TinkerFormat::new(
            Source::MemoryRead(ARC.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert_eq!(format.nsteps().unwrap(), 2);

        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.topology()[0].name(), "O");
        assert_eq!(frame.topology().bonds().len(), 2);
        assert_eq!(frame.get("name").unwrap().as_string().unwrap(), "water");

        format.read(&mut frame).unwrap();
        assert_eq!(frame.positions()[0].x, 1.0);
    }

    #[test]
    fn written_files_always_carry_a_cell_line() {
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("N"), Vec3::new(1.0, 2.0, 3.0), None);
        frame.add_atom(Atom::new("N"), Vec3::new(2.1, 2.0, 3.0), None);
        frame.add_bond(0, 1).unwrap();

        let buffer = crate::files::memory::new_shared_buffer();
        {
            let mut format = TinkerFormat::new(
                Source::MemoryWrite(buffer.clone()),
                Mode::Write,
                Compression::None,
            )
            .unwrap();
            format.write(&frame).unwrap();
        }

        let content = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        // No cell on the frame still writes a cell line, as zeros.
        let fields: Vec<&str> = lines[1].split_whitespace().collect();
        assert_eq!(fields, vec![
            "0.000000",
            "0.000000",
            "0.000000",
            "90.000000",
            "90.000000",
            "90.000000",
        ]);

        let mut format = TinkerFormat::new(
            Source::MemoryRead(content.into_bytes()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        let mut read = Frame::new();
        format.read(&mut read).unwrap();
        assert_eq!(read.cell().shape(), crate::CellShape::Infinite);
        assert_eq!(read.len(), 2);
        assert_eq!(read.topology().bonds().len(), 1);
    }

    #[test]
    fn cell_line() {
        let content = "\
     1  box
  10.000000   10.000000   10.000000   90.000000   90.000000   90.000000
     1  Ar     0.000000    0.000000    0.000000     1
";
        let mut format = TinkerFormat::new(
            Source::MemoryRead(content.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert_eq!(format.nsteps().unwrap(), 1);

        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();
        assert_eq!(frame.cell().lengths(), [10.0, 10.0, 10.0]);
        assert_eq!(frame.len(), 1);
    }
}
