//! PDB v3.3: fixed-column records. `ATOM`/`HETATM` carry one atom each,
//! `MODEL`/`ENDMDL` delimit frames, `CRYST1` the unit cell, `CONECT` extra
//! bonds, `HELIX`/`SHEET` secondary structure, `TER` chain breaks. Short
//! lines (truncated trailing columns) are tolerated on read.

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
    property::Property,
    residue::Residue,
    warnings::warning,
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "PDB",
    extension: Some(".pdb"),
    description: "PDB (RCSB Protein Data Bank) text format",
    reference: Some("http://www.wwpdb.org/documentation/file-format-content/format33/v3.3.html"),
    read: true,
    write: true,
    memory: true,
    positions: true,
    velocities: false,
    unit_cell: true,
    atoms: true,
    bonds: true,
    residues: true,
};

pub(crate) fn builder(
    source: Source,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>> {
    Ok(Box::new(PdbFormat::new(source, mode, compression)?))
}

pub(crate) struct PdbFormat {
    file: TextFile,
    steps: Vec<u64>,
    models_written: usize,
    /// An END record still has to be written on close.
    needs_end: bool,
}

impl PdbFormat {
    pub fn new(source: Source, mode: Mode, compression: Compression) -> Result<PdbFormat> {
        let mut file = TextFile::open(source, mode, compression)?;

        let mut steps = Vec::new();
        if mode == Mode::Read {
            // Frames are delimited by MODEL records; a file without any is a
            // single frame.
            let mut has_atoms = false;
            loop {
                let position = file.tell()?;
                let line = match file.readline_opt()? {
                    Some(line) => line,
                    None => break,
                };
                if line.starts_with("MODEL") {
                    steps.push(position);
                } else if line.starts_with("ATOM") || line.starts_with("HETATM") {
                    has_atoms = true;
                }
            }
            if steps.is_empty() && has_atoms {
                steps.push(0);
            }
            file.rewind()?;
        }

        Ok(PdbFormat {
            file,
            steps,
            models_written: 0,
            needs_end: false,
        })
    }
}

impl Format for PdbFormat {
    fn name(&self) -> &'static str {
        "PDB"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(self.steps.len())
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        let mut parsed = Frame::new();
        let mut builder = FrameBuilder::default();

        let mut seen_any = false;
        loop {
            let position = self.file.tell()?;
            let line = match self.file.readline_opt()? {
                Some(line) => line,
                None => break,
            };

            if line.starts_with("ENDMDL") || line.starts_with("END ") || line.trim() == "END" {
                if seen_any {
                    break;
                }
                continue;
            } else if line.starts_with("MODEL") {
                if seen_any {
                    // Start of the next frame: leave it for the next read.
                    self.file.seek(position)?;
                    break;
                }
                continue;
            } else if line.starts_with("CRYST1") {
                parsed.set_cell(read_cryst1(&line)?);
            } else if line.starts_with("ATOM") || line.starts_with("HETATM") {
                builder.add_atom(&line, &mut parsed)?;
                seen_any = true;
            } else if line.starts_with("CONECT") {
                builder.add_conect(&line);
            } else if line.starts_with("HELIX") {
                builder.add_secondary(&line, 19, 21..25, 31, 33..37, "helix");
            } else if line.starts_with("SHEET") {
                builder.add_secondary(&line, 21, 22..26, 32, 33..37, "sheet");
            }
            // TER and every other record carry nothing we keep.
        }

        builder.finish(&mut parsed)?;
        *frame = parsed;
        Ok(())
    }

    fn read_step(&mut self, step: usize, frame: &mut Frame) -> Result<()> {
        self.file.seek(self.steps[step])?;
        self.read(frame)
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        self.models_written += 1;
        writeln!(self.file, "MODEL {:>8}", self.models_written)?;

        if frame.cell().shape() != CellShape::Infinite {
            let [a, b, c] = frame.cell().lengths();
            let [alpha, beta, gamma] = frame.cell().angles();
            writeln!(
                self.file,
                "CRYST1{a:>9.3}{b:>9.3}{c:>9.3}{alpha:>7.2}{beta:>7.2}{gamma:>7.2} P 1           1"
            )?;
        }

        let topology = frame.topology();
        for i in 0..frame.len() {
            let atom = &topology[i];
            let residue = topology.residue_for_atom(i);

            let record = match residue.and_then(|r| r.get("is_standard_pdb")) {
                Some(Property::Bool(true)) => "ATOM",
                _ => "HETATM",
            };
            let resname = residue.map(|r| r.name()).unwrap_or("XXX");
            let resid = residue.and_then(|r| r.id()).unwrap_or(i as i64 + 1);
            let chain = residue
                .and_then(|r| r.get("chainid"))
                .and_then(|p| p.as_string().ok().map(str::to_owned))
                .unwrap_or_else(|| "X".to_owned());
            let insertion = residue
                .and_then(|r| r.get("insertion_code"))
                .and_then(|p| p.as_string().ok().map(str::to_owned))
                .unwrap_or_default();

            let position = frame.positions()[i];
            writeln!(
                self.file,
                "{record:<6}{serial:>5} {name:<4}{altloc}{resname:>3} {chain:>1}{resid:>4}{insertion:>1}   {x:>8.3}{y:>8.3}{z:>8.3}{occupancy:>6.2}{tempfactor:>6.2}          {element:>2}",
                serial = i + 1,
                name = atom.name(),
                altloc = " ",
                chain = chain.chars().next().unwrap_or(' '),
                insertion = if insertion.is_empty() { " " } else { &insertion },
                x = position.x,
                y = position.y,
                z = position.z,
                occupancy = 1.0,
                tempfactor = 0.0,
                element = atom.atomic_type(),
            )?;
        }

        // CONECT records list every neighbor of an atom, four per line.
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); frame.len()];
        for bond in topology.bonds() {
            neighbors[bond[0]].push(bond[1]);
            neighbors[bond[1]].push(bond[0]);
        }
        for (i, list) in neighbors.iter().enumerate() {
            for chunk in list.chunks(4) {
                write!(self.file, "CONECT{:>5}", i + 1)?;
                for &j in chunk {
                    write!(self.file, "{:>5}", j + 1)?;
                }
                writeln!(self.file)?;
            }
        }

        writeln!(self.file, "ENDMDL")?;
        self.needs_end = true;
        self.file.flush()?;
        self.steps.push(0);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if self.needs_end {
            writeln!(self.file, "END")?;
            self.needs_end = false;
        }
        self.file.flush()?;
        Ok(())
    }
}

/// Accumulates residues, bonds, and secondary structure while atoms stream
/// in, and applies them to the frame at the end of the model.
#[derive(Default)]
struct FrameBuilder {
    /// (chain id, residue id, insertion code) → residue, in file order.
    residues: Vec<((char, i64, char), Residue)>,
    serial_to_index: HashMap<i64, usize>,
    last_serial: i64,
    conect: Vec<(i64, i64)>,
    secondary: Vec<(char, i64, char, i64, &'static str)>,
}

impl FrameBuilder {
    fn add_atom(&mut self, line: &str, frame: &mut Frame) -> Result<()> {
        if line.len() < 54 {
            return Err(Error::Format(format!(
                "PDB atom record is too short: '{line}'"
            )));
        }

        let serial = match column(line, 6, 11).parse::<i64>() {
            Ok(serial) => serial,
            Err(_) => {
                // Serial numbers overflow to '*****' in large files.
                warning!(
                    "invalid atom serial number '{}' in PDB file, using {}",
                    column(line, 6, 11),
                    self.last_serial + 1
                );
                self.last_serial + 1
            }
        };
        self.last_serial = serial;

        let name = column(line, 12, 16);
        let resname = column(line, 17, 20);
        let chain = character(line, 21);
        let resid = column(line, 22, 26).parse::<i64>().unwrap_or(0);
        let insertion = character(line, 26);

        let x = parse_float(line, 30, 38)?;
        let y = parse_float(line, 38, 46)?;
        let z = parse_float(line, 46, 54)?;

        let element = column(line, 76, 78);
        let mut atom = if element.is_empty() {
            Atom::new(name)
        } else {
            Atom::with_type(name, element)
        };
        if let Ok(occupancy) = column(line, 54, 60).parse::<f64>() {
            atom.set("occupancy", occupancy);
        }
        if let Ok(tempfactor) = column(line, 60, 66).parse::<f64>() {
            atom.set("tempfactor", tempfactor);
        }

        let index = frame.len();
        frame.add_atom(atom, Vec3::new(x, y, z), None);
        self.serial_to_index.insert(serial, index);

        let key = (chain, resid, insertion);
        let is_standard = line.starts_with("ATOM");
        match self.residues.iter_mut().find(|(k, _)| *k == key) {
            Some((_, residue)) => residue.add_atom(index),
            None => {
                let mut residue = Residue::with_id(resname, resid);
                residue.add_atom(index);
                residue.set("chainid", chain.to_string());
                residue.set("is_standard_pdb", is_standard);
                if insertion != ' ' {
                    residue.set("insertion_code", insertion.to_string());
                }
                self.residues.push((key, residue));
            }
        }
        Ok(())
    }

    fn add_conect(&mut self, line: &str) {
        let first = match column(line, 6, 11).parse::<i64>() {
            Ok(serial) => serial,
            Err(_) => {
                warning!("invalid CONECT record: '{line}'");
                return;
            }
        };
        for start in [11, 16, 21, 26] {
            if let Ok(serial) = column(line, start, start + 5).parse::<i64>() {
                self.conect.push((first, serial));
            }
        }
    }

    fn add_secondary(
        &mut self,
        line: &str,
        start_chain: usize,
        start_range: std::ops::Range<usize>,
        end_chain: usize,
        end_range: std::ops::Range<usize>,
        kind: &'static str,
    ) {
        let chain_a = character(line, start_chain);
        let chain_b = character(line, end_chain);
        let Ok(from) = column(line, start_range.start, start_range.end).parse::<i64>() else {
            return;
        };
        let Ok(to) = column(line, end_range.start, end_range.end).parse::<i64>() else {
            return;
        };
        if chain_a == chain_b {
            self.secondary.push((chain_a, from, chain_b, to, kind));
        }
    }

    fn finish(self, frame: &mut Frame) -> Result<()> {
        for ((chain, resid, _), mut residue) in self.residues {
            for &(s_chain, from, _, to, kind) in &self.secondary {
                if chain == s_chain && resid >= from && resid <= to {
                    residue.set("secondary_structure", kind);
                }
            }
            frame.topology_mut().add_residue(residue)?;
        }

        for (a, b) in self.conect {
            match (self.serial_to_index.get(&a), self.serial_to_index.get(&b)) {
                (Some(&i), Some(&j)) => {
                    if i != j {
                        frame.add_bond(i, j)?;
                    }
                }
                _ => {
                    warning!("CONECT record references atom {a} or {b} which does not exist");
                }
            }
        }
        Ok(())
    }
}

fn read_cryst1(line: &str) -> Result<UnitCell> {
    let a = parse_float(line, 6, 15)?;
    let b = parse_float(line, 15, 24)?;
    let c = parse_float(line, 24, 33)?;
    let alpha = parse_float(line, 33, 40)?;
    let beta = parse_float(line, 40, 47)?;
    let gamma = parse_float(line, 47, 54)?;
    UnitCell::triclinic([a, b, c], [alpha, beta, gamma])
}

/// The trimmed text in the given column range, tolerating short lines.
fn column(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    if start >= end {
        return "";
    }
    line.get(start..end).map(str::trim).unwrap_or("")
}

fn character(line: &str, index: usize) -> char {
    line.as_bytes().get(index).map(|&b| b as char).unwrap_or(' ')
}

fn parse_float(line: &str, start: usize, end: usize) -> Result<f64> {
    column(line, start, end).parse().map_err(|_| {
        Error::Format(format!(
            "could not parse a number in columns {start}-{end} of PDB record '{line}'"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATER: &str = "\
CRYST1   15.000   15.000   15.000  90.00  90.00  90.00 P 1           1
ATOM      1  O   HOH A   1       0.417   8.303  11.737  1.00  0.00           O
ATOM      2  H1  HOH A   1       1.320   8.480  12.003  1.00  0.00           H
ATOM      3  H2  HOH A   1       0.379   8.650  10.843  1.00  0.00           H
CONECT    1    2
CONECT    1    3
END
";

    fn read(content: &str) -> PdbFormat {
        PdbFormat::new(
            Source::MemoryRead(content.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap()
    }

    #[test]
    fn water_file() {
        let mut format = read(WATER);
        assert_eq!(format.nsteps().unwrap(), 1);

        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.topology()[0].name(), "O");
        assert_eq!(frame.topology()[1].name(), "H1");
        assert_eq!(frame.positions()[0].y, 8.303);
        assert_eq!(frame.cell().lengths(), [15.0, 15.0, 15.0]);

        assert_eq!(frame.topology().bonds().len(), 2);
        assert!(frame.topology().bond_order(0, 1).is_ok());
        assert!(frame.topology().bond_order(0, 2).is_ok());

        let residue = frame.topology().residue_for_atom(0).unwrap();
        assert_eq!(residue.name(), "HOH");
        assert_eq!(residue.id(), Some(1));
        assert_eq!(
            residue.get("chainid").unwrap().as_string().unwrap(),
            "A"
        );
        assert!(residue.get("is_standard_pdb").unwrap().as_bool().unwrap());
    }

    #[test]
    fn models_delimit_frames() {
        let content = "\
MODEL        1
ATOM      1  O   HOH A   1       0.000   0.000   0.000  1.00  0.00           O
ENDMDL
MODEL        2
ATOM      1  O   HOH A   1       1.000   0.000   0.000  1.00  0.00           O
ENDMDL
END
";
        let mut format = read(content);
        assert_eq!(format.nsteps().unwrap(), 2);

        let mut frame = Frame::new();
        format.read_step(1, &mut frame).unwrap();
        assert_eq!(frame.positions()[0].x, 1.0);
    }

    #[test]
    fn short_lines_are_tolerated() {
        let content = "\
ATOM      1  O   HOH A   1       0.417   8.303  11.737
END
";
        let mut format = read(content);
        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();
        assert_eq!(frame.len(), 1);
        // No element column: the name doubles as the type.
        assert_eq!(frame.topology()[0].atomic_type(), "O");
    }

    #[test]
    fn secondary_structure() {
        let content = "\
HELIX    1   1 GLY A    1  GLY A    2  1
ATOM      1  N   GLY A   1       0.000   0.000   0.000  1.00  0.00           N
ATOM      2  CA  GLY A   2       1.000   0.000   0.000  1.00  0.00           C
ATOM      3  C   GLY A   3       2.000   0.000   0.000  1.00  0.00           C
END
";
        let mut format = read(content);
        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();

        let first = frame.topology().residue_for_atom(0).unwrap();
        assert_eq!(
            first
                .get("secondary_structure")
                .unwrap()
                .as_string()
                .unwrap(),
            "helix"
        );
        let last = frame.topology().residue_for_atom(2).unwrap();
        assert!(last.get("secondary_structure").is_none());
    }
}
