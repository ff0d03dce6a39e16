//! Tripos Mol2 files. Records are grouped in `@<TRIPOS>` sections; the ones
//! carrying structure are MOLECULE, ATOM, BOND, CRYSIN, and SUBSTRUCTURE.
//! [This unofficial resource](https://chemicbook.com/2021/02/20/mol2-file-format-explained-for-beginners-part-2.html)
//! describes the format.

use std::io::Write;

use lin_alg::f64::Vec3;

use crate::{
    atom::Atom,
    cell::CellShape,
    connectivity::BondOrder,
    error::{Error, Result},
    files::{Compression, Mode, Source, TextFile},
    formats::{Format, FormatMetadata},
    frame::Frame,
    residue::Residue,
    cell::UnitCell,
    warnings::warning,
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "MOL2",
    extension: Some(".mol2"),
    description: "Tripos mol2 text format",
    reference: Some("https://chemicbook.com/2021/02/20/mol2-file-format-explained-for-beginners-part-2.html"),
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
    Ok(Box::new(Mol2Format::new(source, mode, compression)?))
}

pub(crate) struct Mol2Format {
    file: TextFile,
    steps: Vec<u64>,
}

impl Mol2Format {
    pub fn new(source: Source, mode: Mode, compression: Compression) -> Result<Mol2Format> {
        let mut file = TextFile::open(source, mode, compression)?;

        let mut steps = Vec::new();
        if mode == Mode::Read {
            loop {
                let position = file.tell()?;
                let line = match file.readline_opt()? {
                    Some(line) => line,
                    None => break,
                };
                if line.trim() == "@<TRIPOS>MOLECULE" {
                    steps.push(position);
                }
            }
            file.rewind()?;
        }

        Ok(Mol2Format { file, steps })
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Molecule,
    Atoms,
    Bonds,
    Crysin,
    Other,
}

impl Format for Mol2Format {
    fn name(&self) -> &'static str {
        "MOL2"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(self.steps.len())
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        // Position on the next MOLECULE record.
        loop {
            let line = self.file.readline()?;
            if line.trim() == "@<TRIPOS>MOLECULE" {
                break;
            }
        }

        let mut parsed = Frame::new();
        let name = self.file.readline()?;
        if !name.trim().is_empty() {
            parsed.set("name", name.trim());
        }

        let mut section = Section::Molecule;
        let mut molecule_line = 0;
        let mut residues: Vec<(i64, Residue)> = Vec::new();

        loop {
            let position = self.file.tell()?;
            let line = match self.file.readline_opt()? {
                Some(line) => line,
                None => break,
            };
            let trimmed = line.trim();

            if trimmed == "@<TRIPOS>MOLECULE" {
                self.file.seek(position)?;
                break;
            } else if let Some(tag) = trimmed.strip_prefix("@<TRIPOS>") {
                section = match tag {
                    "ATOM" => Section::Atoms,
                    "BOND" => Section::Bonds,
                    "CRYSIN" => Section::Crysin,
                    _ => Section::Other,
                };
                continue;
            }

            if trimmed.is_empty() {
                continue;
            }

            match section {
                Section::Molecule => {
                    // counts, molecule type, then the charge model; nothing
                    // here changes how the rest is parsed.
                    molecule_line += 1;
                    if molecule_line > 4 {
                        section = Section::Other;
                    }
                }
                Section::Atoms => {
                    read_atom_line(trimmed, &mut parsed, &mut residues)?;
                }
                Section::Bonds => {
                    read_bond_line(trimmed, &mut parsed)?;
                }
                Section::Crysin => {
                    let values: Vec<f64> = trimmed
                        .split_whitespace()
                        .take(6)
                        .map(str::parse)
                        .collect::<std::result::Result<_, _>>()
                        .map_err(|_| {
                            Error::Format(format!("invalid CRYSIN record: '{trimmed}'"))
                        })?;
                    if values.len() == 6 {
                        parsed.set_cell(UnitCell::triclinic(
                            [values[0], values[1], values[2]],
                            [values[3], values[4], values[5]],
                        )?);
                    }
                    section = Section::Other;
                }
                Section::Other => {}
            }
        }

        for (_, residue) in residues {
            parsed.topology_mut().add_residue(residue)?;
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

        writeln!(self.file, "@<TRIPOS>MOLECULE")?;
        match frame.get("name").and_then(|p| p.as_string().ok()) {
            Some(name) => writeln!(self.file, "{name}")?,
            None => writeln!(self.file, "****")?,
        }
        let nresidues = topology.residues().len().max(1);
        writeln!(
            self.file,
            "{:>4} {:>4} {:>4} 0 0",
            frame.len(),
            topology.bonds().len(),
            nresidues
        )?;
        writeln!(self.file, "SMALL")?;
        writeln!(self.file, "USER_CHARGES")?;
        writeln!(self.file)?;

        if frame.cell().shape() != CellShape::Infinite {
            let [a, b, c] = frame.cell().lengths();
            let [alpha, beta, gamma] = frame.cell().angles();
            writeln!(self.file, "@<TRIPOS>CRYSIN")?;
            writeln!(
                self.file,
                "{a:.4} {b:.4} {c:.4} {alpha:.4} {beta:.4} {gamma:.4} 1 1"
            )?;
        }

        writeln!(self.file, "@<TRIPOS>ATOM")?;
        for i in 0..frame.len() {
            let atom = &topology[i];
            let position = frame.positions()[i];
            let residue = topology.residue_for_atom(i);
            let resid = residue.and_then(|r| r.id()).unwrap_or(1);
            let resname = residue.map(|r| r.name()).unwrap_or("RES");

            let type_ = if atom.atomic_type().is_empty() {
                "Du"
            } else {
                atom.atomic_type()
            };
            writeln!(
                self.file,
                "{:>7} {:<8} {:>10.4} {:>10.4} {:>10.4} {:<6} {:>5} {:<8} {:>9.6}",
                i + 1,
                atom.name(),
                position.x,
                position.y,
                position.z,
                type_,
                resid,
                resname,
                atom.charge(),
            )?;
        }

        writeln!(self.file, "@<TRIPOS>BOND")?;
        for (n, bond) in topology.bonds().iter().enumerate() {
            let order = match topology.bond_orders()[n] {
                BondOrder::Single => "1",
                BondOrder::Double => "2",
                BondOrder::Triple => "3",
                BondOrder::Aromatic => "ar",
                BondOrder::Amide => "am",
                _ => "1",
            };
            writeln!(
                self.file,
                "{:>6}{:>6}{:>6} {:<3}",
                n + 1,
                bond[0] + 1,
                bond[1] + 1,
                order,
            )?;
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

/// atom_id atom_name x y z atom_type [subst_id [subst_name [charge]]]
fn read_atom_line(
    line: &str,
    frame: &mut Frame,
    residues: &mut Vec<(i64, Residue)>,
) -> Result<()> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 6 {
        return Err(Error::Format(format!(
            "not enough columns in mol2 atom record: '{line}'"
        )));
    }

    let name = cols[1];
    let sybyl = cols[5];
    // SYBYL types are "element" or "element.hybridisation", e.g. "N.3".
    let element = sybyl.split('.').next().unwrap_or(sybyl);

    let x = parse_float(cols[2], line)?;
    let y = parse_float(cols[3], line)?;
    let z = parse_float(cols[4], line)?;

    let mut atom = Atom::with_type(name, element);
    atom.set("sybyl_type", sybyl);
    if let Some(charge) = cols.get(8).and_then(|c| c.parse::<f64>().ok()) {
        atom.set_charge(charge);
    }

    let index = frame.len();
    frame.add_atom(atom, Vec3::new(x, y, z), None);

    if let (Some(subst_id), Some(subst_name)) = (cols.get(6), cols.get(7)) {
        if let Ok(resid) = subst_id.parse::<i64>() {
            match residues.iter_mut().find(|(id, _)| *id == resid) {
                Some((_, residue)) => residue.add_atom(index),
                None => {
                    let mut residue = Residue::with_id(*subst_name, resid);
                    residue.add_atom(index);
                    residues.push((resid, residue));
                }
            }
        }
    }
    Ok(())
}

/// bond_id origin_atom_id target_atom_id bond_type
fn read_bond_line(line: &str, frame: &mut Frame) -> Result<()> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 4 {
        return Err(Error::Format(format!(
            "not enough columns in mol2 bond record: '{line}'"
        )));
    }

    let i = cols[1].parse::<usize>().map_err(|_| {
        Error::Format(format!("invalid atom id in mol2 bond record: '{line}'"))
    })?;
    let j = cols[2].parse::<usize>().map_err(|_| {
        Error::Format(format!("invalid atom id in mol2 bond record: '{line}'"))
    })?;
    if i == 0 || j == 0 || i > frame.len() || j > frame.len() {
        return Err(Error::Format(format!(
            "atom id out of range in mol2 bond record: '{line}'"
        )));
    }

    let order = match cols[3].to_ascii_lowercase().as_str() {
        "1" => BondOrder::Single,
        "2" => BondOrder::Double,
        "3" => BondOrder::Triple,
        "ar" => BondOrder::Aromatic,
        "am" => BondOrder::Amide,
        "du" | "un" | "nc" => BondOrder::Unknown,
        other => {
            warning!("unknown mol2 bond type '{other}', using an unknown bond order");
            BondOrder::Unknown
        }
    };
    frame.add_bond_with_order(i - 1, j - 1, order)
}

fn parse_float(value: &str, line: &str) -> Result<f64> {
    value.parse().map_err(|_| {
        Error::Format(format!("invalid coordinate in mol2 atom record: '{line}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETHANE: &str = "\
@<TRIPOS>MOLECULE
ethane
 8 7 1
SMALL
USER_CHARGES

@<TRIPOS>ATOM
      1 C1    0.0000  0.0000  0.0000 C.3     1 ETH  -0.294000
      2 C2    1.5400  0.0000  0.0000 C.3     1 ETH  -0.294000
      3 H1   -0.3600  1.0200  0.0000 H       1 ETH   0.098000
      4 H2   -0.3600 -0.5100  0.8800 H       1 ETH   0.098000
      5 H3   -0.3600 -0.5100 -0.8800 H       1 ETH   0.098000
      6 H4    1.9000  0.5100  0.8800 H       1 ETH   0.098000
      7 H5    1.9000  0.5100 -0.8800 H       1 ETH   0.098000
      8 H6    1.9000 -1.0200  0.0000 H       1 ETH   0.098000
@<TRIPOS>BOND
     1     1     2    1
     2     1     3    1
     3     1     4    1
     4     1     5    1
     5     2     6    1
     6     2     7    1
     7     2     8    1
";

    #[test]
    fn ethane() {
        let mut format = Mol2Format::new(
            Source::MemoryRead(ETHANE.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert_eq!(format.nsteps().unwrap(), 1);

        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();

        assert_eq!(frame.len(), 8);
        assert_eq!(frame.topology()[0].name(), "C1");
        assert_eq!(frame.topology()[0].atomic_type(), "C");
        assert_eq!(
            frame.topology()[0]
                .get("sybyl_type")
                .unwrap()
                .as_string()
                .unwrap(),
            "C.3"
        );
        assert_eq!(frame.topology()[0].charge(), -0.294);
        assert_eq!(frame.topology().bonds().len(), 7);
        assert_eq!(
            frame.topology().bond_order(0, 1).unwrap(),
            BondOrder::Single
        );
        assert_eq!(frame.get("name").unwrap().as_string().unwrap(), "ethane");

        let residue = frame.topology().residue_for_atom(0).unwrap();
        assert_eq!(residue.name(), "ETH");
        assert_eq!(residue.len(), 8);
    }

    #[test]
    fn multiple_molecules() {
        let mut content = String::from(ETHANE);
        content.push_str(ETHANE);

        let mut format = Mol2Format::new(
            Source::MemoryRead(content.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert_eq!(format.nsteps().unwrap(), 2);

        let mut frame = Frame::new();
        format.read_step(1, &mut frame).unwrap();
        assert_eq!(frame.len(), 8);
    }
}
