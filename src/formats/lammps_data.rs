//! LAMMPS data files, as consumed by `read_data`: a free-form header with
//! counts and box bounds (including triclinic tilt factors), then named
//! sections. Masses, Atoms (several `atom_style` column layouts),
//! Velocities, and Bonds are read; everything else is skipped. Data files
//! describe a single configuration.

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
    residue::Residue,
    warnings::warning,
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "LAMMPS Data",
    extension: Some(".lmp"),
    description: "LAMMPS data file format",
    reference: Some("https://docs.lammps.org/read_data.html"),
    read: true,
    write: true,
    memory: true,
    positions: true,
    velocities: true,
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
    Ok(Box::new(LammpsDataFormat::new(source, mode, compression)?))
}

pub(crate) struct LammpsDataFormat {
    file: TextFile,
    mode: Mode,
    read_done: bool,
    written: bool,
}

impl LammpsDataFormat {
    pub fn new(source: Source, mode: Mode, compression: Compression) -> Result<LammpsDataFormat> {
        let file = TextFile::open(source, mode, compression)?;
        Ok(LammpsDataFormat {
            file,
            mode,
            read_done: false,
            written: false,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum AtomStyle {
    Atomic,
    Charge,
    Molecular,
    Full,
}

/// One parsed `Atoms` row, keyed by the LAMMPS atom id.
struct RawAtom {
    molecule: Option<i64>,
    type_: String,
    charge: f64,
    position: Vec3,
}

impl Format for LammpsDataFormat {
    fn name(&self) -> &'static str {
        "LAMMPS Data"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(if self.mode == Mode::Read { 1 } else { 0 })
    }

    fn read_step(&mut self, step: usize, frame: &mut Frame) -> Result<()> {
        if step != 0 {
            return Err(Error::Format(
                "LAMMPS data files only contain one frame".to_owned(),
            ));
        }
        self.file.rewind()?;
        self.read_done = false;
        self.read(frame)
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        if self.read_done {
            return Err(Error::Format(
                "LAMMPS data files only contain one frame".to_owned(),
            ));
        }

        // Comment line; a style hint sometimes hides here.
        let first = self.file.readline()?;
        let mut style_hint = style_from_comment(&first);

        let mut natoms = 0usize;
        let mut nbonds = 0usize;
        let mut bounds = [[0.0f64; 2]; 3];
        let mut tilt = [0.0f64; 3];

        // Header: everything until the first section title.
        let mut section: String;
        loop {
            let line = self.file.readline()?;
            let content = strip_comment(&line);
            if content.is_empty() {
                continue;
            }

            if let Some(title) = section_title(content) {
                section = title;
                break;
            }

            let fields: Vec<&str> = content.split_whitespace().collect();
            if fields.len() >= 2 && fields[1] == "atoms" {
                natoms = parse(fields[0], &line)?;
            } else if fields.len() >= 2 && fields[1] == "bonds" {
                nbonds = parse(fields[0], &line)?;
            } else if fields.len() >= 4 && fields[2] == "xlo" && fields[3] == "xhi" {
                bounds[0] = [parse(fields[0], &line)?, parse(fields[1], &line)?];
            } else if fields.len() >= 4 && fields[2] == "ylo" && fields[3] == "yhi" {
                bounds[1] = [parse(fields[0], &line)?, parse(fields[1], &line)?];
            } else if fields.len() >= 4 && fields[2] == "zlo" && fields[3] == "zhi" {
                bounds[2] = [parse(fields[0], &line)?, parse(fields[1], &line)?];
            } else if fields.len() >= 6 && fields[3] == "xy" {
                tilt = [
                    parse(fields[0], &line)?,
                    parse(fields[1], &line)?,
                    parse(fields[2], &line)?,
                ];
            }
        }

        let mut masses: HashMap<String, f64> = HashMap::new();
        let mut atoms: HashMap<i64, RawAtom> = HashMap::new();
        let mut velocities: HashMap<i64, Vec3> = HashMap::new();
        let mut bonds: Vec<(i64, i64)> = Vec::new();

        loop {
            if let Some(hint) = style_from_comment(&section) {
                style_hint = Some(hint);
            }
            let name = section
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_owned();

            // A blank line always follows the section title.
            let mut rows = Vec::new();
            let next_section = loop {
                match self.file.readline_opt()? {
                    None => break None,
                    Some(line) => {
                        let content = strip_comment(&line).to_owned();
                        if content.is_empty() {
                            continue;
                        }
                        if section_title(&content).is_some() {
                            break Some(line);
                        }
                        rows.push(content);
                    }
                }
            };

            match name.as_str() {
                "Masses" => {
                    for row in &rows {
                        let fields: Vec<&str> = row.split_whitespace().collect();
                        if fields.len() >= 2 {
                            masses.insert(fields[0].to_owned(), parse(fields[1], row)?);
                        }
                    }
                }
                "Atoms" => {
                    let style = match style_hint {
                        Some(style) => style,
                        None => guess_style(&rows),
                    };
                    for row in &rows {
                        let (id, atom) = read_atom_row(row, style)?;
                        atoms.insert(id, atom);
                    }
                }
                "Velocities" => {
                    for row in &rows {
                        let fields: Vec<&str> = row.split_whitespace().collect();
                        if fields.len() >= 4 {
                            velocities.insert(
                                parse(fields[0], row)?,
                                Vec3::new(
                                    parse(fields[1], row)?,
                                    parse(fields[2], row)?,
                                    parse(fields[3], row)?,
                                ),
                            );
                        }
                    }
                }
                "Bonds" => {
                    for row in &rows {
                        let fields: Vec<&str> = row.split_whitespace().collect();
                        if fields.len() >= 4 {
                            bonds.push((parse(fields[2], row)?, parse(fields[3], row)?));
                        }
                    }
                }
                _ => {}
            }

            match next_section {
                Some(title) => section = strip_comment(&title).to_owned(),
                None => break,
            }
        }

        if atoms.len() != natoms {
            warning!(
                "the LAMMPS data header in '{}' claims {} atoms, the Atoms section contains {}",
                self.file.path(),
                natoms,
                atoms.len()
            );
        }

        // Atoms go into the frame sorted by their LAMMPS id.
        let mut parsed = Frame::new();
        parsed.set_cell(bounds_to_cell(bounds, tilt)?);

        let mut ids: Vec<i64> = atoms.keys().copied().collect();
        ids.sort_unstable();
        let mut index_of: HashMap<i64, usize> = HashMap::new();
        let mut molecules: Vec<(i64, Residue)> = Vec::new();

        let has_velocities = !velocities.is_empty();
        for (index, id) in ids.iter().enumerate() {
            let raw = &atoms[id];
            let mut atom = Atom::new(raw.type_.clone());
            if let Some(&mass) = masses.get(&raw.type_) {
                atom.set_mass(mass);
            }
            atom.set_charge(raw.charge);

            let velocity = if has_velocities {
                Some(velocities.get(id).copied().unwrap_or_else(Vec3::new_zero))
            } else {
                None
            };
            parsed.add_atom(atom, raw.position, velocity);
            index_of.insert(*id, index);

            if let Some(molecule) = raw.molecule {
                match molecules.iter_mut().find(|(m, _)| *m == molecule) {
                    Some((_, residue)) => residue.add_atom(index),
                    None => {
                        let mut residue = Residue::with_id(format!("mol-{molecule}"), molecule);
                        residue.add_atom(index);
                        molecules.push((molecule, residue));
                    }
                }
            }
        }
        for (_, residue) in molecules {
            parsed.topology_mut().add_residue(residue)?;
        }

        if bonds.len() != nbonds {
            warning!(
                "the LAMMPS data header in '{}' claims {} bonds, the Bonds section contains {}",
                self.file.path(),
                nbonds,
                bonds.len()
            );
        }
        for (a, b) in bonds {
            match (index_of.get(&a), index_of.get(&b)) {
                (Some(&i), Some(&j)) => parsed.add_bond(i, j)?,
                _ => warning!("bond between unknown atoms {a} and {b} in LAMMPS data file"),
            }
        }

        self.read_done = true;
        *frame = parsed;
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.written {
            return Err(Error::Format(
                "LAMMPS data files can only contain one frame".to_owned(),
            ));
        }
        let topology = frame.topology();

        // Atom types are numbered in order of first appearance.
        let mut types: Vec<String> = Vec::new();
        let mut type_ids = Vec::with_capacity(frame.len());
        for atom in topology.atoms() {
            let name = if atom.atomic_type().is_empty() {
                "X".to_owned()
            } else {
                atom.atomic_type().to_owned()
            };
            let id = match types.iter().position(|t| *t == name) {
                Some(position) => position,
                None => {
                    types.push(name);
                    types.len() - 1
                }
            };
            type_ids.push(id);
        }

        writeln!(self.file, "LAMMPS data file written by mol_files")?;
        writeln!(self.file)?;
        writeln!(self.file, "{} atoms", frame.len())?;
        writeln!(self.file, "{} bonds", topology.bonds().len())?;
        writeln!(self.file, "{} atom types", types.len())?;

        let cell = frame.cell();
        let a = cell.a_vector();
        let b = cell.b_vector();
        let c = cell.c_vector();
        writeln!(self.file, "0.0 {:.6} xlo xhi", a.x)?;
        writeln!(self.file, "0.0 {:.6} ylo yhi", b.y)?;
        writeln!(self.file, "0.0 {:.6} zlo zhi", c.z)?;
        if cell.shape() == CellShape::Triclinic {
            writeln!(self.file, "{:.6} {:.6} {:.6} xy xz yz", b.x, c.x, c.y)?;
        }

        writeln!(self.file)?;
        writeln!(self.file, "Masses")?;
        writeln!(self.file)?;
        for (n, name) in types.iter().enumerate() {
            let mass = topology
                .atoms()
                .iter()
                .zip(&type_ids)
                .find(|&(_, &id)| id == n)
                .map(|(atom, _)| atom.mass())
                .unwrap_or(0.0);
            writeln!(self.file, "{} {mass} # {name}", n + 1)?;
        }

        writeln!(self.file)?;
        writeln!(self.file, "Atoms # full")?;
        writeln!(self.file)?;
        for i in 0..frame.len() {
            let molecule = topology
                .residue_for_atom(i)
                .and_then(|r| r.id())
                .unwrap_or(1);
            let position = frame.positions()[i];
            writeln!(
                self.file,
                "{} {} {} {} {:.6} {:.6} {:.6}",
                i + 1,
                molecule,
                type_ids[i] + 1,
                topology[i].charge(),
                position.x,
                position.y,
                position.z,
            )?;
        }

        if let Some(velocities) = frame.velocities() {
            writeln!(self.file)?;
            writeln!(self.file, "Velocities")?;
            writeln!(self.file)?;
            for (i, velocity) in velocities.iter().enumerate() {
                writeln!(
                    self.file,
                    "{} {:.6} {:.6} {:.6}",
                    i + 1,
                    velocity.x,
                    velocity.y,
                    velocity.z
                )?;
            }
        }

        if !topology.bonds().is_empty() {
            writeln!(self.file)?;
            writeln!(self.file, "Bonds")?;
            writeln!(self.file)?;
            for (n, bond) in topology.bonds().iter().enumerate() {
                writeln!(self.file, "{} 1 {} {}", n + 1, bond[0] + 1, bond[1] + 1)?;
            }
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

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(position) => line[..position].trim(),
        None => line.trim(),
    }
}

const SECTIONS: &[&str] = &[
    "Masses",
    "Atoms",
    "Velocities",
    "Bonds",
    "Angles",
    "Dihedrals",
    "Impropers",
    "Pair",
    "PairIJ",
    "Bond",
    "Angle",
    "Dihedral",
    "Improper",
];

fn section_title(content: &str) -> Option<String> {
    let first = content.split_whitespace().next()?;
    if SECTIONS.contains(&first) {
        Some(content.to_owned())
    } else {
        None
    }
}

fn style_from_comment(line: &str) -> Option<AtomStyle> {
    let comment = line.split('#').nth(1)?.trim();
    match comment.split_whitespace().next()? {
        "atomic" => Some(AtomStyle::Atomic),
        "charge" => Some(AtomStyle::Charge),
        "molecular" => Some(AtomStyle::Molecular),
        "full" => Some(AtomStyle::Full),
        _ => None,
    }
}

/// Without a style hint, the column count (and whether the third column is
/// an integer) mostly determines the layout.
fn guess_style(rows: &[String]) -> AtomStyle {
    let Some(first) = rows.first() else {
        return AtomStyle::Atomic;
    };
    let fields: Vec<&str> = first.split_whitespace().collect();
    match fields.len() {
        0..=5 => AtomStyle::Atomic,
        6 => {
            // full-width integers in column 3 mean id/molecule/type
            if fields[2].parse::<i64>().is_ok() {
                AtomStyle::Molecular
            } else {
                AtomStyle::Charge
            }
        }
        _ => AtomStyle::Full,
    }
}

fn read_atom_row(row: &str, style: AtomStyle) -> Result<(i64, RawAtom)> {
    let fields: Vec<&str> = row.split_whitespace().collect();
    let expected = match style {
        AtomStyle::Atomic => 5,
        AtomStyle::Charge | AtomStyle::Molecular => 6,
        AtomStyle::Full => 7,
    };
    if fields.len() < expected {
        return Err(Error::Format(format!(
            "not enough columns in LAMMPS Atoms row '{row}' for the {style:?} atom style"
        )));
    }

    let id: i64 = parse(fields[0], row)?;
    let (molecule, type_column, charge_column) = match style {
        AtomStyle::Atomic => (None, 1, None),
        AtomStyle::Charge => (None, 1, Some(2)),
        AtomStyle::Molecular => (Some(parse::<i64>(fields[1], row)?), 2, None),
        AtomStyle::Full => (Some(parse::<i64>(fields[1], row)?), 2, Some(3)),
    };

    let charge = match charge_column {
        Some(column) => parse(fields[column], row)?,
        None => 0.0,
    };
    let position_start = charge_column.unwrap_or(type_column) + 1;

    Ok((
        id,
        RawAtom {
            molecule,
            type_: fields[type_column].to_owned(),
            charge,
            position: Vec3::new(
                parse(fields[position_start], row)?,
                parse(fields[position_start + 1], row)?,
                parse(fields[position_start + 2], row)?,
            ),
        },
    ))
}

fn bounds_to_cell(bounds: [[f64; 2]; 3], tilt: [f64; 3]) -> Result<UnitCell> {
    let lx = bounds[0][1] - bounds[0][0];
    let ly = bounds[1][1] - bounds[1][0];
    let lz = bounds[2][1] - bounds[2][0];

    if lx <= 0.0 && ly <= 0.0 && lz <= 0.0 {
        return Ok(UnitCell::infinite());
    }
    if tilt == [0.0; 3] {
        UnitCell::new([lx, ly, lz])
    } else {
        UnitCell::from_vectors(
            Vec3::new(lx, 0.0, 0.0),
            Vec3::new(tilt[0], ly, 0.0),
            Vec3::new(tilt[1], tilt[2], lz),
        )
    }
}

fn parse<T: std::str::FromStr>(value: &str, line: &str) -> Result<T> {
    value.parse().map_err(|_| {
        Error::Format(format!(
            "could not parse '{value}' in LAMMPS data line '{line}'"
        ))
    })
}
