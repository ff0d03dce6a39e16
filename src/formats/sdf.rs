//! SDF / MDL molfiles (V2000). A record is three header lines, a counts
//! line, an atom block, a bond block, `M` property lines up to `M  END`,
//! and `> <key>` data items. Records are separated by `$$$$`, which makes
//! the format naturally multi-frame.

use std::io::Write;

use lin_alg::f64::Vec3;

use crate::{
    atom::Atom,
    connectivity::BondOrder,
    error::{Error, Result},
    files::{Compression, Mode, Source, TextFile},
    formats::{Format, FormatMetadata},
    frame::Frame,
    warnings::warning,
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "SDF",
    extension: Some(".sdf"),
    description: "Structural Data File (MDL molfile) text format",
    reference: Some("https://en.wikipedia.org/wiki/Chemical_table_file#SDF"),
    read: true,
    write: true,
    memory: true,
    positions: true,
    velocities: false,
    unit_cell: false,
    atoms: true,
    bonds: true,
    residues: false,
};

pub(crate) fn builder(
    source: Source,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>> {
    Ok(Box::new(SdfFormat::new(source, mode, compression)?))
}

pub(crate) struct SdfFormat {
    file: TextFile,
    steps: Vec<u64>,
}

impl SdfFormat {
    pub fn new(source: Source, mode: Mode, compression: Compression) -> Result<SdfFormat> {
        let mut file = TextFile::open(source, mode, compression)?;

        let mut steps = Vec::new();
        if mode == Mode::Read {
            // The first record starts at 0; each $$$$ ends a record.
            let mut record_start = Some(0);
            loop {
                let line = match file.readline_opt()? {
                    Some(line) => line,
                    None => break,
                };
                if let Some(start) = record_start.take() {
                    steps.push(start);
                }
                if line.starts_with("$$$$") {
                    record_start = Some(file.tell()?);
                }
            }
            file.rewind()?;
        }

        Ok(SdfFormat { file, steps })
    }
}

impl Format for SdfFormat {
    fn name(&self) -> &'static str {
        "SDF"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(self.steps.len())
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        let mut parsed = Frame::new();

        let name = self.file.readline()?;
        if !name.trim().is_empty() {
            parsed.set("name", name.trim());
        }
        // Program line and comment line.
        self.file.readline()?;
        self.file.readline()?;

        let counts = self.file.readline()?;
        if counts.len() < 6 {
            return Err(Error::Format(format!(
                "SDF counts line is too short: '{counts}'"
            )));
        }
        let natoms: usize = counts[0..3].trim().parse().map_err(|_| {
            Error::Format(format!("invalid atom count in SDF counts line: '{counts}'"))
        })?;
        let nbonds: usize = counts[3..6].trim().parse().map_err(|_| {
            Error::Format(format!("invalid bond count in SDF counts line: '{counts}'"))
        })?;

        for line in self.file.readlines(natoms)? {
            if line.len() < 34 {
                return Err(Error::Format(format!("SDF atom line is too short: '{line}'")));
            }
            let x: f64 = line[0..10].trim().parse().map_err(|_| {
                Error::Format(format!("invalid coordinate in SDF atom line: '{line}'"))
            })?;
            let y: f64 = line[10..20].trim().parse().map_err(|_| {
                Error::Format(format!("invalid coordinate in SDF atom line: '{line}'"))
            })?;
            let z: f64 = line[20..30].trim().parse().map_err(|_| {
                Error::Format(format!("invalid coordinate in SDF atom line: '{line}'"))
            })?;
            let symbol = line[31..34.min(line.len())].trim();
            parsed.add_atom(Atom::new(symbol), Vec3::new(x, y, z), None);
        }

        for line in self.file.readlines(nbonds)? {
            if line.len() < 9 {
                return Err(Error::Format(format!("SDF bond line is too short: '{line}'")));
            }
            let i: usize = line[0..3].trim().parse().map_err(|_| {
                Error::Format(format!("invalid atom id in SDF bond line: '{line}'"))
            })?;
            let j: usize = line[3..6].trim().parse().map_err(|_| {
                Error::Format(format!("invalid atom id in SDF bond line: '{line}'"))
            })?;
            if i == 0 || j == 0 || i > parsed.len() || j > parsed.len() {
                return Err(Error::Format(format!(
                    "atom id out of range in SDF bond line: '{line}'"
                )));
            }
            let order = match line[6..9].trim() {
                "1" => BondOrder::Single,
                "2" => BondOrder::Double,
                "3" => BondOrder::Triple,
                "4" => BondOrder::Aromatic,
                other => {
                    warning!("unknown SDF bond type '{other}', using an unknown bond order");
                    BondOrder::Unknown
                }
            };
            parsed.add_bond_with_order(i - 1, j - 1, order)?;
        }

        // Properties block, then data items until $$$$ or end of file.
        loop {
            let line = match self.file.readline_opt()? {
                Some(line) => line,
                None => break,
            };
            if line.starts_with("M  END") {
                break;
            }
            if line.starts_with("M  CHG") {
                read_charges(&line, &mut parsed);
            }
            if line.starts_with("$$$$") {
                *frame = parsed;
                return Ok(());
            }
        }

        let mut key: Option<String> = None;
        let mut value = String::new();
        loop {
            let line = match self.file.readline_opt()? {
                Some(line) => line,
                None => break,
            };
            if line.starts_with("$$$$") {
                break;
            }
            if let Some(rest) = line.trim().strip_prefix('>') {
                if let Some(previous) = key.take() {
                    parsed.set(previous, value.trim().to_owned());
                    value.clear();
                }
                let name = rest.trim();
                key = name
                    .strip_prefix('<')
                    .and_then(|n| n.strip_suffix('>'))
                    .map(str::to_owned);
            } else if key.is_some() {
                if !value.is_empty() {
                    value.push('\n');
                }
                value.push_str(&line);
            }
        }
        if let Some(previous) = key.take() {
            parsed.set(previous, value.trim().to_owned());
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

        match frame.get("name").and_then(|p| p.as_string().ok()) {
            Some(name) => writeln!(self.file, "{name}")?,
            None => writeln!(self.file)?,
        }
        writeln!(self.file, " mol_files")?;
        writeln!(self.file)?;
        writeln!(
            self.file,
            "{:>3}{:>3}  0     0  0  0  0  0  0999 V2000",
            frame.len(),
            topology.bonds().len()
        )?;

        let mut charges = Vec::new();
        for i in 0..frame.len() {
            let atom = &topology[i];
            let position = frame.positions()[i];
            let symbol = if atom.atomic_type().is_empty() {
                "Xxx"
            } else {
                atom.atomic_type()
            };
            writeln!(
                self.file,
                "{:>10.4}{:>10.4}{:>10.4} {:<3} 0  0  0  0  0  0  0  0  0  0  0  0",
                position.x, position.y, position.z, symbol
            )?;
            if atom.charge() != 0.0 {
                charges.push((i + 1, atom.charge().round() as i64));
            }
        }

        for (n, bond) in topology.bonds().iter().enumerate() {
            let order = match topology.bond_orders()[n] {
                BondOrder::Double => "2",
                BondOrder::Triple => "3",
                BondOrder::Aromatic => "4",
                _ => "1",
            };
            writeln!(
                self.file,
                "{:>3}{:>3}{:>3}  0  0  0  0",
                bond[0] + 1,
                bond[1] + 1,
                order
            )?;
        }

        for chunk in charges.chunks(8) {
            write!(self.file, "M  CHG{:>3}", chunk.len())?;
            for (serial, charge) in chunk {
                write!(self.file, "{serial:>4}{charge:>4}")?;
            }
            writeln!(self.file)?;
        }
        writeln!(self.file, "M  END")?;

        for (name, property) in frame.properties() {
            if name == "name" {
                continue;
            }
            if let Ok(value) = property.as_string() {
                writeln!(self.file, "> <{name}>")?;
                writeln!(self.file, "{value}")?;
                writeln!(self.file)?;
            }
        }

        writeln!(self.file, "$$$$")?;
        self.file.flush()?;
        self.steps.push(position);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// `M  CHG  n aaa vvv aaa vvv ...`
fn read_charges(line: &str, frame: &mut Frame) {
    let fields: Vec<&str> = line.split_whitespace().skip(3).collect();
    for pair in fields.chunks(2) {
        if pair.len() != 2 {
            warning!("incomplete M CHG record in SDF file: '{line}'");
            break;
        }
        match (pair[0].parse::<usize>(), pair[1].parse::<f64>()) {
            (Ok(serial), Ok(charge)) if serial >= 1 && serial <= frame.len() => {
                frame.topology_mut()[serial - 1].set_charge(charge);
            }
            _ => {
                warning!("invalid M CHG record in SDF file: '{line}'");
                break;
            }
        }
    }
}
