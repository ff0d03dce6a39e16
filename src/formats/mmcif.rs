//! mmCIF (PDBx) files: CIF syntax with the crystallographic `_cell` items
//! and the `_atom_site` loop. Multiple models in the loop become multiple
//! frames. The whole file is parsed once at open; CIF loops interleave
//! badly with on-demand seeking.

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
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "mmCIF",
    extension: Some(".mmcif"),
    description: "mmCIF (PDBx/mmCIF) crystallographic text format",
    reference: Some("http://mmcif.wwpdb.org/"),
    read: true,
    write: true,
    memory: true,
    positions: true,
    velocities: false,
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
    Ok(Box::new(MmcifFormat::new(source, mode, compression)?))
}

pub(crate) struct MmcifFormat {
    file: TextFile,
    frames: Vec<Frame>,
    current: usize,
    models_written: usize,
}

impl MmcifFormat {
    pub fn new(source: Source, mode: Mode, compression: Compression) -> Result<MmcifFormat> {
        let mut file = TextFile::open(source, mode, compression)?;

        let mut frames = Vec::new();
        if mode == Mode::Read {
            frames = parse_file(&mut file)?;
        }

        Ok(MmcifFormat {
            file,
            frames,
            current: 0,
            models_written: 0,
        })
    }
}

impl Format for MmcifFormat {
    fn name(&self) -> &'static str {
        "mmCIF"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(self.frames.len())
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        let step = self.current;
        self.read_step(step, frame)
    }

    fn read_step(&mut self, step: usize, frame: &mut Frame) -> Result<()> {
        let parsed = self.frames.get(step).ok_or_else(|| {
            Error::Format(format!(
                "step {step} is out of range in '{}'",
                self.file.path()
            ))
        })?;
        *frame = parsed.clone();
        self.current = step + 1;
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.models_written == 0 {
            writeln!(self.file, "data_mol_files")?;

            if frame.cell().shape() != CellShape::Infinite {
                let [a, b, c] = frame.cell().lengths();
                let [alpha, beta, gamma] = frame.cell().angles();
                writeln!(self.file, "_cell.length_a {a:.4}")?;
                writeln!(self.file, "_cell.length_b {b:.4}")?;
                writeln!(self.file, "_cell.length_c {c:.4}")?;
                writeln!(self.file, "_cell.angle_alpha {alpha:.4}")?;
                writeln!(self.file, "_cell.angle_beta {beta:.4}")?;
                writeln!(self.file, "_cell.angle_gamma {gamma:.4}")?;
            }

            writeln!(self.file, "loop_")?;
            for tag in [
                "group_PDB",
                "id",
                "type_symbol",
                "label_atom_id",
                "label_comp_id",
                "label_asym_id",
                "label_seq_id",
                "Cartn_x",
                "Cartn_y",
                "Cartn_z",
                "pdbx_PDB_model_num",
            ] {
                writeln!(self.file, "_atom_site.{tag}")?;
            }
        }
        self.models_written += 1;

        let topology = frame.topology();
        for i in 0..frame.len() {
            let atom = &topology[i];
            let residue = topology.residue_for_atom(i);
            let group = match residue.and_then(|r| r.get("is_standard_pdb")) {
                Some(Property::Bool(true)) => "ATOM",
                _ => "HETATM",
            };
            let resname = residue.map(|r| r.name()).unwrap_or("UNK");
            let resid = residue.and_then(|r| r.id()).unwrap_or(i as i64 + 1);
            let chain = residue
                .and_then(|r| r.get("chainid"))
                .and_then(|p| p.as_string().ok().map(str::to_owned))
                .unwrap_or_else(|| "A".to_owned());

            let p = frame.positions()[i];
            writeln!(
                self.file,
                "{group} {id} {type_} {name} {resname} {chain} {resid} {x:.5} {y:.5} {z:.5} {model}",
                id = i + 1,
                type_ = cif_value(atom.atomic_type()),
                name = cif_value(atom.name()),
                resname = cif_value(resname),
                chain = cif_value(&chain),
                x = p.x,
                y = p.y,
                z = p.z,
                model = self.models_written,
            )?;
        }

        self.file.flush()?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

fn cif_value(value: &str) -> String {
    if value.is_empty() {
        "?".to_owned()
    } else if value.contains(char::is_whitespace) {
        format!("'{value}'")
    } else {
        value.to_owned()
    }
}

/// Split a CIF data line into values, honoring single and double quotes.
fn split_values(line: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '\'' || c == '"' {
            chars.next();
            let mut value = String::new();
            for inner in chars.by_ref() {
                if inner == c {
                    break;
                }
                value.push(inner);
            }
            values.push(value);
        } else {
            let mut value = String::new();
            while let Some(&inner) = chars.peek() {
                if inner.is_whitespace() {
                    break;
                }
                value.push(inner);
                chars.next();
            }
            values.push(value);
        }
    }
    values
}

struct AtomSiteRow {
    group: Option<String>,
    type_symbol: String,
    name: String,
    resname: Option<String>,
    chain: Option<String>,
    resid: Option<i64>,
    position: Vec3,
    model: i64,
}

fn parse_file(file: &mut TextFile) -> Result<Vec<Frame>> {
    let mut cell: Option<UnitCell> = None;
    let mut cell_lengths = [0.0f64; 3];
    let mut cell_angles = [90.0f64; 3];
    let mut has_cell = false;

    let mut rows: Vec<AtomSiteRow> = Vec::new();

    let mut pending: Option<String> = None;
    loop {
        let line = match pending.take() {
            Some(line) => line,
            None => match file.readline_opt()? {
                Some(line) => line,
                None => break,
            },
        };
        let trimmed = line.trim();

        if trimmed.starts_with('#') || trimmed.is_empty() || trimmed.starts_with("data_") {
            continue;
        }

        if trimmed.starts_with(';') {
            // Multi-line text block: skip until the closing ';'.
            loop {
                match file.readline_opt()? {
                    Some(inner) if inner.trim_start().starts_with(';') && !inner.trim().is_empty() => {
                        break;
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("_cell.") {
            let mut fields = item.split_whitespace();
            let (Some(tag), Some(value)) = (fields.next(), fields.next()) else {
                continue;
            };
            let value: f64 = match value.parse() {
                Ok(value) => value,
                Err(_) => continue,
            };
            has_cell = true;
            match tag {
                "length_a" => cell_lengths[0] = value,
                "length_b" => cell_lengths[1] = value,
                "length_c" => cell_lengths[2] = value,
                "angle_alpha" => cell_angles[0] = value,
                "angle_beta" => cell_angles[1] = value,
                "angle_gamma" => cell_angles[2] = value,
                _ => {}
            }
            continue;
        }

        if trimmed == "loop_" {
            // Collect the tags of this loop.
            let mut tags = Vec::new();
            let mut data_line: Option<String> = None;
            loop {
                match file.readline_opt()? {
                    Some(inner) => {
                        let inner_trimmed = inner.trim();
                        if inner_trimmed.starts_with('_') {
                            tags.push(inner_trimmed.to_owned());
                        } else {
                            data_line = Some(inner);
                            break;
                        }
                    }
                    None => break,
                }
            }

            let is_atom_site = tags.iter().any(|t| t.starts_with("_atom_site."));
            let columns: HashMap<String, usize> = tags
                .iter()
                .enumerate()
                .map(|(n, tag)| (tag.clone(), n))
                .collect();

            // Walk the data rows until something that is not a row.
            let mut row_line = data_line;
            while let Some(line) = row_line.take() {
                let trimmed = line.trim();
                if trimmed.is_empty()
                    || trimmed == "loop_"
                    || trimmed.starts_with('_')
                    || trimmed.starts_with("data_")
                    || trimmed.starts_with('#')
                {
                    pending = Some(line);
                    break;
                }

                if is_atom_site {
                    let values = split_values(trimmed);
                    if let Some(row) = atom_site_row(&columns, &values) {
                        rows.push(row);
                    }
                }
                row_line = file.readline_opt()?;
            }
            continue;
        }
    }

    if has_cell {
        cell = Some(UnitCell::triclinic(cell_lengths, cell_angles)?);
    }

    // Group rows into frames by model number, in file order.
    let mut frames: Vec<Frame> = Vec::new();
    let mut models: Vec<i64> = Vec::new();
    for row in rows {
        let frame = match models.iter().position(|&m| m == row.model) {
            Some(position) => &mut frames[position],
            None => {
                models.push(row.model);
                let mut frame = Frame::new();
                if let Some(cell) = &cell {
                    frame.set_cell(cell.clone());
                }
                frames.push(frame);
                frames.last_mut().expect("just pushed")
            }
        };

        let index = frame.len();
        let atom = if row.type_symbol.is_empty() {
            Atom::new(row.name.clone())
        } else {
            Atom::with_type(row.name.clone(), row.type_symbol.clone())
        };
        frame.add_atom(atom, row.position, None);

        if let Some(resname) = &row.resname {
            let resid = row.resid.unwrap_or(0);
            let chain = row.chain.clone().unwrap_or_default();
            let topology = frame.topology_mut();

            let matches = |residue: &Residue| {
                residue.name() == resname
                    && residue.id() == Some(resid)
                    && residue
                        .get("chainid")
                        .and_then(|p| p.as_string().ok())
                        .unwrap_or("")
                        == chain
            };
            let position = match topology.residues().iter().position(matches) {
                Some(position) => position,
                None => {
                    let mut residue = Residue::with_id(resname.clone(), resid);
                    residue.set("chainid", chain.clone());
                    if row.group.as_deref() == Some("ATOM") {
                        residue.set("is_standard_pdb", true);
                    }
                    topology.add_residue(residue)?;
                    topology.residues().len() - 1
                }
            };
            topology.add_atom_to_residue(position, index)?;
        }
    }

    Ok(frames)
}

fn atom_site_row(columns: &HashMap<String, usize>, values: &[String]) -> Option<AtomSiteRow> {
    let get = |tag: &str| -> Option<&str> {
        columns
            .get(&format!("_atom_site.{tag}"))
            .and_then(|&n| values.get(n))
            .map(String::as_str)
            .filter(|v| *v != "." && *v != "?")
    };

    let x: f64 = get("Cartn_x")?.parse().ok()?;
    let y: f64 = get("Cartn_y")?.parse().ok()?;
    let z: f64 = get("Cartn_z")?.parse().ok()?;

    Some(AtomSiteRow {
        group: get("group_PDB").map(str::to_owned),
        type_symbol: get("type_symbol").unwrap_or("").to_owned(),
        name: get("label_atom_id")
            .or_else(|| get("auth_atom_id"))
            .unwrap_or("")
            .to_owned(),
        resname: get("label_comp_id")
            .or_else(|| get("auth_comp_id"))
            .map(str::to_owned),
        chain: get("label_asym_id")
            .or_else(|| get("auth_asym_id"))
            .map(str::to_owned),
        resid: get("label_seq_id")
            .or_else(|| get("auth_seq_id"))
            .and_then(|v| v.parse().ok()),
        position: Vec3::new(x, y, z),
        model: get("pdbx_PDB_model_num")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MMCIF: &str = "\
data_test
_cell.length_a 15.0
_cell.length_b 15.0
_cell.length_c 15.0
_cell.angle_alpha 90.0
_cell.angle_beta 90.0
_cell.angle_gamma 90.0
loop_
_atom_site.group_PDB
_atom_site.id
_atom_site.type_symbol
_atom_site.label_atom_id
_atom_site.label_comp_id
_atom_site.label_asym_id
_atom_site.label_seq_id
_atom_site.Cartn_x
_atom_site.Cartn_y
_atom_site.Cartn_z
_atom_site.pdbx_PDB_model_num
ATOM 1 O O HOH A 1 0.417 8.303 11.737 1
ATOM 2 H H1 HOH A 1 1.320 8.480 12.003 1
ATOM 3 H H2 HOH A 1 0.379 8.650 10.843 1
ATOM 1 O O HOH A 1 0.500 8.303 11.737 2
ATOM 2 H H1 HOH A 1 1.400 8.480 12.003 2
ATOM 3 H H2 HOH A 1 0.450 8.650 10.843 2
";

    #[test]
    fn two_models() {
        let mut format = MmcifFormat::new(
            Source::MemoryRead(MMCIF.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert_eq!(format.nsteps().unwrap(), 2);

        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.topology()[1].name(), "H1");
        assert_eq!(frame.cell().lengths(), [15.0, 15.0, 15.0]);
        assert_eq!(frame.positions()[0].x, 0.417);

        let residue = frame.topology().residue_for_atom(0).unwrap();
        assert_eq!(residue.name(), "HOH");
        assert_eq!(residue.len(), 3);

        format.read(&mut frame).unwrap();
        assert_eq!(frame.positions()[0].x, 0.5);
    }

    #[test]
    fn quoted_values() {
        assert_eq!(split_values("A 'b c' \"d e\" f"), vec![
            "A".to_owned(),
            "b c".to_owned(),
            "d e".to_owned(),
            "f".to_owned(),
        ]);
    }
}
