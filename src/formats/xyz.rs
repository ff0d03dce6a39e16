//! XYZ and Extended XYZ. The basic format is two header lines (atom count,
//! comment) followed by one `species x y z` line per atom. Extended XYZ
//! packs a `key=value` header into the comment line, including the unit
//! cell (`Lattice="ax ay az bx by bz cx cy cz"`) and a schema for extra
//! per-atom columns (`Properties=species:S:1:pos:R:3:...`).

use std::io::Write;
use std::sync::OnceLock;

use lin_alg::f64::Vec3;
use regex::Regex;

use crate::{
    atom::Atom,
    cell::{CellShape, UnitCell},
    error::{Error, Result},
    files::{Compression, Mode, Source, TextFile},
    formats::{Format, FormatMetadata},
    frame::Frame,
    property::Property,
    warnings::warning,
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "XYZ",
    extension: Some(".xyz"),
    description: "XYZ text format",
    reference: Some("https://openkim.org/doc/usage/extended-xyz/"),
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
    Ok(Box::new(XyzFormat::new(source, mode, compression)?))
}

pub(crate) struct XyzFormat {
    file: TextFile,
    /// Byte offset of the start of each step.
    steps: Vec<u64>,
}

impl XyzFormat {
    pub fn new(source: Source, mode: Mode, compression: Compression) -> Result<XyzFormat> {
        let mut file = TextFile::open(source, mode, compression)?;

        let mut steps = Vec::new();
        if mode == Mode::Read {
            while !file.eof() {
                let position = file.tell()?;
                if forward(&mut file)? {
                    steps.push(position);
                }
            }
            file.rewind()?;
        }

        Ok(XyzFormat { file, steps })
    }
}

impl Format for XyzFormat {
    fn name(&self) -> &'static str {
        "XYZ"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(self.steps.len())
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        let natoms: usize = self.file.readline()?.trim().parse().map_err(|_| {
            Error::Format(format!(
                "can not read the atom count in '{}' as XYZ",
                self.file.path()
            ))
        })?;
        let comment = self.file.readline()?;

        let mut parsed = Frame::new();
        let columns = read_comment_line(&comment, &mut parsed);

        let lines = self.file.readlines(natoms).map_err(|_| {
            Error::Format(format!(
                "not enough lines in '{}' for XYZ format",
                self.file.path()
            ))
        })?;
        for line in &lines {
            read_atom_line(line, &columns, &mut parsed)?;
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

        writeln!(self.file, "{}", frame.len())?;
        writeln!(self.file, "{}", write_comment_line(frame))?;

        let extra = extra_columns(frame);
        let velocities = frame.velocities();
        for i in 0..frame.len() {
            let name = frame.topology()[i].name();
            let name = if name.is_empty() { "X" } else { name };
            let position = frame.positions()[i];
            write!(
                self.file,
                "{} {:?} {:?} {:?}",
                name, position.x, position.y, position.z
            )?;

            if let Some(velocities) = velocities {
                let velocity = velocities[i];
                write!(
                    self.file,
                    " {:?} {:?} {:?}",
                    velocity.x, velocity.y, velocity.z
                )?;
            }

            for (column_name, _) in &extra {
                // The schema guarantees every atom carries this property.
                match frame.topology()[i].get(column_name).expect("schema") {
                    Property::Bool(true) => write!(self.file, " T")?,
                    Property::Bool(false) => write!(self.file, " F")?,
                    Property::Double(value) => write!(self.file, " {value:?}")?,
                    Property::String(value) => write!(self.file, " {value}")?,
                    Property::Vector3(value) => {
                        write!(self.file, " {:?} {:?} {:?}", value.x, value.y, value.z)?;
                    }
                }
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

/// Skip one step, returning `false` if the file does not contain one more
/// step.
fn forward(file: &mut TextFile) -> Result<bool> {
    let line = match file.readline_opt()? {
        Some(line) => line,
        None => return Ok(false),
    };

    let natoms: i64 = match line.trim().parse() {
        Ok(natoms) => natoms,
        // Not an atom count, give up here.
        Err(_) => return Ok(false),
    };
    if natoms < 0 {
        return Err(Error::Format(format!(
            "the number of atoms can not be negative in '{}'",
            file.path()
        )));
    }

    if file.readlines(natoms as usize + 1).is_err() {
        return Err(Error::Format(format!(
            "not enough lines in '{}' for XYZ format",
            file.path()
        )));
    }
    Ok(true)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColumnKind {
    String,
    Double,
    Bool,
    Int,
}

#[derive(Clone, Debug)]
struct Column {
    name: String,
    kind: ColumnKind,
    count: usize,
}

/// The implicit basic-XYZ schema.
fn default_columns() -> Vec<Column> {
    vec![
        Column {
            name: "species".into(),
            kind: ColumnKind::String,
            count: 1,
        },
        Column {
            name: "pos".into(),
            kind: ColumnKind::Double,
            count: 3,
        },
    ]
}

fn key_value_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)=("[^"]*"|\S+)"#).expect("hard-coded regex")
    })
}

/// Parse the comment line: unit cell, per-atom column schema, and other
/// frame-level properties. Anything unusable degrades with a warning, never
/// an error.
fn read_comment_line(comment: &str, frame: &mut Frame) -> Vec<Column> {
    let mut columns = default_columns();
    if !comment.contains('=') {
        return columns;
    }

    for capture in key_value_regex().captures_iter(comment) {
        let key = &capture[1];
        let raw = &capture[2];
        let (value, quoted) = match raw.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            Some(inner) => (inner, true),
            None => (raw, false),
        };

        if key == "Lattice" {
            match read_lattice(value) {
                Ok(cell) => frame.set_cell(cell),
                Err(_) => {
                    warning!("invalid Lattice in extended XYZ comment line: '{value}'");
                }
            }
        } else if key == "Properties" {
            match read_properties_schema(value) {
                Some(schema) => columns = schema,
                None => {
                    warning!(
                        "invalid Properties in extended XYZ comment line: '{value}', only reading positions"
                    );
                    columns = default_columns();
                }
            }
        } else {
            frame.set(key, parse_value(value, quoted));
        }
    }

    columns
}

fn read_lattice(value: &str) -> Result<UnitCell> {
    let numbers: Vec<f64> = value
        .split_whitespace()
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Format("non-numeric Lattice entry".into()))?;
    if numbers.len() != 9 {
        return Err(Error::Format("Lattice must contain 9 values".into()));
    }
    UnitCell::from_vectors(
        Vec3::new(numbers[0], numbers[1], numbers[2]),
        Vec3::new(numbers[3], numbers[4], numbers[5]),
        Vec3::new(numbers[6], numbers[7], numbers[8]),
    )
}

fn read_properties_schema(value: &str) -> Option<Vec<Column>> {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() % 3 != 0 || parts.is_empty() {
        return None;
    }

    let mut columns = Vec::new();
    for triple in parts.chunks(3) {
        let name = triple[0];
        if name.is_empty() {
            return None;
        }
        let kind = match triple[1] {
            "S" => ColumnKind::String,
            "R" => ColumnKind::Double,
            "L" => ColumnKind::Bool,
            "I" => ColumnKind::Int,
            _ => return None,
        };
        let count: usize = match triple[2].parse() {
            Ok(count) if count > 0 => count,
            _ => return None,
        };
        columns.push(Column {
            name: name.to_owned(),
            kind,
            count,
        });
    }

    // Positions are not optional.
    if !columns
        .iter()
        .any(|c| c.name == "pos" && c.kind == ColumnKind::Double && c.count == 3)
    {
        return None;
    }
    Some(columns)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "T" | "true" | "TRUE" => Some(true),
        "F" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Type a frame-level `key=value`: quoted values are strings, then bools,
/// then numbers, then strings again.
fn parse_value(value: &str, quoted: bool) -> Property {
    if quoted {
        return Property::String(value.to_owned());
    }
    if let Some(boolean) = parse_bool(value) {
        return Property::Bool(boolean);
    }
    if let Ok(number) = value.parse::<f64>() {
        return Property::Double(number);
    }
    Property::String(value.to_owned())
}

fn read_atom_line(line: &str, columns: &[Column], frame: &mut Frame) -> Result<()> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let expected: usize = columns.iter().map(|c| c.count).sum();
    if fields.len() < expected {
        return Err(Error::Format(format!(
            "not enough columns in XYZ atom line '{line}': expected {expected}, got {}",
            fields.len()
        )));
    }

    let mut atom = Atom::new("");
    let mut position = Vec3::new_zero();
    let mut velocity = None;

    let mut field = 0;
    for column in columns {
        let values = &fields[field..field + column.count];
        field += column.count;

        match (column.name.as_str(), column.count) {
            ("species", 1) => atom = Atom::new(values[0]),
            ("pos", 3) => {
                position = Vec3::new(
                    parse_coordinate(values[0], line)?,
                    parse_coordinate(values[1], line)?,
                    parse_coordinate(values[2], line)?,
                );
            }
            ("velo", 3) => {
                velocity = Some(Vec3::new(
                    parse_coordinate(values[0], line)?,
                    parse_coordinate(values[1], line)?,
                    parse_coordinate(values[2], line)?,
                ));
            }
            (name, 1) => match column.kind {
                ColumnKind::String => atom.set(name, values[0]),
                ColumnKind::Double | ColumnKind::Int => {
                    let value: f64 = values[0].parse().map_err(|_| {
                        Error::Format(format!(
                            "invalid value for column '{name}' in XYZ atom line '{line}'"
                        ))
                    })?;
                    atom.set(name, value);
                }
                ColumnKind::Bool => {
                    let value = parse_bool(values[0]).ok_or_else(|| {
                        Error::Format(format!(
                            "invalid boolean for column '{name}' in XYZ atom line '{line}'"
                        ))
                    })?;
                    atom.set(name, value);
                }
            },
            (name, 3) if column.kind == ColumnKind::Double => {
                atom.set(
                    name,
                    Vec3::new(
                        parse_coordinate(values[0], line)?,
                        parse_coordinate(values[1], line)?,
                        parse_coordinate(values[2], line)?,
                    ),
                );
            }
            (name, _) => {
                // Unsupported cardinality: consume the columns, keep nothing.
                warning!("ignoring unsupported extended XYZ column '{name}'");
            }
        }
    }

    frame.add_atom(atom, position, velocity);
    Ok(())
}

fn parse_coordinate(value: &str, line: &str) -> Result<f64> {
    value.parse().map_err(|_| {
        Error::Format(format!("invalid coordinate in XYZ atom line '{line}'"))
    })
}

/// Extra per-atom columns for writing: the properties every atom carries
/// with a consistent type.
fn extra_columns(frame: &Frame) -> Vec<(String, ColumnKind)> {
    let atoms = frame.topology().atoms();
    let Some(first) = atoms.first() else {
        return Vec::new();
    };

    let mut columns = Vec::new();
    for (name, property) in first.properties() {
        let kind = match property {
            Property::Bool(_) => ColumnKind::Bool,
            Property::Double(_) => ColumnKind::Double,
            Property::String(_) => ColumnKind::String,
            Property::Vector3(_) => ColumnKind::Double,
        };
        let vector = matches!(property, Property::Vector3(_));
        let consistent = atoms.iter().all(|atom| match atom.get(name) {
            Some(Property::Bool(_)) => kind == ColumnKind::Bool && !vector,
            Some(Property::Double(_)) => kind == ColumnKind::Double && !vector,
            Some(Property::String(_)) => kind == ColumnKind::String,
            Some(Property::Vector3(_)) => vector,
            None => false,
        });
        if consistent {
            columns.push((name.clone(), kind));
        }
    }
    columns
}

fn write_comment_line(frame: &Frame) -> String {
    let mut comment = String::from("Properties=species:S:1:pos:R:3");
    if frame.velocities().is_some() {
        comment.push_str(":velo:R:3");
    }
    for (name, kind) in extra_columns(frame) {
        let is_vector = frame
            .topology()
            .atoms()
            .first()
            .and_then(|atom| atom.get(&name))
            .is_some_and(|p| matches!(p, Property::Vector3(_)));
        let tag = match kind {
            ColumnKind::String => "S",
            ColumnKind::Bool => "L",
            ColumnKind::Double | ColumnKind::Int => "R",
        };
        let count = if is_vector { 3 } else { 1 };
        comment.push_str(&format!(":{name}:{tag}:{count}"));
    }

    if frame.cell().shape() != CellShape::Infinite {
        let a = frame.cell().a_vector();
        let b = frame.cell().b_vector();
        let c = frame.cell().c_vector();
        comment.push_str(&format!(
            " Lattice=\"{} {} {} {} {} {} {} {} {}\"",
            a.x, a.y, a.z, b.x, b.y, b.z, c.x, c.y, c.z
        ));
    }

    for (key, property) in frame.properties() {
        match property {
            Property::Bool(true) => comment.push_str(&format!(" {key}=T")),
            Property::Bool(false) => comment.push_str(&format!(" {key}=F")),
            Property::Double(value) => comment.push_str(&format!(" {key}={value}")),
            Property::String(value) => {
                if !value.is_empty()
                    && !value.contains(|c: char| c.is_whitespace() || c == '"' || c == '=')
                {
                    comment.push_str(&format!(" {key}={value}"));
                } else {
                    comment.push_str(&format!(" {key}=\"{value}\""));
                }
            }
            Property::Vector3(value) => {
                comment.push_str(&format!(" {key}=\"{} {} {}\"", value.x, value.y, value.z));
            }
        }
    }

    comment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_first_frame(content: &str) -> Frame {
        let mut format = XyzFormat::new(
            Source::MemoryRead(content.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();
        frame
    }

    #[test]
    fn basic_file() {
        let content = "3\ncomment line\nO 0.0 0.0 1.0\nH 1.0 0.0 0.0\nH -1.0 0.0 0.0\n";
        let frame = read_first_frame(content);

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.topology()[0].name(), "O");
        assert_eq!(frame.positions()[0].z, 1.0);
        assert_eq!(frame.positions()[2].x, -1.0);
        assert_eq!(frame.cell().shape(), CellShape::Infinite);
    }

    #[test]
    fn step_scanning() {
        let content = "2\nfirst\nO 0.0 0.0 0.0\nH 1.0 0.0 0.0\n2\nsecond\nO 0.0 0.0 2.0\nH 1.0 0.0 2.0\n";
        let mut format = XyzFormat::new(
            Source::MemoryRead(content.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert_eq!(format.nsteps().unwrap(), 2);

        let mut frame = Frame::new();
        format.read_step(1, &mut frame).unwrap();
        assert_eq!(frame.positions()[0].z, 2.0);

        // A sequential read continues past the random-accessed step.
        format.read_step(0, &mut frame).unwrap();
        format.read(&mut frame).unwrap();
        assert_eq!(frame.positions()[0].z, 2.0);
    }

    #[test]
    fn extended_header() {
        let content = "2\nProperties=species:S:1:pos:R:3:charge:R:1 Lattice=\"10 0 0 0 10 0 0 0 10\" Energy=-12.5 name=\"test system\"\nO 0.0 0.0 1.0 -0.8\nH 1.0 0.0 0.0 0.4\n";
        let frame = read_first_frame(content);

        assert_eq!(frame.cell().lengths(), [10.0, 10.0, 10.0]);
        assert_eq!(frame.cell().shape(), CellShape::Orthorhombic);
        assert_eq!(
            frame.topology()[0].get("charge").unwrap().as_double().unwrap(),
            -0.8
        );
        assert_eq!(frame.get("Energy").unwrap().as_double().unwrap(), -12.5);
        assert_eq!(
            frame.get("name").unwrap().as_string().unwrap(),
            "test system"
        );
    }

    #[test]
    fn bad_properties_fall_back_to_positions() {
        use std::sync::{Arc, Mutex};

        let warnings = Arc::new(Mutex::new(Vec::new()));
        let sink = warnings.clone();
        crate::set_warning_callback(move |message: &str| {
            sink.lock().unwrap().push(message.to_owned());
        });

        let content = "2\nProperties=species:S:1:pos:R:3:bad:R:\nO 0.0 0.0 1.0\nH 1.0 0.0 0.0\n";
        let frame = read_first_frame(content);
        crate::reset_warning_callback();

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.positions()[0].z, 1.0);
        assert!(frame.topology()[0].get("bad").is_none());
        assert!(
            warnings
                .lock()
                .unwrap()
                .iter()
                .any(|w| w.contains("Properties"))
        );
    }

    #[test]
    fn boolean_columns() {
        let content = "2\nProperties=species:S:1:pos:R:3:frozen:L:1\nO 0.0 0.0 1.0 T\nH 1.0 0.0 0.0 false\n";
        let frame = read_first_frame(content);
        assert!(frame.topology()[0].get("frozen").unwrap().as_bool().unwrap());
        assert!(!frame.topology()[1].get("frozen").unwrap().as_bool().unwrap());
    }
}
