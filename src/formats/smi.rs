//! SMILES strings, one molecule per line. SMILES carries topology only:
//! atoms come out at the origin, with bond orders, aromaticity, charges,
//! explicit hydrogen counts, and chirality descriptors attached, but no
//! coordinates.

use std::collections::HashMap;
use std::io::Write;

use lin_alg::f64::Vec3;

use crate::{
    atom::Atom,
    connectivity::BondOrder,
    error::{Error, Result},
    files::{Compression, Mode, Source, TextFile},
    formats::{Format, FormatMetadata},
    frame::Frame,
    property::Property,
    warnings::warning,
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "SMI",
    extension: Some(".smi"),
    description: "SMILES text format",
    reference: Some("http://opensmiles.org/opensmiles.html"),
    read: true,
    write: true,
    memory: true,
    positions: false,
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
    Ok(Box::new(SmiFormat::new(source, mode, compression)?))
}

const ORGANIC_SUBSET: &[&str] = &["B", "C", "N", "O", "P", "S", "F", "Cl", "Br", "I"];

pub(crate) struct SmiFormat {
    file: TextFile,
    steps: Vec<u64>,
}

impl SmiFormat {
    pub fn new(source: Source, mode: Mode, compression: Compression) -> Result<SmiFormat> {
        let mut file = TextFile::open(source, mode, compression)?;

        let mut steps = Vec::new();
        if mode == Mode::Read {
            loop {
                let position = file.tell()?;
                let line = match file.readline_opt()? {
                    Some(line) => line,
                    None => break,
                };
                if !line.trim().is_empty() {
                    steps.push(position);
                }
            }
            file.rewind()?;
        }

        Ok(SmiFormat { file, steps })
    }
}

impl Format for SmiFormat {
    fn name(&self) -> &'static str {
        "SMI"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(self.steps.len())
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        // Skip blank lines between molecules.
        let line = loop {
            let line = self.file.readline()?;
            if !line.trim().is_empty() {
                break line;
            }
        };

        let trimmed = line.trim();
        let (smiles, name) = match trimmed.split_once(char::is_whitespace) {
            Some((smiles, name)) => (smiles, Some(name.trim())),
            None => (trimmed, None),
        };

        let mut parsed = Frame::new();
        if let Some(name) = name {
            parsed.set("name", name);
        }
        parse_smiles(smiles, &mut parsed)?;

        *frame = parsed;
        Ok(())
    }

    fn read_step(&mut self, step: usize, frame: &mut Frame) -> Result<()> {
        self.file.seek(self.steps[step])?;
        self.read(frame)
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let position = self.file.tell()?;
        let smiles = write_smiles(frame)?;
        match frame.get("name").and_then(|p| p.as_string().ok()) {
            Some(name) => writeln!(self.file, "{smiles}\t{name}")?,
            None => writeln!(self.file, "{smiles}")?,
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

struct Parser<'a> {
    input: &'a [u8],
    current: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.current).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek();
        if byte.is_some() {
            self.current += 1;
        }
        byte
    }

    fn eat_digits(&mut self) -> String {
        let start = self.current;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.current += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.current]).into_owned()
    }

    fn error(&self, message: &str) -> Error {
        Error::Format(format!(
            "invalid SMILES at position {}: {message}",
            self.current
        ))
    }
}

fn parse_smiles(smiles: &str, frame: &mut Frame) -> Result<()> {
    let mut parser = Parser {
        input: smiles.as_bytes(),
        current: 0,
    };

    let mut previous: Option<usize> = None;
    let mut pending: Option<BondOrder> = None;
    let mut branches: Vec<Option<usize>> = Vec::new();
    let mut rings: HashMap<u32, (usize, Option<BondOrder>)> = HashMap::new();
    let mut aromatic: Vec<bool> = Vec::new();

    while let Some(byte) = parser.peek() {
        match byte {
            b'(' => {
                parser.advance();
                branches.push(previous);
            }
            b')' => {
                parser.advance();
                previous = branches.pop().ok_or_else(|| {
                    parser.error("unmatched closing parenthesis")
                })?;
            }
            b'.' => {
                parser.advance();
                previous = None;
                pending = None;
            }
            b'-' => {
                parser.advance();
                if parser.peek() == Some(b'>') {
                    parser.advance();
                    pending = Some(BondOrder::DativeRight);
                } else {
                    pending = Some(BondOrder::Single);
                }
            }
            b'<' => {
                parser.advance();
                if parser.advance() != Some(b'-') {
                    return Err(parser.error("expected '-' after '<'"));
                }
                pending = Some(BondOrder::DativeLeft);
            }
            b'=' => {
                parser.advance();
                pending = Some(BondOrder::Double);
            }
            b'#' => {
                parser.advance();
                pending = Some(BondOrder::Triple);
            }
            b'$' => {
                parser.advance();
                pending = Some(BondOrder::Quadruple);
            }
            b':' => {
                parser.advance();
                pending = Some(BondOrder::Aromatic);
            }
            b'/' => {
                parser.advance();
                pending = Some(BondOrder::Up);
            }
            b'\\' => {
                parser.advance();
                pending = Some(BondOrder::Down);
            }
            b'~' => {
                parser.advance();
                pending = Some(BondOrder::Unknown);
            }
            b'%' | b'0'..=b'9' => {
                let number = if byte == b'%' {
                    parser.advance();
                    let digits = parser.eat_digits();
                    if digits.len() < 2 {
                        return Err(parser.error("expected two digits after '%'"));
                    }
                    digits.parse::<u32>().expect("digits only")
                } else {
                    parser.advance();
                    (byte - b'0') as u32
                };

                let current = previous.ok_or_else(|| {
                    parser.error("a ring bond must come after an atom")
                })?;
                match rings.remove(&number) {
                    Some((other, order)) => {
                        let order = pending.take().or(order).unwrap_or({
                            if aromatic[current] && aromatic[other] {
                                BondOrder::Aromatic
                            } else {
                                BondOrder::Single
                            }
                        });
                        frame.add_bond_with_order(other, current, order)?;
                    }
                    None => {
                        rings.insert(number, (current, pending.take()));
                    }
                }
            }
            b'[' => {
                parser.advance();
                let (atom, is_aromatic) = parse_bracket_atom(&mut parser)?;
                let index = add_atom(
                    frame,
                    atom,
                    is_aromatic,
                    &mut previous,
                    &mut pending,
                    &aromatic,
                )?;
                aromatic.push(is_aromatic);
                previous = Some(index);
            }
            _ => {
                let (symbol, is_aromatic) = parse_organic_atom(&mut parser)?;
                let mut atom = Atom::new(symbol);
                if is_aromatic {
                    atom.set("is_aromatic", true);
                }
                let index = add_atom(
                    frame,
                    atom,
                    is_aromatic,
                    &mut previous,
                    &mut pending,
                    &aromatic,
                )?;
                aromatic.push(is_aromatic);
                previous = Some(index);
            }
        }
    }

    if !rings.is_empty() {
        warning!("unclosed ring bond in SMILES string '{smiles}'");
    }
    if !branches.is_empty() {
        return Err(Error::Format(format!(
            "unclosed branch in SMILES string '{smiles}'"
        )));
    }
    Ok(())
}

fn add_atom(
    frame: &mut Frame,
    atom: Atom,
    is_aromatic: bool,
    previous: &mut Option<usize>,
    pending: &mut Option<BondOrder>,
    aromatic: &[bool],
) -> Result<usize> {
    let index = frame.len();
    frame.add_atom(atom, Vec3::new_zero(), None);

    if let Some(other) = *previous {
        let order = pending.take().unwrap_or({
            if is_aromatic && aromatic[other] {
                BondOrder::Aromatic
            } else {
                BondOrder::Single
            }
        });
        frame.add_bond_with_order(other, index, order)?;
    }
    *pending = None;
    Ok(index)
}

fn parse_organic_atom(parser: &mut Parser<'_>) -> Result<(String, bool)> {
    let first = parser.advance().expect("caller checked") as char;

    if first == '*' {
        return Ok(("*".to_owned(), false));
    }
    if matches!(first, 'b' | 'c' | 'n' | 'o' | 'p' | 's') {
        return Ok((first.to_ascii_uppercase().to_string(), true));
    }

    let mut symbol = first.to_string();
    // Two letter organic-subset symbols: Cl and Br.
    if (first == 'C' && parser.peek() == Some(b'l')) || (first == 'B' && parser.peek() == Some(b'r'))
    {
        symbol.push(parser.advance().expect("peeked") as char);
    }

    if ORGANIC_SUBSET.contains(&symbol.as_str()) {
        Ok((symbol, false))
    } else {
        Err(parser.error(&format!(
            "'{symbol}' is not in the organic subset, use [{symbol}]"
        )))
    }
}

/// `[isotope? symbol chirality? hcount? charge? class?]`, cursor just past
/// the opening bracket.
fn parse_bracket_atom(parser: &mut Parser<'_>) -> Result<(Atom, bool)> {
    let isotope = parser.eat_digits();

    let first = parser
        .advance()
        .ok_or_else(|| parser.error("unterminated bracket atom"))? as char;
    let mut symbol = first.to_string();
    if first.is_ascii_uppercase() {
        if matches!(parser.peek(), Some(b'a'..=b'z')) {
            symbol.push(parser.advance().expect("peeked") as char);
        }
    } else if !matches!(first, 'b' | 'c' | 'n' | 'o' | 'p' | 's' | 'a' | '*') {
        return Err(parser.error(&format!("invalid atom symbol '{first}'")));
    }

    let is_aromatic = first.is_ascii_lowercase() && first != '*';
    let mut atom = if symbol == "*" {
        Atom::new("*")
    } else if is_aromatic {
        Atom::new(capitalize(&symbol))
    } else {
        Atom::new(symbol.clone())
    };
    if is_aromatic {
        atom.set("is_aromatic", true);
    }
    if let Ok(isotope) = isotope.parse::<f64>() {
        atom.set_mass(isotope);
    }

    loop {
        let byte = parser
            .peek()
            .ok_or_else(|| parser.error("unterminated bracket atom"))?;
        match byte {
            b']' => {
                parser.advance();
                break;
            }
            b'@' => {
                parser.advance();
                let mut chirality = String::from("@");
                if parser.peek() == Some(b'@') {
                    parser.advance();
                    chirality.push('@');
                } else {
                    for tag in ["TB", "OH", "SP", "AL", "TH"] {
                        if parser.input[parser.current..].starts_with(tag.as_bytes()) {
                            parser.current += 2;
                            chirality.push_str(tag);
                            chirality.push_str(&parser.eat_digits());
                            break;
                        }
                    }
                }
                atom.set("chirality", chirality);
            }
            b'H' => {
                parser.advance();
                let digits = parser.eat_digits();
                let count: f64 = if digits.is_empty() {
                    1.0
                } else {
                    digits.parse().expect("digits only")
                };
                atom.set("hydrogen_count", count);
            }
            b'+' | b'-' => {
                let sign = if byte == b'+' { 1.0 } else { -1.0 };
                parser.advance();
                let digits = parser.eat_digits();
                let charge = if digits.is_empty() {
                    // Count repeated signs: ++, ---
                    let mut count = 1.0;
                    while parser.peek() == Some(byte) {
                        parser.advance();
                        count += 1.0;
                    }
                    count
                } else {
                    digits.parse().expect("digits only")
                };
                atom.set_charge(sign * charge);
            }
            b':' => {
                parser.advance();
                let digits = parser.eat_digits();
                if digits.is_empty() {
                    return Err(parser.error("expected a class number after ':'"));
                }
                atom.set("smiles_class", digits.parse::<f64>().expect("digits only"));
            }
            _ => return Err(parser.error(&format!("unexpected '{}' in bracket atom", byte as char))),
        }
    }

    Ok((atom, is_aromatic))
}

fn capitalize(symbol: &str) -> String {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn write_smiles(frame: &Frame) -> Result<String> {
    let topology = frame.topology();
    let size = topology.len();

    let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); size];
    for bond in topology.bonds() {
        neighbors[bond[0]].push(bond[1]);
        neighbors[bond[1]].push(bond[0]);
    }

    // First pass: find the bonds which close a ring, and number them. The
    // second pass walks the same spanning forest and emits digits when it
    // reaches either endpoint of a numbered bond.
    let ring_bonds = find_ring_bonds(&neighbors);

    let mut visited = vec![false; size];
    let mut output = String::new();
    let mut first_component = true;
    for root in 0..size {
        if visited[root] {
            continue;
        }
        if !first_component {
            output.push('.');
        }
        first_component = false;
        write_component(
            frame,
            root,
            usize::MAX,
            &neighbors,
            &mut visited,
            &ring_bonds,
            &mut output,
        );
    }
    Ok(output)
}

/// Depth-first classification of bonds: an edge to an already-visited atom
/// (other than the parent) closes a ring and gets a number.
fn find_ring_bonds(neighbors: &[Vec<usize>]) -> HashMap<(usize, usize), u32> {
    let mut visited = vec![false; neighbors.len()];
    let mut rings = HashMap::new();
    let mut counter = 0u32;

    fn walk(
        index: usize,
        parent: usize,
        neighbors: &[Vec<usize>],
        visited: &mut [bool],
        rings: &mut HashMap<(usize, usize), u32>,
        counter: &mut u32,
    ) {
        visited[index] = true;
        for &other in &neighbors[index] {
            if other == parent {
                continue;
            }
            if visited[other] {
                rings.entry(key(index, other)).or_insert_with(|| {
                    *counter += 1;
                    *counter
                });
            } else {
                walk(other, index, neighbors, visited, rings, counter);
            }
        }
    }

    for root in 0..neighbors.len() {
        if !visited[root] {
            walk(root, usize::MAX, neighbors, &mut visited, &mut rings, &mut counter);
        }
    }
    rings
}

fn write_component(
    frame: &Frame,
    index: usize,
    parent: usize,
    neighbors: &[Vec<usize>],
    visited: &mut [bool],
    ring_bonds: &HashMap<(usize, usize), u32>,
    output: &mut String,
) {
    visited[index] = true;
    output.push_str(&atom_text(frame, index));

    for &other in &neighbors[index] {
        if let Some(&number) = ring_bonds.get(&key(index, other)) {
            output.push_str(&bond_text(frame, index, other));
            push_ring_number(output, number);
        }
    }

    // Tree children: bonds that do not close a ring, to atoms not written
    // yet. The traversal order matches `find_ring_bonds`.
    let children: Vec<usize> = neighbors[index]
        .iter()
        .copied()
        .filter(|&other| {
            other != parent && !visited[other] && !ring_bonds.contains_key(&key(index, other))
        })
        .collect();

    for (n, &child) in children.iter().enumerate() {
        let last = n == children.len() - 1;
        if !last {
            output.push('(');
        }
        output.push_str(&bond_text(frame, index, child));
        write_component(frame, child, index, neighbors, visited, ring_bonds, output);
        if !last {
            output.push(')');
        }
    }
}

fn key(i: usize, j: usize) -> (usize, usize) {
    (i.min(j), i.max(j))
}

fn push_ring_number(output: &mut String, number: u32) {
    if number < 10 {
        output.push_str(&number.to_string());
    } else {
        output.push('%');
        output.push_str(&format!("{number:02}"));
    }
}

fn atom_text(frame: &Frame, index: usize) -> String {
    let atom = &frame.topology()[index];
    let symbol = atom.atomic_type();
    let is_aromatic = matches!(atom.get("is_aromatic"), Some(Property::Bool(true)));

    let chirality = atom.get("chirality").and_then(|p| p.as_string().ok());
    let hydrogens = atom.get("hydrogen_count").and_then(|p| p.as_double().ok());
    let class = atom.get("smiles_class").and_then(|p| p.as_double().ok());

    let simple = atom.charge() == 0.0
        && chirality.is_none()
        && hydrogens.is_none()
        && class.is_none()
        && (ORGANIC_SUBSET.contains(&symbol) || symbol == "*");

    let mut text = if is_aromatic {
        symbol.to_lowercase()
    } else {
        symbol.to_owned()
    };
    if simple {
        return text;
    }

    if let Some(chirality) = chirality {
        text.push_str(chirality);
    }
    if let Some(hydrogens) = hydrogens {
        text.push('H');
        if hydrogens != 1.0 {
            text.push_str(&format!("{}", hydrogens as i64));
        }
    }
    let charge = atom.charge();
    if charge != 0.0 {
        let sign = if charge > 0.0 { '+' } else { '-' };
        text.push(sign);
        if charge.abs() > 1.0 {
            text.push_str(&format!("{}", charge.abs() as i64));
        }
    }
    if let Some(class) = class {
        text.push(':');
        text.push_str(&format!("{}", class as i64));
    }
    format!("[{text}]")
}

fn bond_text(frame: &Frame, i: usize, j: usize) -> String {
    let order = frame
        .topology()
        .bond_order(i, j)
        .unwrap_or(BondOrder::Single);
    let both_aromatic = [i, j].iter().all(|&n| {
        matches!(
            frame.topology()[n].get("is_aromatic"),
            Some(Property::Bool(true))
        )
    });

    match order {
        BondOrder::Double => "=".into(),
        BondOrder::Triple => "#".into(),
        BondOrder::Quadruple => "$".into(),
        BondOrder::Aromatic => {
            if both_aromatic {
                String::new()
            } else {
                ":".into()
            }
        }
        BondOrder::Up => "/".into(),
        BondOrder::Down => "\\".into(),
        BondOrder::DativeRight => "->".into(),
        BondOrder::DativeLeft => "<-".into(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Frame {
        let mut format = SmiFormat::new(
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
    fn ethanol() {
        let frame = parse("CCO ethanol\n");
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.topology()[2].atomic_type(), "O");
        assert_eq!(frame.topology().bonds().len(), 2);
        assert_eq!(frame.get("name").unwrap().as_string().unwrap(), "ethanol");
    }

    #[test]
    fn branches_and_orders() {
        let frame = parse("CC(=O)O\n");
        assert_eq!(frame.len(), 4);
        assert_eq!(
            frame.topology().bond_order(1, 2).unwrap(),
            BondOrder::Double
        );
        assert_eq!(
            frame.topology().bond_order(1, 3).unwrap(),
            BondOrder::Single
        );
    }

    #[test]
    fn aromatic_ring() {
        let frame = parse("c1ccccc1\n");
        assert_eq!(frame.len(), 6);
        assert_eq!(frame.topology().bonds().len(), 6);
        assert_eq!(
            frame.topology().bond_order(0, 5).unwrap(),
            BondOrder::Aromatic
        );
        assert!(
            frame.topology()[0]
                .get("is_aromatic")
                .unwrap()
                .as_bool()
                .unwrap()
        );
    }

    #[test]
    fn bracket_atoms() {
        let frame = parse("[Na+].[Cl-]\n");
        assert_eq!(frame.len(), 2);
        assert!(frame.topology().bonds().is_empty());
        assert_eq!(frame.topology()[0].charge(), 1.0);
        assert_eq!(frame.topology()[1].charge(), -1.0);

        let frame = parse("[C@H](N)(C)O\n");
        assert_eq!(
            frame.topology()[0]
                .get("chirality")
                .unwrap()
                .as_string()
                .unwrap(),
            "@"
        );
        assert_eq!(
            frame.topology()[0]
                .get("hydrogen_count")
                .unwrap()
                .as_double()
                .unwrap(),
            1.0
        );
    }

    #[test]
    fn percent_ring_closures() {
        let frame = parse("C%12CC%12\n");
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.topology().bonds().len(), 3);
    }

    #[test]
    fn roundtrip() {
        let frame = parse("CC(=O)O\n");
        let smiles = write_smiles(&frame).unwrap();
        let again = parse(&format!("{smiles}\n"));
        assert_eq!(again.len(), 4);
        assert_eq!(
            again.topology().bond_order(1, 2).unwrap(),
            BondOrder::Double
        );
    }

    #[test]
    fn invalid_strings() {
        let mut format = SmiFormat::new(
            Source::MemoryRead(b"C(C\n".to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        let mut frame = Frame::new();
        assert!(format.read(&mut frame).is_err());

        let mut format = SmiFormat::new(
            Source::MemoryRead(b"Xy\n".to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert!(format.read(&mut frame).is_err());
    }
}
