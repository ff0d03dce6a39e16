//! The selection AST: boolean nodes answering "does this match hold", and
//! math nodes evaluating to a double. Both are plain tagged sums with
//! match-dispatched `is_match` / `eval`, constant folding, clearing of
//! per-frame caches, and pretty-printing back to parseable selection
//! syntax.

use crate::{
    connectivity::{Angle, Bond, Dihedral, Improper},
    error::{Error, Result},
    frame::Frame,
    property::Property,
    selection::{Match, Selection},
};

/// A 0-based slot in the match tuple (`#1` in the selection syntax).
pub(crate) type Variable = u8;

/// Which comparison a math selector applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl CmpOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Equal => lhs == rhs,
            CmpOp::NotEqual => lhs != rhs,
            CmpOp::Less => lhs < rhs,
            CmpOp::LessEqual => lhs <= rhs,
            CmpOp::Greater => lhs > rhs,
            CmpOp::GreaterEqual => lhs >= rhs,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Equal => "==",
            CmpOp::NotEqual => "!=",
            CmpOp::Less => "<",
            CmpOp::LessEqual => "<=",
            CmpOp::Greater => ">",
            CmpOp::GreaterEqual => ">=",
        }
    }
}

/// The string-valued selectors.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum StringKind {
    Name,
    Type,
    Resname,
    Property(String),
}

impl StringKind {
    fn display(&self) -> String {
        match self {
            StringKind::Name => "name".into(),
            StringKind::Type => "type".into(),
            StringKind::Resname => "resname".into(),
            StringKind::Property(name) => format!("[{name}]"),
        }
    }

    /// The string value for atom `i`, or `None` when it does not exist
    /// (no residue, missing property).
    fn value<'a>(&self, frame: &'a Frame, i: usize) -> Result<Option<&'a str>> {
        match self {
            StringKind::Name => Ok(Some(frame.topology()[i].name())),
            StringKind::Type => Ok(Some(frame.topology()[i].atomic_type())),
            StringKind::Resname => Ok(frame
                .topology()
                .residue_for_atom(i)
                .map(|residue| residue.name())),
            StringKind::Property(name) => match frame.topology()[i].get(name) {
                Some(Property::String(value)) => Ok(Some(value)),
                Some(other) => Err(Error::Property(format!(
                    "property '{name}' was used as a string, but it is a {} property",
                    other.kind()
                ))),
                None => Ok(None),
            },
        }
    }
}

/// The numeric selectors.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum NumericKind {
    Index,
    Mass,
    Resid,
    X,
    Y,
    Z,
    Vx,
    Vy,
    Vz,
    Property(String),
}

impl NumericKind {
    pub fn from_name(name: &str) -> Option<NumericKind> {
        match name {
            "index" => Some(NumericKind::Index),
            "mass" => Some(NumericKind::Mass),
            "resid" => Some(NumericKind::Resid),
            "x" => Some(NumericKind::X),
            "y" => Some(NumericKind::Y),
            "z" => Some(NumericKind::Z),
            "vx" => Some(NumericKind::Vx),
            "vy" => Some(NumericKind::Vy),
            "vz" => Some(NumericKind::Vz),
            _ => None,
        }
    }

    fn display(&self) -> String {
        match self {
            NumericKind::Index => "index".into(),
            NumericKind::Mass => "mass".into(),
            NumericKind::Resid => "resid".into(),
            NumericKind::X => "x".into(),
            NumericKind::Y => "y".into(),
            NumericKind::Z => "z".into(),
            NumericKind::Vx => "vx".into(),
            NumericKind::Vy => "vy".into(),
            NumericKind::Vz => "vz".into(),
            NumericKind::Property(name) => format!("[{name}]"),
        }
    }

    fn value(&self, frame: &Frame, i: usize) -> Result<f64> {
        match self {
            NumericKind::Index => Ok(i as f64),
            NumericKind::Mass => Ok(frame.topology()[i].mass()),
            // Atoms outside any residue, or in one without an id, read as -1.
            NumericKind::Resid => Ok(frame
                .topology()
                .residue_for_atom(i)
                .and_then(|residue| residue.id())
                .map(|id| id as f64)
                .unwrap_or(-1.0)),
            NumericKind::X => Ok(frame.positions()[i].x),
            NumericKind::Y => Ok(frame.positions()[i].y),
            NumericKind::Z => Ok(frame.positions()[i].z),
            // Frames without velocities read as zero.
            NumericKind::Vx => Ok(frame.velocities().map(|v| v[i].x).unwrap_or(0.0)),
            NumericKind::Vy => Ok(frame.velocities().map(|v| v[i].y).unwrap_or(0.0)),
            NumericKind::Vz => Ok(frame.velocities().map(|v| v[i].z).unwrap_or(0.0)),
            NumericKind::Property(name) => match frame.topology()[i].get(name) {
                Some(Property::Double(value)) => Ok(*value),
                Some(other) => Err(Error::Property(format!(
                    "property '{name}' was used as a number, but it is a {} property",
                    other.kind()
                ))),
                None => Ok(0.0),
            },
        }
    }
}

/// The single-argument math functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MathFunction {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Sqrt,
    Exp,
    Log,
    Log2,
    Log10,
    Rad2Deg,
    Deg2Rad,
}

impl MathFunction {
    pub fn from_name(name: &str) -> Option<MathFunction> {
        match name {
            "sin" => Some(MathFunction::Sin),
            "cos" => Some(MathFunction::Cos),
            "tan" => Some(MathFunction::Tan),
            "asin" => Some(MathFunction::Asin),
            "acos" => Some(MathFunction::Acos),
            "sqrt" => Some(MathFunction::Sqrt),
            "exp" => Some(MathFunction::Exp),
            "log" => Some(MathFunction::Log),
            "log2" => Some(MathFunction::Log2),
            "log10" => Some(MathFunction::Log10),
            "rad2deg" => Some(MathFunction::Rad2Deg),
            "deg2rad" => Some(MathFunction::Deg2Rad),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MathFunction::Sin => "sin",
            MathFunction::Cos => "cos",
            MathFunction::Tan => "tan",
            MathFunction::Asin => "asin",
            MathFunction::Acos => "acos",
            MathFunction::Sqrt => "sqrt",
            MathFunction::Exp => "exp",
            MathFunction::Log => "log",
            MathFunction::Log2 => "log2",
            MathFunction::Log10 => "log10",
            MathFunction::Rad2Deg => "rad2deg",
            MathFunction::Deg2Rad => "deg2rad",
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            MathFunction::Sin => x.sin(),
            MathFunction::Cos => x.cos(),
            MathFunction::Tan => x.tan(),
            MathFunction::Asin => x.asin(),
            MathFunction::Acos => x.acos(),
            MathFunction::Sqrt => x.sqrt(),
            MathFunction::Exp => x.exp(),
            MathFunction::Log => x.ln(),
            MathFunction::Log2 => x.log2(),
            MathFunction::Log10 => x.log10(),
            MathFunction::Rad2Deg => x.to_degrees(),
            MathFunction::Deg2Rad => x.to_radians(),
        }
    }
}

/// An argument of `is_bonded` and friends: either a bare variable, or a
/// full selection evaluated lazily over the frame and cached until the
/// next `clear`.
#[derive(Debug)]
pub(crate) enum SubSelection {
    Variable(Variable),
    Selection {
        selection: Box<Selection>,
        cache: Option<Vec<usize>>,
    },
}

impl SubSelection {
    pub fn from_selection(selection: Selection) -> SubSelection {
        SubSelection::Selection {
            selection: Box::new(selection),
            cache: None,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, SubSelection::Variable(_))
    }

    /// The candidate atoms for this argument under `match_`.
    fn eval(&mut self, frame: &Frame, match_: &Match) -> Result<Vec<usize>> {
        match self {
            SubSelection::Variable(variable) => Ok(vec![match_[*variable as usize]]),
            SubSelection::Selection { selection, cache } => {
                if cache.is_none() {
                    *cache = Some(selection.list(frame)?);
                }
                Ok(cache.clone().expect("cache was just filled"))
            }
        }
    }

    fn clear(&mut self) {
        if let SubSelection::Selection { cache, .. } = self {
            *cache = None;
        }
    }

    fn print(&self) -> String {
        match self {
            SubSelection::Variable(variable) => format!("#{}", variable + 1),
            SubSelection::Selection { selection, .. } => selection.string().to_owned(),
        }
    }
}

/// A boolean node of the AST.
#[derive(Debug)]
pub(crate) enum Ast {
    All,
    None,
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Not(Box<Ast>),
    IsBonded(SubSelection, SubSelection),
    IsAngle(SubSelection, SubSelection, SubSelection),
    IsDihedral(SubSelection, SubSelection, SubSelection, SubSelection),
    IsImproper(SubSelection, SubSelection, SubSelection, SubSelection),
    BoolProperty {
        property: String,
        argument: Variable,
    },
    Str {
        kind: StringKind,
        value: String,
        equals: bool,
        argument: Variable,
    },
    Math {
        op: CmpOp,
        lhs: MathExpr,
        rhs: MathExpr,
    },
}

impl Ast {
    /// Does `match_` satisfy this node in `frame`?
    pub fn is_match(&mut self, frame: &Frame, match_: &Match) -> Result<bool> {
        match self {
            Ast::All => Ok(true),
            Ast::None => Ok(false),
            Ast::And(lhs, rhs) => {
                Ok(lhs.is_match(frame, match_)? && rhs.is_match(frame, match_)?)
            }
            Ast::Or(lhs, rhs) => {
                Ok(lhs.is_match(frame, match_)? || rhs.is_match(frame, match_)?)
            }
            Ast::Not(inner) => Ok(!inner.is_match(frame, match_)?),
            Ast::IsBonded(i, j) => {
                let bonds = frame.topology().bonds();
                for ci in i.eval(frame, match_)? {
                    for cj in j.eval(frame, match_)? {
                        if ci == cj {
                            continue;
                        }
                        let bond = Bond::new(ci, cj)?;
                        if bonds.binary_search(&bond).is_ok() {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            Ast::IsAngle(i, j, k) => {
                let angles = frame.topology().angles();
                for ci in i.eval(frame, match_)? {
                    for cj in j.eval(frame, match_)? {
                        for ck in k.eval(frame, match_)? {
                            if ci == cj || cj == ck || ci == ck {
                                continue;
                            }
                            let angle = Angle::new(ci, cj, ck)?;
                            if angles.binary_search(&angle).is_ok() {
                                return Ok(true);
                            }
                        }
                    }
                }
                Ok(false)
            }
            Ast::IsDihedral(i, j, k, m) => {
                let dihedrals = frame.topology().dihedrals();
                for ci in i.eval(frame, match_)? {
                    for cj in j.eval(frame, match_)? {
                        for ck in k.eval(frame, match_)? {
                            for cm in m.eval(frame, match_)? {
                                if has_duplicates(&[ci, cj, ck, cm]) {
                                    continue;
                                }
                                let dihedral = Dihedral::new(ci, cj, ck, cm)?;
                                if dihedrals.binary_search(&dihedral).is_ok() {
                                    return Ok(true);
                                }
                            }
                        }
                    }
                }
                Ok(false)
            }
            Ast::IsImproper(i, j, k, m) => {
                // The second argument is the central atom.
                let impropers = frame.topology().impropers();
                for ci in i.eval(frame, match_)? {
                    for cj in j.eval(frame, match_)? {
                        for ck in k.eval(frame, match_)? {
                            for cm in m.eval(frame, match_)? {
                                if has_duplicates(&[ci, cj, ck, cm]) {
                                    continue;
                                }
                                let improper = Improper::new(ci, cj, ck, cm)?;
                                if impropers.binary_search(&improper).is_ok() {
                                    return Ok(true);
                                }
                            }
                        }
                    }
                }
                Ok(false)
            }
            Ast::BoolProperty { property, argument } => {
                let index = match_[*argument as usize];
                match frame.topology()[index].get(property) {
                    Some(Property::Bool(value)) => Ok(*value),
                    Some(other) => Err(Error::Property(format!(
                        "property '{property}' was used as a bool, but it is a {} property",
                        other.kind()
                    ))),
                    Option::None => Ok(false),
                }
            }
            Ast::Str {
                kind,
                value,
                equals,
                argument,
            } => {
                let index = match_[*argument as usize];
                match kind.value(frame, index)? {
                    Some(actual) => Ok((actual == value) == *equals),
                    // Missing values (no residue, absent property) never match.
                    Option::None => Ok(false),
                }
            }
            Ast::Math { op, lhs, rhs } => {
                let lhs = lhs.eval(frame, match_)?;
                let rhs = rhs.eval(frame, match_)?;
                Ok(op.apply(lhs, rhs))
            }
        }
    }

    /// Drop cached sub-selection matches. Called before evaluating on a new
    /// frame.
    pub fn clear(&mut self) {
        match self {
            Ast::All | Ast::None | Ast::BoolProperty { .. } | Ast::Str { .. } => {}
            Ast::And(lhs, rhs) | Ast::Or(lhs, rhs) => {
                lhs.clear();
                rhs.clear();
            }
            Ast::Not(inner) => inner.clear(),
            Ast::IsBonded(i, j) => {
                i.clear();
                j.clear();
            }
            Ast::IsAngle(i, j, k) => {
                i.clear();
                j.clear();
                k.clear();
            }
            Ast::IsDihedral(i, j, k, m) | Ast::IsImproper(i, j, k, m) => {
                i.clear();
                j.clear();
                k.clear();
                m.clear();
            }
            Ast::Math { lhs, rhs, .. } => {
                lhs.clear();
                rhs.clear();
            }
        }
    }

    /// Constant-fold math subtrees.
    pub fn optimize(&mut self) {
        match self {
            Ast::And(lhs, rhs) | Ast::Or(lhs, rhs) => {
                lhs.optimize();
                rhs.optimize();
            }
            Ast::Not(inner) => inner.optimize(),
            Ast::Math { lhs, rhs, .. } => {
                if let Some(value) = lhs.optimize() {
                    *lhs = MathExpr::Number(value);
                }
                if let Some(value) = rhs.optimize() {
                    *rhs = MathExpr::Number(value);
                }
            }
            _ => {}
        }
    }

    /// Pretty-print back to selection syntax. Re-parsing the output yields
    /// an equivalent selection.
    pub fn print(&self) -> String {
        match self {
            Ast::All => "all".into(),
            Ast::None => "none".into(),
            Ast::And(lhs, rhs) => {
                format!("{} and {}", print_operand(lhs), print_operand(rhs))
            }
            Ast::Or(lhs, rhs) => {
                format!("{} or {}", print_operand(lhs), print_operand(rhs))
            }
            Ast::Not(inner) => format!("not {}", print_operand(inner)),
            Ast::IsBonded(i, j) => format!("is_bonded({}, {})", i.print(), j.print()),
            Ast::IsAngle(i, j, k) => {
                format!("is_angle({}, {}, {})", i.print(), j.print(), k.print())
            }
            Ast::IsDihedral(i, j, k, m) => format!(
                "is_dihedral({}, {}, {}, {})",
                i.print(),
                j.print(),
                k.print(),
                m.print()
            ),
            Ast::IsImproper(i, j, k, m) => format!(
                "is_improper({}, {}, {}, {})",
                i.print(),
                j.print(),
                k.print(),
                m.print()
            ),
            Ast::BoolProperty { property, argument } => {
                format!("[{property}](#{})", argument + 1)
            }
            Ast::Str {
                kind,
                value,
                equals,
                argument,
            } => {
                let op = if *equals { "==" } else { "!=" };
                let value = if is_bare_value(value) {
                    value.clone()
                } else {
                    format!("\"{value}\"")
                };
                format!("{}(#{}) {op} {value}", kind.display(), argument + 1)
            }
            Ast::Math { op, lhs, rhs } => {
                format!("{} {} {}", lhs.print(), op.as_str(), rhs.print())
            }
        }
    }
}

fn print_operand(ast: &Ast) -> String {
    match ast {
        Ast::And(..) | Ast::Or(..) | Ast::Not(..) => format!("({})", ast.print()),
        _ => ast.print(),
    }
}

/// Can `value` be re-lexed as a single identifier, or does it need quotes?
fn is_bare_value(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn has_duplicates(indexes: &[usize; 4]) -> bool {
    for (n, a) in indexes.iter().enumerate() {
        for b in &indexes[n + 1..] {
            if a == b {
                return true;
            }
        }
    }
    false
}

/// A math node of the AST, evaluating to a double.
#[derive(Debug)]
pub(crate) enum MathExpr {
    Add(Box<MathExpr>, Box<MathExpr>),
    Sub(Box<MathExpr>, Box<MathExpr>),
    Mul(Box<MathExpr>, Box<MathExpr>),
    Div(Box<MathExpr>, Box<MathExpr>),
    Mod(Box<MathExpr>, Box<MathExpr>),
    Pow(Box<MathExpr>, Box<MathExpr>),
    Neg(Box<MathExpr>),
    Function(MathFunction, Box<MathExpr>),
    Number(f64),
    Distance(Variable, Variable),
    Angle3(Variable, Variable, Variable),
    Dihedral4(Variable, Variable, Variable, Variable),
    OutOfPlane(Variable, Variable, Variable, Variable),
    Selector {
        kind: NumericKind,
        argument: Variable,
    },
}

impl MathExpr {
    pub fn eval(&self, frame: &Frame, match_: &Match) -> Result<f64> {
        match self {
            MathExpr::Add(lhs, rhs) => Ok(lhs.eval(frame, match_)? + rhs.eval(frame, match_)?),
            MathExpr::Sub(lhs, rhs) => Ok(lhs.eval(frame, match_)? - rhs.eval(frame, match_)?),
            MathExpr::Mul(lhs, rhs) => Ok(lhs.eval(frame, match_)? * rhs.eval(frame, match_)?),
            MathExpr::Div(lhs, rhs) => Ok(lhs.eval(frame, match_)? / rhs.eval(frame, match_)?),
            MathExpr::Mod(lhs, rhs) => Ok(lhs.eval(frame, match_)? % rhs.eval(frame, match_)?),
            MathExpr::Pow(lhs, rhs) => {
                Ok(lhs.eval(frame, match_)?.powf(rhs.eval(frame, match_)?))
            }
            MathExpr::Neg(inner) => Ok(-inner.eval(frame, match_)?),
            MathExpr::Function(function, inner) => {
                Ok(function.apply(inner.eval(frame, match_)?))
            }
            MathExpr::Number(value) => Ok(*value),
            MathExpr::Distance(i, j) => {
                frame.distance(match_[*i as usize], match_[*j as usize])
            }
            MathExpr::Angle3(i, j, k) => frame.angle(
                match_[*i as usize],
                match_[*j as usize],
                match_[*k as usize],
            ),
            MathExpr::Dihedral4(i, j, k, m) => frame.dihedral(
                match_[*i as usize],
                match_[*j as usize],
                match_[*k as usize],
                match_[*m as usize],
            ),
            MathExpr::OutOfPlane(i, j, k, m) => frame.out_of_plane(
                match_[*i as usize],
                match_[*j as usize],
                match_[*k as usize],
                match_[*m as usize],
            ),
            MathExpr::Selector { kind, argument } => {
                kind.value(frame, match_[*argument as usize])
            }
        }
    }

    /// Fold constants, replacing folded children in place. Returns the
    /// value of this node when it is fully constant. Per-atom selectors and
    /// geometry functions never fold.
    pub fn optimize(&mut self) -> Option<f64> {
        let folded = match self {
            MathExpr::Number(value) => return Some(*value),
            MathExpr::Add(lhs, rhs) => fold_binary(lhs, rhs, |a, b| a + b),
            MathExpr::Sub(lhs, rhs) => fold_binary(lhs, rhs, |a, b| a - b),
            MathExpr::Mul(lhs, rhs) => fold_binary(lhs, rhs, |a, b| a * b),
            MathExpr::Div(lhs, rhs) => fold_binary(lhs, rhs, |a, b| a / b),
            MathExpr::Mod(lhs, rhs) => fold_binary(lhs, rhs, |a, b| a % b),
            MathExpr::Pow(lhs, rhs) => fold_binary(lhs, rhs, f64::powf),
            MathExpr::Neg(inner) => inner.optimize().map(|value| -value),
            MathExpr::Function(function, inner) => {
                let function = *function;
                inner.optimize().map(|value| function.apply(value))
            }
            MathExpr::Distance(..)
            | MathExpr::Angle3(..)
            | MathExpr::Dihedral4(..)
            | MathExpr::OutOfPlane(..)
            | MathExpr::Selector { .. } => return None,
        };

        if let Some(value) = folded {
            *self = MathExpr::Number(value);
        }
        folded
    }

    pub fn clear(&mut self) {
        match self {
            MathExpr::Add(lhs, rhs)
            | MathExpr::Sub(lhs, rhs)
            | MathExpr::Mul(lhs, rhs)
            | MathExpr::Div(lhs, rhs)
            | MathExpr::Mod(lhs, rhs)
            | MathExpr::Pow(lhs, rhs) => {
                lhs.clear();
                rhs.clear();
            }
            MathExpr::Neg(inner) | MathExpr::Function(_, inner) => inner.clear(),
            _ => {}
        }
    }

    pub fn print(&self) -> String {
        match self {
            MathExpr::Add(lhs, rhs) => format!("({} + {})", lhs.print(), rhs.print()),
            MathExpr::Sub(lhs, rhs) => format!("({} - {})", lhs.print(), rhs.print()),
            MathExpr::Mul(lhs, rhs) => format!("({} * {})", lhs.print(), rhs.print()),
            MathExpr::Div(lhs, rhs) => format!("({} / {})", lhs.print(), rhs.print()),
            MathExpr::Mod(lhs, rhs) => format!("({} % {})", lhs.print(), rhs.print()),
            MathExpr::Pow(lhs, rhs) => format!("({} ^ {})", lhs.print(), rhs.print()),
            MathExpr::Neg(inner) => match **inner {
                MathExpr::Number(_) | MathExpr::Selector { .. } => format!("-{}", inner.print()),
                _ => format!("-({})", inner.print()),
            },
            MathExpr::Function(function, inner) => {
                format!("{}({})", function.name(), inner.print())
            }
            MathExpr::Number(value) => format!("{value}"),
            MathExpr::Distance(i, j) => format!("distance(#{}, #{})", i + 1, j + 1),
            MathExpr::Angle3(i, j, k) => {
                format!("angle(#{}, #{}, #{})", i + 1, j + 1, k + 1)
            }
            MathExpr::Dihedral4(i, j, k, m) => {
                format!("dihedral(#{}, #{}, #{}, #{})", i + 1, j + 1, k + 1, m + 1)
            }
            MathExpr::OutOfPlane(i, j, k, m) => {
                format!(
                    "out_of_plane(#{}, #{}, #{}, #{})",
                    i + 1,
                    j + 1,
                    k + 1,
                    m + 1
                )
            }
            MathExpr::Selector { kind, argument } => {
                format!("{}(#{})", kind.display(), argument + 1)
            }
        }
    }
}

fn fold_binary(
    lhs: &mut MathExpr,
    rhs: &mut MathExpr,
    apply: impl Fn(f64, f64) -> f64,
) -> Option<f64> {
    let folded_lhs = lhs.optimize();
    if let Some(value) = folded_lhs {
        *lhs = MathExpr::Number(value);
    }
    let folded_rhs = rhs.optimize();
    if let Some(value) = folded_rhs {
        *rhs = MathExpr::Number(value);
    }
    match (folded_lhs, folded_rhs) {
        (Some(a), Some(b)) => Some(apply(a, b)),
        _ => None,
    }
}
