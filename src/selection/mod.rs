//! Select atoms with a small query language: `"name O and z < 10"`,
//! `"bonds: name(#1) O and name(#2) H"`, `"three: distance(#1, #3) < 4.5"`.
//!
//! A selection has a *context* (written before a `:`) fixing how many atoms
//! each match holds and which tuples are enumerated, and an expression
//! combining string, numeric, boolean, and connectivity selectors.

use std::ops::Index;

use crate::{
    error::{Error, Result},
    frame::Frame,
};

pub(crate) mod expr;
pub(crate) mod lexer;
pub(crate) mod parser;

/// A tuple of atom indices produced by evaluating a selection. The capacity
/// is fixed at four, covering all contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    data: [usize; 4],
    size: usize,
}

impl Match {
    /// Build a match from 1 to 4 indices.
    pub fn new(indices: &[usize]) -> Match {
        assert!(
            !indices.is_empty() && indices.len() <= 4,
            "a match must contain 1 to 4 atoms"
        );
        let mut data = [0; 4];
        data[..indices.len()].copy_from_slice(indices);
        Match {
            data,
            size: indices.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.data[..self.size]
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.as_slice().iter().copied()
    }
}

impl Index<usize> for Match {
    type Output = usize;

    fn index(&self, index: usize) -> &usize {
        assert!(index < self.size, "out of bounds indexing in a match");
        &self.data[index]
    }
}

/// The arity and candidate generator of a selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Context {
    Atoms,
    Pairs,
    Three,
    Four,
    Bonds,
    Angles,
    Dihedrals,
}

impl Context {
    fn parse(context: &str) -> Result<Context> {
        match context {
            "atoms" | "one" => Ok(Context::Atoms),
            "pairs" | "two" => Ok(Context::Pairs),
            "three" => Ok(Context::Three),
            "four" => Ok(Context::Four),
            "bonds" => Ok(Context::Bonds),
            "angles" => Ok(Context::Angles),
            "dihedrals" => Ok(Context::Dihedrals),
            _ => Err(Error::Selection(format!(
                "unknown selection context '{context}'"
            ))),
        }
    }

    fn arity(self) -> usize {
        match self {
            Context::Atoms => 1,
            Context::Pairs | Context::Bonds => 2,
            Context::Three | Context::Angles => 3,
            Context::Four | Context::Dihedrals => 4,
        }
    }
}

/// A compiled selection, ready to run over frames.
#[derive(Debug)]
pub struct Selection {
    selection: String,
    context: Context,
    ast: expr::Ast,
}

impl Selection {
    /// Compile `selection`. The string may start with a context
    /// (`atoms|one`, `pairs|two`, `three`, `four`, `bonds`, `angles`,
    /// `dihedrals`) followed by `:`; the default context is `atoms`.
    pub fn new(selection: &str) -> Result<Selection> {
        let parts: Vec<&str> = selection.split(':').collect();
        let (context, expression) = match parts.len() {
            1 => (Context::Atoms, selection),
            2 => (Context::parse(parts[0].trim())?, parts[1]),
            _ => {
                return Err(Error::Selection(format!(
                    "can not get selection context in '{selection}', too many ':'"
                )));
            }
        };

        let tokens = lexer::tokenize(expression)?;
        for token in &tokens {
            if let lexer::Token::Variable(variable) = token {
                if *variable as usize >= context.arity() {
                    return Err(Error::Selection(format!(
                        "variable index #{} is too big for the current context (should be <= {})",
                        variable + 1,
                        context.arity()
                    )));
                }
            }
        }

        let mut ast = parser::Parser::new(tokens).parse()?;
        ast.optimize();

        Ok(Selection {
            selection: selection.trim().to_owned(),
            context,
            ast,
        })
    }

    /// The arity of this selection: how many atoms each match contains.
    pub fn size(&self) -> usize {
        self.context.arity()
    }

    /// The string this selection was compiled from.
    pub fn string(&self) -> &str {
        &self.selection
    }

    /// Pretty-print the (optimized) expression back to selection syntax.
    pub fn print(&self) -> String {
        self.ast.print()
    }

    /// All matches of this selection in `frame`.
    pub fn evaluate(&mut self, frame: &Frame) -> Result<Vec<Match>> {
        self.ast.clear();

        let mut matches = Vec::new();
        let size = frame.len();
        match self.context {
            Context::Atoms => {
                for i in 0..size {
                    self.push_if_match(frame, Match::new(&[i]), &mut matches)?;
                }
            }
            Context::Pairs => {
                for i in 0..size {
                    for j in 0..size {
                        if i == j {
                            continue;
                        }
                        self.push_if_match(frame, Match::new(&[i, j]), &mut matches)?;
                    }
                }
            }
            Context::Three => {
                for i in 0..size {
                    for j in 0..size {
                        if i == j {
                            continue;
                        }
                        for k in 0..size {
                            if i == k || j == k {
                                continue;
                            }
                            self.push_if_match(frame, Match::new(&[i, j, k]), &mut matches)?;
                        }
                    }
                }
            }
            Context::Four => {
                for i in 0..size {
                    for j in 0..size {
                        if i == j {
                            continue;
                        }
                        for k in 0..size {
                            if i == k || j == k {
                                continue;
                            }
                            for m in 0..size {
                                if i == m || j == m || k == m {
                                    continue;
                                }
                                self.push_if_match(
                                    frame,
                                    Match::new(&[i, j, k, m]),
                                    &mut matches,
                                )?;
                            }
                        }
                    }
                }
            }
            Context::Bonds => {
                // Each stored bond is tried in both orders, the reverse one
                // only when the forward one did not match, so every bond
                // produces at most one match.
                for bond in frame.topology().bonds() {
                    let forward = Match::new(&[bond[0], bond[1]]);
                    if self.ast.is_match(frame, &forward)? {
                        matches.push(forward);
                    } else {
                        let reverse = Match::new(&[bond[1], bond[0]]);
                        if self.ast.is_match(frame, &reverse)? {
                            matches.push(reverse);
                        }
                    }
                }
            }
            Context::Angles => {
                for angle in frame.topology().angles() {
                    let forward = Match::new(&[angle[0], angle[1], angle[2]]);
                    if self.ast.is_match(frame, &forward)? {
                        matches.push(forward);
                    } else {
                        let reverse = Match::new(&[angle[2], angle[1], angle[0]]);
                        if self.ast.is_match(frame, &reverse)? {
                            matches.push(reverse);
                        }
                    }
                }
            }
            Context::Dihedrals => {
                for dihedral in frame.topology().dihedrals() {
                    let forward =
                        Match::new(&[dihedral[0], dihedral[1], dihedral[2], dihedral[3]]);
                    if self.ast.is_match(frame, &forward)? {
                        matches.push(forward);
                    } else {
                        let reverse =
                            Match::new(&[dihedral[3], dihedral[2], dihedral[1], dihedral[0]]);
                        if self.ast.is_match(frame, &reverse)? {
                            matches.push(reverse);
                        }
                    }
                }
            }
        }
        Ok(matches)
    }

    /// The first index of every match. Only single-atom selections support
    /// this.
    pub fn list(&mut self, frame: &Frame) -> Result<Vec<usize>> {
        if self.size() != 1 {
            return Err(Error::Selection(
                "can not call `list` on a multiple selection".to_owned(),
            ));
        }
        Ok(self
            .evaluate(frame)?
            .into_iter()
            .map(|match_| match_[0])
            .collect())
    }

    fn push_if_match(
        &mut self,
        frame: &Frame,
        match_: Match,
        matches: &mut Vec<Match>,
    ) -> Result<()> {
        if self.ast.is_match(frame, &match_)? {
            matches.push(match_);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lin_alg::f64::Vec3;

    use crate::{Atom, Residue};

    use super::*;

    fn test_frame() -> Frame {
        // H-O-O-H, positions on the x axis
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("H"), Vec3::new(0.0, 0.0, 0.0), None);
        frame.add_atom(Atom::new("O"), Vec3::new(1.0, 0.0, 0.0), None);
        frame.add_atom(Atom::new("O"), Vec3::new(2.0, 0.0, 0.0), None);
        frame.add_atom(Atom::new("H"), Vec3::new(3.0, 0.0, 0.0), None);
        frame.add_bond(0, 1).unwrap();
        frame.add_bond(1, 2).unwrap();
        frame.add_bond(2, 3).unwrap();
        frame
    }

    #[test]
    fn match_tuples() {
        let match_ = Match::new(&[1, 2, 3]);
        assert_eq!(match_.len(), 3);
        assert_eq!(match_[1], 2);
        assert_eq!(match_.as_slice(), &[1, 2, 3]);
        assert_ne!(Match::new(&[1]), Match::new(&[1, 0]));
    }

    #[test]
    fn contexts() {
        assert_eq!(Selection::new("all").unwrap().size(), 1);
        assert_eq!(Selection::new("atoms: all").unwrap().size(), 1);
        assert_eq!(Selection::new("pairs: all").unwrap().size(), 2);
        assert_eq!(Selection::new("two: all").unwrap().size(), 2);
        assert_eq!(Selection::new("three: all").unwrap().size(), 3);
        assert_eq!(Selection::new("four: all").unwrap().size(), 4);
        assert_eq!(Selection::new("bonds: all").unwrap().size(), 2);
        assert_eq!(Selection::new("angles: all").unwrap().size(), 3);
        assert_eq!(Selection::new("dihedrals: all").unwrap().size(), 4);

        assert!(Selection::new("solid: all").is_err());
        assert!(Selection::new("a: b: all").is_err());
        // #2 does not exist in an atom context
        assert!(Selection::new("name(#2) O").is_err());
    }

    #[test]
    fn atoms_context() {
        let frame = test_frame();

        let mut selection = Selection::new("name O").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![1, 2]);

        let mut selection = Selection::new("name H O").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![0, 1, 2, 3]);

        let mut selection = Selection::new("index >= 2").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![2, 3]);

        let mut selection = Selection::new("not name O").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![0, 3]);

        let mut selection = Selection::new("x < 1.5 and name H").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![0]);
    }

    #[test]
    fn bonds_context() {
        let frame = test_frame();

        let mut selection = Selection::new("bonds: name(#1) O and name(#2) H").unwrap();
        let matches = selection.evaluate(&frame).unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.contains(&Match::new(&[1, 0])));
        assert!(matches.contains(&Match::new(&[2, 3])));

        // Each bond matches at most once
        let mut selection = Selection::new("bonds: all").unwrap();
        assert_eq!(selection.evaluate(&frame).unwrap().len(), 3);
    }

    #[test]
    fn angles_context() {
        let frame = test_frame();

        let mut selection = Selection::new("angles: all").unwrap();
        assert_eq!(selection.evaluate(&frame).unwrap().len(), 2);

        let mut selection = Selection::new("angles: name(#1) H").unwrap();
        let matches = selection.evaluate(&frame).unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.contains(&Match::new(&[0, 1, 2])));
        assert!(matches.contains(&Match::new(&[3, 2, 1])));
    }

    #[test]
    fn dihedrals_context() {
        let frame = test_frame();
        let mut selection = Selection::new("dihedrals: name(#2) O and name(#3) O").unwrap();
        let matches = selection.evaluate(&frame).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].len(), 4);
    }

    #[test]
    fn pairs_context() {
        let frame = test_frame();
        let mut selection = Selection::new("pairs: all").unwrap();
        // 4 * 3 ordered pairs
        assert_eq!(selection.evaluate(&frame).unwrap().len(), 12);
    }

    #[test]
    fn sub_selections() {
        let frame = test_frame();

        let mut selection = Selection::new("is_bonded(#1, name O)").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![0, 1, 2, 3]);

        let mut selection = Selection::new("is_bonded(#1, name H)").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![1, 2]);

        let mut selection = Selection::new("is_angle(name H, #1, name O)").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![1, 2]);

        assert!(Selection::new("is_bonded(name H, name O)").is_err());
        assert!(Selection::new("is_bonded(#1)").is_err());
    }

    #[test]
    fn geometry_functions() {
        let frame = test_frame();

        let mut selection = Selection::new("pairs: distance(#1, #2) < 1.5").unwrap();
        // adjacent atoms, both orders
        assert_eq!(selection.evaluate(&frame).unwrap().len(), 6);

        let mut selection = Selection::new("angles: angle(#1, #2, #3) > 3").unwrap();
        // both angles here are straight (pi radians)
        assert_eq!(selection.evaluate(&frame).unwrap().len(), 2);
    }

    #[test]
    fn properties_in_selections() {
        let mut frame = test_frame();
        frame.topology_mut()[0].set("first", true);
        frame.topology_mut()[2].set("ff", "OW");
        frame.topology_mut()[3].set("charge", 0.5);

        let mut selection = Selection::new("[first]").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![0]);

        let mut selection = Selection::new("[ff] OW").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![2]);

        let mut selection = Selection::new("[charge] == 0.5").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![3]);

        // Lazy type checking: using a string property as a number fails at
        // evaluation time, not parse time.
        let mut selection = Selection::new("[ff] < 4").unwrap();
        assert!(matches!(
            selection.list(&frame),
            Err(Error::Property(_))
        ));
    }

    #[test]
    fn resname_and_resid() {
        let mut frame = test_frame();
        let mut residue = Residue::with_id("HO2", 7);
        residue.add_atom(0);
        residue.add_atom(1);
        frame.topology_mut().add_residue(residue).unwrap();

        let mut selection = Selection::new("resname HO2").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![0, 1]);

        let mut selection = Selection::new("resid 7").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![0, 1]);

        let mut selection = Selection::new("resname NOPE").unwrap();
        assert!(selection.list(&frame).unwrap().is_empty());
    }

    #[test]
    fn optimization_folds_constants() {
        let selection = Selection::new("3 + 4 < 5").unwrap();
        assert_eq!(selection.print(), "7 < 5");

        let frame = test_frame();
        let mut selection = Selection::new("3 + 4 < 5").unwrap();
        assert!(selection.evaluate(&frame).unwrap().is_empty());

        let selection = Selection::new("sqrt(4) == 2").unwrap();
        assert_eq!(selection.print(), "2 == 2");

        // Selectors do not fold
        let selection = Selection::new("x + 4 < 5").unwrap();
        assert_eq!(selection.print(), "(x(#1) + 4) < 5");
    }

    #[test]
    fn print_reparse_equivalence() {
        let frame = test_frame();
        for string in [
            "name O and index < 3",
            "not name O or index == 0",
            "bonds: name(#1) O and name(#2) H",
            "is_bonded(#1, name O)",
            "three: distance(#1, #3) < 2.5",
            "mass > 10 and x ^ 2 < 9",
        ] {
            let mut first = Selection::new(string).unwrap();
            let printed = match string.split_once(':') {
                Some((context, _)) => format!("{context}: {}", first.print()),
                None => first.print(),
            };
            let mut second = Selection::new(&printed).unwrap();
            assert_eq!(
                first.evaluate(&frame).unwrap(),
                second.evaluate(&frame).unwrap(),
                "printed form '{printed}' of '{string}' is not equivalent"
            );
        }
    }

    #[test]
    fn list_requires_single_arity() {
        let frame = test_frame();
        let mut selection = Selection::new("pairs: all").unwrap();
        assert!(selection.list(&frame).is_err());
    }

    #[test]
    fn math_paren_ambiguity() {
        let frame = test_frame();

        // Parenthesised logical expression
        let mut selection = Selection::new("(name H or name O) and index < 2").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![0, 1]);

        // Parenthesised math expression
        let mut selection = Selection::new("(x + 1) * 2 < 5").unwrap();
        assert_eq!(selection.list(&frame).unwrap(), vec![0, 1]);
    }
}
