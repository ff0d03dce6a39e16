//! Recursive-descent parser for the selection language, with backtracking
//! where the grammar is ambiguous: a parenthesis can open either a logical
//! block (`(name H or name O) and x < 3`) or a mathematical expression
//! (`(3 + 5) * 2 < 3`).

use crate::{
    error::{Error, Result},
    selection::{
        Selection,
        expr::{Ast, CmpOp, MathExpr, MathFunction, NumericKind, StringKind, SubSelection, Variable},
        lexer::Token,
    },
};

fn string_selector_kind(name: &str) -> Option<StringKind> {
    match name {
        "name" => Some(StringKind::Name),
        "type" => Some(StringKind::Type),
        "resname" => Some(StringKind::Resname),
        _ => None,
    }
}

fn boolean_function_arity(name: &str) -> Option<usize> {
    match name {
        "all" | "none" => Some(0),
        "is_bonded" => Some(2),
        "is_angle" => Some(3),
        "is_dihedral" | "is_improper" => Some(4),
        _ => None,
    }
}

fn var_function_arity(name: &str) -> Option<usize> {
    match name {
        "distance" => Some(2),
        "angle" => Some(3),
        "dihedral" | "out_of_plane" => Some(4),
        _ => None,
    }
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser { tokens, current: 0 }
    }

    pub fn parse(&mut self) -> Result<Ast> {
        // The token stream always ends with Token::End.
        if self.tokens.len() <= 1 {
            return Err(Error::Selection("empty selection".to_owned()));
        }

        self.current = 0;
        let ast = self.expression()?;
        if !self.finished() {
            let mut extra = String::new();
            while !self.finished() {
                extra.push(' ');
                extra.push_str(&self.advance().as_str());
            }
            return Err(Error::Selection(format!(
                "additional data after the end of the selection:{extra}"
            )));
        }
        Ok(ast)
    }

    fn expression(&mut self) -> Result<Ast> {
        let mut ast = self.selector()?;
        loop {
            if self.match_token(&Token::And) {
                let rhs = self.selector()?;
                ast = Ast::And(Box::new(ast), Box::new(rhs));
            } else if self.match_token(&Token::Or) {
                let rhs = self.selector()?;
                ast = Ast::Or(Box::new(ast), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(ast)
    }

    fn selector(&mut self) -> Result<Ast> {
        if self.match_token(&Token::LParen) {
            // Try the logical interpretation first; on failure backtrack
            // and read a mathematical expression instead.
            let checkpoint = self.current - 1;
            match self.expression() {
                Ok(ast) => {
                    if self.match_token(&Token::RParen) {
                        return Ok(ast);
                    }
                    return Err(Error::Selection(format!(
                        "expected closing parenthesis after '{}'",
                        self.previous().as_str()
                    )));
                }
                Err(_) => {
                    self.current = checkpoint;
                    return self.math_selector();
                }
            }
        } else if self.match_token(&Token::Not) {
            let ast = self.expression()?;
            return Ok(Ast::Not(Box::new(ast)));
        } else if self.match_token(&Token::LBracket) {
            let checkpoint = self.current - 1;
            if let Some(ast) = self.bool_or_string_property()? {
                return Ok(ast);
            }
            // Not a bool/string property, retry as a numeric one.
            self.current = checkpoint;
        } else if let Token::Ident(ident) = self.peek().clone() {
            if boolean_function_arity(&ident).is_some() {
                return self.bool_selector(&ident);
            } else if let Some(kind) = string_selector_kind(&ident) {
                return self.string_selector(kind);
            } else {
                return self.math_selector();
            }
        }

        self.math_selector()
    }

    /// Called just after a `[` was consumed. Returns `None` when the
    /// bracketed property turns out not to be usable as a bool or string
    /// property; the caller backtracks and retries as a numeric property.
    fn bool_or_string_property(&mut self) -> Result<Option<Ast>> {
        let property = match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                name
            }
            Token::String(name) => {
                self.advance();
                name
            }
            _ => return Ok(None),
        };
        if !self.match_token(&Token::RBracket) {
            return Err(Error::Selection(format!(
                "expected ] after [{property}, got {}",
                self.peek().as_str()
            )));
        }

        let argument = self.variable()?;
        if let Some(value) = self.match_string_value() {
            // `[name] value` shorthand, possibly with several values.
            let mut ast = Ast::Str {
                kind: StringKind::Property(property.clone()),
                value,
                equals: true,
                argument,
            };
            while let Some(value) = self.match_string_value() {
                let rhs = Ast::Str {
                    kind: StringKind::Property(property.clone()),
                    value,
                    equals: true,
                    argument,
                };
                ast = Ast::Or(Box::new(ast), Box::new(rhs));
            }
            Ok(Some(ast))
        } else if self.match_token(&Token::Equal) {
            match self.match_string_value() {
                Some(value) => Ok(Some(Ast::Str {
                    kind: StringKind::Property(property),
                    value,
                    equals: true,
                    argument,
                })),
                None => Ok(None),
            }
        } else if self.match_token(&Token::NotEqual) {
            match self.match_string_value() {
                Some(value) => Ok(Some(Ast::Str {
                    kind: StringKind::Property(property),
                    value,
                    equals: false,
                    argument,
                })),
                None => Ok(None),
            }
        } else if self.finished()
            || self.check(&Token::And)
            || self.check(&Token::Or)
        {
            // A bare `[prop]` is a boolean property check.
            Ok(Some(Ast::BoolProperty { property, argument }))
        } else {
            Ok(None)
        }
    }

    fn bool_selector(&mut self, name: &str) -> Result<Ast> {
        self.advance();
        let arity = boolean_function_arity(name).expect("checked by the caller");

        let arguments = self.sub_selections()?;
        if arguments.len() != arity {
            return Err(Error::Selection(format!(
                "expected {arity} arguments in '{name}', got {}",
                arguments.len()
            )));
        }

        // Without at least one variable, selections like
        // `is_bonded(name H, name O)` degenerate to all-or-none.
        if !arguments.is_empty() && !arguments.iter().any(SubSelection::is_variable) {
            return Err(Error::Selection(format!(
                "expected at least one variable (#1/#2/#3/#4) in '{name}'"
            )));
        }

        let mut arguments = arguments.into_iter();
        let mut next = || arguments.next().expect("arity was checked");
        Ok(match name {
            "all" => Ast::All,
            "none" => Ast::None,
            "is_bonded" => Ast::IsBonded(next(), next()),
            "is_angle" => Ast::IsAngle(next(), next(), next()),
            "is_dihedral" => Ast::IsDihedral(next(), next(), next(), next()),
            "is_improper" => Ast::IsImproper(next(), next(), next(), next()),
            _ => unreachable!("checked by the caller"),
        })
    }

    fn string_selector(&mut self, kind: StringKind) -> Result<Ast> {
        let name = self.advance().as_str();

        let argument = self.variable()?;
        if let Some(value) = self.match_string_value() {
            // `name value` shorthand, possibly `name H N C O`.
            let mut ast = Ast::Str {
                kind: kind.clone(),
                value,
                equals: true,
                argument,
            };
            while let Some(value) = self.match_string_value() {
                let rhs = Ast::Str {
                    kind: kind.clone(),
                    value,
                    equals: true,
                    argument,
                };
                ast = Ast::Or(Box::new(ast), Box::new(rhs));
            }
            Ok(ast)
        } else if self.match_token(&Token::Equal) {
            match self.match_string_value() {
                Some(value) => Ok(Ast::Str {
                    kind,
                    value,
                    equals: true,
                    argument,
                }),
                None => Err(Error::Selection(format!(
                    "expected a string value after '{name} ==', found {}",
                    self.peek().as_str()
                ))),
            }
        } else if self.match_token(&Token::NotEqual) {
            match self.match_string_value() {
                Some(value) => Ok(Ast::Str {
                    kind,
                    value,
                    equals: false,
                    argument,
                }),
                None => Err(Error::Selection(format!(
                    "expected a string value after '{name} !=', found {}",
                    self.peek().as_str()
                ))),
            }
        } else {
            Err(Error::Selection(format!(
                "expected one of '!=', '==' or a string value after '{name}', found '{}'",
                self.peek().as_str()
            )))
        }
    }

    fn math_selector(&mut self) -> Result<Ast> {
        let checkpoint = self.current;
        if let Token::Ident(name) = self.peek().clone() {
            if let Some(kind) = NumericKind::from_name(&name) {
                self.advance();
                let argument = self.variable()?;
                if let Token::Number(value) = *self.peek() {
                    // `index value` shorthand, possibly `index 7 8 9`.
                    self.advance();
                    let mut ast = Ast::Math {
                        op: CmpOp::Equal,
                        lhs: MathExpr::Selector {
                            kind: kind.clone(),
                            argument,
                        },
                        rhs: MathExpr::Number(value),
                    };
                    while let Token::Number(value) = *self.peek() {
                        self.advance();
                        let rhs = Ast::Math {
                            op: CmpOp::Equal,
                            lhs: MathExpr::Selector {
                                kind: kind.clone(),
                                argument,
                            },
                            rhs: MathExpr::Number(value),
                        };
                        ast = Ast::Or(Box::new(ast), Box::new(rhs));
                    }
                    return Ok(ast);
                }
                self.current = checkpoint;
            }
        }

        let lhs = self.math_sum()?;

        let op = if self.match_token(&Token::Equal) {
            CmpOp::Equal
        } else if self.match_token(&Token::NotEqual) {
            CmpOp::NotEqual
        } else if self.match_token(&Token::Less) {
            CmpOp::Less
        } else if self.match_token(&Token::LessEqual) {
            CmpOp::LessEqual
        } else if self.match_token(&Token::Greater) {
            CmpOp::Greater
        } else if self.match_token(&Token::GreaterEqual) {
            CmpOp::GreaterEqual
        } else {
            return Err(Error::Selection(format!(
                "expected a binary operator (==, !=, <=, ...), got {}",
                self.peek().as_str()
            )));
        };

        let rhs = self.math_sum()?;
        Ok(Ast::Math { op, lhs, rhs })
    }

    fn math_sum(&mut self) -> Result<MathExpr> {
        let mut ast = self.math_product()?;
        loop {
            if self.match_token(&Token::Plus) {
                let rhs = self.math_product()?;
                ast = MathExpr::Add(Box::new(ast), Box::new(rhs));
            } else if self.match_token(&Token::Minus) {
                let rhs = self.math_product()?;
                ast = MathExpr::Sub(Box::new(ast), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(ast)
    }

    fn math_product(&mut self) -> Result<MathExpr> {
        let mut ast = self.math_power()?;
        loop {
            if self.match_token(&Token::Star) {
                let rhs = self.math_power()?;
                ast = MathExpr::Mul(Box::new(ast), Box::new(rhs));
            } else if self.match_token(&Token::Slash) {
                let rhs = self.math_power()?;
                ast = MathExpr::Div(Box::new(ast), Box::new(rhs));
            } else if self.match_token(&Token::Percent) {
                let rhs = self.math_power()?;
                ast = MathExpr::Mod(Box::new(ast), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(ast)
    }

    fn math_power(&mut self) -> Result<MathExpr> {
        let lhs = self.math_value()?;
        if self.match_token(&Token::Hat) {
            // Right associative.
            let rhs = self.math_power()?;
            Ok(MathExpr::Pow(Box::new(lhs), Box::new(rhs)))
        } else {
            Ok(lhs)
        }
    }

    fn math_value(&mut self) -> Result<MathExpr> {
        if let Token::Ident(name) = self.peek().clone() {
            self.advance();
            if let Some(function) = MathFunction::from_name(&name) {
                return self.math_function(function);
            } else if let Some(kind) = NumericKind::from_name(&name) {
                let argument = self.variable()?;
                return Ok(MathExpr::Selector { kind, argument });
            } else if var_function_arity(&name).is_some() {
                return self.math_var_function(&name);
            }
            return Err(Error::Selection(format!(
                "unexpected identifier '{name}' in mathematical expression"
            )));
        }

        if self.match_token(&Token::LBracket) {
            let property = match self.peek().clone() {
                Token::Ident(name) | Token::String(name) => {
                    self.advance();
                    name
                }
                other => {
                    return Err(Error::Selection(format!(
                        "expected property name after [, got {}",
                        other.as_str()
                    )));
                }
            };
            if !self.match_token(&Token::RBracket) {
                return Err(Error::Selection(format!(
                    "expected ] after [{property}, got {}",
                    self.peek().as_str()
                )));
            }
            let argument = self.variable()?;
            return Ok(MathExpr::Selector {
                kind: NumericKind::Property(property),
                argument,
            });
        }

        if self.match_token(&Token::LParen) {
            let ast = self.math_sum()?;
            if !self.match_token(&Token::RParen) {
                return Err(Error::Selection(format!(
                    "expected closing parenthesis after '{}'",
                    self.previous().as_str()
                )));
            }
            return Ok(ast);
        }

        if let Token::Number(value) = *self.peek() {
            self.advance();
            return Ok(MathExpr::Number(value));
        }

        if self.match_token(&Token::Plus) {
            // Unary plus, nothing to do.
            return self.math_value();
        }

        if self.match_token(&Token::Minus) {
            let ast = self.math_value()?;
            return Ok(MathExpr::Neg(Box::new(ast)));
        }

        if self.finished() {
            Err(Error::Selection(format!(
                "expected content after '{}'",
                self.previous().as_str()
            )))
        } else {
            Err(Error::Selection(format!(
                "unexpected content: '{}'",
                self.peek().as_str()
            )))
        }
    }

    fn math_function(&mut self, function: MathFunction) -> Result<MathExpr> {
        if !self.match_token(&Token::LParen) {
            return Err(Error::Selection(format!(
                "missing parenthesis after '{}' function",
                function.name()
            )));
        }
        let ast = self.math_sum()?;
        if !self.match_token(&Token::RParen) {
            return Err(Error::Selection(format!(
                "missing closing parenthesis after '{}' function call",
                function.name()
            )));
        }
        Ok(MathExpr::Function(function, Box::new(ast)))
    }

    fn math_var_function(&mut self, name: &str) -> Result<MathExpr> {
        let arity = var_function_arity(name).expect("checked by the caller");
        let variables = self.variables()?;
        if variables.len() != arity {
            return Err(Error::Selection(format!(
                "expected {arity} arguments in '{name}', got {}",
                variables.len()
            )));
        }

        Ok(match name {
            "distance" => MathExpr::Distance(variables[0], variables[1]),
            "angle" => MathExpr::Angle3(variables[0], variables[1], variables[2]),
            "dihedral" => {
                MathExpr::Dihedral4(variables[0], variables[1], variables[2], variables[3])
            }
            "out_of_plane" => {
                MathExpr::OutOfPlane(variables[0], variables[1], variables[2], variables[3])
            }
            _ => unreachable!("checked by the caller"),
        })
    }

    /// An optional parenthesised variable: `(#2)`. Defaults to the first
    /// slot.
    fn variable(&mut self) -> Result<Variable> {
        let mut variable = 0;
        if self.match_token(&Token::LParen) {
            if let Token::Variable(value) = *self.peek() {
                self.advance();
                variable = value;
            } else {
                return Err(Error::Selection(format!(
                    "expected variable in parenthesis, got '{}'",
                    self.peek().as_str()
                )));
            }
            if !self.match_token(&Token::RParen) {
                return Err(Error::Selection(format!(
                    "expected closing parenthesis after variable, got '{}'",
                    self.peek().as_str()
                )));
            }
        }
        Ok(variable)
    }

    /// A required, parenthesised, comma-separated variable list.
    fn variables(&mut self) -> Result<Vec<Variable>> {
        let mut variables = Vec::new();
        if !self.match_token(&Token::LParen) {
            return Err(Error::Selection(format!(
                "expected opening parenthesis, got '{}'",
                self.peek().as_str()
            )));
        }

        loop {
            if let Token::Variable(value) = *self.peek() {
                self.advance();
                variables.push(value);
            } else {
                return Err(Error::Selection(format!(
                    "expected variable in parenthesis, got '{}'",
                    self.peek().as_str()
                )));
            }
            if !self.match_token(&Token::Comma) {
                break;
            }
        }

        if !self.match_token(&Token::RParen) {
            return Err(Error::Selection(format!(
                "expected closing parenthesis after variable, got '{}'",
                self.peek().as_str()
            )));
        }
        Ok(variables)
    }

    /// The argument list of a boolean function: each argument is a bare
    /// variable or a full selection. A missing list means no arguments.
    fn sub_selections(&mut self) -> Result<Vec<SubSelection>> {
        let mut arguments = Vec::new();
        if !self.match_token(&Token::LParen) {
            return Ok(arguments);
        }

        loop {
            if let Token::Variable(value) = *self.peek() {
                self.advance();
                arguments.push(SubSelection::Variable(value));
            } else {
                // Sub-selections need their own variable validation and
                // context, so the matching tokens are stitched back into a
                // string and parsed as a standalone selection.
                let before = self.current;
                let _ = self.expression()?;
                let mut text = String::new();
                for token in &self.tokens[before..self.current] {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(&token.as_str());
                }
                arguments.push(SubSelection::from_selection(Selection::new(&text)?));
            }

            if !self.match_token(&Token::Comma) {
                break;
            }
        }

        if !self.match_token(&Token::RParen) {
            return Err(Error::Selection(format!(
                "expected closing parenthesis after variable, got '{}'",
                self.peek().as_str()
            )));
        }
        Ok(arguments)
    }

    fn finished(&self) -> bool {
        matches!(self.peek(), Token::End)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.current).unwrap_or(&Token::End)
    }

    fn previous(&self) -> &Token {
        if self.current == 0 {
            &Token::End
        } else {
            &self.tokens[self.current - 1]
        }
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.finished() {
            self.current += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn match_token(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_string_value(&mut self) -> Option<String> {
        match self.peek().clone() {
            Token::Ident(value) | Token::String(value) => {
                self.advance();
                Some(value)
            }
            _ => None,
        }
    }
}
