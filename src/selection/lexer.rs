//! Tokenizer for the selection language.

use crate::error::{Error, Result};

/// A single token in a selection string. Variables are stored 0-based (the
/// user writes `#1` for slot 0).
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Hat,
    Percent,
    And,
    Or,
    Not,
    Ident(String),
    String(String),
    Number(f64),
    Variable(u8),
    End,
}

impl Token {
    /// The text this token came from, used to rebuild sub-selection strings
    /// and to report errors.
    pub fn as_str(&self) -> String {
        match self {
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::LBracket => "[".into(),
            Token::RBracket => "]".into(),
            Token::Comma => ",".into(),
            Token::Equal => "==".into(),
            Token::NotEqual => "!=".into(),
            Token::Less => "<".into(),
            Token::LessEqual => "<=".into(),
            Token::Greater => ">".into(),
            Token::GreaterEqual => ">=".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::Hat => "^".into(),
            Token::Percent => "%".into(),
            Token::And => "and".into(),
            Token::Or => "or".into(),
            Token::Not => "not".into(),
            Token::Ident(ident) => ident.clone(),
            Token::String(string) => format!("\"{string}\""),
            Token::Number(number) => format!("{number}"),
            Token::Variable(variable) => format!("#{}", variable + 1),
            Token::End => "<end of selection>".into(),
        }
    }
}

/// Turn `input` into a token stream, ending with [`Token::End`].
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut current = 0;

    while current < chars.len() {
        let c = chars[current];
        match c {
            _ if c.is_whitespace() => {
                current += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                current += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                current += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                current += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                current += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                current += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                current += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                current += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                current += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                current += 1;
            }
            '^' => {
                tokens.push(Token::Hat);
                current += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                current += 1;
            }
            '=' => {
                if chars.get(current + 1) == Some(&'=') {
                    tokens.push(Token::Equal);
                    current += 2;
                } else {
                    return Err(Error::Selection(format!(
                        "invalid character '=' in '{input}': did you mean '=='?"
                    )));
                }
            }
            '!' => {
                if chars.get(current + 1) == Some(&'=') {
                    tokens.push(Token::NotEqual);
                    current += 2;
                } else {
                    return Err(Error::Selection(format!(
                        "invalid character '!' in '{input}': did you mean '!='?"
                    )));
                }
            }
            '<' => {
                if chars.get(current + 1) == Some(&'=') {
                    tokens.push(Token::LessEqual);
                    current += 2;
                } else {
                    tokens.push(Token::Less);
                    current += 1;
                }
            }
            '>' => {
                if chars.get(current + 1) == Some(&'=') {
                    tokens.push(Token::GreaterEqual);
                    current += 2;
                } else {
                    tokens.push(Token::Greater);
                    current += 1;
                }
            }
            '#' => {
                let start = current + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                if end == start {
                    return Err(Error::Selection(format!(
                        "expected a number after '#' in '{input}'"
                    )));
                }
                let digits: String = chars[start..end].iter().collect();
                let variable: u64 = digits.parse().map_err(|_| {
                    Error::Selection(format!("invalid variable '#{digits}' in '{input}'"))
                })?;
                if variable == 0 || variable > 255 {
                    return Err(Error::Selection(format!(
                        "variable index #{variable} is out of range (1 to 255) in '{input}'"
                    )));
                }
                tokens.push(Token::Variable((variable - 1) as u8));
                current = end;
            }
            '"' => {
                let start = current + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != '"' {
                    end += 1;
                }
                if end == chars.len() {
                    return Err(Error::Selection(format!(
                        "closing quote (\") not found in '{input}'"
                    )));
                }
                tokens.push(Token::String(chars[start..end].iter().collect()));
                current = end + 1;
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = current;
                let mut end = current;
                while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                    end += 1;
                }
                // Exponent part, possibly signed.
                if end < chars.len() && (chars[end] == 'e' || chars[end] == 'E') {
                    let mut exponent = end + 1;
                    if exponent < chars.len() && (chars[exponent] == '+' || chars[exponent] == '-')
                    {
                        exponent += 1;
                    }
                    if exponent < chars.len() && chars[exponent].is_ascii_digit() {
                        end = exponent;
                        while end < chars.len() && chars[end].is_ascii_digit() {
                            end += 1;
                        }
                    }
                }
                let text: String = chars[start..end].iter().collect();
                let number: f64 = text.parse().map_err(|_| {
                    Error::Selection(format!("could not parse '{text}' as a number in '{input}'"))
                })?;
                tokens.push(Token::Number(number));
                current = end;
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = current;
                let mut end = current;
                while end < chars.len()
                    && (chars[end].is_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let ident: String = chars[start..end].iter().collect();
                tokens.push(match ident.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(ident),
                });
                current = end;
            }
            _ => {
                return Err(Error::Selection(format!(
                    "invalid character '{c}' in '{input}'"
                )));
            }
        }
    }

    tokens.push(Token::End);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_and_operators() {
        let tokens = tokenize("( ) [ ] , == != < <= > >= + - * / ^ %").unwrap();
        assert_eq!(tokens, vec![
            Token::LParen,
            Token::RParen,
            Token::LBracket,
            Token::RBracket,
            Token::Comma,
            Token::Equal,
            Token::NotEqual,
            Token::Less,
            Token::LessEqual,
            Token::Greater,
            Token::GreaterEqual,
            Token::Plus,
            Token::Minus,
            Token::Star,
            Token::Slash,
            Token::Hat,
            Token::Percent,
            Token::End,
        ]);
    }

    #[test]
    fn keywords_and_idents() {
        let tokens = tokenize("name and or not resname_2").unwrap();
        assert_eq!(tokens, vec![
            Token::Ident("name".into()),
            Token::And,
            Token::Or,
            Token::Not,
            Token::Ident("resname_2".into()),
            Token::End,
        ]);
    }

    #[test]
    fn numbers() {
        let tokens = tokenize("3 4.2 .5 1e3 1.5e-2").unwrap();
        assert_eq!(tokens, vec![
            Token::Number(3.0),
            Token::Number(4.2),
            Token::Number(0.5),
            Token::Number(1000.0),
            Token::Number(0.015),
            Token::End,
        ]);

        assert!(tokenize("3.4.5").is_err());
    }

    #[test]
    fn variables() {
        let tokens = tokenize("#1 #255").unwrap();
        assert_eq!(tokens, vec![
            Token::Variable(0),
            Token::Variable(254),
            Token::End,
        ]);

        assert!(tokenize("#0").is_err());
        assert!(tokenize("#256").is_err());
        assert!(tokenize("#").is_err());
    }

    #[test]
    fn quoted_strings() {
        let tokens = tokenize("\"hello world\" \"日本\"").unwrap();
        assert_eq!(tokens, vec![
            Token::String("hello world".into()),
            Token::String("日本".into()),
            Token::End,
        ]);

        assert!(tokenize("\"unterminated").is_err());
    }

    #[test]
    fn invalid_characters() {
        assert!(matches!(tokenize("name @"), Err(Error::Selection(_))));
        assert!(tokenize("a = b").is_err());
        assert!(tokenize("a ! b").is_err());
    }
}
