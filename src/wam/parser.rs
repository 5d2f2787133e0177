//! Reader for the clause syntax.
//!
//! ```text
//! % comment
//! main(X) :- friend(X) {via_friend}.
//! friend(alice).
//! likes(X, Y) :- friend(X), friend(Y) {pair(X, Y)}.
//! ```
//!
//! Names are runs of letters, digits, `_`, `-` and `.` between other
//! characters (a `.` only continues a name when followed by a name
//! character), or single-quoted atoms. Case decides variable vs constant.

use crate::error::ParseError;

use super::goal::{Argument, Goal, Query, Rule};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Quoted(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Neck,
    Period,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    line: usize,
    column: usize,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn tokenize(src: &str) -> Result<Vec<Spanned>, ParseError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let (mut line, mut column) = (1usize, 1usize);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let (start_line, start_column) = (line, column);
        let mut advance = |n: usize, i: &mut usize| {
            for _ in 0..n {
                if chars[*i] == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
                *i += 1;
            }
        };

        if c.is_whitespace() {
            advance(1, &mut i);
            continue;
        }
        if c == '%' || c == '#' {
            let len = chars[i..].iter().take_while(|&&ch| ch != '\n').count();
            advance(len, &mut i);
            continue;
        }

        let token = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = token {
            tokens.push(Spanned {
                token,
                line: start_line,
                column: start_column,
            });
            advance(1, &mut i);
            continue;
        }

        if c == ':' && chars.get(i + 1) == Some(&'-') {
            tokens.push(Spanned {
                token: Token::Neck,
                line: start_line,
                column: start_column,
            });
            advance(2, &mut i);
            continue;
        }

        if c == '\'' {
            let body: String = chars[i + 1..].iter().take_while(|&&ch| ch != '\'').collect();
            let end = i + 1 + body.chars().count();
            if end >= chars.len() {
                return Err(syntax(start_line, start_column, "unterminated quoted atom"));
            }
            tokens.push(Spanned {
                token: Token::Quoted(body),
                line: start_line,
                column: start_column,
            });
            advance(end + 1 - i, &mut i);
            continue;
        }

        if is_name_char(c) {
            let mut end = i;
            while end < chars.len() {
                let ch = chars[end];
                let dotted = ch == '.'
                    && end > i
                    && chars.get(end + 1).is_some_and(|&next| is_name_char(next));
                if is_name_char(ch) || dotted {
                    end += 1;
                } else {
                    break;
                }
            }
            let name: String = chars[i..end].iter().collect();
            tokens.push(Spanned {
                token: Token::Name(name),
                line: start_line,
                column: start_column,
            });
            advance(end - i, &mut i);
            continue;
        }

        if c == '.' {
            tokens.push(Spanned {
                token: Token::Period,
                line: start_line,
                column: start_column,
            });
            advance(1, &mut i);
            continue;
        }

        return Err(syntax(
            start_line,
            start_column,
            &format!("unexpected character '{c}'"),
        ));
    }
    Ok(tokens)
}

fn syntax(line: usize, column: usize, message: &str) -> ParseError {
    ParseError::Syntax {
        line,
        column,
        message: message.to_string(),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error(&self, message: &str) -> ParseError {
        match self.tokens.get(self.pos).or_else(|| self.tokens.last()) {
            Some(s) => syntax(s.line, s.column, message),
            None => syntax(1, 1, message),
        }
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn argument(&mut self) -> Result<Argument, ParseError> {
        match self.peek().cloned() {
            Some(Token::Name(name)) => {
                self.pos += 1;
                Ok(Argument::parse(&name))
            }
            Some(Token::Quoted(name)) => {
                self.pos += 1;
                Ok(Argument::Constant(name))
            }
            _ => Err(self.error("expected an argument")),
        }
    }

    fn goal(&mut self) -> Result<Goal, ParseError> {
        let functor = match self.peek().cloned() {
            Some(Token::Name(name)) if !super::goal::is_variable_name(&name) => name,
            Some(Token::Quoted(name)) => name,
            _ => return Err(self.error("expected a goal")),
        };
        self.pos += 1;
        let mut args = Vec::new();
        if self.eat(&Token::LParen) {
            loop {
                args.push(self.argument()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma, "',' or ')'")?;
            }
        }
        Ok(Goal::new(functor, args))
    }

    fn goals_until(&mut self, stop: &[Token]) -> Result<Vec<Goal>, ParseError> {
        let mut goals = vec![self.goal()?];
        while self.eat(&Token::Comma) {
            goals.push(self.goal()?);
        }
        match self.peek() {
            Some(t) if stop.contains(t) => Ok(goals),
            _ => Err(self.error("unexpected token after goal")),
        }
    }

    fn rule(&mut self) -> Result<Rule, ParseError> {
        let head = self.goal()?;
        let mut body = Vec::new();
        let mut features = Vec::new();
        if self.eat(&Token::Neck)
            && self.peek() != Some(&Token::LBrace)
            && self.peek() != Some(&Token::Period)
        {
            body = self.goals_until(&[Token::LBrace, Token::Period])?;
        }
        if self.eat(&Token::LBrace) && !self.eat(&Token::RBrace) {
            features = self.goals_until(&[Token::RBrace])?;
            self.expect(&Token::RBrace, "'}'")?;
        }
        self.expect(&Token::Period, "'.' at end of clause")?;
        Ok(Rule::new(head, body, features))
    }
}

/// Parse a sequence of clauses.
pub fn parse_program(src: &str) -> Result<Vec<Rule>, ParseError> {
    let mut parser = Parser::new(src)?;
    let mut rules = Vec::new();
    while !parser.at_end() {
        rules.push(parser.rule()?);
    }
    Ok(rules)
}

/// Parse a single clause.
pub fn parse_rule(src: &str) -> Result<Rule, ParseError> {
    let mut parser = Parser::new(src)?;
    let rule = parser.rule()?;
    if !parser.at_end() {
        return Err(parser.error("trailing input after clause"));
    }
    Ok(rule)
}

/// Parse a query: goals separated by commas, with an optional final period.
pub fn parse_query(src: &str) -> Result<Query, ParseError> {
    let mut parser = Parser::new(src)?;
    if parser.at_end() {
        return Err(ParseError::EmptyQuery);
    }
    let mut goals = vec![parser.goal()?];
    while parser.eat(&Token::Comma) {
        goals.push(parser.goal()?);
    }
    parser.eat(&Token::Period);
    if !parser.at_end() {
        return Err(parser.error("trailing input after query"));
    }
    Ok(Query::new(goals))
}

/// Parse a single goal, e.g. `friend(alice)`.
pub fn parse_goal(src: &str) -> Result<Goal, ParseError> {
    let mut parser = Parser::new(src)?;
    let goal = parser.goal()?;
    if !parser.at_end() {
        return Err(parser.error("trailing input after goal"));
    }
    Ok(goal)
}
