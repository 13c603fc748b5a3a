//! Record query language.
//!
//! ```text
//! PICK  <Kind> x IF x.<attr> = ? [AND x.<attr> IS NULL ...] [ORDERBY x.<attr>] [LIMIT n]
//! COUNT <Kind> x IF x.<attr> = ? [AND ...]
//! ```
//!
//! `?` placeholders bind positionally to the parameter slice given at execution.

use crate::{Error, Result};
use super::record::{Field, Record};

/// Whether a query returns records or a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Pick,
    Count,
}

/// One conjunct of the `IF` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `x.attr = ?`; the payload is the parameter slot.
    Eq { attr: String, param: usize },
    /// `x.attr IS NULL`
    IsNull { attr: String },
}

/// A parsed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub op: QueryOp,
    pub kind: String,
    pub conditions: Vec<Condition>,
    pub order_by: Option<String>,
    pub limit: Option<usize>,
    pub param_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Number(usize),
    Dot,
    Eq,
    Param,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Tok)>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => { chars.next(); }
            '.' => { chars.next(); tokens.push((pos, Tok::Dot)); }
            '=' => { chars.next(); tokens.push((pos, Tok::Eq)); }
            '?' => { chars.next(); tokens.push((pos, Tok::Param)); }
            c if c.is_ascii_digit() => {
                let mut n = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() { break; }
                    n.push(d);
                    chars.next();
                }
                let value = n.parse::<usize>().map_err(|_| Error::Query {
                    position: pos,
                    message: format!("number out of range: {n}"),
                })?;
                tokens.push((pos, Tok::Number(value)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut w = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !(d.is_alphanumeric() || d == '_') { break; }
                    w.push(d);
                    chars.next();
                }
                tokens.push((pos, Tok::Word(w)));
            }
            other => {
                return Err(Error::Query {
                    position: pos,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Tok)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(p, _)| *p)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Query { position: self.position(), message: message.into() }
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        tok
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Tok::Word(w)) if w.eq_ignore_ascii_case(kw))
    }

    fn keyword(&mut self, kw: &str) -> Result<()> {
        if self.is_keyword(kw) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {kw}")))
        }
    }

    fn word(&mut self, what: &str) -> Result<String> {
        match self.next() {
            Some(Tok::Word(w)) => Ok(w),
            _ => {
                self.pos -= 1;
                Err(self.error(format!("expected {what}")))
            }
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<()> {
        if self.peek() == Some(&tok) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    /// `x.attr`, checking the variable.
    fn attribute(&mut self, var: &str) -> Result<String> {
        let v = self.word("variable")?;
        if v != var {
            self.pos -= 1;
            return Err(self.error(format!("unknown variable '{v}'")));
        }
        self.expect(Tok::Dot, "'.'")?;
        self.word("attribute name")
    }
}

/// Parse a query string.
pub fn parse(input: &str) -> Result<Query> {
    let mut p = Parser { tokens: tokenize(input)?, pos: 0, end: input.len() };

    let op = if p.is_keyword("PICK") {
        QueryOp::Pick
    } else if p.is_keyword("COUNT") {
        QueryOp::Count
    } else {
        return Err(p.error("expected PICK or COUNT"));
    };
    p.pos += 1;

    let kind = p.word("record kind")?;
    let var = p.word("variable")?;

    let mut conditions = Vec::new();
    let mut param_count = 0;
    if p.is_keyword("IF") {
        p.pos += 1;
        loop {
            let attr = p.attribute(&var)?;
            if p.is_keyword("IS") {
                p.pos += 1;
                p.keyword("NULL")?;
                conditions.push(Condition::IsNull { attr });
            } else {
                p.expect(Tok::Eq, "'=' or IS NULL")?;
                p.expect(Tok::Param, "'?'")?;
                conditions.push(Condition::Eq { attr, param: param_count });
                param_count += 1;
            }
            if p.is_keyword("AND") {
                p.pos += 1;
            } else {
                break;
            }
        }
    }

    let mut order_by = None;
    let mut limit = None;
    if op == QueryOp::Pick {
        if p.is_keyword("ORDERBY") {
            p.pos += 1;
            order_by = Some(p.attribute(&var)?);
        }
        if p.is_keyword("LIMIT") {
            p.pos += 1;
            match p.next() {
                Some(Tok::Number(n)) => limit = Some(n),
                _ => {
                    p.pos -= 1;
                    return Err(p.error("expected LIMIT count"));
                }
            }
        }
    }

    if p.peek().is_some() {
        return Err(p.error("unexpected trailing input"));
    }

    Ok(Query { op, kind, conditions, order_by, limit, param_count })
}

impl Query {
    /// Check the parameter slice against the placeholders.
    pub fn check_params(&self, params: &[Field]) -> Result<()> {
        if params.len() != self.param_count {
            return Err(Error::Query {
                position: 0,
                message: format!(
                    "expected {} parameters, got {}",
                    self.param_count,
                    params.len()
                ),
            });
        }
        Ok(())
    }

    /// Whether a record satisfies the `IF` clause.
    pub fn matches(&self, record: &Record, params: &[Field]) -> bool {
        record.kind == self.kind
            && self.conditions.iter().all(|c| match c {
                Condition::Eq { attr, param } => {
                    params.get(*param).is_some_and(|p| record.get(attr) == p)
                }
                Condition::IsNull { attr } => record.get(attr).is_null(),
            })
    }

    /// Sort and truncate a candidate set per `ORDERBY` / `LIMIT`.
    pub fn finish(&self, mut records: Vec<Record>) -> Vec<Record> {
        match &self.order_by {
            Some(attr) => records.sort_by(|a, b| {
                a.get(attr).sort_cmp(b.get(attr)).then_with(|| a.id.cmp(&b.id))
            }),
            None => records.sort_by_key(|r| r.id),
        }
        if let Some(n) = self.limit {
            records.truncate(n);
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RecordId;

    #[test]
    fn test_parse_pick() {
        let q = parse("PICK Node x IF x.parent = ? AND x.name = ? ORDERBY x.parentIndex LIMIT 1")
            .unwrap();
        assert_eq!(q.op, QueryOp::Pick);
        assert_eq!(q.kind, "Node");
        assert_eq!(q.param_count, 2);
        assert_eq!(
            q.conditions,
            vec![
                Condition::Eq { attr: "parent".into(), param: 0 },
                Condition::Eq { attr: "name".into(), param: 1 },
            ]
        );
        assert_eq!(q.order_by.as_deref(), Some("parentIndex"));
        assert_eq!(q.limit, Some(1));
    }

    #[test]
    fn test_parse_count_is_null() {
        let q = parse("COUNT Node x IF x.parent IS NULL").unwrap();
        assert_eq!(q.op, QueryOp::Count);
        assert_eq!(q.conditions, vec![Condition::IsNull { attr: "parent".into() }]);
        assert_eq!(q.param_count, 0);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("SELECT Node x"), Err(Error::Query { .. })));
        assert!(matches!(parse("PICK Node x IF y.name = ?"), Err(Error::Query { .. })));
        assert!(matches!(parse("PICK Node x IF x.name ?"), Err(Error::Query { .. })));
        assert!(matches!(parse("PICK Node x LIMIT"), Err(Error::Query { .. })));
        assert!(matches!(parse("COUNT Node x LIMIT 3"), Err(Error::Query { .. })));
        assert!(matches!(parse("PICK Node x IF x.a = ? ;"), Err(Error::Query { .. })));
    }

    #[test]
    fn test_matches_and_finish() {
        let q = parse("PICK Value x IF x.property = ? ORDERBY x.valueIndex").unwrap();
        let params = [Field::Ref(RecordId(7))];
        let a = Record::bound("Value", RecordId(2))
            .with("property", RecordId(7))
            .with("valueIndex", 1i64);
        let b = Record::bound("Value", RecordId(3))
            .with("property", RecordId(7))
            .with("valueIndex", 0i64);
        let other = Record::bound("Value", RecordId(4)).with("property", RecordId(8));
        assert!(q.matches(&a, &params));
        assert!(!q.matches(&other, &params));
        let sorted = q.finish(vec![a, b]);
        assert_eq!(sorted[0].id, Some(RecordId(3)));
        assert!(q.check_params(&[]).is_err());
    }
}
