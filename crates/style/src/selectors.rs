//! Selector parsing.
//!
//! A selector is a space-separated descendant chain of clauses; each clause
//! is a comma-separated list of alternative atoms. An atom names a tag, a
//! class (`.name`), or both, with an optional pseudoclass suffix
//! (`:active`, `:highlighted`). Matching itself happens in the document
//! crate, which can see node interaction state.

use smallvec::SmallVec;
use thiserror::Error;

pub const MAX_CLAUSES: usize = 16;
pub const MAX_ALTERNATIVES: usize = 16;

#[derive(Debug, Error, PartialEq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("selector has more than {MAX_CLAUSES} clauses")]
    TooDeep,
    #[error("clause has more than {MAX_ALTERNATIVES} alternatives")]
    TooManyAlternatives,
    #[error("unknown pseudoclass: {0:?}")]
    UnknownPseudo(String),
    #[error("malformed atom: {0:?}")]
    BadAtom(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pseudo {
    Active,
    Highlighted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorAtom {
    pub tag: Option<Box<str>>,
    pub class: Option<Box<str>>,
    pub pseudo: Option<Pseudo>,
}

/// One step of the descendant chain.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectorClause {
    pub alternatives: SmallVec<[SelectorAtom; 2]>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Selector {
    pub clauses: SmallVec<[SelectorClause; 2]>,
}

impl Selector {
    pub fn parse(s: &str) -> Result<Selector, SelectorError> {
        let mut clauses = SmallVec::new();
        for word in s.split_whitespace() {
            if clauses.len() == MAX_CLAUSES {
                return Err(SelectorError::TooDeep);
            }
            let mut alternatives = SmallVec::new();
            for atom in word.split(',') {
                if atom.is_empty() {
                    return Err(SelectorError::BadAtom(word.to_string()));
                }
                if alternatives.len() == MAX_ALTERNATIVES {
                    return Err(SelectorError::TooManyAlternatives);
                }
                alternatives.push(parse_atom(atom)?);
            }
            clauses.push(SelectorClause { alternatives });
        }
        if clauses.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Selector { clauses })
    }
}

fn valid_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn parse_atom(s: &str) -> Result<SelectorAtom, SelectorError> {
    let (body, pseudo) = match s.split_once(':') {
        Some((body, pseudo)) => {
            let p = match pseudo {
                "active" => Pseudo::Active,
                "highlighted" => Pseudo::Highlighted,
                other => return Err(SelectorError::UnknownPseudo(other.to_string())),
            };
            (body, Some(p))
        }
        None => (s, None),
    };

    let (tag, class) = match body.split_once('.') {
        Some((tag, class)) => {
            if !valid_name(class) {
                return Err(SelectorError::BadAtom(s.to_string()));
            }
            let tag = if tag.is_empty() { None } else { Some(tag) };
            (tag, Some(class))
        }
        None => {
            if body.is_empty() && pseudo.is_some() {
                (None, None) // bare ":active"
            } else {
                (Some(body), None)
            }
        }
    };
    if let Some(t) = tag {
        if !valid_name(t) {
            return Err(SelectorError::BadAtom(s.to_string()));
        }
    }
    Ok(SelectorAtom {
        tag: tag.map(Box::from),
        class: class.map(Box::from),
        pseudo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descendant_chain_with_alternatives() {
        let sel = Selector::parse("paragraph,heading .note:highlighted").unwrap();
        assert_eq!(sel.clauses.len(), 2);
        assert_eq!(sel.clauses[0].alternatives.len(), 2);
        let atom = &sel.clauses[1].alternatives[0];
        assert_eq!(atom.tag, None);
        assert_eq!(atom.class.as_deref(), Some("note"));
        assert_eq!(atom.pseudo, Some(Pseudo::Highlighted));
    }

    #[test]
    fn tag_dot_class() {
        let sel = Selector::parse("hyperlink.nav:active").unwrap();
        let atom = &sel.clauses[0].alternatives[0];
        assert_eq!(atom.tag.as_deref(), Some("hyperlink"));
        assert_eq!(atom.class.as_deref(), Some("nav"));
        assert_eq!(atom.pseudo, Some(Pseudo::Active));
    }

    #[test]
    fn limits_enforced() {
        let deep = vec!["a"; MAX_CLAUSES + 1].join(" ");
        assert_eq!(Selector::parse(&deep), Err(SelectorError::TooDeep));
        let wide = vec!["a"; MAX_ALTERNATIVES + 1].join(",");
        assert_eq!(Selector::parse(&wide), Err(SelectorError::TooManyAlternatives));
    }

    #[test]
    fn malformed_atoms_rejected() {
        assert!(matches!(Selector::parse(""), Err(SelectorError::Empty)));
        assert!(matches!(Selector::parse("a..b"), Err(SelectorError::BadAtom(_))));
        assert!(matches!(
            Selector::parse("a:hovered"),
            Err(SelectorError::UnknownPseudo(_))
        ));
    }
}
