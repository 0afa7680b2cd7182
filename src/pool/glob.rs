//! Glob patterns over artifact paths.
//!
//! Supported syntax: `*` (any run of characters within one path component),
//! `**` (any run of characters, crossing `/`), `?` (one character other than
//! `/`), `[abc]`, `[a-z]` and `[!a-z]` (one character from a class), `{a,b}`
//! (alternatives, not nested) and `\` to escape the next character.

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{anychar, char, none_of, satisfy};
use nom::combinator::{all_consuming, map, opt, value};
use nom::multi::{many0, many1, separated_list1};
use nom::sequence::{delimited, pair, preceded, separated_pair};
use nom::IResult;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid glob pattern {pattern:?} at offset {offset}")]
pub struct PatternError {
    pub pattern: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    Any,
    Star,
    DoubleStar,
    Class { negated: bool, ranges: Vec<(char, char)> },
    Alternatives(Vec<Vec<Token>>),
}

fn escaped(input: &str) -> IResult<&str, char> {
    preceded(char('\\'), anychar)(input)
}

fn class_char(input: &str) -> IResult<&str, char> {
    alt((escaped, none_of("]\\")))(input)
}

fn class(input: &str) -> IResult<&str, Token> {
    let range = alt((separated_pair(class_char, char('-'), class_char), map(class_char, |c| (c, c))));
    map(delimited(char('['), pair(opt(char('!')), many1(range)), char(']')), |(negated, ranges)| {
        Token::Class { negated: negated.is_some(), ranges }
    })(input)
}

fn is_special(c: char, in_group: bool) -> bool {
    match c {
        '*' | '?' | '[' | '{' | '\\' => true,
        ',' | '}' => in_group,
        _ => false,
    }
}

fn token(input: &str, in_group: bool) -> IResult<&str, Token> {
    if !in_group {
        if let Ok(parsed) = group(input) {
            return Ok(parsed);
        }
    }
    alt((
        map(escaped, Token::Literal),
        value(Token::DoubleStar, tag("**")),
        value(Token::Star, char('*')),
        value(Token::Any, char('?')),
        class,
        map(satisfy(|c| !is_special(c, in_group)), Token::Literal),
    ))(input)
}

fn group(input: &str) -> IResult<&str, Token> {
    map(delimited(char('{'), separated_list1(char(','), many0(|i| token(i, true))), char('}')), Token::Alternatives)(input)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Atom {
    Literal(char),
    Any,
    Star,
    DoubleStar,
    Class { negated: bool, ranges: Vec<(char, char)> },
}

/// Expands every `{..}` group, so that matching only deals with plain
/// sequences.
fn expand(tokens: &[Token]) -> Vec<Vec<Atom>> {
    let mut sequences = vec![Vec::new()];
    for token in tokens {
        let atom = match *token {
            Token::Literal(c) => Atom::Literal(c),
            Token::Any => Atom::Any,
            Token::Star => Atom::Star,
            Token::DoubleStar => Atom::DoubleStar,
            Token::Class { negated, ref ranges } => Atom::Class { negated, ranges: ranges.clone() },
            Token::Alternatives(ref alternatives) => {
                let mut next = Vec::new();
                for prefix in &sequences {
                    for alternative in alternatives {
                        for suffix in expand(alternative) {
                            let mut sequence: Vec<Atom> = prefix.clone();
                            sequence.extend(suffix);
                            next.push(sequence);
                        }
                    }
                }
                sequences = next;
                continue;
            }
        };
        for sequence in &mut sequences {
            sequence.push(atom.clone());
        }
    }
    sequences
}

fn accepts(atom: &Atom, c: char) -> bool {
    match *atom {
        Atom::Literal(l) => c == l,
        Atom::Any => c != '/',
        Atom::Class { negated, ref ranges } => c != '/' && ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi) != negated,
        Atom::Star | Atom::DoubleStar => false,
    }
}

/// Tracks the set of prefix lengths of `s` matched by the atoms seen so far,
/// one atom at a time, so that matching is linear in `atoms.len() * s.len()`.
fn matches_sequence(atoms: &[Atom], s: &[char]) -> bool {
    let mut reachable = vec![false; s.len() + 1];
    reachable[0] = true;
    for atom in atoms {
        let mut next = vec![false; s.len() + 1];
        match *atom {
            Atom::Star => {
                for j in 0..=s.len() {
                    next[j] = reachable[j] || (j > 0 && next[j - 1] && s[j - 1] != '/');
                }
            }
            Atom::DoubleStar => {
                for j in 0..=s.len() {
                    next[j] = reachable[j] || (j > 0 && next[j - 1]);
                }
            }
            _ => {
                for j in 1..=s.len() {
                    next[j] = reachable[j - 1] && accepts(atom, s[j - 1]);
                }
            }
        }
        if !next.contains(&true) {
            return false;
        }
        reachable = next;
    }
    reachable[s.len()]
}

#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    sequences: Vec<Vec<Atom>>,
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Glob, PatternError> {
        match all_consuming(many0(|i| token(i, false)))(pattern) {
            Ok((_, tokens)) => Ok(Glob { pattern: pattern.to_owned(), sequences: expand(&tokens) }),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                Err(PatternError { pattern: pattern.to_owned(), offset: pattern.len() - e.input.len() })
            }
            Err(nom::Err::Incomplete(_)) => Err(PatternError { pattern: pattern.to_owned(), offset: pattern.len() }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, path: &str) -> bool {
        let chars: Vec<char> = path.chars().collect();
        self.sequences.iter().any(|atoms| matches_sequence(atoms, &chars))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn glob(p: &str) -> Glob {
        Glob::new(p).unwrap()
    }

    #[test]
    fn test_stars() {
        assert!(glob("*.class").matches("A.class"));
        assert!(!glob("*.class").matches("p/A.class"));
        assert!(glob("**.class").matches("/m/p/A.class"));
        assert!(glob("/java.base/**").matches("/java.base/java/lang/Object.class"));
        assert!(!glob("/java.base/*").matches("/java.base/java/lang/Object.class"));
        assert!(glob("/*/module-info.class").matches("/m/module-info.class"));
    }

    #[test]
    fn test_single_characters() {
        assert!(glob("A?.txt").matches("AB.txt"));
        assert!(!glob("A?.txt").matches("A/.txt"));
        assert!(glob("[a-c]x").matches("bx"));
        assert!(!glob("[!a-c]x").matches("bx"));
        assert!(glob("[!a-c]x").matches("dx"));
        assert!(glob("\\*").matches("*"));
        assert!(!glob("\\*").matches("a"));
    }

    #[test]
    fn test_alternatives() {
        let g = glob("**/*.{txt,properties}");
        assert!(g.matches("/m/a/b.txt"));
        assert!(g.matches("/m/a/b.properties"));
        assert!(!g.matches("/m/a/b.class"));
        assert!(glob("{a,}b").matches("b"));
    }

    #[test]
    fn test_many_stars_do_not_backtrack() {
        let pattern = "*a".repeat(40) + "b";
        let path = "a".repeat(200);
        assert!(!glob(&pattern).matches(&path));
        assert!(glob(&pattern).matches(&(path.clone() + "b")));
        assert!(!glob(&"**a".repeat(40)).matches(&(path + "/b")));
    }

    #[test]
    fn test_invalid_patterns() {
        assert_eq!(Glob::new("a[").unwrap_err().offset, 1);
        assert!(Glob::new("{a,{b}}").is_err());
        assert!(Glob::new("{a").is_err());
    }
}
