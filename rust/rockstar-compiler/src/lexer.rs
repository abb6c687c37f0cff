//! Prose-normalizing lexer: turns raw Rockstar source into a flat
//! [`Token`] stream.
//!
//! The pipeline is the four phases described by the language reference:
//! comment stripping, word splitting, classification (with keyword-alias
//! folding), and a final stitching pass that merges words into proper/
//! common variables, splits possessives, and expands poetic literals.

use crate::tokens::{Token, TokenKind};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("line {line}: unterminated string")]
    UnterminatedString { line: usize },
    #[error("line {line}: invalid proper variable, expected a capitalized word")]
    InvalidProperVariableCasing { line: usize },
    #[error("line {line}: unterminated common variable")]
    UnterminatedCommonVariable { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Alpha,
    Number,
    QuotedString,
    NewLine,
    Comma,
}

#[derive(Debug, Clone)]
struct RawWord {
    text: String,
    kind: RawKind,
    line: usize,
}

/// Tokenizes a complete Rockstar source file.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let stripped = strip_comments(source);
    let words = split_words(&stripped)?;
    debug!(word_count = words.len(), "word splitting complete");
    let pre_tokens = classify(words);
    trace!(token_count = pre_tokens.len(), "classification complete");
    stitch(pre_tokens)
}

/// Phase 1: removes `(...)` spans. Parentheses don't nest in Rockstar
/// comments — once inside one, everything up to the next `)` is dropped,
/// including any `(` encountered along the way. Newlines inside a
/// stripped comment are preserved so line numbers stay accurate for
/// diagnostics on the lines that follow a multi-line comment.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '(' {
            i += 1;
            while i < chars.len() && chars[i] != ')' {
                if chars[i] == '\n' {
                    out.push('\n');
                }
                i += 1;
            }
            if i < chars.len() {
                i += 1; // skip the ')'
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Phase 2: partitions into alphabetic words, numeric words, quoted
/// strings, newlines, and commas. Whitespace is discarded.
fn split_words(source: &str) -> Result<Vec<RawWord>, LexError> {
    let chars: Vec<char> = source.chars().collect();
    let mut words = Vec::new();
    let mut i = 0;
    let mut line = 1usize;

    while i < chars.len() {
        let c = chars[i];

        if c.is_alphabetic() || c == '\'' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphabetic() || chars[i] == '\'') {
                i += 1;
            }
            words.push(RawWord {
                text: chars[start..i].iter().collect(),
                kind: RawKind::Alpha,
                line,
            });
        } else if c.is_ascii_digit()
            || ((c == '+' || c == '-')
                && chars
                    .get(i + 1)
                    .is_some_and(|n| n.is_ascii_digit() || *n == '.'))
        {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            words.push(RawWord {
                text: chars[start..i].iter().collect(),
                kind: RawKind::Number,
                line,
            });
        } else if c == '"' {
            let start_line = line;
            let start = i;
            i += 1;
            let mut terminated = false;
            while i < chars.len() {
                if chars[i] == '"' {
                    i += 1;
                    terminated = true;
                    break;
                }
                if chars[i] == '\n' {
                    line += 1;
                }
                i += 1;
            }
            if !terminated {
                return Err(LexError::UnterminatedString { line: start_line });
            }
            words.push(RawWord {
                text: chars[start..i].iter().collect(),
                kind: RawKind::QuotedString,
                line: start_line,
            });
        } else if c == '\n' {
            words.push(RawWord {
                text: "\n".to_string(),
                kind: RawKind::NewLine,
                line,
            });
            line += 1;
            i += 1;
        } else if c == ',' {
            words.push(RawWord {
                text: ",".to_string(),
                kind: RawKind::Comma,
                line,
            });
            i += 1;
        } else {
            i += 1;
        }
    }

    Ok(words)
}

const PRONOUNS: &[&str] = &[
    "it", "he", "she", "him", "her", "they", "them", "ze", "hir", "zie", "zir", "xe", "xem",
    "ve", "ver",
];

const ARTICLES: &[&str] = &["a", "an", "the", "my", "your"];

fn is_pronoun(word: &str) -> bool {
    PRONOUNS.contains(&word)
}

fn is_article(word: &str) -> bool {
    ARTICLES.contains(&word)
}

/// Folds synonyms onto their canonical keyword spelling, per the
/// reference dialect's alias table.
fn apply_alias(word: &str) -> &str {
    match word {
        "are" | "were" | "was" => "is",
        "say" | "whisper" => "shout",
        "with" => "plus",
        "without" => "minus",
        "of" => "times",
        "between" => "over",
        "nothing" | "gone" | "nowhere" | "nobody" => "null",
        "wrong" | "no" | "lies" => "false",
        "right" | "yes" | "ok" => "true",
        "wants" => "takes",
        "return" => "give",
        "less" => "lower",
        other => other,
    }
}

fn keyword_kind(word: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match word {
        "is" => Is,
        "isnt" | "isn't" => Isnt,
        "into" => Into,
        "plus" => Plus,
        "minus" => Minus,
        "times" => Times,
        "over" => Over,
        "says" => Says,
        "true" => True,
        "false" => False,
        "let" => Let,
        "put" => Put,
        "be" => Be,
        "null" => Null,
        "knock" => Knock,
        "down" => Down,
        "build" => Build,
        "up" => Up,
        "and" => And,
        "or" => Or,
        "not" => Not,
        "shout" => Shout,
        "takes" => Takes,
        "taking" => Taking,
        "give" => Give,
        "back" => Back,
        "at" => At,
        "mysterious" => Mysterious,
        "rock" => Rock,
        "like" => Like,
        "roll" => Roll,
        "turn" => Turn,
        "if" => If,
        "else" => Else,
        "while" => While,
        "until" => Until,
        "greater" => Greater,
        "lower" => Lower,
        "as" => As,
        "great" => Great,
        "little" => Little,
        "than" => Than,
        _ => return None,
    })
}

fn strip_quotes(word: &str) -> String {
    let mut chars = word.chars();
    chars.next();
    chars.next_back();
    chars.collect()
}

/// Phase 3: classifies each raw word, applying alias folding before
/// keyword matching.
fn classify(words: Vec<RawWord>) -> Vec<Token> {
    let mut out = Vec::with_capacity(words.len());
    for w in words {
        let token = match w.kind {
            RawKind::NewLine => Token::new(TokenKind::NewLine, "\n", w.line),
            RawKind::Comma => Token::new(TokenKind::Comma, ",", w.line),
            RawKind::Number => Token::new(TokenKind::Number, w.text, w.line),
            RawKind::QuotedString => Token::new(TokenKind::String, strip_quotes(&w.text), w.line),
            RawKind::Alpha => {
                let lower = w.text.to_lowercase();
                if is_article(&lower) {
                    Token::new(TokenKind::Article, lower, w.line)
                } else if is_pronoun(&lower) {
                    Token::new(TokenKind::Pronoun, lower, w.line)
                } else {
                    let canonical = apply_alias(&lower).to_string();
                    match keyword_kind(&canonical) {
                        Some(kind) => Token::new(kind, canonical, w.line),
                        None => Token::new(TokenKind::Identifier, w.text, w.line),
                    }
                }
            }
        };
        out.push(token);
    }
    out
}

fn title_case(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Strips a trailing possessive (`'s` or `'re`), returning the stem.
fn strip_possessive(word: &str) -> Option<&str> {
    word.strip_suffix("'re").or_else(|| word.strip_suffix("'s"))
}

/// The poetic-number rule: each word contributes `(letters + hyphens)
/// mod 10`; the return also flags whether the word contains a `.`.
fn poetic_digit(word: &str) -> (u32, bool) {
    let letters = word
        .chars()
        .filter(|c| c.is_alphabetic() || *c == '-')
        .count() as u32;
    let has_period = word.contains('.');
    (letters % 10, has_period)
}

/// Whether the `Is` about to be pushed is a bare `Variable is ...`
/// statement (poetic-literal-eligible) rather than an `is` appearing
/// mid-expression, e.g. inside an `If`/`While`/`Until` condition. Only
/// the former folds its remainder into a poetic number/string literal.
fn is_statement_start_is(tokens: &[Token]) -> bool {
    match tokens.last() {
        Some(t) if t.kind == TokenKind::Variable => {
            tokens.len() == 1 || tokens[tokens.len() - 2].kind == TokenKind::NewLine
        }
        _ => false,
    }
}

/// Phase 4: stitches the classified stream into its final form.
fn stitch(pre: Vec<Token>) -> Result<Vec<Token>, LexError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut is_proper_variable = false;
    let mut poetic_number_active = false;
    let mut poetic_string_active = false;
    let mut like_pending = false;
    let mut last_line = 1usize;

    let mut i = 0;
    while i < pre.len() {
        let tok = &pre[i];
        last_line = tok.line;

        if tok.kind == TokenKind::NewLine {
            poetic_number_active = false;
            poetic_string_active = false;
        }

        if like_pending {
            like_pending = false;
            let (digit, has_period) = poetic_digit(&tok.text);
            let text = if has_period {
                format!("{digit}.")
            } else {
                digit.to_string()
            };
            tokens.push(Token::new(TokenKind::Number, text, tok.line));
            i += 1;
            continue;
        }

        if poetic_number_active {
            if tok.kind == TokenKind::Comma {
                i += 1;
                continue;
            }
            let (digit, has_period) = poetic_digit(&tok.text);
            let mut appended = false;
            if let Some(last) = tokens.last_mut() {
                if last.kind == TokenKind::Number {
                    last.text.push_str(&digit.to_string());
                    if has_period {
                        last.text.push('.');
                    }
                    appended = true;
                }
            }
            if !appended {
                let text = if has_period {
                    format!("{digit}.")
                } else {
                    digit.to_string()
                };
                tokens.push(Token::new(TokenKind::Number, text, tok.line));
            }
            i += 1;
            continue;
        }

        if poetic_string_active {
            let mut appended = false;
            if let Some(last) = tokens.last_mut() {
                if last.kind == TokenKind::String {
                    last.text.push(' ');
                    last.text.push_str(&tok.text);
                    appended = true;
                }
            }
            if !appended {
                tokens.push(Token::new(TokenKind::String, tok.text.clone(), tok.line));
            }
            i += 1;
            continue;
        }

        match tok.kind {
            TokenKind::Identifier => {
                if let Some(stem) = strip_possessive(&tok.text) {
                    is_proper_variable = false;
                    tokens.push(Token::new(TokenKind::Variable, stem.to_lowercase(), tok.line));
                    tokens.push(Token::new(TokenKind::Is, "is", tok.line));
                    let next_kind = pre.get(i + 1).map(|n| n.kind);
                    poetic_number_active = !matches!(
                        next_kind,
                        Some(TokenKind::Number)
                            | Some(TokenKind::Null)
                            | Some(TokenKind::Mysterious)
                            | Some(TokenKind::Not)
                            | Some(TokenKind::String)
                    );
                } else if tok.text.chars().next().is_some_and(char::is_uppercase) {
                    if is_proper_variable {
                        let cased = title_case(&tok.text);
                        if let Some(last) = tokens.last_mut() {
                            last.text.push(' ');
                            last.text.push_str(&cased);
                        }
                    }

                    let next_is_identifier = pre.get(i + 1).is_some_and(|n| n.kind == TokenKind::Identifier);
                    if next_is_identifier {
                        let next = &pre[i + 1];
                        if !next.text.chars().next().is_some_and(char::is_uppercase) {
                            return Err(LexError::InvalidProperVariableCasing { line: next.line });
                        }
                        if !is_proper_variable {
                            is_proper_variable = true;
                            tokens.push(Token::new(TokenKind::Variable, title_case(&tok.text), tok.line));
                        }
                    } else {
                        if !is_proper_variable {
                            tokens.push(Token::new(TokenKind::Variable, tok.text.to_lowercase(), tok.line));
                        }
                        is_proper_variable = false;
                    }
                } else {
                    tokens.push(Token::new(TokenKind::Variable, tok.text.to_lowercase(), tok.line));
                }
            }
            TokenKind::Article => {
                match pre.get(i + 1) {
                    Some(next) if next.kind == TokenKind::Identifier => {
                        let combined = format!("{} {}", tok.text.to_lowercase(), next.text.to_lowercase());
                        tokens.push(Token::new(TokenKind::Variable, combined, tok.line));
                        i += 1;
                    }
                    _ => return Err(LexError::UnterminatedCommonVariable { line: tok.line }),
                }
            }
            _ => {
                tokens.push(tok.clone());
                match tok.kind {
                    TokenKind::Is => {
                        let next_kind = pre.get(i + 1).map(|n| n.kind);
                        poetic_number_active = !matches!(
                            next_kind,
                            Some(TokenKind::Number)
                                | Some(TokenKind::Null)
                                | Some(TokenKind::Mysterious)
                                | Some(TokenKind::Not)
                                | Some(TokenKind::String)
                        );
                    }
                    TokenKind::Says => poetic_string_active = true,
                    TokenKind::Like => like_pending = true,
                    _ => {}
                }
            }
        }

        i += 1;
    }

    tokens.push(Token::new(TokenKind::EndOfFile, "", last_line));
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn comments_are_stripped() {
        let tokens = tokenize("Let X be 5 (this is a comment)").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Let, TokenKind::Variable, TokenKind::Be, TokenKind::Number, TokenKind::EndOfFile]
        );
    }

    #[test]
    fn proper_variable_multi_word() {
        let tokens = tokenize("Tommy Lee is 5\n").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Variable);
        assert_eq!(tokens[0].text, "Tommy Lee");
    }

    #[test]
    fn common_variable_lower_cased() {
        let tokens = tokenize("My heart is 5\n").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Variable);
        assert_eq!(tokens[0].text, "my heart");
    }

    #[test]
    fn possessive_splits_into_variable_and_is() {
        let tokens = tokenize("Tommy's a lovely boy\n").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Variable);
        assert_eq!(tokens[0].text, "tommy");
        assert_eq!(tokens[1].kind, TokenKind::Is);
    }

    #[test]
    fn poetic_number_literal_digit_concatenation() {
        // "a", "lovely", "boy" -> 1, 6, 3 -> concatenated as "163".
        let tokens = tokenize("Tommy is a lovely boy\n").unwrap();
        let number = tokens.iter().find(|t| t.kind == TokenKind::Number).unwrap();
        assert_eq!(number.text, "163");
    }

    #[test]
    fn poetic_string_literal_captures_rest_of_line() {
        let tokens = tokenize("Polly says hello world\n").unwrap();
        let string = tokens.iter().find(|t| t.kind == TokenKind::String).unwrap();
        assert_eq!(string.text, "hello world");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("Shout \"oops").unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { .. }));
    }

    #[test]
    fn alias_folding_normalizes_keywords() {
        let a = tokenize("X is 5\n").unwrap();
        let b = tokenize("X are 5\n").unwrap();
        assert_eq!(kinds(&a), kinds(&b));
    }

    #[test]
    fn less_folds_to_lower_for_the_comparator() {
        let tokens = tokenize("While X is less than 3\n").unwrap();
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Lower));
        assert!(!tokens.iter().any(|t| t.kind == TokenKind::Variable && t.text == "less"));
    }

    #[test]
    fn like_literal_captures_exactly_one_word() {
        let tokens = tokenize("Rock the list like tree\n").unwrap();
        let number = tokens.iter().find(|t| t.kind == TokenKind::Number).unwrap();
        assert_eq!(number.text, "4");
    }
}
