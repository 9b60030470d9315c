//! Tantivy-registered tokenizer for code identifiers.
//!
//! Splits on camelCase/snake_case boundaries and dot/`#` separators, and
//! also indexes the unsplit form so exact-phrase queries against compound
//! identifiers (`"authenticateUser"`) still work. Reuses the split
//! primitives from [`crate::enrich::tokenizer`] so the Name index and the
//! Semantic index's enrichment agree on what counts as a token.

use crate::enrich::tokenizer::{split_camel_case, split_snake_case};
use std::collections::HashSet;
use tantivy::tokenizer::{Token, TokenStream, Tokenizer};

#[derive(Clone, Default)]
pub struct CodeTokenizer;

pub struct CodeTokenStream {
    tokens: Vec<Token>,
    current: usize,
}

impl Tokenizer for CodeTokenizer {
    type TokenStream<'a> = CodeTokenStream;

    fn token_stream(&mut self, text: &str) -> Self::TokenStream<'_> {
        CodeTokenStream {
            tokens: tokenize_code(text),
            current: 0,
        }
    }
}

impl TokenStream for CodeTokenStream {
    fn advance(&mut self) -> bool {
        if self.current < self.tokens.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.current - 1]
    }
}

/// Walk `text`, emitting the full lowercased segment plus its camelCase and
/// snake_case sub-parts (deduped, each position offset preserved for phrase
/// queries).
fn tokenize_code(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut position = 0usize;
    let mut emitted: HashSet<String> = HashSet::new();

    for (offset, segment) in extract_segments(text) {
        let lower = segment.to_lowercase();
        if emitted.insert(lower.clone()) {
            push_token(&mut tokens, &mut position, offset, offset + segment.len(), lower);
        }

        let has_upper = segment.chars().any(|c| c.is_uppercase());
        let has_lower = segment.chars().any(|c| c.is_lowercase());
        if has_upper && has_lower {
            for part in split_camel_case(segment) {
                let part_lower = part.to_lowercase();
                if emitted.insert(part_lower.clone()) {
                    push_token(&mut tokens, &mut position, offset, offset + segment.len(), part_lower);
                }
            }
        }
        if segment.contains('_') {
            for part in split_snake_case(segment) {
                let part_lower = part.to_lowercase();
                if emitted.insert(part_lower.clone()) {
                    push_token(&mut tokens, &mut position, offset, offset + segment.len(), part_lower);
                }
            }
        }
    }

    tokens
}

fn push_token(tokens: &mut Vec<Token>, position: &mut usize, start: usize, end: usize, text: String) {
    tokens.push(Token {
        offset_from: start,
        offset_to: end,
        position: *position,
        text,
        position_length: 1,
    });
    *position += 1;
}

/// Extract alphanumeric/underscore runs, skipping whitespace and delimiter
/// punctuation, returning `(byte_offset, segment)` pairs.
fn extract_segments(text: &str) -> Vec<(usize, &str)> {
    let mut segments = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = text[i..].chars().next().unwrap();
        if c.is_alphanumeric() || c == '_' {
            let start = i;
            while i < bytes.len() {
                let c = text[i..].chars().next().unwrap();
                if c.is_alphanumeric() || c == '_' {
                    i += c.len_utf8();
                } else {
                    break;
                }
            }
            segments.push((start, &text[start..i]));
        } else {
            i += c.len_utf8();
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(text: &str) -> Vec<String> {
        tokenize_code(text).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn emits_full_token_and_camel_parts() {
        let out = texts("authenticateUser");
        assert!(out.contains(&"authenticateuser".to_string()));
        assert!(out.contains(&"authenticate".to_string()));
        assert!(out.contains(&"user".to_string()));
    }

    #[test]
    fn dedupes_repeated_segments() {
        let out = texts("user user");
        assert_eq!(out.iter().filter(|t| *t == "user").count(), 1);
    }

    #[test]
    fn skips_delimiters() {
        let out = texts("com.pkg.Foo#bar");
        assert!(out.contains(&"com".to_string()));
        assert!(out.contains(&"pkg".to_string()));
        assert!(out.contains(&"foo".to_string()));
        assert!(out.contains(&"bar".to_string()));
    }
}
