//! Identifier tokenization shared by the Name index's Tantivy tokenizer and
//! the plain `EnrichedContent.tokens` builder. Keeping the split logic in
//! one place means a query against the Name index and a query against the
//! Semantic index see the same notion of "token".

/// Common English function words, stripped from tokenized identifier text.
/// Also doubles as code-vocabulary noise (access modifiers, common type
/// keywords) that would otherwise dominate Jaccard/lexical scoring.
const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "a", "an", "is",
    "are", "was", "were", "be", "been", "this", "that", "it", "as", "from", "public", "private",
    "protected", "static", "class", "interface", "function", "var", "let", "const", "string",
    "number", "boolean",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Split an identifier on camelCase boundaries: uppercase following
/// lowercase, or a run of uppercase letters followed by lowercase (so
/// "getHTTPResponse" -> ["get", "HTTP", "Response"], "XMLParser" ->
/// ["XML", "Parser"]).
pub fn split_camel_case(s: &str) -> Vec<&str> {
    if s.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut boundaries = vec![0usize];
    for i in 1..chars.len() {
        let prev = chars[i - 1];
        let cur = chars[i];
        let split_after_lower = prev.is_lowercase() && cur.is_uppercase();
        let split_before_acronym_tail = prev.is_uppercase()
            && cur.is_uppercase()
            && chars.get(i + 1).is_some_and(|c| c.is_lowercase());
        if split_after_lower || split_before_acronym_tail {
            boundaries.push(i);
        }
    }
    boundaries.push(chars.len());

    let byte_offsets: Vec<usize> = {
        let mut offsets = Vec::with_capacity(chars.len() + 1);
        let mut acc = 0;
        for c in &chars {
            offsets.push(acc);
            acc += c.len_utf8();
        }
        offsets.push(acc);
        offsets
    };

    boundaries
        .windows(2)
        .filter_map(|w| {
            let (start, end) = (byte_offsets[w[0]], byte_offsets[w[1]]);
            if start < end { Some(&s[start..end]) } else { None }
        })
        .collect()
}

/// Split on underscores.
pub fn split_snake_case(s: &str) -> Vec<&str> {
    s.split('_').filter(|p| !p.is_empty()).collect()
}

/// Full identifier-text tokenization per the tokenization rules: split on
/// dot, `#`, colon, whitespace, underscore, and camelCase boundaries; all
/// lowercased; stop words and tokens of length <= 2 removed (single-letter
/// generics are a signature-field concern, not a token-stream concern, so
/// they are not special-cased here).
pub fn tokenize_identifier(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw_segment in text.split(|c: char| {
        c == '.' || c == '#' || c == ':' || c == '_' || c.is_whitespace() || !c.is_alphanumeric()
    }) {
        if raw_segment.is_empty() {
            continue;
        }
        for part in split_camel_case(raw_segment) {
            let lower = part.to_lowercase();
            if lower.len() > 2 && !is_stop_word(&lower) {
                out.push(lower);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_camel_case() {
        assert_eq!(split_camel_case("UserService"), vec!["User", "Service"]);
    }

    #[test]
    fn splits_acronym_prefixed_camel_case() {
        assert_eq!(split_camel_case("getHTTPResponse"), vec!["get", "HTTP", "Response"]);
        assert_eq!(split_camel_case("XMLParser"), vec!["XML", "Parser"]);
    }

    #[test]
    fn splits_snake_case() {
        assert_eq!(split_snake_case("process_files_optimized"), vec!["process", "files", "optimized"]);
    }

    #[test]
    fn tokenize_identifier_drops_stopwords_and_short_tokens() {
        let tokens = tokenize_identifier("com.pkg.UserService#authenticateUser");
        assert!(tokens.contains(&"user".to_string()));
        assert!(tokens.contains(&"service".to_string()));
        assert!(tokens.contains(&"authenticate".to_string()));
        assert!(tokens.contains(&"pkg".to_string()));
        // "Service" contributes "service"; the trailing "User" contributes
        // "user" only once per split, but identifiers are not deduped here -
        // deduplication is the enricher's job, not the tokenizer's.
    }

    #[test]
    fn tokenize_identifier_is_lowercased() {
        let tokens = tokenize_identifier("XMLHttpRequest");
        assert!(tokens.iter().all(|t| t.chars().all(|c| !c.is_uppercase())));
    }
}
