//! Contextual expansion (§4.6.4): sentence window, enclosing parent
//! declaration, and a contextualized-content block for each top-k result,
//! backed by a bounded, TTL'd file-content cache.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_CACHE_CAPACITY: usize = 50;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_SENTENCE_WINDOW: usize = 3;
const PARENT_MAX_CHARS: usize = 5000;
const PRECEDING_CONTEXT_CHARS: usize = 200;

struct CacheEntry {
    contents: String,
    loaded_at: Instant,
}

/// Bounded LRU with a time-to-live, guarding repeated reads of the same
/// source file across results in one search call (and across calls).
pub struct FileCache {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    order: Mutex<Vec<String>>,
}

impl FileCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
        }
    }

    fn touch(&self, key: &str) {
        let mut order = self.order.lock().expect("file cache order lock poisoned");
        order.retain(|k| k != key);
        order.push(key.to_string());
    }

    fn evict_if_needed(&self) {
        let mut order = self.order.lock().expect("file cache order lock poisoned");
        let mut entries = self.entries.lock().expect("file cache entries lock poisoned");
        while order.len() > self.capacity {
            let oldest = order.remove(0);
            entries.remove(&oldest);
        }
    }

    /// Reads `path`, serving from cache when a fresh entry exists.
    pub fn read(&self, path: &str) -> std::io::Result<String> {
        {
            let mut entries = self.entries.lock().expect("file cache entries lock poisoned");
            if let Some(entry) = entries.get(path) {
                if entry.loaded_at.elapsed() < self.ttl {
                    let contents = entry.contents.clone();
                    drop(entries);
                    self.touch(path);
                    return Ok(contents);
                }
                entries.remove(path);
            }
        }
        let contents = fs::read_to_string(Path::new(path))?;
        {
            let mut entries = self.entries.lock().expect("file cache entries lock poisoned");
            entries.insert(
                path.to_string(),
                CacheEntry {
                    contents: contents.clone(),
                    loaded_at: Instant::now(),
                },
            );
        }
        self.touch(path);
        self.evict_if_needed();
        Ok(contents)
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}

/// Splits text on ". " or newline boundaries, keeping the terminator.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            out.push(&text[start..=i]);
            start = i + 1;
            i += 1;
        } else if bytes[i] == b'.' && i + 1 < bytes.len() && bytes[i + 1] == b' ' {
            out.push(&text[start..=i + 1]);
            start = i + 2;
            i += 2;
        } else {
            i += 1;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// ±N sentences around the first occurrence of `needle` in `haystack`.
pub fn sentence_window(haystack: &str, needle: &str, window: usize) -> Option<String> {
    if needle.is_empty() {
        return None;
    }
    let byte_offset = haystack.find(needle)?;
    let sentences = split_sentences(haystack);
    let mut cursor = 0usize;
    let mut hit_index = None;
    for (idx, sentence) in sentences.iter().enumerate() {
        let end = cursor + sentence.len();
        if byte_offset >= cursor && byte_offset < end {
            hit_index = Some(idx);
            break;
        }
        cursor = end;
    }
    let hit_index = hit_index?;
    let lo = hit_index.saturating_sub(window);
    let hi = (hit_index + window + 1).min(sentences.len());
    Some(sentences[lo..hi].concat())
}

pub fn default_sentence_window(haystack: &str, needle: &str) -> Option<String> {
    sentence_window(haystack, needle, DEFAULT_SENTENCE_WINDOW)
}

const CLASS_MARKERS: &[&str] = &["struct ", "class ", "trait ", "interface ", "impl ", "enum "];

/// Scans upward from `start_line` (1-based) for a line matching a
/// class/interface declaration pattern, then concatenates from there
/// through `end_line`, bounded by `PARENT_MAX_CHARS`.
pub fn parent_document(file_contents: &str, start_line: u32, end_line: u32) -> Option<String> {
    let lines: Vec<&str> = file_contents.lines().collect();
    let start_idx = (start_line.saturating_sub(1)) as usize;
    if start_idx >= lines.len() {
        return None;
    }
    let mut parent_idx = None;
    for idx in (0..=start_idx).rev() {
        let trimmed = lines[idx].trim_start();
        if CLASS_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
            parent_idx = Some(idx);
            break;
        }
    }
    let parent_idx = parent_idx?;
    let end_idx = (end_line as usize).min(lines.len());
    let joined = lines[parent_idx..end_idx].join("\n");
    Some(head_chars(&joined, PARENT_MAX_CHARS))
}

fn head_chars(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        text.to_string()
    } else {
        chars[..max_chars].iter().collect()
    }
}

/// Deterministic header naming file/kind/line range, an optional preceding-
/// context block, then the candidate body.
pub fn contextualized_content(file_path: &str, kind: &str, start_line: u32, end_line: u32, preceding: Option<&str>, body: &str) -> String {
    let mut out = format!("// {file_path}:{start_line}-{end_line} ({kind})\n");
    if let Some(preceding) = preceding {
        let trimmed = tail_chars(preceding, PRECEDING_CONTEXT_CHARS);
        if !trimmed.trim().is_empty() {
            out.push_str("// Preceding context:\n");
            for line in trimmed.lines() {
                out.push_str("// ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out.push_str(body);
    out
}

fn tail_chars(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        text.to_string()
    } else {
        chars[chars.len() - max_chars..].iter().collect()
    }
}

/// Lines immediately preceding `start_line` (1-based, exclusive), joined.
pub fn preceding_lines(file_contents: &str, start_line: u32) -> Option<String> {
    let lines: Vec<&str> = file_contents.lines().collect();
    let start_idx = (start_line.saturating_sub(1)) as usize;
    if start_idx == 0 {
        return None;
    }
    let lo = start_idx.saturating_sub(10);
    Some(lines[lo..start_idx].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn sentence_window_expands_around_hit() {
        let text = "One. Two. Three. Four. Five.";
        let window = sentence_window(text, "Three.", 1).unwrap();
        assert!(window.contains("Two."));
        assert!(window.contains("Three."));
        assert!(window.contains("Four."));
        assert!(!window.contains("One."));
    }

    #[test]
    fn parent_document_finds_enclosing_struct() {
        let src = "struct Widget {\n    value: u32,\n}\n\nimpl Widget {\n    fn render(&self) {}\n}\n";
        let parent = parent_document(src, 6, 7).unwrap();
        assert!(parent.starts_with("impl Widget"));
    }

    #[test]
    fn parent_document_truncates_multi_byte_content_without_panicking() {
        let mut body = String::from("struct Widget {\n");
        for _ in 0..PARENT_MAX_CHARS {
            body.push_str("    // caf\u{e9} note\n");
        }
        body.push_str("}\n");
        let parent = parent_document(&body, 1, body.lines().count() as u32).unwrap();
        assert!(parent.chars().count() <= PARENT_MAX_CHARS);
    }

    #[test]
    fn contextualized_content_has_header_and_body() {
        let content = contextualized_content("widget.rs", "function", 10, 20, Some("let x = 1;"), "fn render() {}");
        assert!(content.starts_with("// widget.rs:10-20 (function)"));
        assert!(content.contains("fn render() {}"));
    }

    #[test]
    fn cache_serves_repeated_reads_without_rereading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.rs");
        std::fs::write(&path, "fn a() {}").unwrap();
        let cache = FileCache::new(10, Duration::from_secs(60));
        let first = cache.read(path.to_str().unwrap()).unwrap();
        std::fs::write(&path, "fn b() {}").unwrap();
        let second = cache.read(path.to_str().unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cache_evicts_beyond_capacity() {
        let cache = FileCache::new(1, Duration::from_secs(60));
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.rs");
        let b = dir.path().join("b.rs");
        std::fs::write(&a, "fn a() {}").unwrap();
        std::fs::write(&b, "fn b() {}").unwrap();
        cache.read(a.to_str().unwrap()).unwrap();
        cache.read(b.to_str().unwrap()).unwrap();
        let entries = cache.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key(b.to_str().unwrap()));
        drop(entries);
        thread::yield_now();
    }
}
