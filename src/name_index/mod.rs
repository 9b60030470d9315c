//! Name Index: inverted full-text index over identifiers, signatures,
//! docstrings, and file paths.
//!
//! Backed by Tantivy, the same way the corpus's search engine is; the
//! contract here (`write`/`delete`/`commit`/`search`) is narrower than
//! Tantivy's own API on purpose so the rest of the engine never depends on
//! Tantivy types directly.

pub mod tokenizer;

use crate::error::NameIndexError;
use crate::model::{IndexEntry, SymbolKind};
use std::path::Path;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, STORED, Schema, TextFieldIndexing, TextOptions, STRING};
use tantivy::tokenizer::TextAnalyzer;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use tokenizer::CodeTokenizer;

const WRITER_HEAP_SIZE: usize = 50_000_000;

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub kind: Option<SymbolKind>,
    pub file_pattern: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NameHit {
    pub id: String,
    pub lexical_score: f32,
    pub hit_fields: Vec<&'static str>,
}

#[derive(Debug, Clone)]
struct SchemaFields {
    id: Field,
    name_tokens: Field,
    signature: Field,
    doc: Field,
    file_path: Field,
    package: Field,
    kind: Field,
}

pub struct NameIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: SchemaFields,
}

impl NameIndex {
    pub fn create_in_ram() -> Result<Self, NameIndexError> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizer(&index);
        Self::from_index(index, fields)
    }

    pub fn open_or_create(dir: impl AsRef<Path>) -> Result<Self, NameIndexError> {
        let (schema, fields) = build_schema();
        std::fs::create_dir_all(dir.as_ref())?;
        let mmap_dir = tantivy::directory::MmapDirectory::open(dir.as_ref())?;
        let index = Index::open_or_create(mmap_dir, schema)?;
        register_tokenizer(&index);
        Self::from_index(index, fields)
    }

    fn from_index(index: Index, fields: SchemaFields) -> Result<Self, NameIndexError> {
        let writer = index.writer(WRITER_HEAP_SIZE)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
        })
    }

    /// Insert or replace an entry by `id`; idempotent.
    pub fn write(&self, entry: &IndexEntry) -> Result<(), NameIndexError> {
        let writer = self.writer.lock().expect("name index writer lock poisoned");
        writer.delete_term(Term::from_field_text(self.fields.id, &entry.id));
        writer.add_document(doc!(
            self.fields.id => entry.id.clone(),
            self.fields.name_tokens => entry.name_tokens.join(" "),
            self.fields.signature => entry.signature.clone(),
            self.fields.doc => entry.doc.clone().unwrap_or_default(),
            self.fields.file_path => entry.file_path.clone(),
            self.fields.package => entry.package.clone().unwrap_or_default(),
            self.fields.kind => entry.kind.as_str().to_string(),
        ))?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<(), NameIndexError> {
        let writer = self.writer.lock().expect("name index writer lock poisoned");
        writer.delete_term(Term::from_field_text(self.fields.id, id));
        Ok(())
    }

    /// Delete every entry whose `file_path` equals `path` (the only filter
    /// predicate the Coordinator needs: dropping a whole file's symbols).
    pub fn delete_by_file(&self, path: &str) -> Result<(), NameIndexError> {
        let writer = self.writer.lock().expect("name index writer lock poisoned");
        writer.delete_term(Term::from_field_text(self.fields.file_path, path));
        Ok(())
    }

    pub fn commit(&self) -> Result<(), NameIndexError> {
        let mut writer = self.writer.lock().expect("name index writer lock poisoned");
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), NameIndexError> {
        let mut writer = self.writer.lock().expect("name index writer lock poisoned");
        writer.delete_all_documents()?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Boolean-OR of analyzed tokens across `name_tokens` (highest weight),
    /// `signature`, `doc`, `file_path` (lowest weight). A query quoted with
    /// `"..."` is matched as an adjacent-position phrase instead.
    pub fn search(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<NameHit>, NameIndexError> {
        if query_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();

        let is_phrase = query_text.starts_with('"') && query_text.ends_with('"') && query_text.len() > 1;
        let query: Box<dyn Query> = if is_phrase {
            let phrase = query_text.trim_matches('"');
            self.build_phrase_query(phrase, filter)
        } else {
            self.build_or_query(query_text, filter)
        };
        let terms: Vec<String> = query_text
            .trim_matches('"')
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        let top_docs = searcher.search(&query, &TopDocs::with_limit(top_k))?;
        let max_score = top_docs.first().map(|(s, _)| *s).unwrap_or(1.0).max(f32::EPSILON);

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let stored: TantivyDocument = searcher.doc(addr)?;
            if let Some(id) = get_text(&stored, self.fields.id) {
                hits.push(NameHit {
                    id,
                    lexical_score: (score / max_score).clamp(0.0, 1.0),
                    hit_fields: self.matched_fields(&stored, &terms),
                });
            }
        }
        Ok(hits)
    }

    /// Which of `name_tokens`/`signature`/`doc`/`file_path` actually contain
    /// one of the matched query terms, in schema weight order.
    fn matched_fields(&self, stored: &TantivyDocument, terms: &[String]) -> Vec<&'static str> {
        let candidates: [(&'static str, Field); 4] = [
            ("name_tokens", self.fields.name_tokens),
            ("signature", self.fields.signature),
            ("doc", self.fields.doc),
            ("file_path", self.fields.file_path),
        ];
        candidates
            .into_iter()
            .filter(|(_, field)| {
                get_text(stored, *field)
                    .map(|text| {
                        let lower = text.to_lowercase();
                        terms.iter().any(|t| !t.is_empty() && lower.contains(t.as_str()))
                    })
                    .unwrap_or(false)
            })
            .map(|(name, _)| name)
            .collect()
    }

    fn build_or_query(&self, query_text: &str, filter: &SearchFilter) -> Box<dyn Query> {
        let terms: Vec<String> = query_text
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        let mut should: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for term in &terms {
            should.push(weighted_term(self.fields.name_tokens, term, 5.0));
            should.push(weighted_term(self.fields.signature, term, 3.0));
            should.push(weighted_term(self.fields.doc, term, 2.0));
            should.push(weighted_term(self.fields.file_path, term, 1.0));
        }
        let mut clauses: Vec<(Occur, Box<dyn Query>)> =
            vec![(Occur::Must, Box::new(BooleanQuery::new(should)))];
        self.apply_filters(filter, &mut clauses);
        Box::new(BooleanQuery::new(clauses))
    }

    fn build_phrase_query(&self, phrase: &str, filter: &SearchFilter) -> Box<dyn Query> {
        use tantivy::query::PhraseQuery;
        let terms: Vec<Term> = phrase
            .split_whitespace()
            .map(|t| Term::from_field_text(self.fields.name_tokens, &t.to_lowercase()))
            .collect();
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        if terms.len() >= 2 {
            clauses.push((Occur::Must, Box::new(PhraseQuery::new(terms))));
        } else if let Some(term) = terms.into_iter().next() {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
            ));
        }
        self.apply_filters(filter, &mut clauses);
        Box::new(BooleanQuery::new(clauses))
    }

    fn apply_filters(&self, filter: &SearchFilter, clauses: &mut Vec<(Occur, Box<dyn Query>)>) {
        if let Some(kind) = filter.kind {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.kind, kind.as_str()),
                    IndexRecordOption::Basic,
                )),
            ));
        }
        if let Some(pattern) = &filter.file_pattern {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.file_path, pattern),
                    IndexRecordOption::Basic,
                )),
            ));
        }
    }
}

fn weighted_term(field: Field, term: &str, boost: f32) -> (Occur, Box<dyn Query>) {
    (
        Occur::Should,
        Box::new(BoostQuery::new(
            Box::new(TermQuery::new(
                Term::from_field_text(field, term),
                IndexRecordOption::WithFreqsAndPositions,
            )),
            boost,
        )),
    )
}

fn get_text(doc: &TantivyDocument, field: Field) -> Option<String> {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();
    let code_text = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("code")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    let plain_text = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default().set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();

    let id = builder.add_text_field("id", STRING | STORED);
    let name_tokens = builder.add_text_field("name_tokens", code_text.clone());
    let signature = builder.add_text_field("signature", code_text);
    let doc = builder.add_text_field("doc", plain_text.clone());
    let file_path = builder.add_text_field("file_path", plain_text);
    let package = builder.add_text_field("package", STRING | STORED);
    let kind = builder.add_text_field("kind", STRING | STORED);

    (
        builder.build(),
        SchemaFields {
            id,
            name_tokens,
            signature,
            doc,
            file_path,
            package,
            kind,
        },
    )
}

fn register_tokenizer(index: &Index) {
    index
        .tokenizers()
        .register("code", TextAnalyzer::builder(CodeTokenizer).build());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name_tokens: &[&str], signature: &str, file_path: &str) -> IndexEntry {
        IndexEntry {
            id: id.to_string(),
            signature: signature.to_string(),
            name_tokens: name_tokens.iter().map(|s| s.to_string()).collect(),
            kind: SymbolKind::Method,
            file_path: file_path.to_string(),
            package: Some("com.pkg".to_string()),
            doc: Some("validates password and returns token".to_string()),
        }
    }

    #[test]
    fn write_then_search_finds_exact_name() {
        let index = NameIndex::create_in_ram().unwrap();
        index
            .write(&entry(
                "com.pkg.UserService#authenticateUser",
                &["authenticateUser"],
                "boolean authenticateUser(String u, String p)",
                "UserService.java",
            ))
            .unwrap();
        index
            .write(&entry(
                "com.pkg.PaymentService#authorizePayment",
                &["authorizePayment"],
                "boolean authorizePayment(Payment p)",
                "PaymentService.java",
            ))
            .unwrap();
        index.commit().unwrap();

        let hits = index.search("authenticateUser", &SearchFilter::default(), 10).unwrap();
        assert_eq!(hits[0].id, "com.pkg.UserService#authenticateUser");
    }

    #[test]
    fn write_is_idempotent_by_id() {
        let index = NameIndex::create_in_ram().unwrap();
        let e = entry("a.B#c", &["c"], "void c()", "B.java");
        index.write(&e).unwrap();
        index.write(&e).unwrap();
        index.commit().unwrap();
        assert_eq!(index.num_docs(), 1);
    }

    #[test]
    fn delete_by_file_removes_all_symbols_for_file() {
        let index = NameIndex::create_in_ram().unwrap();
        index.write(&entry("a.B#c", &["c"], "void c()", "B.java")).unwrap();
        index.write(&entry("a.B#d", &["d"], "void d()", "B.java")).unwrap();
        index.commit().unwrap();
        index.delete_by_file("B.java").unwrap();
        index.commit().unwrap();
        assert_eq!(index.num_docs(), 0);
    }

    #[test]
    fn hit_fields_reports_only_the_fields_a_term_actually_matched() {
        let index = NameIndex::create_in_ram().unwrap();
        index
            .write(&entry(
                "com.pkg.UserService#authenticateUser",
                &["authenticateUser"],
                "boolean authenticateUser(String u, String p)",
                "UserService.java",
            ))
            .unwrap();
        index.commit().unwrap();

        let hits = index.search("authenticateUser", &SearchFilter::default(), 10).unwrap();
        let hit = &hits[0];
        assert!(hit.hit_fields.contains(&"name_tokens"));
        assert!(hit.hit_fields.contains(&"signature"));
        assert!(!hit.hit_fields.contains(&"doc"));
        assert!(!hit.hit_fields.contains(&"file_path"));
    }

    #[test]
    fn empty_query_returns_empty_results() {
        let index = NameIndex::create_in_ram().unwrap();
        index.write(&entry("a.B#c", &["c"], "void c()", "B.java")).unwrap();
        index.commit().unwrap();
        let hits = index.search("", &SearchFilter::default(), 10).unwrap();
        assert!(hits.is_empty());
    }
}
