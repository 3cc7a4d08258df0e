use anyhow::Result;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexReader, TantivyDocument};

use crate::tantivy_utils::{build_schema, register_tokenizers};

/// In-memory BM25 index over `(doc_id, search_text)` pairs. Built once per
/// corpus and read concurrently afterwards.
pub struct TextIndex {
	index: Index,
	reader: IndexReader,
	doc_id_field: Field,
	en_field: Field,
	simple_field: Field,
}

impl TextIndex {
	pub fn build<'a, I>(docs: I) -> Result<Self>
	where
		I: IntoIterator<Item = (&'a str, &'a str)>,
	{
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizers(&index);
		let doc_id_field = schema.get_field("doc_id")?;
		let en_field = schema.get_field("text_en")?;
		let simple_field = schema.get_field("text_simple")?;
		let mut index_writer = index.writer(50_000_000)?;
		let mut count = 0usize;
		for (doc_id, text) in docs {
			index_writer.add_document(doc!(
				doc_id_field => doc_id,
				en_field => text,
				simple_field => text,
			))?;
			count += 1;
		}
		index_writer.commit()?;
		let reader = index.reader()?;
		reader.reload()?;
		tracing::debug!(documents = count, "text index built");
		Ok(Self { index, reader, doc_id_field, en_field, simple_field })
	}

	/// Raw BM25 scores, best first. Terms are OR'd; punctuation and operator
	/// keywords never reach the query parser. English stemming applies for `en`, plain lowercase
	/// matching otherwise.
	pub fn search(&self, query: &str, language: &str, limit: usize) -> Result<Vec<(String, f32)>> {
		let cleaned: String = query.to_lowercase().chars().map(|c| if c.is_alphanumeric() { c } else { ' ' }).collect();
		if cleaned.trim().is_empty() || limit == 0 { return Ok(Vec::new()); }
		let field = if language == "en" { self.en_field } else { self.simple_field };
		let parser = QueryParser::for_index(&self.index, vec![field]);
		let (parsed, errors) = parser.parse_query_lenient(&cleaned);
		if !errors.is_empty() { tracing::debug!(?errors, "lenient query parse dropped clauses"); }
		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&parsed, &TopDocs::with_limit(limit))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let id = doc.get_first(self.doc_id_field).and_then(|v| v.as_str()).unwrap_or("").to_string();
			hits.push((id, score));
		}
		Ok(hits)
	}
}
