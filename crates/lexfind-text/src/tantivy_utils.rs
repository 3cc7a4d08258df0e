use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{Language, LowerCaser, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const ENGLISH_TOKENIZER: &str = "english_stemmed";
pub const SIMPLE_TOKENIZER: &str = "simple_lower";

/// `doc_id` is the stored key; `text_en` and `text_simple` hold the same
/// search text under the two analyzers.
pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	let _doc_id_field = schema_builder.add_text_field("doc_id", STRING | STORED);
	let _en_field = schema_builder.add_text_field("text_en", text_options(ENGLISH_TOKENIZER));
	let _simple_field = schema_builder.add_text_field("text_simple", text_options(SIMPLE_TOKENIZER));
	schema_builder.build()
}

fn text_options(tokenizer: &str) -> TextOptions {
	let indexing = TextFieldIndexing::default().set_tokenizer(tokenizer).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	TextOptions::default().set_indexing_options(indexing)
}

pub fn register_tokenizers(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let english = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.filter(Stemmer::new(Language::English))
		.build();
	let simple = TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser).build();
	index.tokenizers().register(ENGLISH_TOKENIZER, english);
	index.tokenizers().register(SIMPLE_TOKENIZER, simple);
}
