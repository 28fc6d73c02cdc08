//! Context retrieval for RAG-style graphs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One retrievable snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub text: String,
}

/// Returns a ranked, fixed-size set of snippets for a query.
pub trait Retriever: Send + Sync {
    /// At most `k` documents, best first. Implementations return exactly
    /// `min(k, corpus size)` entries.
    fn retrieve(&self, query: &str, k: usize) -> Vec<Document>;
}

/// Ranks an in-memory corpus by how many query terms each document shares.
pub struct KeywordRetriever {
    corpus: Vec<Document>,
}

impl KeywordRetriever {
    pub fn new(corpus: Vec<Document>) -> Self {
        Self { corpus }
    }

    /// Number texts from 1 in the given order.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let corpus = texts
            .into_iter()
            .zip(1u64..)
            .map(|(text, id)| Document { id, text: text.into() })
            .collect();
        Self { corpus }
    }

    /// The two-document corpus the demo graphs ship with.
    pub fn demo() -> Self {
        Self::from_texts([
            "LangGraph creates graph-based agent flows.",
            "Use retrieval to improve LLM reasoning.",
        ])
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

impl Retriever for KeywordRetriever {
    fn retrieve(&self, query: &str, k: usize) -> Vec<Document> {
        let wanted = terms(query);

        let mut scored: Vec<(usize, usize)> = self
            .corpus
            .iter()
            .enumerate()
            .map(|(pos, doc)| (terms(&doc.text).intersection(&wanted).count(), pos))
            .collect();

        // Highest overlap first; corpus order breaks ties.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        scored
            .into_iter()
            .take(k)
            .map(|(_, pos)| self.corpus[pos].clone())
            .collect()
    }
}
