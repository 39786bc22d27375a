//! Decision engine, hybrid retriever, context formatter, analyzer and graph
//! persister (C5-C9): the agentic core of the alert triage pipeline.

pub mod analyzer;
pub mod cypher_path;
pub mod decision;
pub mod formatter;
pub mod persister;
pub mod retriever;
pub mod templates;

pub use analyzer::{analyze, AnalysisOutcome};
pub use decision::plan;
pub use formatter::{format, FormattedContext};
pub use persister::{extract, persist, PersistOutcome};
pub use retriever::{Retriever, RetrieverConfig};
