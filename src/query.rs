//! The `mmrag query` command.
//!
//! Builds a single-modality [`Query`] from the CLI flags, runs it through
//! the lenient [`Retriever::retrieve`](crate::retrieve::Retriever::retrieve),
//! and prints the ranked hits as text or JSON.

use anyhow::Result;
use mmrag_core::models::RetrievalResult;

use crate::config::Config;
use crate::retrieve::{Query, Retrieval};
use crate::services::Services;

pub const EMPTY_DATABASE_MESSAGE: &str = "Database is empty. Ingest files first.";
pub const NO_RESULTS_MESSAGE: &str = "No results found.";

/// Run the query command.
///
/// An invalid query (none or several inputs, a missing media file) is an
/// error. Failures past validation are logged and reported as no results.
pub async fn run_query(
    config: &Config,
    text: Option<&str>,
    image: Option<&str>,
    audio: Option<&str>,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let query = Query::from_inputs(text, image, audio)?;
    query.validate()?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);

    let services = Services::build(config).await?;
    let retrieval = services.retriever().retrieve(&query, top_k).await;

    if json {
        print_json(&retrieval)?;
    } else {
        print_human(&retrieval);
    }
    Ok(())
}

fn print_json(retrieval: &Retrieval) -> Result<()> {
    let value = match retrieval {
        Retrieval::EmptyDatabase => serde_json::json!({
            "empty_database": true,
            "results": [],
        }),
        Retrieval::Results(results) => serde_json::json!({
            "empty_database": false,
            "results": results,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_human(retrieval: &Retrieval) {
    let results = match retrieval {
        Retrieval::EmptyDatabase => {
            println!("{}", EMPTY_DATABASE_MESSAGE);
            return;
        }
        Retrieval::Results(results) if results.is_empty() => {
            println!("{}", NO_RESULTS_MESSAGE);
            return;
        }
        Retrieval::Results(results) => results,
    };

    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, result);
    }
}

fn print_result(rank: usize, result: &RetrievalResult) {
    let meta = &result.metadata;
    println!(
        "{}. [{:.4}] {} / {}",
        rank, result.score, meta.modality, meta.source_id
    );
    println!("    chunk: {}", meta.chunk_id);
    if let Some(ms) = meta.duration_ms {
        println!("    duration: {} ms", ms);
    }
    if let Some(ref path) = meta.chunk_data_path {
        println!("    path: {}", path);
    } else {
        println!("    excerpt: \"{}\"", excerpt(&result.content, 200));
    }
    println!();
}

/// First `max_chars` characters on one line.
fn excerpt(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
