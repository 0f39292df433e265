use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use factgraph_core::CollectionMode;

use super::{build_pipeline, read_documents, runtime, GlobalArgs};

pub fn run(global: &GlobalArgs, files: &[PathBuf], resolve: bool) -> Result<()> {
    let config = super::load_config(global)?;
    let documents = read_documents(files)?;
    let pipeline = Arc::new(build_pipeline(config)?);
    let mode = if resolve {
        CollectionMode::Resolve
    } else {
        CollectionMode::Independent
    };

    let output = runtime()?.block_on(pipeline.process_collection(documents, mode));

    for document in &output.documents {
        let stats = &document.stats;
        eprintln!(
            "{}: {} entities, {} relationships, {} escalated",
            stats.document_id,
            document.graph.stats.node_count,
            document.graph.relationships.len(),
            stats.routing.escalated,
        );
    }
    if let Some(unified) = &output.unified {
        eprintln!(
            "unified: {} entities from {} ({} merges)",
            unified.stats.unified_entities, unified.stats.input_entities, unified.stats.merges,
        );
    }

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &output)?;
    writeln!(stdout)?;
    Ok(())
}
