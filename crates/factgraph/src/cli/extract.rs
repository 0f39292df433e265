use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use factgraph_core::DocumentGraph;

use super::{build_pipeline, read_documents, runtime, GlobalArgs};

/// Builds one graph per document, in input order.
pub fn run(global: &GlobalArgs, files: &[PathBuf]) -> Result<()> {
    let config = super::load_config(global)?;
    let documents = read_documents(files)?;
    let pipeline = build_pipeline(config)?;

    let graphs: Vec<DocumentGraph> = runtime()?.block_on(async {
        let mut graphs = Vec::with_capacity(documents.len());
        for document in &documents {
            graphs.push(pipeline.process_document(document).await.graph);
        }
        graphs
    });

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &graphs)?;
    writeln!(stdout)?;
    Ok(())
}
