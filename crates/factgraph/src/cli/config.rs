use std::io::Write;

use anyhow::Result;

use super::{load_config, GlobalArgs};

/// Prints the merged configuration. The validator token is never serialized.
pub fn run(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &config)?;
    writeln!(stdout)?;
    Ok(())
}
