use anyhow::Result;
use recgraph_core::StoreConfig;
use std::path::Path;
use std::process::ExitCode;

use super::{OutputContext, open_existing};

pub fn execute(dir: &Path, config: StoreConfig, output: &OutputContext) -> Result<ExitCode> {
    let store = open_existing(dir, config)?;
    let report = store.check_consistency()?;
    store.close()?;

    output.print(&report, &[report.to_string()])?;
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
