//! `debug` - print the rendered project without touching the cluster.

use super::GlobalOptions;
use anyhow::Result;
use kdeploy_core::ResourceMeta;
use std::path::Path;

/// Print every rendered asset with its kind, name and source.
pub fn run(options: &GlobalOptions, path: &Path) -> Result<()> {
    let project = options.load_project(path)?;

    println!("Project:   {}", project.root().display());
    println!("Namespace: {}", project.namespace());
    println!("Variables:");
    for (key, value) in project.variables().iter() {
        println!("  {key} = {value}");
    }

    for asset in project.assets() {
        println!();
        println!(
            "---- {} {:?} ({})",
            asset.kind(),
            asset.name(),
            asset.source().display()
        );
        println!("{}", String::from_utf8_lossy(asset.raw()).trim_end());
    }
    Ok(())
}
