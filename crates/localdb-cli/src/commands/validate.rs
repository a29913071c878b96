use super::{json_pretty, load_manifest, EXIT_SUCCESS};
use std::path::Path;

pub fn run(manifest_path: &Path, json: bool) -> Result<u8, String> {
    let (manifest, _) = load_manifest(manifest_path)?;
    let packages = manifest
        .database
        .values()
        .filter(|d| d.dacpac.is_some())
        .count()
        + manifest
            .project
            .values()
            .filter(|p| p.target.is_some())
            .count();

    if json {
        let report = serde_json::json!({
            "valid": true,
            "manifest": manifest_path.display().to_string(),
            "instances": manifest.instance.len(),
            "databases": manifest.database.len(),
            "projects": manifest.project.len(),
            "packages": packages,
            "engine": manifest.engine.backend,
            "deployer": manifest.deployer.backend,
        });
        println!("{}", json_pretty(&report)?);
    } else {
        println!(
            "{} is valid: {} instances, {} databases, {} projects, {packages} packages",
            manifest_path.display(),
            manifest.instance.len(),
            manifest.database.len(),
            manifest.project.len(),
        );
    }
    Ok(EXIT_SUCCESS)
}
