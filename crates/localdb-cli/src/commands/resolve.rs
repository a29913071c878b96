use super::{json_pretty, load_manifest, EXIT_SUCCESS};
use localdb_core::{resolve_package_path, MsBuildEvaluator, SqlProjectResource};
use std::path::Path;

pub fn run(manifest_path: &Path, project: &str, json: bool) -> Result<u8, String> {
    let (manifest, base_dir) = load_manifest(manifest_path)?;
    let section = manifest
        .project
        .get(project)
        .ok_or_else(|| format!("no project named '{project}' in {}", manifest_path.display()))?;

    let resource = SqlProjectResource {
        name: project.to_owned(),
        project_path: section.path.as_ref().map(|p| base_dir.join(p)),
        dacpac: section.dacpac.as_ref().map(|p| base_dir.join(p)),
        target: section.target.clone(),
    };
    let path = resolve_package_path(&resource, &MsBuildEvaluator::new()).map_err(|e| e.to_string())?;

    if json {
        let report = serde_json::json!({
            "project": project,
            "package": path.display().to_string(),
            "exists": path.is_file(),
            "target": section.target,
        });
        println!("{}", json_pretty(&report)?);
    } else {
        println!("{}", path.display());
        if !path.is_file() {
            eprintln!("warning: {} does not exist yet; build the project first", path.display());
        }
    }
    Ok(EXIT_SUCCESS)
}
