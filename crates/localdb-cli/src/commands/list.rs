use super::{json_pretty, load_manifest, EXIT_SUCCESS};
use localdb_core::ConnectionDescriptor;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct Row {
    name: String,
    kind: &'static str,
    parent: Option<String>,
    /// Connection string the resource gets once its instance is running.
    connection: Option<String>,
    package: Option<String>,
}

pub fn run(manifest_path: &Path, json: bool) -> Result<u8, String> {
    let (manifest, base_dir) = load_manifest(manifest_path)?;
    let mut rows = Vec::new();

    for name in manifest.instance.keys() {
        rows.push(Row {
            name: name.clone(),
            kind: "LocalDbInstance",
            parent: None,
            connection: Some(ConnectionDescriptor::for_instance(name).to_string()),
            package: None,
        });
    }
    for (name, db) in &manifest.database {
        let descriptor =
            ConnectionDescriptor::for_instance(&db.instance).with_database(db.database_name_or(name));
        rows.push(Row {
            name: name.clone(),
            kind: "LocalDbDatabase",
            parent: Some(db.instance.clone()),
            connection: Some(descriptor.to_string()),
            package: db
                .dacpac
                .as_ref()
                .map(|p| base_dir.join(p).display().to_string()),
        });
    }
    for (name, project) in &manifest.project {
        rows.push(Row {
            name: name.clone(),
            kind: "SqlProject",
            parent: project.target.clone(),
            connection: None,
            package: project
                .path
                .as_ref()
                .map(|p| base_dir.join(p).display().to_string()),
        });
    }

    if json {
        println!("{}", json_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("no resources declared");
    } else {
        println!("{:<20} {:<16} {:<16} CONNECTION", "NAME", "TYPE", "PARENT");
        for row in &rows {
            println!(
                "{:<20} {:<16} {:<16} {}",
                row.name,
                row.kind,
                row.parent.as_deref().unwrap_or(""),
                row.connection.as_deref().unwrap_or("")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
