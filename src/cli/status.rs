use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::metadata::{is_legacy_key, MetadataStore};
use crate::settings::Workspace;

pub fn run(ws: &Workspace) -> Result<()> {
    println!("Root:         {}", ws.root.display());
    println!(
        "Spreadsheet:  {}{}",
        ws.spreadsheet.display(),
        if ws.spreadsheet.exists() { "" } else { " (missing)" }
    );
    println!("Metadata:     {}", ws.metadata.display());

    let store = MetadataStore::load(&ws.metadata);
    if store.is_empty() {
        println!();
        println!("No records yet. Run `claimsync sync` to create them.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Payer", "Content", "Folder", "State", "On disk"]);
    let (mut active, mut deleted, mut legacy, mut missing) = (0, 0, 0, 0);
    for (id, entry) in store.iter() {
        let state = if is_legacy_key(id) {
            legacy += 1;
            "legacy".dimmed().to_string()
        } else if entry.is_deleted() {
            deleted += 1;
            "deleted".yellow().to_string()
        } else {
            active += 1;
            "active".green().to_string()
        };
        let exists = !entry.folder_path.is_empty() && ws.layout.resolve(&entry.folder_path).is_dir();
        if !exists && !entry.is_deleted() && !is_legacy_key(id) {
            missing += 1;
        }
        table.add_row(vec![
            Cell::new(id),
            Cell::new(entry.display_payer()),
            Cell::new(entry.display_content()),
            Cell::new(&entry.folder_path),
            Cell::new(state),
            Cell::new(if exists { "yes".to_string() } else { "no".red().to_string() }),
        ]);
    }
    println!("Records ({})\n{table}", store.len());
    println!("Active:   {active}");
    println!("Deleted:  {deleted}");
    if legacy > 0 {
        println!("Legacy:   {legacy}");
    }
    if missing > 0 {
        println!("{}", format!("{missing} active folders are missing; the next sync recreates them.").yellow());
    }
    Ok(())
}
