use crate::error::Result;
use crate::settings::{save_settings, shellexpand_path, Settings};

pub fn run(mut settings: Settings, root: Option<&str>, sheet: Option<&str>) -> Result<()> {
    if let Some(dir) = root {
        let expanded = shellexpand_path(dir);
        std::fs::create_dir_all(&expanded)?;
        settings.root_dir = shellexpand_path(&expanded);
    }
    if let Some(sheet) = sheet {
        settings.spreadsheet = sheet.to_string();
    }
    save_settings(&settings)?;

    let ws = settings.workspace(None, None);
    for bucket in ws.layout.bucket_roots() {
        std::fs::create_dir_all(&bucket)?;
    }

    println!("Root:         {}", ws.root.display());
    println!("Spreadsheet:  {}", ws.spreadsheet.display());
    println!("Metadata:     {}", ws.metadata.display());
    let [completed, pending] = ws.layout.bucket_names();
    println!("Folders:      {completed}/, {pending}/");
    println!("Threshold:    {} files", ws.ready_threshold);
    if !ws.spreadsheet.exists() {
        println!();
        println!("Spreadsheet not found yet. Create it with the columns 付款人 and 开票内容.");
    }
    Ok(())
}
