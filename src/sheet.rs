//! The claims spreadsheet as an in-memory table.
//!
//! Only the first worksheet of an `.xlsx` workbook is read and written back;
//! `.csv` files are read as UTF-8 with an optional byte-order mark, which is
//! preserved on write.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::models::{Row, Status};

pub const COL_PAYER: &str = "付款人";
pub const COL_DESCRIPTION: &str = "开票内容";
pub const COL_STATUS: &str = "材料准备";
pub const COL_UNIQUE_ID: &str = "唯一ID";
pub const COL_FILE_COUNT: &str = "文件数量";

const BOM: &str = "\u{feff}";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Spreadsheet date serial (days since 1899-12-30).
    DateTime(f64),
}

impl CellValue {
    /// Trimmed display text. Whole numbers render without a decimal point.
    pub fn text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => b.to_string(),
            CellValue::DateTime(serial) => format_serial(*serial),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn format_serial(serial: f64) -> String {
    let Some(epoch) = chrono::NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0)) else {
        return format_number(serial);
    };
    let millis = (serial * 86_400_000.0).round() as i64;
    let stamp = epoch + chrono::Duration::milliseconds(millis);
    if serial.fract() == 0.0 {
        stamp.format("%Y-%m-%d").to_string()
    } else {
        stamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Xlsx,
    Csv,
}

fn kind_of(path: &Path) -> Result<FileKind> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" => Ok(FileKind::Xlsx),
        "csv" => Ok(FileKind::Csv),
        _ => Err(SyncError::UnsupportedFormat(path.display().to_string())),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// Zero-based (row, column) of the header's first cell in the worksheet.
    origin: (u32, u32),
    bom: bool,
}

impl Table {
    #[cfg(test)]
    pub fn new(headers: &[&str]) -> Self {
        Self {
            sheet_name: "Sheet1".to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
            origin: (0, 0),
            bom: false,
        }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    /// Index of the named column, appending it when missing.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        match self.column(name) {
            Some(i) => i,
            None => {
                self.headers.push(name.to_string());
                self.headers.len() - 1
            }
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&CellValue::Empty)
    }

    fn set(&mut self, row: usize, col: usize, value: CellValue) {
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, CellValue::Empty);
        }
        cells[col] = value;
    }

    /// One `Row` per non-blank data line. The status, id and count columns
    /// are added when the sheet lacks them.
    pub fn extract_rows(&mut self) -> Result<Vec<Row>> {
        let payer = self
            .column(COL_PAYER)
            .ok_or_else(|| SyncError::MissingColumn(COL_PAYER.to_string()))?;
        let description = self
            .column(COL_DESCRIPTION)
            .ok_or_else(|| SyncError::MissingColumn(COL_DESCRIPTION.to_string()))?;
        let status = self.ensure_column(COL_STATUS);
        let unique_id = self.ensure_column(COL_UNIQUE_ID);
        self.ensure_column(COL_FILE_COUNT);

        let mut rows = Vec::new();
        for (index, cells) in self.rows.iter().enumerate() {
            if cells.iter().all(CellValue::is_blank) {
                continue;
            }
            let mut row = Row::new(
                index,
                &self.cell(index, payer).text(),
                &self.cell(index, description).text(),
            );
            row.line += self.origin.0 as usize;
            row.unique_id = self.cell(index, unique_id).text();
            row.status = Status::parse(&self.cell(index, status).text());
            rows.push(row);
        }
        Ok(rows)
    }

    /// Write id, status and file count back for every reconciled row.
    /// A status cell that already reads as the derived status keeps the
    /// user's spelling.
    pub fn apply_rows(&mut self, rows: &[Row]) {
        let status = self.ensure_column(COL_STATUS);
        let unique_id = self.ensure_column(COL_UNIQUE_ID);
        let file_count = self.ensure_column(COL_FILE_COUNT);
        for row in rows {
            let Some(count) = row.file_count else { continue };
            if row.index >= self.rows.len() {
                continue;
            }
            self.set(row.index, unique_id, CellValue::Text(row.unique_id.clone()));
            if Status::parse(&self.cell(row.index, status).text()) != row.status {
                self.set(row.index, status, CellValue::Text(row.status.as_str().to_string()));
            }
            self.set(row.index, file_count, CellValue::Number(count as f64));
        }
    }
}

pub fn read_table(path: &Path) -> Result<Table> {
    match kind_of(path)? {
        FileKind::Csv => read_csv(path),
        FileKind::Xlsx => read_xlsx(path),
    }
}

fn read_csv(path: &Path) -> Result<Table> {
    let raw = std::fs::read_to_string(path)?;
    let bom = raw.starts_with(BOM);
    let content = raw.strip_prefix(BOM).unwrap_or(&raw);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = rdr.records();
    let headers = match records.next() {
        Some(record) => record?.iter().map(|h| h.trim().to_string()).collect(),
        None => Vec::new(),
    };
    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|s| {
                    if s.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(s.to_string())
                    }
                })
                .collect(),
        );
    }
    let sheet_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Table {
        sheet_name,
        headers,
        rows,
        origin: (0, 0),
        bom,
    })
}

#[cfg(feature = "xlsx")]
fn read_xlsx(path: &Path) -> Result<Table> {
    use calamine::{Data, Reader};

    let mut workbook = calamine::open_workbook_auto(path)?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SyncError::Other(format!("{} has no worksheets", path.display())))?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let convert = |cell: &Data| match cell {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    };

    let origin = range.start().unwrap_or((0, 0));
    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|r| r.iter().map(|c| convert(c).text()).collect())
        .unwrap_or_default();
    let rows = rows.map(|r| r.iter().map(convert).collect()).collect();
    Ok(Table {
        sheet_name,
        headers,
        rows,
        origin,
        bom: false,
    })
}

#[cfg(not(feature = "xlsx"))]
fn read_xlsx(path: &Path) -> Result<Table> {
    Err(SyncError::UnsupportedFormat(format!(
        "{} (built without xlsx support)",
        path.display()
    )))
}

pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    match kind_of(path)? {
        FileKind::Csv => write_csv(table, path),
        FileKind::Xlsx => write_xlsx(table, path),
    }
}

fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    if table.bom {
        file.write_all(BOM.as_bytes())?;
    }
    let width = table.headers.len();
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(&table.headers)?;
    for cells in &table.rows {
        let mut record: Vec<String> = cells
            .iter()
            .map(|c| match c {
                CellValue::Text(s) => s.clone(),
                other => other.text(),
            })
            .collect();
        if record.len() < width {
            record.resize(width, String::new());
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(feature = "xlsx")]
fn write_xlsx(table: &Table, path: &Path) -> Result<()> {
    use rust_xlsxwriter::{Format, Workbook};

    let date = Format::new().set_num_format("yyyy-mm-dd");
    let date_time = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    let (top, left) = table.origin;
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    if !table.sheet_name.is_empty() {
        sheet.set_name(&table.sheet_name)?;
    }
    for (col, header) in table.headers.iter().enumerate() {
        if !header.is_empty() {
            sheet.write_string(top, left as u16 + col as u16, header)?;
        }
    }
    for (r, cells) in table.rows.iter().enumerate() {
        let row = top + (r + 1) as u32;
        for (col, cell) in cells.iter().enumerate() {
            let col = left as u16 + col as u16;
            match cell {
                CellValue::Empty => {}
                CellValue::Text(s) => {
                    sheet.write_string(row, col, s)?;
                }
                CellValue::Number(n) => {
                    sheet.write_number(row, col, *n)?;
                }
                CellValue::Bool(b) => {
                    sheet.write_boolean(row, col, *b)?;
                }
                CellValue::DateTime(serial) => {
                    let format = if serial.fract() == 0.0 { &date } else { &date_time };
                    sheet.write_number_with_format(row, col, *serial, format)?;
                }
            }
        }
    }
    workbook.save(path)?;
    Ok(())
}

#[cfg(not(feature = "xlsx"))]
fn write_xlsx(_table: &Table, path: &Path) -> Result<()> {
    Err(SyncError::UnsupportedFormat(format!(
        "{} (built without xlsx support)",
        path.display()
    )))
}

/// `claims.xlsx` -> `claims_updated.xlsx`, beside the original.
pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_updated.{}", ext.to_string_lossy()),
        None => format!("{stem}_updated"),
    };
    path.with_file_name(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavedTo {
    Original(PathBuf),
    Backup(PathBuf),
}

/// Write the table over `path`, falling back to the `_updated` copy when
/// the original cannot be replaced.
pub fn save_with_fallback(table: &Table, path: &Path) -> Result<SavedTo> {
    match write_table(table, path) {
        Ok(()) => Ok(SavedTo::Original(path.to_path_buf())),
        Err(e) => {
            let backup = backup_path(path);
            log::warn!(
                "Could not write {} ({e}); it may be open in another program or read-only. Writing {} instead",
                path.display(),
                backup.display()
            );
            write_table(table, &backup)?;
            Ok(SavedTo::Backup(backup))
        }
    }
}
