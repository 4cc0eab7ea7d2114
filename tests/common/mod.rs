#![allow(dead_code)]

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const SCENARIO_B_CSV: &str = "Product Name,Sales,Date\n\
                                  Car,500,2024-09-01\n\
                                  Car,300,2024-09-20\n\
                                  Bike,100,2024-10-05\n";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store_path(&self) -> PathBuf {
        self.temp_dir.path().join("store.json")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }
}

/// Builds an `.xlsx` upload with an extra leading `Name` column, as exported
/// by a typical sales spreadsheet.
pub fn sample_workbook(rows: &[(&str, &str, f64, &str)]) -> Vec<u8> {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_by_name_mut("Sheet1").expect("default sheet");
    for (col, header) in ["Name", "Product Name", "Sales", "Date"].iter().enumerate() {
        sheet
            .get_cell_mut((col as u32 + 1, 1u32))
            .set_value_string(header.to_string());
    }
    for (idx, (name, product, sales, date)) in rows.iter().enumerate() {
        let line = idx as u32 + 2;
        sheet.get_cell_mut((1u32, line)).set_value_string(name.to_string());
        sheet
            .get_cell_mut((2u32, line))
            .set_value_string(product.to_string());
        sheet.get_cell_mut((3u32, line)).set_value_number(*sales);
        sheet.get_cell_mut((4u32, line)).set_value_string(date.to_string());
    }
    let mut out = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut out).expect("write workbook");
    out.into_inner()
}
