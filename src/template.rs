//! Fills the tax template: finds the `ISIN` header row and writes one
//! consolidated record per row below it.

use std::{fs::File, io::Read, path::Path};

use anyhow::{Context, Error};
use calamine::{open_workbook_auto, Data, Range, Reader, SheetType};
use regex::Regex;
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::{debug, info};

use crate::{
    model::{Cell, ConsolidatedRecord},
    Result,
};

/// Only the first rows of the template are searched for the header.
pub const HEADER_SEARCH_ROWS: u32 = 10;

/// 0-based sheet row holding an `ISIN` cell within the first
/// [`HEADER_SEARCH_ROWS`] rows.
pub fn find_header_row(range: &Range<Data>) -> Option<u32> {
    let (start_row, _) = range.start()?;
    range
        .rows()
        .enumerate()
        .map(|(i, r)| (start_row + i as u32, r))
        .take_while(|(row, _)| *row < HEADER_SEARCH_ROWS)
        .find(|(_, r)| r.iter().any(|c| matches!(c, Data::String(s) if s.trim() == "ISIN")))
        .map(|(row, _)| row)
}

fn copy_template_cells(sheet: &mut Worksheet, range: &Range<Data>) -> Result<()> {
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    for (r, c, value) in range.used_cells() {
        let row = start_row + r as u32;
        let col = u16::try_from(start_col as usize + c).context("template column out of range")?;
        match value {
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                sheet.write_string(row, col, s)?;
            }
            Data::Float(v) => {
                sheet.write_number(row, col, *v)?;
            }
            Data::Int(v) => {
                sheet.write_number(row, col, *v as f64)?;
            }
            Data::Bool(b) => {
                sheet.write_boolean(row, col, *b)?;
            }
            Data::DateTime(dt) => {
                sheet.write_number(row, col, dt.as_f64())?;
            }
            _ => {}
        }
    }
    Ok(())
}

// Formulas are stored without the leading `=`; rust_xlsxwriter accepts both.
fn copy_template_formulas(sheet: &mut Worksheet, formulas: &Range<String>) -> Result<()> {
    let (start_row, start_col) = formulas.start().unwrap_or((0, 0));
    for (r, c, formula) in formulas.used_cells() {
        if formula.is_empty() {
            continue;
        }
        let row = start_row + r as u32;
        let col = u16::try_from(start_col as usize + c).context("template column out of range")?;
        sheet.write_formula(row, col, formula.as_str())?;
    }
    Ok(())
}

/// Index of the tab that was active when an xlsx template was saved.
/// `None` for other formats or when the workbook does not record one.
pub fn active_sheet_index(path: &Path) -> Result<Option<usize>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open template {}", path.display()))?;
    let Ok(mut archive) = zip::ZipArchive::new(file) else {
        return Ok(None);
    };
    let Ok(mut part) = archive.by_name("xl/workbook.xml") else {
        return Ok(None);
    };
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;

    let active_tab = Regex::new(r#"activeTab="(\d+)""#)?;
    Ok(active_tab
        .captures(&xml)
        .and_then(|c| c[1].parse::<usize>().ok()))
}

/// Writes `records` starting on the row after `header_row`, columns from A.
pub fn write_records(
    sheet: &mut Worksheet,
    header_row: u32,
    records: &[ConsolidatedRecord],
) -> Result<()> {
    for (i, record) in records.iter().enumerate() {
        let row = header_row + 1 + i as u32;
        for (col, cell) in record.cells()?.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Text(s) => sheet.write_string(row, col, s)?,
                Cell::Number(n) => sheet.write_number(row, col, *n)?,
            };
        }
    }
    Ok(())
}

/// Copies every worksheet of `template_path` (values and formulas) to
/// `output_path` and writes `records` below the `ISIN` header of the target
/// sheet: `sheet_name`, else the template's active sheet, else the first.
/// Fails before writing anything if the header is missing.
pub fn fill_template<P: AsRef<Path>, Q: AsRef<Path>>(
    template_path: P,
    output_path: Q,
    sheet_name: Option<&str>,
    records: &[ConsolidatedRecord],
) -> Result<()> {
    let template_path = template_path.as_ref();
    let mut workbook = open_workbook_auto(template_path)
        .with_context(|| format!("failed to open template {}", template_path.display()))?;
    let names = workbook.sheet_names();
    let target = match sheet_name {
        Some(name) => name.to_string(),
        None => {
            let active = active_sheet_index(template_path)?.unwrap_or(0);
            names
                .get(active)
                .or_else(|| names.first())
                .cloned()
                .context("template has no sheets")?
        }
    };
    let range = workbook
        .worksheet_range(&target)
        .with_context(|| format!("missing sheet {target}"))?;

    let Some(header_row) = find_header_row(&range) else {
        return Err(Error::msg("Header row with 'ISIN' not found in template."));
    };
    debug!(header_row = header_row + 1, sheet = %target, "found template header");

    let worksheets: Vec<String> = workbook
        .sheets_metadata()
        .iter()
        .filter(|s| s.typ == SheetType::WorkSheet)
        .map(|s| s.name.clone())
        .collect();

    let mut out = Workbook::new();
    for name in &worksheets {
        let values = workbook
            .worksheet_range(name)
            .with_context(|| format!("failed to read sheet {name}"))?;
        let formulas = workbook
            .worksheet_formula(name)
            .with_context(|| format!("failed to read formulas of sheet {name}"))?;

        let sheet = out.add_worksheet();
        sheet.set_name(name)?;
        copy_template_cells(sheet, &values)?;
        copy_template_formulas(sheet, &formulas)?;
        if *name == target {
            write_records(sheet, header_row, records)?;
            sheet.set_active(true);
        }
    }
    out.save(output_path.as_ref())?;

    info!(
        records = records.len(),
        sheets = worksheets.len(),
        "Filled template saved to {}",
        output_path.as_ref().display()
    );
    Ok(())
}
