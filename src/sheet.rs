//! Reads the broker's trade history and realized P/L sheets.

use std::{io::Read, path::Path};

use anyhow::{Context, Error};
use calamine::{open_workbook_auto, Data, Range, Reader};
use time::{format_description::BorrowedFormatItem, macros::format_description, Date};
use tracing::debug;

use crate::{
    model::{ProfitRecord, Side, Transaction},
    normalize::NameNormalizer,
    Result,
};

static ISO_DATE_FMT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");
static SLASH_DATE_FMT: &[BorrowedFormatItem] = format_description!("[day padding:none]/[month padding:none]/[year]");
static DASH_DATE_FMT: &[BorrowedFormatItem] = format_description!("[day padding:none]-[month padding:none]-[year]");

// Julian day of the Excel epoch (serial 0 = 1899-12-30).
const EXCEL_EPOCH_JULIAN_DAY: i32 = 2_415_019;

/// Rows of the first worksheet (or a CSV file), headers trimmed.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Data>>,
    /// 1-based sheet row of `rows[0]`.
    pub first_row: usize,
}

impl Table {
    pub fn from_range(range: &Range<Data>) -> Result<Self> {
        let mut rows = range.rows();
        let headers = rows
            .next()
            .context("sheet is empty")?
            .iter()
            .map(|c| c.to_string().trim().to_string())
            .collect();
        let header_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
        Ok(Self {
            headers,
            rows: rows.map(<[Data]>::to_vec).collect(),
            first_row: header_row + 2,
        })
    }

    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(
                record?
                    .iter()
                    .map(|v| {
                        if v.trim().is_empty() {
                            Data::Empty
                        } else {
                            Data::String(v.to_string())
                        }
                    })
                    .collect(),
            );
        }
        Ok(Self {
            headers,
            rows,
            first_row: 2,
        })
    }

    /// Opens `.csv` files with the csv reader and anything else as a workbook.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let is_csv = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv {
            let file = std::fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            return Self::from_csv(file);
        }
        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("failed to open workbook {}", path.display()))?;
        let sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .context("workbook has no sheets")?;
        let range = workbook.worksheet_range(&sheet)?;
        Self::from_range(&range)
    }

    pub fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("failed to find {name} header"))
    }

    /// Non-blank rows with their 1-based sheet row number.
    fn data_rows(&self) -> impl Iterator<Item = (usize, &[Data])> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.iter().any(|c| !is_blank(c)))
            .map(|(i, r)| (self.first_row + i, r.as_slice()))
    }
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell<'a>(row: &'a [Data], index: usize) -> &'a Data {
    row.get(index).unwrap_or(&Data::Empty)
}

fn cell_text(row: &[Data], index: usize) -> String {
    match cell(row, index) {
        Data::Empty => String::new(),
        c => c.to_string().trim().to_string(),
    }
}

fn cell_f64(row: &[Data], index: usize, column: &str, row_num: usize) -> Result<f64> {
    let value = match cell(row, index) {
        Data::Int(v) => *v as f64,
        Data::Float(v) => *v,
        Data::Empty => 0.,
        Data::String(s) if s.trim().is_empty() => 0.,
        Data::String(s) => s.trim().replace(',', "").parse::<f64>().ok().with_context(|| {
            format!("invalid number {s:?} in {column} on row {row_num}")
        })?,
        other => {
            return Err(Error::msg(format!(
                "invalid number {other:?} in {column} on row {row_num}"
            )))
        }
    };
    Ok(value)
}

/// Converts an Excel serial day number to a date, ignoring the time part.
pub fn excel_serial_to_date(serial: f64) -> Result<Date> {
    let day = serial.floor() as i32 + EXCEL_EPOCH_JULIAN_DAY;
    Ok(Date::from_julian_day(day)?)
}

pub fn parse_date_text(text: &str) -> Result<Date> {
    let text = text.trim();
    // Drop a trailing time component such as "2024-01-15 00:00:00".
    let date_part = text
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(text);
    [ISO_DATE_FMT, SLASH_DATE_FMT, DASH_DATE_FMT]
        .iter()
        .find_map(|fmt| Date::parse(date_part, fmt).ok())
        .with_context(|| format!("unrecognised date {text:?}"))
}

fn cell_date(row: &[Data], index: usize, column: &str, row_num: usize) -> Result<Date> {
    let date = match cell(row, index) {
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::Float(v) => excel_serial_to_date(*v),
        Data::Int(v) => excel_serial_to_date(*v as f64),
        Data::String(s) | Data::DateTimeIso(s) => parse_date_text(s),
        other => Err(Error::msg(format!("unsupported date cell {other:?}"))),
    };
    date.with_context(|| format!("wrong date field in {column} on row {row_num}"))
}

/// Trade history: `ISIN`, `SCRIPNAME`, `SELL_BUY`, `BQTY`, `SQTY`, `TRADE_DATE`.
/// Rows with an unknown side indicator are skipped.
pub fn get_transactions(table: &Table) -> Result<Vec<Transaction>> {
    let isin_index = table.column("ISIN")?;
    let name_index = table.column("SCRIPNAME")?;
    let side_index = table.column("SELL_BUY")?;
    let buy_qty_index = table.column("BQTY")?;
    let sell_qty_index = table.column("SQTY")?;
    let date_index = table.column("TRADE_DATE")?;

    let mut transactions = Vec::new();
    for (row_num, r) in table.data_rows() {
        let indicator = cell_f64(r, side_index, "SELL_BUY", row_num)?;
        let Some(side) = Side::from_indicator(indicator) else {
            debug!(row = row_num, indicator, "skipping row with unknown side");
            continue;
        };
        let quantity = match side {
            Side::Buy => cell_f64(r, buy_qty_index, "BQTY", row_num)?,
            Side::Sell => cell_f64(r, sell_qty_index, "SQTY", row_num)?,
        };
        transactions.push(Transaction {
            isin: cell_text(r, isin_index),
            name: cell_text(r, name_index),
            side,
            quantity,
            trade_date: cell_date(r, date_index, "TRADE_DATE", row_num)?,
            row: row_num,
        });
    }
    Ok(transactions)
}

/// Realized P/L: `Scrip Name`, `Sell Rate`, `Sell Value`, `Buy Value`, `Net Realized P/L`.
pub fn get_profit_records(table: &Table, normalizer: &NameNormalizer) -> Result<Vec<ProfitRecord>> {
    let name_index = table.column("Scrip Name")?;
    let sell_rate_index = table.column("Sell Rate")?;
    let sell_value_index = table.column("Sell Value")?;
    let buy_value_index = table.column("Buy Value")?;
    let profit_index = table.column("Net Realized P/L")?;

    table
        .data_rows()
        .map(|(row_num, r)| {
            let name = cell_text(r, name_index);
            let name_key = normalizer.normalize((!name.is_empty()).then_some(name.as_str()));
            Ok(ProfitRecord {
                name_key,
                name,
                sell_rate: cell_f64(r, sell_rate_index, "Sell Rate", row_num)?,
                sell_value: cell_f64(r, sell_value_index, "Sell Value", row_num)?,
                buy_value: cell_f64(r, buy_value_index, "Buy Value", row_num)?,
                net_profit: cell_f64(r, profit_index, "Net Realized P/L", row_num)?,
            })
        })
        .collect()
}
