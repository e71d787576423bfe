use time::{format_description::BorrowedFormatItem, macros::format_description, Date};

use crate::Result;

/// Date layout expected by the tax template.
pub static TEMPLATE_DATE_FMT: &[BorrowedFormatItem] = format_description!("[day]/[month]/[year]");

/// Column names of a filled template row, in the order they are written.
pub const OUTPUT_COLUMNS: [&str; 8] = [
    "ISIN",
    "Description of shares sold",
    "Number of Shares",
    "Date of Purchase (DD/MM/YYYY)",
    "Total Purchase Value",
    "Date of Sale (DD/MM/YYYY)",
    "Sale Price per Share",
    "Net capital gain (auto-calculated)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Maps the broker's `SELL_BUY` indicator (1 = buy, 2 = sell).
    pub fn from_indicator(indicator: f64) -> Option<Side> {
        if indicator == 1. {
            Some(Side::Buy)
        } else if indicator == 2. {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub isin: String,
    pub name: String,
    pub side: Side,
    pub quantity: f64,
    pub trade_date: Date,
    /// 1-based row in the source sheet.
    pub row: usize,
}

/// A realized profit/loss line as reported by the broker. Never recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitRecord {
    pub name: String,
    pub name_key: String,
    pub sell_rate: f64,
    pub sell_value: f64,
    pub buy_value: f64,
    pub net_profit: f64,
}

/// One capital-gains entry per security, built up while sells are matched.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedRecord {
    pub isin: String,
    pub description: String,
    pub shares: f64,
    pub purchase_date: Date,
    pub total_purchase_value: f64,
    pub sale_date: Date,
    pub sale_price_per_share: f64,
    pub net_gain: f64,
}

/// A single output cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn to_csv_field(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
        }
    }
}

impl ConsolidatedRecord {
    pub fn purchase_date_text(&self) -> Result<String> {
        Ok(self.purchase_date.format(TEMPLATE_DATE_FMT)?)
    }

    pub fn sale_date_text(&self) -> Result<String> {
        Ok(self.sale_date.format(TEMPLATE_DATE_FMT)?)
    }

    /// Finalized row, aligned with [`OUTPUT_COLUMNS`].
    pub fn cells(&self) -> Result<[Cell; 8]> {
        Ok([
            Cell::Text(self.isin.clone()),
            Cell::Text(self.description.clone()),
            Cell::Number(self.shares),
            Cell::Text(self.purchase_date_text()?),
            Cell::Number(self.total_purchase_value),
            Cell::Text(self.sale_date_text()?),
            Cell::Number(self.sale_price_per_share),
            Cell::Number(self.net_gain),
        ])
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn side_indicator() {
        assert_eq!(Side::from_indicator(1.), Some(Side::Buy));
        assert_eq!(Side::from_indicator(2.), Some(Side::Sell));
        assert_eq!(Side::from_indicator(3.), None);
        assert_eq!(Side::from_indicator(1.9), None);
    }

    #[test]
    fn cells_format_dates_day_first() {
        let record = ConsolidatedRecord {
            isin: "INE000A01010".to_string(),
            description: "XYZ LIMITED".to_string(),
            shares: 100.,
            purchase_date: date!(2023 - 03 - 07),
            total_purchase_value: 5000.,
            sale_date: date!(2024 - 11 - 21),
            sale_price_per_share: 75.5,
            net_gain: 2550.,
        };
        let cells = record.cells().unwrap();
        assert_eq!(cells[3], Cell::Text("07/03/2023".to_string()));
        assert_eq!(cells[5], Cell::Text("21/11/2024".to_string()));
        assert_eq!(cells[2], Cell::Number(100.));
        assert_eq!(cells.len(), OUTPUT_COLUMNS.len());
    }
}
