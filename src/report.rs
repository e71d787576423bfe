use std::path::Path;

use tracing::info;

use crate::{
    matcher::{Consolidation, Diagnostic},
    model::{ConsolidatedRecord, OUTPUT_COLUMNS},
    Result,
};

/// Counts gathered while running, printed once at the end.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub buys: usize,
    pub sells: usize,
    pub profit_records: usize,
    pub records: usize,
    pub total_shares: f64,
    pub total_net_gain: f64,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunSummary {
    pub fn new(buys: usize, sells: usize, profit_records: usize, consolidation: &Consolidation) -> Self {
        let (total_shares, total_net_gain) = consolidation
            .records
            .iter()
            .fold((0., 0.), |(shares, gain), r| (shares + r.shares, gain + r.net_gain));
        Self {
            buys,
            sells,
            profit_records,
            records: consolidation.records.len(),
            total_shares,
            total_net_gain,
            diagnostics: consolidation.diagnostics.clone(),
        }
    }
}

pub fn write_detail_as_csv<P: AsRef<Path>>(records: &[ConsolidatedRecord], file_path: P) -> Result<()> {
    let mut wtr = csv::Writer::from_path(&file_path)?;
    wtr.write_record(OUTPUT_COLUMNS)?;
    for r in records {
        wtr.write_record(r.cells()?.iter().map(|c| c.to_csv_field()))?;
    }
    wtr.flush()?;
    info!(
        "The consolidated records were written as CSV to file {}",
        file_path.as_ref().to_string_lossy()
    );
    Ok(())
}

pub fn print_summary(summary: &RunSummary) {
    println!("\n=== CAPITAL GAINS SUMMARY ===\n");
    println!("Buy transactions: {}", summary.buys);
    println!("Sell transactions: {}", summary.sells);
    println!("PnL records: {}", summary.profit_records);
    println!("Total records generated: {}", summary.records);
    println!("Total shares matched: {}", summary.total_shares);
    println!("Total net capital gain: {:.2}", summary.total_net_gain);
    if !summary.diagnostics.is_empty() {
        println!("\n{} issue(s) need attention:", summary.diagnostics.len());
        for d in &summary.diagnostics {
            println!("  - {d}");
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn csv_detail_has_template_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detail.csv");
        let record = ConsolidatedRecord {
            isin: "INE1".to_string(),
            description: "ACME".to_string(),
            shares: 10.,
            purchase_date: date!(2023 - 01 - 02),
            total_purchase_value: 900.,
            sale_date: date!(2024 - 05 - 06),
            sale_price_per_share: 120.5,
            net_gain: 305.,
        };
        write_detail_as_csv(&[record], &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("ISIN,Description of shares sold,"));
        assert_eq!(lines.next().unwrap(), "INE1,ACME,10,02/01/2023,900,06/05/2024,120.5,305");
    }

    #[test]
    fn summary_totals() {
        let consolidation = Consolidation {
            records: vec![
                ConsolidatedRecord {
                    isin: "A".to_string(),
                    description: "A".to_string(),
                    shares: 10.,
                    purchase_date: date!(2023 - 01 - 01),
                    total_purchase_value: 0.,
                    sale_date: date!(2024 - 01 - 01),
                    sale_price_per_share: 0.,
                    net_gain: -4.5,
                },
                ConsolidatedRecord {
                    isin: "B".to_string(),
                    description: "B".to_string(),
                    shares: 5.,
                    purchase_date: date!(2023 - 01 - 01),
                    total_purchase_value: 0.,
                    sale_date: date!(2024 - 01 - 01),
                    sale_price_per_share: 0.,
                    net_gain: 10.,
                },
            ],
            ..Default::default()
        };
        let summary = RunSummary::new(3, 2, 2, &consolidation);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.total_shares, 15.);
        assert_eq!(summary.total_net_gain, 5.5);
    }
}
