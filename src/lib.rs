use std::path::PathBuf;

use anyhow::Error;
use tracing::info;

pub mod logging;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod report;
pub mod sheet;
pub mod template;

pub use matcher::{consolidate, Consolidation, Diagnostic, GainPolicy};
pub use model::{ConsolidatedRecord, ProfitRecord, Side, Transaction, OUTPUT_COLUMNS};
pub use normalize::{AliasRule, NameNormalizer};
pub use report::RunSummary;

pub type Result<T> = std::result::Result<T, Error>;

/// Input and output locations plus matching options for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub pnl_path: PathBuf,
    pub trades_path: PathBuf,
    pub template_path: PathBuf,
    pub output_path: PathBuf,
    pub template_sheet: Option<String>,
    pub aliases_path: Option<PathBuf>,
    pub detail_csv_path: Option<PathBuf>,
    pub gain_policy: GainPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pnl_path: PathBuf::from("PnL.xlsx"),
            trades_path: PathBuf::from("TradeHistory.xlsx"),
            template_path: PathBuf::from("taxTemplate.xlsx"),
            output_path: PathBuf::from("tax_filled.xlsx"),
            template_sheet: None,
            aliases_path: None,
            detail_csv_path: None,
            gain_policy: GainPolicy::default(),
        }
    }
}

/// Reads both inputs, consolidates, and fills the template.
pub fn run(config: &Config) -> Result<RunSummary> {
    let mut normalizer = NameNormalizer::default();
    if let Some(path) = &config.aliases_path {
        normalizer.extend(NameNormalizer::load_rules_csv_path(path)?);
    }

    let pnl = sheet::Table::open(&config.pnl_path)?;
    let trades = sheet::Table::open(&config.trades_path)?;
    info!(columns = ?pnl.headers, "PnL columns");
    info!(columns = ?trades.headers, "Trade history columns");

    let profits = sheet::get_profit_records(&pnl, &normalizer)?;
    let transactions = sheet::get_transactions(&trades)?;
    let buys = transactions.iter().filter(|t| t.side == Side::Buy).count();
    let sells = transactions.len() - buys;
    info!(buys, sells, profit_records = profits.len(), "loaded transactions");

    let consolidation = consolidate(transactions, &profits, &normalizer, config.gain_policy);
    info!(records = consolidation.records.len(), "Total records generated");

    template::fill_template(
        &config.template_path,
        &config.output_path,
        config.template_sheet.as_deref(),
        &consolidation.records,
    )?;
    if let Some(path) = &config.detail_csv_path {
        report::write_detail_as_csv(&consolidation.records, path)?;
    }

    Ok(RunSummary::new(buys, sells, profits.len(), &consolidation))
}
