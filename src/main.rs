use std::path::PathBuf;

use cleartax_fill::{logging, report::print_summary, run, Config, GainPolicy, Result};

use clap::Parser;

/// Fills a capital gains tax template from broker trade history and P/L reports
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Realized profit/loss report
    #[arg(long, default_value = "PnL.xlsx")]
    pnl: PathBuf,

    /// Trade history with buy and sell transactions
    #[arg(long, default_value = "TradeHistory.xlsx")]
    trades: PathBuf,

    /// Template containing an ISIN header row
    #[arg(long, default_value = "taxTemplate.xlsx")]
    template: PathBuf,

    #[arg(short, long, default_value = "tax_filled.xlsx")]
    output: PathBuf,

    /// Template sheet to fill. Defaults to the first sheet
    #[arg(long)]
    sheet: Option<String>,

    /// CSV of extra name aliases (columns: contains, canonical)
    #[arg(long)]
    aliases: Option<PathBuf>,

    /// Also write the consolidated records to this CSV file
    #[arg(long)]
    detail_csv: Option<PathBuf>,

    /// Add a sell's profit once for every buy lot it consumes
    #[arg(long)]
    gain_per_lot: bool,
}

fn main() -> Result<()> {
    logging::setup_tracing();
    let args = Args::parse();

    let config = Config {
        pnl_path: args.pnl,
        trades_path: args.trades,
        template_path: args.template,
        output_path: args.output,
        template_sheet: args.sheet,
        aliases_path: args.aliases,
        detail_csv_path: args.detail_csv,
        gain_policy: if args.gain_per_lot {
            GainPolicy::PerLot
        } else {
            GainPolicy::PerSell
        },
    };

    let summary = run(&config)?;
    print_summary(&summary);
    Ok(())
}
