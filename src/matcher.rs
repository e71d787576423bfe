//! Matches sells against the buy lots that funded them and folds the result
//! into one [`ConsolidatedRecord`] per ISIN.

use std::{collections::HashMap, fmt};

use tracing::{debug, warn};

use crate::{
    model::{ConsolidatedRecord, ProfitRecord, Side, Transaction},
    normalize::NameNormalizer,
};

/// How the reported net profit of a sell is added to its record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GainPolicy {
    /// Once per matched sell, however many lots it consumed.
    #[default]
    PerSell,
    /// Once per consumed lot. A sell split over N lots counts its profit N
    /// times; kept for parity with spreadsheets filled by earlier runs.
    PerLot,
}

/// A buy transaction and the quantity still available to later sells.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyLot {
    pub tx: Transaction,
    pub remaining: f64,
}

impl BuyLot {
    pub fn new(tx: Transaction) -> Self {
        let remaining = tx.quantity;
        Self { tx, remaining }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining <= 0.
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    UnmatchedSell {
        isin: String,
        name: String,
        row: usize,
    },
    LotShortfall {
        isin: String,
        name: String,
        row: usize,
        unmatched: f64,
    },
    DuplicateProfitKey {
        key: String,
        name: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnmatchedSell { isin, name, row } => {
                write!(f, "No PnL match found for scrip: {name} ({isin}, row {row})")
            }
            Diagnostic::LotShortfall {
                isin,
                name,
                row,
                unmatched,
            } => write!(
                f,
                "Not enough buy quantity for {name} ({isin}, row {row}): {unmatched} shares left unmatched"
            ),
            Diagnostic::DuplicateProfitKey { key, name } => write!(
                f,
                "PnL row {name:?} ignored, an earlier row already uses key {key:?}"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consolidation {
    /// In order of creation, i.e. order of the first matched sell per ISIN.
    pub records: Vec<ConsolidatedRecord>,
    pub diagnostics: Vec<Diagnostic>,
    /// Buy lots after matching, in matching order.
    pub lots: Vec<BuyLot>,
}

/// First profit record per normalized name.
pub struct ProfitIndex<'a> {
    by_key: HashMap<&'a str, &'a ProfitRecord>,
}

impl<'a> ProfitIndex<'a> {
    pub fn build(profits: &'a [ProfitRecord], diagnostics: &mut Vec<Diagnostic>) -> Self {
        let mut by_key = HashMap::with_capacity(profits.len());
        for p in profits {
            if by_key.contains_key(p.name_key.as_str()) {
                warn!(key = %p.name_key, name = %p.name, "duplicate PnL key, keeping first");
                diagnostics.push(Diagnostic::DuplicateProfitKey {
                    key: p.name_key.clone(),
                    name: p.name.clone(),
                });
                continue;
            }
            by_key.insert(p.name_key.as_str(), p);
        }
        Self { by_key }
    }

    pub fn get(&self, key: &str) -> Option<&'a ProfitRecord> {
        self.by_key.get(key).copied()
    }
}

/// Stable sort by (ISIN, trade date); ties keep source row order.
pub fn sort_for_matching(txs: &mut [Transaction]) {
    txs.sort_by(|a, b| {
        a.isin
            .cmp(&b.isin)
            .then(a.trade_date.cmp(&b.trade_date))
    });
}

/// Splits `transactions` by side, sorts both sides and consolidates.
pub fn consolidate(
    transactions: Vec<Transaction>,
    profits: &[ProfitRecord],
    normalizer: &NameNormalizer,
    policy: GainPolicy,
) -> Consolidation {
    let (mut buys, mut sells): (Vec<_>, Vec<_>) = transactions
        .into_iter()
        .partition(|t| t.side == Side::Buy);
    sort_for_matching(&mut buys);
    sort_for_matching(&mut sells);
    debug!(buys = buys.len(), sells = sells.len(), "partitioned transactions");
    consolidate_sorted(buys, &sells, profits, normalizer, policy)
}

/// Matches `sells` against `buys`. Both must already be sorted with
/// [`sort_for_matching`]; that order decides which lots fund which sell.
pub fn consolidate_sorted(
    buys: Vec<Transaction>,
    sells: &[Transaction],
    profits: &[ProfitRecord],
    normalizer: &NameNormalizer,
    policy: GainPolicy,
) -> Consolidation {
    let mut diagnostics = Vec::new();
    let index = ProfitIndex::build(profits, &mut diagnostics);

    let mut lots: Vec<BuyLot> = buys.into_iter().map(BuyLot::new).collect();
    let mut lots_by_isin: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, lot) in lots.iter().enumerate() {
        lots_by_isin.entry(lot.tx.isin.clone()).or_default().push(i);
    }

    let mut records: Vec<ConsolidatedRecord> = Vec::new();
    let mut record_by_isin: HashMap<String, usize> = HashMap::new();

    for sell in sells {
        let key = normalizer.normalize(Some(&sell.name));
        let Some(profit) = index.get(&key) else {
            warn!(scrip = %sell.name, isin = %sell.isin, row = sell.row, "no PnL match found");
            diagnostics.push(Diagnostic::UnmatchedSell {
                isin: sell.isin.clone(),
                name: sell.name.clone(),
                row: sell.row,
            });
            continue;
        };

        let mut qty_needed = sell.quantity;
        let mut touched: Option<usize> = None;
        for &lot_index in lots_by_isin.get(&sell.isin).map(Vec::as_slice).unwrap_or(&[]) {
            let lot = &mut lots[lot_index];
            if lot.is_exhausted() {
                continue;
            }
            let used = lot.remaining.min(qty_needed);

            let record_index = *record_by_isin.entry(sell.isin.clone()).or_insert_with(|| {
                records.push(ConsolidatedRecord {
                    isin: sell.isin.clone(),
                    description: sell.name.clone(),
                    shares: 0.,
                    purchase_date: lot.tx.trade_date,
                    total_purchase_value: profit.buy_value,
                    sale_date: sell.trade_date,
                    sale_price_per_share: profit.sell_rate,
                    net_gain: 0.,
                });
                records.len() - 1
            });
            let record = &mut records[record_index];
            record.shares += used;
            if policy == GainPolicy::PerLot {
                record.net_gain += profit.net_profit;
            }
            record.purchase_date = record.purchase_date.min(lot.tx.trade_date);
            record.sale_date = record.sale_date.min(sell.trade_date);
            touched = Some(record_index);

            lot.remaining -= used;
            qty_needed -= used;
            if qty_needed <= 0. {
                break;
            }
        }

        if let (GainPolicy::PerSell, Some(record_index)) = (policy, touched) {
            records[record_index].net_gain += profit.net_profit;
        }
        if qty_needed > 0. {
            warn!(
                scrip = %sell.name,
                isin = %sell.isin,
                row = sell.row,
                unmatched = qty_needed,
                "sell quantity exceeds available buy lots"
            );
            diagnostics.push(Diagnostic::LotShortfall {
                isin: sell.isin.clone(),
                name: sell.name.clone(),
                row: sell.row,
                unmatched: qty_needed,
            });
        }
    }

    Consolidation {
        records,
        diagnostics,
        lots,
    }
}
