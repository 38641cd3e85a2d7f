//! On-disk schema, matching the field names spec §6.3 mandates for any
//! document-store-backed adapter: `_id, side, bal, txs, date` for accounts
//! and `_id, date, chg, stat, ref1, ref2, dscr` for transactions.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    "_id" TEXT PRIMARY KEY,
    side  TEXT NOT NULL,
    bal   INTEGER NOT NULL,
    txs   TEXT NOT NULL,
    date  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    "_id" TEXT PRIMARY KEY,
    date  INTEGER NOT NULL,
    chg   TEXT NOT NULL,
    stat  TEXT NOT NULL,
    ref1  TEXT,
    ref2  TEXT,
    dscr  TEXT
);

CREATE INDEX IF NOT EXISTS idx_transactions_stat_date ON transactions (stat, date);
"#;
