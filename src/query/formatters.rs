use crate::repository::{
    BlockRecord, CursorRecord, HolderBalance, NodeRecord, NotificationView, SnapshotRun, TxRecord,
};
use chrono::DateTime;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

/// Unix seconds as UTC RFC 3339.
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn csv_string(header: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut wtr = Writer::from_writer(vec![]);
    let _ = wtr.write_record(header);
    for row in rows {
        let _ = wtr.write_record(&row);
    }
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

fn short_hash(hash: &str) -> String {
    if hash.len() <= 12 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}

pub fn format_notifications(notifications: &[NotificationView], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if notifications.is_empty() {
                return "No notifications found.".to_string();
            }
            let mut table = new_table(vec![
                "Id", "Type", "Priority", "Address", "Block Time", "Token", "Read",
            ]);
            for n in notifications {
                let r = &n.record;
                table.add_row(vec![
                    Cell::new(&r.notification_id),
                    Cell::new(r.notification_type),
                    Cell::new(r.priority.as_i64()),
                    Cell::new(r.address.map(|a| format!("{a:#}")).unwrap_or_default()),
                    Cell::new(format_timestamp(r.block_timestamp)),
                    Cell::new(&r.metainfo.token_name),
                    Cell::new(n.is_read),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let items: Vec<_> = notifications
                .iter()
                .map(|n| {
                    let r = &n.record;
                    json!({
                        "notification_id": r.notification_id,
                        "notification_type": r.notification_type.as_str(),
                        "priority": r.priority.as_i64(),
                        "address": r.address.map(|a| a.to_checksum(None)),
                        "block_timestamp": format_timestamp(r.block_timestamp),
                        "args": r.args,
                        "metainfo": r.metainfo,
                        "is_read": n.is_read,
                        "is_flagged": n.is_flagged,
                        "is_deleted": n.is_deleted,
                        "created": format_timestamp(n.created),
                    })
                })
                .collect();
            pretty(&Value::Array(items))
        }
        OutputFormat::Csv => csv_string(
            &[
                "notification_id",
                "notification_type",
                "priority",
                "address",
                "block_timestamp",
                "token_address",
                "token_name",
                "args",
            ],
            notifications
                .iter()
                .map(|n| {
                    let r = &n.record;
                    vec![
                        r.notification_id.clone(),
                        r.notification_type.to_string(),
                        r.priority.as_i64().to_string(),
                        r.address.map(|a| format!("{a:?}")).unwrap_or_default(),
                        format_timestamp(r.block_timestamp),
                        r.metainfo.token_address.clone(),
                        r.metainfo.token_name.clone(),
                        Value::Object(r.args.clone()).to_string(),
                    ]
                })
                .collect(),
        ),
    }
}

pub fn format_block(block: &BlockRecord, transactions: &[TxRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Field", "Value"]);
            table.add_row(vec![Cell::new("Number"), Cell::new(block.number)]);
            table.add_row(vec![Cell::new("Hash"), Cell::new(&block.hash)]);
            table.add_row(vec![Cell::new("Parent Hash"), Cell::new(&block.parent_hash)]);
            table.add_row(vec![
                Cell::new("Miner"),
                Cell::new(block.miner.as_deref().unwrap_or("N/A")),
            ]);
            table.add_row(vec![
                Cell::new("Timestamp"),
                Cell::new(format_timestamp(block.timestamp)),
            ]);
            table.add_row(vec![
                Cell::new("Gas Used / Limit"),
                Cell::new(format!("{} / {}", block.gas_used, block.gas_limit)),
            ]);
            table.add_row(vec![Cell::new("Transactions"), Cell::new(transactions.len())]);

            let mut output = table.to_string();
            if !transactions.is_empty() {
                output.push('\n');
                output.push_str(&format_transactions_table(transactions));
            }
            output
        }
        OutputFormat::Json => pretty(&json!({
            "number": block.number,
            "hash": block.hash,
            "parent_hash": block.parent_hash,
            "sha3_uncles": block.sha3_uncles,
            "miner": block.miner,
            "state_root": block.state_root,
            "transactions_root": block.transactions_root,
            "receipts_root": block.receipts_root,
            "logs_bloom": block.logs_bloom,
            "difficulty": block.difficulty,
            "gas_limit": block.gas_limit,
            "gas_used": block.gas_used,
            "timestamp": format_timestamp(block.timestamp),
            "proof_of_authority_data": block.proof_of_authority_data,
            "mix_hash": block.mix_hash,
            "nonce": block.nonce,
            "size": block.size,
            "transactions": block.transactions,
        })),
        OutputFormat::Csv => csv_string(
            &["number", "hash", "parent_hash", "timestamp", "gas_used", "transactions"],
            vec![vec![
                block.number.to_string(),
                block.hash.clone(),
                block.parent_hash.clone(),
                format_timestamp(block.timestamp),
                block.gas_used.to_string(),
                block.transactions.len().to_string(),
            ]],
        ),
    }
}

fn format_transactions_table(transactions: &[TxRecord]) -> String {
    let mut table = new_table(vec!["Index", "Hash", "From", "To", "Value", "Gas"]);
    for tx in transactions {
        table.add_row(vec![
            Cell::new(tx.transaction_index),
            Cell::new(short_hash(&tx.hash)),
            Cell::new(&tx.from_address),
            Cell::new(tx.to_address.as_deref().unwrap_or("(create)")),
            Cell::new(&tx.value),
            Cell::new(tx.gas),
        ]);
    }
    table.to_string()
}

fn transaction_json(tx: &TxRecord) -> Value {
    json!({
        "hash": tx.hash,
        "block_hash": tx.block_hash,
        "block_number": tx.block_number,
        "transaction_index": tx.transaction_index,
        "from": tx.from_address,
        "to": tx.to_address,
        "input": tx.input,
        "gas": tx.gas,
        "gas_price": tx.gas_price,
        "value": tx.value,
        "nonce": tx.nonce,
    })
}

pub fn format_transaction(tx: &TxRecord, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Field", "Value"]);
            let to = tx.to_address.clone().unwrap_or_else(|| "(create)".to_string());
            let gas_price = tx.gas_price.clone().unwrap_or_else(|| "N/A".to_string());
            for (field, value) in [
                ("Hash", tx.hash.clone()),
                ("Block", format!("{} ({})", tx.block_number, tx.block_hash)),
                ("Index", tx.transaction_index.to_string()),
                ("From", tx.from_address.clone()),
                ("To", to),
                ("Value", tx.value.clone()),
                ("Gas", tx.gas.to_string()),
                ("Gas Price", gas_price),
                ("Nonce", tx.nonce.to_string()),
                ("Input", tx.input.clone()),
            ] {
                table.add_row(vec![Cell::new(field), Cell::new(value)]);
            }
            table.to_string()
        }
        OutputFormat::Json => pretty(&transaction_json(tx)),
        OutputFormat::Csv => csv_string(
            &[
                "hash",
                "block_number",
                "transaction_index",
                "from",
                "to",
                "value",
                "gas",
                "nonce",
            ],
            vec![vec![
                tx.hash.clone(),
                tx.block_number.to_string(),
                tx.transaction_index.to_string(),
                tx.from_address.clone(),
                tx.to_address.clone().unwrap_or_default(),
                tx.value.clone(),
                tx.gas.to_string(),
                tx.nonce.to_string(),
            ]],
        ),
    }
}

/// Run status, followed by its holders once the run is DONE.
pub fn format_snapshot(
    run: &SnapshotRun,
    holders: Option<&[HolderBalance]>,
    format: &OutputFormat,
) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["List Id", "Token", "Block", "Status", "Created"]);
            table.add_row(vec![
                Cell::new(&run.list_id),
                Cell::new(format!("{:#}", run.token_address)),
                Cell::new(run.block_number),
                Cell::new(run.status),
                Cell::new(format_timestamp(run.created)),
            ]);
            let mut output = table.to_string();

            if let Some(holders) = holders {
                output.push('\n');
                if holders.is_empty() {
                    output.push_str("No holders found.");
                } else {
                    let mut table = new_table(vec!["Rank", "Account", "Balance", "Locked"]);
                    for (i, holder) in holders.iter().enumerate() {
                        table.add_row(vec![
                            Cell::new(i + 1),
                            Cell::new(holder.account_address.to_checksum(None)),
                            Cell::new(holder.hold_balance),
                            Cell::new(holder.locked_balance),
                        ]);
                    }
                    output.push_str(&table.to_string());
                }
            }
            output
        }
        OutputFormat::Json => {
            let holders = holders.map(|holders| {
                holders
                    .iter()
                    .map(|h| {
                        json!({
                            "account_address": h.account_address.to_checksum(None),
                            "hold_balance": h.hold_balance.to_string(),
                            "locked_balance": h.locked_balance.to_string(),
                        })
                    })
                    .collect::<Vec<_>>()
            });
            pretty(&json!({
                "list_id": run.list_id,
                "token_address": run.token_address.to_checksum(None),
                "block_number": run.block_number,
                "status": run.status.as_str(),
                "created": format_timestamp(run.created),
                "holders": holders,
            }))
        }
        OutputFormat::Csv => match holders {
            Some(holders) => csv_string(
                &["list_id", "account_address", "hold_balance", "locked_balance"],
                holders
                    .iter()
                    .map(|h| {
                        vec![
                            run.list_id.clone(),
                            format!("{:?}", h.account_address),
                            h.hold_balance.to_string(),
                            h.locked_balance.to_string(),
                        ]
                    })
                    .collect(),
            ),
            None => csv_string(
                &["list_id", "token_address", "block_number", "status"],
                vec![vec![
                    run.list_id.clone(),
                    format!("{:?}", run.token_address),
                    run.block_number.to_string(),
                    run.status.to_string(),
                ]],
            ),
        },
    }
}

pub fn format_cursors(cursors: &[CursorRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if cursors.is_empty() {
                return "No cursors recorded.".to_string();
            }
            let mut table = new_table(vec!["Chain", "Target", "Block", "Updated"]);
            for c in cursors {
                table.add_row(vec![
                    Cell::new(c.chain_id),
                    Cell::new(&c.target),
                    Cell::new(c.block_number),
                    Cell::new(format_timestamp(c.updated_at)),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => pretty(&Value::Array(
            cursors
                .iter()
                .map(|c| {
                    json!({
                        "chain_id": c.chain_id,
                        "target": c.target,
                        "block_number": c.block_number,
                        "updated_at": format_timestamp(c.updated_at),
                    })
                })
                .collect(),
        )),
        OutputFormat::Csv => csv_string(
            &["chain_id", "target", "block_number", "updated_at"],
            cursors
                .iter()
                .map(|c| {
                    vec![
                        c.chain_id.to_string(),
                        c.target.clone(),
                        c.block_number.to_string(),
                        format_timestamp(c.updated_at),
                    ]
                })
                .collect(),
        ),
    }
}

pub fn format_nodes(nodes: &[NodeRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if nodes.is_empty() {
                return "No nodes checked yet.".to_string();
            }
            let mut table = new_table(vec!["Endpoint", "Priority", "Synced", "Updated"]);
            for n in nodes {
                table.add_row(vec![
                    Cell::new(&n.endpoint_uri),
                    Cell::new(n.priority),
                    Cell::new(n.is_synced),
                    Cell::new(format_timestamp(n.updated_at)),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => pretty(&Value::Array(
            nodes
                .iter()
                .map(|n| {
                    json!({
                        "endpoint_uri": n.endpoint_uri,
                        "priority": n.priority,
                        "is_synced": n.is_synced,
                        "updated_at": format_timestamp(n.updated_at),
                    })
                })
                .collect(),
        )),
        OutputFormat::Csv => csv_string(
            &["endpoint_uri", "priority", "is_synced", "updated_at"],
            nodes
                .iter()
                .map(|n| {
                    vec![
                        n.endpoint_uri.clone(),
                        n.priority.to_string(),
                        n.is_synced.to_string(),
                        format_timestamp(n.updated_at),
                    ]
                })
                .collect(),
        ),
    }
}
