use anyhow::Result;
use clap::{Parser, Subcommand};
use sto_indexer::config::Config;
use sto_indexer::query::commands::{
    NotificationQuery, cmd_block, cmd_cursors, cmd_listing_add, cmd_nodes, cmd_notifications,
    cmd_snapshot, cmd_snapshot_request, cmd_transaction,
};
use sto_indexer::query::formatters::OutputFormat;
use sto_indexer::repository::Database;

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query indexed notifications, block data and holder snapshots", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Notifications {
        #[arg(long = "type")]
        notification_type: Option<String>,

        #[arg(long)]
        priority: Option<i64>,

        #[arg(long)]
        address: Option<String>,

        /// Unix seconds, inclusive
        #[arg(long)]
        from_time: Option<u64>,

        /// Unix seconds, inclusive
        #[arg(long)]
        to_time: Option<u64>,

        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    Block {
        number: u64,
    },
    Tx {
        hash: String,
    },
    /// Snapshot status, with holders once DONE
    Snapshot {
        list_id: String,
    },
    SnapshotRequest {
        token: String,
        block: u64,
    },
    ListingAdd {
        token: String,
        template: String,
        owner: String,

        #[arg(long, default_value = "false")]
        private: bool,
    },
    Cursors,
    Nodes,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url)?;
    let conn = db.lock()?;

    match cli.command {
        Commands::Notifications {
            notification_type,
            priority,
            address,
            from_time,
            to_time,
            limit,
            offset,
        } => {
            let query = NotificationQuery {
                notification_type,
                priority,
                address,
                from_timestamp: from_time,
                to_timestamp: to_time,
                limit,
                offset,
            };
            cmd_notifications(&conn, query, &format)?;
        }
        Commands::Block { number } => {
            cmd_block(&conn, number, &format)?;
        }
        Commands::Tx { hash } => {
            cmd_transaction(&conn, &hash, &format)?;
        }
        Commands::Snapshot { list_id } => {
            cmd_snapshot(&conn, &list_id, &format)?;
        }
        Commands::SnapshotRequest { token, block } => {
            cmd_snapshot_request(&conn, &token, block)?;
        }
        Commands::ListingAdd {
            token,
            template,
            owner,
            private,
        } => {
            cmd_listing_add(&conn, &token, &template, &owner, !private)?;
        }
        Commands::Cursors => {
            cmd_cursors(&conn, config.chain_id, &format)?;
        }
        Commands::Nodes => {
            cmd_nodes(&conn, &format)?;
        }
    }

    Ok(())
}
