use clap::{Parser, Subcommand};

/// AdParcel — gateway for an on-chain ad parcel marketplace
#[derive(Parser)]
#[command(name = "adparcel", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to bind (overrides ADPARCEL_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect registered websites
    Website {
        #[command(subcommand)]
        command: WebsiteCommands,
    },

    /// Manage recorded ad events
    Events {
        #[command(subcommand)]
        command: EventCommands,
    },
}

#[derive(Subcommand)]
pub enum WebsiteCommands {
    /// List registered websites
    List {
        /// Filter by owner wallet address
        #[arg(long)]
        owner: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum EventCommands {
    /// Drop impression/click rows older than the given number of days
    Prune {
        #[arg(long, default_value = "180")]
        days: i64,
    },
}
