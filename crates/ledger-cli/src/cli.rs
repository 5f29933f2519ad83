use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "ledger")]
#[command(about = "Check and exercise the LedgerLite host bridge")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the bridge config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the bridge configuration
    CheckConfig {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send a record through an in-process scripted host
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Amount paid
    #[arg(long)]
    pub amount: f64,
    /// Date of the movement (YYYY-MM-DD)
    #[arg(long)]
    pub date: NaiveDate,
    /// Vendor or payer
    #[arg(long, default_value = "")]
    pub vendor: String,
    /// Free-form notes
    #[arg(long, default_value = "")]
    pub notes: String,
    /// Host category id
    #[arg(long)]
    pub category: Option<String>,
    /// Submit as income instead of expense
    #[arg(long)]
    pub income: bool,
    /// How the scripted host answers submissions
    #[arg(long, value_enum, default_value_t = HostReply::Success)]
    pub reply: HostReply,
    /// Remote transaction id returned on success
    #[arg(long, default_value = "sim-1")]
    pub remote_id: String,
    /// Send the record a second time after the first pass
    #[arg(long)]
    pub resend: bool,
    /// Phrase typed at the resend confirmation
    #[arg(long, value_name = "TEXT")]
    pub phrase: Option<String>,
    /// Answer yes to every confirmation
    #[arg(short, long)]
    pub yes: bool,
    /// Override the submission timeout
    #[arg(long, value_name = "MS")]
    pub send_timeout_ms: Option<u64>,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum HostReply {
    /// Acknowledge with a remote transaction id
    Success,
    /// Answer with an ERROR envelope
    Reject,
    /// Claim success without a remote id
    Malformed,
    /// Never answer
    Silent,
    /// Never complete the handshake
    Offline,
}
