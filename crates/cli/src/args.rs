//! Command-line surface of the `bloodbank` binary.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use bloodbank_auth::Permission;
use bloodbank_core::{DonorId, RequestId};

/// Blood bank request fulfillment and donor registry.
#[derive(Parser, Debug)]
#[command(name = "bloodbank")]
#[command(about = "Operate the blood bank ledger: requests, stock and donors")]
pub struct Cli {
    /// Username of the acting operator
    #[arg(short, long, global = true, env = "BLOODBANK_USER")]
    pub user: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create missing tables and seed empty whole-blood stock rows
    Migrate,

    /// Manage operator accounts
    #[command(subcommand)]
    User(UserCommand),

    #[command(flatten)]
    Operation(Operation),
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create a user or change its role
    Add {
        username: String,
        #[arg(long, default_value = "staff")]
        role: String,
    },
}

/// Operations performed on behalf of an operator.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Record a new pending hospital request
    SubmitRequest(SubmitRequestArgs),

    /// Fulfil a pending request from stock
    Approve { request_id: RequestId },

    /// Cancel a pending request
    Reject { request_id: RequestId },

    /// List hospital requests
    #[command(subcommand)]
    Requests(RequestsCommand),

    /// Add whole-blood units for a blood group
    AddStock {
        #[arg(long)]
        blood: String,
        #[arg(long, allow_negative_numbers = true)]
        units: i64,
    },

    /// Manage the donor registry
    #[command(subcommand)]
    Donor(DonorCommand),
}

impl Operation {
    /// Permission the operator must hold, if any beyond being a known user.
    pub fn required_permission(&self) -> Option<Permission> {
        match self {
            Operation::SubmitRequest(_) => Some(Permission::SUBMIT_REQUESTS),
            Operation::Approve { .. } | Operation::Reject { .. } => Some(Permission::FULFILL_REQUESTS),
            Operation::AddStock { .. } => Some(Permission::RESTOCK_INVENTORY),
            Operation::Requests(RequestsCommand::List { .. }) => None,
            Operation::Donor(DonorCommand::List { .. }) => None,
            Operation::Donor(_) => Some(Permission::MANAGE_DONORS),
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum RequestsCommand {
    /// Search requests, newest first
    List {
        /// Matches hospital name or city
        #[arg(long)]
        search: Option<String>,
        /// Status filter (pending, fulfilled, cancelled), or "all"
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequestArgs {
    #[arg(long)]
    pub hospital: String,
    /// Stored as "N/A" when omitted
    #[arg(long, default_value = "")]
    pub city: String,
    #[arg(long)]
    pub blood: String,
    #[arg(long, allow_negative_numbers = true)]
    pub units: i64,
    #[arg(long, default_value = "")]
    pub notes: String,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct DonorFields {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub blood: String,
    #[arg(long)]
    pub phone: String,
    #[arg(long, default_value = "")]
    pub email: String,
    #[arg(long, default_value = "")]
    pub city: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DonorCommand {
    /// Register a donor
    Add {
        #[command(flatten)]
        fields: DonorFields,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        dob: Option<NaiveDate>,
        #[arg(long)]
        gender: Option<String>,
    },

    /// Replace a donor's contact details
    Update {
        donor_id: DonorId,
        #[command(flatten)]
        fields: DonorFields,
    },

    /// Remove a donor
    Delete { donor_id: DonorId },

    /// Search donors, newest first
    List {
        #[arg(long)]
        search: Option<String>,
        /// Blood group filter, or "all"
        #[arg(long)]
        blood: Option<String>,
    },
}
