pub mod init;
pub mod status;
pub mod sync;
pub mod watch;

use clap::{Parser, Subcommand};

use crate::settings::{load_settings, Settings, Workspace};

#[derive(Parser)]
#[command(
    name = "claimsync",
    about = "Keep reimbursement folders in step with the club's claims spreadsheet."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Managed root folder (overrides settings)
    #[arg(long, global = true)]
    pub root: Option<String>,

    /// Spreadsheet path, relative to the root unless absolute (overrides settings)
    #[arg(long, global = true)]
    pub sheet: Option<String>,

    /// Log every per-row decision
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile folders and the spreadsheet once (the default).
    Sync {
        /// Show what would change without touching disk
        #[arg(long)]
        dry_run: bool,
    },
    /// Save --root/--sheet as defaults and create the status folders.
    Init,
    /// List tracked records and whether their folders exist.
    Status,
    /// Run a sync every time the spreadsheet is saved.
    Watch {
        /// Seconds to ignore repeated change events
        #[arg(long)]
        cooldown: Option<u64>,
        /// Seconds to wait for an editor to release the file
        #[arg(long = "max-wait")]
        max_wait: Option<u64>,
    },
}

impl Cli {
    /// Settings with this invocation's overrides applied.
    pub(crate) fn workspace(&self) -> (Settings, Workspace) {
        let settings = load_settings();
        let ws = settings.workspace(self.root.as_deref(), self.sheet.as_deref());
        (settings, ws)
    }
}
