//! CLI command definitions
//!
//! Defines the clap commands for the wallet-pilot CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Launch a browser session, or reattach to one already running
    Launch {
        /// Run with a visible window
        #[arg(long)]
        visible: bool,

        /// Leave the browser running when this command exits
        #[arg(long)]
        keep_open: bool,

        /// Remote debugging port for a fresh launch
        #[arg(long)]
        port: Option<u16>,
    },

    /// Navigate the primary page
    Navigate {
        /// URL to open
        url: String,
    },

    /// Click a control on the primary page
    Click {
        /// CSS selector, or visible text with --by-text
        target: String,

        /// Match by visible text instead of CSS
        #[arg(long)]
        by_text: bool,

        /// Match by data-testid instead of CSS
        #[arg(long)]
        by_test_id: bool,
    },

    /// Fill a control on the primary page
    Fill {
        /// CSS selector of the input
        target: String,

        /// Text to enter
        value: String,
    },

    /// Drive the wallet's confirmation popup to completion
    Approve {
        /// How long to wait for the popup, in milliseconds
        /// (default: the configured popup wait)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Click this trigger on the primary page first (listener is armed
        /// before the click, so an instant popup is not missed)
        #[arg(long)]
        trigger: Option<String>,
    },

    /// Import the wallet from the credentials file and set a password
    SetupWallet,

    /// Ask the wallet to switch the page to a known network
    SwitchNetwork {
        /// Network name from the catalog (e.g. mainnet, sepolia, polygon)
        network: String,
    },

    /// Query the accounts the page is connected to
    Address,

    /// Evaluate an expression in the primary page
    Eval {
        /// JavaScript expression; promises are awaited
        expression: String,
    },

    /// Screenshot the primary page
    Screenshot {
        /// Output path (default: state dir screenshots/)
        path: Option<PathBuf>,
    },

    /// List open browser surfaces
    Pages,

    /// Report session and extension status
    Status,

    /// Close the browser and remove the session pointer
    Teardown,
}
