use chrono::NaiveDate;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Run one source: extract, normalize and load, then advance its cursors
    Run {
        /// Source name, see `marketsync sources`
        source: String,

        #[arg(long = "resource", help = "Only run this resource (repeatable)")]
        resources: Vec<String>,

        #[arg(long, help = "Cursor partition; defaults to the configured client id")]
        partition: Option<String>,

        #[arg(long, help = "First day to extract (YYYY-MM-DD)")]
        start: Option<NaiveDate>,

        #[arg(long, help = "Last day to extract (YYYY-MM-DD)")]
        end: Option<NaiveDate>,

        #[arg(long, help = "Extract and normalize without writing or moving cursors")]
        dry_run: bool,

        #[arg(long, help = "Process at most this many files of a file-drop resource")]
        max_batches: Option<usize>,
    },
    /// Run several sources one after another (all of them when none is named)
    Sync {
        sources: Vec<String>,

        #[arg(long, help = "Extract and normalize without writing or moving cursors")]
        dry_run: bool,
    },
    /// List the sources and their resources
    Sources,
    Cursor {
        #[command(subcommand)]
        command: CursorCommand,
    },
}

#[derive(Subcommand)]
pub enum CursorCommand {
    /// Print the stored cursors of a source
    Show { source: String },
    /// Forget a cursor so the next run starts from the resource's initial value
    Reset {
        source: String,
        resource: String,

        #[arg(long, help = "Cursor partition; defaults to the configured client id")]
        partition: Option<String>,
    },
}
