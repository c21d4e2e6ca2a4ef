//! CLI argument parsing for the process-import-worker binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::services::files::FileKind;

#[derive(Parser)]
#[command(name = "process-import-worker", about = "Bulk process import worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the import job periodically (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Claim and process waiting batches once, then exit
    RunOnce,
    /// Register a spreadsheet as a new waiting batch
    Upload {
        /// Spreadsheet to upload (.xlsx, .xls or .csv)
        file: PathBuf,
        /// Display name of the batch (defaults to the file name)
        #[arg(long, default_value = "")]
        name: String,
        /// Identifier of the user importing the file
        #[arg(long)]
        imported_by: String,
        /// MIME type of the upload (guessed from the extension when omitted)
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// List batches with their row counters as JSON
    List,
    /// List the rows of a batch as JSON
    Items {
        batch_id: i64,
    },
    /// Write a stored file of a batch to disk
    Download {
        batch_id: i64,
        #[arg(long, value_enum, default_value_t = DownloadKind::Original)]
        kind: DownloadKind,
        /// Output path (defaults to the stored file name)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Write the result spreadsheet of a batch to disk
    Report {
        batch_id: i64,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Put a failed batch back in the queue
    Reset {
        batch_id: i64,
    },
    /// Mark an error row as imported by hand
    MarkRow {
        row_id: i64,
        /// Process created manually for this row
        #[arg(long)]
        process_id: i64,
    },
    /// Delete a batch and its rows
    Delete {
        batch_id: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DownloadKind {
    Original,
    Csv,
}

impl From<DownloadKind> for FileKind {
    fn from(kind: DownloadKind) -> Self {
        match kind {
            DownloadKind::Original => FileKind::Original,
            DownloadKind::Csv => FileKind::OriginalCsv,
        }
    }
}
