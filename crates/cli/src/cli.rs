use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand};

/// Root CLI for psp.
#[derive(Parser, Debug)]
#[command(name = "psp")]
#[command(about = "Persistent browser sessions: store, share and replay session state")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Session store directory (overrides config and PSP_STORAGE_DIR)
	#[arg(long, global = true, value_name = "DIR")]
	pub storage_dir: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the session distributor and CRUD API.
	Serve(ServeArgs),
	/// Manage persisted sessions.
	Session(SessionArgs),
}

impl Commands {
	/// Name reported in the output envelope.
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Serve(_) => "serve",
			Commands::Session(args) => args.action.name(),
		}
	}
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
	/// Bind host
	#[arg(long, value_name = "HOST")]
	pub host: Option<String>,

	/// Bind port
	#[arg(long, value_name = "PORT")]
	pub port: Option<u16>,

	/// JSON config file
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
	#[command(subcommand)]
	pub action: SessionAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionAction {
	/// Create an empty session.
	Create {
		name: String,
		#[arg(long)]
		description: Option<String>,
		/// Tag to attach (repeatable)
		#[arg(long = "tag", value_name = "TAG")]
		tags: Vec<String>,
		/// Seconds until the session expires
		#[arg(long, value_name = "SECS")]
		expire_in: Option<u64>,
	},
	/// List session metadata, newest first.
	List {
		/// Case-insensitive name substring
		#[arg(long)]
		name: Option<String>,
		/// Required tag (repeatable, all must match)
		#[arg(long = "tag", value_name = "TAG")]
		tags: Vec<String>,
		#[arg(long)]
		limit: Option<usize>,
		#[arg(long)]
		offset: Option<usize>,
	},
	/// Print a full session record.
	Show { id: String },
	/// Delete a session.
	Delete { id: String },
	/// Copy a session under a new id.
	Clone {
		id: String,
		/// Name of the copy (default: "<name> (Clone)")
		#[arg(long)]
		name: Option<String>,
	},
	/// Write a session record to a file.
	Export { id: String, file: PathBuf },
	/// Store a record written by `export`. A taken id is replaced.
	Import { file: PathBuf },
	/// Delete every session whose expiry has passed.
	Prune,
	/// Dry-run a session's recording against an in-memory browser.
	Replay {
		id: String,
		/// Playback speed multiplier; 0 replays without waiting
		#[arg(long, default_value_t = 0.0)]
		speed: f64,
		/// Abort on the first failing action instead of skipping it
		#[arg(long)]
		validate: bool,
	},
}

impl SessionAction {
	pub fn name(&self) -> &'static str {
		match self {
			SessionAction::Create { .. } => "session create",
			SessionAction::List { .. } => "session list",
			SessionAction::Show { .. } => "session show",
			SessionAction::Delete { .. } => "session delete",
			SessionAction::Clone { .. } => "session clone",
			SessionAction::Export { .. } => "session export",
			SessionAction::Import { .. } => "session import",
			SessionAction::Prune => "session prune",
			SessionAction::Replay { .. } => "session replay",
		}
	}
}

/// Help colors matching cargo.
fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.valid(AnsiColor::Cyan.on_default())
}
