use clap::{Parser, Subcommand};

use todos::config::{DEFAULT_HOST, DEFAULT_PORT};

#[derive(Parser)]
#[command(name = "todos", about = "Todo tracker backed by SQLite")]
pub struct Cli {
    /// Path to the SQLite database [default: ~/.todos/todos.db]
    #[arg(long, env = "TODOS_DB", global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create database and tables (idempotent)
    Init,

    /// List todos, newest first
    List {
        /// Only todos with this completion state (true/false)
        #[arg(long)]
        completed: Option<bool>,
        /// Only todos whose title or description contains this text
        #[arg(long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Count todos matching a filter
    Count {
        /// Only todos with this completion state (true/false)
        #[arg(long)]
        completed: Option<bool>,
        /// Only todos whose title or description contains this text
        #[arg(long)]
        search: Option<String>,
    },

    /// Show a single todo
    Show {
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a todo
    Add {
        title: String,
        /// Description
        #[arg(short, long)]
        desc: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change fields of a todo; omitted fields are left as they are
    Edit {
        id: String,
        /// New title
        #[arg(short, long)]
        title: Option<String>,
        /// New description
        #[arg(short, long)]
        desc: Option<String>,
        /// New completion state (true/false)
        #[arg(short, long)]
        completed: Option<bool>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a todo
    Rm { id: String },

    /// Flip a todo between open and done
    Toggle {
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}
