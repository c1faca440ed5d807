use clap::{Parser, Subcommand};

/// Command-line surface of the `librarian` binary.
#[derive(Parser, Debug)]
#[command(
    name = "librarian",
    about = "Named media libraries, each kept in a single optionally encrypted archive",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; shows the last active library when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a library and print its config and metadata.
    Show {
        /// Library to open. Defaults to the one used last.
        name: Option<String>,
    },
    /// List the known libraries.
    List,
    /// Create a new library and make it active.
    New {
        name: String,
        /// Protect the library with a password (asked interactively).
        #[arg(long)]
        encrypt: bool,
    },
    /// Print a metadata value, or set it when VALUE is given.
    Meta {
        name: String,
        key: String,
        /// JSON value; anything that is not valid JSON is stored as a string.
        value: Option<String>,
    },
    /// Print the display columns, optionally toggling some first.
    Headers {
        name: String,
        /// Column to flip on or off. Repeatable.
        #[arg(long = "toggle", value_name = "COLUMN")]
        toggle: Vec<String>,
    },
    /// Set, change, or remove a library password.
    Passwd {
        name: String,
        /// Store the library unencrypted from now on.
        #[arg(long)]
        remove: bool,
    },
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
