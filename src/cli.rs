use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::models::Theme;

#[derive(Parser, Debug)]
#[clap(
    name = "bunkai",
    version,
    about = "Read one EPUB at a time, picking up where you left off.",
    long_about = None
)]
pub struct Cli {
    /// Use a specific configuration file
    #[clap(short = 'c', long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Use a specific database file
    #[clap(long, value_name = "FILE", global = true)]
    pub db: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[clap(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Enable debug output
    #[clap(long, global = true)]
    pub debug: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store an EPUB as the current book and open it
    Open {
        #[clap(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the table of contents
    Toc,
    /// Show a chapter (the last one read if omitted)
    Read {
        #[clap(value_name = "HREF")]
        href: Option<String>,
    },
    /// Go to the next chapter
    Next,
    /// Go to the previous chapter
    Prev,
    /// Show or change reading preferences
    Settings {
        #[clap(long)]
        theme: Option<Theme>,
        #[clap(long)]
        font_size: Option<u16>,
        #[clap(long)]
        font_family: Option<String>,
        #[clap(long)]
        line_height: Option<f32>,
    },
    /// Forget the current book and reading position
    Clear,
}
