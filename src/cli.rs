use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bookfetch", version)]
#[command(about = "Borrow books from an online lending library and save them as PDF or JPEG", long_about = None)]
pub struct Cli {
    /// Increase log detail (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download one or more books
    Download(DownloadArgs),
}

#[derive(Args, Debug)]
#[command(group(
    clap::ArgGroup::new("books")
        .required(true)
        .multiple(true)
        .args(["urls", "file"])
))]
pub struct DownloadArgs {
    /// Account email (falls back to BOOKFETCH_EMAIL)
    #[arg(short, long)]
    pub email: Option<String>,

    /// Account password (falls back to BOOKFETCH_PASSWORD)
    #[arg(short, long)]
    pub password: Option<String>,

    /// Book address (<base_url>/details/<id>), repeat for several books
    #[arg(short = 'u', long = "url", value_name = "URL")]
    pub urls: Vec<String>,

    /// File with one book address per line
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Existing output directory [default: current directory]
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Image resolution from 0 (highest) to 10 [default: 3]
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub resolution: Option<u8>,

    /// Pages downloaded in parallel [default: 50]
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Save individual JPEG files instead of a PDF
    #[arg(short, long)]
    pub jpg: bool,

    /// Also save the book metadata as metadata.json
    #[arg(short, long, requires = "jpg")]
    pub meta: bool,

    /// Configuration file [default: config/bookfetch.toml]
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
