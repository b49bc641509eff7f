use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Sequential scanner for the Boston parking-violation lookup API")]
pub struct Cli {
    #[clap(long)]
    /// Start scanning from this violation number, ignoring the persisted cursor
    pub start_id: Option<u64>,

    #[clap(long)]
    /// Override the number of violation numbers scanned this invocation
    pub chunk_size: Option<u64>,

    #[clap(long)]
    /// Directory holding the cursor state and the seen-VID set
    pub state_dir: Option<PathBuf>,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
