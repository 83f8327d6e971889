use clap::Parser;

/// Process arguments. Supplying both `--port` and `--data-dir` starts the
/// node before the interactive shell comes up; otherwise the shell's
/// `start` command does it.
#[derive(Parser, Debug)]
#[command(name = "guri-chain")]
#[command(about = "A minimal UTXO proof-of-work blockchain node", long_about = None)]
pub struct Opt {
    /// TCP port to listen on for peers
    #[arg(long)]
    pub port: Option<u16>,

    /// Data directory for the block store and node key
    #[arg(long)]
    pub data_dir: Option<String>,
}
