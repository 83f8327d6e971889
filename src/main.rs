use clap::Parser;
use guri_chain::cli::{Opt, Shell};
use log::LevelFilter;
use std::process;

fn main() {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = run() {
        eprintln!("Fatal: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::parse();
    let mut shell = Shell::new();

    if let (Some(port), Some(data_dir)) = (opt.port, opt.data_dir.as_deref()) {
        shell.start_node(port, data_dir)?;
    }

    shell.run()?;
    Ok(())
}
