use anyhow::Result;
use codescribe::{cli::parse_args, run_codescribe};
use log::LevelFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = parse_args()?;
    init_logger(config.verbosity, config.quiet);
    run_codescribe(config).await
}

/// `RUST_LOG` wins unless `-v` or `-q` was given.
fn init_logger(verbosity: u8, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if quiet {
        builder.filter_level(LevelFilter::Off);
    } else if verbosity > 0 {
        builder.filter_level(match verbosity {
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        });
    }
    builder
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();
}
