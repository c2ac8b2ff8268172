use std::error::Error;

use clap::Parser;
use condafetch::{
    cli::args::{CliArgs, Command},
    config::CondafetchConfig,
    Condafetch,
};

fn run() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = CliArgs::parse();
    let config = CondafetchConfig::load(&cli_args.config)?;
    log::debug!("Loaded configuration from {}", cli_args.config.display());

    let mut builder = Condafetch::builder()
        .package_location(&cli_args.package_location)
        .install_package_name(&cli_args.name);
    if let Some(conda) = config.conda_executable {
        builder = builder.conda_executable(conda);
    }
    if let Some(python) = config.python_executable {
        builder = builder.python_executable(python);
    }
    if let Some(workers) = config.workers {
        builder = builder.workers(workers);
    }

    match cli_args.cmd {
        Command::Bundle {
            input,
            compress,
            fail_if_exists,
            preamble,
            preamble_file,
        } => {
            let preamble = match (preamble, preamble_file) {
                (Some(text), _) => Some(text),
                (None, Some(path)) => Some(std::fs::read_to_string(path)?),
                (None, None) => None,
            };
            let condafetch = builder
                .compress(compress)
                .exist_ok(!fail_if_exists)
                .script_preamble(preamble)
                .try_build()?;

            let bundle = condafetch.bundle(&input.into_source()?)?;
            match &bundle.archive {
                Some(archive) => log::info!("Wrote {}", archive.display()),
                None => log::info!("Wrote {}", bundle.root.display()),
            }
        }
        Command::Resolve { input } => {
            let condafetch = builder.try_build()?;
            let resolved = condafetch.resolve(&input.into_source()?)?;
            for package in resolved.packages() {
                println!("{}  {}", package.url, package.file_name);
            }
        }
        Command::Clean => builder.try_build()?.clean()?,
    }

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
