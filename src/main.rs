use std::process;

use log::LevelFilter;
use xling_cbow::{Config, Pipeline};

fn main() {
    let params = match Config::from_env() {
        Ok(config) => config.get_params(),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let level = if params.verbose { LevelFilter::Info } else { LevelFilter::Warn };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = Pipeline::run_with(&params) {
        eprintln!("{}", e);
        process::exit(1);
    }
}
