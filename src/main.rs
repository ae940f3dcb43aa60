// src/main.rs

use cycleflow::cli;
use cycleflow::logging::init_logging;

fn main() {
    let args = cli::parse();

    if let Err(e) = init_logging(args.log_level) {
        eprintln!("failed to initialise logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = cycleflow::run(args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
