// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments and hand them to the UI layer.
// - The only place that turns an error into a process exit status.

use clap::Parser;
use rest_courier::ui::{exit_code_for, run, Cli};

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(exit_code_for(&err));
    }
}
