mod cli;
mod defaults;
mod paths;
mod report;
mod run;
mod watch;

use anyhow::Result;

fn main() -> Result<()> {
    let args = cli::parse();
    run::run(args)
}
