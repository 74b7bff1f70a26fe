use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::Cli;

pub fn handle(shell: Shell) {
    clap_complete::generate(shell, &mut Cli::command(), "orbit", &mut std::io::stdout());
}
