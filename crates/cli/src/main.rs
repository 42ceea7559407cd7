use clap::Parser;
use psp_cli::{
	cli::Cli,
	commands,
	error::CliError,
	logging,
	output::{self, CommandResult},
};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let command = cli.command.name();
	match commands::dispatch(cli).await {
		Ok(data) => output::print_result(&CommandResult::success(command, data)),
		Err(err) => {
			handle_error(command, err);
			std::process::exit(1);
		}
	}
}

fn handle_error(command: &str, err: CliError) {
	let cmd_error = err.to_command_error();

	// Humans read stderr, agents read the envelope on stdout
	output::print_error_stderr(&cmd_error);
	output::print_result(&CommandResult::<()>::failure(command, cmd_error));
}
