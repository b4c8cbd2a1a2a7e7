use std::io::{self, Write};
use std::process;

use anyhow::Context;
use clap::Parser;
use crossterm::tty::IsTty;

use pipesh::cli::Cli;
use pipesh::evaluator::{self, ShellState};
use pipesh::parser;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    // Ctrl-C interrupts the running pipeline's children, not the shell
    ctrlc::set_handler(|| {
        println!();
        let _ = io::stdout().flush();
    })
    .context("failed to set Ctrl-C handler")?;

    let mut state = ShellState::default();

    if let Some(command) = cli.command {
        state.history.push(command.clone());
        let outcome = evaluator::run(&command, &mut state);
        process::exit(outcome.status);
    }

    let code = repl(&cli.prompt, &mut state)?;
    process::exit(code);
}

fn repl(prompt: &str, state: &mut ShellState) -> anyhow::Result<i32> {
    let stdin = io::stdin();
    let interactive = stdin.is_tty();

    loop {
        show_prompt(interactive, prompt)?;
        let Some(mut input) = read_line(&stdin)? else {
            break;
        };

        // An open quote continues the command on the next line
        while parser::is_incomplete(&input) {
            show_prompt(interactive, "> ")?;
            match read_line(&stdin)? {
                Some(more) => {
                    input.push('\n');
                    input.push_str(&more);
                }
                None => break,
            }
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        state.history.push(input.to_string());
        let outcome = evaluator::run(input, state);
        log::debug!("line finished with status {}", outcome.status);
        if outcome.should_exit {
            return Ok(outcome.status);
        }
    }

    if interactive {
        println!("\nGoodbye!");
    }
    Ok(state.last_status)
}

fn show_prompt(interactive: bool, prompt: &str) -> io::Result<()> {
    if interactive {
        print!("{prompt}");
        io::stdout().flush()?;
    }
    Ok(())
}

/// Read one line without its terminator; `None` at end of input.
fn read_line(stdin: &io::Stdin) -> anyhow::Result<Option<String>> {
    let mut line = String::new();
    let read = stdin.read_line(&mut line).context("error reading input")?;
    if read == 0 {
        return Ok(None);
    }
    let len = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(len);
    Ok(Some(line))
}
