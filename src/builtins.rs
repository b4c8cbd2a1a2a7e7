use std::io::{self, Read, Write};

use crate::dispatch::{self, Dispatch};
use crate::expander;

/// Commands implemented inside the shell process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Cd,
    Pwd,
    Exit,
    Echo,
    Type,
    History,
}

/// The builtin table, consulted once per stage by [`dispatch::resolve`].
const BUILTINS: &[(&str, Builtin)] = &[
    ("cd", Builtin::Cd),
    ("pwd", Builtin::Pwd),
    ("exit", Builtin::Exit),
    ("echo", Builtin::Echo),
    ("type", Builtin::Type),
    ("history", Builtin::History),
];

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        BUILTINS
            .iter()
            .find(|(builtin_name, _)| *builtin_name == name)
            .map(|(_, builtin)| *builtin)
    }

    pub fn name(self) -> &'static str {
        BUILTINS
            .iter()
            .find(|(_, builtin)| *builtin == self)
            .map_or("?", |(name, _)| name)
    }

    /// Builtins that change the shell process itself (working directory,
    /// exiting) and so have no meaning as one stage of a pipeline.
    pub fn mutates_shell(self) -> bool {
        matches!(self, Builtin::Cd | Builtin::Exit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinAction {
    Continue(i32),
    Exit(i32),
}

impl BuiltinAction {
    pub fn status(self) -> i32 {
        match self {
            BuiltinAction::Continue(code) | BuiltinAction::Exit(code) => code,
        }
    }
}

/// Execute a builtin command, writing output to the provided streams.
///
/// `history` is the shell's command history, oldest first. Output is flushed
/// before returning; a failed write or flush turns a successful status into 1.
pub fn execute(
    builtin: Builtin,
    args: &[String],
    _stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    history: &[String],
) -> BuiltinAction {
    let action = match builtin {
        Builtin::Cd => BuiltinAction::Continue(builtin_cd(args, stderr)),
        Builtin::Pwd => BuiltinAction::Continue(builtin_pwd(stdout, stderr)),
        Builtin::Exit => builtin_exit(args, stderr),
        Builtin::Echo => BuiltinAction::Continue(builtin_echo(args, stdout, stderr)),
        Builtin::Type => BuiltinAction::Continue(builtin_type(args, stdout, stderr)),
        Builtin::History => BuiltinAction::Continue(builtin_history(args, stdout, stderr, history)),
    };

    match action {
        BuiltinAction::Continue(0) => {
            BuiltinAction::Continue(output_status(builtin.name(), stdout.flush(), stderr))
        }
        other => other,
    }
}

/// Status of a builtin's output. A reader that went away is not an error;
/// any other write failure is reported on `stderr` and fails the builtin.
fn output_status(name: &str, result: io::Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => 0,
        Err(e) => {
            let _ = writeln!(stderr, "{name}: write error: {e}");
            1
        }
    }
}

fn builtin_cd(args: &[String], stderr: &mut dyn Write) -> i32 {
    let target = match args.first() {
        Some(dir) if dir == "-" => match std::env::var("OLDPWD") {
            Ok(prev) => prev,
            Err(_) => {
                let _ = writeln!(stderr, "cd: OLDPWD not set");
                return 1;
            }
        },
        Some(dir) => dir.clone(),
        None => match expander::home_dir() {
            Some(home) => home,
            None => {
                let _ = writeln!(stderr, "cd: HOME not set");
                return 1;
            }
        },
    };

    let previous = std::env::current_dir().ok();

    if let Err(e) = std::env::set_current_dir(&target) {
        let _ = writeln!(stderr, "cd: {target}: {e}");
        return 1;
    }

    // SAFETY: `cd` is refused inside pipelines, so it only ever runs inline on
    // the main thread while no builtin task is alive. The only other threads
    // at that point drain captured output and never touch the environment.
    if let Some(previous) = previous {
        unsafe { std::env::set_var("OLDPWD", previous) };
    }
    if let Ok(cwd) = std::env::current_dir() {
        unsafe { std::env::set_var("PWD", cwd) };
    }

    0
}

fn builtin_pwd(stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    match std::env::current_dir() {
        Ok(path) => output_status("pwd", writeln!(stdout, "{}", path.display()), stderr),
        Err(e) => {
            let _ = writeln!(stderr, "pwd: {e}");
            1
        }
    }
}

fn builtin_exit(args: &[String], stderr: &mut dyn Write) -> BuiltinAction {
    match args.first() {
        None => BuiltinAction::Exit(0),
        Some(s) => match s.parse::<i32>() {
            Ok(code) => BuiltinAction::Exit(code),
            Err(_) => {
                let _ = writeln!(stderr, "exit: {s}: numeric argument required");
                BuiltinAction::Exit(2)
            }
        },
    }
}

fn builtin_echo(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    output_status("echo", writeln!(stdout, "{}", args.join(" ")), stderr)
}

fn builtin_type(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let mut exit_code = 0;
    for arg in args {
        let written = match dispatch::resolve(arg) {
            Dispatch::Builtin(_) => writeln!(stdout, "{arg} is a shell builtin"),
            Dispatch::External(path) => writeln!(stdout, "{arg} is {}", path.display()),
            Dispatch::NotFound => {
                let _ = writeln!(stderr, "{arg}: not found");
                exit_code = 1;
                continue;
            }
        };
        if written.is_err() {
            return output_status("type", written, stderr);
        }
    }
    exit_code
}

/// List history entries, optionally only the last `n`.
fn builtin_history(
    args: &[String],
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    history: &[String],
) -> i32 {
    let limit = args
        .first()
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(history.len())
        .min(history.len());
    let start = history.len() - limit;

    for (index, entry) in history.iter().enumerate().skip(start) {
        let written = writeln!(stdout, "{:5}  {entry}", index + 1);
        if written.is_err() {
            return output_status("history", written, stderr);
        }
    }
    0
}
