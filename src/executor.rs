use std::fs::File;
use std::io::{self, Read, Write};
use std::iter;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};

use os_pipe::{PipeReader, PipeWriter};

use crate::ast::{Pipeline, RedirectSpec, Stage};
use crate::builtins::{self, Builtin, BuiltinAction};
use crate::dispatch::{self, Dispatch};
use crate::error::ExecError;
use crate::redirect;
use crate::status;

/// Result of running one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Execution {
    /// Status of the last stage.
    pub status: i32,
    /// A single-stage `exit` asked the shell to stop.
    pub exit_requested: bool,
}

/// Result of a pipeline whose final output was collected instead of printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// What happens to the last stage's unredirected output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Inherit,
    Capture,
}

/// Where a stage reads from.
enum Source {
    Inherit,
    Pipe(PipeReader),
}

impl Source {
    fn into_stdio(self) -> Stdio {
        match self {
            Source::Inherit => Stdio::inherit(),
            Source::Pipe(reader) => reader.into(),
        }
    }

    fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            Source::Inherit => Box::new(io::stdin()),
            Source::Pipe(reader) => Box::new(reader),
        }
    }
}

#[derive(Clone, Copy)]
enum StdStream {
    Stdout,
    Stderr,
}

/// Where a stage writes one of its output streams.
enum Sink {
    Inherit,
    Pipe(PipeWriter),
    File(File),
}

impl Sink {
    fn into_stdio(self) -> Stdio {
        match self {
            Sink::Inherit => Stdio::inherit(),
            Sink::Pipe(writer) => writer.into(),
            Sink::File(file) => file.into(),
        }
    }

    fn into_writer(self, stream: StdStream) -> Box<dyn Write + Send> {
        match (self, stream) {
            (Sink::Inherit, StdStream::Stdout) => Box::new(io::stdout()),
            (Sink::Inherit, StdStream::Stderr) => Box::new(io::stderr()),
            (Sink::Pipe(writer), _) => Box::new(writer),
            (Sink::File(file), _) => Box::new(file),
        }
    }
}

/// The streams a stage owns once it starts.
struct StageIo {
    stdin: Source,
    stdout: Sink,
    stderr: Sink,
}

/// Everything decided about a stage before any stage starts.
struct StagePlan<'a> {
    stage: &'a Stage,
    /// `None` for a stage with no command.
    dispatch: Option<Dispatch>,
    stdout_file: Option<File>,
    stderr_file: Option<File>,
    /// The stage must not run; this is its status.
    settled: Option<i32>,
}

/// Run a pipeline with its output going to the shell's own stdout/stderr.
pub fn execute(pipeline: &Pipeline, history: &[String]) -> Execution {
    run(pipeline, history, Output::Inherit).0
}

/// Run a pipeline, collecting the last stage's stdout and stderr unless they
/// are redirected to files.
pub fn execute_captured(pipeline: &Pipeline, history: &[String]) -> Captured {
    let (execution, stdout, stderr) = run(pipeline, history, Output::Capture);
    Captured {
        status: execution.status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }
}

fn run(pipeline: &Pipeline, history: &[String], output: Output) -> (Execution, Vec<u8>, Vec<u8>) {
    match try_run(pipeline, history, output) {
        Ok(result) => result,
        Err(err) => {
            err.report();
            let execution = Execution {
                status: err.status(),
                exit_requested: false,
            };
            (execution, Vec::new(), Vec::new())
        }
    }
}

/// Reject pipelines containing builtins that only make sense in the shell process.
fn check_pipeline_policy(pipeline: &Pipeline, dispatches: &[Option<Dispatch>]) -> Result<(), ExecError> {
    if pipeline.len() < 2 {
        return Ok(());
    }
    for dispatch in dispatches.iter().flatten() {
        if let Dispatch::Builtin(builtin) = dispatch
            && builtin.mutates_shell()
        {
            return Err(ExecError::PipelineBuiltin(builtin.name().to_string()));
        }
    }
    Ok(())
}

/// Prime a stage's redirect targets. With `bind`, the active targets are
/// opened and returned; otherwise they are only created.
fn open_targets(stage: &Stage, bind: bool) -> Result<(Option<File>, Option<File>), ExecError> {
    let (stdout, stderr) =
        redirect::prepare_redirect_targets(&stage.stdout_redirects, &stage.stderr_redirects)?;

    if !bind {
        for spec in stdout.into_iter().chain(stderr) {
            spec.touch()?;
        }
        return Ok((None, None));
    }

    let stdout = stdout.map(RedirectSpec::open).transpose()?;
    let stderr = stderr.map(RedirectSpec::open).transpose()?;
    Ok((stdout, stderr))
}

/// Collect everything written to `reader` on a helper thread.
fn drain(mut reader: PipeReader) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf) {
            log::error!("failed to read captured output: {e}");
        }
        buf
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .map(|handle| handle.join().unwrap_or_default())
        .unwrap_or_default()
}

/// The last stage's sink for one stream: its redirect file, a capture pipe,
/// or the shell's own stream.
fn final_sink(
    file: Option<File>,
    output: Output,
    drains: &mut Option<JoinHandle<Vec<u8>>>,
) -> Result<Sink, ExecError> {
    if let Some(file) = file {
        return Ok(Sink::File(file));
    }
    match output {
        Output::Inherit => Ok(Sink::Inherit),
        Output::Capture => {
            let (reader, writer) = os_pipe::pipe().map_err(ExecError::Pipe)?;
            *drains = Some(drain(reader));
            Ok(Sink::Pipe(writer))
        }
    }
}

fn try_run(
    pipeline: &Pipeline,
    history: &[String],
    output: Output,
) -> Result<(Execution, Vec<u8>, Vec<u8>), ExecError> {
    let dispatches: Vec<Option<Dispatch>> = pipeline
        .stages
        .iter()
        .map(|stage| (!stage.is_empty()).then(|| dispatch::resolve(&stage.command)))
        .collect();

    // Policy errors abort before anything is touched
    check_pipeline_policy(pipeline, &dispatches)?;

    let count = pipeline.len();
    let last = count - 1;

    // Redirect targets are all resolved synchronously, before any stage starts
    let mut plans: Vec<StagePlan> = Vec::with_capacity(count);
    for (index, (stage, dispatch)) in pipeline.stages.iter().zip(dispatches).enumerate() {
        let bind = index == last && dispatch.is_some();
        let (stdout_file, stderr_file, mut settled) = match open_targets(stage, bind) {
            Ok((stdout, stderr)) => (stdout, stderr, None),
            Err(err) => {
                err.report();
                (None, None, Some(err.status()))
            }
        };
        // A stage with no command (`> file`) only creates its targets, but
        // keeps its place in the pipe chain
        if dispatch.is_none() {
            settled = settled.or(Some(status::SUCCESS));
        }
        plans.push(StagePlan {
            stage,
            dispatch,
            stdout_file,
            stderr_file,
            settled,
        });
    }

    if pipeline.is_empty() {
        return Ok((Execution::default(), Vec::new(), Vec::new()));
    }
    log::debug!("running pipeline of {count} stage(s)");

    let mut pipes = Vec::with_capacity(last);
    for _ in 0..last {
        pipes.push(os_pipe::pipe().map_err(ExecError::Pipe)?);
    }
    let (readers, writers): (Vec<PipeReader>, Vec<PipeWriter>) = pipes.into_iter().unzip();

    let mut stdout_drain = None;
    let mut stderr_drain = None;
    let last_plan = &mut plans[last];
    let last_stdout = final_sink(last_plan.stdout_file.take(), output, &mut stdout_drain)?;
    let mut last_stderr = final_sink(last_plan.stderr_file.take(), output, &mut stderr_drain)?;

    // Every pipe end is yielded to exactly one stage. Ends a stage never
    // starts with are dropped with its `StageIo`.
    let stdins = iter::once(Source::Inherit).chain(readers.into_iter().map(Source::Pipe));
    let stdouts = writers.into_iter().map(Sink::Pipe).chain(iter::once(last_stdout));

    let mut statuses: Vec<Option<i32>> = vec![None; count];
    let mut tasks: Vec<(usize, JoinHandle<i32>)> = Vec::new();
    let mut children: Vec<(usize, Child)> = Vec::new();
    let mut exit_requested = false;

    for (index, ((plan, stdin), stdout)) in plans.into_iter().zip(stdins).zip(stdouts).enumerate() {
        let stderr = if index == last {
            std::mem::replace(&mut last_stderr, Sink::Inherit)
        } else {
            Sink::Inherit
        };
        let io = StageIo {
            stdin,
            stdout,
            stderr,
        };
        let stage = plan.stage;

        if let Some(code) = plan.settled {
            statuses[index] = Some(code);
            continue;
        }
        let Some(dispatch) = plan.dispatch else {
            continue;
        };

        match dispatch {
            Dispatch::NotFound => {
                let err = ExecError::NotFound(stage.command.clone());
                err.report();
                statuses[index] = Some(err.status());
            }
            Dispatch::Builtin(builtin) if pipeline.is_simple() => {
                let action = run_builtin(builtin, &stage.args, io, history);
                exit_requested = matches!(action, BuiltinAction::Exit(_));
                statuses[index] = Some(action.status());
            }
            Dispatch::Builtin(builtin) => match spawn_builtin(builtin, stage, io, history) {
                Ok(task) => tasks.push((index, task)),
                Err(err) => {
                    err.report();
                    statuses[index] = Some(err.status());
                }
            },
            Dispatch::External(path) => match spawn_external(&path, stage, io) {
                Ok(child) => children.push((index, child)),
                Err(err) => {
                    err.report();
                    statuses[index] = Some(err.status());
                }
            },
        }
    }

    // Builtin tasks first: a subprocess downstream of a builtin only sees
    // end-of-input once the task has dropped its pipe writer.
    for (index, task) in tasks {
        let code = task.join().unwrap_or_else(|_| {
            log::error!("builtin task for stage {index} panicked");
            status::FAILURE
        });
        statuses[index] = Some(code);
    }

    for (index, mut child) in children {
        let code = match child.wait() {
            Ok(exit) => status::exit_code(exit),
            Err(e) => {
                log::error!("failed to wait for stage {index} (pid {}): {e}", child.id());
                status::FAILURE
            }
        };
        statuses[index] = Some(code);
    }

    let stdout = join_drain(stdout_drain);
    let stderr = join_drain(stderr_drain);

    let execution = Execution {
        status: statuses[last].unwrap_or(status::SUCCESS),
        exit_requested,
    };
    log::debug!("pipeline finished with status {}", execution.status);
    Ok((execution, stdout, stderr))
}

/// Run a builtin to completion on the current thread. Its streams are closed
/// when this returns.
fn run_builtin(builtin: Builtin, args: &[String], io: StageIo, history: &[String]) -> BuiltinAction {
    let mut stdin = io.stdin.into_reader();
    let mut stdout = io.stdout.into_writer(StdStream::Stdout);
    let mut stderr = io.stderr.into_writer(StdStream::Stderr);

    let action = builtins::execute(builtin, args, &mut *stdin, &mut *stdout, &mut *stderr, history);

    // Nowhere left to report a failing stderr
    let _ = stderr.flush();
    action
}

/// Start a builtin stage on its own thread, which takes ownership of its streams.
fn spawn_builtin(
    builtin: Builtin,
    stage: &Stage,
    io: StageIo,
    history: &[String],
) -> Result<JoinHandle<i32>, ExecError> {
    let args = stage.args.clone();
    let history = if builtin == Builtin::History {
        history.to_vec()
    } else {
        Vec::new()
    };

    let task = thread::Builder::new()
        .name(format!("builtin-{}", builtin.name()))
        .spawn(move || run_builtin(builtin, &args, io, &history).status())
        .map_err(|source| ExecError::Spawn {
            command: stage.command.clone(),
            source,
        })?;
    log::trace!("started builtin task for {}", builtin.name());
    Ok(task)
}

/// Spawn an external stage. The parent's copies of the stage's descriptors
/// are closed before this returns, so only the child holds them.
fn spawn_external(path: &Path, stage: &Stage, io: StageIo) -> Result<Child, ExecError> {
    let mut command = Command::new(path);
    command
        .args(&stage.args)
        .stdin(io.stdin.into_stdio())
        .stdout(io.stdout.into_stdio())
        .stderr(io.stderr.into_stdio());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.arg0(&stage.command);
    }

    let child = command
        .spawn()
        .map_err(|err| ExecError::from_spawn(&stage.command, err))?;
    log::debug!("spawned {} (pid {})", path.display(), child.id());

    // `command` owns the parent's copies of the stage's descriptors
    drop(command);
    Ok(child)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipeline::build_pipeline;

    fn capture(line: &str) -> Captured {
        execute_captured(&build_pipeline(line), &[])
    }

    fn run_line(line: &str) -> Execution {
        execute(&build_pipeline(line), &[])
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn builtin_into_external() {
        let out = capture("echo hi | grep h");
        assert_eq!(out.stdout, "hi\n");
        assert_eq!(out.status, 0);
    }

    #[test]
    fn no_match_is_reported_by_the_last_stage() {
        let out = capture("echo hi | grep x");
        assert_eq!(out.stdout, "");
        assert_eq!(out.status, 1);
    }

    #[test]
    fn status_comes_from_the_last_stage() {
        assert_eq!(run_line("false | true").status, 0);
        assert_ne!(run_line("true | false").status, 0);
    }

    #[test]
    fn three_stages_into_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let line = format!("printf 'b\\na\\nc\\n' | sort | tr a-z A-Z > {}", out.display());
        assert_eq!(run_line(&line).status, 0);

        let direct = capture("printf 'b\\na\\nc\\n' | sort");
        assert_eq!(read(&out), direct.stdout.to_uppercase());
        assert_eq!(read(&out), "A\nB\nC\n");
    }

    #[test]
    fn builtin_in_the_middle() {
        let out = capture("printf 'ignored\\n' | echo mid | cat");
        assert_eq!(out.stdout, "mid\n");
        assert_eq!(out.status, 0);
    }

    #[test]
    fn builtin_as_last_stage() {
        let out = capture("printf 'x' | echo done");
        assert_eq!(out.stdout, "done\n");
        assert_eq!(out.status, 0);
    }

    #[test]
    fn long_chain_of_pipes() {
        let out = capture("echo hi | cat | cat | cat | cat | cat | cat");
        assert_eq!(out.stdout, "hi\n");
    }

    #[test]
    fn builtin_output_larger_than_a_pipe_buffer() {
        let history: Vec<String> = (0..20_000).map(|i| format!("command number {i}")).collect();
        let out = execute_captured(&build_pipeline("history | wc -l"), &history);
        assert_eq!(out.stdout.trim(), "20000");
        assert_eq!(out.status, 0);
    }

    #[test]
    fn missing_command_does_not_cancel_siblings() {
        let out = capture("definitely-not-a-command-pipesh | echo still");
        assert_eq!(out.stdout, "still\n");
        assert_eq!(out.status, 0);
    }

    #[test]
    fn missing_last_stage_is_127() {
        assert_eq!(capture("echo hi | definitely-not-a-command-pipesh").status, 127);
        assert_eq!(run_line("definitely-not-a-command-pipesh").status, 127);
    }

    #[test]
    fn unexecutable_file_is_126() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("script");
        std::fs::write(&script, "#!/bin/sh\necho nope\n").unwrap();

        assert_eq!(run_line(&script.display().to_string()).status, 126);
    }

    #[test]
    fn interrupted_stage_is_130() {
        let out = capture("sh -c 'kill -INT $$'");
        assert_eq!(out.status, status::INTERRUPTED);
    }

    #[test]
    fn cd_in_a_pipeline_is_rejected() {
        let before = std::env::current_dir().unwrap();
        let execution = run_line("echo x | cd / | cat");
        assert_eq!(execution.status, 1);
        assert!(!execution.exit_requested);
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn rejected_pipeline_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("never");

        let execution = run_line(&format!("echo hi > {} | exit", target.display()));
        assert_eq!(execution.status, 1);
        assert!(!execution.exit_requested);
        assert!(!target.exists());
    }

    #[test]
    fn exit_as_a_simple_command() {
        assert_eq!(
            run_line("exit 4"),
            Execution {
                status: 4,
                exit_requested: true
            }
        );
    }

    #[test]
    fn only_the_last_target_receives_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name);
        std::fs::write(path("a"), "stale").unwrap();

        let line = format!(
            "echo hi > {} >> {} > {}",
            path("a").display(),
            path("b").display(),
            path("c").display()
        );
        assert_eq!(run_line(&line).status, 0);

        assert_eq!(read(&path("a")), "");
        assert_eq!(read(&path("b")), "");
        assert_eq!(read(&path("c")), "hi\n");
    }

    #[test]
    fn append_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("log");

        run_line(&format!("echo one > {}", file.display()));
        run_line(&format!("printf 'two\\n' >> {}", file.display()));
        assert_eq!(read(&file), "one\ntwo\n");
    }

    #[test]
    fn last_stage_stderr_can_be_redirected() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let err = dir.path().join("err");

        let line = format!(
            "echo x | sh -c 'cat; echo oops >&2' > {} 2> {}",
            out.display(),
            err.display()
        );
        assert_eq!(run_line(&line).status, 0);
        assert_eq!(read(&out), "x\n");
        assert_eq!(read(&err), "oops\n");
    }

    #[test]
    fn earlier_stage_targets_are_created_but_not_bound() {
        let dir = tempfile::tempdir().unwrap();
        let side = dir.path().join("side");
        let err = dir.path().join("err");

        let line = format!(
            "printf 'data\\n' > {} 2> {} | cat",
            side.display(),
            err.display()
        );
        let out = capture(&line);
        assert_eq!(out.stdout, "data\n");
        assert_eq!(read(&side), "");
        assert_eq!(read(&err), "");
    }

    #[test]
    fn unopenable_target_skips_the_stage() {
        let out = capture("echo hi > /nonexistent-dir-for-pipesh/f");
        assert_eq!(out.status, 1);
        assert_eq!(out.stdout, "");

        let out = capture("echo hi | cat > /nonexistent-dir-for-pipesh/f");
        assert_eq!(out.status, 1);
    }

    #[test]
    fn captured_stderr_and_status() {
        let out = capture("sh -c 'echo bad >&2; exit 3'");
        assert_eq!(out.status, 3);
        assert_eq!(out.stdout, "");
        assert_eq!(out.stderr, "bad\n");
    }

    #[test]
    fn redirected_output_is_not_captured() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        let out = capture(&format!("echo hi > {}", file.display()));
        assert_eq!(out.stdout, "");
        assert_eq!(read(&file), "hi\n");
    }

    #[test]
    fn empty_pipeline_is_a_no_op() {
        assert_eq!(run_line(""), Execution::default());
        assert_eq!(run_line("  |  "), Execution::default());
    }

    #[test]
    fn cd_beside_a_redirect_only_stage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f");
        let before = std::env::current_dir().unwrap();

        let execution = run_line(&format!("cd {} | > {}", dir.path().display(), target.display()));
        assert_eq!(execution.status, 1);
        assert_eq!(std::env::current_dir().unwrap(), before);
        assert!(!target.exists());
    }

    #[test]
    fn redirect_only_last_stage_swallows_the_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f");

        let out = capture(&format!("echo leaked | > {}", target.display()));
        assert_eq!(out.stdout, "");
        assert_eq!(out.status, 0);
        assert_eq!(read(&target), "");
    }

    #[test]
    fn redirect_only_middle_stage_breaks_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f");

        let out = capture(&format!("echo a | > {} | cat", target.display()));
        assert_eq!(out.stdout, "");
        assert_eq!(out.status, 0);
        assert!(target.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn builtin_write_failure_is_reported() {
        let out = capture("echo hi > /dev/full");
        assert_eq!(out.status, 1);
        assert!(out.stderr.contains("echo: write error"), "stderr was: {}", out.stderr);
    }

    #[test]
    fn redirect_alone_creates_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("created");
        assert_eq!(run_line(&format!("> {}", file.display())).status, 0);
        assert!(file.exists());
    }

    #[test]
    fn argv0_is_the_typed_name() {
        let out = capture("sh -c 'echo $0'");
        assert_eq!(out.stdout, "sh\n");
    }
}
