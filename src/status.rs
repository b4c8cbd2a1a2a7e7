pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
/// Found but could not be executed.
pub const NOT_EXECUTABLE: i32 = 126;
pub const NOT_FOUND: i32 = 127;

/// Status of a stage terminated by Ctrl-C.
#[cfg(unix)]
pub const INTERRUPTED: i32 = 128 + libc::SIGINT;
#[cfg(not(unix))]
pub const INTERRUPTED: i32 = 130;

/// Convert an OS process status into shell-style exit code semantics.
///
/// On Unix, processes terminated by signal map to `128 + signal`.
pub fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    FAILURE
}
