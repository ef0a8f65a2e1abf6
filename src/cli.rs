use std::path::PathBuf;

use clap::Parser;

use crate::launcher::DEFAULT_SHELL;
use crate::watcher::Backend;

/// Run a shell command whenever a file in a directory is closed after writing.
///
/// At most one instance of the command runs at a time. Changes that happen while
/// the command is running are ignored, so a command that writes into the watched
/// directory does not retrigger itself.
#[derive(Parser, Debug)]
#[command(
    name = "watch",
    version,
    about,
    long_about = None,
    override_usage = "watch [-n] [-r] [-p <pattern>] [-d <dir>] cmd [cmd_args...]",
)]
pub struct Cli {
    /// Append the changed file's path as the last argument to cmd.
    #[arg(short = 'n')]
    pub pass_filename: bool,

    /// Watch the directory tree recursively.
    ///
    /// Subdirectories are discovered once at startup; directories created later
    /// are not watched.
    #[arg(short = 'r')]
    pub recursive: bool,

    /// Directory to watch (default: current working directory).
    #[arg(short = 'd', value_name = "dir")]
    pub dir: Option<PathBuf>,

    /// Only trigger for changed paths matching this regular expression.
    ///
    /// The expression is matched anywhere in the path relative to the watched
    /// directory (e.g. "\.go$").
    #[arg(short = 'p', value_name = "pattern")]
    pub pattern: Option<String>,

    /// Change event source to use.
    #[arg(long, value_enum, default_value_t = Backend::Auto)]
    pub backend: Backend,

    /// Shell used to run the command, invoked as `<shell> -c <command>`.
    #[arg(long, value_name = "path", default_value = DEFAULT_SHELL)]
    pub shell: PathBuf,

    /// Command to run through the shell, followed by its arguments.
    #[arg(value_name = "cmd", trailing_var_arg = true, allow_hyphen_values = true)]
    pub cmd: Vec<String>,
}
