use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use regex::Regex;

use crate::cli::Cli;
use crate::launcher::CommandSpec;
use crate::watcher::Backend;

/// Settings for one `watch` run, built once from the command line.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Absolute path of the watched directory.
    pub dir: PathBuf,
    pub recursive: bool,
    /// Append the changed file's absolute path to the command.
    pub pass_filename: bool,
    /// Only changed paths matching this expression trigger the command.
    pub pattern: Option<Regex>,
    /// Command template, run through `<shell> -c`.
    pub command: String,
    pub shell: PathBuf,
    pub backend: Backend,
}

impl WatchConfig {
    /// Build the configuration from parsed arguments.
    ///
    /// Resolves the watched directory (the current directory when `-d` is absent)
    /// to an absolute path and compiles the filter pattern. Whether the directory
    /// exists is checked later, when the watches are registered.
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let dir = match cli.dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("cannot determine the current directory")?,
        };
        let dir = std::path::absolute(&dir)
            .map(|dir| normalize(&dir))
            .with_context(|| format!("cannot resolve directory {}", dir.display()))?;

        let pattern = match cli.pattern {
            Some(pattern) => Some(
                Regex::new(&pattern).with_context(|| format!("invalid pattern {pattern:?}"))?,
            ),
            None => None,
        };

        Ok(Self {
            dir,
            recursive: cli.recursive,
            pass_filename: cli.pass_filename,
            pattern,
            command: cli.cmd.join(" "),
            shell: cli.shell,
            backend: cli.backend,
        })
    }

    /// Build the command to run for a change to `path` (relative to `dir`).
    pub fn command_for(&self, path: &Path) -> CommandSpec {
        if !self.pass_filename {
            return CommandSpec::new(self.command.clone());
        }
        let full = self.dir.join(path);
        let full = full.to_string_lossy();
        CommandSpec::new(format!("{} {}", self.command, shell_quote(&full)))
    }
}

/// Resolve `.` and `..` components without touching the filesystem, so
/// `/tmp/../proj` becomes `/proj`. Symbolic links are not followed.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else if !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Quote `arg` for `/bin/sh` unless it is made only of characters the shell
/// passes through untouched.
fn shell_quote(arg: &str) -> Cow<'_, str> {
    let plain = !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"/._-+,:@%=".contains(&b));
    if plain {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}
