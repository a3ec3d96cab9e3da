//! Command assembly and action preconditions.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::flags::FlagMap;

/// An ordered, immutable token sequence: program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    tokens: Vec<String>,
}

impl Command {
    pub fn builder(program: impl Into<String>) -> CommandBuilder {
        CommandBuilder {
            tokens: vec![program.into()],
        }
    }

    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    pub fn args(&self) -> &[String] {
        &self.tokens[1..]
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether `needle` appears as a contiguous run of tokens.
    pub fn contains_sequence<S: AsRef<str>>(&self, needle: &[S]) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.tokens.windows(needle.len()).any(|window| {
            window
                .iter()
                .zip(needle)
                .all(|(token, expected)| token == expected.as_ref())
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_words::join(&self.tokens))
    }
}

/// Appends tokens in the canonical order: fixed subcommand tokens, then
/// positionals, then translated flags, then any extras.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    tokens: Vec<String>,
}

impl CommandBuilder {
    pub fn fixed<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
        self
    }

    pub fn positional(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self
    }

    pub fn flags(mut self, flags: &FlagMap) -> Self {
        self.tokens.extend(flags.to_args());
        self
    }

    pub fn args<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fixed(tokens)
    }

    pub fn build(self) -> Command {
        Command {
            tokens: self.tokens,
        }
    }
}

/// `[tool_path] + fixed + positional + translate(flags)`.
pub fn assemble<S: AsRef<str>>(
    tool_path: &Path,
    fixed: &[S],
    positional: &[S],
    flags: &FlagMap,
) -> Command {
    Command::builder(tool_path.to_string_lossy())
        .fixed(fixed.iter().map(|token| token.as_ref().to_string()))
        .fixed(positional.iter().map(|token| token.as_ref().to_string()))
        .flags(flags)
        .build()
}

/// Fail with [`Error::InvalidDirectory`] unless `path` is an existing
/// directory.
pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::InvalidDirectory {
            path: path.to_path_buf(),
            reason: "directory does not exist".to_string(),
        });
    }
    if !path.is_dir() {
        return Err(Error::InvalidDirectory {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    Ok(())
}

/// Fail with [`Error::InvalidConfiguration`] unless `path` exists.
pub fn ensure_exists(path: &Path, what: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(format!(
            "{what} {} does not exist",
            path.display()
        )))
    }
}

/// The external tool an invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Gcloud,
    DevAppServer,
    AppCfg,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Gcloud => f.write_str("gcloud"),
            Tool::DevAppServer => f.write_str("dev_appserver"),
            Tool::AppCfg => f.write_str("appcfg"),
        }
    }
}

/// A fully assembled command plus where and how to run it.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub tool: Tool,
    pub command: Command,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl Invocation {
    pub fn new(tool: Tool, command: Command) -> Self {
        Self {
            tool,
            command,
            working_dir: None,
            env: HashMap::new(),
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, env: &HashMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(key, value)| (key.clone(), value.clone())));
        self
    }
}
