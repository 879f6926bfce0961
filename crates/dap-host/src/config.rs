//! Launch configuration for debug adapter processes.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// How to start a debug adapter.
///
/// Field names follow the camel-case keys used by launch configurations, so
/// a `debuggers` entry can be deserialised directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterLaunch {
    /// The adapter program, or the script a runtime should run.
    pub program: String,
    /// Arguments passed after the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Interpreter that hosts `program`, e.g. `node`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Arguments for the runtime, placed before `program`.
    #[serde(default)]
    pub runtime_args: Vec<String>,
}

impl AdapterLaunch {
    /// Launches `program` directly.
    #[must_use]
    pub fn program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Sets the program arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Runs `program` under `runtime` with the given runtime arguments.
    #[must_use]
    pub fn with_runtime<I, S>(mut self, runtime: impl Into<String>, runtime_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runtime = Some(runtime.into());
        self.runtime_args = runtime_args.into_iter().map(Into::into).collect();
        self
    }

    /// Resolves the executable and argument vector to spawn.
    ///
    /// With a runtime, the runtime is executed with
    /// `runtime_args ++ [program] ++ args`; otherwise `program` is executed
    /// with `args`.
    #[must_use]
    pub fn command_line(&self) -> CommandLine {
        match &self.runtime {
            Some(runtime) => CommandLine {
                executable: runtime.into(),
                args: self
                    .runtime_args
                    .iter()
                    .chain(std::iter::once(&self.program))
                    .chain(&self.args)
                    .map(OsString::from)
                    .collect(),
            },
            None => CommandLine {
                executable: self.program.as_str().into(),
                args: self.args.iter().map(OsString::from).collect(),
            },
        }
    }
}

/// A resolved executable and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// The program handed to the OS.
    pub executable: OsString,
    /// Its arguments, in order.
    pub args: Vec<OsString>,
}

/// Where and how to launch an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Adapter command configuration.
    pub launch: AdapterLaunch,
    /// Working directory for the adapter process.
    pub working_dir: Utf8PathBuf,
}

impl LaunchSpec {
    /// Pairs a launch configuration with its working directory.
    #[must_use]
    pub fn new(launch: AdapterLaunch, working_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            launch,
            working_dir: working_dir.into(),
        }
    }

    /// Working directory for the adapter process.
    #[must_use]
    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }
}
