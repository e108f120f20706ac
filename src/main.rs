//! Bubblewrap Sandbox - Entry Point
//!
//! Command-line front-end for building and running sandboxed commands.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args as ClapArgs, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde_json::{Map, Value};
use tracing::{Level, debug, error, info};
use tracing_subscriber::{EnvFilter, fmt};

use bwrap_sandbox::error::{Error, ExecutionError};
use bwrap_sandbox::process::ProcessControl;
use bwrap_sandbox::sandbox::timeout_from_secs;
use bwrap_sandbox::{BubblewrapSandbox, RawBind, RunRequest, SandboxConfig};

/// Bubblewrap Sandbox - Run commands under bwrap with validated arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file (keys: binary, base_args, read_only_binds, write_binds)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the helper argv, one token per line, without running it
    Argv {
        #[command(flatten)]
        binds: BindArgs,

        /// Command to run inside the sandbox
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Run a command inside the sandbox and print its output
    Run {
        #[command(flatten)]
        binds: BindArgs,

        /// Working directory for the helper process
        #[arg(long)]
        chdir: Option<String>,

        /// Environment variable for the helper process (KEY=VALUE)
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        env: Vec<(String, String)>,

        /// Seconds before the process is killed (0 disables the timeout)
        #[arg(long, default_value_t = 60.0)]
        timeout: f64,

        /// Run option (KEY=JSON), e.g. `-o expose_environment=true`
        #[arg(short = 'o', long = "option", value_name = "KEY=JSON", value_parser = parse_key_value)]
        options: Vec<(String, String)>,

        /// Print the captured environment after the run (requires expose_environment)
        #[arg(long)]
        print_env: bool,

        /// Command to run inside the sandbox
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(ClapArgs, Debug)]
struct BindArgs {
    /// Read-only bind: PATH or SRC:DST
    #[arg(long = "bind", value_name = "SPEC")]
    ro: Vec<String>,

    /// Writable bind: PATH or SRC:DST
    #[arg(long = "rw-bind", value_name = "SPEC")]
    rw: Vec<String>,
}

impl BindArgs {
    fn into_raw(self) -> Vec<RawBind> {
        let ro = self.ro.into_iter().map(|spec| parse_bind(&spec, true));
        let rw = self.rw.into_iter().map(|spec| parse_bind(&spec, false));
        ro.chain(rw).collect()
    }
}

fn parse_bind(spec: &str, read_only: bool) -> RawBind {
    match spec.split_once(':') {
        Some((from, to)) => RawBind::spec(from, to, read_only),
        None if read_only => RawBind::from(spec),
        None => RawBind::spec(spec, spec, false),
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))
}

fn option_map(pairs: Vec<(String, String)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            (key, value)
        })
        .collect()
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries argv or command output.
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    debug!("Bubblewrap Sandbox v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading sandbox configuration");
            SandboxConfig::from_json_file(path)?
        }
        None => SandboxConfig::default(),
    };
    let sandbox = BubblewrapSandbox::new(config);

    match args.command {
        Command::Argv { binds, command } => {
            let argv = sandbox.build(command.as_slice(), &binds.into_raw())?;
            for token in argv {
                println!("{token}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            binds,
            chdir,
            env,
            timeout,
            options,
            print_env,
            command,
        } => {
            let mut request = RunRequest::new(command)
                .with_binds(binds.into_raw())
                .with_timeout(timeout_from_secs(timeout)?);
            if let Some(dir) = chdir {
                request = request.with_working_dir(dir);
            }
            if !env.is_empty() {
                request = request.with_envs(env);
            }

            let process = match sandbox.run_with_option_map(&request, &option_map(options)) {
                Ok(process) => process,
                Err(Error::Execution(ExecutionError::ProcessFailed { exit_code, stderr })) => {
                    eprint!("{stderr}");
                    error!(?exit_code, "Sandboxed command failed");
                    let code = exit_code.and_then(|c| u8::try_from(c).ok()).unwrap_or(1);
                    return Ok(ExitCode::from(code));
                }
                Err(e) => return Err(e.into()),
            };

            print!("{}", process.stdout());
            eprint!("{}", process.stderr());

            if print_env {
                let env = process.env()?;
                let rendered = serde_json::to_string_pretty(env).into_diagnostic()?;
                println!("{rendered}");
            }

            Ok(ExitCode::SUCCESS)
        }
    }
}
