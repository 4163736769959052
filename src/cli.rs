mod color;
mod config;
mod databases;
mod login;
mod query;
mod select;
mod yaml;

use std::{
    env,
    io::{BufRead as _, Write as _},
    time,
};

use anyhow::bail;
use clap::{Parser, Subcommand};
use metabasic::{Client, Profile, transport};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "metabasic",
    about = "A command-line client for Metabase",
    version = env!("METABASIC_VERSION"),
    propagate_version = true
)]
pub(crate) struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// How to format output.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Output {
    Json,
    #[default]
    Tty,
}

#[derive(Debug, clap::Args)]
#[command(next_help_heading = "Global Options")]
pub(crate) struct GlobalArgs {
    /// Name of the profile to use
    #[arg(long, short = 'P', global = true)]
    pub profile: Option<String>,
    /// Output format
    #[arg(long, short = 'O', global = true)]
    pub output: Option<Output>,
    /// Timeout (in seconds) for client operations (-1 = no timeout)
    #[arg(long, global = true)]
    pub client_timeout: Option<i64>,
    /// Print verbose logs
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// The name of the selected profile, whether or not it exists yet.
    pub(crate) fn profile_name(&self) -> String {
        self.profile
            .clone()
            .or_else(|| env::var("METABASIC_PROFILE").ok())
            .unwrap_or_else(|| "default".to_string())
    }
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Print version.
    Version,
    /// Log in and store the session token in the profile
    Login(login::LoginArgs),
    /// List the databases connected to Metabase
    Databases,
    /// Choose the database that queries run against
    Use(select::UseArgs),
    /// Run a native (SQL) query
    Query(query::QueryArgs),
    /// Configure metabasic settings
    Config(config::ConfigArgs),
}

pub(crate) struct Cli {
    pub(crate) profile: Profile,
    pub(crate) global: GlobalArgs,
    pub(crate) client: Client,
}

pub(crate) fn run(args: Args) -> anyhow::Result<()> {
    // Some commands don't require any config.
    match args.command {
        Command::Version => {
            println!("metabasic {}", env!("METABASIC_VERSION"));
            return Ok(());
        }
        Command::Config(config_args) => return config::handle(config_args, args.global),
        _ => (),
    }

    let profile = if let Some(name) = args.global.profile.as_deref() {
        Profile::from_env(name)
    } else {
        Profile::from_default_env()
    };

    let profile = profile?.with_ua_product("metabasic-cli");

    let timeout = match args.global.client_timeout {
        Some(-1) | None => None,
        Some(v) if v > 0 => Some(time::Duration::from_secs(v as _)),
        Some(v) => bail!("Invalid timeout value: {v}"),
    };

    debug!(profile = ?profile, command = ?args.command, "cli invocation");

    let client = Client::from_connection((&profile).into(), transport::agent(timeout));
    let mut cli = Cli {
        profile,
        global: args.global,
        client,
    };

    match args.command {
        Command::Version => unreachable!(),
        Command::Config(_) => unreachable!(),
        Command::Login(args) => login::handle(&mut cli, args),
        Command::Databases => databases::handle(&cli),
        Command::Use(args) => select::handle(&mut cli, args),
        Command::Query(args) => query::handle(&cli, args),
    }
}

/// Ask for a single line on stderr and read the answer from stdin.
pub(crate) fn read_line(prompt: &str) -> anyhow::Result<String> {
    let mut stderr = std::io::stderr().lock();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line)? == 0 {
        bail!("no input");
    }

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
