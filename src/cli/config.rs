use std::io::Write;

use anyhow::bail;
use metabasic::Profile;
use tabwriter::TabWriter;

use crate::cli::{
    GlobalArgs, Output,
    color::*,
    yaml::{self, Setting},
};

#[derive(Debug, clap::Args)]
pub(crate) struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, clap::Subcommand)]
pub(crate) enum ConfigCommand {
    /// Set a configuration value
    Set(ConfigSetArgs),
    /// Get the current configuration
    Get(ConfigGetArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "snake_case")]
pub(crate) enum ConfigSetting {
    Domain,
    SessionToken,
    DatabaseId,
}

impl std::fmt::Display for ConfigSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSetting::Domain => f.write_str("domain"),
            ConfigSetting::SessionToken => f.write_str("session_token"),
            ConfigSetting::DatabaseId => f.write_str("database_id"),
        }
    }
}

#[derive(Debug, clap::Args)]
#[command(after_long_help = CliExamples("
  # Point the default profile at a Metabase instance
  metabasic config set domain https://metabase.example.com

  # Set the database queries run against
  metabasic config set database_id 3
"))]
pub(crate) struct ConfigSetArgs {
    /// Setting name
    pub name: ConfigSetting,
    /// Value to set
    pub value: String,
}

#[derive(Debug, clap::Args)]
#[command(after_long_help = CliExamples("
  # Show the current profile
  metabasic config get

  # Show all profiles
  metabasic config get --all
"))]
pub(crate) struct ConfigGetArgs {
    /// Show all the available profiles
    #[arg(short, long)]
    pub all: bool,
}

pub(crate) fn handle(args: ConfigArgs, global: GlobalArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Set(args) => config_set(args, global),
        ConfigCommand::Get(args) => config_get(args, global),
    }
}

fn config_set(args: ConfigSetArgs, global: GlobalArgs) -> anyhow::Result<()> {
    let key = args.name.to_string();
    let value = args.value.trim();

    // The profile may not exist yet (or may lack a domain), so this writes
    // to the config file directly instead of resolving the profile first.
    let path = Profile::default_config_path()?;
    let name = global.profile_name();

    let setting = match args.name {
        ConfigSetting::Domain => {
            if value.is_empty() {
                bail!("domain must not be empty");
            }

            Setting::Str(value)
        }
        ConfigSetting::SessionToken => {
            if !value.is_ascii() {
                bail!("session token contains invalid characters");
            }

            Setting::Str(value)
        }
        ConfigSetting::DatabaseId => match value.parse::<i64>() {
            Ok(id) if id >= 0 => Setting::Int(id),
            _ => bail!("invalid database id: {value:?}"),
        },
    };

    yaml::upsert_profile(&path, &name, &[(&key, setting)])?;

    eprintln!("Set {key} for profile {name:?}");
    Ok(())
}

fn config_get(args: ConfigGetArgs, global: GlobalArgs) -> anyhow::Result<()> {
    let mut out = anstream::stdout().lock();

    match (global.output.unwrap_or_default(), args.all) {
        (Output::Tty, false) => {
            let profile = Profile::from_env(&global.profile_name())?;

            let mut tw = TabWriter::new(&mut out).ansi(true);
            print_profile(&mut tw, &profile)?;
            tw.flush()?;
        }
        (Output::Tty, true) => {
            let mut tw = TabWriter::new(&mut out).ansi(true);
            for (i, profile) in Profile::load_all()?.enumerate() {
                if i > 0 {
                    writeln!(&mut tw)?;
                }
                print_profile(&mut tw, &profile)?;
            }
            tw.flush()?;
        }
        (Output::Json, false) => {
            let profile = Profile::from_env(&global.profile_name())?;

            serde_json::to_writer(&mut out, &Redacted(&profile))?;
            writeln!(&mut out)?;
        }
        (Output::Json, true) => {
            let profiles: Vec<_> = Profile::load_all()?.collect();
            let redacted: Vec<_> = profiles.iter().map(Redacted).collect();
            serde_json::to_writer(&mut out, &redacted)?;
            writeln!(&mut out)?;
        }
    }

    Ok(())
}

fn print_profile(out: &mut impl Write, profile: &Profile) -> anyhow::Result<()> {
    let session = if profile.session_token.is_some() {
        "*********"
    } else {
        "(not logged in)"
    };

    let database = match profile.database_id {
        Some(id) => id.to_string(),
        None => "(none)".to_string(),
    };

    writeln!(out, "{HEADER}Profile {:?}{HEADER:#}", profile.name)?;
    writeln!(out, "{GREEN}Domain{GREEN:#}\t{}", profile.domain)?;
    writeln!(out, "{GREEN}Session Token{GREEN:#}\t{session}")?;
    writeln!(out, "{GREEN}Database ID{GREEN:#}\t{database}")?;

    Ok(())
}

/// Serializes a profile with the session token masked.
struct Redacted<'a>(&'a Profile);

impl serde::Serialize for Redacted<'_> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap as _;

        let profile = self.0;
        let mut map = s.serialize_map(None)?;
        map.serialize_entry("name", &profile.name)?;
        map.serialize_entry("domain", &profile.domain.to_string())?;
        map.serialize_entry("logged_in", &profile.session_token.is_some())?;
        if let Some(id) = profile.database_id {
            map.serialize_entry("database_id", &id)?;
        }
        map.end()
    }
}
