use std::collections::BTreeMap;

use anyhow::{Context as _, bail};
use metabasic::{DatabaseId, DatabaseSelector as _, SelectError, select::Prompt};

use crate::cli::{
    Cli,
    color::CliExamples,
    yaml::{self, Setting},
};

#[derive(Debug, clap::Args)]
#[command(after_long_help = CliExamples("
  # Pick a database from a list
  metabasic use

  # Pick a database by name
  metabasic use \"Sample Database\"
"))]
pub(crate) struct UseArgs {
    /// Database name [default: prompt]
    pub name: Option<String>,
}

pub(crate) fn handle(cli: &mut Cli, args: UseArgs) -> anyhow::Result<()> {
    let mut chosen = None;
    let selector = |dbs: &BTreeMap<String, DatabaseId>| -> Result<String, SelectError> {
        let name = match &args.name {
            Some(name) => name.clone(),
            None => Prompt::stdio().select(dbs)?,
        };

        chosen = Some(name.clone());
        Ok(name)
    };

    cli.client
        .select_database(selector)
        .context("Failed to select a database")?;

    let (Some(name), Some(id)) = (chosen, cli.client.database_id()) else {
        bail!("no database selected");
    };

    let Ok(id_setting) = i64::try_from(id.0) else {
        bail!("database id {id} out of range");
    };

    yaml::upsert_profile(
        &cli.profile.config_path,
        &cli.profile.name,
        &[
            ("domain", Setting::Str(&cli.profile.domain.to_string())),
            ("database_id", Setting::Int(id_setting)),
        ],
    )?;

    eprintln!(
        "Using database {name:?} ({id}) in profile {:?}",
        cli.profile.name
    );

    Ok(())
}
