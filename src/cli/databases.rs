use std::io::Write as _;

use anyhow::Context as _;
use tabwriter::TabWriter;

use crate::cli::{Cli, Output, color::*};

pub(crate) fn handle(cli: &Cli) -> anyhow::Result<()> {
    let databases = cli
        .client
        .list_databases()
        .context("Failed to list databases")?;

    let mut out = anstream::stdout().lock();
    match cli.global.output.unwrap_or_default() {
        Output::Json => {
            serde_json::to_writer(&mut out, &databases)?;
            writeln!(&mut out)?;
        }
        Output::Tty => {
            let selected = cli.client.database_id();
            let mut tw = TabWriter::new(&mut out).ansi(true);

            writeln!(tw, "{HEADER}ID\tNAME\tENGINE{HEADER:#}")?;
            for db in databases {
                let engine = db.engine.as_deref().unwrap_or("-");
                if Some(db.id) == selected {
                    writeln!(tw, "{GREEN}{}\t{} *\t{engine}{GREEN:#}", db.id, db.name)?;
                } else {
                    writeln!(tw, "{}\t{}\t{engine}", db.id, db.name)?;
                }
            }

            tw.flush()?;
        }
    }

    Ok(())
}
