use std::env;

use anyhow::{Context as _, bail};
use tracing::info;

use crate::cli::{
    Cli,
    color::CliExamples,
    read_line,
    yaml::{self, Setting},
};

#[derive(Debug, clap::Args)]
#[command(after_long_help = CliExamples("
  # Log in interactively
  metabasic login

  # Log in non-interactively
  METABASE_PASSWORD=... metabasic login --email ada@example.com
"))]
pub(crate) struct LoginArgs {
    /// Email address to log in with [default: prompt]
    #[arg(long, short)]
    pub email: Option<String>,
    /// Don't store the session token in the profile
    #[arg(long)]
    pub no_save: bool,
}

pub(crate) fn handle(cli: &mut Cli, args: LoginArgs) -> anyhow::Result<()> {
    let LoginArgs { email, no_save } = args;

    let email = match email {
        Some(e) => e,
        None => read_line("Email: ")?,
    };

    let password = match env::var("METABASE_PASSWORD") {
        Ok(p) => p,
        Err(_) => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    if email.is_empty() || password.is_empty() {
        bail!("email and password are required");
    }

    cli.client
        .authenticate(&email, &password)
        .context("Failed to log in")?;

    let Some(token) = cli.client.session_token() else {
        bail!("no session token after login");
    };

    info!(email = %email, domain = %cli.client.domain(), "logged in");

    if no_save {
        println!("{token}");
        return Ok(());
    }

    let domain = cli.profile.domain.to_string();
    yaml::upsert_profile(
        &cli.profile.config_path,
        &cli.profile.name,
        &[
            ("domain", Setting::Str(&domain)),
            ("session_token", Setting::Str(token)),
        ],
    )?;

    eprintln!(
        "Saved session for {email} in profile {:?}",
        cli.profile.name
    );

    Ok(())
}
