use std::{
    collections::BTreeMap,
    env,
    fs::File,
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DatabaseId, client::parse_domain};

/// An error encountered while loading or resolving a configuration profile.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to load config file")]
    Io(#[from] io::Error),
    #[error("Invalid configuration")]
    Invalid(#[from] serde_yaml::Error),
    #[error("Profile '{0}' not found")]
    ProfileNotFound(String),
    #[error("No Metabase domain configured")]
    NoDomain,
    #[error("Session token contains invalid characters")]
    InvalidSessionToken,
    #[error("Invalid database id: {0:?}")]
    InvalidDatabaseId(String),
    #[error("Invalid URI")]
    InvalidUri(#[from] http::uri::InvalidUri),
}

/// A fully resolved configuration profile for talking to a Metabase
/// instance.
#[derive(Clone, Serialize)]
pub struct Profile {
    /// The name of the profile.
    pub name: String,
    /// The base URL of the Metabase instance.
    #[serde(serialize_with = "serialize_uri")]
    pub domain: http::Uri,
    /// A session token from a previous login, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// The database that queries run against, if one has been selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_id: Option<DatabaseId>,
    /// The user-agent used on requests. Intended for internal use.
    #[serde(skip)]
    pub user_agent: String,
    /// The config file this profile was loaded from, or the canonical one if
    /// no config file exists.
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "********"),
            )
            .field("database_id", &self.database_id)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// A profile stored in the config file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub(crate) struct ConfigProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) session_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) database_id: Option<DatabaseId>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub(crate) struct Config {
    pub(crate) profiles: BTreeMap<String, ConfigProfile>,
}

impl Profile {
    /// Load the selected profile from the metabasic configuration file
    /// (usually ~/.config/metabasic.yaml). If no configuration file is
    /// present, then the configuration will be loaded solely from the
    /// environment.
    ///
    /// If `METABASIC_PROFILE` is set, that will be used to select the profile.
    /// Otherwise the profile `default` will be used.
    ///
    /// The following environment variables can override the corresponding
    /// values in the config file:
    ///
    /// | Environment Variable    | Config Value    |
    /// |-------------------------|-----------------|
    /// | `METABASE_DOMAIN`       | `domain`        |
    /// | `METABASE_SESSION`      | `session_token` |
    /// | `METABASE_DATABASE_ID`  | `database_id`   |
    pub fn from_default_env() -> Result<Self, Error> {
        if let Ok(s) = env::var("METABASIC_PROFILE") {
            Self::from_env(&s)
        } else {
            Self::from_env("default")
        }
    }

    /// Load the given profile from the metabasic configuration file,
    /// applying the same environment overrides as
    /// [Profile::from_default_env].
    pub fn from_env(name: &str) -> Result<Self, Error> {
        let domain = env::var("METABASE_DOMAIN").ok();
        let session_token = env::var("METABASE_SESSION").ok();
        let database_id = env::var("METABASE_DATABASE_ID").ok();

        let config_path = find_config()?;
        let profile = match read_profile(&config_path, name) {
            Ok(p) => p,
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no config file found");
                Default::default()
            }
            Err(Error::ProfileNotFound(_)) if domain.is_some() => {
                debug!(profile = name, "profile not in config file, using environment");
                Default::default()
            }
            Err(e) => return Err(e),
        };

        let database_id = match database_id {
            Some(s) => Some(parse_database_id(&s)?),
            None => profile.database_id,
        };

        let raw = ConfigProfile {
            domain: domain.or(profile.domain),
            session_token: session_token.or(profile.session_token),
            database_id,
        };

        Self::from_raw(raw, name.to_owned(), config_path)
    }

    /// Modifies the user-agent to have a different prefix. Intended for
    /// internal use.
    #[doc(hidden)]
    pub fn with_ua_product(self, ua_product: &str) -> Self {
        Self {
            user_agent: make_ua(Some(ua_product)),
            ..self
        }
    }

    /// Load the given profile (or 'default') from the metabasic
    /// configuration file. Does not read any environment variables.
    ///
    /// Usually, you will want to use [Profile::from_env] instead.
    pub fn load(name: Option<&str>) -> Result<Self, Error> {
        let file = find_config()?;
        Self::read(&file, name)
    }

    /// Iterate through all profiles in the metabasic configuration file. Does
    /// not read any environment variables.
    pub fn load_all() -> Result<impl Iterator<Item = Self>, Error> {
        let path = find_config()?;
        Self::read_all(path)
    }

    /// Load the given profile (or 'default') from the given file, which must
    /// be a valid metabasic configuration file. Does not read any environment
    /// variables.
    pub fn read(path: impl AsRef<Path>, name: Option<&str>) -> Result<Self, Error> {
        let path = path.as_ref();
        let name = name.unwrap_or("default").to_owned();
        let profile = read_profile(path, &name)?;
        Self::from_raw(profile, name, path.to_owned())
    }

    /// Read all profiles from the given file, which must be a valid
    /// metabasic configuration file. Does not read any environment variables.
    pub fn read_all(path: impl AsRef<Path>) -> Result<impl Iterator<Item = Self>, Error> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;

        let profiles: Result<Vec<_>, Error> = config
            .profiles
            .into_iter()
            .map(|(name, raw)| Profile::from_raw(raw, name, path.to_owned()))
            .collect();

        Ok(profiles?.into_iter())
    }

    /// The config file that [Profile::load] reads from. If no config file
    /// exists yet, this is `~/.config/metabasic.yaml`.
    pub fn default_config_path() -> Result<PathBuf, Error> {
        find_config()
    }

    fn from_raw(raw: ConfigProfile, name: String, path: PathBuf) -> Result<Self, Error> {
        let ConfigProfile {
            domain,
            session_token,
            database_id,
        } = raw;

        let Some(domain) = domain else {
            return Err(Error::NoDomain);
        };
        let domain = parse_domain(&domain)?;

        if let Some(token) = &session_token
            && !token.is_ascii()
        {
            return Err(Error::InvalidSessionToken);
        }

        Ok(Self {
            name,
            domain,
            session_token,
            database_id,
            user_agent: make_ua(None),
            config_path: path,
        })
    }
}

/// Returns the path of the config file in use, or the canonical location if
/// none exists yet.
pub(crate) fn find_config() -> Result<PathBuf, Error> {
    let Some(home) = env::home_dir() else {
        return Err(Error::Io(io::Error::other(
            "No $HOME found for the current user",
        )));
    };

    let canonical = home.join(".config/metabasic.yaml");
    if canonical.exists() {
        return Ok(canonical);
    }

    for fallback in [".config/metabasic.yml", ".metabasic/config.yaml"] {
        let path = home.join(fallback);
        if path.exists() {
            return Ok(path);
        }
    }

    Ok(canonical)
}

fn read_profile(p: &Path, name: &str) -> Result<ConfigProfile, Error> {
    let file = File::open(p)?;
    let mut config: Config = serde_yaml::from_reader(file).map_err(Error::Invalid)?;
    let Some(config_profile) = config.profiles.remove(name) else {
        return Err(Error::ProfileNotFound(name.to_string()));
    };

    debug!(path = %p.display(), "loaded config file");

    Ok(config_profile)
}

fn parse_database_id(s: &str) -> Result<DatabaseId, Error> {
    s.trim()
        .parse()
        .map(DatabaseId)
        .map_err(|_| Error::InvalidDatabaseId(s.to_owned()))
}

fn serialize_uri<S: serde::Serializer>(uri: &http::Uri, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(uri)
}

pub(crate) fn make_ua(product: Option<&str>) -> String {
    format!(
        "{}/{}",
        product.unwrap_or("metabasic"),
        env!("METABASIC_VERSION")
    )
}
