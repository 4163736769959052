use std::path::Path;

use anyhow::bail;
use nondestructive::yaml;

/// A value to store in a profile.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Setting<'a> {
    Str(&'a str),
    Int(i64),
}

/// Set keys on a profile in the config file, creating the file, the
/// profile, or both if they don't exist yet. Existing files are edited in
/// place, so comments and formatting survive.
pub(crate) fn upsert_profile(
    path: &Path,
    profile: &str,
    settings: &[(&str, Setting<'_>)],
) -> anyhow::Result<()> {
    if !path.exists() {
        return create_with_profile(path, profile, settings);
    }

    edit(path, |doc| {
        let mut m = mapping_at_path(doc, &["profiles", profile])?;
        for &(key, value) in settings {
            match value {
                Setting::Str(s) => upsert_str(&mut m, key, s),
                Setting::Int(n) => upsert_i64(&mut m, key, n),
            }
        }

        Ok(())
    })
}

fn create_with_profile(
    path: &Path,
    profile: &str,
    settings: &[(&str, Setting<'_>)],
) -> anyhow::Result<()> {
    let mut values = serde_yaml::Mapping::new();
    for &(key, value) in settings {
        let value = match value {
            Setting::Str(s) => serde_yaml::Value::from(s),
            Setting::Int(n) => serde_yaml::Value::from(n),
        };

        values.insert(key.into(), value);
    }

    let mut profiles = serde_yaml::Mapping::new();
    profiles.insert(profile.into(), values.into());

    let mut root = serde_yaml::Mapping::new();
    root.insert("profiles".into(), profiles.into());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, serde_yaml::to_string(&root)?)?;
    Ok(())
}

/// Load a YAML file, apply edits via a closure, and write it back. The
/// closure receives a mutable reference to the parsed document.
pub(crate) fn edit(
    path: &Path,
    f: impl FnOnce(&mut yaml::Document) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)?;
    let mut doc = yaml::from_slice(&content)?;

    f(&mut doc)?;

    std::fs::write(path, doc.to_string())?;
    Ok(())
}

/// Navigate into a nested YAML mapping by key path, creating any missing
/// intermediate mappings along the way. Returns a `MappingMut` pointing at
/// the innermost mapping.
///
/// `path` must be non-empty.
pub(crate) fn mapping_at_path<'a>(
    doc: &'a mut yaml::Document,
    path: &[&str],
) -> anyhow::Result<yaml::MappingMut<'a>> {
    assert!(!path.is_empty());

    let Some(mut current) = doc.as_mut().into_mapping_mut() else {
        bail!("invalid file: not a dictionary");
    };

    for &key in path {
        if current.as_ref().get(key).is_none() {
            let _ = current.insert(key, yaml::Separator::Auto).make_mapping();
        }

        let Some(next) = current.get_into_mut(key).and_then(|v| v.into_mapping_mut()) else {
            bail!("key {key:?} exists, but is not a dictionary");
        };

        current = next
    }

    Ok(current)
}

fn upsert_str(m: &mut yaml::MappingMut<'_>, key: &str, value: &str) {
    if let Some(mut v) = m.get_mut(key) {
        v.set_string(value);
    } else {
        m.insert_str(key, value);
    }
}

fn upsert_i64(m: &mut yaml::MappingMut<'_>, key: &str, value: i64) {
    if let Some(mut v) = m.get_mut(key) {
        v.set_i64(value);
    } else {
        m.insert_i64(key, value);
    }
}
