//! Settings file command implementations

use anyhow::{Context as _, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::Context;
use crate::config::Settings;
use crate::config::settings::LOCAL_CONFIG_FILE;

/// Handle config init command. With a project id the file is written from
/// the defaults with that project filled in, otherwise the commented example.
pub fn init(path: Option<PathBuf>, project_id: Option<String>, force: bool) -> Result<PathBuf> {
    let path = path.unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE));
    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite it",
            path.display()
        );
    }

    write_settings(&path, project_id)?;
    crate::log_info!("Wrote settings to {}", path.display());
    Ok(path)
}

fn write_settings(path: &Path, project_id: Option<String>) -> Result<()> {
    match project_id {
        Some(project_id) => {
            let mut settings = Settings::default();
            settings.gcp.project_id = project_id;
            settings.save(path)
        }
        None => fs::write(path, Settings::example_config()?)
            .with_context(|| format!("Failed to write {}", path.display())),
    }
}

/// Handle config show command: the effective settings as TOML
pub fn show(ctx: &Context) -> Result<()> {
    let rendered =
        toml::to_string_pretty(&ctx.settings).context("Failed to serialize settings")?;
    print!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalelab.toml");

        init(Some(path.clone()), None, false).unwrap();
        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalelab.toml");
        fs::write(&path, "[gcp]\nproject_id = \"keep-me\"\n").unwrap();

        assert!(init(Some(path.clone()), None, false).is_err());
        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.gcp.project_id, "keep-me");

        init(Some(path.clone()), Some("lab-123".to_string()), true).unwrap();
        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.gcp.project_id, "lab-123");
    }
}
