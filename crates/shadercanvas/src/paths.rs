use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "SHADERCANVAS_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "ShaderCanvas";
const APPLICATION: &str = "shadercanvas";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        if let Some(dir) = env::var_os(ENV_CONFIG_DIR) {
            return Ok(Self::with_config_dir(PathBuf::from(dir)));
        }
        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        Ok(Self::with_config_dir(project_dirs.config_dir().to_path_buf()))
    }

    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_lives_in_config_dir() {
        let paths = AppPaths::with_config_dir(PathBuf::from("/tmp/shadercanvas"));
        assert_eq!(paths.config_dir(), Path::new("/tmp/shadercanvas"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/shadercanvas/config.toml"));
    }
}
