use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use tokio::fs as async_fs;

/// Build-time enumeration of the site-relative paths that must be cached for
/// the app to work fully offline. An external input, never computed at
/// runtime.
#[derive(Debug, Clone)]
pub struct Manifest {
    paths: Vec<String>,
    lookup: HashSet<String>,
}

impl Manifest {
    pub fn new(paths: Vec<String>) -> Result<Self> {
        for path in &paths {
            ensure!(
                path.starts_with('/'),
                "manifest path '{path}' must be site-relative (start with '/')"
            );
        }
        let lookup = paths.iter().cloned().collect();
        Ok(Self { paths, lookup })
    }

    /// Loads a JSON array of paths, the serialized form of the build-time
    /// asset list.
    pub async fn load(path: &Path) -> Result<Self> {
        let data = async_fs::read(path)
            .await
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let paths: Vec<String> = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;
        Self::new(paths)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lookup.contains(path)
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_checks_use_exact_paths() {
        let manifest = Manifest::new(vec![
            "/index.html".to_string(),
            "/css/index-theme.css".to_string(),
        ])
        .unwrap();
        assert!(manifest.contains("/index.html"));
        assert!(!manifest.contains("/index.htm"));
        assert!(!manifest.contains("index.html"));
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn rejects_relative_paths() {
        let err = Manifest::new(vec!["icons/icon.png".to_string()]).unwrap_err();
        assert!(err.to_string().contains("site-relative"));
    }

    #[tokio::test]
    async fn loads_a_json_array() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("manifest.json");
        tokio::fs::write(&path, br#"["/", "/offline.html", "/js/index.js"]"#).await?;

        let manifest = Manifest::load(&path).await?;
        assert_eq!(manifest.len(), 3);
        assert!(manifest.contains("/offline.html"));
        Ok(())
    }
}
