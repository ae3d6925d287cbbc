//! Extension manifest input.
//!
//! The harness consumes the small slice of `manifest.json` that declares
//! surfaces: a background page or script list, a browser-action popup, and
//! a sidebar panel. Everything else in the manifest is ignored. Relative
//! paths resolve against the manifest file's directory.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::context::SourceSpec;
use crate::error::{Error, Result};

// ============================================================================
// Manifest Types
// ============================================================================

/// The background surface declaration: a page XOR an ordered script list.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct BackgroundDecl {
    /// Background page path.
    #[serde(default)]
    pub page: Option<String>,

    /// Ordered background script paths.
    #[serde(default)]
    pub scripts: Option<Vec<String>>,
}

/// The browser-action declaration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct BrowserActionDecl {
    /// Default popup document path.
    #[serde(default)]
    pub default_popup: Option<String>,
}

/// The sidebar-action declaration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SidebarActionDecl {
    /// Default sidebar panel document path.
    #[serde(default)]
    pub default_panel: Option<String>,
}

// ============================================================================
// ExtensionManifest
// ============================================================================

/// The surface declarations of one extension manifest.
///
/// Loaded once per harness; read-only afterwards.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ExtensionManifest {
    /// Background surface declaration.
    #[serde(default)]
    pub background: Option<BackgroundDecl>,

    /// Browser-action (popup) declaration.
    #[serde(default)]
    pub browser_action: Option<BrowserActionDecl>,

    /// Sidebar-action declaration.
    #[serde(default)]
    pub sidebar_action: Option<SidebarActionDecl>,
}

// ============================================================================
// ExtensionManifest - Loading
// ============================================================================

impl ExtensionManifest {
    /// Loads a manifest from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`Error::ResourceNotFound`] if the file does not exist
    /// - [`Error::Configuration`] if the JSON is malformed
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::resource_not_found(path)
            } else {
                Error::Io(e)
            }
        })?;

        let manifest: Self = serde_json::from_str(&content).map_err(|e| {
            Error::configuration(format!("Invalid manifest at {}: {}", path.display(), e))
        })?;

        debug!(
            path = %path.display(),
            background = manifest.declares_background(),
            popup = manifest.declares_popup(),
            sidebar = manifest.declares_sidebar(),
            "Manifest loaded"
        );
        Ok(manifest)
    }
}

// ============================================================================
// ExtensionManifest - Surface Resolution
// ============================================================================

impl ExtensionManifest {
    /// Returns `true` if a usable background surface is declared.
    #[inline]
    #[must_use]
    pub fn declares_background(&self) -> bool {
        self.background.is_some()
    }

    /// Returns `true` if a popup surface is declared.
    #[inline]
    #[must_use]
    pub fn declares_popup(&self) -> bool {
        self.browser_action
            .as_ref()
            .is_some_and(|action| action.default_popup.is_some())
    }

    /// Returns `true` if a sidebar surface is declared.
    #[inline]
    #[must_use]
    pub fn declares_sidebar(&self) -> bool {
        self.sidebar_action
            .as_ref()
            .is_some_and(|action| action.default_panel.is_some())
    }

    /// Resolves the background declaration into a source spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the declaration carries both
    /// `page` and `scripts`, or neither.
    pub fn background_spec(&self, base: &Path) -> Result<Option<SourceSpec>> {
        let Some(background) = &self.background else {
            return Ok(None);
        };

        match (&background.page, &background.scripts) {
            (Some(page), None) => Ok(Some(SourceSpec::page(base.join(page)))),
            (None, Some(scripts)) => Ok(Some(SourceSpec::Scripts(
                scripts.iter().map(|s| base.join(s)).collect(),
            ))),
            (Some(_), Some(_)) => Err(Error::configuration(
                "Manifest background declares both 'page' and 'scripts'; exactly one is allowed",
            )),
            (None, None) => Err(Error::configuration(
                "Manifest background declares neither 'page' nor 'scripts'",
            )),
        }
    }

    /// Resolves the popup document path.
    #[must_use]
    pub fn popup_path(&self, base: &Path) -> Option<PathBuf> {
        self.browser_action
            .as_ref()
            .and_then(|action| action.default_popup.as_deref())
            .map(|p| base.join(p))
    }

    /// Resolves the sidebar document path.
    #[must_use]
    pub fn sidebar_path(&self, base: &Path) -> Option<PathBuf> {
        self.sidebar_action
            .as_ref()
            .and_then(|action| action.default_panel.as_deref())
            .map(|p| base.join(p))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    fn parse(json: &str) -> ExtensionManifest {
        serde_json::from_str(json).expect("parse manifest")
    }

    #[test]
    fn test_parse_full_manifest() {
        let manifest = parse(
            r#"{
                "name": "example",
                "manifest_version": 2,
                "background": {"scripts": ["bg.js", "util.js"]},
                "browser_action": {"default_popup": "popup.html"},
                "sidebar_action": {"default_panel": "sidebar.html"}
            }"#,
        );

        assert!(manifest.declares_background());
        assert!(manifest.declares_popup());
        assert!(manifest.declares_sidebar());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let manifest = parse(r#"{"permissions": ["tabs"], "icons": {}}"#);
        assert!(!manifest.declares_background());
        assert!(!manifest.declares_popup());
        assert!(!manifest.declares_sidebar());
    }

    #[test]
    fn test_background_scripts_resolve_against_base() {
        let manifest = parse(r#"{"background": {"scripts": ["src/bg.js"]}}"#);
        let spec = manifest
            .background_spec(Path::new("/ext"))
            .expect("spec")
            .expect("declared");
        assert_eq!(spec, SourceSpec::scripts(["/ext/src/bg.js"]));
    }

    #[test]
    fn test_background_page_resolves_against_base() {
        let manifest = parse(r#"{"background": {"page": "bg.html"}}"#);
        let spec = manifest
            .background_spec(Path::new("/ext"))
            .expect("spec")
            .expect("declared");
        assert_eq!(spec, SourceSpec::page("/ext/bg.html"));
    }

    #[test]
    fn test_background_page_and_scripts_rejected() {
        let manifest =
            parse(r#"{"background": {"page": "bg.html", "scripts": ["bg.js"]}}"#);
        let err = manifest.background_spec(Path::new("/ext")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_background_rejected() {
        let manifest = parse(r#"{"background": {}}"#);
        let err = manifest.background_spec(Path::new("/ext")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_popup_and_sidebar_paths() {
        let manifest = parse(
            r#"{
                "browser_action": {"default_popup": "ui/popup.html"},
                "sidebar_action": {"default_panel": "ui/sidebar.html"}
            }"#,
        );
        assert_eq!(
            manifest.popup_path(Path::new("/ext")),
            Some(PathBuf::from("/ext/ui/popup.html"))
        );
        assert_eq!(
            manifest.sidebar_path(Path::new("/ext")),
            Some(PathBuf::from("/ext/ui/sidebar.html"))
        );
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = ExtensionManifest::load("/nonexistent/manifest.json")
            .await
            .unwrap_err();
        assert!(err.is_resource_missing());
    }

    #[tokio::test]
    async fn test_load_malformed_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("manifest.json");
        fs::write(&path, "{not json").expect("write manifest");

        let err = ExtensionManifest::load(&path).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("manifest.json");
        fs::write(&path, r#"{"background": {"scripts": ["bg.js"]}}"#).expect("write manifest");

        let manifest = ExtensionManifest::load(&path).await.expect("load");
        assert!(manifest.declares_background());
    }
}
