//! Source catalog: which feeds belong to which (category, region) bucket.
//!
//! The catalog is plain configuration. A default catalog is compiled into the
//! binary from `config/catalog.yaml`; a different file can be supplied at
//! runtime with `--catalog` / `NEWS_CATALOG`.
//!
//! Loading is strict: unknown category or region keys fail deserialization,
//! and every entry is validated before the catalog is handed to the
//! orchestrator.

use crate::models::{Category, FetchTask, Region, Source};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

const BUILTIN_CATALOG: &str = include_str!("../config/catalog.yaml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("region `{region}` is not allowed for category `{category}`")]
    RegionNotAllowed { category: Category, region: Region },
    #[error("source in {category}/{region} has an empty name")]
    EmptyName { category: Category, region: Region },
    #[error("source `{name}` has an invalid feed URL `{url}`")]
    InvalidUrl { name: String, url: String },
}

/// Validated mapping of category → region → sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    sources: BTreeMap<Category, BTreeMap<Region, Vec<Source>>>,
}

impl Catalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    /// Parse and validate a catalog from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, CatalogError> {
        let sources: BTreeMap<Category, BTreeMap<Region, Vec<Source>>> = serde_yaml::from_str(text)?;
        let catalog = Self { sources };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a YAML file.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_yaml(&text)?;
        info!(sources = catalog.len(), "Loaded source catalog");
        Ok(catalog)
    }

    /// Load from `path` when given, otherwise use the built-in catalog.
    pub async fn load_or_builtin(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(p) => Self::load(p).await,
            None => Self::builtin(),
        }
    }

    fn validate(&self) -> Result<(), CatalogError> {
        for (&category, regions) in &self.sources {
            for (&region, sources) in regions {
                if !category.allows(region) {
                    return Err(CatalogError::RegionNotAllowed { category, region });
                }
                for source in sources {
                    if source.name.trim().is_empty() {
                        return Err(CatalogError::EmptyName { category, region });
                    }
                    let valid = Url::parse(&source.url)
                        .map(|u| matches!(u.scheme(), "http" | "https"))
                        .unwrap_or(false);
                    if !valid {
                        return Err(CatalogError::InvalidUrl {
                            name: source.name.clone(),
                            url: source.url.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Total number of configured sources.
    pub fn len(&self) -> usize {
        self.sources.values().flat_map(|r| r.values()).map(Vec::len).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sources of one bucket.
    pub fn sources(&self, category: Category, region: Region) -> &[Source] {
        self.sources
            .get(&category)
            .and_then(|r| r.get(&region))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Expand the selected categories (all when `None` or empty) into one
    /// fetch task per source, in catalog order.
    pub fn tasks(&self, selected: Option<&[Category]>) -> Vec<FetchTask> {
        let categories = selected_categories(selected);
        let tasks: Vec<FetchTask> = categories
            .iter()
            .flat_map(|&category| {
                category.regions().iter().flat_map(move |&region| {
                    self.sources(category, region).iter().map(move |source| FetchTask {
                        category,
                        region,
                        source_name: source.name.clone(),
                        url: source.url.clone(),
                    })
                })
            })
            .collect();
        debug!(tasks = tasks.len(), "Expanded catalog into fetch tasks");
        tasks
    }
}

/// Normalize a category selection: `None` or an empty slice means every
/// category; duplicates are dropped and catalog order is restored.
pub fn selected_categories(selected: Option<&[Category]>) -> Vec<Category> {
    match selected {
        Some(list) if !list.is_empty() => Category::ALL.into_iter().filter(|c| list.contains(c)).collect(),
        _ => Category::ALL.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = Catalog::builtin().unwrap();
        assert!(!catalog.is_empty());
        assert_eq!(catalog.sources(Category::Crypto, Region::Global).len(), 5);
        assert_eq!(catalog.sources(Category::Finance, Region::Usa)[0].name, "Bloomberg");
        assert!(catalog.sources(Category::Crypto, Region::Usa).is_empty());
    }

    #[test]
    fn test_unknown_region_key_is_rejected() {
        let yaml = "finance:\n  africa:\n    - name: X\n      url: https://x.test/feed\n";
        assert!(matches!(Catalog::from_yaml(yaml), Err(CatalogError::Yaml(_))));
    }

    #[test]
    fn test_unknown_category_key_is_rejected() {
        let yaml = "sports:\n  usa:\n    - name: X\n      url: https://x.test/feed\n";
        assert!(matches!(Catalog::from_yaml(yaml), Err(CatalogError::Yaml(_))));
    }

    #[test]
    fn test_crypto_outside_global_is_rejected() {
        let yaml = "crypto:\n  usa:\n    - name: X\n      url: https://x.test/feed\n";
        assert!(matches!(
            Catalog::from_yaml(yaml),
            Err(CatalogError::RegionNotAllowed {
                category: Category::Crypto,
                region: Region::Usa
            })
        ));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let yaml = "tech:\n  usa:\n    - name: X\n      url: ftp://x.test/feed\n";
        assert!(matches!(Catalog::from_yaml(yaml), Err(CatalogError::InvalidUrl { .. })));
    }

    #[test]
    fn test_tasks_follow_catalog_order_and_selection() {
        let yaml = r#"
other:
  usa:
    - name: O
      url: https://o.test/rss
finance:
  europe:
    - name: FE
      url: https://fe.test/rss
  usa:
    - name: FU
      url: https://fu.test/rss
"#;
        let catalog = Catalog::from_yaml(yaml).unwrap();

        let names: Vec<String> = catalog.tasks(None).into_iter().map(|t| t.source_name).collect();
        assert_eq!(names, vec!["FU", "FE", "O"]);

        let only_other = catalog.tasks(Some(&[Category::Other]));
        assert_eq!(only_other.len(), 1);
        assert_eq!(only_other[0].category, Category::Other);
        assert_eq!(only_other[0].region, Region::Usa);
    }

    #[test]
    fn test_selected_categories_defaults_to_all() {
        assert_eq!(selected_categories(None), Category::ALL.to_vec());
        assert_eq!(selected_categories(Some(&[])), Category::ALL.to_vec());
        assert_eq!(
            selected_categories(Some(&[Category::Tech, Category::Finance, Category::Tech])),
            vec![Category::Finance, Category::Tech]
        );
    }
}
