//! Product catalog: lookup, category filter and name search.
//!
//! The catalog is loaded from the [`RemoteStore`] and cached with `moka`
//! (5-minute TTL by default) by [`CatalogService`].

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tienda_core::{Category, CategoryError, Product, ProductId};
use tracing::{debug, instrument};

use crate::cart::{RemoteError, RemoteStore};

/// Immutable product list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    #[must_use]
    pub const fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    #[must_use]
    pub fn find(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Categories that have at least one product, in filter-button order.
    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.products.iter().any(|p| p.category == *c))
            .collect()
    }

    /// Products matching `query`, in catalog order.
    ///
    /// A non-empty search term wins over the category: it matches product
    /// names case-insensitively across every category.
    #[must_use]
    pub fn filter(&self, query: &CatalogQuery) -> Vec<&Product> {
        if let Some(term) = query.search_term() {
            let term = term.to_lowercase();
            return self
                .products
                .iter()
                .filter(|p| p.name.to_lowercase().contains(&term))
                .collect();
        }
        self.products
            .iter()
            .filter(|p| query.category.is_none_or(|c| p.category == c))
            .collect()
    }
}

/// Listing filter from the catalog page's query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    pub category: Option<Category>,
    pub search: Option<String>,
}

impl CatalogQuery {
    /// Build a query from raw parameters. An empty category or `all` means
    /// every category.
    ///
    /// # Errors
    ///
    /// Returns an error if the category is not known.
    pub fn from_params(category: Option<&str>, search: Option<&str>) -> Result<Self, CategoryError> {
        let category = match category.map(str::trim) {
            None | Some("" | "all") => None,
            Some(raw) => Some(raw.parse()?),
        };
        Ok(Self {
            category,
            search: search.map(str::to_owned),
        })
    }

    /// The trimmed search term, if it is not empty.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

// =============================================================================
// CatalogService
// =============================================================================

/// Loads the catalog from the remote store and caches it.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogServiceInner>,
}

struct CatalogServiceInner {
    remote: Arc<dyn RemoteStore>,
    cache: Cache<(), Arc<Catalog>>,
}

impl CatalogService {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(1).time_to_live(ttl).build();
        Self {
            inner: Arc::new(CatalogServiceInner { remote, cache }),
        }
    }

    /// The current catalog, fetched on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog is not cached and the fetch fails.
    #[instrument(skip(self))]
    pub async fn get(&self) -> Result<Arc<Catalog>, RemoteError> {
        if let Some(catalog) = self.inner.cache.get(&()).await {
            debug!("Cache hit for catalog");
            return Ok(catalog);
        }

        let products = self.inner.remote.fetch_catalog().await?;
        debug!(products = products.len(), "catalog loaded");
        let catalog = Arc::new(Catalog::new(products));
        self.inner.cache.insert((), Arc::clone(&catalog)).await;
        Ok(catalog)
    }

    /// Drop the cached catalog so the next read refetches it.
    pub async fn invalidate(&self) {
        self.inner.cache.invalidate(&()).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use tienda_core::{CurrencyCode, Price};

    use super::*;
    use crate::cart::memory::{MemoryRemoteStore, RemoteOp};

    fn product(id: i32, name: &str, category: Category) -> Product {
        Product {
            id: ProductId::new(id),
            name: name.to_string(),
            description: String::new(),
            price: Price::new(Decimal::from(10), CurrencyCode::USD),
            image: String::new(),
            category,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            product(1, "Mantenimiento de Computadoras", Category::Technology),
            product(2, "Clases de Programación", Category::Education),
            product(3, "Limpieza del Hogar", Category::Home),
            product(4, "Clases de Inglés", Category::Education),
        ])
    }

    fn ids(products: &[&Product]) -> Vec<i32> {
        products.iter().map(|p| p.id.as_i32()).collect()
    }

    #[test]
    fn test_filter_by_category() {
        let query = CatalogQuery::from_params(Some("educacion"), None).unwrap();
        assert_eq!(ids(&catalog().filter(&query)), vec![2, 4]);
    }

    #[test]
    fn test_categories_skips_empty_ones() {
        let catalog = Catalog::new(vec![
            product(1, "Clases de Guitarra", Category::Education),
            product(2, "Jardinería a Domicilio", Category::Home),
        ]);
        assert_eq!(
            catalog.categories(),
            vec![Category::Education, Category::Home]
        );
    }

    #[test]
    fn test_all_returns_everything() {
        let query = CatalogQuery::from_params(Some("all"), Some("  ")).unwrap();
        assert_eq!(ids(&catalog().filter(&query)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_search_overrides_category() {
        let query = CatalogQuery::from_params(Some("hogar"), Some("CLASES")).unwrap();
        assert_eq!(ids(&catalog().filter(&query)), vec![2, 4]);
    }

    #[test]
    fn test_search_without_match_is_empty() {
        let query = CatalogQuery::from_params(None, Some("jardinería")).unwrap();
        assert!(catalog().filter(&query).is_empty());
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        assert!(CatalogQuery::from_params(Some("jardin"), None).is_err());
    }

    #[tokio::test]
    async fn test_service_caches_catalog() {
        let remote = Arc::new(MemoryRemoteStore::new(catalog().products().to_vec()));
        let service = CatalogService::new(remote.clone(), Duration::from_secs(60));

        assert_eq!(service.get().await.unwrap().len(), 4);
        assert_eq!(service.get().await.unwrap().len(), 4);
        assert_eq!(remote.calls(), vec![RemoteOp::FetchCatalog]);

        service.invalidate().await;
        service.get().await.unwrap();
        assert_eq!(remote.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_service_surfaces_fetch_failure() {
        let remote = Arc::new(MemoryRemoteStore::new(Vec::new()));
        remote.fail(RemoteOp::FetchCatalog);
        let service = CatalogService::new(remote, Duration::from_secs(60));
        assert!(matches!(service.get().await, Err(RemoteError::Unavailable(_))));
    }
}
