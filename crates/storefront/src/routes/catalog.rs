//! Catalog listing route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use tienda_core::{Category, Product};

use super::Layout;
use crate::catalog::CatalogQuery;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Query parameters for the listing page.
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    /// Category wire name, or `all`.
    pub category: Option<String>,
    /// Search term matched against product names.
    pub q: Option<String>,
}

/// Product card display data.
#[derive(Debug, Clone)]
pub struct ProductCardView {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub price: String,
    pub image: String,
    pub category: &'static str,
}

impl From<&Product> for ProductCardView {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.as_i32(),
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price.to_string(),
            image: product.image.clone(),
            category: product.category.label(),
        }
    }
}

/// Category filter button.
#[derive(Debug, Clone)]
pub struct CategoryButton {
    /// Query value; `all` for the reset button.
    pub value: &'static str,
    pub label: &'static str,
    pub active: bool,
}

fn category_buttons(available: &[Category], selected: Option<Category>) -> Vec<CategoryButton> {
    std::iter::once(CategoryButton {
        value: "all",
        label: "Todos",
        active: selected.is_none(),
    })
    .chain(available.iter().map(|&c| CategoryButton {
        value: c.as_str(),
        label: c.label(),
        active: selected == Some(c),
    }))
    .collect()
}

/// Catalog page template.
#[derive(Template, WebTemplate)]
#[template(path = "catalog/index.html")]
pub struct CatalogTemplate {
    pub layout: Layout,
    pub products: Vec<ProductCardView>,
    pub categories: Vec<CategoryButton>,
    pub search: String,
}

/// Display the catalog, optionally filtered.
///
/// A non-empty search term takes precedence over the category.
#[instrument(skip(state, session))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ListingQuery>,
) -> Result<impl IntoResponse> {
    let filter = CatalogQuery::from_params(query.category.as_deref(), query.q.as_deref())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let catalog = state.catalog().get().await?;

    let products = catalog
        .filter(&filter)
        .into_iter()
        .map(ProductCardView::from)
        .collect();

    Ok(CatalogTemplate {
        layout: Layout::for_session(&session).await,
        products,
        categories: category_buttons(&catalog.categories(), filter.category),
        search: filter.search_term().unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_buttons_mark_all_when_unfiltered() {
        let buttons = category_buttons(&Category::ALL, None);
        assert_eq!(buttons.len(), 4);
        assert!(buttons[0].active);
        assert!(buttons.iter().skip(1).all(|b| !b.active));
    }

    #[test]
    fn test_category_buttons_mark_selected() {
        let buttons = category_buttons(&Category::ALL, Some(Category::Home));
        let active: Vec<_> = buttons.iter().filter(|b| b.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].value, "hogar");
    }
}
