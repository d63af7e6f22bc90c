//! Catalog product types.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// A product (service) offered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    /// Image URL shown on the listing card and in the cart.
    pub image: String,
    pub category: Category,
}

/// Catalog category used by the listing filter buttons.
///
/// Serialized with the storefront's wire names (`tecnologia`, `educacion`,
/// `hogar`), which are also the values stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "tecnologia")]
    Technology,
    #[serde(rename = "educacion")]
    Education,
    #[serde(rename = "hogar")]
    Home,
}

/// Error returned when a string is not a known category.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown category: {0}")]
pub struct CategoryError(pub String);

impl Category {
    /// Every category, in filter-button order.
    pub const ALL: [Self; 3] = [Self::Technology, Self::Education, Self::Home];

    /// Wire name of the category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Technology => "tecnologia",
            Self::Education => "educacion",
            Self::Home => "hogar",
        }
    }

    /// Human-readable label for filter buttons.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Technology => "Tecnología",
            Self::Education => "Educación",
            Self::Home => "Hogar",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| CategoryError(s.to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trips_through_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!("Hogar".parse::<Category>().unwrap(), Category::Home);
    }

    #[test]
    fn test_unknown_category() {
        let err = "all".parse::<Category>().unwrap_err();
        assert_eq!(err.to_string(), "unknown category: all");
    }

    #[test]
    fn test_category_serde_uses_wire_name() {
        let json = serde_json::to_string(&Category::Education).unwrap();
        assert_eq!(json, "\"educacion\"");
    }
}
