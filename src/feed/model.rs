//! Wire types for the Discourse JSON endpoints.
use serde::Deserialize;

/// Response of `GET /categories.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoriesResp {
    pub category_list: CategoryList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryList {
    pub categories: Vec<CategoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
}

/// Response of `GET /tags.json`. Discourse uses the tag name as its `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResp {
    pub tags: Vec<TagEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub id: String,
}
