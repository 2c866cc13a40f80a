//! list command

use anyhow::Result;
use armory_common::apt::installed_versions;
use armory_common::{
    Catalog, Category, ManifestOrigin, PipelineWarning, RepositorySource, UpdatePolicy,
};
use serde::Serialize;

use super::Context;

#[derive(Debug, Clone, Serialize)]
pub struct ToolListing {
    pub name: String,
    pub packages: Vec<String>,
    pub description: String,
    pub update_policy: UpdatePolicy,
    pub repository: RepositorySource,
    pub installed: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryListing {
    pub key: String,
    pub title: String,
    pub description: String,
    pub tools: Vec<ToolListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListReport {
    pub origin: ManifestOrigin,
    pub categories: Vec<CategoryListing>,
    #[serde(skip)]
    pub warnings: Vec<PipelineWarning>,
}

impl ListReport {
    pub fn tool_count(&self) -> usize {
        self.categories.iter().map(|c| c.tools.len()).sum()
    }
}

pub fn run(ctx: &Context, category: Option<&str>, only_installed: bool) -> Result<ListReport> {
    let pipeline = ctx.load_catalog()?;
    let catalog = &pipeline.catalog;

    let selected: Vec<&Category> = match category {
        Some(key) => vec![catalog.category(key)?],
        None => catalog.categories().iter().collect(),
    };

    let mut categories = Vec::with_capacity(selected.len());
    for category in selected {
        let listing = listing(ctx, catalog, category, only_installed)?;
        if only_installed && listing.tools.is_empty() {
            continue;
        }
        categories.push(listing);
    }

    Ok(ListReport {
        origin: pipeline.origin,
        categories,
        warnings: pipeline.warnings,
    })
}

fn listing(
    ctx: &Context,
    catalog: &Catalog,
    category: &Category,
    only_installed: bool,
) -> Result<CategoryListing> {
    let mut tools = Vec::new();
    for tool in catalog.tools_in(category) {
        let installed = installed_versions(ctx.package_manager.as_ref(), tool)?;
        if only_installed && installed.is_none() {
            continue;
        }
        tools.push(ToolListing {
            name: tool.name.clone(),
            packages: tool.packages.clone(),
            description: tool.description.clone(),
            update_policy: tool.update_policy(),
            repository: tool.repository,
            installed,
        });
    }

    Ok(CategoryListing {
        key: category.key.clone(),
        title: category.title.clone(),
        description: category.description.clone(),
        tools,
    })
}
