//! Door43 catalog lookups: which Bible books a repo release publishes.

use colored::*;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

use crate::books;
use crate::config::{Resource, CATALOG_REQUEST_TIMEOUT};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    ingredients: Vec<Ingredient>,
}

#[derive(Debug, Deserialize)]
struct Ingredient {
    #[serde(default)]
    identifier: Option<serde_json::Value>,
}

impl Ingredient {
    fn identifier(&self) -> Option<String> {
        match self.identifier.as_ref()? {
            serde_json::Value::String(s) => Some(s.to_lowercase()),
            other => Some(other.to_string().to_lowercase()),
        }
    }
}

/// Extracts the known book codes from a catalog entry document, in
/// ingredient order and without repeats. Non-book ingredients (front
/// matter, glossaries) are dropped.
pub fn parse_available_books(body: &[u8]) -> Result<Vec<&'static str>> {
    let entry: CatalogEntry = serde_json::from_slice(body)
        .map_err(|e| Error::CatalogUnavailable(format!("response was not valid JSON: {}", e)))?;

    let mut seen = HashSet::new();
    let available = entry
        .ingredients
        .iter()
        .filter_map(Ingredient::identifier)
        .filter_map(|id| books::lookup(&id).map(|b| b.code))
        .filter(|code| seen.insert(*code))
        .collect();

    Ok(available)
}

pub struct CatalogClient {
    base_url: String,
    http: reqwest::Client,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CATALOG_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::CatalogUnavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    pub fn entry_url(&self, resource: &Resource) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            resource.owner,
            resource.repo,
            resource.reference
        )
    }

    /// Ordered list of book codes in the catalog entry. An empty list means
    /// the resource has no books.
    pub async fn available_books(&self, resource: &Resource) -> Result<Vec<&'static str>> {
        let url = self.entry_url(resource);
        debug!("Fetching catalog metadata from {}", url.green());

        let response = self
            .http
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::CatalogUnavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::CatalogNotFound {
                owner: resource.owner.clone(),
                repo: resource.repo.clone(),
                reference: resource.reference.clone(),
            });
        }
        if !status.is_success() {
            return Err(Error::CatalogUnavailable(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::CatalogUnavailable(e.to_string()))?;

        let available = parse_available_books(&body)?;
        debug!("Catalog provides {} Bible book(s)", available.len());
        Ok(available)
    }
}
