//! Next-link paging over an HTTP pipeline.
//!
//! Azure list operations return `{"value": [...], "nextLink": "..."}`, where
//! `nextLink` is the absolute URL of the following page.

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::core::{HttpMethod, HttpRequest};
use crate::error::{ConfigurationError, PipelineError, PipelineResult};
use crate::paging::{AsyncPagedCollection, Page};
use crate::pipeline::HttpPipeline;

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

/// Fetches list pages through a pipeline, following `nextLink`.
#[derive(Debug, Clone)]
pub struct NextLinkPageSource {
    pipeline: HttpPipeline,
    first_url: Url,
}

impl NextLinkPageSource {
    pub fn new(pipeline: HttpPipeline, first_url: Url) -> Self {
        Self {
            pipeline,
            first_url,
        }
    }

    pub fn first_url(&self) -> &Url {
        &self.first_url
    }

    /// Fetch one page. `None` fetches the first page; a 404 yields `Ok(None)`.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        page_id: Option<String>,
    ) -> PipelineResult<Option<Page<T>>> {
        let url = match page_id {
            None => self.first_url.clone(),
            Some(link) => self
                .first_url
                .join(&link)
                .map_err(|_| ConfigurationError::InvalidUrl { url: link })?,
        };

        debug!(path = url.path(), "fetching list page");
        let mut response = self.pipeline.send(HttpRequest::new(HttpMethod::Get, url)).await?;

        let status = response.status();
        if status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::UnexpectedStatus { status, body });
        }

        let list: ListResponse<T> = response.json().await?;
        let next = list.next_link.filter(|link| !link.is_empty());
        Ok(Some(Page::new(list.value, next)))
    }

    /// A memoizing collection over this source.
    pub fn into_collection<T>(self) -> AsyncPagedCollection<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let source = Arc::new(self);
        AsyncPagedCollection::new(move |page_id: Option<String>| {
            let source = Arc::clone(&source);
            async move { source.fetch(page_id).await }.boxed()
        })
    }
}
