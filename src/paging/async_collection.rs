//! Async paged collection.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{PagingError, PipelineError, PipelineResult};
use crate::paging::page::{Page, PageCache, PageVisit, FIRST_PAGE_KEY};

/// Async page retrieval. `None` as input asks for the first page; `Ok(None)`
/// means the source has no such page.
pub type PageFetcher<T> =
    Box<dyn Fn(Option<String>) -> BoxFuture<'static, PipelineResult<Option<Page<T>>>> + Send + Sync>;

/// Memoizing collection over an async page fetcher.
///
/// A page, including its back-link, is fully stored before its
/// `next_page_id` is used for the following fetch.
pub struct AsyncPagedCollection<T> {
    fetcher: PageFetcher<T>,
    cache: PageCache<T>,
    cancellation: CancellationToken,
    fetch_count: usize,
}

impl<T> AsyncPagedCollection<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F>(fetcher: F) -> Self
    where
        F: Fn(Option<String>) -> BoxFuture<'static, PipelineResult<Option<Page<T>>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            fetcher: Box::new(fetcher),
            cache: PageCache::default(),
            cancellation: CancellationToken::new(),
            fetch_count: 0,
        }
    }

    /// Abort pending and future fetches when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub async fn get_first_page(&mut self) -> PipelineResult<Arc<Page<T>>> {
        match self.cache.get(FIRST_PAGE_KEY) {
            Some(page) => Ok(page),
            None => self.fetch(FIRST_PAGE_KEY, None).await,
        }
    }

    pub async fn get_page(&mut self, page_id: &str) -> PipelineResult<Arc<Page<T>>> {
        if page_id == FIRST_PAGE_KEY {
            return self.get_first_page().await;
        }
        match self.cache.get(page_id) {
            Some(page) => Ok(page),
            None => self.fetch(page_id, Some(page_id.to_string())).await,
        }
    }

    pub async fn get_next_page(&mut self, page: &Page<T>) -> PipelineResult<Option<Arc<Page<T>>>> {
        match page.next_page_id.as_deref() {
            Some(id) => self.get_page(id).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn get_previous_page(
        &mut self,
        page: &Page<T>,
    ) -> PipelineResult<Option<Arc<Page<T>>>> {
        match page.previous_page_id.as_deref() {
            Some(id) => self.get_page(id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Visit pages in order. The first fetch error or visitor error ends the
    /// enumeration and is returned; nothing further is fetched.
    pub async fn for_each_page<V, E>(&mut self, mut visitor: V) -> PipelineResult<()>
    where
        V: FnMut(&Page<T>) -> Result<PageVisit, E>,
        E: std::fmt::Display,
    {
        let mut page = self.get_first_page().await?;
        loop {
            let visit = visitor(&*page).map_err(|e| PagingError::Visitor {
                message: e.to_string(),
            })?;
            if visit == PageVisit::Stop {
                debug!(page_id = ?page.next_page_id, "enumeration stopped by visitor");
                return Ok(());
            }
            match self.get_next_page(&page).await? {
                Some(next) => page = next,
                None => return Ok(()),
            }
        }
    }

    /// Every item of every page, in order.
    pub async fn collect_all(&mut self) -> PipelineResult<Vec<T>> {
        let mut items = Vec::new();
        self.for_each_page(|page| {
            items.extend(page.items.iter().cloned());
            Ok::<_, PagingError>(PageVisit::Continue)
        })
        .await?;
        Ok(items)
    }

    /// Number of calls made to the fetcher.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count
    }

    pub fn cached_page_count(&self) -> usize {
        self.cache.len()
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    async fn fetch(&mut self, key: &str, page_id: Option<String>) -> PipelineResult<Arc<Page<T>>> {
        if self.cancellation.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        self.fetch_count += 1;
        debug!(page_id = key, fetch = self.fetch_count, "fetching page");

        let pending = (self.fetcher)(page_id);
        let fetched = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => return Err(PipelineError::Cancelled),
            result = pending => result?,
        };

        match fetched {
            Some(page) => Ok(self.cache.insert(key, page)),
            None => Err(PagingError::PageNotFound {
                page_id: key.to_string(),
            }
            .into()),
        }
    }
}

impl<T> std::fmt::Debug for AsyncPagedCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPagedCollection")
            .field("fetch_count", &self.fetch_count)
            .finish()
    }
}
