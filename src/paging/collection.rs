//! Blocking paged collection.

use std::sync::Arc;
use tracing::debug;

use crate::error::{PagingError, PipelineResult};
use crate::paging::page::{Page, PageCache, PageVisit, FIRST_PAGE_KEY};

/// Blocking page retrieval. `None` as input asks for the first page; `None`
/// as output means the source has no such page.
pub trait PageSource<T> {
    fn fetch(&self, page_id: Option<&str>) -> PipelineResult<Option<Page<T>>>;
}

impl<T, F> PageSource<T> for F
where
    F: Fn(Option<&str>) -> PipelineResult<Option<Page<T>>>,
{
    fn fetch(&self, page_id: Option<&str>) -> PipelineResult<Option<Page<T>>> {
        self(page_id)
    }
}

/// Memoizing collection over a blocking [`PageSource`]. Each page id is
/// fetched at most once.
pub struct PagedCollection<T, S> {
    source: S,
    cache: PageCache<T>,
    fetch_count: usize,
}

impl<T, F> PagedCollection<T, F>
where
    T: Clone,
    F: Fn(Option<&str>) -> PipelineResult<Option<Page<T>>>,
{
    pub fn from_fn(fetch: F) -> Self {
        Self::new(fetch)
    }
}

impl<T: Clone, S: PageSource<T>> PagedCollection<T, S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: PageCache::default(),
            fetch_count: 0,
        }
    }

    pub fn get_first_page(&mut self) -> PipelineResult<Arc<Page<T>>> {
        match self.cache.get(FIRST_PAGE_KEY) {
            Some(page) => Ok(page),
            None => self.fetch(FIRST_PAGE_KEY, None),
        }
    }

    /// Get a page by id, fetching it only if it is not cached.
    pub fn get_page(&mut self, page_id: &str) -> PipelineResult<Arc<Page<T>>> {
        if page_id == FIRST_PAGE_KEY {
            return self.get_first_page();
        }
        match self.cache.get(page_id) {
            Some(page) => Ok(page),
            None => self.fetch(page_id, Some(page_id)),
        }
    }

    pub fn get_next_page(&mut self, page: &Page<T>) -> PipelineResult<Option<Arc<Page<T>>>> {
        page.next_page_id
            .as_deref()
            .map(|id| self.get_page(id))
            .transpose()
    }

    pub fn get_previous_page(&mut self, page: &Page<T>) -> PipelineResult<Option<Arc<Page<T>>>> {
        page.previous_page_id
            .as_deref()
            .map(|id| self.get_page(id))
            .transpose()
    }

    /// Visit pages in order until the visitor stops or the pages run out.
    pub fn for_each_page<V, E>(&mut self, mut visitor: V) -> PipelineResult<()>
    where
        V: FnMut(&Page<T>) -> Result<PageVisit, E>,
        E: std::fmt::Display,
    {
        let mut page = self.get_first_page()?;
        loop {
            let visit = visitor(&*page).map_err(|e| PagingError::Visitor {
                message: e.to_string(),
            })?;
            if visit == PageVisit::Stop {
                return Ok(());
            }
            match self.get_next_page(&page)? {
                Some(next) => page = next,
                None => return Ok(()),
            }
        }
    }

    /// Every item of every page, in order.
    pub fn collect_all(&mut self) -> PipelineResult<Vec<T>> {
        let mut items = Vec::new();
        self.for_each_page(|page| {
            items.extend(page.items.iter().cloned());
            Ok::<_, PagingError>(PageVisit::Continue)
        })?;
        Ok(items)
    }

    /// Number of calls made to the source.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count
    }

    pub fn cached_page_count(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cached page; later calls fetch again.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    fn fetch(&mut self, key: &str, page_id: Option<&str>) -> PipelineResult<Arc<Page<T>>> {
        self.fetch_count += 1;
        debug!(page_id = key, fetch = self.fetch_count, "fetching page");
        match self.source.fetch(page_id)? {
            Some(page) => Ok(self.cache.insert(key, page)),
            None => Err(PagingError::PageNotFound {
                page_id: key.to_string(),
            }
            .into()),
        }
    }
}
