//! Page type and the page cache shared by both collections.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Cache key of the first page. [`get_page`](crate::paging::PagedCollection::get_page)
/// routes it to the first page, so it may appear as a `previous_page_id`.
pub const FIRST_PAGE_KEY: &str = "$first";

/// A single page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items in this page.
    pub items: Vec<T>,
    /// Continuation id of the following page.
    pub next_page_id: Option<String>,
    /// Id of the preceding page. Set by the collection when it learns which
    /// page links here, unless the source already set it.
    pub previous_page_id: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_page_id: Option<String>) -> Self {
        Self {
            items,
            next_page_id,
            previous_page_id: None,
        }
    }

    /// A page with no successor.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    pub fn with_previous_page_id(mut self, previous_page_id: impl Into<String>) -> Self {
        self.previous_page_id = Some(previous_page_id.into());
        self
    }

    pub fn has_next(&self) -> bool {
        self.next_page_id.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.previous_page_id.is_some()
    }

    pub fn next_page_id(&self) -> Option<&str> {
        self.next_page_id.as_deref()
    }

    pub fn previous_page_id(&self) -> Option<&str> {
        self.previous_page_id.as_deref()
    }

    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Maps the items in this page, keeping its links.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_page_id: self.next_page_id,
            previous_page_id: self.previous_page_id,
        }
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Page<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Visitor verdict during page enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageVisit {
    Continue,
    Stop,
}

/// Memoized pages plus the back-link bookkeeping between them.
///
/// Once both neighbors are cached, `a.next_page_id == Some(b)` implies
/// `b.previous_page_id == Some(a)` unless the source set it otherwise.
#[derive(Debug)]
pub(crate) struct PageCache<T> {
    pages: HashMap<String, Arc<Page<T>>>,
    /// Page id to the id of the page whose `next_page_id` points at it.
    back_links: HashMap<String, String>,
}

impl<T> Default for PageCache<T> {
    fn default() -> Self {
        Self {
            pages: HashMap::new(),
            back_links: HashMap::new(),
        }
    }
}

impl<T: Clone> PageCache<T> {
    pub(crate) fn get(&self, page_id: &str) -> Option<Arc<Page<T>>> {
        self.pages.get(page_id).cloned()
    }

    pub(crate) fn insert(&mut self, page_id: &str, mut page: Page<T>) -> Arc<Page<T>> {
        if page.previous_page_id.is_none() {
            if let Some(previous) = self.back_links.get(page_id) {
                trace!(page_id, previous = %previous, "back-linking page");
                page.previous_page_id = Some(previous.clone());
            }
        }

        if let Some(next) = &page.next_page_id {
            self.back_links.insert(next.clone(), page_id.to_string());
            if let Some(cached_next) = self.pages.get_mut(next) {
                if cached_next.previous_page_id.is_none() {
                    Arc::make_mut(cached_next).previous_page_id = Some(page_id.to_string());
                }
            }
        }

        let page = Arc::new(page);
        self.pages.insert(page_id.to_string(), Arc::clone(&page));
        page
    }

    pub(crate) fn len(&self) -> usize {
        self.pages.len()
    }

    pub(crate) fn clear(&mut self) {
        self.pages.clear();
        self.back_links.clear();
    }
}
