//! Paging
//!
//! Memoized, bidirectionally linked page collections over a page source,
//! in blocking and async flavors.

pub mod async_collection;
pub mod collection;
pub mod next_link;
pub mod page;

pub use async_collection::{AsyncPagedCollection, PageFetcher};
pub use collection::{PageSource, PagedCollection};
pub use next_link::NextLinkPageSource;
pub use page::{Page, PageVisit, FIRST_PAGE_KEY};
