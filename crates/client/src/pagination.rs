//! Paginated incremental loading of a list's items.
//!
//! Pages are fetched strictly in order and only on demand; the accumulated
//! result is the concatenation of all fetched pages. The page boundary rule
//! is authoritative: a page shorter than `page_size` is the last page, and
//! a full page always implies there may be more - even if the next page
//! turns out empty.

use std::sync::Arc;

use futures::future::BoxFuture;
use listly_core::{Item, ListId};
use tracing::debug;

use crate::cache::{CacheKey, CacheValue};
use crate::error::Result;
use crate::orchestrator::{Orchestrator, QueryOptions, QueryState};

/// Fetch for one zero-based page index. No side effects beyond the gateway.
pub type PageFetcher = Arc<dyn Fn(usize) -> BoxFuture<'static, Result<Vec<Item>>> + Send + Sync>;

/// Incrementally loaded item collection for one list.
///
/// Each page is cached under its own `items:{list}:{page}` key, so page
/// fetches coalesce and invalidate like any other read.
pub struct PaginatedQuery {
    orchestrator: Orchestrator,
    list_id: ListId,
    page_size: usize,
    fetch_page: PageFetcher,
    pages: Vec<Vec<Item>>,
    has_next_page: bool,
    last_error: Option<String>,
}

impl PaginatedQuery {
    /// Create a query that has fetched nothing yet.
    #[must_use]
    pub fn new(
        orchestrator: Orchestrator,
        list_id: ListId,
        page_size: usize,
        fetch_page: PageFetcher,
    ) -> Self {
        Self {
            orchestrator,
            list_id,
            page_size,
            fetch_page,
            pages: Vec::new(),
            // Nothing fetched; there may be data.
            has_next_page: true,
            last_error: None,
        }
    }

    /// Whether another page may exist.
    ///
    /// True iff the most recently fetched page was full (`== page_size`),
    /// or nothing has been fetched yet.
    #[must_use]
    pub const fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    /// Number of pages fetched so far.
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Message of the most recent page-fetch failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// All fetched items, in fetch order. No de-duplication across pages;
    /// callers rely on primary-key uniqueness.
    #[must_use]
    pub fn items(&self) -> Vec<Item> {
        self.pages.iter().flatten().cloned().collect()
    }

    /// Fetch the next page. Never speculative: each call fetches exactly
    /// one page, and only if the boundary rule says one may exist.
    ///
    /// Returns the number of items the page contributed (0 when the end was
    /// already reached or the fetch failed; check [`Self::last_error`]).
    pub async fn fetch_next_page(&mut self) -> usize {
        if !self.has_next_page {
            return 0;
        }

        let page = self.pages.len();
        let state = self.query_page(page).await;
        self.absorb(page, state)
    }

    /// Refetch every already-fetched page in order, e.g. after the list's
    /// item pages were invalidated. Recomputes the boundary from the last
    /// page seen.
    pub async fn refresh(&mut self) {
        let fetched = self.pages.len();
        self.pages.clear();
        self.has_next_page = true;
        for page in 0..fetched.max(1) {
            if !self.has_next_page {
                break;
            }
            let state = self.query_page(page).await;
            if self.absorb(page, state) == 0 && self.last_error.is_some() {
                break;
            }
        }
    }

    async fn query_page(&self, page: usize) -> QueryState {
        let key = CacheKey::Items {
            list: self.list_id,
            page,
        };
        let fetch_page = Arc::clone(&self.fetch_page);
        self.orchestrator
            .query(key, QueryOptions::default(), move || async move {
                fetch_page(page).await.map(CacheValue::Items)
            })
            .await
    }

    fn absorb(&mut self, page: usize, state: QueryState) -> usize {
        if let Some(error) = state.error {
            self.last_error = Some(error);
            return 0;
        }
        let Some(CacheValue::Items(items)) = state.value else {
            return 0;
        };
        self.last_error = None;

        // Short page <=> last page. Exactly page_size records always means
        // "there may be more", even if the next page turns out empty.
        self.has_next_page = items.len() == self.page_size;
        debug!(
            list = %self.list_id,
            page,
            count = items.len(),
            has_next = self.has_next_page,
            "Absorbed item page"
        );

        let count = items.len();
        if page < self.pages.len() {
            self.pages[page] = items;
        } else {
            self.pages.push(items);
        }
        count
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::cache::EntityCache;
    use listly_core::ItemId;

    fn item(list_id: ListId, n: usize) -> Item {
        Item {
            id: ItemId::generate(),
            list_id,
            name: format!("Item {n}"),
            quantity: 1,
            purchased: false,
            price: None,
            purchased_at: None,
            category_id: None,
            assigned_to: None,
            position: i32::try_from(n).unwrap_or(i32::MAX),
        }
    }

    /// Fetcher over a fixed dataset, slicing pages of `page_size`.
    fn fetcher_over(data: Vec<Item>, page_size: usize) -> PageFetcher {
        let data = Arc::new(data);
        Arc::new(move |page| {
            let data = Arc::clone(&data);
            Box::pin(async move {
                let start = (page * page_size).min(data.len());
                let end = (start + page_size).min(data.len());
                Ok(data[start..end].to_vec())
            })
        })
    }

    fn paginated(data: Vec<Item>, list_id: ListId, page_size: usize) -> PaginatedQuery {
        PaginatedQuery::new(
            Orchestrator::new(EntityCache::new()),
            list_id,
            page_size,
            fetcher_over(data, page_size),
        )
    }

    #[tokio::test]
    async fn test_short_page_means_no_next() {
        let list = ListId::generate();
        let data: Vec<Item> = (0..7).map(|n| item(list, n)).collect();
        let mut query = paginated(data, list, 5);

        assert_eq!(query.fetch_next_page().await, 5);
        assert!(query.has_next_page(), "full page implies more");

        assert_eq!(query.fetch_next_page().await, 2);
        assert!(!query.has_next_page(), "short page is the last page");

        // Further calls are no-ops.
        assert_eq!(query.fetch_next_page().await, 0);
        assert_eq!(query.page_count(), 2);
        assert_eq!(query.items().len(), 7);
    }

    #[tokio::test]
    async fn test_exact_boundary_reports_next_even_when_empty() {
        let list = ListId::generate();
        let data: Vec<Item> = (0..5).map(|n| item(list, n)).collect();
        let mut query = paginated(data, list, 5);

        assert_eq!(query.fetch_next_page().await, 5);
        assert!(
            query.has_next_page(),
            "exactly page_size records always implies there may be more"
        );

        assert_eq!(query.fetch_next_page().await, 0);
        assert!(!query.has_next_page(), "the empty page closes the boundary");
        assert_eq!(query.items().len(), 5);
    }

    #[tokio::test]
    async fn test_pages_accumulate_in_fetch_order() {
        let list = ListId::generate();
        let data: Vec<Item> = (0..6).map(|n| item(list, n)).collect();
        let expected: Vec<String> = data.iter().map(|i| i.name.clone()).collect();
        let mut query = paginated(data, list, 4);

        query.fetch_next_page().await;
        query.fetch_next_page().await;

        let names: Vec<String> = query.items().into_iter().map(|i| i.name).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_fetch_error_is_recorded_not_fatal() {
        let list = ListId::generate();
        let fetch_page: PageFetcher = Arc::new(|_| {
            Box::pin(async {
                Err(crate::error::SyncError::Api {
                    status: 500,
                    message: "down".into(),
                })
            })
        });
        let mut query =
            PaginatedQuery::new(Orchestrator::new(EntityCache::new()), list, 5, fetch_page);

        assert_eq!(query.fetch_next_page().await, 0);
        assert!(query.last_error().unwrap().contains("down"));
        assert!(query.has_next_page(), "boundary unchanged on failure");
    }
}
