//! Pagination driver: drains a cursor-paginated query into one result set.

use crate::error::{Result, SyncError};
use crate::types::{Cursor, Page};
use std::future::Future;
use tracing::debug;

/// Requests pages until the remote stops returning a continuation cursor.
///
/// `query` is called once per page with the cursor returned by the previous
/// page (`start` for the first call). Pages are requested strictly one after
/// another. The first failure is returned unchanged and no retry is made here.
///
/// # Arguments
///
/// * `query` - Issues one page request for the given cursor
/// * `start` - Cursor of the first page, `None` to start from the beginning
///
/// # Returns
///
/// All items of all pages, in page order.
pub async fn drain_all<T, F, Fut>(mut query: F, start: Option<Cursor>) -> Result<Vec<T>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor = start;
    let mut pages = 0usize;

    loop {
        let requested = cursor.clone();
        let page = query(cursor).await?;
        pages += 1;
        debug!(
            "Page {} returned {} items (more: {})",
            pages,
            page.data.len(),
            page.after.is_some()
        );
        items.extend(page.data);

        match page.after {
            Some(next) => {
                if requested.as_ref() == Some(&next) {
                    return Err(SyncError::Pagination(format!(
                        "cursor '{}' did not advance after page {}",
                        next, pages
                    )));
                }
                cursor = Some(next);
            }
            None => break,
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves `sizes.len()` pages of consecutive integers.
    fn paged(
        sizes: Vec<usize>,
        calls: Arc<AtomicUsize>,
    ) -> impl FnMut(Option<Cursor>) -> std::future::Ready<Result<Page<usize>>> {
        let mut offsets = vec![0usize];
        let mut total = 0;
        for size in &sizes {
            total += size;
            offsets.push(total);
        }
        move |cursor: Option<Cursor>| {
            calls.fetch_add(1, Ordering::SeqCst);
            let index: usize = cursor.map(|c| c.as_str().parse().unwrap()).unwrap_or(0);
            let data = (offsets[index]..offsets[index + 1]).collect();
            let after = (index + 1 < sizes.len()).then(|| Cursor::new((index + 1).to_string()));
            std::future::ready(Ok(Page { data, after }))
        }
    }

    #[tokio::test]
    async fn drains_every_page_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sizes = vec![3, 0, 5, 2];
        let items = drain_all(paged(sizes.clone(), calls.clone()), None)
            .await
            .unwrap();

        assert_eq!(items.len(), sizes.iter().sum::<usize>());
        assert_eq!(items, (0..10).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), sizes.len());
    }

    #[tokio::test]
    async fn empty_first_page_makes_one_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let items = drain_all(paged(vec![0], calls.clone()), None).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn starts_from_given_cursor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let items = drain_all(paged(vec![2, 2, 1], calls.clone()), Some(Cursor::new("1")))
            .await
            .unwrap();
        assert_eq!(items, vec![2, 3, 4]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn propagates_failure_without_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<Vec<u8>> = drain_all(
            move |cursor: Option<Cursor>| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(Page {
                            data: vec![1],
                            after: Some(Cursor::new("next")),
                        })
                    } else {
                        assert_eq!(cursor, Some(Cursor::new("next")));
                        Err(SyncError::transient("posts", "timeout"))
                    }
                }
            },
            None,
        )
        .await;

        assert!(matches!(result, Err(SyncError::TransientFetch { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stuck_cursor_is_an_error() {
        let result: Result<Vec<u8>> = drain_all(
            |_cursor: Option<Cursor>| async {
                Ok(Page {
                    data: vec![],
                    after: Some(Cursor::new("same")),
                })
            },
            Some(Cursor::new("same")),
        )
        .await;
        assert!(matches!(result, Err(SyncError::Pagination(_))));
    }
}
