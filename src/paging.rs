//! Exhaustive collection of paged API resources.
use crate::api::{ApiError, Cursor, Endpoint, Page, Provider};
use anyhow::Result;
use futures::stream::{self, Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Lazy stream over the pages of `start`, following each page's `next`
/// pointer until it is absent. Yields an error and stops at the first
/// failing page.
pub fn pages<'a>(
    provider: &'a dyn Provider,
    start: Endpoint,
    access_token: &'a str,
) -> impl Stream<Item = Result<Page<Value>>> + 'a {
    stream::try_unfold(Some(Cursor::Start(start)), move |cursor| async move {
        let Some(cursor) = cursor else {
            return Ok::<_, anyhow::Error>(None);
        };
        let page = provider.fetch_page(&cursor, access_token).await?;
        let next = page.next_cursor();
        Ok::<_, anyhow::Error>(Some((page, next)))
    })
}

/// Drain every page of `start` into one ordered list. Any page failure fails
/// the whole collection; no partial result is returned.
pub async fn collect_all<T: DeserializeOwned>(
    provider: &dyn Provider,
    start: Endpoint,
    access_token: &str,
) -> Result<Vec<T>> {
    let what = start.describe();
    let mut pages = Box::pin(pages(provider, start, access_token));
    let mut out = Vec::new();
    let mut page_count = 0usize;
    while let Some(page) = pages.try_next().await? {
        page_count += 1;
        out.reserve(page.items.len());
        for item in page.items {
            let v: T = serde_json::from_value(item).map_err(|source| ApiError::Decode { what, source })?;
            out.push(v);
        }
    }
    debug!("collected {} {} over {} pages", out.len(), what, page_count);
    Ok(out)
}

/// `total` reported by the first page, reading a single item.
pub async fn fetch_total(provider: &dyn Provider, start: Endpoint, access_token: &str) -> Result<u64> {
    let page = provider.fetch_page(&Cursor::Start(start), access_token).await?;
    Ok(page.total.unwrap_or(page.items.len() as u64))
}
