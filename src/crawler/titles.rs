//! Title enumeration and redirect discovery
//!
//! Two mutually exclusive modes fill the article-id map: a user-supplied
//! titles file, or enumeration of every content namespace through the
//! `allpages` generator. Each discovered title additionally gets a redirect
//! backlink lookup on its own bounded pool; the enumerator backs off when
//! that pool's backlog grows past [`REDIRECT_BACKLOG_LIMIT`].

use crate::crawler::context::{fatal_store_error, ArticleDetail, RunContext};
use crate::crawler::queue::WorkPool;
use crate::naming::canonical_title;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Pending redirect lookups beyond which the enumerator sleeps.
const REDIRECT_BACKLOG_LIMIT: usize = 30_000;

/// Titles per `titles=` batch; the action API caps at 50 for anonymous use.
const TITLE_BATCH: usize = 50;

/// Fills the article-id map and schedules redirect lookups
pub async fn enumerate_titles(ctx: &Arc<RunContext>, redirect_pool: &WorkPool) -> Result<()> {
    if let Some(list) = ctx.config.crawl.article_list.clone() {
        info!("enumerating titles from {}", list.display());
        enumerate_from_file(ctx, redirect_pool, &list).await?;
    } else {
        info!("enumerating titles by namespace");
        enumerate_namespaces(ctx, redirect_pool).await?;
    }

    ensure_main_page(ctx, redirect_pool).await?;

    let count = ctx.article_count();
    info!("{} articles enumerated", count);
    Ok(())
}

/// File mode: one title per line, resolved in batches
async fn enumerate_from_file(
    ctx: &Arc<RunContext>,
    redirect_pool: &WorkPool,
    list: &std::path::Path,
) -> Result<()> {
    let content = std::fs::read_to_string(list)?;
    let titles: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(canonical_title)
        .collect();

    for batch in titles.chunks(TITLE_BATCH) {
        let pages = ctx.api.page_details(&ctx.fetcher, batch).await?;
        for page in pages {
            record_page(ctx, redirect_pool, page).await;
        }
    }
    Ok(())
}

/// Namespace mode: paginate `allpages` over every content namespace
async fn enumerate_namespaces(ctx: &Arc<RunContext>, redirect_pool: &WorkPool) -> Result<()> {
    let mut namespaces: Vec<i32> = ctx
        .site
        .namespaces
        .values()
        .filter(|ns| ns.content)
        .map(|ns| ns.id)
        .collect();
    namespaces.sort_unstable();

    for namespace in namespaces {
        info!("enumerating namespace {}", namespace);
        let mut cursor: Option<String> = None;
        loop {
            let batch = ctx
                .api
                .all_pages(&ctx.fetcher, namespace, cursor.as_deref())
                .await?;
            for page in batch.pages {
                record_page(ctx, redirect_pool, page).await;
            }
            match batch.continue_from {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
    }
    Ok(())
}

/// Records one resolved page and schedules its redirect lookup
async fn record_page(
    ctx: &Arc<RunContext>,
    redirect_pool: &WorkPool,
    page: crate::crawler::api::PageInfo,
) {
    if page.missing {
        warn!("title reported missing, dropped: {}", page.title);
        return;
    }
    let Some(revision_id) = page.revision_id else {
        warn!("title has no revision, dropped: {}", page.title);
        return;
    };

    let detail = ArticleDetail {
        revision_id,
        timestamp: page.timestamp.unwrap_or_default(),
        coordinates: page.coordinates.clone(),
    };
    ctx.record_article(&page.title, detail);

    schedule_redirect_lookup(ctx, redirect_pool, page.title).await;
}

/// Enqueues a backlink lookup, sleeping while the pool is saturated
pub async fn schedule_redirect_lookup(
    ctx: &Arc<RunContext>,
    redirect_pool: &WorkPool,
    title: String,
) {
    let backlog = redirect_pool.len();
    if backlog > REDIRECT_BACKLOG_LIMIT {
        let pause = (backlog - REDIRECT_BACKLOG_LIMIT) as u64;
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }

    let ctx = Arc::clone(ctx);
    redirect_pool.push(async move {
        lookup_redirects(&ctx, &title).await;
    });
}

/// Resolves every redirect pointing at `title` into the redirects database
async fn lookup_redirects(ctx: &RunContext, title: &str) {
    let mut cursor: Option<String> = None;
    loop {
        let batch = match ctx
            .api
            .backlinks(&ctx.fetcher, title, cursor.as_deref())
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!("redirect lookup for {} failed: {}", title, e);
                return;
            }
        };

        if !batch.sources.is_empty() {
            let entries: Vec<(String, String)> = batch
                .sources
                .into_iter()
                .map(|src| (src, title.to_string()))
                .collect();
            if let Err(e) = ctx.store.hmset(&ctx.dbs.redirects(), &entries) {
                fatal_store_error(e);
            }
        }

        match batch.continue_from {
            Some(next) => cursor = Some(next),
            None => return,
        }
    }
}

/// Makes sure the main page is part of the mirror
///
/// Resolved from configuration or siteinfo; fetched explicitly when
/// enumeration did not discover it.
pub async fn ensure_main_page(ctx: &Arc<RunContext>, redirect_pool: &WorkPool) -> Result<()> {
    let title = ctx.main_page_title();
    if title.is_empty() {
        warn!("wiki reports no main page");
        return Ok(());
    }

    if ctx.has_article(&title) {
        return Ok(());
    }

    info!("fetching main page explicitly: {}", title);
    let pages = ctx
        .api
        .page_details(&ctx.fetcher, &[title.clone()])
        .await?;
    for page in pages {
        record_page(ctx, redirect_pool, page).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_file_normalization() {
        let content = "Main Page\r\nRust (programming language)\n\n  \nAC/DC\n";
        let titles: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(canonical_title)
            .collect();

        assert_eq!(
            titles,
            vec![
                "Main_Page".to_string(),
                "Rust_(programming_language)".to_string(),
                "AC/DC".to_string(),
            ]
        );
    }

    #[test]
    fn test_batching_boundary() {
        let titles: Vec<String> = (0..120).map(|i| format!("T{}", i)).collect();
        let batches: Vec<_> = titles.chunks(TITLE_BATCH).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 50);
        assert_eq!(batches[2].len(), 20);
    }
}
