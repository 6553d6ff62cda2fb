//! Article fetch/rewrite stage (the `saveArticles` phase)
//!
//! Every enumerated title is pushed through the article pool: fetch the
//! rendered mobile-sections document (through the page cache unless
//! disabled), rewrite it, write the result under the variant's HTML root,
//! and feed the referenced media to the download pool. Titles whose API
//! response has no `lead` are logged and dropped from the id map; the run
//! continues without them.

use crate::crawler::context::RunContext;
use crate::crawler::queue::WorkPool;
use crate::media::MediaDownloader;
use crate::naming::DumpVariant;
use crate::output::write_article;
use crate::rewrite::{rewrite_article, MirrorIndex, RewriteContext};
use crate::Result;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};
use url::Url;

/// Fixed parameters of one variant's article pass
pub struct ArticlePass {
    pub variant: DumpVariant,
    pub html_root: PathBuf,
    pub mirror: Arc<MirrorIndex>,
    pub base_url: Url,
    pub article_path_prefix: String,
}

/// Enqueues every enumerated article onto the pool
pub fn save_articles(
    ctx: &Arc<RunContext>,
    pass: &Arc<ArticlePass>,
    article_pool: &WorkPool,
    media_pool: &WorkPool,
    downloader: &Arc<MediaDownloader>,
) -> Result<()> {
    let titles = ctx.article_titles();
    info!(
        "saving {} articles for variant {}",
        titles.len(),
        pass.variant
    );

    for title in titles {
        let ctx = Arc::clone(ctx);
        let pass = Arc::clone(pass);
        let media_pool = media_pool.clone();
        let downloader = Arc::clone(downloader);

        article_pool.push(async move {
            save_one(&ctx, &pass, &media_pool, &downloader, &title).await;
        });
    }

    Ok(())
}

async fn save_one(
    ctx: &Arc<RunContext>,
    pass: &ArticlePass,
    media_pool: &WorkPool,
    downloader: &Arc<MediaDownloader>,
    title: &str,
) {
    let url = ctx.api.mobile_sections_url(title);

    let body = match fetch_page_body(ctx, &url).await {
        Some(body) => body,
        None => {
            error!("no content for {}, dropped", title);
            ctx.drop_article(title);
            return;
        }
    };

    let mut doc: Value = match serde_json::from_slice(&body) {
        Ok(doc) => doc,
        Err(e) => {
            error!("unparseable document for {}: {}, dropped", title, e);
            ctx.drop_article(title);
            return;
        }
    };

    if doc.get("lead").is_none() {
        error!("document for {} has no lead, dropped", title);
        ctx.drop_article(title);
        return;
    }

    let rewrite_ctx = RewriteContext {
        nopic: pass.variant.nopic,
        keep_empty_paragraphs: ctx.config.crawl.keep_empty_paragraphs,
        article_path_prefix: &pass.article_path_prefix,
        base_url: &pass.base_url,
        mirror: &pass.mirror,
    };
    let outcome = rewrite_article(&mut doc, &rewrite_ctx);

    for media_url in outcome.media_urls {
        let downloader = Arc::clone(downloader);
        media_pool.push(async move {
            downloader.process(&media_url).await;
        });
    }

    match write_article(
        &pass.html_root,
        title,
        &doc,
        ctx.config.output.deflate_tmp_html,
        ctx.config.output.minify_html,
    ) {
        Ok(path) => debug!("wrote {}", path.display()),
        Err(e) => error!("failed to write {}: {}", title, e),
    }
}

/// Fetches a page body, going through the disk cache unless disabled
async fn fetch_page_body(ctx: &RunContext, url: &str) -> Option<Vec<u8>> {
    let use_cache = !ctx.config.crawl.skip_html_cache;
    let cache_path = ctx.cache.page_path(url);

    if use_cache {
        match ctx.cache.lookup(&cache_path) {
            Ok(Some((body, _headers))) => {
                debug!("page cache hit for {}", url);
                return Some(body);
            }
            Ok(None) => {}
            Err(e) => debug!("page cache lookup failed for {}: {}", url, e),
        }
    }

    let fetched = ctx.fetcher.fetch_or_empty(url).await;
    if fetched.is_empty() {
        return None;
    }

    if use_cache {
        if let Err(e) = ctx
            .cache
            .store(&cache_path, &fetched.body, &fetched.headers)
        {
            debug!("page cache store failed for {}: {}", url, e);
        }
    }

    Some(fetched.body)
}
