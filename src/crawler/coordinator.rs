//! Run coordinator - main mirror orchestration logic
//!
//! Phases execute strictly in order, each blocking until the previous one
//! has quiesced:
//!
//! login -> site info (incl. text direction) -> subtitle -> directories ->
//! cache preparation -> resume check -> title enumeration -> redirect
//! snapshot -> per-variant { sub-dirs -> favicon -> main page ->
//! [HTML redirects] -> articles -> drain downloads -> drain optimization ->
//! archive build -> tree cleanup } -> cache sweep -> store teardown

use crate::cache::DiskCache;
use crate::config::{ensure_binaries, Config};
use crate::crawler::api::ApiClient;
use crate::crawler::articles::{save_articles, ArticlePass};
use crate::crawler::context::RunContext;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::queue::WorkPool;
use crate::crawler::titles::enumerate_titles;
use crate::media::MediaDownloader;
use crate::naming::{
    creator_from_host, filename_radical, lang_suffix, DumpVariant,
};
use crate::output::{
    build_zim, create_sub_dirs, extract_subtitle, save_favicon, save_main_page,
    write_html_redirects, write_redirect_index, ZimJob,
};
use crate::store::{KvStore, RunDbs, SqliteKv};
use crate::{Result, WikimirError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Derived names and paths of one run
struct RunPlan {
    creator: String,
    lang: String,
    selection: String,
    /// Undated radical: directory names, cache scope
    radical: String,
    output_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl RunPlan {
    fn new(config: &Config) -> Result<Self> {
        let base = url::Url::parse(&config.wiki.url)?;
        let host = base
            .host_str()
            .ok_or_else(|| WikimirError::Api("wiki URL has no host".to_string()))?;

        let creator = config
            .archive
            .filename_prefix
            .clone()
            .unwrap_or_else(|| creator_from_host(host));
        let lang = lang_suffix(host);
        let selection = config
            .crawl
            .article_list
            .as_ref()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or("all")
            .to_string();

        let radical = filename_radical(
            &creator,
            &lang,
            Some(&selection),
            DumpVariant::default(),
            false,
        );

        Ok(Self {
            creator,
            lang,
            selection,
            radical,
            output_dir: config.output.directory.clone(),
            tmp_dir: config.output.tmp_directory.clone(),
        })
    }

    /// HTML root of a variant (undated, suffixed for nopic)
    fn html_root(&self, variant: DumpVariant) -> PathBuf {
        self.output_dir
            .join(format!("{}{}", self.radical, variant.name_suffix()))
    }

    /// Final archive path of a variant (dated)
    fn zim_path(&self, variant: DumpVariant) -> PathBuf {
        let dated = filename_radical(&self.creator, &self.lang, Some(&self.selection), variant, true);
        self.output_dir.join(format!("{}.zim", dated))
    }
}

/// Runs a complete mirror operation
///
/// # Example
///
/// ```no_run
/// use wikimir::config::load_config;
/// use wikimir::crawler::run_mirror;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// run_mirror(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_mirror(config: Config) -> Result<()> {
    // Startup requirements: missing tools abort before any network traffic.
    ensure_binaries(&config)?;

    let plan = RunPlan::new(&config)?;
    let fetcher = Arc::new(Fetcher::new(&config)?);
    let api = Arc::new(ApiClient::new(config.api_url(), config.rest_url()));

    // login
    if let (Some(username), Some(password)) = (&config.wiki.username, &config.wiki.password) {
        info!("logging in as {}", username);
        api.login(&fetcher, username, password, config.wiki.domain.as_deref())
            .await?;
    }

    // getTextDirection + getSiteInfo (one siteinfo query answers both)
    let site = api.site_info(&fetcher).await?;
    info!(
        "site: {} ({}), text direction {}",
        site.sitename.as_deref().unwrap_or("?"),
        site.lang.as_deref().unwrap_or(&plan.lang),
        if site.rtl { "rtl" } else { "ltr" }
    );

    // getSubTitle
    let subtitle = fetch_subtitle(&fetcher, &config).await;

    // createDirectories
    std::fs::create_dir_all(&plan.output_dir)?;
    std::fs::create_dir_all(&plan.tmp_dir)?;
    std::fs::create_dir_all(&config.output.cache_directory)?;

    // prepareCache
    let cache = DiskCache::new(config.output.cache_directory.join(&plan.radical));
    cache.prepare()?;

    // checkResume: decided before the coordination store exists, so a
    // fully-resumed run creates no databases at all.
    let mut variants = config.variants();
    if config.crawl.resume {
        variants.retain(|variant| {
            let path = plan.zim_path(*variant);
            let done = !variant.nozim && path.is_file();
            if done {
                info!("resume: {} already built, skipping", path.display());
            }
            !done
        });
        if variants.is_empty() {
            info!("resume: every archive already exists, nothing to do");
            return Ok(());
        }
    }

    // Coordination store, scoped to this run by a unique prefix.
    let state_path = config
        .output
        .state_db
        .clone()
        .unwrap_or_else(|| plan.tmp_dir.join("wikimir-state.sqlite3"));
    let store: Arc<SqliteKv> = Arc::new(SqliteKv::open(&state_path)?);
    let dbs = RunDbs::new(&format!("{}_{}_", plan.radical, std::process::id()));

    let store_dyn: Arc<dyn KvStore> = Arc::clone(&store) as Arc<dyn KvStore>;
    let ctx = Arc::new(RunContext::new(
        config,
        Arc::clone(&fetcher),
        api,
        store_dyn,
        dbs.clone(),
        cache.clone(),
        site,
    ));

    // getArticleIds: enumeration plus redirect discovery, fully drained
    // before anything downstream reads the id map.
    let speed = ctx.config.speed();
    let redirect_pool = WorkPool::new("redirect", speed * 3);
    enumerate_titles(&ctx, &redirect_pool).await?;
    redirect_pool.drain().await;

    // cacheRedirects: snapshot for later runs next to the page cache.
    snapshot_redirects(&ctx)?;

    for variant in variants {
        run_variant(&ctx, &plan, variant, &subtitle).await?;
    }

    // cleanCache
    if ctx.config.crawl.skip_cache_cleaning {
        info!("cache cleaning skipped by configuration");
    } else {
        let removed = ctx.cache.sweep()?;
        info!("cache sweep removed {} stale entries", removed);
    }

    // deleteKVDatabases
    store.del(&dbs.all())?;
    if store.total_fields()? == 0 {
        drop(store);
        for suffix in ["", "-wal", "-shm"] {
            let mut sidecar = state_path.as_os_str().to_os_string();
            sidecar.push(suffix);
            std::fs::remove_file(PathBuf::from(sidecar)).ok();
        }
    }

    // closeHTTPAgents: dropping the fetcher tears the connection pools down.
    drop(fetcher);

    info!("run complete");
    Ok(())
}

/// Builds one dump variant end to end
async fn run_variant(
    ctx: &Arc<RunContext>,
    plan: &RunPlan,
    variant: DumpVariant,
    subtitle: &Option<String>,
) -> Result<()> {
    info!("building variant {}", variant);
    let html_root = plan.html_root(variant);

    // createSubDirs
    std::fs::create_dir_all(&html_root)?;
    create_sub_dirs(&html_root)?;

    // saveFavicon
    save_favicon(ctx, &html_root).await?;

    // getMainPage
    save_main_page(ctx, &html_root)?;

    // saveHtmlRedirects
    if ctx.config.output.write_html_redirects {
        write_html_redirects(ctx.store.as_ref(), &ctx.dbs, &html_root)?;
    }

    // saveArticles
    let speed = ctx.config.speed();
    let article_pool = WorkPool::new("article", speed);
    let media_pool = WorkPool::new("media", speed * 5);
    let optimize_pool = WorkPool::new("optimize", num_cpus::get() * 2);

    let pass = Arc::new(ArticlePass {
        variant,
        html_root: html_root.clone(),
        mirror: Arc::new(ctx.mirror_index()),
        base_url: ctx.fetcher.base_url().clone(),
        article_path_prefix: ctx.config.article_path_prefix(),
    });
    let downloader = Arc::new(MediaDownloader::new(
        Arc::clone(&ctx.fetcher),
        ctx.cache.clone(),
        Arc::clone(&ctx.store),
        ctx.dbs.clone(),
        html_root.join("m"),
        optimize_pool.clone(),
    ));

    save_articles(ctx, &pass, &article_pool, &media_pool, &downloader)?;
    article_pool.drain().await;

    // drainDownloadQueue, then drainOptimizationQueue
    media_pool.drain().await;
    optimize_pool.drain().await;

    // buildZim
    if variant.nozim {
        info!("variant {} stops at the file tree (nozim)", variant);
        return Ok(());
    }

    let redirect_index = if ctx.config.output.write_html_redirects {
        None
    } else {
        let path = plan.tmp_dir.join(format!(
            "{}{}-redirects.idx",
            plan.radical,
            variant.name_suffix()
        ));
        write_redirect_index(ctx.store.as_ref(), &ctx.dbs, &path)?;
        Some(path)
    };

    let title = ctx
        .config
        .archive
        .custom_title
        .clone()
        .or_else(|| ctx.site.sitename.clone())
        .unwrap_or_else(|| plan.creator.clone());
    let description = ctx
        .config
        .archive
        .custom_description
        .clone()
        .or_else(|| subtitle.clone())
        .unwrap_or_else(|| title.clone());

    let zim_path = plan.zim_path(variant);
    let job = ZimJob {
        html_root: &html_root,
        zim_path: &zim_path,
        redirect_index: redirect_index.as_deref(),
        language: &plan.lang,
        title: &title,
        description: &description,
        creator: &plan.creator,
    };
    build_zim(ctx, &job).await?;

    // endProcess: the intermediate tree goes unless configured to stay.
    if !ctx.config.output.keep_html {
        std::fs::remove_dir_all(&html_root).ok();
    }

    Ok(())
}

/// Pulls the wiki's subtitle off its main page, best effort
async fn fetch_subtitle(fetcher: &Fetcher, config: &Config) -> Option<String> {
    let fetched = fetcher.fetch_or_empty(&config.wiki.url).await;
    if fetched.is_empty() {
        warn!("could not fetch wiki front page for the subtitle");
        return None;
    }
    let html = String::from_utf8_lossy(&fetched.body);
    extract_subtitle(&html)
}

/// Serializes the redirects database next to the cache for future runs
fn snapshot_redirects(ctx: &RunContext) -> Result<()> {
    let db = ctx.dbs.redirects();
    let mut map = serde_json::Map::new();
    for source in ctx.store.hkeys(&db)? {
        if let Some(target) = ctx.store.hget(&db, &source)? {
            map.insert(source, serde_json::Value::String(target));
        }
    }
    let path = ctx.cache.root().join("redirects.json");
    std::fs::write(&path, serde_json::to_vec(&serde_json::Value::Object(map))?)?;
    info!("redirect snapshot written to {}", path.display());
    Ok(())
}
