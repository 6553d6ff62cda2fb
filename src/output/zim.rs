//! Archive builder invocation
//!
//! The finished HTML tree is handed to `zimwriterfs`, which packs it into a
//! single content-addressed archive. wikimir never parses the archive; a
//! non-zero builder exit is fatal to the run.

use crate::crawler::RunContext;
use crate::naming::article_base;
use crate::{Result, WikimirError};
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Arguments for one archive build
pub struct ZimJob<'a> {
    /// Variant's HTML root (input tree)
    pub html_root: &'a Path,
    /// Final archive path
    pub zim_path: &'a Path,
    /// TAB-separated redirect index, unless HTML redirects were written
    pub redirect_index: Option<&'a Path>,
    /// ISO-639-2 language recorded in the archive metadata
    pub language: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub creator: &'a str,
}

/// Welcome file name inside the HTML root
///
/// The mirrored main page when one is configured, the generated index
/// otherwise.
pub fn welcome_file(ctx: &RunContext) -> String {
    match &ctx.config.archive.custom_main_page {
        Some(_) => format!("{}.html", article_base(&ctx.main_page_title())),
        None => "index.htm".to_string(),
    }
}

/// Builds the argv for `zimwriterfs`
fn builder_args(ctx: &RunContext, job: &ZimJob<'_>) -> Vec<String> {
    let mut args = vec![
        format!("--welcome={}", welcome_file(ctx)),
        "--favicon=favicon.png".to_string(),
        format!("--language={}", job.language),
        format!("--title={}", job.title),
        format!("--description={}", job.description),
        format!("--creator={}", job.creator),
        format!("--publisher={}", ctx.config.contact.publisher),
    ];

    if ctx.config.output.with_full_text_index {
        args.push("--withFullTextIndex".to_string());
    }
    if let Some(index) = job.redirect_index {
        args.push(format!("--redirects={}", index.display()));
    }

    args.push(job.html_root.display().to_string());
    args.push(job.zim_path.display().to_string());
    args
}

/// Runs the archive builder
pub async fn build_zim(ctx: &RunContext, job: &ZimJob<'_>) -> Result<()> {
    let args = builder_args(ctx, job);
    info!("invoking zimwriterfs for {}", job.zim_path.display());

    let output = Command::new("zimwriterfs").args(&args).output().await?;
    if !output.status.success() {
        tracing::error!(
            "zimwriterfs failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Err(WikimirError::ArchiveBuilder {
            status: output.status.code().unwrap_or(-1),
        });
    }

    info!("archive written to {}", job.zim_path.display());
    Ok(())
}
