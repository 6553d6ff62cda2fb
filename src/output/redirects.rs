//! Redirect output
//!
//! Redirects collected during the crawl are either serialized into the
//! TAB-separated index the archive builder consumes, or materialized as
//! small meta-refresh HTML files when `write-html-redirects` is on.

use crate::naming::{article_base, encode_for_href, title_with_spaces};
use crate::store::{KvStore, RunDbs};
use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Writes the redirect index for the archive builder
///
/// One line per redirect: `A<TAB>srcBase<TAB>src title<TAB>dstBase`.
/// Returns the number of lines written.
pub fn write_redirect_index(
    store: &dyn KvStore,
    dbs: &RunDbs,
    path: &Path,
) -> Result<usize> {
    let db = dbs.redirects();
    let sources = store.hkeys(&db)?;

    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    let mut written = 0;
    for source in sources {
        let Some(target) = store.hget(&db, &source)? else {
            continue;
        };
        writeln!(
            out,
            "A\t{}\t{}\t{}",
            article_base(&source),
            title_with_spaces(&source),
            article_base(&target)
        )?;
        written += 1;
    }
    out.flush()?;

    info!("redirect index: {} entries at {}", written, path.display());
    Ok(written)
}

/// Writes one meta-refresh HTML file per redirect source
pub fn write_html_redirects(
    store: &dyn KvStore,
    dbs: &RunDbs,
    html_root: &Path,
) -> Result<usize> {
    let db = dbs.redirects();
    let sources = store.hkeys(&db)?;

    let mut written = 0;
    for source in sources {
        let Some(target) = store.hget(&db, &source)? else {
            continue;
        };
        let body = redirect_page(&source, &target);
        let path = html_root.join(format!("{}.html", article_base(&source)));
        std::fs::write(path, body)?;
        written += 1;
    }

    info!("{} HTML redirect files written", written);
    Ok(written)
}

/// The page content for one HTML redirect
fn redirect_page(source: &str, target: &str) -> String {
    format!(
        "<html><head><meta charset=\"UTF-8\" /><title>{}</title>\
         <meta http-equiv=\"refresh\" content=\"0; URL={}.html\" /></head>\
         <body></body></html>\n",
        title_with_spaces(source),
        encode_for_href(&article_base(target))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteKv;
    use tempfile::TempDir;

    fn seeded_store() -> (std::sync::Arc<SqliteKv>, RunDbs) {
        let store = std::sync::Arc::new(SqliteKv::open_in_memory().unwrap());
        let dbs = RunDbs::new("test_");
        store
            .hset(&dbs.redirects(), "Paris,_France", "Paris")
            .unwrap();
        store
            .hset(&dbs.redirects(), "City_of_Light", "Paris")
            .unwrap();
        (store, dbs)
    }

    #[test]
    fn test_index_format() {
        let (store, dbs) = seeded_store();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("redirects.idx");

        let written = write_redirect_index(store.as_ref(), &dbs, &path).unwrap();
        assert_eq!(written, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        let first = lines.next().unwrap();
        let fields: Vec<&str> = first.split('\t').collect();

        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], "A");
        assert_eq!(fields[1], "City_of_Light");
        assert_eq!(fields[2], "City of Light");
        assert_eq!(fields[3], "Paris");
    }

    #[test]
    fn test_index_empty_store() {
        let store = std::sync::Arc::new(SqliteKv::open_in_memory().unwrap());
        let dbs = RunDbs::new("test_");
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("redirects.idx");

        let written = write_redirect_index(store.as_ref(), &dbs, &path).unwrap();
        assert_eq!(written, 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_html_redirects_written() {
        let (store, dbs) = seeded_store();
        let dir = TempDir::new().unwrap();

        let written = write_html_redirects(store.as_ref(), &dbs, dir.path()).unwrap();
        assert_eq!(written, 2);

        let page =
            std::fs::read_to_string(dir.path().join("Paris%2C_France.html")).unwrap();
        assert!(page.contains("http-equiv=\"refresh\""));
        assert!(page.contains("URL=Paris.html"));
        assert!(page.contains("<title>Paris, France</title>"));
    }
}
