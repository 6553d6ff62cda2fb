//! Output module for the mirror file tree
//!
//! This module handles:
//! - Writing rewritten article documents (optionally deflated)
//! - The redirect index and optional HTML redirect files
//! - Site chrome: directory skeleton, favicon, welcome page
//! - Handing the finished tree to the archive builder

mod redirects;
mod site;
mod zim;

pub use redirects::{write_html_redirects, write_redirect_index};
pub use site::{
    article_path, create_sub_dirs, extract_subtitle, save_favicon, save_main_page, write_article,
};
pub use zim::{build_zim, welcome_file, ZimJob};
