use crate::config::types::Config;
use crate::ConfigError;
use url::Url;

/// External tools invoked during a run, probed at startup.
const OPTIMIZER_BINARIES: &[&str] = &["jpegoptim", "pngquant", "advdef", "gifsicle", "file"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_wiki(config)?;
    validate_email(&config.contact.admin_email)?;
    validate_formats(config)?;
    validate_crawl(config)?;
    Ok(())
}

fn validate_wiki(config: &Config) -> Result<(), ConfigError> {
    let url = Url::parse(&config.wiki.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("wiki.url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "wiki.url must be http(s), got '{}'",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(
            "wiki.url has no host".to_string(),
        ));
    }

    if config.wiki.username.is_some() != config.wiki.password.is_some() {
        return Err(ConfigError::Validation(
            "wiki.username and wiki.password must be set together".to_string(),
        ));
    }

    if let Some(parsoid) = &config.wiki.parsoid_url {
        Url::parse(parsoid)
            .map_err(|e| ConfigError::InvalidUrl(format!("wiki.parsoid-url: {}", e)))?;
    }

    Ok(())
}

/// Validates the admin email address
///
/// The address goes into every request's User-Agent, so wikis can reach the
/// operator. The check covers the RFC-5322 shape that matters in practice:
/// exactly one `@`, a non-empty dot-free-at-the-edges local part, and a
/// dotted domain whose labels are all non-empty.
pub fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::InvalidEmail("empty address".to_string()));
    }

    if email.chars().any(|c| c.is_whitespace()) {
        return Err(ConfigError::InvalidEmail(format!(
            "'{}' contains whitespace",
            email
        )));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::InvalidEmail(format!(
            "'{}' must contain exactly one '@'",
            email
        )));
    }

    let (local, domain) = (parts[0], parts[1]);

    if local.is_empty() || local.starts_with('.') || local.ends_with('.') {
        return Err(ConfigError::InvalidEmail(format!(
            "'{}' has an invalid local part",
            email
        )));
    }

    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return Err(ConfigError::InvalidEmail(format!(
            "'{}' has an invalid domain",
            email
        )));
    }

    Ok(())
}

fn validate_formats(config: &Config) -> Result<(), ConfigError> {
    if config.archive.formats.is_empty() {
        return Err(ConfigError::Validation(
            "archive.formats cannot be empty".to_string(),
        ));
    }

    for spec in &config.archive.formats {
        if crate::naming::DumpVariant::parse(spec).is_none() {
            return Err(ConfigError::Validation(format!(
                "unknown archive format '{}' (expected a subset of nopic,nozim)",
                spec
            )));
        }
    }

    Ok(())
}

fn validate_crawl(config: &Config) -> Result<(), ConfigError> {
    if config.crawl.speed < 1 || config.crawl.speed > 100 {
        return Err(ConfigError::Validation(format!(
            "crawl.speed must be between 1 and 100, got {}",
            config.crawl.speed
        )));
    }

    if config.crawl.request_timeout < 1 {
        return Err(ConfigError::Validation(
            "crawl.request-timeout must be >= 1 second".to_string(),
        ));
    }

    if let Some(list) = &config.crawl.article_list {
        if !list.is_file() {
            return Err(ConfigError::Validation(format!(
                "crawl.article-list '{}' does not exist",
                list.display()
            )));
        }
    }

    Ok(())
}

/// Checks that every external binary the run will spawn is on PATH
///
/// `zimwriterfs` is only required when some variant actually builds an
/// archive; `convert` is always needed for the favicon.
pub fn ensure_binaries(config: &Config) -> Result<(), crate::WikimirError> {
    let mut required: Vec<&str> = vec!["convert"];

    let any_pics = config.variants().iter().any(|v| !v.nopic);
    if any_pics {
        required.extend_from_slice(OPTIMIZER_BINARIES);
    }

    let any_zim = config.variants().iter().any(|v| !v.nozim);
    if any_zim {
        required.push("zimwriterfs");
    }

    for binary in required {
        if !binary_on_path(binary) {
            return Err(crate::WikimirError::MissingBinary(binary.to_string()));
        }
    }

    Ok(())
}

fn binary_on_path(name: &str) -> bool {
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| {
        let candidate = dir.join(name);
        candidate.is_file()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        toml::from_str(
            r#"
            [wiki]
            url = "https://en.wikipedia.org/"

            [contact]
            admin-email = "ops@example.org"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_rejects_bad_wiki_url() {
        let mut config = base_config();
        config.wiki.url = "not a url".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_ftp_scheme() {
        let mut config = base_config();
        config.wiki.url = "ftp://en.wikipedia.org/".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_username_without_password() {
        let mut config = base_config();
        config.wiki.username = Some("bot".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_email_valid() {
        assert!(validate_email("ops@example.org").is_ok());
        assert!(validate_email("first.last+tag@sub.example.co.uk").is_ok());
    }

    #[test]
    fn test_email_missing_at() {
        assert!(validate_email("ops.example.org").is_err());
    }

    #[test]
    fn test_email_double_at() {
        assert!(validate_email("a@b@example.org").is_err());
    }

    #[test]
    fn test_email_empty_local() {
        assert!(validate_email("@example.org").is_err());
    }

    #[test]
    fn test_email_dotless_domain() {
        assert!(validate_email("ops@localhost").is_err());
    }

    #[test]
    fn test_email_empty_domain_label() {
        assert!(validate_email("ops@example..org").is_err());
    }

    #[test]
    fn test_email_whitespace() {
        assert!(validate_email("o ps@example.org").is_err());
    }

    #[test]
    fn test_rejects_unknown_format() {
        let mut config = base_config();
        config.archive.formats = vec!["novideo".to_string()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_empty_formats() {
        let mut config = base_config();
        config.archive.formats = vec![];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_speed() {
        let mut config = base_config();
        config.crawl.speed = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_missing_article_list() {
        let mut config = base_config();
        config.crawl.article_list = Some("/definitely/not/here.txt".into());
        assert!(validate(&config).is_err());
    }
}
