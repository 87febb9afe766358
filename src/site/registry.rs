//! Site registry
//!
//! Maps canonical conference URLs to their [`Site`] entries. Entries are
//! created on demand and never evicted, so memory grows with the number of
//! distinct conferences seen during the process lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

use super::cache::Site;
use super::config::SiteConfig;
use crate::error::{Error, Result};
use crate::fetcher::StatusSource;

/// Registry of all known sites
pub struct SiteRegistry {
    /// Canonical URL -> site. The lock covers map access only and is always
    /// released before any site lock is taken.
    sites: Mutex<HashMap<String, Arc<Site>>>,

    /// Status source handed to new sites
    source: Arc<dyn StatusSource>,

    /// Timing configuration handed to new sites
    config: SiteConfig,
}

impl SiteRegistry {
    /// Create a new registry
    pub fn new(source: Arc<dyn StatusSource>, config: SiteConfig) -> Self {
        Self {
            sites: Mutex::new(HashMap::new()),
            source,
            config,
        }
    }

    /// Canonicalize a conference URL
    ///
    /// The URL must be an absolute `http` or `https` URL. When it has no
    /// host, `fallback_host` (usually the request's `Host` header) is used.
    /// The host is lower-cased and the path always ends with `/`.
    pub fn canonical_url(conference: &str, fallback_host: Option<&str>) -> Result<String> {
        if conference.is_empty() {
            return Err(Error::MissingConference);
        }

        let bad = || Error::BadConference(conference.to_string());
        let fallback_host = fallback_host.filter(|h| !h.is_empty());

        let parsed = match split_hostless(conference) {
            Some((scheme, path)) => {
                let host = fallback_host.ok_or_else(bad)?;
                Url::parse(&format!("{scheme}://{host}/{path}"))
            }
            None => Url::parse(conference),
        };
        let mut url = parsed.map_err(|_| bad())?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(bad());
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_ascii_lowercase(),
            _ => return Err(bad()),
        };
        url.set_host(Some(&host)).map_err(|_| bad())?;

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(url.to_string())
    }

    /// Find the site for `conference`, creating it when `create` is set
    ///
    /// Returns `Ok(None)` only when the site does not exist and `create` is
    /// false. Fails with `MissingConference`/`BadConference` on bad input.
    pub fn lookup(
        &self,
        conference: &str,
        fallback_host: Option<&str>,
        create: bool,
    ) -> Result<Option<Arc<Site>>> {
        let url = Self::canonical_url(conference, fallback_host)?;

        let site = {
            let mut sites = self.sites();
            match sites.get(&url) {
                Some(site) => Some(Arc::clone(site)),
                None if create => {
                    tracing::info!(site = %url, "Registering site");
                    let site = Site::new(url.clone(), self.config.clone(), Arc::clone(&self.source));
                    sites.insert(url, Arc::clone(&site));
                    Some(site)
                }
                None => None,
            }
        };

        if let Some(site) = &site {
            site.touch();
        }
        Ok(site)
    }

    /// Find or create the site for `conference`
    pub fn site(&self, conference: &str, fallback_host: Option<&str>) -> Result<Arc<Site>> {
        self.lookup(conference, fallback_host, true)?
            .ok_or_else(|| Error::BadConference(conference.to_string()))
    }

    /// Find an existing site without registering a new one
    pub fn get(&self, conference: &str, fallback_host: Option<&str>) -> Result<Option<Arc<Site>>> {
        self.lookup(conference, fallback_host, false)
    }

    /// Number of registered sites
    pub fn len(&self) -> usize {
        self.sites().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites().is_empty()
    }

    /// Canonical URLs of all registered sites
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.sites().keys().cloned().collect();
        urls.sort();
        urls
    }

    fn sites(&self) -> MutexGuard<'_, HashMap<String, Arc<Site>>> {
        self.sites.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Split an http(s) URL with an empty authority into scheme and path
///
/// `http:`, `http:/a`, `http://` and `http:///a` all lack a host. The url
/// crate would otherwise promote the first path segment to the host.
fn split_hostless(conference: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = conference.split_once(':')?;
    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return None;
    }

    let hostless = match rest.strip_prefix("//") {
        Some(after) => after.is_empty() || after.starts_with(['/', '?', '#']),
        None => true,
    };
    hostless.then(|| (scheme, rest.trim_start_matches('/')))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;
    use crate::models::TrackerStatus;
    use async_trait::async_trait;

    struct NoSource;

    #[async_trait]
    impl StatusSource for NoSource {
        async fn fetch_status(&self, _site_url: &str) -> std::result::Result<TrackerStatus, FetchError> {
            Err(FetchError::Remote("unreachable".into()))
        }
    }

    fn registry() -> SiteRegistry {
        SiteRegistry::new(Arc::new(NoSource), SiteConfig::default())
    }

    #[test]
    fn test_canonical_url_adds_trailing_slash() {
        assert_eq!(
            SiteRegistry::canonical_url("https://conf.example.org/2024", None).unwrap(),
            "https://conf.example.org/2024/"
        );
        assert_eq!(
            SiteRegistry::canonical_url("https://conf.example.org", None).unwrap(),
            "https://conf.example.org/"
        );
    }

    #[test]
    fn test_canonical_url_lowercases_host() {
        assert_eq!(
            SiteRegistry::canonical_url("http://Conf.EXAMPLE.org/a/", None).unwrap(),
            "http://conf.example.org/a/"
        );
    }

    #[test]
    fn test_canonical_url_uses_fallback_host() {
        assert_eq!(
            SiteRegistry::canonical_url("http://", Some("Relay.example.org")).unwrap(),
            "http://relay.example.org/"
        );
        assert!(matches!(
            SiteRegistry::canonical_url("http://", None),
            Err(Error::BadConference(_))
        ));
    }

    #[test]
    fn test_canonical_url_fallback_keeps_path() {
        for conference in ["http:///conf/2024", "http:/conf/2024", "http:conf/2024"] {
            assert_eq!(
                SiteRegistry::canonical_url(conference, Some("relay.example.org")).unwrap(),
                "http://relay.example.org/conf/2024/",
                "{conference}"
            );
        }
        assert_eq!(
            SiteRegistry::canonical_url("HTTPS:///a/?x=1", Some("relay.example.org")).unwrap(),
            "https://relay.example.org/a/?x=1"
        );
        assert!(matches!(
            SiteRegistry::canonical_url("http:///conf/2024", None),
            Err(Error::BadConference(_))
        ));
    }

    #[test]
    fn test_split_hostless() {
        assert_eq!(split_hostless("http://"), Some(("http", "")));
        assert_eq!(split_hostless("http:///conf"), Some(("http", "conf")));
        assert_eq!(split_hostless("http://conf.example.org/"), None);
        assert_eq!(split_hostless("mailto:chair@example.org"), None);
        assert_eq!(split_hostless("conf/2024"), None);
    }

    #[test]
    fn test_canonical_url_rejects_bad_input() {
        assert!(matches!(
            SiteRegistry::canonical_url("", None),
            Err(Error::MissingConference)
        ));
        assert!(matches!(
            SiteRegistry::canonical_url("ftp://example.org/", None),
            Err(Error::BadConference(_))
        ));
        assert!(matches!(
            SiteRegistry::canonical_url("conf/2024", None),
            Err(Error::BadConference(_))
        ));
        assert!(matches!(
            SiteRegistry::canonical_url("mailto:chair@example.org", Some("example.org")),
            Err(Error::BadConference(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_creates_once() {
        let registry = registry();

        let first = registry
            .lookup("https://conf.example.org/2024", None, true)
            .unwrap()
            .unwrap();
        let second = registry
            .lookup("https://CONF.example.org/2024/", None, true)
            .unwrap()
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.url(), "https://conf.example.org/2024/");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_without_create() {
        let registry = registry();

        let missing = registry
            .lookup("https://conf.example.org/", None, false)
            .unwrap();
        assert!(missing.is_none());
        assert!(registry.is_empty());

        registry.site("https://conf.example.org/", None).unwrap();
        let found = registry.get("https://conf.example.org", None).unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_lookup_touches_site() {
        let registry = registry();
        let site = registry.site("https://conf.example.org/", None).unwrap();
        let first_access = site.accessed_at();

        std::thread::sleep(std::time::Duration::from_millis(5));
        registry.site("https://conf.example.org/", None).unwrap();

        assert!(site.accessed_at() > first_access);
        assert!(site.accessed_at() >= site.created_at());
    }

    #[tokio::test]
    async fn test_urls_sorted() {
        let registry = registry();
        registry.site("https://b.example.org/", None).unwrap();
        registry.site("https://a.example.org/", None).unwrap();

        assert_eq!(
            registry.urls(),
            vec!["https://a.example.org/", "https://b.example.org/"]
        );
    }
}
