use crate::error::Error;
use regex::Regex;
use url::Url;

/// Scope rules the fetch engine applies before requesting a URL.
///
/// The entry URL's host is always in scope; additional hosts come from
/// configuration. Exclude patterns take precedence over include patterns.
#[derive(Debug)]
pub struct UrlFilter {
    allowed_hosts: Vec<String>,
    include_regexes: Vec<Regex>,
    exclude_regexes: Vec<Regex>,
}

/// Asset extensions that are never worth fetching for action discovery.
const DEFAULT_EXCLUDES: &str =
    r"\.(jpg|jpeg|png|gif|css|js|ico|woff|woff2|ttf|eot|svg|pdf)$";

impl UrlFilter {
    /// Build a filter scoped to `entry`'s host plus `extra_hosts`.
    pub fn new(
        entry: &Url,
        extra_hosts: &[String],
        include_patterns: &[String],
        exclude_patterns: &[String],
    ) -> Result<Self, Error> {
        let mut allowed_hosts: Vec<String> = extra_hosts.to_vec();
        if let Some(host) = entry.host_str() {
            if !allowed_hosts.iter().any(|h| h == host) {
                allowed_hosts.push(host.to_string());
            }
        }

        let mut include_regexes = Vec::with_capacity(include_patterns.len());
        for pattern in include_patterns {
            include_regexes.push(Regex::new(pattern)?);
        }

        let mut exclude_regexes = vec![Regex::new(DEFAULT_EXCLUDES)?];
        for pattern in exclude_patterns {
            exclude_regexes.push(Regex::new(pattern)?);
        }

        Ok(Self {
            allowed_hosts,
            include_regexes,
            exclude_regexes,
        })
    }

    /// Whether the engine should fetch this URL at all.
    pub fn should_fetch(&self, url: &Url) -> bool {
        if !self.is_allowed_host(url) {
            return false;
        }

        let url_str = url.as_str();
        if self.exclude_regexes.iter().any(|r| r.is_match(url_str)) {
            return false;
        }

        if !self.include_regexes.is_empty()
            && !self.include_regexes.iter().any(|r| r.is_match(url_str))
        {
            return false;
        }

        true
    }

    fn is_allowed_host(&self, url: &Url) -> bool {
        match url.host_str() {
            Some(host) => self.allowed_hosts.iter().any(|h| h == host),
            None => false,
        }
    }

    /// Strip the fragment so `#`-variants of a page are one frontier entry.
    pub fn normalize(&self, url: &Url) -> Url {
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> Url {
        Url::parse("https://example.com/app/").unwrap()
    }

    #[test]
    fn entry_host_is_always_in_scope() {
        let filter = UrlFilter::new(&entry(), &[], &[], &[]).unwrap();
        let same_host = Url::parse("https://example.com/other").unwrap();
        let elsewhere = Url::parse("https://other.com/page").unwrap();
        assert!(filter.should_fetch(&same_host));
        assert!(!filter.should_fetch(&elsewhere));
    }

    #[test]
    fn extra_hosts_extend_the_allow_list() {
        let filter =
            UrlFilter::new(&entry(), &["cdn.example.com".to_string()], &[], &[]).unwrap();
        let extra = Url::parse("https://cdn.example.com/page").unwrap();
        assert!(filter.should_fetch(&extra));
    }

    #[test]
    fn asset_urls_are_excluded_by_default() {
        let filter = UrlFilter::new(&entry(), &[], &[], &[]).unwrap();
        let image = Url::parse("https://example.com/logo.png").unwrap();
        assert!(!filter.should_fetch(&image));
    }

    #[test]
    fn exclude_patterns_win_over_include_patterns() {
        let filter = UrlFilter::new(
            &entry(),
            &[],
            &[r"/app/.*".to_string()],
            &[r"/app/draft/".to_string()],
        )
        .unwrap();

        let included = Url::parse("https://example.com/app/page").unwrap();
        let excluded = Url::parse("https://example.com/app/draft/page").unwrap();
        let unmatched = Url::parse("https://example.com/blog/post").unwrap();
        assert!(filter.should_fetch(&included));
        assert!(!filter.should_fetch(&excluded));
        assert!(!filter.should_fetch(&unmatched));
    }

    #[test]
    fn normalize_drops_fragments() {
        let filter = UrlFilter::new(&entry(), &[], &[], &[]).unwrap();
        let url = Url::parse("https://example.com/page#section").unwrap();
        assert_eq!(filter.normalize(&url).as_str(), "https://example.com/page");
    }

    #[test]
    fn invalid_patterns_fail_construction() {
        let result = UrlFilter::new(&entry(), &[], &["(".to_string()], &[]);
        assert!(result.is_err());
    }
}
