//! Parent-domain allow-lists for outbound targets.

use std::collections::HashSet;

use url::Url;

/// Set of permitted parent domains.
///
/// The parent domain of `https://api.risk.example.com/x` is `example`: the
/// second-to-last host label, lower-cased. An empty list permits every host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAllowList {
    domains: HashSet<String>,
}

impl DomainAllowList {
    #[must_use]
    pub fn new<S: AsRef<str>>(domains: &[S]) -> Self {
        Self {
            domains: domains
                .iter()
                .map(|d| d.as_ref().trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// Parse a comma-separated list such as `"example, acme"`.
    #[must_use]
    pub fn parse(csv: &str) -> Self {
        let parts: Vec<&str> = csv.split(',').collect();
        Self::new(&parts)
    }

    /// A list that permits every host.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Whether `url` may be called.
    ///
    /// URLs without a host are always rejected.
    #[must_use]
    pub fn is_allowed(&self, url: &str) -> bool {
        let Some(parent) = parent_domain(url) else {
            return false;
        };
        self.domains.is_empty() || self.domains.contains(&parent)
    }
}

/// Second-to-last label of the URL's host, lower-cased.
///
/// A single-label host (`localhost`) is its own parent domain. Returns `None`
/// when the URL does not parse or carries no host.
#[must_use]
pub fn parent_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let parent = match labels.as_slice() {
        [] => return None,
        [only] => *only,
        [.., parent, _] => *parent,
    };
    Some(parent.to_ascii_lowercase())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn parent_domain_is_second_to_last_label() {
        assert_eq!(
            parent_domain("https://api.risk.Example.com/path").as_deref(),
            Some("example")
        );
        assert_eq!(parent_domain("https://example.com").as_deref(), Some("example"));
        assert_eq!(parent_domain("http://localhost:8080/").as_deref(), Some("localhost"));
        assert_eq!(parent_domain("https://example.com./x").as_deref(), Some("example"));
        assert_eq!(parent_domain("not a url"), None);
        assert_eq!(parent_domain("mailto:someone@example.com"), None);
    }

    #[test]
    fn empty_list_allows_any_host() {
        let list = DomainAllowList::allow_all();
        assert!(list.is_empty());
        assert!(list.is_allowed("https://anything.io/x"));
        assert!(!list.is_allowed("relative/path"));
    }

    #[test]
    fn listed_parent_domains_only() {
        let list = DomainAllowList::parse(" Example ,acme,,");
        assert!(!list.is_empty());
        assert!(list.is_allowed("https://api.example.com/risk"));
        assert!(list.is_allowed("https://login.ACME.org"));
        assert!(!list.is_allowed("https://api.evil.com/risk"));
        // Only the parent label is compared
        assert!(!list.is_allowed("https://example.evil.com/"));
    }
}
