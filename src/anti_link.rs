use crate::community::{AntiLinkSettings, LinkAction};
use fancy_regex::Regex;

const URL_PATTERN: &str = r"https?://[^\s<>]+";

/// Detects messages linking to blocked domains.
pub struct LinkFilter {
    enabled: bool,
    url_pattern: Regex,
    blocked_domains: Vec<String>,
    exempt_roles: Vec<u64>,
    exempt_channels: Vec<u64>,
    action: LinkAction,
}

impl LinkFilter {
    pub fn new(settings: &AntiLinkSettings) -> Result<Self, fancy_regex::Error> {
        Ok(Self {
            enabled: settings.enabled,
            url_pattern: Regex::new(URL_PATTERN)?,
            blocked_domains: settings
                .blocked_domains
                .iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            exempt_roles: settings.exempt_roles.clone(),
            exempt_channels: settings.exempt_channels.clone(),
            action: settings.action,
        })
    }

    pub fn action(&self) -> LinkAction {
        self.action
    }

    /// Returns the first URL in `content` that points at a blocked domain.
    pub fn find_blocked(&self, content: &str) -> Option<String> {
        if !self.enabled || self.blocked_domains.is_empty() {
            return None;
        }
        self.url_pattern
            .find_iter(content)
            .filter_map(Result::ok)
            .map(|m| m.as_str())
            .find(|url| {
                let url = url.to_lowercase();
                self.blocked_domains.iter().any(|d| url.contains(d.as_str()))
            })
            .map(str::to_string)
    }

    pub fn is_exempt(&self, channel_id: u64, role_ids: &[u64]) -> bool {
        self.exempt_channels.contains(&channel_id)
            || role_ids.iter().any(|r| self.exempt_roles.contains(r))
    }

    /// The offending URL if this message must be removed.
    pub fn check(&self, content: &str, channel_id: u64, role_ids: &[u64]) -> Option<String> {
        if !self.enabled || self.is_exempt(channel_id, role_ids) {
            return None;
        }
        self.find_blocked(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(enabled: bool) -> LinkFilter {
        LinkFilter::new(&AntiLinkSettings {
            enabled,
            blocked_domains: vec!["Discord.gg".to_string(), "grabify.link".to_string()],
            exempt_roles: vec![10],
            exempt_channels: vec![20],
            action: LinkAction::Warn,
        })
        .unwrap()
    }

    #[test]
    fn test_blocked_domain_detection() {
        let filter = filter(true);
        assert_eq!(
            filter.find_blocked("join us https://DISCORD.gg/abc now"),
            Some("https://DISCORD.gg/abc".to_string())
        );
        assert_eq!(filter.find_blocked("see https://example.com/page"), None);
        // Bare domains without a scheme are not links
        assert_eq!(filter.find_blocked("discord.gg/abc"), None);
    }

    #[test]
    fn test_exemptions() {
        let filter = filter(true);
        let content = "http://grabify.link/xyz";
        assert!(filter.check(content, 1, &[]).is_some());
        assert!(filter.check(content, 20, &[]).is_none());
        assert!(filter.check(content, 1, &[5, 10]).is_none());
        assert_eq!(filter.action(), LinkAction::Warn);
    }

    #[test]
    fn test_disabled_filter_allows_everything() {
        let filter = filter(false);
        assert!(filter.check("https://discord.gg/abc", 1, &[]).is_none());
    }
}
