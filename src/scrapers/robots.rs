//! robots.txt parsing and a per-host cache.
//!
//! A missing or unreachable robots.txt allows everything.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    /// (allow, pattern)
    rules: Vec<(bool, String)>,
}

/// Parsed robots.txt.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    groups: Vec<Group>,
}

impl RobotsTxt {
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut in_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match directive.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group
                    if in_rules {
                        groups.push(std::mem::take(&mut current));
                        in_rules = false;
                    }
                    current.agents.push(value.to_ascii_lowercase());
                }
                "allow" | "disallow" if !current.agents.is_empty() => {
                    in_rules = true;
                    if !value.is_empty() {
                        let allow = directive.trim().eq_ignore_ascii_case("allow");
                        current.rules.push((allow, value.to_string()));
                    }
                }
                _ => {}
            }
        }
        if !current.agents.is_empty() {
            groups.push(current);
        }

        Self { groups }
    }

    /// Whether `agent` may fetch `path`. The longest matching rule wins, and
    /// `Allow` wins a tie.
    pub fn is_allowed(&self, agent: &str, path: &str) -> bool {
        let agent = agent.to_ascii_lowercase();
        let group = self
            .groups
            .iter()
            .find(|g| g.agents.iter().any(|a| a != "*" && agent.contains(a.as_str())))
            .or_else(|| self.groups.iter().find(|g| g.agents.iter().any(|a| a == "*")));

        let Some(group) = group else {
            return true;
        };

        let mut best: Option<(usize, bool)> = None;
        for (allow, pattern) in &group.rules {
            if pattern_matches(pattern, path) {
                let len = pattern.len();
                best = match best {
                    Some((best_len, best_allow))
                        if best_len > len || (best_len == len && best_allow) =>
                    {
                        Some((best_len, best_allow))
                    }
                    _ => Some((len, *allow)),
                };
            }
        }
        best.map(|(_, allow)| allow).unwrap_or(true)
    }
}

/// Match a robots pattern supporting `*` wildcards and a trailing `$` anchor.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    let rest: Vec<&str> = parts.collect();

    for (i, part) in rest.iter().enumerate() {
        let is_last = i + 1 == rest.len();
        if is_last && anchored {
            return path.len() >= pos + part.len() && path.ends_with(part);
        }
        match path[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }

    !anchored || pos == path.len()
}

/// Fetches robots.txt once per host and answers allow checks.
#[derive(Clone)]
pub struct RobotsChecker {
    client: Client,
    agent: String,
    cache: Arc<Mutex<HashMap<String, Option<Arc<RobotsTxt>>>>>,
}

impl RobotsChecker {
    pub fn new(client: Client, agent: impl Into<String>) -> Self {
        Self {
            client,
            agent: agent.into(),
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let Some(host) = parsed.host_str() else {
            return true;
        };
        let origin = match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        };

        let robots = {
            let mut cache = self.cache.lock().await;
            match cache.get(&origin) {
                Some(entry) => entry.clone(),
                None => {
                    let entry = self.fetch(&origin).await.map(Arc::new);
                    cache.insert(origin.clone(), entry.clone());
                    entry
                }
            }
        };

        let mut path = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }

        robots
            .map(|r| r.is_allowed(&self.agent, &path))
            .unwrap_or(true)
    }

    async fn fetch(&self, origin: &str) -> Option<RobotsTxt> {
        let robots_url = format!("{}/robots.txt", origin);
        let response = match self
            .client
            .get(&robots_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!("Could not fetch {}: {}", robots_url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok().map(|body| RobotsTxt::parse(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let robots = RobotsTxt::parse(
            r#"
User-agent: *
Disallow: /private/
Disallow: /admin
Allow: /private/public/
"#,
        );
        assert!(robots.is_allowed("HerdScout", "/contact"));
        assert!(!robots.is_allowed("HerdScout", "/private/page"));
        assert!(robots.is_allowed("HerdScout", "/private/public/page"));
        assert!(!robots.is_allowed("HerdScout", "/admin/users"));
    }

    #[test]
    fn test_specific_agent_group() {
        let robots = RobotsTxt::parse(
            r#"
User-agent: *
Disallow: /

User-agent: herdscout
Disallow: /cart
"#,
        );
        assert!(!robots.is_allowed("OtherBot", "/page"));
        assert!(robots.is_allowed("HerdScout", "/page"));
        assert!(!robots.is_allowed("HerdScout", "/cart"));
    }

    #[test]
    fn test_wildcards() {
        let robots = RobotsTxt::parse(
            "User-agent: *\nDisallow: /*.pdf$\nDisallow: /search*q=\n",
        );
        assert!(!robots.is_allowed("Bot", "/files/herd.pdf"));
        assert!(robots.is_allowed("Bot", "/files/herd.pdf.html"));
        assert!(!robots.is_allowed("Bot", "/search?q=angus"));
    }

    #[test]
    fn test_empty_allows_all() {
        let robots = RobotsTxt::parse("");
        assert!(robots.is_allowed("Bot", "/anything"));
        let robots = RobotsTxt::parse("User-agent: *\nDisallow:\n");
        assert!(robots.is_allowed("Bot", "/anything"));
    }
}
