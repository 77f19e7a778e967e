//! Server push
//!
//! Decides which resources to push alongside a response (RFC 7540
//! Section 8.2) and tracks each [`PushPromise`] from creation until its
//! pushed stream finishes. Candidates come from explicitly registered
//! resources, wildcard push rules, and a scan of HTML response bodies.

use super::error::{Error, Result};
use super::settings::EngineConfig;
use super::stream::StreamId;
use crate::http::{HeaderMap, Method, Request, Response};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Request headers copied from the parent request onto each promise
const FORWARDED_HEADERS: &[&str] = &["accept-encoding", "accept-language", "user-agent"];

/// Kind of pushed resource, as used for `as=` in preload links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Style,
    Script,
    Font,
    Image,
    Document,
    Fetch,
    Other,
}

impl ResourceType {
    /// Guess the type from a path's file extension
    pub fn from_path(path: &str) -> Self {
        let path = strip_query(path);
        let ext = match path.rsplit_once('.') {
            Some((_, ext)) if !ext.contains('/') => ext.to_ascii_lowercase(),
            _ => return ResourceType::Other,
        };
        match ext.as_str() {
            "css" => ResourceType::Style,
            "js" | "mjs" => ResourceType::Script,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => ResourceType::Font,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" | "ico" => ResourceType::Image,
            "html" | "htm" => ResourceType::Document,
            "json" => ResourceType::Fetch,
            _ => ResourceType::Other,
        }
    }

    /// Parse a preload `as` value
    pub fn from_as(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "style" => ResourceType::Style,
            "script" => ResourceType::Script,
            "font" => ResourceType::Font,
            "image" => ResourceType::Image,
            "document" => ResourceType::Document,
            "fetch" => ResourceType::Fetch,
            _ => ResourceType::Other,
        }
    }

    /// Push priority used when none is given explicitly
    pub fn default_priority(&self) -> u16 {
        match self {
            ResourceType::Style | ResourceType::Document => 32,
            ResourceType::Script => 24,
            ResourceType::Font => 20,
            ResourceType::Image => 8,
            ResourceType::Fetch | ResourceType::Other => 16,
        }
    }

    /// `as=` value, if the type has one
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            ResourceType::Style => Some("style"),
            ResourceType::Script => Some("script"),
            ResourceType::Font => Some("font"),
            ResourceType::Image => Some("image"),
            ResourceType::Document => Some("document"),
            ResourceType::Fetch => Some("fetch"),
            ResourceType::Other => None,
        }
    }
}

/// A resource that may be pushed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResource {
    pub path: String,
    pub resource_type: ResourceType,
    /// Explicit priority; the type's default applies when `None`
    pub priority: Option<u16>,
    pub crossorigin: bool,
    /// Overrides the `as=` value derived from the type
    pub as_type: Option<String>,
}

impl PushResource {
    /// Create a resource, deriving its type from the path
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let resource_type = ResourceType::from_path(&path);
        PushResource {
            path,
            resource_type,
            priority: None,
            // font preloads are always CORS requests
            crossorigin: resource_type == ResourceType::Font,
            as_type: None,
        }
    }

    /// Set the resource type
    pub fn with_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self.crossorigin |= resource_type == ResourceType::Font;
        self
    }

    /// Set an explicit priority
    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Mark as a CORS request
    pub fn with_crossorigin(mut self) -> Self {
        self.crossorigin = true;
        self
    }

    /// Set the `as=` value
    pub fn with_as(mut self, as_type: impl Into<String>) -> Self {
        self.as_type = Some(as_type.into());
        self
    }

    /// Priority used for ordering and as the pushed stream's weight
    pub fn effective_priority(&self) -> u16 {
        self.priority
            .unwrap_or_else(|| self.resource_type.default_priority())
    }

    fn as_value(&self) -> Option<&str> {
        self.as_type.as_deref().or_else(|| self.resource_type.as_str())
    }
}

/// Push promise lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    /// Created, PUSH_PROMISE not yet sent
    Pending,
    /// PUSH_PROMISE sent, response in progress
    Sent,
    Completed,
    Cancelled,
    Failed,
}

impl PushState {
    /// Check if the promise reached a final state
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            PushState::Completed | PushState::Cancelled | PushState::Failed
        )
    }
}

impl fmt::Display for PushState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PushState::Pending => "pending",
            PushState::Sent => "sent",
            PushState::Completed => "completed",
            PushState::Cancelled => "cancelled",
            PushState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One promised resource
#[derive(Debug, Clone, PartialEq)]
pub struct PushPromise {
    pub path: String,
    pub method: Method,
    pub scheme: String,
    pub authority: String,
    pub resource_type: ResourceType,
    /// Regular headers of the promised request
    pub headers: HeaderMap,
    pub parent_stream_id: StreamId,
    pub priority: u16,
    state: PushState,
    promised_stream_id: Option<StreamId>,
}

impl PushPromise {
    /// Create a pending promise for `resource`, bound to the parent request
    pub fn new(request: &Request, resource: &PushResource, parent_stream_id: StreamId) -> Self {
        let mut headers = HeaderMap::new();
        for name in FORWARDED_HEADERS {
            if let Some(value) = request.headers.get(name) {
                headers.append(*name, Bytes::copy_from_slice(value));
            }
        }

        PushPromise {
            path: resource.path.clone(),
            method: Method::Get,
            scheme: request.scheme.clone(),
            authority: request.authority.clone(),
            resource_type: resource.resource_type,
            headers,
            parent_stream_id,
            priority: resource.effective_priority(),
            state: PushState::Pending,
            promised_stream_id: None,
        }
    }

    /// Get state
    pub fn state(&self) -> PushState {
        self.state
    }

    /// Get the reserved stream, once sent
    pub fn promised_stream_id(&self) -> Option<StreamId> {
        self.promised_stream_id
    }

    /// The promised request as it is sent in PUSH_PROMISE
    pub fn request(&self) -> Request {
        Request {
            method: self.method,
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            path: self.path.clone(),
            headers: self.headers.clone(),
            body: Bytes::new(),
        }
    }

    /// Header list for the PUSH_PROMISE block, pseudo-headers first
    pub fn request_headers(&self) -> HeaderMap {
        self.request().to_header_map()
    }

    fn transition(&mut self, allowed: &[PushState], to: PushState) -> Result<()> {
        if !allowed.contains(&self.state) {
            return Err(Error::Protocol(format!(
                "Push promise for {} cannot go from {} to {}",
                self.path, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    /// Pending -> Sent on `promised_stream_id`
    pub fn mark_sent(&mut self, promised_stream_id: StreamId) -> Result<()> {
        self.transition(&[PushState::Pending], PushState::Sent)?;
        self.promised_stream_id = Some(promised_stream_id);
        Ok(())
    }

    /// Sent -> Completed
    pub fn complete(&mut self) -> Result<()> {
        self.transition(&[PushState::Sent], PushState::Completed)
    }

    /// Pending or Sent -> Cancelled
    pub fn cancel(&mut self) -> Result<()> {
        self.transition(&[PushState::Pending, PushState::Sent], PushState::Cancelled)
    }

    /// Pending or Sent -> Failed
    pub fn fail(&mut self) -> Result<()> {
        self.transition(&[PushState::Pending, PushState::Sent], PushState::Failed)
    }
}

/// Push counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushStats {
    pub promises_created: u64,
    pub promises_sent: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub failed: u64,
    /// Candidates skipped because they were pushed within the TTL
    pub skipped_recent: u64,
}

#[derive(Debug, Clone)]
struct PushRule {
    pattern: String,
    resources: Vec<PushResource>,
}

/// Per-connection push policy and promise tracking
#[derive(Debug)]
pub struct ServerPushManager {
    enabled: bool,
    max_push_resources: usize,
    push_ttl: Duration,
    resources: HashMap<String, Vec<PushResource>>,
    rules: Vec<PushRule>,
    client_cached: HashSet<String>,
    pushed: HashMap<String, Instant>,
    promises: HashMap<StreamId, PushPromise>,
    stats: PushStats,
}

impl ServerPushManager {
    /// Create a manager
    pub fn new(enabled: bool, max_push_resources: usize, push_ttl: Duration) -> Self {
        ServerPushManager {
            enabled,
            max_push_resources,
            push_ttl,
            resources: HashMap::new(),
            rules: Vec::new(),
            client_cached: HashSet::new(),
            pushed: HashMap::new(),
            promises: HashMap::new(),
            stats: PushStats::default(),
        }
    }

    /// Create a manager from engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        ServerPushManager::new(
            config.server_push_enabled,
            config.max_push_resources,
            config.push_ttl,
        )
    }

    /// Check if push is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable push (e.g. on SETTINGS_ENABLE_PUSH=0)
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Push `resource` whenever `trigger_path` is requested
    pub fn register_resource(&mut self, trigger_path: impl Into<String>, resource: PushResource) {
        self.resources
            .entry(trigger_path.into())
            .or_default()
            .push(resource);
    }

    /// Push `resources` for every request path matching `pattern`
    /// (`*` matches any run of characters)
    pub fn add_push_rule(&mut self, pattern: impl Into<String>, resources: Vec<PushResource>) {
        self.rules.push(PushRule {
            pattern: pattern.into(),
            resources,
        });
    }

    /// Record that the client already holds `path`
    pub fn mark_client_cached(&mut self, path: impl AsRef<str>) {
        self.client_cached
            .insert(strip_query(path.as_ref()).to_string());
    }

    /// Check if the client already holds `path`
    pub fn is_client_cached(&self, path: &str) -> bool {
        self.client_cached.contains(strip_query(path))
    }

    /// Check if `path` was pushed within `ttl`
    pub fn was_pushed(&self, path: &str, ttl: Duration) -> bool {
        self.pushed
            .get(strip_query(path))
            .is_some_and(|at| at.elapsed() < ttl)
    }

    /// Record a push of `path` now
    pub fn mark_pushed(&mut self, path: &str) {
        self.pushed
            .insert(strip_query(path).to_string(), Instant::now());
    }

    fn should_push(&self, request: &Request, response: &Response) -> bool {
        self.enabled && request.method.is_pushable() && response.status.is_success()
    }

    /// Resources to push for a request/response pair, highest priority
    /// first, at most `max_push_resources` of them
    pub fn get_push_resources(&self, request: &Request, response: &Response) -> Vec<PushResource> {
        if !self.should_push(request, response) {
            return Vec::new();
        }
        let path = strip_query(&request.path);

        let mut candidates: Vec<PushResource> = Vec::new();
        if let Some(registered) = self.resources.get(path) {
            candidates.extend(registered.iter().cloned());
        }
        for rule in &self.rules {
            if matches_pattern(&rule.pattern, path) {
                candidates.extend(rule.resources.iter().cloned());
            }
        }
        let is_html = response
            .content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("text/html"));
        if is_html {
            candidates.extend(scan_html(&response.body, &request.authority, path));
        }

        let mut seen = HashSet::new();
        let mut resources: Vec<PushResource> = candidates
            .into_iter()
            .filter(|r| strip_query(&r.path) != path)
            .filter(|r| !self.is_client_cached(&r.path))
            .filter(|r| seen.insert(strip_query(&r.path).to_string()))
            .collect();
        resources.sort_by_key(|r| std::cmp::Reverse(r.effective_priority()));
        resources.truncate(self.max_push_resources);
        resources
    }

    /// Build pending promises for a response on `parent_stream_id`.
    ///
    /// Nothing is pushed for a request that is itself a push (a
    /// server-initiated, even stream) or for resources pushed within the
    /// TTL. Every returned path is marked pushed.
    pub fn create_push_promises(
        &mut self,
        request: &Request,
        response: &Response,
        parent_stream_id: StreamId,
    ) -> Vec<PushPromise> {
        if parent_stream_id % 2 == 0 {
            return Vec::new();
        }

        let mut promises = Vec::new();
        for resource in self.get_push_resources(request, response) {
            if self.was_pushed(&resource.path, self.push_ttl) {
                self.stats.skipped_recent += 1;
                trace!(path = %resource.path, "recently pushed, skipping");
                continue;
            }
            self.mark_pushed(&resource.path);
            promises.push(PushPromise::new(request, &resource, parent_stream_id));
        }

        self.stats.promises_created += promises.len() as u64;
        if !promises.is_empty() {
            debug!(
                parent_stream_id,
                count = promises.len(),
                path = %request.path,
                "push promises created"
            );
        }
        promises
    }

    /// Start tracking a promise whose PUSH_PROMISE went out
    pub fn track(&mut self, promise: PushPromise) {
        if let Some(id) = promise.promised_stream_id() {
            self.stats.promises_sent += 1;
            self.promises.insert(id, promise);
        }
    }

    /// Get a tracked promise by its promised stream
    pub fn promise(&self, promised_stream_id: StreamId) -> Option<&PushPromise> {
        self.promises.get(&promised_stream_id)
    }

    /// Mark the promise on `promised_stream_id` completed
    pub fn complete_promise(&mut self, promised_stream_id: StreamId) -> bool {
        let done = self
            .promises
            .get_mut(&promised_stream_id)
            .is_some_and(|p| p.complete().is_ok());
        if done {
            self.stats.completed += 1;
        }
        done
    }

    /// Mark the promise on `promised_stream_id` cancelled
    pub fn cancel_promise(&mut self, promised_stream_id: StreamId) -> bool {
        let done = self
            .promises
            .get_mut(&promised_stream_id)
            .is_some_and(|p| p.cancel().is_ok());
        if done {
            self.stats.cancelled += 1;
        }
        done
    }

    /// Mark the promise on `promised_stream_id` failed
    pub fn fail_promise(&mut self, promised_stream_id: StreamId) -> bool {
        let done = self
            .promises
            .get_mut(&promised_stream_id)
            .is_some_and(|p| p.fail().is_ok());
        if done {
            self.stats.failed += 1;
        }
        done
    }

    /// Drop finished promises
    pub fn clear_finished(&mut self) {
        self.promises.retain(|_, p| !p.state().is_finished());
    }

    /// Forget pushes older than the TTL, returning how many were dropped
    pub fn prune_expired(&mut self) -> usize {
        let ttl = self.push_ttl;
        let before = self.pushed.len();
        self.pushed.retain(|_, at| at.elapsed() < ttl);
        before - self.pushed.len()
    }

    /// Promises still tracked
    pub fn tracked_promises(&self) -> usize {
        self.promises.len()
    }

    /// Paths remembered as recently pushed
    pub fn recent_pushes(&self) -> usize {
        self.pushed.len()
    }

    /// Get statistics
    pub fn stats(&self) -> PushStats {
        self.stats
    }

    /// Format a `Link` header advertising `resources` as preloads
    pub fn to_link_header(resources: &[PushResource], nopush: bool) -> String {
        resources
            .iter()
            .map(|r| {
                let mut link = format!("<{}>; rel=preload", r.path);
                if let Some(as_value) = r.as_value() {
                    link.push_str("; as=");
                    link.push_str(as_value);
                }
                if r.crossorigin {
                    link.push_str("; crossorigin");
                }
                if nopush {
                    link.push_str("; nopush");
                }
                link
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for ServerPushManager {
    fn default() -> Self {
        ServerPushManager::from_config(&EngineConfig::default())
    }
}

fn strip_query(path: &str) -> &str {
    let end = path.find(|c| c == '?' || c == '#').unwrap_or(path.len());
    &path[..end]
}

/// Glob match where `*` matches any run of characters
fn matches_pattern(pattern: &str, path: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == path;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !path.starts_with(first) || path.len() < first.len() + last.len() {
        return false;
    }
    let mut rest = &path[first.len()..];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// Turn a reference from the page into a same-origin path
fn resolve_reference(reference: &str, authority: &str, base_path: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }
    let lower = reference.to_ascii_lowercase();
    if ["data:", "blob:", "javascript:", "mailto:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let without_scheme = lower
        .strip_prefix("https:")
        .or_else(|| lower.strip_prefix("http:"))
        .map(|_| &reference[reference.find(':').map_or(0, |i| i + 1)..]);
    let network = without_scheme.unwrap_or(reference);
    if let Some(rest) = network.strip_prefix("//") {
        let (host, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
        if !host.eq_ignore_ascii_case(authority) {
            return None;
        }
        return Some(if path.is_empty() { "/".to_string() } else { path.to_string() });
    }
    if without_scheme.is_some() {
        return None;
    }

    if reference.starts_with('/') {
        return Some(reference.to_string());
    }
    let dir = &base_path[..base_path.rfind('/').map_or(0, |i| i + 1)];
    let dir = if dir.is_empty() { "/" } else { dir };
    Some(format!("{}{}", dir, reference))
}

struct Tag<'a> {
    name: &'a str,
    attrs: Vec<(&'a str, &'a str)>,
}

impl<'a> Tag<'a> {
    fn attr(&self, name: &str) -> Option<&'a str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }
}

/// Minimal start-tag tokenizer; enough to read attributes of
/// `link`, `script` and `img`
fn parse_tags(html: &str) -> Vec<Tag<'_>> {
    let bytes = html.as_bytes();
    let mut tags = Vec::new();
    let mut i = 0;

    while let Some(offset) = html[i..].find('<') {
        i += offset + 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
            i += 1;
        }
        if i == start {
            continue;
        }
        let name = &html[start..i];
        let mut attrs = Vec::new();

        loop {
            while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
                i += 1;
            }
            if i >= bytes.len() || bytes[i] == b'>' {
                break;
            }
            let attr_start = i;
            while i < bytes.len()
                && !bytes[i].is_ascii_whitespace()
                && !matches!(bytes[i], b'=' | b'>' | b'/')
            {
                i += 1;
            }
            let attr_name = &html[attr_start..i];
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b'=' {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                let value = if i < bytes.len() && matches!(bytes[i], b'"' | b'\'') {
                    let quote = bytes[i] as char;
                    let value_start = i + 1;
                    let end = html[value_start..]
                        .find(quote)
                        .map_or(bytes.len(), |p| value_start + p);
                    i = (end + 1).min(bytes.len());
                    &html[value_start..end]
                } else {
                    let value_start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    &html[value_start..i]
                };
                attrs.push((attr_name, value));
            } else if attr_name.is_empty() {
                i += 1;
            } else {
                attrs.push((attr_name, ""));
            }
        }
        tags.push(Tag { name, attrs });
    }
    tags
}

/// Collect `url(...)` references inside CSS text
fn css_urls(css: &str) -> Vec<&str> {
    let mut urls = Vec::new();
    let mut rest = css;
    while let Some(pos) = rest.find("url(") {
        rest = &rest[pos + 4..];
        let Some(end) = rest.find(')') else { break };
        let url = rest[..end].trim().trim_matches(|c| c == '"' || c == '\'');
        urls.push(url);
        rest = &rest[end + 1..];
    }
    urls
}

/// Find push candidates referenced by an HTML page
fn scan_html(body: &[u8], authority: &str, page_path: &str) -> Vec<PushResource> {
    let html = String::from_utf8_lossy(body);
    let mut found = Vec::new();
    let mut add = |reference: &str, resource_type: Option<ResourceType>| {
        if let Some(path) = resolve_reference(reference, authority, page_path) {
            let resource = PushResource::new(path);
            let resource = match resource_type {
                Some(t) => resource.with_type(t),
                None => resource,
            };
            found.push(resource);
        }
    };

    for tag in parse_tags(&html) {
        if tag.name.eq_ignore_ascii_case("link") {
            let rel = tag.attr("rel").unwrap_or_default().to_ascii_lowercase();
            let Some(href) = tag.attr("href") else { continue };
            let rels: Vec<&str> = rel.split_ascii_whitespace().collect();
            if rels.contains(&"stylesheet") {
                add(href, Some(ResourceType::Style));
            } else if rels.contains(&"preload") {
                add(href, tag.attr("as").map(ResourceType::from_as));
            } else if rels.contains(&"modulepreload") {
                add(href, Some(ResourceType::Script));
            }
        } else if tag.name.eq_ignore_ascii_case("script") {
            if let Some(src) = tag.attr("src") {
                add(src, Some(ResourceType::Script));
            }
        } else if tag.name.eq_ignore_ascii_case("img") {
            let hero = tag
                .attr("class")
                .is_some_and(|c| c.split_ascii_whitespace().any(|c| c == "hero"));
            let high = tag
                .attr("data-priority")
                .or_else(|| tag.attr("fetchpriority"))
                .is_some_and(|p| p.eq_ignore_ascii_case("high"));
            if hero || high {
                if let Some(src) = tag.attr("src") {
                    add(src, Some(ResourceType::Image));
                }
            }
        }
    }

    for url in css_urls(&html) {
        add(url, None);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Status;

    fn html_response(body: &str) -> Response {
        Response::new(Status::OK, body.to_string())
            .with_header("content-type", "text/html; charset=utf-8")
    }

    fn request(path: &str) -> Request {
        let mut request = Request::get("example.com", path);
        request.headers.append("accept-encoding", "gzip, br");
        request.headers.append("user-agent", "test-agent");
        request.headers.append("cookie", "secret=1");
        request
    }

    fn paths(resources: &[PushResource]) -> Vec<&str> {
        resources.iter().map(|r| r.path.as_str()).collect()
    }

    #[test]
    fn test_resource_type_from_path() {
        assert_eq!(ResourceType::from_path("/a/site.css?v=2"), ResourceType::Style);
        assert_eq!(ResourceType::from_path("/app.mjs"), ResourceType::Script);
        assert_eq!(ResourceType::from_path("/f.WOFF2"), ResourceType::Font);
        assert_eq!(ResourceType::from_path("/img/hero.webp"), ResourceType::Image);
        assert_eq!(ResourceType::from_path("/v1.2/data"), ResourceType::Other);
        assert_eq!(ResourceType::Style.default_priority(), 32);
        assert_eq!(ResourceType::Script.default_priority(), 24);
        assert_eq!(ResourceType::Font.default_priority(), 20);
        assert_eq!(ResourceType::Other.default_priority(), 16);
        assert_eq!(ResourceType::Image.default_priority(), 8);
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("/blog/*", "/blog/post-1"));
        assert!(matches_pattern("*.html", "/index.html"));
        assert!(matches_pattern("/a/*/c/*", "/a/b/c/d"));
        assert!(matches_pattern("/exact", "/exact"));
        assert!(!matches_pattern("/exact", "/exact/more"));
        assert!(!matches_pattern("/blog/*", "/news/1"));
        assert!(!matches_pattern("/ab*ba", "/aba"));
    }

    #[test]
    fn test_resolve_reference() {
        let r = |s| resolve_reference(s, "example.com", "/docs/page.html");
        assert_eq!(r("/a.css"), Some("/a.css".to_string()));
        assert_eq!(r("b.js"), Some("/docs/b.js".to_string()));
        assert_eq!(r("https://example.com/c.png"), Some("/c.png".to_string()));
        assert_eq!(r("//example.com/d.png"), Some("/d.png".to_string()));
        assert_eq!(r("https://cdn.other.com/e.js"), None);
        assert_eq!(r("//cdn.other.com/e.js"), None);
        assert_eq!(r("data:image/png;base64,AAAA"), None);
        assert_eq!(r("blob:https://example.com/x"), None);
    }

    #[test]
    fn test_registered_resources() {
        let mut push = ServerPushManager::default();
        push.register_resource("/", PushResource::new("/app.js"));
        push.register_resource("/", PushResource::new("/style.css"));
        push.register_resource("/", PushResource::new("/logo.png"));
        push.mark_client_cached("/logo.png?v=3");

        let resources =
            push.get_push_resources(&request("/?utm=1"), &Response::new(Status::OK, ""));
        assert_eq!(paths(&resources), vec!["/style.css", "/app.js"]);
    }

    #[test]
    fn test_push_rules() {
        let mut push = ServerPushManager::default();
        push.add_push_rule("/blog/*", vec![PushResource::new("/blog.css")]);
        push.add_push_rule("*.php", vec![PushResource::new("/legacy.js")]);

        let resources =
            push.get_push_resources(&request("/blog/hello"), &Response::new(Status::OK, ""));
        assert_eq!(paths(&resources), vec!["/blog.css"]);
    }

    #[test]
    fn test_html_scan() {
        let body = r#"<!doctype html>
            <html><head>
            <link rel="stylesheet" href="/css/main.css">
            <link rel=preload href="/fonts/body.woff2" as="font" crossorigin>
            <link rel="icon" href="/favicon.ico">
            <script src="js/app.js" defer></script>
            <script src="https://cdn.elsewhere.net/lib.js"></script>
            <style>
              @font-face { font-family: X; src: url('/fonts/x.woff') format('woff'); }
              .bg { background: url(data:image/png;base64,AAAA); }
            </style>
            </head><body>
            <img class="hero wide" src="/img/hero.jpg">
            <img src="/img/thumb.jpg">
            <img data-priority="high" src="/img/banner.png">
            <img src="/css/main.css?dup=1" data-priority="high">
            </body></html>"#;

        let push = ServerPushManager::default();
        let resources = push.get_push_resources(&request("/index.html"), &html_response(body));
        assert_eq!(
            paths(&resources),
            vec![
                "/css/main.css",
                "/js/app.js",
                "/fonts/body.woff2",
                "/fonts/x.woff",
                "/img/hero.jpg",
                "/img/banner.png",
            ]
        );
        assert!(resources[2].crossorigin);
    }

    #[test]
    fn test_max_push_resources() {
        let mut push = ServerPushManager::new(true, 2, Duration::from_secs(60));
        for name in ["/a.png", "/b.js", "/c.css", "/d.woff"] {
            push.register_resource("/", PushResource::new(name));
        }
        let resources = push.get_push_resources(&request("/"), &Response::new(Status::OK, ""));
        assert_eq!(paths(&resources), vec!["/c.css", "/b.js"]);
    }

    #[test]
    fn test_explicit_priority_overrides() {
        let mut push = ServerPushManager::default();
        push.register_resource("/", PushResource::new("/a.css"));
        push.register_resource("/", PushResource::new("/hero.png").with_priority(64));
        let resources = push.get_push_resources(&request("/"), &Response::new(Status::OK, ""));
        assert_eq!(paths(&resources), vec!["/hero.png", "/a.css"]);
    }

    #[test]
    fn test_no_push_conditions() {
        let mut push = ServerPushManager::default();
        push.register_resource("/", PushResource::new("/a.css"));

        let mut post = request("/");
        post.method = Method::Post;
        assert!(push.get_push_resources(&post, &Response::new(Status::OK, "")).is_empty());
        assert!(push
            .get_push_resources(&request("/"), &Response::new(Status::NOT_FOUND, ""))
            .is_empty());
        assert!(push
            .create_push_promises(&request("/"), &Response::new(Status::OK, ""), 2)
            .is_empty());

        push.set_enabled(false);
        assert!(push.get_push_resources(&request("/"), &Response::new(Status::OK, "")).is_empty());
    }

    #[test]
    fn test_create_push_promises() {
        let mut push = ServerPushManager::default();
        push.register_resource("/", PushResource::new("/a.css"));

        let promises = push.create_push_promises(&request("/"), &Response::new(Status::OK, ""), 1);
        assert_eq!(promises.len(), 1);
        let promise = &promises[0];
        assert_eq!(promise.state(), PushState::Pending);
        assert_eq!(promise.authority, "example.com");
        assert_eq!(promise.parent_stream_id, 1);
        assert_eq!(promise.priority, 32);

        let headers = promise.request_headers();
        assert_eq!(headers.get(":method"), Some(&b"GET"[..]));
        assert_eq!(headers.get(":path"), Some(&b"/a.css"[..]));
        assert_eq!(headers.get(":authority"), Some(&b"example.com"[..]));
        assert_eq!(headers.get("user-agent"), Some(&b"test-agent"[..]));
        assert!(!headers.contains("cookie"));

        assert!(push.was_pushed("/a.css", Duration::from_secs(60)));
        assert!(!push.was_pushed("/a.css", Duration::ZERO));
        let again = push.create_push_promises(&request("/"), &Response::new(Status::OK, ""), 3);
        assert!(again.is_empty());
        assert_eq!(push.stats().skipped_recent, 1);
    }

    #[test]
    fn test_promise_lifecycle() {
        let resource = PushResource::new("/a.js");
        let mut promise = PushPromise::new(&request("/"), &resource, 1);
        assert!(promise.complete().is_err());
        promise.mark_sent(2).unwrap();
        assert!(promise.mark_sent(4).is_err());
        assert_eq!(promise.promised_stream_id(), Some(2));

        let mut push = ServerPushManager::default();
        push.track(promise);
        assert!(push.complete_promise(2));
        assert!(!push.cancel_promise(2));
        assert_eq!(push.promise(2).map(PushPromise::state), Some(PushState::Completed));
        push.clear_finished();
        assert!(push.promise(2).is_none());
        assert_eq!(push.stats().completed, 1);
    }

    #[test]
    fn test_prune_expired() {
        let mut push = ServerPushManager::new(true, 10, Duration::ZERO);
        push.mark_pushed("/a.css?v=1");
        push.mark_pushed("/b.js");
        assert_eq!(push.recent_pushes(), 2);
        assert_eq!(push.prune_expired(), 2);
        assert_eq!(push.recent_pushes(), 0);

        let mut push = ServerPushManager::new(true, 10, Duration::from_secs(60));
        push.mark_pushed("/a.css");
        assert_eq!(push.prune_expired(), 0);
        assert!(push.was_pushed("/a.css", Duration::from_secs(60)));
    }

    #[test]
    fn test_link_header() {
        let resources = vec![
            PushResource::new("/a.css"),
            PushResource::new("/b.js"),
            PushResource::new("/f.woff2"),
            PushResource::new("/data"),
        ];
        assert_eq!(
            ServerPushManager::to_link_header(&resources[..2], false),
            "</a.css>; rel=preload; as=style, </b.js>; rel=preload; as=script"
        );
        assert_eq!(
            ServerPushManager::to_link_header(&resources[2..], true),
            "</f.woff2>; rel=preload; as=font; crossorigin; nopush, </data>; rel=preload; nopush"
        );
    }
}
