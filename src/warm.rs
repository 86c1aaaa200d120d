//! Cache warming: load each preview page with `rerender=1` and wait for the
//! page to post its rendered HTML to the cache function.
//!
//! A cache POST is recognised by a substring match on its URL. An unrelated
//! asset whose path happens to contain `/<book>.json.gz` would also match.

use chromiumoxide::cdp::browser_protocol::network::{EventRequestWillBeSent, EventResponseReceived};
use chromiumoxide::Page;
use colored::*;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info};

use crate::books::BookInfo;
use crate::browser::{self, BrowserSession};
use crate::config::WarmSettings;
use crate::error::{Error, Result};
use crate::job::ExportJob;
use crate::runner::BookTask;
use crate::timeout::TimeoutBudget;

const MAX_OTHER_POSTS: usize = 10;

/// Path fragment the cache POST for this job carries.
pub fn expected_pattern(job: &ExportJob) -> String {
    match job.book_code() {
        Some(code) => format!("/{}.json.gz", code.to_lowercase()),
        None => format!("/{}.json.gz", job.resource.repo),
    }
}

/// Everything seen on the wire while waiting, kept for the timeout report.
#[derive(Debug, Default)]
pub struct CacheTraffic {
    cache_url: String,
    expected: String,
    methods: HashMap<String, String>,
    requests: Vec<(String, String)>,
    responses: usize,
    cache_posts_seen: Vec<String>,
}

impl CacheTraffic {
    pub fn new(cache_url: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            cache_url: cache_url.into(),
            expected: expected.into(),
            ..Default::default()
        }
    }

    pub fn on_request(&mut self, request_id: &str, method: &str, url: &str) {
        self.methods.insert(request_id.to_string(), method.to_string());
        self.requests.push((method.to_string(), url.to_string()));
    }

    /// Returns the URL when this response completes the expected cache POST.
    pub fn on_response(&mut self, request_id: &str, url: &str, status: i64) -> Option<String> {
        let method = self.methods.get(request_id).map(String::as_str).unwrap_or("");
        self.responses += 1;

        if method != "POST" || !url.contains(&self.cache_url) {
            return None;
        }

        self.cache_posts_seen.push(url.to_string());
        info!("✓ Cache-html POST seen: {} (status {})", url, status);
        if url.contains(&self.expected) {
            info!("{}", "✓ Main book cache-html POST completed!".green());
            return Some(url.to_string());
        }
        None
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub fn response_count(&self) -> usize {
        self.responses
    }

    pub fn cache_posts_seen(&self) -> &[String] {
        &self.cache_posts_seen
    }

    /// POSTs that were not cache POSTs, analytics excluded.
    pub fn other_posts(&self) -> Vec<&str> {
        self.requests
            .iter()
            .filter(|(method, url)| {
                method == "POST" && !url.contains(&self.cache_url) && !url.contains("google-analytics")
            })
            .map(|(_, url)| url.as_str())
            .take(MAX_OTHER_POSTS)
            .collect()
    }

    pub fn log_timeout(&self, timeout: Duration) {
        error!(
            "Timeout waiting for main book cache-html POST after {}s",
            timeout.as_secs()
        );
        error!("Total requests made: {}", self.request_count());
        error!("Total responses received: {}", self.response_count());
        error!("Expected pattern: {}", self.expected);

        if self.cache_posts_seen.is_empty() {
            error!("No cache-html POST requests were seen!");
        } else {
            error!("Cache-html POSTs seen ({}):", self.cache_posts_seen.len());
            for url in &self.cache_posts_seen {
                error!("  - {}", url);
            }
        }

        let others = self.other_posts();
        if !others.is_empty() {
            error!("Other POST requests seen:");
            for url in others {
                error!("  - {}", url);
            }
        }
    }
}

/// Feeds a page's network events into a [`CacheTraffic`].
struct CacheObserver {
    traffic: Arc<Mutex<CacheTraffic>>,
    matched: watch::Receiver<Option<String>>,
    task: JoinHandle<()>,
}

impl CacheObserver {
    async fn attach(page: &Page, traffic: CacheTraffic) -> Result<Self> {
        let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut responses = page.event_listener::<EventResponseReceived>().await?;

        let traffic = Arc::new(Mutex::new(traffic));
        let (tx, matched) = watch::channel(None);
        let shared = Arc::clone(&traffic);
        let task = tokio::spawn(async move {
            loop {
                // A response only matches once its request's method is known.
                tokio::select! {
                    biased;
                    Some(event) = requests.next() => {
                        if let Ok(mut traffic) = shared.lock() {
                            traffic.on_request(
                                event.request_id.inner(),
                                &event.request.method,
                                &event.request.url,
                            );
                        }
                    }
                    Some(event) = responses.next() => {
                        let hit = shared.lock().ok().and_then(|mut traffic| {
                            traffic.on_response(
                                event.request_id.inner(),
                                &event.response.url,
                                event.response.status,
                            )
                        });
                        if hit.is_some() {
                            let _ = tx.send(hit);
                        }
                    }
                    else => break,
                }
            }
        });

        Ok(Self {
            traffic,
            matched,
            task,
        })
    }

    async fn wait_for_match(&self) -> Option<String> {
        let mut matched = self.matched.clone();
        let url = match matched.wait_for(Option::is_some).await {
            Ok(url) => url.clone(),
            Err(_) => None,
        };
        url
    }

    fn log_timeout(&self, timeout: Duration) {
        if let Ok(traffic) = self.traffic.lock() {
            traffic.log_timeout(timeout);
        }
    }
}

impl Drop for CacheObserver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct CacheWarmer<'a> {
    session: &'a BrowserSession,
    settings: &'a WarmSettings,
}

impl<'a> CacheWarmer<'a> {
    pub fn new(session: &'a BrowserSession, settings: &'a WarmSettings) -> Self {
        Self { session, settings }
    }

    async fn warm_on(&self, page: &Page, job: &ExportJob, budget: TimeoutBudget) -> Result<()> {
        let url = job.url(&self.settings.base_url, true)?;
        let pattern = expected_pattern(job);
        debug!("Looking for cache-html POST with pattern: {}", pattern);

        let observer =
            CacheObserver::attach(page, CacheTraffic::new(&self.settings.cache_url, &pattern)).await?;

        info!("Navigating to {}", url.as_str().green());
        let navigation = browser::navigate(page, url.as_str(), budget.navigation);
        tokio::pin!(navigation);
        let cache_post = time::timeout(budget.work, observer.wait_for_match());
        tokio::pin!(cache_post);

        let mut navigated = false;
        loop {
            tokio::select! {
                result = &mut navigation, if !navigated => {
                    result?;
                    navigated = true;
                }
                result = &mut cache_post => {
                    return match result {
                        Ok(Some(_)) => {
                            info!("Page successfully loaded and cached");
                            Ok(())
                        }
                        Ok(None) => Err(Error::Browser("network event stream closed".to_string())),
                        Err(_) => observer_timeout(&observer, budget.work, pattern),
                    };
                }
            }
        }
    }
}

fn observer_timeout(observer: &CacheObserver, timeout: Duration, pattern: String) -> Result<()> {
    observer.log_timeout(timeout);
    Err(Error::CacheTimeout { timeout, pattern })
}

impl BookTask for CacheWarmer<'_> {
    fn budget(&self, book: Option<&BookInfo>) -> TimeoutBudget {
        TimeoutBudget::for_book(book, &self.settings.navigation, &self.settings.cache)
    }

    async fn process(&self, job: &ExportJob, budget: TimeoutBudget) -> Result<()> {
        let page = self.session.new_page().await?;
        let result = self.warm_on(&page, job, budget).await;
        page.close().await.ok();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books;
    use crate::config::{Resource, CACHE_HTML_URL};
    use std::path::Path;

    fn job(repo: &str, book: Option<&str>) -> ExportJob {
        let resource = Resource {
            owner: "unfoldingWord".into(),
            repo: repo.into(),
            reference: "v86".into(),
        };
        ExportJob::new(&resource, book.and_then(books::lookup), Path::new("."), &[])
    }

    #[test]
    fn pattern_uses_book_or_repo() {
        assert_eq!(expected_pattern(&job("en_ult", Some("gen"))), "/gen.json.gz");
        assert_eq!(expected_pattern(&job("en_ta", None)), "/en_ta.json.gz");
    }

    #[test]
    fn matches_only_cache_post_for_the_book() {
        let mut traffic = CacheTraffic::new(CACHE_HTML_URL, "/gen.json.gz");
        let cache = format!("{}/u/unfoldingWord/en_ult/v86/gen.json.gz", CACHE_HTML_URL);
        let other_book = format!("{}/u/unfoldingWord/en_ult/v86/exo.json.gz", CACHE_HTML_URL);

        traffic.on_request("1", "GET", &cache);
        assert_eq!(traffic.on_response("1", &cache, 200), None);

        traffic.on_request("2", "POST", &other_book);
        assert_eq!(traffic.on_response("2", &other_book, 200), None);
        assert_eq!(traffic.cache_posts_seen(), &[other_book.clone()]);

        traffic.on_request("3", "POST", &cache);
        assert_eq!(traffic.on_response("3", &cache, 200), Some(cache.clone()));
        assert_eq!(traffic.request_count(), 3);
        assert_eq!(traffic.response_count(), 3);
    }

    #[test]
    fn response_without_known_request_never_matches() {
        let mut traffic = CacheTraffic::new(CACHE_HTML_URL, "/gen.json.gz");
        let cache = format!("{}/u/unfoldingWord/en_ult/v86/gen.json.gz", CACHE_HTML_URL);

        assert_eq!(traffic.on_response("9", &cache, 200), None);
        assert!(traffic.cache_posts_seen().is_empty());
        assert_eq!(traffic.response_count(), 1);
    }

    #[test]
    fn other_posts_skip_analytics_and_cap() {
        let mut traffic = CacheTraffic::new(CACHE_HTML_URL, "/gen.json.gz");
        traffic.on_request("a", "POST", "https://www.google-analytics.com/g/collect");
        for i in 0..12 {
            traffic.on_request(&i.to_string(), "POST", &format!("https://api.example.org/{}", i));
        }
        let others = traffic.other_posts();
        assert_eq!(others.len(), MAX_OTHER_POSTS);
        assert!(others.iter().all(|url| !url.contains("google-analytics")));
    }
}
