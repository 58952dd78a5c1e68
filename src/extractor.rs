use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::coordinator::CoordinatorHandle;
use crate::error::{AppError, Failure, Result};
use crate::presenter::{self, PresenterHandle};
use crate::protocol::{truncate_chars, AnalysisRequest, Outcome, PresenterMessage};

// Create a static client to reuse connections
static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(10)
        .build()
        .expect("Failed to build HTTP client")
});

// Where the readable part of a page usually lives, most specific first
static CONTENT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article", "main", ".post-content", ".entry-content", "#content", "body"]
        .iter()
        .map(|s| Selector::parse(s).expect("Failed to parse content selector"))
        .collect()
});

const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// The page as it looked when the extractor ran.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub min_text_chars: usize,
    pub max_text_chars: usize,
    pub idle_dismiss: Duration,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            min_text_chars: 10,
            max_text_chars: 8000,
            idle_dismiss: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for ExtractorSettings {
    fn from(config: &Config) -> Self {
        Self {
            min_text_chars: config.min_text_chars,
            max_text_chars: config.max_text_chars,
            idle_dismiss: config.idle_dismiss,
        }
    }
}

pub async fn fetch_page(url: &str, timeout: Duration) -> Result<PageSnapshot> {
    let fetch = async {
        let response = CLIENT.get(url).send().await?.error_for_status()?;
        response.text().await
    };

    let html = match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(html)) => html,
        Ok(Err(e)) => return Err(AppError::FetchError(format!("Failed to fetch HTML: {}", e))),
        Err(_) => {
            return Err(AppError::FetchError(format!(
                "HTML fetch timed out after {:?}",
                timeout
            )));
        }
    };

    Ok(PageSnapshot {
        url: url.to_string(),
        html,
    })
}

/// Best-effort readable text of a page, capped at `max_chars` characters.
///
/// Returns `None` when the document has no text at all.
pub fn sample_text(html: &str, max_chars: usize) -> Option<String> {
    let document = Html::parse_document(html);

    let root = CONTENT_SELECTORS
        .iter()
        .find_map(|selector| document.select(selector).next())?;

    let text = collapse_whitespace(&visible_text(root));
    if text.is_empty() {
        return None;
    }

    Some(truncate_chars(&text, max_chars).to_string())
}

fn visible_text(root: ElementRef<'_>) -> String {
    let mut result = String::new();

    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            result.push_str(text);
            result.push(' ');
        }
    }

    result
}

fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for word in text.split_whitespace() {
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(word);
    }

    result
}

/// Per-page-view side of a scan: holds the sample and asks the coordinator.
pub struct Extractor {
    coordinator: CoordinatorHandle,
    settings: ExtractorSettings,
    text: String,
    url: String,
}

impl Extractor {
    /// Samples `page`. `None` means there is nothing to scan and no
    /// affordance should be offered.
    pub fn attach(
        page: &PageSnapshot,
        coordinator: CoordinatorHandle,
        settings: ExtractorSettings,
    ) -> Option<Self> {
        let Some(text) = sample_text(&page.html, settings.max_text_chars) else {
            debug!(url = %page.url, "no readable text, skipping scan affordance");
            return None;
        };

        Some(Self {
            coordinator,
            settings,
            text,
            url: page.url.clone(),
        })
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// The request this page would send, or `EmptyInput` when the sample is
    /// too short to be worth a round trip.
    pub fn request(&self) -> std::result::Result<AnalysisRequest, Failure> {
        let request = AnalysisRequest::new(self.text.clone(), self.url.clone());
        if request.is_too_short(self.settings.min_text_chars) {
            return Err(Failure::empty_input(self.settings.min_text_chars));
        }
        Ok(request)
    }

    /// Asks for a verdict and waits for it.
    pub async fn assess(&self) -> Outcome {
        let request = self.request()?;
        self.coordinator.submit(request).await
    }

    /// Starts an assessment before any presenter exists. A scan issued while
    /// this is in flight joins the same call; one issued after it finishes is
    /// served from the cache.
    pub fn prefetch(&self) -> JoinHandle<Outcome> {
        let request = self.request();
        let coordinator = self.coordinator.clone();
        debug!(url = %self.url, "prefetching assessment");

        tokio::spawn(async move { coordinator.submit(request?).await })
    }

    /// Opens a presenter and feeds it the outcome of this page's assessment.
    pub fn scan(&self) -> PresenterHandle {
        let surface = presenter::spawn(self.settings.idle_dismiss);
        let request = self.request();
        let coordinator = self.coordinator.clone();
        let feed = surface.clone();
        info!(url = %self.url, words = self.word_count(), "scan started");

        tokio::spawn(async move {
            feed.deliver(PresenterMessage::Loading).await;
            let outcome = match request {
                Ok(request) => coordinator.submit(request).await,
                Err(failure) => Err(failure),
            };
            if !feed.deliver(PresenterMessage::from(outcome)).await {
                debug!("presenter dismissed before the outcome arrived");
            }
        });

        surface
    }
}
