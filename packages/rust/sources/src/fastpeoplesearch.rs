//! FastPeopleSearch HTTP source.
//!
//! A query fetches `/name/{first}-{last}_{where}`, picks the result link that
//! best matches the queried name, then fetches and parses that detail page.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use leadscout_shared::{
    LeadScoutError, QueryVariation, SearchQuery, SearchResult, SourceSettings,
};

use crate::{PersonSearchSource, SourceError};

/// Browser-like User-Agent; the site rejects obvious bots outright.
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/124.0 Safari/537.36 LeadScout/",
    env!("CARGO_PKG_VERSION")
);

/// Lower-cased phrases that only appear on challenge or block pages.
const BLOCK_MARKERS: &[&str] = &[
    "access denied",
    "unusual traffic",
    "are you a human",
    "verify you are human",
    "verifying you are human",
    "checking your browser",
    "please wait while we check your browser",
    "security check",
    "just a moment",
    "please enable cookies",
    "captcha",
];

/// A page needs at least this many person-specific sections to count as a detail page.
const DETAIL_MIN_SIGNALS: usize = 2;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        static $name: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse($css).expect("valid selector"));
    };
}

selector!(ANCHOR, "a[href]");
selector!(AGE_HEADER, "#age-header");
selector!(RELATIVE_LINKS, "#relative-links a[title*='Details for']");
selector!(ASSOCIATE_LINKS, "#associate-links a[title*='Details for']");
selector!(PHONE_LINKS, "a[title*='phone number']");
selector!(CURRENT_ADDRESS_LINK, "a[title*='Search people living at']");
selector!(CURRENT_ADDRESS_DETAILS, "#current-address-details");
selector!(
    PREVIOUS_ADDRESS_LINKS,
    "#previous-addresses a[title*='Search people who live at']"
);
selector!(BACKGROUND, "#background-report");
selector!(FAQS, "#faqs");
selector!(MARITAL, "#marital_status_section p");
selector!(CF_EMAILS, "a.__cf_email__, span.__cf_email__");
selector!(MAILTO, "a[href^='mailto:']");
selector!(HEADLINES, "title, h1, h2");
selector!(
    CHALLENGE_WIDGETS,
    "#challenge-form, #challenge-running, #cf-challenge-running, .cf-turnstile, \
     .g-recaptcha, .h-captcha, iframe[src*='challenges.cloudflare.com'], iframe[src*='captcha']"
);
selector!(
    DISPLAY_NAME,
    "#details-header .fullname, h1#details-header, h1.fullname, h1"
);

/// Searches fastpeoplesearch.com (or a compatible mirror at `base_url`).
pub struct FastPeopleSearchSource {
    name: String,
    base_url: Url,
    timeout: Duration,
    client: Option<Client>,
}

impl FastPeopleSearchSource {
    pub fn new(settings: &SourceSettings) -> leadscout_shared::Result<Self> {
        let base_url = Url::parse(&settings.base_url).map_err(|e| {
            LeadScoutError::config(format!(
                "invalid base_url '{}' for source '{}': {e}",
                settings.base_url, settings.name
            ))
        })?;

        Ok(Self {
            name: settings.name.clone(),
            base_url,
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
            client: None,
        })
    }

    /// Fetch a page. `Ok(None)` means the site answered 404.
    async fn fetch(&self, client: &Client, url: &Url) -> Result<Option<String>, SourceError> {
        debug!(%url, "fetching");

        let response = client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| classify_transport(url, e))?;

        let status = response.status();
        match status {
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                return Err(SourceError::AccessDenied(format!("{url}: HTTP {status}")));
            }
            StatusCode::NOT_FOUND => return Ok(None),
            s if s.is_server_error() => {
                return Err(SourceError::Network(format!("{url}: HTTP {status}")));
            }
            s if !s.is_success() => {
                return Err(SourceError::Structural(format!("{url}: HTTP {status}")));
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(url, e))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl PersonSearchSource for FastPeopleSearchSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&mut self) -> Result<(), SourceError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(self.timeout)
            .build()
            .map_err(|e| SourceError::Network(format!("failed to build HTTP client: {e}")))?;
        self.client = Some(client);
        debug!(source = %self.name, base_url = %self.base_url, "session opened");
        Ok(())
    }

    #[instrument(skip_all, fields(source = %self.name, record_id = %query.person_id, variation = query.variation.as_str()))]
    async fn search(&mut self, query: &SearchQuery) -> Result<Vec<SearchResult>, SourceError> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| SourceError::Structural("search called before open".into()))?;

        let Some(url) = search_url(&self.base_url, query) else {
            debug!("name has no searchable characters");
            return Ok(Vec::new());
        };

        let Some(body) = self.fetch(&client, &url).await? else {
            return Ok(Vec::new());
        };

        let mut result = match read_results_page(&body, &url, query) {
            ResultsPage::Detail => extract_candidate(&body, &url)?,
            ResultsPage::Blocked => {
                return Err(SourceError::AccessDenied(format!("{url}: challenge page")));
            }
            ResultsPage::Empty => {
                debug!("no result links");
                return Ok(Vec::new());
            }
            ResultsPage::Link(href, text) => {
                let detail = self.fetch(&client, &href).await?.ok_or_else(|| {
                    SourceError::Structural(format!("{href}: detail page not found"))
                })?;
                let mut result = extract_candidate(&detail, &href)?;
                if result.name.is_empty() {
                    result.name = text;
                }
                result
            }
        };

        result.source = self.name.clone();
        result.variation = Some(query.variation);
        if result.name.is_empty() {
            result.name = query.full_name.clone();
        }

        debug!(
            phones = result.phones.len(),
            emails = result.emails.len(),
            "parsed detail page"
        );
        Ok(vec![result])
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        if self.client.take().is_some() {
            debug!(source = %self.name, "session closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for FastPeopleSearchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastPeopleSearchSource")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .field("open", &self.client.is_some())
            .finish()
    }
}

fn classify_transport(url: &Url, e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout(format!("{url}: {e}"))
    } else {
        SourceError::Network(format!("{url}: {e}"))
    }
}

// ---------------------------------------------------------------------------
// URL building
// ---------------------------------------------------------------------------

/// Keep letters, hyphens and spaces; spaces become hyphens.
fn url_name_part(s: &str) -> String {
    let kept: String = s
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || *c == '-' || *c == ' ')
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("-")
}

fn zip5(zip: &str) -> Option<String> {
    let digits: String = zip.chars().filter(char::is_ascii_digit).take(5).collect();
    (digits.len() == 5).then_some(digits)
}

/// `Springfield-IL` style slug.
fn city_state_slug(city: &str, state: &str) -> Option<String> {
    let city = url_name_part(city);
    let state = state.trim().to_ascii_uppercase();
    if city.is_empty() || state.len() != 2 {
        return None;
    }
    Some(format!("{city}-{state}"))
}

/// Build the results-page URL for a query. `None` when the name has nothing searchable.
pub fn search_url(base: &Url, query: &SearchQuery) -> Option<Url> {
    let first = url_name_part(&query.first);
    let last = url_name_part(&query.last);
    if first.is_empty() || last.is_empty() {
        return None;
    }

    let addr = &query.address;
    let zip = addr.zip.as_deref().and_then(zip5);
    let slug = match (&addr.city, &addr.state) {
        (Some(city), Some(state)) => city_state_slug(city, state),
        _ => None,
    };

    let place = match query.variation {
        QueryVariation::FullAddress => zip.or(slug),
        QueryVariation::NameCity => slug.or(zip),
        QueryVariation::NameOnly => None,
    };

    let path = match place {
        Some(place) => format!("/name/{first}-{last}_{place}"),
        None => format!("/name/{first}-{last}"),
    };
    base.join(&path).ok()
}

// ---------------------------------------------------------------------------
// Page classification
// ---------------------------------------------------------------------------

/// Whether the page is a block or challenge page. Only the title, headings and
/// challenge widgets are inspected; footers and scripts are ignored.
pub fn looks_blocked(doc: &Html) -> bool {
    if doc.select(&CHALLENGE_WIDGETS).next().is_some() {
        return true;
    }
    doc.select(&HEADLINES).any(|el| {
        let text = element_text(&el).to_lowercase();
        BLOCK_MARKERS.iter().any(|m| text.contains(m))
    })
}

/// Count person-specific sections present in the document.
fn count_detail_signals(doc: &Html) -> usize {
    [
        doc.select(&AGE_HEADER).next().is_some(),
        doc.select(&RELATIVE_LINKS).next().is_some() || doc.select(&ASSOCIATE_LINKS).next().is_some(),
        doc.select(&PHONE_LINKS).next().is_some(),
        doc.select(&CURRENT_ADDRESS_LINK).next().is_some(),
        doc.select(&BACKGROUND).next().is_some() || doc.select(&FAQS).next().is_some(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count()
}

// ---------------------------------------------------------------------------
// Results page
// ---------------------------------------------------------------------------

fn normalize_name(s: &str) -> String {
    static NON_ALPHA: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z\s]+").expect("valid regex"));
    let lower = s.to_lowercase();
    let spaced = NON_ALPHA.replace_all(&lower, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_detail_link(href: &str, text: &str) -> bool {
    let href = href.to_lowercase();
    let text = text.to_lowercase();
    href.contains("/person")
        || href.contains("/people")
        || href.contains("/details")
        || href.contains("_id_")
        || (text.contains("view") && text.contains("detail"))
}

/// +2 when both names are in the link text (+1 for either), +1 when both are in the href.
fn score_link(text: &str, href: &str, first: &str, last: &str) -> u32 {
    let text = normalize_name(text);
    let href = normalize_name(href);
    let mut score = 0;
    if text.contains(first) && text.contains(last) {
        score += 2;
    } else if text.contains(first) || text.contains(last) {
        score += 1;
    }
    if href.contains(first) && href.contains(last) {
        score += 1;
    }
    score
}

/// Pick the detail link that best matches the queried name. Ties keep page order.
fn best_result_link(doc: &Html, page_url: &Url, first: &str, last: &str) -> Option<(Url, String)> {
    let first = normalize_name(first);
    let last = normalize_name(last);
    let mut seen = HashSet::new();
    let mut best: Option<(u32, Url, String)> = None;

    for el in doc.select(&ANCHOR) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let text = element_text(&el);
        if !is_detail_link(href, &text) {
            continue;
        }
        let Ok(mut resolved) = page_url.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        if !seen.insert(resolved.to_string()) {
            continue;
        }

        let score = score_link(&text, resolved.path(), &first, &last);
        if best.as_ref().is_none_or(|(s, _, _)| score > *s) {
            best = Some((score, resolved, text));
        }
    }

    best.map(|(_, url, text)| (url, text))
}

/// What a fetched results page turned out to be.
enum ResultsPage {
    /// The site redirected a unique match straight to its detail page.
    Detail,
    Blocked,
    Empty,
    /// Best-matching detail link and its text.
    Link(Url, String),
}

fn read_results_page(body: &str, page_url: &Url, query: &SearchQuery) -> ResultsPage {
    let doc = Html::parse_document(body);
    if count_detail_signals(&doc) >= DETAIL_MIN_SIGNALS {
        return ResultsPage::Detail;
    }
    if let Some((href, text)) = best_result_link(&doc, page_url, &query.first, &query.last) {
        return ResultsPage::Link(href, text);
    }
    if looks_blocked(&doc) {
        ResultsPage::Blocked
    } else {
        ResultsPage::Empty
    }
}

/// Validate and parse a detail page.
fn extract_candidate(html: &str, page_url: &Url) -> Result<SearchResult, SourceError> {
    let doc = Html::parse_document(html);
    if count_detail_signals(&doc) < DETAIL_MIN_SIGNALS {
        if looks_blocked(&doc) {
            return Err(SourceError::AccessDenied(format!("{page_url}: challenge page")));
        }
        warn!(url = %page_url, "detail page missing expected sections");
        return Err(SourceError::Structural(format!(
            "{page_url}: detail page missing expected sections"
        )));
    }
    Ok(parse_detail_page(&doc, page_url))
}

// ---------------------------------------------------------------------------
// Detail page
// ---------------------------------------------------------------------------

/// Whitespace-collapsed text content of an element.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn texts(doc: &Html, selector: &Selector) -> Vec<String> {
    let mut seen = HashSet::new();
    doc.select(selector)
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty())
}

/// Decode a Cloudflare-obfuscated address: hex bytes, the first is an XOR key.
pub fn decode_cf_email(encoded: &str) -> Option<String> {
    if encoded.len() < 4 || encoded.len() % 2 != 0 {
        return None;
    }
    let bytes: Vec<u8> = (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(encoded.get(i..i + 2)?, 16).ok())
        .collect::<Option<_>>()?;
    let (key, rest) = bytes.split_first()?;
    let decoded: String = rest.iter().map(|b| char::from(b ^ key)).collect();
    decoded.contains('@').then_some(decoded)
}

fn parse_emails(doc: &Html) -> Vec<String> {
    let mut emails = Vec::new();
    for el in doc.select(&CF_EMAILS) {
        let text = element_text(&el);
        let email = if text.contains('@') {
            Some(text)
        } else {
            el.value().attr("data-cfemail").and_then(decode_cf_email)
        };
        emails.extend(email);
    }
    for el in doc.select(&MAILTO) {
        if let Some(addr) = el.value().attr("href").and_then(|h| h.strip_prefix("mailto:")) {
            emails.push(addr.trim().to_string());
        }
    }

    let mut seen = HashSet::new();
    emails
        .into_iter()
        .map(|e| e.to_lowercase())
        .filter(|e| !e.is_empty() && seen.insert(e.clone()))
        .collect()
}

fn parse_age(doc: &Html) -> Option<u32> {
    static AGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(\d{1,3})\b").expect("valid regex"));
    let header = first_text(doc, &AGE_HEADER)?;
    AGE_RE
        .captures(&header)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Extract a candidate from a detail page. `source` and `variation` are left for the caller.
fn parse_detail_page(doc: &Html, page_url: &Url) -> SearchResult {
    let current_address = first_text(doc, &CURRENT_ADDRESS_LINK)
        .or_else(|| first_text(doc, &CURRENT_ADDRESS_DETAILS));

    SearchResult {
        source: String::new(),
        variation: None,
        name: first_text(doc, &DISPLAY_NAME).unwrap_or_default(),
        age: parse_age(doc),
        phones: texts(doc, &PHONE_LINKS),
        emails: parse_emails(doc),
        relatives: texts(doc, &RELATIVE_LINKS),
        associates: texts(doc, &ASSOCIATE_LINKS),
        current_address,
        address_history: texts(doc, &PREVIOUS_ADDRESS_LINKS),
        marital_status: first_text(doc, &MARITAL),
        background: first_text(doc, &BACKGROUND),
        page_url: Some(page_url.to_string()),
        certainty: None,
    }
}
