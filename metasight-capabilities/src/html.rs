use metasight_agent::TypedCapability;
use metasight_core::{CapabilityContext, CapabilityError, InputRef};
use reqwest::{Client, StatusCode};
use schemars::JsonSchema;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// Upper bound on the visible text returned for one page, in characters.
pub const MAX_PAGE_TEXT_CHARS: usize = 5_000;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; metasight/0.1)";

const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ScrapeArgs {
    /// Product page to fetch. Defaults to the URL the run was started with.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub meta_description: String,
    pub text: String,
}

pub struct HtmlScraper {
    client: Client,
}

impl HtmlScraper {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl TypedCapability for HtmlScraper {
    type Args = ScrapeArgs;
    type Output = ScrapedPage;

    const NAME: &'static str = "html_scraper";
    const DESCRIPTION: &'static str =
        "Fetch a product web page and return its title, meta description and visible text.";

    async fn run(
        &self,
        args: Self::Args,
        ctx: &CapabilityContext,
    ) -> Result<Self::Output, CapabilityError> {
        let url = match (args.url, ctx.input.as_ref()) {
            (Some(url), _) => url,
            (None, InputRef::Url(url)) => url.clone(),
            (None, _) => {
                return Err(CapabilityError::InvalidArguments(
                    "no url given and the run input is not a URL".to_string(),
                ))
            }
        };

        let response = self
            .client
            .get(&url)
            .timeout(ctx.timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(CapabilityError::Transient(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Err(CapabilityError::ExecutionFailed(format!(
                "{url} returned {status}"
            )));
        }

        let body = response.text().await.map_err(transport_error)?;
        tracing::debug!(url = %url, bytes = body.len(), "fetched product page");
        Ok(extract_page(&url, &body))
    }
}

fn transport_error(err: reqwest::Error) -> CapabilityError {
    if err.is_timeout() || err.is_connect() {
        CapabilityError::Transient(err.to_string())
    } else {
        CapabilityError::ExecutionFailed(err.to_string())
    }
}

/// Pulls the title, meta description and capped visible text out of a page.
pub fn extract_page(url: &str, html: &str) -> ScrapedPage {
    let document = Html::parse_document(html);

    let title = first_match(&document, "title")
        .map(|element| collapse(&element.text().collect::<String>()))
        .unwrap_or_default();
    let meta_description = first_match(&document, r#"meta[name="description"]"#)
        .and_then(|element| element.value().attr("content"))
        .map(collapse)
        .unwrap_or_default();

    ScrapedPage {
        url: url.to_string(),
        title,
        meta_description,
        text: truncate_chars(&visible_text(&document), MAX_PAGE_TEXT_CHARS),
    }
}

/// Text of every node outside script, style, noscript and template
/// elements, joined by single spaces.
pub(crate) fn visible_text(document: &Html) -> String {
    let mut words: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ")
}

fn first_match<'a>(document: &'a Html, css: &str) -> Option<scraper::ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
