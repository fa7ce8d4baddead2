//! Result discovery: finding image elements for a query

use super::query::Query;
use super::source::ImageElement;
use crate::error::{DatasetError, Result};
use async_trait::async_trait;
use lol_html::{element, HtmlRewriter, Settings};
use std::collections::HashSet;
use url::Url;

/// Source of result image elements for a query
#[async_trait]
pub trait ImageFinder: Send + Sync {
    /// Discover every result image element for `query`
    async fn find_images(&self, query: &Query) -> Result<Vec<ImageElement>>;
}

/// Finder that requests HTML results pages and extracts their `img` elements
///
/// Pages are requested from a URL template. `{query}` is replaced by the
/// form-encoded query text and `{start}` by the number of elements seen so
/// far. Paging stops when a page contributes no new element, when a later
/// page fails to load, or after `max_pages` requests. Only a failure of the
/// first page is an error.
#[derive(Debug, Clone)]
pub struct HtmlResultsFinder {
    client: reqwest::Client,
    template: String,
    max_pages: usize,
}

impl HtmlResultsFinder {
    pub fn new<S: Into<String>>(client: reqwest::Client, template: S, max_pages: usize) -> Self {
        Self {
            client,
            template: template.into(),
            max_pages,
        }
    }

    /// Results page URL for `query` starting at result `start`
    #[must_use]
    pub fn page_url(&self, query: &Query, start: usize) -> String {
        let encoded: String =
            url::form_urlencoded::byte_serialize(query.text().as_bytes()).collect();
        self.template
            .replace("{query}", &encoded)
            .replace("{start}", &start.to_string())
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DatasetError::network_error(format!("Failed to request {}", url), e))?;

        if !response.status().is_success() {
            return Err(DatasetError::network_error(
                format!("Results page {}", url),
                format!("HTTP {}", response.status()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DatasetError::network_error(format!("Failed to read {}", url), e))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl ImageFinder for HtmlResultsFinder {
    async fn find_images(&self, query: &Query) -> Result<Vec<ImageElement>> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();

        for page in 0..self.max_pages {
            let url = self.page_url(query, found.len());
            let body = match self.fetch_page(&url).await {
                Ok(body) => body,
                Err(e) if page > 0 => {
                    log::warn!(
                        "Stopping at results page {} for '{}', keeping {} element(s): {}",
                        page + 1,
                        query,
                        found.len(),
                        e
                    );
                    break;
                },
                Err(e) => return Err(e),
            };
            let base = Url::parse(&url).ok();

            let mut fresh = Vec::new();
            let mut new_sources = 0;
            for element in extract_image_elements(&body)? {
                let element = absolutize(element, base.as_ref());
                match element.source_attribute().map(str::to_string) {
                    Some(key) => {
                        if seen.insert(key) {
                            new_sources += 1;
                            fresh.push(element);
                        }
                    },
                    // kept so the workers report them as skipped
                    None => fresh.push(element),
                }
            }

            log::debug!(
                "Results page {} for '{}' added {} new source(s)",
                page + 1,
                query,
                new_sources
            );

            if new_sources == 0 {
                break;
            }
            found.extend(fresh);
        }

        Ok(found)
    }
}

/// Extract `src` and `data-src` of every `img` element in an HTML document
///
/// # Errors
/// - The HTML rewriter rejects the document
pub fn extract_image_elements(html: &[u8]) -> Result<Vec<ImageElement>> {
    let mut elements = Vec::new();

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("img", |el| {
                elements.push(ImageElement::new(
                    el.get_attribute("src"),
                    el.get_attribute("data-src"),
                ));
                Ok(())
            })],
            ..Settings::default()
        },
        |_: &[u8]| {},
    );

    let parse_error = |e: lol_html::errors::RewritingError| {
        DatasetError::processing(format!("Failed to parse results page: {}", e))
    };
    rewriter.write(html).map_err(parse_error)?;
    rewriter.end().map_err(parse_error)?;

    Ok(elements)
}

/// Resolve relative remote sources against the page URL
fn absolutize(element: ImageElement, base: Option<&Url>) -> ImageElement {
    let resolve = |value: Option<String>| {
        value.map(|value| match base {
            Some(base) if !value.starts_with("data:") && !value.trim().is_empty() => base
                .join(value.trim())
                .map_or(value, |url| url.to_string()),
            _ => value,
        })
    };

    ImageElement::new(resolve(element.src), resolve(element.data_src))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_image_elements() {
        let html = br#"<html><body>
            <img class="rg_i" src="data:image/jpeg;base64,/9j/4AA=">
            <img class="rg_i" data-src="https://example.com/a.jpg">
            <div><img src="/thumb/b.png" data-src="https://example.com/b.png"></div>
            <a href="https://example.com/not-an-image">link</a>
        </body></html>"#;

        let elements = extract_image_elements(html).unwrap();
        assert_eq!(elements.len(), 3);
        assert_eq!(
            elements[0].src.as_deref(),
            Some("data:image/jpeg;base64,/9j/4AA=")
        );
        assert_eq!(elements[1].src, None);
        assert_eq!(elements[1].data_src.as_deref(), Some("https://example.com/a.jpg"));
        assert_eq!(elements[2].src.as_deref(), Some("/thumb/b.png"));
    }

    #[test]
    fn test_extract_from_page_without_images() {
        let elements = extract_image_elements(b"<p>no results</p>").unwrap();
        assert!(elements.is_empty());
    }

    #[test]
    fn test_absolutize_relative_sources() {
        let base = Url::parse("https://images.example.com/search?q=car").unwrap();
        let element = ImageElement::new(
            Some("/thumb/1.jpg".to_string()),
            Some("data:image/png;base64,iVBORw==".to_string()),
        );

        let resolved = absolutize(element, Some(&base));
        assert_eq!(
            resolved.src.as_deref(),
            Some("https://images.example.com/thumb/1.jpg")
        );
        assert_eq!(
            resolved.data_src.as_deref(),
            Some("data:image/png;base64,iVBORw==")
        );
    }

    #[test]
    fn test_page_url_encodes_query() {
        let finder = HtmlResultsFinder::new(
            reqwest::Client::new(),
            "https://example.com/search?q={query}&start={start}",
            3,
        );
        assert_eq!(
            finder.page_url(&Query::new("Koenigsegg One:1"), 40),
            "https://example.com/search?q=Koenigsegg+One%3A1&start=40"
        );
    }
}
