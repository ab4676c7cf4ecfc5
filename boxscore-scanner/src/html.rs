//! Stateless HTML extraction: text, metadata, links, images, tables and ad-hoc
//! selector queries. Every function loads its own document; nothing is cached.

use crate::error::HtmlError;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use url::Url;

pub type Result<T> = std::result::Result<T, HtmlError>;

/// Elements whose text never counts as readable content.
const NON_CONTENT_TAGS: [&str; 3] = ["script", "style", "noscript"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub author: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub og_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLink {
    pub href: String,
    pub text: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedImage {
    pub src: String,
    pub alt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
    pub links: Vec<ExtractedLink>,
    pub images: Vec<ExtractedImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorMatches {
    pub matches: Vec<String>,
    pub count: usize,
}

pub fn parse(html: &str, base_url: Option<&str>) -> Result<ParsedDocument> {
    let document = load_document(html)?;
    let base = parse_base(base_url);

    Ok(ParsedDocument {
        text: body_text(&document, &[])?,
        metadata: extract_metadata(&document)?,
        links: collect_links(&document, base.as_ref())?,
        images: collect_images(&document, base.as_ref())?,
    })
}

/// Readable body text with scripts, styles and noscript blocks removed.
pub fn extract_text(html: &str) -> Result<String> {
    let document = load_document(html)?;
    body_text(&document, &NON_CONTENT_TAGS)
}

pub fn extract_links(html: &str, base_url: Option<&str>) -> Result<Vec<ExtractedLink>> {
    let document = load_document(html)?;
    collect_links(&document, parse_base(base_url).as_ref())
}

pub fn extract_metadata_from(html: &str) -> Result<DocumentMetadata> {
    let document = load_document(html)?;
    extract_metadata(&document)
}

/// Applies `css` and returns either the named attribute of each match (only
/// when present) or each match's trimmed text.
pub fn query_selector(html: &str, css: &str, attribute: Option<&str>) -> Result<SelectorMatches> {
    let selector = selector(css)?;
    let document = load_document(html)?;

    let matches: Vec<String> = document
        .select(&selector)
        .filter_map(|element| match attribute {
            Some(name) => element.value().attr(name).map(str::to_string),
            None => Some(element.text().collect::<String>().trim().to_string()),
        })
        .collect();

    Ok(SelectorMatches {
        count: matches.len(),
        matches,
    })
}

/// Each element matched by `row_css` becomes one row of its `th`/`td` cell
/// texts. Rows without cells are dropped.
pub fn extract_table(html: &str, row_css: &str) -> Result<Vec<Vec<String>>> {
    let rows = selector(row_css)?;
    let cells = selector("th, td")?;
    let document = load_document(html)?;

    Ok(document
        .select(&rows)
        .map(|row| {
            row.select(&cells)
                .map(|cell| collapse_whitespace(&cell.text().collect::<String>()))
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect())
}

fn load_document(html: &str) -> Result<Html> {
    panic::catch_unwind(AssertUnwindSafe(|| Html::parse_document(html))).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown parser failure".to_string());
        HtmlError::Parser(reason)
    })
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|_| HtmlError::Selector {
        selector: css.to_string(),
    })
}

fn parse_base(base_url: Option<&str>) -> Option<Url> {
    base_url.and_then(|base| Url::parse(base).ok())
}

fn resolve(href: &str, base: Option<&Url>) -> String {
    base.and_then(|base| base.join(href).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| href.to_string())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn body_text(document: &Html, skip: &[&str]) -> Result<String> {
    let body = selector("body")?;
    let root = document
        .select(&body)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    push_text(root, skip, &mut raw);
    Ok(collapse_whitespace(&raw))
}

fn push_text(element: ElementRef<'_>, skip: &[&str], out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child)
            && !skip.contains(&child.value().name())
        {
            push_text(child, skip, out);
        }
    }
}

fn extract_metadata(document: &Html) -> Result<DocumentMetadata> {
    let title = document
        .select(&selector("title")?)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(DocumentMetadata {
        title,
        description: meta_content(document, r#"meta[name="description"]"#)?,
        keywords: meta_content(document, r#"meta[name="keywords"]"#)?,
        author: meta_content(document, r#"meta[name="author"]"#)?,
        og_title: meta_content(document, r#"meta[property="og:title"]"#)?,
        og_description: meta_content(document, r#"meta[property="og:description"]"#)?,
        og_image: meta_content(document, r#"meta[property="og:image"]"#)?,
        og_url: meta_content(document, r#"meta[property="og:url"]"#)?,
    })
}

fn meta_content(document: &Html, css: &str) -> Result<Option<String>> {
    Ok(document
        .select(&selector(css)?)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .filter(|content| !content.is_empty())
        .map(str::to_string))
}

fn collect_links(document: &Html, base: Option<&Url>) -> Result<Vec<ExtractedLink>> {
    Ok(document
        .select(&selector("a[href]")?)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            Some(ExtractedLink {
                href: resolve(href, base),
                text: anchor.text().collect::<String>().trim().to_string(),
                title: anchor.value().attr("title").map(str::to_string),
            })
        })
        .collect())
}

fn collect_images(document: &Html, base: Option<&Url>) -> Result<Vec<ExtractedImage>> {
    Ok(document
        .select(&selector("img[src]")?)
        .filter_map(|img| {
            let element = img.value();
            Some(ExtractedImage {
                src: resolve(element.attr("src")?, base),
                alt: element.attr("alt").map(str::to_string),
                width: element.attr("width").and_then(parse_dimension),
                height: element.attr("height").and_then(parse_dimension),
            })
        })
        .collect())
}

/// Integer value of a width/height attribute. A trailing `px` is tolerated;
/// anything else non-numeric is treated as absent.
fn parse_dimension(value: &str) -> Option<u32> {
    let value = value.trim();
    value
        .strip_suffix("px")
        .unwrap_or(value)
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
        <html>
          <head>
            <title> 2019 Standings </title>
            <meta name="description" content="Final regular season standings">
            <meta property="og:title" content="Standings">
            <meta property="og:url" content="https://archive.test/2019/standings">
            <style>.hidden { display: none }</style>
          </head>
          <body>
            <h1>Standings</h1>
            <p>Top   of the
               table</p>
            <a href="/2019/teams/ANA" title="Anaheim">  Anaheim </a>
            <a href="https://other.test/x">External</a>
            <img src="/logo.png" alt="logo" width="120" height="tall">
            <img src="banner.jpg" width="80px">
          </body>
        </html>"#;

    #[test]
    fn test_parse_full_document() {
        let doc = parse(PAGE, Some("https://archive.test/2019/")).unwrap();

        assert_eq!(doc.text, "Standings Top of the table Anaheim External");
        assert_eq!(doc.metadata.title.as_deref(), Some("2019 Standings"));
        assert_eq!(
            doc.metadata.description.as_deref(),
            Some("Final regular season standings")
        );
        assert_eq!(doc.metadata.og_title.as_deref(), Some("Standings"));
        assert_eq!(
            doc.metadata.og_url.as_deref(),
            Some("https://archive.test/2019/standings")
        );

        assert_eq!(doc.links.len(), 2);
        assert_eq!(doc.links[0].href, "https://archive.test/2019/teams/ANA");
        assert_eq!(doc.links[0].text, "Anaheim");
        assert_eq!(doc.links[0].title.as_deref(), Some("Anaheim"));
        assert_eq!(doc.links[1].href, "https://other.test/x");

        assert_eq!(doc.images.len(), 2);
        assert_eq!(doc.images[0].src, "https://archive.test/logo.png");
        assert_eq!(doc.images[0].alt.as_deref(), Some("logo"));
        assert_eq!(doc.images[0].width, Some(120));
        assert_eq!(doc.images[0].height, None);
        assert_eq!(doc.images[1].src, "https://archive.test/2019/banner.jpg");
        assert_eq!(doc.images[1].width, Some(80));
        assert_eq!(doc.images[1].alt, None);
    }

    #[test]
    fn test_missing_metadata_is_none() {
        let doc = parse("<p>nothing here</p>", None).unwrap();
        assert_eq!(doc.metadata, DocumentMetadata::default());
        assert_eq!(doc.text, "nothing here");
    }

    #[test]
    fn test_links_stay_relative_without_base() {
        let links = extract_links("<a href='/x'>t</a>", None).unwrap();
        assert_eq!(links[0].href, "/x");

        let links = extract_links("<a href='/x'>t</a>", Some("not a base")).unwrap();
        assert_eq!(links[0].href, "/x");
    }

    #[test]
    fn test_extract_links_resolves_against_base() {
        let links = extract_links("<a href='/x'>t</a>", Some("https://h.test")).unwrap();
        assert_eq!(
            links,
            vec![ExtractedLink {
                href: "https://h.test/x".to_string(),
                text: "t".to_string(),
                title: None,
            }]
        );
    }

    #[test]
    fn test_extract_text_strips_scripts_and_collapses() {
        let text = extract_text("<script>bad()</script><body>  a   b </body>").unwrap();
        assert_eq!(text, "a b");

        let text = extract_text(
            "<body><noscript>enable js</noscript><p>x</p><style>p{}</style><script>y()</script></body>",
        )
        .unwrap();
        assert_eq!(text, "x");
    }

    #[test]
    fn test_malformed_markup_does_not_fail() {
        let doc = parse("<html><body><div><p>unclosed <b>bold <a href=x>link", None).unwrap();
        assert_eq!(doc.text, "unclosed bold link");
        assert_eq!(doc.links.len(), 1);
    }

    #[test]
    fn test_query_selector_text_and_attribute() {
        let html = r#"<ul><li class="p" data-id="1"> Ava </li><li class="p">Ben</li></ul>"#;

        let texts = query_selector(html, "li.p", None).unwrap();
        assert_eq!(texts.matches, vec!["Ava", "Ben"]);
        assert_eq!(texts.count, 2);

        let ids = query_selector(html, "li.p", Some("data-id")).unwrap();
        assert_eq!(ids.matches, vec!["1"]);
        assert_eq!(ids.count, 1);
    }

    #[test]
    fn test_query_selector_invalid_selector() {
        let err = query_selector("<p></p>", "li[[", None).unwrap_err();
        assert_eq!(
            err,
            HtmlError::Selector {
                selector: "li[[".to_string()
            }
        );

        let err = extract_table("<table></table>", "tr::bogus").unwrap_err();
        assert_eq!(
            err,
            HtmlError::Selector {
                selector: "tr::bogus".to_string()
            }
        );
    }

    #[test]
    fn test_extract_table_rows() {
        let html = r#"<table id="standings">
            <thead><tr><th>Team</th><th>W</th><th>L</th></tr></thead>
            <tbody>
              <tr><td>Boston   Blades</td><td>50</td><td>32</td></tr>
              <tr><td>Denver</td><td>41</td><td>41</td></tr>
              <tr></tr>
            </tbody>
        </table>"#;

        let rows = extract_table(html, "table#standings tbody tr").unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["Boston Blades", "50", "32"],
                vec!["Denver", "41", "41"],
            ]
        );
    }
}
