//! Simple line-oriented payload parsers.
use crate::process::{Parsed, PayloadParser, Response, UnparseableFormat};

fn is_absolute_http(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    (lower.starts_with("http://") && url.len() > 7) || (lower.starts_with("https://") && url.len() > 8)
}

fn text<'a>(response: &Response<'a>) -> Result<&'a str, UnparseableFormat> {
    std::str::from_utf8(response.payload)
        .map_err(|e| UnparseableFormat::new(response.url, format!("payload is not UTF-8: {}", e)))
}

/// Plain-text lists of URLs, one per line.
///
/// Blank lines and lines starting with `#` are ignored. A non-empty payload must contain at least
/// one absolute HTTP(S) URL.
#[derive(Debug, Default, Clone)]
pub struct UrlListParser;

impl PayloadParser for UrlListParser {
    fn parse(&mut self, response: &Response<'_>) -> Result<Parsed, UnparseableFormat> {
        let text = text(response)?;
        let mut entries = 0;
        let mut other = 0;
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if is_absolute_http(line) {
                entries += 1;
            } else {
                other += 1;
            }
        }

        if entries == 0 && other > 0 {
            return Err(UnparseableFormat::new(response.url, "no URLs found"));
        }
        Ok(Parsed::Document { entries })
    }
}

/// robots.txt files, reduced to the sitemaps they point at.
///
/// A robots.txt naming sitemaps is an index of them; one without is a document whose entries are
/// its directive lines.
#[derive(Debug, Default, Clone)]
pub struct RobotsSitemapParser;

impl PayloadParser for RobotsSitemapParser {
    fn parse(&mut self, response: &Response<'_>) -> Result<Parsed, UnparseableFormat> {
        let text = text(response)?;
        let mut sitemaps = vec![];
        let mut directives = 0;

        for line in text.lines() {
            let line = match line.find('#') {
                Some(i) => &line[..i],
                None => line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field.trim(), value.trim()),
                None => continue,
            };
            directives += 1;
            if field.eq_ignore_ascii_case("sitemap") && is_absolute_http(value) {
                sitemaps.push(value.to_owned());
            }
        }

        if !sitemaps.is_empty() {
            Ok(Parsed::Index(sitemaps))
        } else if directives == 0 && !text.trim().is_empty() {
            Err(UnparseableFormat::new(response.url, "no robots.txt directives"))
        } else {
            Ok(Parsed::Document {
                entries: directives,
            })
        }
    }
}
