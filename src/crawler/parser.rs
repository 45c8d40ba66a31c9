use std::collections::HashSet;

/// Path suffixes accepted as downloadable images
const URL_IMAGE_SUFFIXES: &[&str] = &[".jpg", ".jpeg", ".png", ".bmp"];

/// Pull full-size image URLs out of a search result page.
///
/// Result pages embed the original image URLs inside script blobs as JSON
/// strings, often with `\u003d`-style and `\/` escapes. The body is unescaped
/// first and then scanned for `http(s)://` tokens whose path ends in a known
/// image extension. URLs are returned in page order without duplicates.
pub fn extract_image_urls(body: &str) -> Vec<String> {
    let text = unescape(body);
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    let mut rest = text.as_str();
    while let Some(pos) = rest.find("http") {
        let candidate = &rest[pos..];
        let end = candidate
            .find(is_url_terminator)
            .unwrap_or(candidate.len());
        let url = &candidate[..end];

        if is_image_url(url) && seen.insert(url) {
            urls.push(url.to_string());
        }

        // "http" is ASCII, so skipping at least 4 bytes stays on a char boundary
        rest = &candidate[end.max(4)..];
    }

    urls
}

fn is_url_terminator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | '[' | ']' | '\\')
}

fn is_image_url(url: &str) -> bool {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return false;
    }
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    URL_IMAGE_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// Decode `\uXXXX` and `\/` escapes plus `&amp;`
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('/') => {
                chars.next();
                out.push('/');
            }
            Some('u') => {
                let hex: String = chars.clone().skip(1).take(4).collect();
                let decoded = (hex.len() == 4 && hex.chars().all(|h| h.is_ascii_hexdigit()))
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match decoded {
                    Some(decoded) => {
                        // 'u' plus four hex digits
                        for _ in 0..5 {
                            chars.next();
                        }
                        out.push(decoded);
                    }
                    None => out.push(c),
                }
            }
            _ => out.push(c),
        }
    }

    out.replace("&amp;", "&")
}
