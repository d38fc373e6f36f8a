//! Google News wraps publisher URLs in opaque `news.google.com/rss/articles/<id>`
//! links. Older ids carry the URL inside a base64 protobuf blob; newer
//! `AU_yqL...` ids have to be exchanged through the batchexecute endpoint using
//! a signature scraped from the article page.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::DecodeError;

pub const GOOGLE_NEWS_HOST: &str = "news.google.com";
const GOOGLE_NEWS_BASE: &str = "https://news.google.com";

/// Pause before the batchexecute call, mirroring a polite single request
pub const DEFAULT_DECODE_INTERVAL: Duration = Duration::from_secs(1);

const ID_PREFIX: [u8; 3] = [0x08, 0x13, 0x22];
const ID_SUFFIX: [u8; 3] = [0xd2, 0x01, 0x00];
const ONLINE_ID_MARKER: &str = "AU_yqL";

const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn is_aggregator_link(link: &str) -> bool {
    Url::parse(link)
        .ok()
        .and_then(|url| url.host_str().map(|host| host == GOOGLE_NEWS_HOST))
        .unwrap_or(false)
}

/// The opaque id following `/articles/` or `/read/`
pub fn article_id(link: &str) -> Result<String, DecodeError> {
    let url = Url::parse(link).map_err(|_| DecodeError::NotAggregatorLink(link.to_string()))?;
    if url.host_str() != Some(GOOGLE_NEWS_HOST) {
        return Err(DecodeError::NotAggregatorLink(link.to_string()));
    }

    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    segments
        .windows(2)
        .find(|pair| pair[0] == "articles" || pair[0] == "read")
        .map(|pair| pair[1].to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DecodeError::NotAggregatorLink(link.to_string()))
}

/// Decode an id without network access.
///
/// Returns `Ok(None)` when the id only holds a token that must be exchanged
/// online.
pub fn decode_offline(id: &str) -> Result<Option<String>, DecodeError> {
    let bytes = LENIENT_URL_SAFE
        .decode(id)
        .map_err(|e| DecodeError::InvalidId(e.to_string()))?;

    let mut payload: &[u8] = &bytes;
    if let Some(rest) = payload.strip_prefix(&ID_PREFIX[..]) {
        payload = rest;
    }
    if let Some(rest) = payload.strip_suffix(&ID_SUFFIX[..]) {
        payload = rest;
    }

    // Length-prefixed string, one or two varint bytes
    let (len, start) = match payload {
        [b0, b1, ..] if *b0 >= 0x80 => (((*b0 & 0x7f) as usize) | ((*b1 as usize) << 7), 2),
        [b0, ..] => (*b0 as usize, 1),
        [] => return Err(DecodeError::InvalidId("empty payload".to_string())),
    };
    let end = (start + len).min(payload.len());
    let inner = String::from_utf8_lossy(payload.get(start..end).unwrap_or_default());

    if inner.starts_with(ONLINE_ID_MARKER) {
        return Ok(None);
    }
    if inner.starts_with("http://") || inner.starts_with("https://") {
        return Ok(Some(inner.into_owned()));
    }

    Err(DecodeError::InvalidId(id.to_string()))
}

/// Form body for the `garturlreq` batchexecute call
pub fn batchexecute_body(id: &str, timestamp: &str, signature: &str) -> String {
    let inner = format!(
        "[\"garturlreq\",[[\"X\",\"X\",[\"X\",\"X\"],null,null,1,1,\"US:en\",null,1,null,null,null,null,null,0,1],\"X\",\"X\",1,[1,1,1],1,1,null,0,0,null,0],\"{}\",{},\"{}\"]",
        id, timestamp, signature
    );
    let request = Value::Array(vec![Value::Array(vec![Value::Array(vec![
        Value::String("Fbv4je".to_string()),
        Value::String(inner),
    ])])]);

    format!("f.req={}", urlencoding::encode(&request.to_string()))
}

/// Extract the decoded URL from a batchexecute reply.
///
/// The body is an anti-JSON prefix, a blank line, then a JSON array whose
/// first entry carries a second JSON document as a string.
pub fn parse_batchexecute_response(body: &str) -> Result<String, DecodeError> {
    let chunk = body
        .split("\n\n")
        .nth(1)
        .ok_or_else(|| DecodeError::Response("missing payload chunk".to_string()))?;

    let outer: Value =
        serde_json::from_str(chunk).map_err(|e| DecodeError::Response(e.to_string()))?;
    let embedded = outer
        .get(0)
        .and_then(|entry| entry.get(2))
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::Response("missing embedded document".to_string()))?;

    let inner: Value =
        serde_json::from_str(embedded).map_err(|e| DecodeError::Response(e.to_string()))?;
    inner
        .get(1)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DecodeError::Response("missing decoded url".to_string()))
}

/// Scrape `(timestamp, signature)` from a Google News article page
pub fn decoding_params(html: &str) -> Result<(String, String), DecodeError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("c-wiz > div[jscontroller]").map_err(|_| DecodeError::MissingSignature)?;

    let element = document
        .select(&selector)
        .next()
        .ok_or(DecodeError::MissingSignature)?;

    let signature = element.value().attr("data-n-a-sg");
    let timestamp = element.value().attr("data-n-a-ts");
    match (timestamp, signature) {
        (Some(ts), Some(sg)) => Ok((ts.to_string(), sg.to_string())),
        _ => Err(DecodeError::MissingSignature),
    }
}

pub struct GoogleNewsDecoder {
    client: Client,
    base_url: String,
    interval: Duration,
}

impl GoogleNewsDecoder {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: GOOGLE_NEWS_BASE.to_string(),
            interval: DEFAULT_DECODE_INTERVAL,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Turn an aggregator link into the publisher's URL, one attempt only
    pub async fn decode(&self, link: &str) -> Result<String, DecodeError> {
        let id = article_id(link)?;

        if let Some(url) = decode_offline(&id)? {
            debug!(link, url = %url, "Decoded Google News link offline");
            return Ok(url);
        }

        let page_url = format!("{}/rss/articles/{}", self.base_url, id);
        let html = self
            .client
            .get(&page_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let (timestamp, signature) = decoding_params(&html)?;

        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }

        let response = self
            .client
            .post(format!("{}/_/DotsSplashUi/data/batchexecute", self.base_url))
            .header("content-type", "application/x-www-form-urlencoded;charset=UTF-8")
            .body(batchexecute_body(&id, &timestamp, &signature))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let url = parse_batchexecute_response(&response)?;
        debug!(link, url = %url, "Decoded Google News link via batchexecute");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn encode_id(inner: &str) -> String {
        let mut bytes = ID_PREFIX.to_vec();
        let len = inner.len();
        if len >= 0x80 {
            bytes.push((len & 0x7f) as u8 | 0x80);
            bytes.push((len >> 7) as u8);
        } else {
            bytes.push(len as u8);
        }
        bytes.extend_from_slice(inner.as_bytes());
        bytes.extend_from_slice(&ID_SUFFIX);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    #[test]
    fn test_is_aggregator_link() {
        assert!(is_aggregator_link("https://news.google.com/rss/articles/CBMiabc?oc=5"));
        assert!(!is_aggregator_link("https://www.kathimerini.gr/news.google.com/"));
        assert!(!is_aggregator_link("not a url"));
    }

    #[test]
    fn test_article_id_from_rss_and_read_paths() {
        assert_eq!(
            article_id("https://news.google.com/rss/articles/CBMiabc?oc=5").unwrap(),
            "CBMiabc"
        );
        assert_eq!(article_id("https://news.google.com/read/CBMixyz").unwrap(), "CBMixyz");
        assert!(article_id("https://news.google.com/topstories").is_err());
        assert!(article_id("https://example.com/rss/articles/abc").is_err());
    }

    #[test]
    fn test_decode_offline_short_url() {
        let id = encode_id("https://www.ertnews.gr/eidiseis/ellada/seismos");
        assert_eq!(
            decode_offline(&id).unwrap().as_deref(),
            Some("https://www.ertnews.gr/eidiseis/ellada/seismos")
        );
    }

    #[test]
    fn test_decode_offline_two_byte_length() {
        let long = format!("https://www.naftemporiki.gr/{}", "a".repeat(150));
        let id = encode_id(&long);
        assert_eq!(decode_offline(&id).unwrap(), Some(long));
    }

    #[test]
    fn test_decode_offline_online_marker() {
        let id = encode_id("AU_yqLPzq1token");
        assert_eq!(decode_offline(&id).unwrap(), None);
    }

    #[test]
    fn test_decode_offline_rejects_garbage() {
        assert!(decode_offline("!!!not-base64!!!").is_err());
        let id = encode_id("ftp-ish nonsense");
        assert!(decode_offline(&id).is_err());
    }

    #[test]
    fn test_parse_batchexecute_response() {
        let body = ")]}'\n\n[[\"wrb.fr\",\"Fbv4je\",\"[\\\"garturlres\\\",\\\"https://www.protothema.gr/greece/article/1/\\\",1]\",null,null,null,\"generic\"],[\"di\",42],[\"af.httprm\",41,\"-1\",7]]";
        assert_eq!(
            parse_batchexecute_response(body).unwrap(),
            "https://www.protothema.gr/greece/article/1/"
        );
        assert!(parse_batchexecute_response(")]}'").is_err());
    }

    #[test]
    fn test_decoding_params_from_page() {
        let html = r#"<html><body><c-wiz><div jscontroller="aLI87" data-n-a-sg="SIG123" data-n-a-ts="1716900000"></div></c-wiz></body></html>"#;
        assert_eq!(
            decoding_params(html).unwrap(),
            ("1716900000".to_string(), "SIG123".to_string())
        );
        assert!(matches!(
            decoding_params("<html><body></body></html>"),
            Err(DecodeError::MissingSignature)
        ));
    }

    #[test]
    fn test_batchexecute_body_is_form_encoded() {
        let body = batchexecute_body("AU_yqLabc", "1716900000", "SIG");
        assert!(body.starts_with("f.req="));
        assert!(!body.contains(' '));
        let decoded = urlencoding::decode(&body["f.req=".len()..]).unwrap();
        assert!(decoded.contains("Fbv4je"));
        assert!(decoded.contains("AU_yqLabc"));
        assert!(decoded.contains("1716900000"));
    }

    #[tokio::test]
    async fn test_decode_online_roundtrip() {
        let server = MockServer::start().await;
        let id = encode_id("AU_yqLonline");

        Mock::given(method("GET"))
            .and(path(format!("/rss/articles/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<c-wiz><div jscontroller="x" data-n-a-sg="SIG" data-n-a-ts="17"></div></c-wiz>"#,
            ))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/_/DotsSplashUi/data/batchexecute"))
            .and(body_string_contains("f.req="))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                ")]}'\n\n[[\"wrb.fr\",\"Fbv4je\",\"[\\\"garturlres\\\",\\\"https://www.in.gr/2025/story/\\\",1]\"]]",
            ))
            .mount(&server)
            .await;

        let decoder = GoogleNewsDecoder::new(Client::new())
            .with_base_url(server.uri())
            .with_interval(Duration::ZERO);
        let link = format!("https://news.google.com/rss/articles/{}?oc=5", id);

        assert_eq!(decoder.decode(&link).await.unwrap(), "https://www.in.gr/2025/story/");
    }
}
