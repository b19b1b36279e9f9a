//! Request signing for the search API.
//!
//! The service documents only that `client_sign` is an MD5 over
//! `"2025" + len(query) + secret`. Text encoding and hex case are not specified, so the
//! resolver enumerates them and keeps whichever the remote side accepts.

use std::{fmt, time::Duration};

use md5::{Digest, Md5};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::client::{FormTransport, TransportResponse};
use crate::fallback::first_success;

pub const PROTOCOL_MARKER: &str = "2025";
pub const ACCEPTED_CODES: [&str; 2] = ["200", "0"];
pub const MAX_PAGE_SIZE: u32 = 10;
const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    Utf8,
    Gbk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseMode {
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SigningCandidate {
    pub encoding: TextEncoding,
    pub case: CaseMode,
}

/// Priority order in which signatures are tried.
pub const CANDIDATES: [SigningCandidate; 4] = [
    SigningCandidate::new(TextEncoding::Utf8, CaseMode::Lower),
    SigningCandidate::new(TextEncoding::Utf8, CaseMode::Upper),
    SigningCandidate::new(TextEncoding::Gbk, CaseMode::Lower),
    SigningCandidate::new(TextEncoding::Gbk, CaseMode::Upper),
];

impl SigningCandidate {
    pub const fn new(encoding: TextEncoding, case: CaseMode) -> Self {
        Self { encoding, case }
    }

    pub fn sign(&self, plaintext: &str) -> String {
        let digest = match self.encoding {
            TextEncoding::Utf8 => Md5::digest(plaintext.as_bytes()),
            TextEncoding::Gbk => {
                let (bytes, _, _) = encoding_rs::GBK.encode(plaintext);
                Md5::digest(&bytes)
            }
        };
        match self.case {
            CaseMode::Lower => format!("{:x}", digest),
            CaseMode::Upper => format!("{:X}", digest),
        }
    }
}

impl fmt::Display for SigningCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoding = match self.encoding {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Gbk => "gbk",
        };
        let case = match self.case {
            CaseMode::Lower => "lower",
            CaseMode::Upper => "upper",
        };
        write!(f, "{encoding}/{case}")
    }
}

/// Builds the signed plaintext. The length is counted in characters, not bytes.
pub fn signing_plaintext(query: &str, secret: &str) -> String {
    format!("{PROTOCOL_MARKER}{}{secret}", query.chars().count())
}

pub fn clamp_page_size(size: i64) -> u32 {
    size.clamp(1, i64::from(MAX_PAGE_SIZE)) as u32
}

pub fn clamp_page_index(index: i64) -> u32 {
    index.clamp(1, i64::from(u32::MAX)) as u32
}

/// Unsigned search request. Paging is clamped every time fields are rendered.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub app_key: String,
    pub query: String,
    pub sort_field: String,
    pub level: String,
    pub sort: String,
    pub source: u32,
    pub page_index: i64,
    pub page_size: i64,
    pub extra: Vec<(String, String)>,
}

impl SearchRequest {
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("app_key".to_string(), self.app_key.clone()),
            ("query".to_string(), self.query.clone()),
            ("sort_field".to_string(), self.sort_field.clone()),
            ("level".to_string(), self.level.clone()),
            (
                "page_index".to_string(),
                clamp_page_index(self.page_index).to_string(),
            ),
            ("sort".to_string(), self.sort.clone()),
            ("source".to_string(), self.source.to_string()),
            (
                "page_size".to_string(),
                clamp_page_size(self.page_size).to_string(),
            ),
        ];
        for (key, value) in &self.extra {
            match fields.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value.clone(),
                None => fields.push((key.clone(), value.clone())),
            }
        }
        // paging supplied through `extra` is clamped too
        for (key, value) in fields.iter_mut() {
            let clamped = match key.as_str() {
                "page_index" => clamp_page_index(paging_value(value, self.page_index)),
                "page_size" => clamp_page_size(paging_value(value, self.page_size)),
                _ => continue,
            };
            *value = clamped.to_string();
        }
        fields
    }
}

fn paging_value(raw: &str, fallback: i64) -> i64 {
    raw.trim().parse().unwrap_or(fallback)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted { http_status: u16, body: Value },
    Rejected { http_status: u16, snippet: String },
    Transport { error: String },
}

impl AttemptOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AttemptOutcome::Accepted { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SigningAttempt {
    pub candidate: SigningCandidate,
    pub signature: String,
    pub outcome: AttemptOutcome,
}

impl fmt::Display for SigningAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Accepted { http_status, .. } => {
                write!(f, "{}: accepted (HTTP {http_status})", self.candidate)
            }
            AttemptOutcome::Rejected {
                http_status,
                snippet,
            } => write!(f, "{}: HTTP {http_status}: {snippet}", self.candidate),
            AttemptOutcome::Transport { error } => {
                write!(f, "{}: transport error: {error}", self.candidate)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub plaintext: String,
    pub accepted: Option<SigningAttempt>,
    /// Every attempt in the order made, including the accepted one.
    pub attempts: Vec<SigningAttempt>,
}

impl Resolution {
    pub fn is_accepted(&self) -> bool {
        self.accepted.is_some()
    }

    pub fn response(&self) -> Option<&Value> {
        match self.accepted.as_ref().map(|a| &a.outcome) {
            Some(AttemptOutcome::Accepted { body, .. }) => Some(body),
            _ => None,
        }
    }
}

pub struct SignatureResolver<T> {
    transport: T,
    url: String,
    timeout: Duration,
}

impl<T: FormTransport> SignatureResolver<T> {
    pub fn new(transport: T, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            url: url.into(),
            timeout,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Tries every signing candidate in priority order and stops at the first accepted one.
    ///
    /// Transport failures are recorded against their candidate and do not end the walk.
    pub async fn resolve(&self, request: &SearchRequest, secret: &str) -> Resolution {
        let plaintext = signing_plaintext(&request.query, secret);

        let chain = first_success(
            CANDIDATES,
            |candidate| {
                let candidate = *candidate;
                let signature = candidate.sign(&plaintext);
                let mut fields = request.form_fields();
                fields.push(("client_sign".to_string(), signature.clone()));
                async move {
                    let outcome = match self
                        .transport
                        .post_form(&self.url, &fields, self.timeout)
                        .await
                    {
                        Ok(response) => classify(response),
                        Err(err) => AttemptOutcome::Transport {
                            error: err.to_string(),
                        },
                    };
                    debug!(
                        target: "search",
                        candidate = %candidate,
                        accepted = outcome.is_accepted(),
                        "signing attempt finished"
                    );
                    SigningAttempt {
                        candidate,
                        signature,
                        outcome,
                    }
                }
            },
            |attempt| attempt.outcome.is_accepted(),
        )
        .await;

        let mut attempts: Vec<SigningAttempt> =
            chain.rejected.into_iter().map(|(_, attempt)| attempt).collect();
        let accepted = chain.winner.map(|(_, _, attempt)| attempt);
        match &accepted {
            Some(winner) => {
                info!(target: "search", candidate = %winner.candidate, tries = attempts.len() + 1, "signature accepted");
                attempts.push(winner.clone());
            }
            None => {
                warn!(target: "search", tries = attempts.len(), "no signing candidate was accepted");
            }
        }

        Resolution {
            plaintext,
            accepted,
            attempts,
        }
    }
}

/// Accepted iff HTTP 200 and the decoded body's `code` is one of [`ACCEPTED_CODES`].
/// A body without `code` counts as success.
fn classify(response: TransportResponse) -> AttemptOutcome {
    let rejected = |text: &str| AttemptOutcome::Rejected {
        http_status: response.status,
        snippet: snippet(text),
    };
    if response.status != 200 {
        return rejected(&response.body);
    }
    let body: Value = match serde_json::from_str(&response.body) {
        Ok(body @ Value::Object(_)) => body,
        _ => return rejected(&response.body),
    };
    let code = match body.get("code") {
        None => "200".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if ACCEPTED_CODES.contains(&code.as_str()) {
        AttemptOutcome::Accepted {
            http_status: response.status,
            body,
        }
    } else {
        rejected(&body.to_string())
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::search::client::TransportError;

    /// Accepts exactly one signature; everything else gets a business-level rejection.
    struct StubEndpoint {
        accept_signature: String,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<(String, String)>>>,
        fail_transport_on: Option<usize>,
    }

    impl StubEndpoint {
        fn accepting(signature: String) -> Self {
            Self {
                accept_signature: signature,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                fail_transport_on: None,
            }
        }
    }

    #[async_trait]
    impl FormTransport for StubEndpoint {
        async fn post_form(
            &self,
            _url: &str,
            fields: &[(String, String)],
            _timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen.lock().push(fields.to_vec());
            if self.fail_transport_on == Some(call) {
                return Err(TransportError::Request("connection reset".into()));
            }
            let sign = fields
                .iter()
                .find(|(k, _)| k == "client_sign")
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            let body = if sign == self.accept_signature {
                r#"{"code":"200","documents":[]}"#
            } else {
                r#"{"code":"4003","msg":"sign error"}"#
            };
            Ok(TransportResponse {
                status: 200,
                body: body.to_string(),
            })
        }
    }

    fn request(page_index: i64, page_size: i64) -> SearchRequest {
        SearchRequest {
            app_key: "key".into(),
            query: "石墨烯".into(),
            sort_field: "ad_sort".into(),
            level: "TWO".into(),
            sort: "desc".into(),
            source: 63,
            page_index,
            page_size,
            extra: Vec::new(),
        }
    }

    fn field<'a>(fields: &'a [(String, String)], key: &str) -> &'a str {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn plaintext_counts_characters() {
        assert_eq!(signing_plaintext("石墨烯", "s3cret"), "20253s3cret");
        assert_eq!(signing_plaintext("", "x"), "20250x");
    }

    #[test]
    fn candidates_differ_only_by_case_for_ascii_input() {
        let plaintext = "20253abc";
        let lower = CANDIDATES[0].sign(plaintext);
        assert_eq!(lower.len(), 32);
        assert_eq!(CANDIDATES[1].sign(plaintext), lower.to_uppercase());
        assert_eq!(CANDIDATES[2].sign(plaintext), lower);
    }

    #[test]
    fn gbk_digest_differs_for_cjk_secret() {
        let plaintext = "20253密钥";
        assert_ne!(CANDIDATES[0].sign(plaintext), CANDIDATES[2].sign(plaintext));
    }

    #[test]
    fn md5_matches_known_vector() {
        assert_eq!(
            CANDIDATES[0].sign("abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn clamping_is_idempotent() {
        assert_eq!(clamp_page_size(0), 1);
        assert_eq!(clamp_page_size(15), 10);
        assert_eq!(clamp_page_size(7), 7);
        assert_eq!(clamp_page_index(-4), 1);
        for x in [-3_i64, 0, 1, 5, 10, 11, 500] {
            let once = clamp_page_size(x);
            assert_eq!(clamp_page_size(i64::from(once)), once);
            let once = clamp_page_index(x);
            assert_eq!(clamp_page_index(i64::from(once)), once);
        }
    }

    #[tokio::test]
    async fn stops_at_third_candidate_after_three_calls() {
        // A CJK secret makes the GBK digests differ from the UTF-8 ones.
        let secret = "密钥";
        let req = request(1, 10);
        let third = CANDIDATES[2].sign(&signing_plaintext(&req.query, secret));
        let resolver = SignatureResolver::new(
            StubEndpoint::accepting(third.clone()),
            "http://stub",
            Duration::from_secs(1),
        );
        let resolution = resolver.resolve(&req, secret).await;

        assert!(resolution.is_accepted());
        assert_eq!(resolver.transport().calls.load(Ordering::SeqCst), 3);
        let winner = resolution.accepted.as_ref().unwrap();
        assert_eq!(winner.candidate, CANDIDATES[2]);
        assert_eq!(winner.signature, third);
        assert_eq!(resolution.attempts.len(), 3);
        assert!(resolution.response().is_some());
    }

    #[tokio::test]
    async fn paging_is_clamped_on_every_attempt() {
        let resolver = SignatureResolver::new(
            StubEndpoint::accepting("never".into()),
            "http://stub",
            Duration::from_secs(1),
        );
        let resolution = resolver.resolve(&request(0, 15), "secret").await;

        assert!(!resolution.is_accepted());
        assert_eq!(resolution.attempts.len(), CANDIDATES.len());
        let seen = resolver.transport().seen.lock();
        assert_eq!(seen.len(), 4);
        for fields in seen.iter() {
            assert_eq!(field(fields, "page_size"), "10");
            assert_eq!(field(fields, "page_index"), "1");
        }
    }

    #[tokio::test]
    async fn transport_failure_moves_on_to_next_candidate() {
        let req = request(1, 10);
        let stub = StubEndpoint {
            fail_transport_on: Some(1),
            ..StubEndpoint::accepting(CANDIDATES[1].sign(&signing_plaintext(&req.query, "k")))
        };
        let resolver = SignatureResolver::new(stub, "http://stub", Duration::from_secs(1));
        let resolution = resolver.resolve(&req, "k").await;

        assert_eq!(resolution.accepted.unwrap().candidate, CANDIDATES[1]);
        assert!(matches!(
            resolution.attempts[0].outcome,
            AttemptOutcome::Transport { .. }
        ));
    }

    #[test]
    fn classify_requires_http_ok_and_known_code() {
        let ok = classify(TransportResponse {
            status: 200,
            body: r#"{"code":0}"#.into(),
        });
        assert!(ok.is_accepted());
        let missing_code = classify(TransportResponse {
            status: 200,
            body: r#"{"documents":[]}"#.into(),
        });
        assert!(missing_code.is_accepted());
        let server_error = classify(TransportResponse {
            status: 500,
            body: r#"{"code":"200"}"#.into(),
        });
        assert!(!server_error.is_accepted());
        let html = classify(TransportResponse {
            status: 200,
            body: "<html>".repeat(100),
        });
        match html {
            AttemptOutcome::Rejected { snippet, .. } => {
                assert_eq!(snippet.chars().count(), SNIPPET_CHARS)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extra_params_override_base_fields() {
        let mut req = request(2, 5);
        req.extra = vec![
            ("sort".into(), "asc".into()),
            ("ipc".into(), "H01".into()),
        ];
        let fields = req.form_fields();
        assert_eq!(field(&fields, "sort"), "asc");
        assert_eq!(field(&fields, "ipc"), "H01");
        assert_eq!(field(&fields, "page_size"), "5");

        req.extra = vec![
            ("page_size".into(), "50".into()),
            ("page_index".into(), "0".into()),
        ];
        let fields = req.form_fields();
        assert_eq!(field(&fields, "page_size"), "10");
        assert_eq!(field(&fields, "page_index"), "1");

        req.extra = vec![("page_size".into(), "lots".into())];
        assert_eq!(field(&req.form_fields(), "page_size"), "5");
    }
}
