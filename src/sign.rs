//! AWS Signature Version 4 for outgoing catalog requests.
//!
//! The canonical request signed here is:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! \n                      (query parameters are never signed)
//! CanonicalHeaders\n
//! SignedHeaders\n
//! HexEncode(SHA256(Payload))
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::credential::Credential;
use crate::error::{PaapiError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signature algorithm name embedded in the string to sign and the header.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

pub const AUTHORIZATION: &str = "authorization";
pub const X_AMZ_DATE: &str = "x-amz-date";
pub const HOST: &str = "host";
pub const CONTENT_TYPE: &str = "content-type";

const DEFAULT_CONTENT_TYPE: &str = "application/json";
const SCOPE_TERMINATOR: &str = "aws4_request";
const REQUIRED_HEADERS: [&str; 2] = [HOST, X_AMZ_DATE];

/// Headers produced by the signer, keyed by lower-cased name.
pub type SignedHeaders = BTreeMap<String, String>;

/// Keyed digest used for every HMAC step of the signature.
pub trait KeyedDigest {
    fn hmac(&self, key: &[u8], message: &[u8]) -> Result<Vec<u8>>;
}

/// HMAC-SHA256, the only digest the algorithm accepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256Digest;

impl KeyedDigest for HmacSha256Digest {
    fn hmac(&self, key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| PaapiError::Configuration(format!("HMAC key error: {e}")))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Everything needed to sign one outgoing request.
///
/// Build a fresh context per call: the timestamp must be the instant the
/// request is about to be sent.
#[derive(Clone)]
pub struct SigningContext {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub service: String,
    pub http_method: String,
    pub uri_path: String,
    /// Headers to sign, including `host`. Names are compared case-insensitively.
    pub headers: BTreeMap<String, String>,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl SigningContext {
    /// Creates a `POST /` context with `host` and `x-amz-date` already in the
    /// header set, both derived from the arguments.
    pub fn new(
        credential: &Credential,
        region: impl Into<String>,
        service: impl Into<String>,
        host: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(HOST.to_string(), host.into());
        headers.insert(X_AMZ_DATE.to_string(), amz_date_time(&timestamp));
        Self {
            access_key: credential.access_key.clone(),
            secret_key: credential.secret_key.clone(),
            region: region.into(),
            service: service.into(),
            http_method: "POST".to_string(),
            uri_path: "/".to_string(),
            headers,
            payload: Vec::new(),
            timestamp,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.http_method = method.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.uri_path = path.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Adds a header to the signed set.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("access_key", &self.access_key)
            .field("secret_key", &"****")
            .field("region", &self.region)
            .field("service", &self.service)
            .field("http_method", &self.http_method)
            .field("uri_path", &self.uri_path)
            .field("headers", &self.headers)
            .field("payload_len", &self.payload.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Compact ISO-8601 UTC date-time, `YYYYMMDDTHHMMSSZ`.
pub fn amz_date_time(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Short date, `YYYYMMDD`.
pub fn date_stamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y%m%d").to_string()
}

/// `date/region/service/aws4_request`.
pub fn credential_scope(date_stamp: &str, region: &str, service: &str) -> String {
    format!("{date_stamp}/{region}/{service}/{SCOPE_TERMINATOR}")
}

/// Normalized header set: lower-cased names, collapsed values, empty values dropped.
///
/// The same map feeds both the canonical headers block and the signed header
/// list, so the two always agree in membership and order.
fn normalize_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut normalized: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = collapse_whitespace(value);
        if value.is_empty() {
            continue;
        }
        normalized
            .entry(name.trim().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    normalized
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `name:value\n` for every header, in sorted order.
pub fn build_canonical_headers(headers: &BTreeMap<String, String>) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect()
}

/// Semicolon-joined sorted header names.
pub fn build_signed_headers(headers: &BTreeMap<String, String>) -> String {
    headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
}

fn canonical_uri(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}

/// Builds the canonical request from an already normalized header set.
pub fn build_canonical_request(
    method: &str,
    uri_path: &str,
    headers: &BTreeMap<String, String>,
    payload: &[u8],
) -> String {
    let canonical_headers = build_canonical_headers(headers);
    let signed_headers = build_signed_headers(headers);
    let payload_hash = hex::encode(Sha256::digest(payload));
    format!(
        "{}\n{}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
        method.to_ascii_uppercase(),
        canonical_uri(uri_path),
    )
}

/// Signs requests with a pluggable keyed digest.
#[derive(Debug, Clone, Default)]
pub struct Signer<D = HmacSha256Digest> {
    digest: D,
}

impl Signer {
    /// Signer backed by [`HmacSha256Digest`].
    pub fn hmac_sha256() -> Self {
        Self {
            digest: HmacSha256Digest,
        }
    }
}

impl<D: KeyedDigest> Signer<D> {
    pub fn new(digest: D) -> Self {
        Self { digest }
    }

    /// Derives the day-scoped signing key.
    ///
    /// `kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`
    pub fn derive_signing_key(
        &self,
        secret_key: &str,
        date_stamp: &str,
        region: &str,
        service: &str,
    ) -> Result<Vec<u8>> {
        let seed = format!("AWS4{secret_key}");
        let k_date = self.digest.hmac(seed.as_bytes(), date_stamp.as_bytes())?;
        let k_region = self.digest.hmac(&k_date, region.as_bytes())?;
        let k_service = self.digest.hmac(&k_region, service.as_bytes())?;
        self.digest.hmac(&k_service, SCOPE_TERMINATOR.as_bytes())
    }

    /// Computes the `Authorization` header for one request.
    ///
    /// Returns `authorization`, `x-amz-date` and `content-type`, to be merged
    /// into the outgoing headers. The content type echoes the signed
    /// `content-type` header when there is one so merging never invalidates
    /// the signature.
    ///
    /// # Errors
    ///
    /// Returns [`PaapiError::Configuration`] if the access or secret key is
    /// empty, if `host` or `x-amz-date` is missing from the header set, or if
    /// `x-amz-date` does not match the context timestamp. These checks run
    /// before any HMAC computation.
    pub fn sign(&self, ctx: &SigningContext) -> Result<SignedHeaders> {
        if ctx.access_key.is_empty() || ctx.secret_key.is_empty() {
            return Err(PaapiError::Configuration(
                "access key and secret key must be provided".into(),
            ));
        }

        let headers = normalize_headers(&ctx.headers);
        for required in REQUIRED_HEADERS {
            if !headers.contains_key(required) {
                return Err(PaapiError::Configuration(format!(
                    "missing required header: {required}"
                )));
            }
        }

        let amz_date = amz_date_time(&ctx.timestamp);
        let day = date_stamp(&ctx.timestamp);
        if headers[X_AMZ_DATE] != amz_date {
            return Err(PaapiError::Configuration(format!(
                "x-amz-date header '{}' does not match signing timestamp {amz_date}",
                headers[X_AMZ_DATE]
            )));
        }

        let canonical_request =
            build_canonical_request(&ctx.http_method, &ctx.uri_path, &headers, &ctx.payload);
        let signed_headers = build_signed_headers(&headers);
        tracing::debug!(signed_headers = %signed_headers, "built canonical request");

        let scope = credential_scope(&day, &ctx.region, &ctx.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key =
            self.derive_signing_key(&ctx.secret_key, &day, &ctx.region, &ctx.service)?;
        let signature =
            hex::encode(self.digest.hmac(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            ctx.access_key
        );
        let content_type = headers
            .get(CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let mut out = SignedHeaders::new();
        out.insert(AUTHORIZATION.to_string(), authorization);
        out.insert(X_AMZ_DATE.to_string(), amz_date);
        out.insert(CONTENT_TYPE.to_string(), content_type);
        Ok(out)
    }
}

/// Computes the authorization headers with HMAC-SHA256.
pub fn compute_authorization_header(ctx: &SigningContext) -> Result<SignedHeaders> {
    Signer::hmac_sha256().sign(ctx)
}
