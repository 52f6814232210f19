//! AWS Signature Version 4.
//!
//! <https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_sigv-create-signed-request.html>

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Everything but the RFC 3986 unreserved set is encoded.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Signs requests for one service in one region.
#[derive(Debug, Clone)]
pub struct SigV4Signer<'a> {
    pub credentials: &'a crate::config::AwsCredentials,
    pub region: &'a str,
    pub service: &'a str,
}

impl<'a> SigV4Signer<'a> {
    /// Add `x-amz-date`, `x-amz-content-sha256`, the optional security token
    /// and `authorization` to `headers`. `headers` must already carry `host`.
    pub fn sign(
        &self,
        method: &str,
        url: &url::Url,
        headers: &mut BTreeMap<String, String>,
        body: &[u8],
        now: DateTime<Utc>,
    ) {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = &amz_date[..8];
        let payload_hash = hex::encode(Sha256::digest(body));

        headers.insert("x-amz-date".into(), amz_date.clone());
        headers.insert("x-amz-content-sha256".into(), payload_hash.clone());
        if let Some(ref token) = self.credentials.session_token {
            headers.insert("x-amz-security-token".into(), token.clone());
        }

        let signed_headers = headers.keys().map(|k| k.to_lowercase()).collect::<Vec<_>>().join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k.to_lowercase(), v.trim()))
            .collect();
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            canonical_path(url.path()),
            canonical_query(url),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let scope = format!("{}/{}/{}/aws4_request", date, self.region, self.service);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let key = [self.region, self.service, "aws4_request"].iter().fold(
            hmac(format!("AWS4{}", self.credentials.secret_access_key).as_bytes(), date.as_bytes()),
            |k, part| hmac(&k, part.as_bytes()),
        );
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

        headers.insert(
            "authorization".into(),
            format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.credentials.access_key_id, scope, signed_headers, signature
            ),
        );
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode per SigV4 (unreserved characters stay literal).
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, UNRESERVED).to_string()
}

/// Path segments are encoded twice for every service except S3, which this
/// crate never talks to. `url` has already encoded them once.
fn canonical_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

fn canonical_query(url: &url::Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Form-encode Query protocol parameters.
pub fn form_encode(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
