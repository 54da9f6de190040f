// src/products/sigv4.rs
//! Minimal AWS Signature V4 for JSON POST requests (PA-API 5.0 style).
//!
//! ```text
//! kDate    = HMAC("AWS4" + secret, dateStamp)
//! kRegion  = HMAC(kDate, region)
//! kService = HMAC(kRegion, service)
//! kSigning = HMAC(kService, "aws4_request")
//! ```

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Everything needed to sign one request.
#[derive(Debug, Clone)]
pub struct SigningParams<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    /// Extra headers to sign besides `host` and `x-amz-date`, lowercase names.
    pub headers: &'a [(&'a str, &'a str)],
    pub body: &'a str,
    pub now: DateTime<Utc>,
}

/// Output of signing: headers to attach to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
}

pub fn sign_post(p: &SigningParams<'_>) -> SignedHeaders {
    let amz_date = p.now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = p.now.format("%Y%m%d").to_string();

    let mut headers: Vec<(String, String)> = p
        .headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    headers.push(("host".to_string(), p.host.to_string()));
    headers.push(("x-amz-date".to_string(), amz_date.clone()));
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "POST\n{}\n\n{}\n{}\n{}",
        p.path,
        canonical_headers,
        signed_headers,
        hex_sha256(p.body.as_bytes())
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, p.region, p.service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(p.secret_key, &date_stamp, p.region, p.service);
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    SignedHeaders {
        authorization: format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, p.access_key, credential_scope, signed_headers, signature
        ),
        amz_date,
    }
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}
