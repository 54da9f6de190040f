// src/products/paapi.rs
//! Amazon Product Advertising API 5.0 `SearchItems` client.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::sigv4::{sign_post, SigningParams};
use super::{ProductHit, ProductSearch};

pub const ENV_ACCESS_KEY: &str = "AMAZON_PAAPI_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "AMAZON_PAAPI_SECRET_KEY";
pub const ENV_PARTNER_TAG: &str = "AMAZON_PAAPI_PARTNER_TAG";
pub const ENV_HOST: &str = "AMAZON_PAAPI_HOST";
pub const ENV_REGION: &str = "AMAZON_PAAPI_REGION";

const SERVICE: &str = "ProductAdvertisingAPI";
const TARGET: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.SearchItems";
const PATH: &str = "/paapi5/searchitems";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const TIMEOUT_SECS: u64 = 25;

const RESOURCES: [&str; 5] = [
    "ItemInfo.Title",
    "ItemInfo.ByLineInfo",
    "ItemInfo.Features",
    "Offers.Listings.Price",
    "Images.Primary.Medium",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaapiCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub partner_tag: String,
    pub host: String,
    pub region: String,
}

impl PaapiCredentials {
    /// `None` when any of the three secrets is missing or blank: the
    /// integration is simply not configured.
    pub fn from_env() -> Option<Self> {
        let get = |k: &str| {
            std::env::var(k)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Some(Self {
            access_key: get(ENV_ACCESS_KEY)?,
            secret_key: get(ENV_SECRET_KEY)?,
            partner_tag: get(ENV_PARTNER_TAG)?,
            host: get(ENV_HOST).unwrap_or_else(|| "webservices.amazon.it".to_string()),
            region: get(ENV_REGION).unwrap_or_else(|| "eu-west-1".to_string()),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchItemsRequest<'a> {
    keywords: &'a str,
    marketplace: &'a str,
    partner_tag: &'a str,
    partner_type: &'a str,
    item_count: u32,
    resources: &'a [&'a str],
}

/* ---- response shape (every field optional) ---- */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchItemsResponse {
    search_result: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResult {
    #[serde(default)]
    items: Vec<PaItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PaItem {
    #[serde(rename = "ASIN")]
    asin: Option<String>,
    #[serde(rename = "DetailPageURL")]
    detail_page_url: Option<String>,
    item_info: Option<ItemInfo>,
    offers: Option<Offers>,
    images: Option<Images>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemInfo {
    title: Option<DisplayValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DisplayValue {
    display_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Offers {
    #[serde(default)]
    listings: Vec<Listing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Listing {
    price: Option<Price>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Price {
    amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Images {
    primary: Option<ImageSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageSet {
    medium: Option<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    #[serde(rename = "URL")]
    url: Option<String>,
}

/// Reduce a `SearchItems` response to hits. Items without an ASIN are dropped;
/// a missing detail URL becomes `https://{marketplace}/dp/{asin}/?tag={partner_tag}`.
pub fn parse_search_response(body: &str, marketplace: &str, partner_tag: &str) -> Result<Vec<ProductHit>> {
    let resp: SearchItemsResponse = serde_json::from_str(body).context("parsing PA-API response")?;
    let items = resp.search_result.map(|r| r.items).unwrap_or_default();

    Ok(items
        .into_iter()
        .filter_map(|it| {
            let asin = it.asin.map(|a| a.trim().to_string()).filter(|a| !a.is_empty())?;
            let title = it
                .item_info
                .and_then(|i| i.title)
                .and_then(|t| t.display_value)
                .unwrap_or_default();
            let price_eur = it
                .offers
                .and_then(|o| o.listings.into_iter().next())
                .and_then(|l| l.price)
                .and_then(|p| p.amount);
            let image = it
                .images
                .and_then(|i| i.primary)
                .and_then(|p| p.medium)
                .and_then(|m| m.url);
            let link = it
                .detail_page_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| format!("https://{marketplace}/dp/{asin}/?tag={partner_tag}"));
            Some(ProductHit {
                asin,
                title,
                price_eur,
                image,
                link,
            })
        })
        .collect())
}

pub struct PaapiClient {
    creds: PaapiCredentials,
    marketplace: String,
    item_count: u32,
    http: reqwest::Client,
}

impl PaapiClient {
    pub fn new(creds: PaapiCredentials, marketplace: &str, item_count: u32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .context("building PA-API http client")?;
        Ok(Self {
            creds,
            marketplace: marketplace.to_string(),
            item_count,
            http,
        })
    }
}

#[async_trait]
impl ProductSearch for PaapiClient {
    async fn search(&self, keywords: &str) -> Result<Vec<ProductHit>> {
        let body = serde_json::to_string(&SearchItemsRequest {
            keywords,
            marketplace: &self.marketplace,
            partner_tag: &self.creds.partner_tag,
            partner_type: "Associates",
            item_count: self.item_count,
            resources: &RESOURCES,
        })
        .context("serializing SearchItems request")?;

        let extra = [
            ("content-encoding", "amz-1.0"),
            ("content-type", CONTENT_TYPE),
            ("x-amz-target", TARGET),
        ];
        let signed = sign_post(&SigningParams {
            access_key: &self.creds.access_key,
            secret_key: &self.creds.secret_key,
            region: &self.creds.region,
            service: SERVICE,
            host: &self.creds.host,
            path: PATH,
            headers: &extra,
            body: &body,
            now: Utc::now(),
        });

        let resp = self
            .http
            .post(format!("https://{}{}", self.creds.host, PATH))
            .header("content-encoding", "amz-1.0")
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-target", TARGET)
            .header("Authorization", &signed.authorization)
            .body(body)
            .send()
            .await
            .with_context(|| format!("PA-API request for {keywords:?}"))?;

        let status = resp.status();
        let text = resp.text().await.context("reading PA-API body")?;
        if !status.is_success() {
            bail!(
                "PA-API {}: {}",
                status,
                text.chars().take(400).collect::<String>()
            );
        }
        parse_search_response(&text, &self.marketplace, &self.creds.partner_tag)
    }

    fn name(&self) -> &str {
        "paapi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_pascal_case() {
        let body = serde_json::to_value(SearchItemsRequest {
            keywords: "apribottiglie insolito",
            marketplace: "www.amazon.it",
            partner_tag: "tag-21",
            partner_type: "Associates",
            item_count: 10,
            resources: &RESOURCES,
        })
        .unwrap();
        assert_eq!(body["Keywords"], "apribottiglie insolito");
        assert_eq!(body["PartnerType"], "Associates");
        assert_eq!(body["ItemCount"], 10);
        assert_eq!(body["Resources"][3], "Offers.Listings.Price");
    }

    #[test]
    fn empty_result_is_empty() {
        assert!(parse_search_response("{}", "www.amazon.it", "t").unwrap().is_empty());
        assert!(parse_search_response("nope", "www.amazon.it", "t").is_err());
    }

    #[serial_test::serial]
    #[test]
    fn credentials_require_all_secrets() {
        std::env::set_var(ENV_ACCESS_KEY, "ak");
        std::env::set_var(ENV_SECRET_KEY, "sk");
        std::env::set_var(ENV_PARTNER_TAG, "  ");
        std::env::remove_var(ENV_HOST);
        std::env::remove_var(ENV_REGION);
        assert!(PaapiCredentials::from_env().is_none());

        std::env::set_var(ENV_PARTNER_TAG, "ketogo-21");
        let c = PaapiCredentials::from_env().unwrap();
        assert_eq!(c.host, "webservices.amazon.it");
        assert_eq!(c.region, "eu-west-1");

        for k in [ENV_ACCESS_KEY, ENV_SECRET_KEY, ENV_PARTNER_TAG] {
            std::env::remove_var(k);
        }
    }
}
