//! Request building and signing for the SearchItems operation.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::config::{ClientConfig, MAX_ITEM_COUNT, MAX_ITEM_PAGE};
use crate::credential::Credential;
use crate::error::{PaapiError, Result};
use crate::sign::{HOST, Signer, SigningContext};

pub(crate) const SEARCH_ITEMS_PATH: &str = "/paapi5/searchitems";
const SEARCH_ITEMS_TARGET: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.SearchItems";
const CONTENT_ENCODING: &str = "amz-1.0";
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Resource groups requested when the caller does not pick any.
pub const DEFAULT_RESOURCES: &[&str] = &[
    "ItemInfo.Title",
    "Offers.Listings.Price",
    "Images.Primary.Medium",
    "CustomerReviews.Count",
    "CustomerReviews.StarRating",
    "BrowseNodeInfo.WebsiteSalesRank",
];

/// Cached regex for partner tag validation.
///
/// Tag format: `{store-name}-{2 digit locale suffix}`, e.g. `mystore-20`.
static PARTNER_TAG_REGEX: OnceLock<Regex> = OnceLock::new();

fn partner_tag_regex() -> &'static Regex {
    PARTNER_TAG_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*-\d{2}$")
            .expect("Invalid PARTNER_TAG_REGEX pattern")
    })
}

fn validate_partner_tag(tag: &str) -> Result<()> {
    if !partner_tag_regex().is_match(tag) {
        return Err(PaapiError::Configuration(format!(
            "Invalid partner tag '{tag}'. Expected: {{store name}}-{{2 digits}}"
        )));
    }
    Ok(())
}

/// Offer availability filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Availability {
    Available,
    IncludeOutOfStock,
}

/// Sort order for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortBy {
    AvgCustomerReviews,
    Featured,
    NewestArrivals,
    #[serde(rename = "Price:HighToLow")]
    PriceHighToLow,
    #[serde(rename = "Price:LowToHigh")]
    PriceLowToHigh,
    Relevance,
}

/// Search parameters for the SearchItems API.
///
/// Prices are expressed in the lowest currency denomination (cents).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchItemsRequest {
    pub keywords: String,
    /// Category to search, `All` when unset.
    pub search_index: Option<String>,
    /// Items per page, 1 to 10.
    pub item_count: Option<u32>,
    /// Page for single-page searches, 1 to 10.
    pub item_page: Option<u32>,
    /// Resource groups to return; [`DEFAULT_RESOURCES`] when empty.
    pub resources: Vec<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub availability: Option<Availability>,
    pub delivery_flags: Vec<String>,
    pub merchant: Option<String>,
    pub brand: Option<String>,
    pub sort_by: Option<SortBy>,
    /// Minimum star rating, 1 to 4.
    pub min_reviews_rating: Option<u8>,
}

impl SearchItemsRequest {
    pub fn new(keywords: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            ..Self::default()
        }
    }

    pub fn with_search_index(mut self, index: impl Into<String>) -> Self {
        self.search_index = Some(index.into());
        self
    }

    pub fn with_item_count(mut self, count: u32) -> Self {
        self.item_count = Some(count);
        self
    }

    pub fn with_item_page(mut self, page: u32) -> Self {
        self.item_page = Some(page);
        self
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_price_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = Some(availability);
        self
    }

    pub fn with_delivery_flag(mut self, flag: impl Into<String>) -> Self {
        self.delivery_flags.push(flag.into());
        self
    }

    pub fn with_merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = Some(sort_by);
        self
    }

    pub fn with_min_reviews_rating(mut self, rating: u8) -> Self {
        self.min_reviews_rating = Some(rating);
        self
    }

    /// Checks caller-supplied input before anything is signed or sent.
    pub fn validate(&self) -> Result<()> {
        if self.keywords.trim().is_empty() {
            return Err(PaapiError::Validation(
                "keywords are required for searching".into(),
            ));
        }
        if let Some(count) = self.item_count
            && !(1..=MAX_ITEM_COUNT).contains(&count)
        {
            return Err(PaapiError::Validation(format!(
                "item count {count} outside 1..={MAX_ITEM_COUNT}"
            )));
        }
        if let Some(page) = self.item_page {
            validate_page(page)?;
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price)
            && min > max
        {
            return Err(PaapiError::Validation(format!(
                "min price {min} exceeds max price {max}"
            )));
        }
        if let Some(rating) = self.min_reviews_rating
            && !(1..=4).contains(&rating)
        {
            return Err(PaapiError::Validation(format!(
                "min reviews rating {rating} outside 1..=4"
            )));
        }
        Ok(())
    }
}

fn validate_page(page: u32) -> Result<()> {
    if !(1..=MAX_ITEM_PAGE).contains(&page) {
        return Err(PaapiError::Validation(format!(
            "item page {page} outside 1..={MAX_ITEM_PAGE}"
        )));
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchItemsBody<'a> {
    keywords: &'a str,
    partner_tag: &'a str,
    partner_type: &'a str,
    marketplace: &'a str,
    search_index: &'a str,
    item_count: u32,
    item_page: u32,
    resources: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    availability: Option<Availability>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    delivery_flags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    merchant: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    brand: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_by: Option<SortBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_reviews_rating: Option<u8>,
}

/// A fully signed request ready to send.
#[derive(Debug, Clone)]
pub(crate) struct SignedRequest {
    pub url: String,
    /// Outgoing headers. `host` is left to the HTTP client, which derives the
    /// same value from `url`.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Builds and signs one SearchItems call for `page`.
///
/// This function:
/// 1. Validates the search input, partner tag and page number
/// 2. Serializes the JSON body with partner and marketplace parameters
/// 3. Signs method, path, headers and body at `now`
/// 4. Merges the signature headers into the outgoing header set
///
/// # Errors
///
/// Returns [`PaapiError::Validation`] for bad search input and
/// [`PaapiError::Configuration`] for bad credentials or configuration.
pub(crate) fn build_signed_request(
    request: &SearchItemsRequest,
    page: u32,
    page_size: u32,
    credential: &Credential,
    config: &ClientConfig,
    now: DateTime<Utc>,
) -> Result<SignedRequest> {
    request.validate()?;
    validate_page(page)?;
    credential.validate()?;
    validate_partner_tag(&credential.partner_tag)?;

    let resources: Vec<&str> = if request.resources.is_empty() {
        DEFAULT_RESOURCES.to_vec()
    } else {
        request.resources.iter().map(String::as_str).collect()
    };
    let body = SearchItemsBody {
        keywords: request.keywords.trim(),
        partner_tag: &credential.partner_tag,
        partner_type: &config.partner_type,
        marketplace: &config.marketplace,
        search_index: request.search_index.as_deref().unwrap_or("All"),
        item_count: page_size,
        item_page: page,
        resources,
        min_price: request.min_price,
        max_price: request.max_price,
        availability: request.availability,
        delivery_flags: request.delivery_flags.iter().map(String::as_str).collect(),
        merchant: request.merchant.as_deref(),
        brand: request.brand.as_deref(),
        sort_by: request.sort_by,
        min_reviews_rating: request.min_reviews_rating,
    };
    let payload = serde_json::to_vec(&body)?;

    let ctx = SigningContext::new(credential, &config.region, &config.service, config.host()?, now)
        .with_path(SEARCH_ITEMS_PATH)
        .with_header("content-encoding", CONTENT_ENCODING)
        .with_header("content-type", JSON_CONTENT_TYPE)
        .with_header("x-amz-target", SEARCH_ITEMS_TARGET)
        .with_payload(payload);

    let signature = Signer::hmac_sha256().sign(&ctx)?;

    let mut headers = ctx.headers;
    headers.remove(HOST);
    headers.extend(signature);

    Ok(SignedRequest {
        url: config.url_for(SEARCH_ITEMS_PATH),
        headers,
        body: ctx.payload,
    })
}
