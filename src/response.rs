use serde::{Deserialize, Serialize};

/// Response from the SearchItems API.
///
/// A well-formed response carries either a `SearchResult`, an `Errors` list,
/// or both (partial success).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchItemsResponse {
    #[serde(default)]
    pub search_result: Option<SearchResult>,
    #[serde(default)]
    pub errors: Vec<ErrorData>,
}

impl SearchItemsResponse {
    /// Items on this page, empty when the search matched nothing.
    pub fn items(&self) -> &[Item] {
        self.search_result
            .as_ref()
            .map(|r| r.items.as_slice())
            .unwrap_or_default()
    }

    /// Total number of matches reported by the upstream.
    pub fn total_result_count(&self) -> u32 {
        self.search_result
            .as_ref()
            .and_then(|r| r.total_result_count)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchResult {
    #[serde(default)]
    pub items: Vec<Item>,
    pub total_result_count: Option<u32>,
    #[serde(rename = "SearchURL")]
    pub search_url: Option<String>,
}

/// A catalog item with the resource groups this client requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Item {
    #[serde(rename = "ASIN")]
    pub asin: String,
    #[serde(rename = "DetailPageURL")]
    pub detail_page_url: Option<String>,
    pub item_info: Option<ItemInfo>,
    pub offers: Option<Offers>,
    pub images: Option<Images>,
    pub customer_reviews: Option<CustomerReviews>,
    pub browse_node_info: Option<BrowseNodeInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemInfo {
    pub title: Option<DisplayValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisplayValue {
    pub display_value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Offers {
    #[serde(default)]
    pub listings: Vec<Listing>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Listing {
    pub price: Option<Price>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Price {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub display_amount: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Images {
    pub primary: Option<ImageSet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSet {
    pub small: Option<Image>,
    pub medium: Option<Image>,
    pub large: Option<Image>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    #[serde(rename = "URL")]
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerReviews {
    pub count: Option<u64>,
    pub star_rating: Option<StarRating>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StarRating {
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrowseNodeInfo {
    pub website_sales_rank: Option<WebsiteSalesRank>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebsiteSalesRank {
    pub sales_rank: Option<u64>,
}

/// Error entry in an upstream response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorData {
    pub code: String,
    pub message: String,
}

/// Upstream error response body.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    #[serde(rename = "__type")]
    pub error_type: Option<String>,
    #[serde(rename = "Errors", default)]
    pub errors: Vec<ErrorData>,
}

/// Simplified item record returned to inbound callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub asin: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub display_price: Option<String>,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub sales_rank: Option<u64>,
}

impl From<&Item> for Product {
    fn from(item: &Item) -> Self {
        let price = item
            .offers
            .as_ref()
            .and_then(|o| o.listings.first())
            .and_then(|l| l.price.as_ref());
        let image = item
            .images
            .as_ref()
            .and_then(|i| i.primary.as_ref())
            .and_then(|p| p.medium.as_ref().or(p.large.as_ref()).or(p.small.as_ref()));
        let reviews = item.customer_reviews.as_ref();

        Self {
            asin: item.asin.clone(),
            title: item
                .item_info
                .as_ref()
                .and_then(|i| i.title.as_ref())
                .map(|t| t.display_value.clone()),
            url: item.detail_page_url.clone(),
            price: price.and_then(|p| p.amount),
            currency: price.and_then(|p| p.currency.clone()),
            display_price: price.and_then(|p| p.display_amount.clone()),
            image_url: image.map(|i| i.url.clone()),
            rating: reviews
                .and_then(|r| r.star_rating.as_ref())
                .and_then(|s| s.value),
            review_count: reviews.and_then(|r| r.count),
            sales_rank: item
                .browse_node_info
                .as_ref()
                .and_then(|b| b.website_sales_rank.as_ref())
                .and_then(|w| w.sales_rank),
        }
    }
}

/// Result of a paginated search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// At least one item survived filtering.
    Products(Vec<Product>),
    /// The search was well-formed but nothing matched.
    NoResults,
}

impl SearchOutcome {
    pub(crate) fn from_products(products: Vec<Product>) -> Self {
        if products.is_empty() {
            SearchOutcome::NoResults
        } else {
            SearchOutcome::Products(products)
        }
    }

    /// HTTP status an inbound handler should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            SearchOutcome::Products(_) => 200,
            SearchOutcome::NoResults => 404,
        }
    }

    pub fn products(&self) -> &[Product] {
        match self {
            SearchOutcome::Products(products) => products,
            SearchOutcome::NoResults => &[],
        }
    }
}
