use crate::response::Product;

/// Client-side predicate applied to every fetched item.
///
/// Unset bounds accept everything. Items without a price never pass a price
/// bound, and items without a rating never pass a rating bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub min_reviews: Option<u64>,
    pub require_image: bool,
}

impl ItemFilter {
    /// A filter that keeps every item.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_min_price(mut self, price: f64) -> Self {
        self.min_price = Some(price);
        self
    }

    pub fn with_max_price(mut self, price: f64) -> Self {
        self.max_price = Some(price);
        self
    }

    pub fn with_min_rating(mut self, rating: f64) -> Self {
        self.min_rating = Some(rating);
        self
    }

    pub fn with_min_reviews(mut self, count: u64) -> Self {
        self.min_reviews = Some(count);
        self
    }

    pub fn with_image_required(mut self) -> Self {
        self.require_image = true;
        self
    }

    pub fn matches(&self, product: &Product) -> bool {
        if let Some(min) = self.min_price
            && !product.price.is_some_and(|p| p >= min)
        {
            return false;
        }
        if let Some(max) = self.max_price
            && !product.price.is_some_and(|p| p <= max)
        {
            return false;
        }
        if let Some(min) = self.min_rating
            && !product.rating.is_some_and(|r| r >= min)
        {
            return false;
        }
        if let Some(min) = self.min_reviews
            && !product.review_count.is_some_and(|c| c >= min)
        {
            return false;
        }
        !self.require_image || product.image_url.is_some()
    }
}
