//! Client for the Product Advertising API 5.0 `SearchItems` operation.
//!
//! Two layers:
//!
//! - [`sign`] computes AWS Signature Version 4 headers for an arbitrary request.
//! - [`Client::search`] walks result pages until enough items pass an
//!   [`ItemFilter`], pausing between pages and backing off when throttled.
//!
//! # Quick Start
//!
//! ```no_run
//! use rs_paapi::{Client, Credential, ItemFilter, SearchItemsRequest, SearchOutcome};
//!
//! # async fn example() -> rs_paapi::Result<()> {
//! let client = Client::new(Credential::new(
//!     "your-access-key",
//!     "your-secret-key",
//!     "yourtag-20",
//! ))?;
//!
//! let request = SearchItemsRequest::new("mechanical keyboard").with_search_index("Electronics");
//! let filter = ItemFilter::any().with_min_price(25.0);
//!
//! match client.search(&request, 25, &filter).await? {
//!     SearchOutcome::Products(products) => {
//!         for p in products {
//!             println!("{} {:?}", p.asin, p.display_price);
//!         }
//!     }
//!     SearchOutcome::NoResults => println!("nothing found"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod request;
pub mod response;
pub mod sign;

mod exec;

pub use client::Client;
pub use clock::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use config::{ClientConfig, RetryPolicy};
pub use credential::{ChainProvider, Credential, CredentialProvider, EnvProvider, StaticProvider};
pub use error::{PaapiError, Result};
pub use fetch::{Page, PageSource, PaginatedFetcher};
pub use filter::ItemFilter;
pub use request::{Availability, SearchItemsRequest, SortBy};
pub use response::{Product, SearchItemsResponse, SearchOutcome};
pub use sign::{Signer, SigningContext, compute_authorization_header};
pub use tokio_util::sync::CancellationToken;

// Compile-time assertions: key types must be Send + Sync for use across threads.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<Client>;
    let _ = assert_send_sync::<PaapiError>;
    let _ = assert_send_sync::<Credential>;
    let _ = assert_send_sync::<ClientConfig>;
};
