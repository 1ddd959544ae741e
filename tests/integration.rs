use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use mockito::{Matcher, Server, ServerGuard};
use rs_paapi::{
    CancellationToken, Client, ClientConfig, Clock, Credential, ItemFilter, PaapiError,
    RetryPolicy, SearchItemsRequest, SearchOutcome,
};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const SEARCH_PATH: &str = "/paapi5/searchitems";

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn test_credential() -> Credential {
    Credential::new("AKIAEXAMPLE", "example-secret-key", "store-20")
}

fn test_config(endpoint: String) -> ClientConfig {
    ClientConfig::default().with_endpoint(endpoint).with_retry(
        RetryPolicy::default()
            .with_backoff(Duration::ZERO)
            .with_inter_page_delay(Duration::ZERO),
    )
}

fn test_client(server: &ServerGuard) -> Client {
    Client::with_config(test_credential(), test_config(server.url()))
        .expect("failed to build client")
}

fn item(asin: &str, amount: f64) -> Value {
    json!({
        "ASIN": asin,
        "DetailPageURL": format!("https://www.amazon.com/dp/{asin}"),
        "ItemInfo": { "Title": { "DisplayValue": format!("Item {asin}") } },
        "Offers": { "Listings": [ { "Price": {
            "Amount": amount,
            "Currency": "USD",
            "DisplayAmount": format!("${amount:.2}")
        } } ] }
    })
}

fn page_body(items: Vec<Value>, total: u32) -> String {
    json!({ "SearchResult": { "Items": items, "TotalResultCount": total } }).to_string()
}

const THROTTLED_BODY: &str = r#"{"__type":"com.amazon.paapi5#TooManyRequestsException","Errors":[{"Code":"TooManyRequests","Message":"The request was denied due to request throttling."}]}"#;

#[tokio::test]
async fn search_items_sends_signed_request() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", SEARCH_PATH)
        .match_header("content-encoding", "amz-1.0")
        .match_header("content-type", "application/json; charset=utf-8")
        .match_header(
            "x-amz-target",
            "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.SearchItems",
        )
        .match_header("x-amz-date", "20240504T100000Z")
        .match_header(
            "authorization",
            Matcher::Regex(
                r"^AWS4-HMAC-SHA256 Credential=AKIAEXAMPLE/20240504/us-east-1/ProductAdvertisingAPI/aws4_request, SignedHeaders=content-encoding;content-type;host;x-amz-date;x-amz-target, Signature=[0-9a-f]{64}$"
                    .into(),
            ),
        )
        .match_body(Matcher::PartialJson(json!({
            "Keywords": "laptop",
            "PartnerTag": "store-20",
            "PartnerType": "Associates",
            "Marketplace": "www.amazon.com",
            "ItemCount": 10,
            "ItemPage": 1
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page_body(vec![item("B001", 19.99)], 1))
        .create_async()
        .await;

    let fixed = Utc.with_ymd_and_hms(2024, 5, 4, 10, 0, 0).unwrap();
    let client = test_client(&server).with_clock(Arc::new(FixedClock(fixed)));

    let resp = client
        .search_items(&SearchItemsRequest::new("laptop"))
        .await
        .expect("search_items should succeed");

    assert_eq!(resp.items().len(), 1);
    assert_eq!(resp.items()[0].asin, "B001");
    assert_eq!(resp.total_result_count(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn search_walks_pages_and_filters() {
    let mut server = Server::new_async().await;

    let first = server
        .mock("POST", SEARCH_PATH)
        .match_body(Matcher::PartialJson(json!({ "ItemPage": 1 })))
        .with_status(200)
        .with_body(page_body(
            vec![item("A1", 10.0), item("A2", 30.0), item("A3", 26.0)],
            6,
        ))
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("POST", SEARCH_PATH)
        .match_body(Matcher::PartialJson(json!({ "ItemPage": 2 })))
        .with_status(200)
        .with_body(page_body(
            vec![item("B1", 5.0), item("B2", 99.0), item("B3", 40.0)],
            6,
        ))
        .expect(1)
        .create_async()
        .await;

    let client = Client::with_config(
        test_credential(),
        test_config(server.url()).with_page_size(3),
    )
    .expect("failed to build client");

    let outcome = client
        .search(
            &SearchItemsRequest::new("desk lamp"),
            10,
            &ItemFilter::any().with_min_price(25.0),
        )
        .await
        .expect("search should succeed");

    let asins: Vec<&str> = outcome.products().iter().map(|p| p.asin.as_str()).collect();
    assert_eq!(asins, vec!["A2", "A3", "B2", "B3"]);
    assert_eq!(outcome.http_status(), 200);
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn search_stops_at_target() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", SEARCH_PATH)
        .with_status(200)
        .with_body(page_body(
            (0..10).map(|i| item(&format!("P{i}"), 20.0)).collect(),
            100,
        ))
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);
    let outcome = client
        .search(&SearchItemsRequest::new("pens"), 4, &ItemFilter::any())
        .await
        .expect("search should succeed");

    assert_eq!(outcome.products().len(), 4);
    assert_eq!(outcome.products()[0].asin, "P0");
    mock.assert_async().await;
}

#[tokio::test]
async fn persistent_throttling_exhausts_retries() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", SEARCH_PATH)
        .with_status(429)
        .with_body(THROTTLED_BODY)
        .expect(3)
        .create_async()
        .await;

    let client = test_client(&server);
    let err = client
        .search(&SearchItemsRequest::new("laptop"), 5, &ItemFilter::any())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), Some("RetriesExhausted"));
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("after 3 attempts"));
    mock.assert_async().await;
}

#[tokio::test]
async fn single_page_call_does_not_retry() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", SEARCH_PATH)
        .with_status(429)
        .with_body(THROTTLED_BODY)
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);
    let err = client
        .search_items(&SearchItemsRequest::new("laptop"))
        .await
        .unwrap_err();

    assert!(matches!(err, PaapiError::RateLimited { .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn no_results_maps_to_not_found_outcome() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", SEARCH_PATH)
        .with_status(404)
        .with_body(
            r#"{"__type":"com.amazon.paapi5#ResourceNotFoundException","Errors":[{"Code":"NoResults","Message":"No results found for your request."}]}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);
    let outcome = client
        .search(&SearchItemsRequest::new("zzqxj"), 10, &ItemFilter::any())
        .await
        .expect("no results is not an error");

    assert_eq!(outcome, SearchOutcome::NoResults);
    assert_eq!(outcome.http_status(), 404);
    mock.assert_async().await;
}

#[tokio::test]
async fn upstream_error_is_not_retried() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", SEARCH_PATH)
        .with_status(400)
        .with_body(
            r#"{"__type":"com.amazon.paapi5#InvalidParameterValueException","Errors":[{"Code":"InvalidParameterValue","Message":"The value provided in the request for SearchIndex is invalid."}]}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);
    let err = client
        .search(
            &SearchItemsRequest::new("laptop").with_search_index("Nope"),
            5,
            &ItemFilter::any(),
        )
        .await
        .unwrap_err();

    match err {
        PaapiError::Upstream { code, message } => {
            assert_eq!(code, "InvalidParameterValue");
            assert!(message.contains("SearchIndex"));
        }
        other => panic!("expected Upstream, got: {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn invalid_request_never_reaches_upstream() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", SEARCH_PATH)
        .expect(0)
        .create_async()
        .await;

    let client = test_client(&server);
    let err = client
        .search(&SearchItemsRequest::new("   "), 5, &ItemFilter::any())
        .await
        .unwrap_err();

    assert!(matches!(err, PaapiError::Validation(_)));
    assert_eq!(err.http_status(), 400);
    mock.assert_async().await;
}

#[tokio::test]
async fn invalid_partner_tag_never_reaches_upstream() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", SEARCH_PATH)
        .expect(0)
        .create_async()
        .await;

    let client = Client::with_config(
        Credential::new("AKIAEXAMPLE", "example-secret-key", "not a tag"),
        test_config(server.url()),
    )
    .expect("failed to build client");
    let err = client
        .search(&SearchItemsRequest::new("laptop"), 5, &ItemFilter::any())
        .await
        .unwrap_err();

    assert!(matches!(err, PaapiError::Configuration(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn cancelled_search_makes_no_calls() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", SEARCH_PATH)
        .expect(0)
        .create_async()
        .await;

    let client = test_client(&server);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .search_with_cancel(
            &SearchItemsRequest::new("laptop"),
            5,
            &ItemFilter::any(),
            cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PaapiError::Cancelled));
    mock.assert_async().await;
}

#[tokio::test]
async fn concurrent_searches_share_one_client() {
    use tokio::task::JoinSet;

    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", SEARCH_PATH)
        .with_status(200)
        .with_body(page_body(vec![item("C1", 12.0), item("C2", 14.0)], 2))
        .expect(8)
        .create_async()
        .await;

    let client = Arc::new(test_client(&server));

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let client = Arc::clone(&client);
        tasks.spawn(async move {
            let request = SearchItemsRequest::new(format!("query {i}"));
            client.search(&request, 5, &ItemFilter::any()).await
        });
    }

    while let Some(result) = tasks.join_next().await {
        let outcome = result.expect("task panicked").expect("search failed");
        assert_eq!(outcome.products().len(), 2);
    }
    mock.assert_async().await;
}

/// Reads one HTTP/1.1 request, headers plus `content-length` body bytes.
async fn read_request(stream: &mut TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        data.extend_from_slice(&buf[..n]);
        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + body_len {
                return;
            }
        }
    }
}

/// Local server that accepts the first `stall` connections without ever
/// answering, then serves `body` with status 200.
///
/// Returns the endpoint and the number of accepted connections.
async fn stalling_server(stall: usize, body: String) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let addr = listener.local_addr().expect("listener has no address");
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let seen = counter.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            tokio::spawn(async move {
                if seen < stall {
                    // Hold the connection until the client gives up on it.
                    let mut buf = [0u8; 1024];
                    while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
                    return;
                }
                read_request(&mut stream).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), accepted)
}

fn short_timeout_client(endpoint: String) -> Client {
    let config = test_config(endpoint).with_timeout(Duration::from_millis(300));
    Client::with_config(test_credential(), config).expect("failed to build client")
}

#[tokio::test]
async fn timed_out_page_is_retried() {
    let (endpoint, accepted) =
        stalling_server(2, page_body(vec![item("T1", 15.0)], 1)).await;
    let client = short_timeout_client(endpoint);

    let outcome = client
        .search(&SearchItemsRequest::new("kettle"), 5, &ItemFilter::any())
        .await
        .expect("search should succeed on the third attempt");

    assert_eq!(outcome.products().len(), 1);
    assert_eq!(outcome.products()[0].asin, "T1");
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn persistent_timeouts_exhaust_retries() {
    let (endpoint, accepted) = stalling_server(usize::MAX, String::new()).await;
    let client = short_timeout_client(endpoint);

    let err = client
        .search(&SearchItemsRequest::new("kettle"), 5, &ItemFilter::any())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), Some("RetriesExhausted"));
    assert!(err.to_string().contains("page 1 failed after 3 attempts"));
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn single_page_call_surfaces_timeout() {
    let (endpoint, accepted) = stalling_server(usize::MAX, String::new()).await;
    let client = short_timeout_client(endpoint);

    let err = client
        .search_items(&SearchItemsRequest::new("kettle"))
        .await
        .unwrap_err();

    match &err {
        PaapiError::HttpClient(e) => assert!(e.is_timeout()),
        other => panic!("expected HttpClient timeout, got: {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}
