//! Tests for page aggregation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use query_keys::{
    get_all, query_key, resolve, Factory, FactoryDef, Filter, GetAll, Leaf, Paginated, Params,
    QueryError, ResourcePage,
};

/// A fake list endpoint over `total` numbered items.
#[derive(Clone)]
struct FakeEndpoint {
    total: u32,
    requests: Arc<Mutex<Vec<Params>>>,
}

impl FakeEndpoint {
    fn new(total: u32) -> Self {
        Self {
            total,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn page(&self, params: &Params) -> ResourcePage<u32> {
        self.requests.lock().unwrap().push(params.clone());
        let page = params.page.unwrap_or(1);
        let size = params.page_size.unwrap_or(100);
        let pages = self.total.div_ceil(size).max(1);
        let start = (page - 1) * size;
        let end = (start + size).min(self.total);
        ResourcePage {
            data: (start..end).collect(),
            page,
            pages,
            results: self.total,
        }
    }

    async fn get(&self, params: Params, _filter: Filter) -> Result<ResourcePage<u32>, String> {
        // Later pages answer sooner, so completion order differs from page order.
        let page = params.page.unwrap_or(1) as u64;
        tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(page * 5))).await;
        Ok(self.page(&params))
    }

    fn requested_pages(&self) -> Vec<Option<u32>> {
        let mut pages: Vec<_> = self.requests.lock().unwrap().iter().map(|p| p.page).collect();
        pages.sort();
        pages
    }
}

#[tokio::test]
async fn test_single_page() {
    let endpoint = FakeEndpoint::new(3);
    let all = get_all(|params, filter| {
        let endpoint = endpoint.clone();
        async move { endpoint.get(params, filter).await }
    })
    .await
    .unwrap();

    assert_eq!(
        all,
        Paginated {
            data: vec![0, 1, 2],
            results: 3
        }
    );
    assert_eq!(endpoint.requested_pages(), vec![None]);
}

#[tokio::test]
async fn test_empty_endpoint() {
    let all = get_all(|_params, _filter| async {
        Ok::<_, String>(ResourcePage::<u32> {
            data: vec![],
            page: 1,
            pages: 0,
            results: 0,
        })
    })
    .await
    .unwrap();
    assert!(all.data.is_empty());
    assert_eq!(all.results, 0);
}

#[tokio::test]
async fn test_pages_concatenate_in_order() {
    let endpoint = FakeEndpoint::new(23);
    let config = GetAll::builder().page_size(5).concurrency(3).build();

    let all = config
        .fetch(
            |params, filter| {
                let endpoint = endpoint.clone();
                async move { endpoint.get(params, filter).await }
            },
            Params::default(),
            Filter::new(),
        )
        .await
        .unwrap();

    assert_eq!(all.data, (0..23).collect::<Vec<_>>());
    assert_eq!(all.results, 23);
    assert_eq!(
        endpoint.requested_pages(),
        vec![None, Some(2), Some(3), Some(4), Some(5)]
    );
    for params in endpoint.requests.lock().unwrap().iter() {
        assert_eq!(params.page_size, Some(5));
    }
}

#[tokio::test]
async fn test_concurrency_limit() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let endpoint = FakeEndpoint::new(50);
    let config = GetAll::builder().page_size(5).concurrency(2).build();

    let all = config
        .fetch(
            |params, filter| {
                let endpoint = endpoint.clone();
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    let page = endpoint.get(params, filter).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    page
                }
            },
            Params::default(),
            Filter::new(),
        )
        .await
        .unwrap();

    assert_eq!(all.data.len(), 50);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_first_error_aborts() {
    let endpoint = FakeEndpoint::new(30);
    let config = GetAll::builder().page_size(10).build();

    let result = config
        .fetch(
            |params: Params, filter| {
                let endpoint = endpoint.clone();
                async move {
                    if params.page == Some(3) {
                        return Err("page 3 unavailable".to_string());
                    }
                    endpoint.get(params, filter).await
                }
            },
            Params::default(),
            Filter::new(),
        )
        .await;

    assert_eq!(result.unwrap_err(), "page 3 unavailable");
}

#[tokio::test]
async fn test_fetch_with_argument_and_filter() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = GetAll::builder().page_size(2).build();

    let all = config
        .fetch_with(
            42u64,
            |linode_id, params: Params, filter: Filter| {
                let seen = seen.clone();
                async move {
                    seen.lock()
                        .unwrap()
                        .push((linode_id, filter.to_header()));
                    let page = params.page.unwrap_or(1);
                    Ok::<_, String>(ResourcePage {
                        data: vec![format!("disk-{page}a"), format!("disk-{page}b")],
                        page,
                        pages: 2,
                        results: 4,
                    })
                }
            },
            Params::default(),
            Filter::new().with("status", "ready"),
        )
        .await
        .unwrap();

    assert_eq!(all.data, vec!["disk-1a", "disk-1b", "disk-2a", "disk-2b"]);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen
        .iter()
        .all(|(id, header)| *id == 42 && header == r#"{"status":"ready"}"#));
}

#[tokio::test]
async fn test_get_all_behind_a_factory_leaf() {
    let endpoint = FakeEndpoint::new(12);
    let def = FactoryDef::new().branch(
        "linodes",
        FactoryDef::new().factory(
            "all",
            Factory::new(move |(params, filter): (Params, Filter)| {
                let endpoint = endpoint.clone();
                Leaf::new(move || {
                    let endpoint = endpoint.clone();
                    let params = params.clone();
                    let filter = filter.clone();
                    async move {
                        let config = GetAll::builder().page_size(5).build();
                        let all = config
                            .fetch(
                                |p, f| {
                                    let endpoint = endpoint.clone();
                                    async move { endpoint.get(p, f).await }
                                },
                                params,
                                filter,
                            )
                            .await
                            .map_err(|e| QueryError::from(anyhow::anyhow!(e)))?;
                        Ok::<_, QueryError>(all.data)
                    }
                })
            }),
        ),
    );

    let tree = resolve(&def);
    let filter = Filter::new().with("region", "us-east");
    let leaf = tree
        .branch("linodes")
        .unwrap()
        .factory("all")
        .unwrap()
        .call_leaf((Params::default(), filter.clone()))
        .unwrap();

    assert_eq!(
        leaf.query_key(),
        &query_key!["linodes", "all", Params::default(), filter]
    );
    let data = leaf.fetch::<Vec<u32>>().await.unwrap();
    assert_eq!(*data, (0..12).collect::<Vec<_>>());
}
