//! End-to-end tests over HTTP
//!
//! Starts one catalogue service per pool device on local ports and drives
//! them through the index client's HTTP transport.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use dix_client::{DixClient, DixError, DixIndex, ReqState};
use dix_core::{
    CasReply, CasRequest, CatalogueId, ClientConfig, HashFunction, Imask, IndexId, LayoutDescriptor,
    MaskRange, PoolMap, PoolVersion, Record, TargetRouter,
};
use dix_server::{create_router, create_shared_state, ServerConfig, SharedState};
use reqwest::Client;
use serde::Deserialize;
use tokio::net::TcpListener;

static PORT_COUNTER: AtomicU16 = AtomicU16::new(19400);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    store: StoreStats,
}

#[derive(Debug, Deserialize)]
struct StoreStats {
    catalogues: usize,
    records: usize,
}

struct Service {
    url: String,
    state: SharedState,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

/// A pool of catalogue services
struct TestHarness {
    services: Vec<Service>,
    pools: PoolMap,
    temp_dir: tempfile::TempDir,
    http: Client,
}

impl TestHarness {
    async fn new(devices: usize, n: u32, k: u32) -> Self {
        Self::with_config(devices, n, k, ServerConfig::default()).await
    }

    async fn with_config(devices: usize, n: u32, k: u32, config: ServerConfig) -> Self {
        let mut services = Vec::with_capacity(devices);
        for _ in 0..devices {
            services.push(spawn_service(config.clone()).await);
        }
        let version = services
            .iter()
            .fold(PoolVersion::new(1, n, k), |v, s| v.with_device(s.url.clone()));

        Self {
            services,
            pools: PoolMap::new().with_version(version),
            temp_dir: tempfile::tempdir().expect("temp dir"),
            http: Client::new(),
        }
    }

    fn meta_layout(&self) -> LayoutDescriptor {
        LayoutDescriptor::new(1, HashFunction::Fnv1, Imask::empty())
    }

    /// Client configured the way the CLI does it: from files on disk
    fn client(&self) -> DixClient {
        let config = ClientConfig::from_base_dir(self.temp_dir.path())
            .with_meta_layout(self.meta_layout());
        self.pools.save(&config.pool_map).expect("save pool map");
        let path = self.temp_dir.path().join("client.json");
        config.save(&path).expect("save config");

        let config = ClientConfig::load(&path).expect("load config");
        DixClient::builder().config(&config).build().expect("client")
    }

    fn stop(&mut self, device: usize) {
        if let Some(tx) = self.services[device].shutdown.take() {
            let _ = tx.send(());
        }
    }

    async fn health(&self, device: usize) -> reqwest::Result<HealthResponse> {
        self.http
            .get(format!("{}/health", self.services[device].url))
            .send()
            .await?
            .json()
            .await
    }
}

async fn spawn_service(config: ServerConfig) -> Service {
    let state = create_shared_state(config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let port = next_port();
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let url = format!("http://127.0.0.1:{}", port);

    let router = create_router(state.clone());
    let listener = TcpListener::bind(addr).await.expect("Bind should succeed");

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    for _ in 0..10 {
        if Client::new().get(format!("{}/health", url)).send().await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    Service {
        url,
        state,
        shutdown: Some(shutdown_tx),
    }
}

#[tokio::test]
async fn test_health() {
    let harness = TestHarness::new(1, 1, 0).await;
    let health = harness.health(0).await.unwrap();
    assert_eq!(health.status, "ready");
    assert_eq!(health.store.catalogues, 0);
    assert_eq!(health.store.records, 0);
}

#[tokio::test]
async fn test_raw_cas_request() {
    let harness = TestHarness::new(1, 1, 0).await;
    let catalogue = CatalogueId::new(IndexId::new(5, 5), 0);
    let reply: CasReply = harness
        .http
        .post(format!("{}/cas", harness.services[0].url))
        .json(&CasRequest::Create {
            catalogues: vec![catalogue],
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply, CasReply::Status { results: vec![Ok(())] });
    assert!(harness.services[0].state.read().await.store.contains(&catalogue));
}

#[tokio::test]
async fn test_malformed_request_rejected() {
    let harness = TestHarness::new(1, 1, 0).await;
    let resp = harness
        .http
        .post(format!("{}/cas", harness.services[0].url))
        .json(&CasRequest::Next {
            catalogue: CatalogueId::new(IndexId::new(5, 5), 0),
            start_keys: vec![vec![1]],
            counts: vec![1, 2],
        })
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = harness
        .http
        .get(format!("{}/metrics", harness.services[0].url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_index_lifecycle() {
    let harness = TestHarness::new(6, 2, 1).await;
    let client = harness.client();
    client.meta_create().await.unwrap();

    let id = IndexId::new(0x77, 1);
    let mut req = client.request();
    req.create(vec![DixIndex::new(id).with_descriptor(harness.meta_layout())])
        .unwrap();
    assert_eq!(req.wait().await, ReqState::Final);
    req.generic_result().unwrap();

    let index = DixIndex::new(id);
    let records: Vec<Record> = (0u16..50)
        .map(|i| Record::new(i.to_be_bytes().to_vec(), format!("value-{}", i).into_bytes()))
        .collect();
    let mut req = client.request();
    req.put(&index, records, false).unwrap();
    req.wait().await;
    req.generic_result().unwrap();

    // every record, and the layout record, lands on N + K devices
    let mut stored = 0;
    for service in &harness.services {
        stored += harness_records(&service.state).await;
    }
    assert_eq!(stored, (50 + 1) * 3);

    let mut req = client.request();
    req.get(&index, vec![7u16.to_be_bytes().to_vec(), 99u16.to_be_bytes().to_vec()])
        .unwrap();
    req.wait().await;
    let values = req.take_get_replies().unwrap();
    assert_eq!(values[0], Ok(b"value-7".to_vec()));
    assert_eq!(values[1], Err(DixError::NotFound));

    let mut req = client.request();
    req.next(&index, vec![10u16.to_be_bytes().to_vec()], vec![5]).unwrap();
    req.wait().await;
    let window = req.take_next_replies().unwrap().remove(0).unwrap();
    let keys: Vec<u16> = window
        .keys()
        .map(|k| u16::from_be_bytes([k[0], k[1]]))
        .collect();
    assert_eq!(keys, vec![10, 11, 12, 13, 14]);

    let mut req = client.request();
    req.del(&index, vec![10u16.to_be_bytes().to_vec()]).unwrap();
    req.wait().await;
    req.generic_result().unwrap();

    assert_eq!(client.index_list(IndexId::new(0, 0), 10).await.unwrap(), vec![id]);

    let mut req = client.request();
    req.delete(vec![index]).unwrap();
    req.wait().await;
    req.generic_result().unwrap();
    assert!(client.index_list(IndexId::new(0, 0), 10).await.unwrap().is_empty());

    client.meta_destroy().await.unwrap();
    for device in 0..harness.services.len() {
        assert_eq!(harness.health(device).await.unwrap().store.catalogues, 0);
    }
}

/// Create the meta-indices and `index`
async fn create(client: &DixClient, index: DixIndex) {
    client.meta_create().await.unwrap();
    let mut req = client.request();
    req.create(vec![index]).unwrap();
    req.wait().await;
    req.generic_result().unwrap();
}

async fn harness_records(state: &SharedState) -> usize {
    state.read().await.stats().records
}

#[tokio::test]
async fn test_reads_survive_stopped_service() {
    let mut harness = TestHarness::new(5, 1, 1).await;
    let client = harness.client();
    let index = DixIndex::new(IndexId::new(0x88, 2)).with_descriptor(harness.meta_layout());

    create(&client, index.clone()).await;

    let keys: Vec<Vec<u8>> = (0u8..16).map(|i| vec![i; 4]).collect();
    let mut req = client.request();
    req.put(&index, keys.iter().map(|k| Record::new(k.clone(), k.clone())).collect(), false)
        .unwrap();
    req.wait().await;
    req.generic_result().unwrap();

    harness.stop(0);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut req = client.request();
    req.get(&index, keys.clone()).unwrap();
    req.wait().await;
    let values = req.take_get_replies().unwrap();
    for (key, value) in keys.iter().zip(values) {
        assert_eq!(value.as_ref(), Ok(key), "key {:?}", key);
    }

    let mut req = client.request();
    req.next(&index, vec![vec![]], vec![100]).unwrap();
    req.wait().await;
    let window = req.take_next_replies().unwrap().remove(0).unwrap();
    assert_eq!(window.records.len(), 16);
    assert_eq!(window.terminal, Some(DixError::NotFound));
}

#[tokio::test]
async fn test_capacity_limit_reported_per_item() {
    let config = ServerConfig::default().with_max_records(1);
    let harness = TestHarness::with_config(3, 1, 1, config).await;
    let client = harness.client();
    let index = DixIndex::new(IndexId::new(0x99, 3)).with_descriptor(harness.meta_layout());

    create(&client, index.clone()).await;

    let mut req = client.request();
    req.put(
        &index,
        (0u8..4).map(|i| Record::new(vec![i], vec![i])).collect(),
        false,
    )
    .unwrap();
    assert_eq!(req.wait().await, ReqState::Final);
    let exhausted = (0..4)
        .filter(|&i| req.item_result(i) == Err(DixError::ResourceExhausted))
        .count();
    assert!(exhausted >= 2, "only {} items hit the limit", exhausted);
}

#[tokio::test]
async fn test_masked_keys_share_a_group() {
    let harness = TestHarness::new(8, 2, 1).await;
    let client = harness.client();
    let mask = Imask::new(vec![MaskRange::new(0, 15)]).unwrap();
    let descr = LayoutDescriptor::new(1, HashFunction::Keccak, mask);
    let index = DixIndex::new(IndexId::new(0xaa, 4)).with_descriptor(descr.clone());

    create(&client, index.clone()).await;

    let router = TargetRouter::new(client.pools());
    let first = router.route(&descr, b"ab-first").unwrap();
    let second = router.route(&descr, b"ab-second").unwrap();
    assert_eq!(first.targets(), second.targets());

    let mut req = client.request();
    req.put(
        &index,
        vec![
            Record::new(b"ab-first".to_vec(), b"1".to_vec()),
            Record::new(b"ab-second".to_vec(), b"2".to_vec()),
        ],
        false,
    )
    .unwrap();
    req.wait().await;
    req.generic_result().unwrap();

    for target in first.storing() {
        let state = harness.services[target.device as usize].state.read().await;
        let catalogue = CatalogueId::new(index.id, target.device);
        assert_eq!(state.store.value(&catalogue, b"ab-first"), Some(&b"1"[..]));
        assert_eq!(state.store.value(&catalogue, b"ab-second"), Some(&b"2"[..]));
    }
}
