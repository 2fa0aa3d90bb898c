#![forbid(unsafe_code)]

use std::sync::Arc;

use roster_controllers::endpoints::{self, CONDITION_ENDPOINTS_MANAGED, META_MANAGED_BY, REASON_SELECTOR_FOUND, REASON_SELECTOR_NOT_FOUND};
use roster_controllers::{register_catalog_controllers, CancellationToken, Manager, ManagerConfig, NodeMapper, RunSummary, Runtime, WorkloadMapper};
use roster_core::catalog::{
    health_status_type, service_endpoints_type, service_type, workload_type, Endpoint, HealthStatus, Protocol, Service, ServiceEndpoints, ServicePort, Workload,
    WorkloadAddress, WorkloadPort, WorkloadSelector,
};
use roster_core::{Delta, Health, Payload, Resource, ResourceId, ResourceType, Tenancy};
use roster_store::{MemoryStore, Store};
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    store: Arc<MemoryStore>,
    rt: Runtime,
    cx: CancellationToken,
    mgr: Manager,
    rx: UnboundedReceiver<Delta>,
    workloads: Arc<WorkloadMapper>,
}

fn harness(store: Arc<MemoryStore>) -> Harness {
    let rx = store.subscribe();
    let rt = Runtime::new(store.clone());
    let workloads = Arc::new(WorkloadMapper::new());
    let mut mgr = Manager::new(ManagerConfig::default());
    register_catalog_controllers(&mut mgr, workloads.clone(), Arc::new(NodeMapper::new()));
    Harness { store, rt, cx: CancellationToken::new(), mgr, rx, workloads }
}

impl Harness {
    async fn settle(&mut self) -> RunSummary {
        let summary = self.mgr.run_until_idle(&self.cx, &self.rt, &mut self.rx).await;
        assert_eq!(summary.dropped, 0, "{summary:?}");
        assert!(!summary.exhausted);
        summary
    }
}

fn id(rtype: ResourceType, name: &str) -> ResourceId {
    ResourceId::new(rtype, Tenancy::default(), name)
}

async fn put<T: Payload>(store: &MemoryStore, id: ResourceId, data: &T) -> Resource {
    store.write(Resource::new(id).with_data(data).unwrap()).await.unwrap()
}

fn workload(host: &str, port: u32, protocol: Protocol) -> Workload {
    Workload {
        addresses: vec![WorkloadAddress { host: host.into(), ports: vec![], external: false }],
        ports: [("http".to_string(), WorkloadPort { port, protocol })].into_iter().collect(),
        ..Default::default()
    }
}

fn service(names: &[&str], prefixes: &[&str]) -> Service {
    Service {
        workloads: Some(WorkloadSelector {
            names: names.iter().map(|s| s.to_string()).collect(),
            prefixes: prefixes.iter().map(|s| s.to_string()).collect(),
        }),
        ports: vec![ServicePort { virtual_port: 80, target_port: "http".into(), protocol: Protocol::Http }],
        ..Default::default()
    }
}

async fn endpoints_of(store: &MemoryStore, svc: &str) -> Option<(Resource, Vec<Endpoint>)> {
    let res = store.read(&id(service_endpoints_type(), svc)).await.ok()?;
    let eps = res.decode::<ServiceEndpoints>().unwrap().endpoints;
    Some((res, eps))
}

fn targets(eps: &[Endpoint]) -> Vec<String> {
    eps.iter().map(|e| e.target_ref.name.clone()).collect()
}

async fn managed_reason(store: &MemoryStore, svc: &str) -> String {
    let res = store.read(&id(service_type(), svc)).await.unwrap();
    res.status[endpoints::STATUS_KEY].condition(CONDITION_ENDPOINTS_MANAGED).unwrap().reason.clone()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn endpoints_follow_selected_workloads() {
    let mut h = harness(Arc::new(MemoryStore::new()));
    put(&h.store, id(workload_type(), "api-1"), &workload("10.0.0.1", 8080, Protocol::Http)).await;
    put(&h.store, id(workload_type(), "api-2"), &workload("10.0.0.2", 8080, Protocol::Http)).await;
    put(&h.store, id(workload_type(), "db"), &workload("10.0.0.3", 5432, Protocol::Http)).await;
    put(&h.store, id(workload_type(), "web-1"), &workload("10.0.0.4", 8080, Protocol::Http)).await;
    let svc = put(&h.store, id(service_type(), "api"), &service(&["db", "api-1"], &["api-"])).await;
    h.settle().await;

    let (res, eps) = endpoints_of(&h.store, "api").await.unwrap();
    assert_eq!(targets(&eps), vec!["api-1", "api-2", "db"]);
    assert_eq!(res.owner.as_ref(), Some(&svc.id));
    assert_eq!(res.metadata.get(META_MANAGED_BY).map(String::as_str), Some(endpoints::STATUS_KEY));
    // workload health has been published, so endpoint health is known
    assert!(eps.iter().all(|e| e.health_status == Health::Passing));
    assert_eq!(eps[0].ports["http"], WorkloadPort { port: 8080, protocol: Protocol::Http });
    assert_eq!(managed_reason(&h.store, "api").await, REASON_SELECTOR_FOUND);
    assert!(h.workloads.is_tracked(&svc.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_run_writes_nothing() {
    let mut h = harness(Arc::new(MemoryStore::new()));
    put(&h.store, id(workload_type(), "api-1"), &workload("10.0.0.1", 8080, Protocol::Http)).await;
    let svc = put(&h.store, id(service_type(), "api"), &service(&[], &["api-"])).await;
    h.settle().await;

    let before = h.store.stats();
    assert_eq!(h.mgr.enqueue_existing(&h.store.read(&svc.id).await.unwrap()), 1);
    let summary = h.settle().await;
    assert_eq!(summary.reconciled, 1);
    let after = h.store.stats();
    assert_eq!(after.writes, before.writes);
    assert_eq!(after.status_writes, before.status_writes);
    assert_eq!(after.deletes, before.deletes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn workload_changes_requeue_the_service() {
    let mut h = harness(Arc::new(MemoryStore::new()));
    put(&h.store, id(workload_type(), "api-1"), &workload("10.0.0.1", 8080, Protocol::Http)).await;
    put(&h.store, id(service_type(), "api"), &service(&[], &["api-"])).await;
    h.settle().await;

    put(&h.store, id(workload_type(), "api-2"), &workload("10.0.0.2", 8080, Protocol::Http)).await;
    h.settle().await;
    assert_eq!(targets(&endpoints_of(&h.store, "api").await.unwrap().1), vec!["api-1", "api-2"]);

    // protocol mismatch drops the only port, so api-1 contributes nothing
    put(&h.store, id(workload_type(), "api-1"), &workload("10.0.0.1", 8080, Protocol::Tcp)).await;
    h.store.delete(&id(workload_type(), "api-2")).await.unwrap();
    h.settle().await;
    assert!(endpoints_of(&h.store, "api").await.unwrap().1.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn workload_health_change_reaches_its_endpoint() {
    let mut h = harness(Arc::new(MemoryStore::new()));
    let api1 = put(&h.store, id(workload_type(), "api-1"), &workload("10.0.0.1", 8080, Protocol::Http)).await;
    put(&h.store, id(workload_type(), "api-2"), &workload("10.0.0.2", 8080, Protocol::Http)).await;
    put(&h.store, id(service_type(), "api"), &service(&[], &["api-"])).await;
    h.settle().await;
    let (_, eps) = endpoints_of(&h.store, "api").await.unwrap();
    assert!(eps.iter().all(|e| e.health_status == Health::Passing));

    let hs = HealthStatus { kind: "http".into(), status: Health::Warning, description: String::new(), output: String::new() };
    let report = Resource::new(id(health_status_type(), "api-1-http")).with_owner(api1.id.clone()).with_data(&hs).unwrap();
    h.store.write(report).await.unwrap();
    let before = h.store.stats();
    h.settle().await;

    let (_, eps) = endpoints_of(&h.store, "api").await.unwrap();
    let health: Vec<(String, Health)> = eps.iter().map(|e| (e.target_ref.name.clone(), e.health_status)).collect();
    assert_eq!(health, vec![("api-1".to_string(), Health::Warning), ("api-2".to_string(), Health::Passing)]);
    // one workload status and one endpoints rewrite
    let after = h.store.stats();
    assert_eq!(after.writes - before.writes, 1);
    assert_eq!(after.status_writes - before.status_writes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clearing_the_selector_deletes_endpoints_and_untracks() {
    let mut h = harness(Arc::new(MemoryStore::new()));
    let wl = put(&h.store, id(workload_type(), "api-1"), &workload("10.0.0.1", 8080, Protocol::Http)).await;
    let svc = put(&h.store, id(service_type(), "api"), &service(&["api-1"], &["api"])).await;
    h.settle().await;
    assert!(endpoints_of(&h.store, "api").await.is_some());

    put(&h.store, svc.id.clone(), &Service { workloads: Some(WorkloadSelector::default()), ..service(&[], &[]) }).await;
    h.settle().await;

    assert!(endpoints_of(&h.store, "api").await.is_none());
    assert!(!h.workloads.is_tracked(&svc.id));
    assert!(h.workloads.map_to_dependents(&wl).is_empty());
    assert!(h.workloads.snapshot().is_empty());
    assert_eq!(managed_reason(&h.store, "api").await, REASON_SELECTOR_NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hand_managed_endpoints_are_left_alone() {
    let mut h = harness(Arc::new(MemoryStore::new()));
    let svc = put(&h.store, id(service_type(), "manual"), &Service::default()).await;
    let manual = ServiceEndpoints {
        endpoints: vec![Endpoint {
            target_ref: id(workload_type(), "elsewhere"),
            health_status: Health::Passing,
            addresses: vec![WorkloadAddress { host: "192.0.2.1".into(), ports: vec!["http".into()], external: true }],
            ports: Default::default(),
        }],
    };
    let ep_res = Resource::new(id(service_endpoints_type(), "manual")).with_owner(svc.id.clone()).with_data(&manual).unwrap();
    h.store.write(ep_res).await.unwrap();
    h.settle().await;

    let (_, eps) = endpoints_of(&h.store, "manual").await.unwrap();
    assert_eq!(targets(&eps), vec!["elsewhere"]);
    assert_eq!(managed_reason(&h.store, "manual").await, REASON_SELECTOR_NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restarted_controller_deletes_by_marker() {
    let store = Arc::new(MemoryStore::new());
    let mut first = harness(store.clone());
    put(&store, id(workload_type(), "api-1"), &workload("10.0.0.1", 8080, Protocol::Http)).await;
    let svc = put(&store, id(service_type(), "api"), &service(&["api-1"], &[])).await;
    first.settle().await;
    assert!(endpoints_of(&store, "api").await.is_some());
    drop(first);

    // fresh process: empty managed set and mapper
    let mut second = harness(store.clone());
    put(&store, svc.id.clone(), &Service { workloads: None, ..service(&[], &[]) }).await;
    second.settle().await;
    assert!(endpoints_of(&store, "api").await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_the_service_untracks_it() {
    let mut h = harness(Arc::new(MemoryStore::new()));
    put(&h.store, id(workload_type(), "api-1"), &workload("10.0.0.1", 8080, Protocol::Http)).await;
    let svc = put(&h.store, id(service_type(), "api"), &service(&[], &["api"])).await;
    h.settle().await;
    assert!(h.workloads.is_tracked(&svc.id));

    h.store.delete(&svc.id).await.unwrap();
    h.settle().await;
    assert!(!h.workloads.is_tracked(&svc.id));
    // cascade removed the owned endpoints
    assert!(endpoints_of(&h.store, "api").await.is_none());
}
