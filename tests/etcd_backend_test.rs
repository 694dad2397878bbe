//! etcd 后端集成测试
//!
//! 这些测试需要运行中的 etcd 服务器实例。
//! 默认情况下，测试会被忽略，需要使用 `cargo test --test etcd_backend_test -- --ignored` 运行。
//!
//! 启动 etcd 服务器：
//! ```bash
//! docker run -d --name etcd-test -p 2379:2379 -p 2380:2380 \
//!   quay.io/coreos/etcd:v3.5.9 \
//!   etcd --advertise-client-urls=http://127.0.0.1:2379 \
//!        --listen-client-urls=http://0.0.0.0:2379
//! ```

use etcd_client::{Client, DeleteOptions};
use flare_discovery::discovery::{EtcdNodeSource, EtcdSettings};
use flare_discovery::{
    DeploymentIdentifier, DeploymentResolver, DiscoveryConfig, Node, NodeSource,
    ServiceDiscoveryConfig, StaticConfigProvider, always_reachable,
};
use std::sync::Arc;
use tokio::time::{Duration, sleep};

/// etcd 服务器地址
/// 可以通过环境变量 ETCD_ENDPOINTS 覆盖，默认为 http://127.0.0.1:2379
fn etcd_endpoints() -> Vec<String> {
    std::env::var("ETCD_ENDPOINTS")
        .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["http://127.0.0.1:2379".to_string()])
}

/// 测试命名空间
const TEST_NAMESPACE: &str = "flare-test";

fn test_settings() -> EtcdSettings {
    EtcdSettings {
        endpoints: etcd_endpoints(),
        namespace: TEST_NAMESPACE.to_string(),
        retry_interval_secs: 1,
    }
}

/// 写入节点，键格式与 `EtcdNodeSource::key_prefix` 一致
async fn put_node(client: &mut Client, deployment: &DeploymentIdentifier, node: &Node) {
    let key = format!("{}/services/{}/{}", TEST_NAMESPACE, deployment, node);
    let value = serde_json::to_vec(node).unwrap();
    client.put(key, value, None).await.expect("put node");
}

async fn cleanup(client: &mut Client, deployment: &DeploymentIdentifier) {
    let prefix = format!("{}/services/{}/", TEST_NAMESPACE, deployment);
    let _ = client
        .delete(prefix, Some(DeleteOptions::new().with_prefix()))
        .await;
}

/// 测试：读取已注册的节点，并在节点变化时更新
#[tokio::test]
#[ignore]
async fn test_etcd_node_source_loads_and_watches_nodes() {
    let mut client = Client::connect(etcd_endpoints(), None).await.expect("connect etcd");
    let deployment = DeploymentIdentifier::with_environment("etcd-billing", "test").unwrap();
    cleanup(&mut client, &deployment).await;

    let first = Node::new("127.0.0.1", Some(18080));
    put_node(&mut client, &deployment, &first).await;

    let source = EtcdNodeSource::new(deployment.clone(), test_settings());
    source.init().await.expect("etcd init should succeed");
    assert!(!source.was_undeployed());
    assert_eq!(source.nodes().unwrap(), vec![first.clone()]);

    let second = Node::new("127.0.0.1", Some(18081));
    put_node(&mut client, &deployment, &second).await;
    sleep(Duration::from_millis(500)).await;
    assert_eq!(source.nodes().unwrap().len(), 2);

    cleanup(&mut client, &deployment).await;
    sleep(Duration::from_millis(500)).await;
    assert!(source.was_undeployed());
    assert!(source.nodes().unwrap().is_empty());

    source.shutdown();
}

/// 测试：前缀下没有节点时视为已下线，解析器返回 None
#[tokio::test]
#[ignore]
async fn test_etcd_missing_deployment_resolves_to_none() {
    let mut client = Client::connect(etcd_endpoints(), None).await.expect("connect etcd");
    let deployment = DeploymentIdentifier::with_environment("etcd-reports", "test").unwrap();
    cleanup(&mut client, &deployment).await;

    let mut config = DiscoveryConfig::default()
        .with_service("etcd-reports", ServiceDiscoveryConfig::with_source("Etcd"));
    config.etcd = test_settings();
    let resolver = DeploymentResolver::with_defaults(Arc::new(StaticConfigProvider::new(config)));

    let resolved = resolver
        .resolve_load_balancer(&deployment, always_reachable())
        .await
        .unwrap();
    assert!(resolved.is_none());

    let agnostic = deployment.to_environment_agnostic();
    let node = Node::new("127.0.0.1", Some(19000));
    put_node(&mut client, &agnostic, &node).await;

    let load_balancer = resolver
        .resolve_load_balancer(&agnostic, always_reachable())
        .await
        .unwrap()
        .expect("agnostic deployment is registered");
    assert_eq!(load_balancer.try_get_node(None).unwrap(), node);

    load_balancer.shutdown();
    cleanup(&mut client, &agnostic).await;
}

/// 测试：键存在但值无法解析时不视为下线
#[tokio::test]
#[ignore]
async fn test_etcd_malformed_entries_are_not_undeployed() {
    let mut client = Client::connect(etcd_endpoints(), None).await.expect("connect etcd");
    let deployment = DeploymentIdentifier::with_environment("etcd-malformed", "test").unwrap();
    cleanup(&mut client, &deployment).await;

    let key = format!("{}/services/{}/broken", TEST_NAMESPACE, deployment);
    client.put(key, "not-json", None).await.expect("put malformed value");

    let source = EtcdNodeSource::new(deployment.clone(), test_settings());
    source.init().await.expect("etcd init should succeed");
    assert!(!source.was_undeployed());
    assert!(source.nodes().unwrap().is_empty());

    // watch 收到的更新同样按键数判断
    let node = Node::new("127.0.0.1", Some(18090));
    put_node(&mut client, &deployment, &node).await;
    sleep(Duration::from_millis(500)).await;
    assert_eq!(source.nodes().unwrap(), vec![node]);
    assert!(!source.was_undeployed());

    source.shutdown();
    cleanup(&mut client, &deployment).await;
}

/// 测试：并发初始化只建立一个 watch，重复初始化不报错
#[tokio::test]
#[ignore]
async fn test_etcd_concurrent_init_is_idempotent() {
    let mut client = Client::connect(etcd_endpoints(), None).await.expect("connect etcd");
    let deployment = DeploymentIdentifier::with_environment("etcd-concurrent", "test").unwrap();
    cleanup(&mut client, &deployment).await;
    let node = Node::new("127.0.0.1", Some(18100));
    put_node(&mut client, &deployment, &node).await;

    let source = EtcdNodeSource::new(deployment.clone(), test_settings());
    let (first, second) = tokio::join!(source.init(), source.init());
    first.unwrap();
    second.unwrap();
    source.init().await.unwrap();
    assert_eq!(source.nodes().unwrap(), vec![node]);

    source.shutdown();
    cleanup(&mut client, &deployment).await;
}
