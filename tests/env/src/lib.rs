use anyhow::Result;
use helmwatch::client;
use helmwatch::node::ClusterNode;
use helmwatch::process::{Node as Member, NodeRoles, Version};
use helmwatch::Config;
use std::collections::HashMap;
use std::sync::Once;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint, Uri};
use tracing::info;

static INIT: Once = Once::new();

/// Descriptor of the node listening on `port`.
pub fn member(id: u8, port: u16) -> Member {
    Member {
        id: helmwatch::NodeId::new(format!("nd{id}")),
        name: format!("nd{id}"),
        address: format!("http://127.0.0.1:{port}").parse().unwrap(),
        roles: NodeRoles::MASTER_ELIGIBLE.with(NodeRoles::DATA),
        version: Version::CURRENT,
    }
}

struct NodeServer {
    port: u16,
    node: ClusterNode,
    abort_tx0: Option<tokio::sync::oneshot::Sender<()>>,
}
impl NodeServer {
    fn new(id: u8, port: u16, config: Config) -> Result<Self> {
        let nd_tag = format!("ND{port}>");
        let (tx, rx) = tokio::sync::oneshot::channel();

        let node = ClusterNode::new(member(id, port), config);

        let svc_node = node.clone();
        let svc_task = async move {
            info!("add (id={id})");

            let cluster_svc = helmwatch::service::cluster::new(svc_node);
            let reflection_svc = helmwatch::service::reflection::new();

            let socket = format!("127.0.0.1:{port}").parse().unwrap();

            let mut builder = tonic::transport::Server::builder();
            builder
                .add_service(cluster_svc)
                .add_service(reflection_svc)
                .serve_with_shutdown(socket, async {
                    info!("remove (id={id})");
                    rx.await.ok();
                })
                .await
                .unwrap();
        };

        std::thread::Builder::new()
            .name(nd_tag.clone())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .thread_name(nd_tag)
                    .enable_all()
                    .build()
                    .unwrap();
                runtime.block_on(svc_task);
            })?;

        Ok(Self {
            port,
            node,
            abort_tx0: Some(tx),
        })
    }

    fn address(&self) -> Uri {
        let uri = format!("http://127.0.0.1:{}", self.port);
        Uri::from_maybe_shared(uri).unwrap()
    }
}
impl Drop for NodeServer {
    fn drop(&mut self) {
        let tx = self.abort_tx0.take().unwrap();
        tx.send(()).ok();
    }
}

pub struct Env {
    config: Config,
    nodes: HashMap<u8, NodeServer>,
    conn_cache: spin::Mutex<HashMap<u8, Channel>>,
}
impl Env {
    pub fn new(with_logging: bool) -> Self {
        Self::with_config(Config::default(), with_logging)
    }

    pub fn with_config(config: Config, with_logging: bool) -> Self {
        INIT.call_once(|| {
            // On terminating the tokio runtime,
            // flooding stack traces are printed and they are super noisy.
            // Until better idea is invented, we just suppress them.
            std::panic::set_hook(Box::new(|_info| {}));

            if with_logging {
                let format = tracing_subscriber::fmt::format()
                    .with_target(false)
                    .with_thread_names(true)
                    .compact();
                tracing_subscriber::fmt().event_format(format).init();
            }
        });
        Self {
            config,
            nodes: HashMap::new(),
            conn_cache: spin::Mutex::new(HashMap::new()),
        }
    }

    pub fn add_node(&mut self, id: u8) {
        let free_port = port_check::free_local_ipv4_port().unwrap();
        let node = NodeServer::new(id, free_port, self.config.clone()).unwrap();
        port_check::is_port_reachable_with_timeout(
            node.address().to_string(),
            Duration::from_secs(5),
        );
        self.nodes.insert(id, node);
    }

    pub fn remove_node(&mut self, id: u8) {
        if let Some(_node) = self.nodes.remove(&id) {
            // node is dropped
        }
    }

    /// The in-process handle of a node, for driving the election-layer seams
    /// (bootstrap, adopt_master, clear_master, set_discovery) directly.
    pub fn node(&self, id: u8) -> ClusterNode {
        self.nodes.get(&id).unwrap().node.clone()
    }

    pub fn member(&self, id: u8) -> Member {
        member(id, self.nodes.get(&id).unwrap().port)
    }

    pub fn get_connection(&self, id: u8) -> Channel {
        self.conn_cache
            .lock()
            .entry(id)
            .or_insert_with(|| {
                let uri = self.nodes.get(&id).unwrap().address();
                let endpoint = Endpoint::from(uri)
                    .http2_keep_alive_interval(std::time::Duration::from_secs(1))
                    .keep_alive_while_idle(true)
                    .timeout(std::time::Duration::from_secs(5))
                    .connect_timeout(std::time::Duration::from_secs(5));
                endpoint.connect_lazy()
            })
            .clone()
    }

    pub fn connect(&self, id: u8) -> client::ClusterClient {
        client::ClusterClient::new(self.get_connection(id))
    }

    pub fn address(&self, id: u8) -> Uri {
        self.nodes.get(&id).unwrap().address()
    }

    pub async fn check_connectivity(&self, id: u8) -> Result<()> {
        for _ in 0..50 {
            let uri = self.nodes.get(&id).unwrap().address();
            let endpoint =
                Endpoint::from(uri).connect_timeout(std::time::Duration::from_millis(100));
            match endpoint.connect().await {
                Ok(_) => return Ok(()),
                Err(_) => {
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
        anyhow::bail!("failed to connect to id={}", id);
    }
}
