use anyhow::{ensure, Result};
use env::Env;
use helmwatch::client;
use helmwatch::{Config, StateVersion};
use std::time::Duration;

pub struct Builder {
    with_logging: bool,
    config: Config,
}
impl Builder {
    fn new() -> Self {
        Self {
            with_logging: true,
            config: Config::default(),
        }
    }

    pub fn with_logging(self, b: bool) -> Self {
        Self {
            with_logging: b,
            ..self
        }
    }

    pub fn with_config(self, config: Config) -> Self {
        Self { config, ..self }
    }

    pub async fn build(self, n: u8) -> Result<Cluster> {
        ensure!(n > 0);
        let mut env = Env::with_config(self.config, self.with_logging);
        for id in 0..n {
            env.add_node(id);
            env.check_connectivity(id).await?;
        }
        Ok(Cluster { env })
    }
}

pub struct Cluster {
    env: Env,
}
impl Cluster {
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Create `n` nodes and connect them to a network.
    pub async fn new(n: u8) -> Result<Self> {
        Self::builder().build(n).await
    }

    pub fn env(&mut self) -> &mut Env {
        &mut self.env
    }

    pub fn admin(&self, id: u8) -> client::ClusterClient {
        self.env.connect(id)
    }

    /// Bootstrap node `id` as the first master of a fresh cluster.
    pub async fn bootstrap(&self, id: u8) -> Result<StateVersion> {
        let version = self.env.node(id).bootstrap().await?;
        Ok(version)
    }

    /// Request node `to` to admit node `id` into the cluster.
    pub async fn join_server(&self, to: u8, id: u8) -> Result<StateVersion> {
        let req = client::JoinRequest {
            node: Some(client::encode_node(&self.env.member(id))),
            assume_mastership: false,
        };
        let resp = self.admin(to).join(req).await?;
        Ok(resp.into_inner().state_version)
    }

    /// Poll node `id` until its diagnosis reaches `status` with a summary
    /// containing `needle` (pass "" to match any summary).
    pub async fn await_diagnosis(
        &self,
        id: u8,
        status: &str,
        needle: &str,
        deadline: Duration,
    ) -> Result<client::DiagnoseResponse> {
        let start = std::time::Instant::now();
        loop {
            let resp = self
                .admin(id)
                .diagnose(client::DiagnoseRequest { explain: true })
                .await?
                .into_inner();
            if resp.status == status && resp.summary.contains(needle) {
                return Ok(resp);
            }
            ensure!(
                start.elapsed() < deadline,
                "diagnosis of nd{id} did not reach {status}; last: {} ({})",
                resp.status,
                resp.summary
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
