//! config for damocles-manager

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use fil_clock::ChainEpoch;
use fil_types::ActorID;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RPC_LISTEN: &str = "127.0.0.1:1789";
pub const DEFAULT_CHAIN_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_METADB_DIR: &str = "metadb";

/// chain & market endpoints
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CommonAPI {
    /// multiaddr or url of the chain service
    pub chain: String,

    /// url or multiaddr of the market service, used for piece redirects
    pub market: Option<String>,

    /// bearer token for both services
    pub token: Option<String>,

    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// one fs based storage instance
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// instance name, defaults to the path
    pub name: Option<String>,

    pub path: PathBuf,

    #[serde(default)]
    pub readonly: bool,

    /// free-form labels reported back to callers
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl StoreConfig {
    /// name of the instance
    pub fn instance_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Common {
    pub api: CommonAPI,

    /// stores holding sealed files & cache dirs
    #[serde(default)]
    pub persist_stores: Vec<StoreConfig>,

    /// stores holding piece data
    #[serde(default)]
    pub piece_stores: Vec<StoreConfig>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SnapUpConfig {
    #[serde(default)]
    pub enabled: bool,

    /// candidates must stay alive for at least this many epochs
    pub min_lifetime: Option<ChainEpoch>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    pub actor: ActorID,

    #[serde(default)]
    pub snapup: SnapUpConfig,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RPCServer {
    /// listen address for both the jsonrpc & piece store endpoints
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MetaDBConfig {
    /// rocksdb dir, defaults to `metadb` under the home dir
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enable: bool,
    pub http_listen: Option<SocketAddr>,
}

/// external window post prover
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProverConfig {
    /// binary path
    pub bin: Option<String>,

    pub args: Option<Vec<String>>,

    /// env pairs for the sub-process
    pub envs: Option<HashMap<String, String>>,
}

/// global configuration
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    /// section for shared endpoints and stores
    pub common: Common,

    /// section for miner actors
    #[serde(default)]
    pub miners: Vec<MinerConfig>,

    /// section for the rpc server
    #[serde(default)]
    pub rpc: RPCServer,

    /// section for metadata persistence
    #[serde(default)]
    pub metadb: MetaDBConfig,

    /// section for metrics
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// section for the window post prover
    #[serde(default)]
    pub prover: ProverConfig,
}

impl Config {
    /// load config from the bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        toml::from_str(str::from_utf8(bytes)?).context("deserialize config")
    }

    /// load from config file
    pub fn load<P: AsRef<Path>>(p: P) -> Result<Self> {
        let bytes = fs::read(p.as_ref()).with_context(|| {
            format!("read config file: {}", p.as_ref().display())
        })?;
        Self::from_bytes(&bytes)
    }

    /// get listen addr for the rpc server
    pub fn rpc_listen_addr(&self) -> Result<SocketAddr> {
        match self.rpc.listen {
            Some(addr) => Ok(addr),
            None => DEFAULT_RPC_LISTEN
                .parse()
                .with_context(|| format!("parse default listen address {}", DEFAULT_RPC_LISTEN)),
        }
    }

    /// get the chain request timeout
    pub fn chain_timeout(&self) -> Duration {
        self.common.api.timeout.unwrap_or(DEFAULT_CHAIN_TIMEOUT)
    }

    /// get the metadb dir, relative paths are joined onto `home`
    pub fn metadb_path(&self, home: &Path) -> PathBuf {
        match self.metadb.path.as_ref() {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => home.join(p),
            None => home.join(DEFAULT_METADB_DIR),
        }
    }

    /// miner actors keyed by id, duplicated actors are rejected
    pub fn miner_configs(&self) -> Result<HashMap<ActorID, MinerConfig>> {
        let mut miners = HashMap::with_capacity(self.miners.len());
        for m in self.miners.iter() {
            if miners.insert(m.actor, m.clone()).is_some() {
                return Err(anyhow!("duplicate miner actor {}", m.actor));
            }
        }

        Ok(miners)
    }

    /// render the config content
    pub fn render(&self) -> Result<String> {
        use std::io::Write;

        let mut buf = Vec::new();
        writeln!(&mut buf, "{:#?}", self)?;
        Ok(String::from_utf8(buf)?)
    }
}
