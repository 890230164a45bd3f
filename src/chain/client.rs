//! json-rpc client of the chain service

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use fil_types::{ActorID, SectorNumber};
use forest_cid::Cid;
use fvm_ipld_bitfield::BitField;
use reqwest::blocking::{Client, ClientBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    BitFieldRuns, ChainAPI, ChainHead, MarketAPI, NetworkVersion, SectorOnChainInfo, TipSetKey,
};
use crate::logging::trace;
use crate::util::net::{rpc_addr, Endpoint};

const CHAIN_API_VERSION: u32 = 1;
const METHOD_NAMESPACE: &str = "Filecoin";

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Partition {
    #[serde(default)]
    active_sectors: BitFieldRuns,
}

fn miner_addr(miner: ActorID) -> String {
    format!("f0{}", miner)
}

pub struct ChainClient {
    url: String,
    token: Option<String>,
    client: Client,
    seq: AtomicU64,
}

impl ChainClient {
    /// `addr` could be either a multiaddr or an url
    pub fn new(addr: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let url = rpc_addr(addr, CHAIN_API_VERSION)?;
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .context("build chain http client")?;

        Ok(ChainClient {
            url,
            token,
            client,
            seq: AtomicU64::new(0),
        })
    }

    fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.seq.fetch_add(1, Ordering::Relaxed);
        let method = format!("{}.{}", METHOD_NAMESPACE, method);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        trace!(id, method = method.as_str(), "chain request");

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(token) = self.token.as_ref() {
            req = req.bearer_auth(token);
        }

        let resp = req.send().with_context(|| format!("request {}", method))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("{} got unexpected status code {}", method, status));
        }

        let resp: RpcResponse = resp
            .json()
            .with_context(|| format!("decode response of {}", method))?;

        if let Some(err) = resp.error {
            return Err(anyhow!("{} failed, code {}: {}", method, err.code, err.message));
        }

        serde_json::from_value(resp.result.unwrap_or(Value::Null))
            .with_context(|| format!("decode result of {}", method))
    }

    /// all sectors of the miner when no filter is given
    fn miner_sectors_in(
        &self,
        miner: ActorID,
        filter: Option<BitField>,
        tsk: &TipSetKey,
    ) -> Result<Vec<SectorOnChainInfo>> {
        let filter = filter.map(BitFieldRuns);
        let sectors: Option<Vec<SectorOnChainInfo>> =
            self.call("StateMinerSectors", json!([miner_addr(miner), filter, tsk]))?;
        Ok(sectors.unwrap_or_default())
    }
}

impl ChainAPI for ChainClient {
    fn chain_head(&self) -> Result<ChainHead> {
        self.call("ChainHead", json!([]))
    }

    fn state_network_version(&self, tsk: &TipSetKey) -> Result<NetworkVersion> {
        self.call("StateNetworkVersion", json!([tsk]))
    }

    fn state_miner_sectors(
        &self,
        miner: ActorID,
        numbers: &[SectorNumber],
        tsk: &TipSetKey,
    ) -> Result<Vec<SectorOnChainInfo>> {
        if numbers.is_empty() {
            return self.miner_sectors_in(miner, None, tsk);
        }

        let filter = BitField::try_from_bits(numbers.iter().copied())
            .map_err(|e| anyhow!("build sector filter: {:?}", e))?;
        self.miner_sectors_in(miner, Some(filter), tsk)
    }

    fn state_sector_get_info(
        &self,
        miner: ActorID,
        number: SectorNumber,
        tsk: &TipSetKey,
    ) -> Result<Option<SectorOnChainInfo>> {
        self.call("StateSectorGetInfo", json!([miner_addr(miner), number, tsk]))
    }

    fn state_miner_deadline_sectors(
        &self,
        miner: ActorID,
        deadline: u64,
        tsk: &TipSetKey,
    ) -> Result<Vec<SectorOnChainInfo>> {
        let partitions: Option<Vec<Partition>> =
            self.call("StateMinerPartitions", json!([miner_addr(miner), deadline, tsk]))?;

        let active = partitions
            .unwrap_or_default()
            .iter()
            .fold(BitField::new(), |acc, p| &acc | &p.active_sectors.0);

        if active.is_empty() {
            return Ok(Vec::new());
        }

        self.miner_sectors_in(miner, Some(active), tsk)
    }
}

/// builds resource urls on the market service
pub struct MarketClient {
    base: String,
}

impl MarketClient {
    pub fn new(addr: &str) -> Result<Self> {
        let ep = Endpoint::parse(addr).context("parse market endpoint")?;
        Ok(MarketClient {
            base: ep.base_url(),
        })
    }
}

impl MarketAPI for MarketClient {
    fn piece_resource_url(&self, piece: &Cid) -> String {
        format!("{}/resource?resource-id={}", self.base, piece)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use forest_cid::Cid;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_market_resource_url() {
        let market = MarketClient::new("/ip4/127.0.0.1/tcp/41235").unwrap();
        let c = Cid::from_str("baga6ea4seaqdb5jftgpyv2rsxatevpzfb5i5747roq57jb2n3mnkjmz3etcreda")
            .unwrap();
        assert_eq!(
            market.piece_resource_url(&c),
            "http://127.0.0.1:41235/resource?resource-id=baga6ea4seaqdb5jftgpyv2rsxatevpzfb5i5747roq57jb2n3mnkjmz3etcreda"
        );
    }

    #[test]
    fn test_chain_client_url() {
        let client = ChainClient::new("/ip4/10.0.0.1/tcp/3453", None, Duration::from_secs(1)).unwrap();
        assert_eq!(client.url, "http://10.0.0.1:3453/rpc/v1");
        assert!(ChainClient::new("bad addr", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_partition_active_sectors() {
        let raw = r#"[{"ActiveSectors": [1, 2, 3, 1]}, {"ActiveSectors": [0, 1099511627776]}, {}]"#;
        let partitions: Vec<Partition> = serde_json::from_str(raw).unwrap();
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions[0].active_sectors.0.iter().collect::<Vec<_>>(), vec![1, 2, 6]);
        assert!(partitions[2].active_sectors.0.is_empty());

        let active = partitions
            .iter()
            .fold(BitField::new(), |acc, p| &acc | &p.active_sectors.0);
        assert_eq!(active.len(), 1 << 40);
    }
}
