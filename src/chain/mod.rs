//! chain & market collaborators

use std::ops::Range;

use fil_clock::ChainEpoch;
use fil_types::{ActorID, SectorNumber};
use forest_cid::json::CidJson;
use forest_cid::Cid;
use fvm_ipld_bitfield::{iter::Ranges, BitField};
use serde::{de, ser::SerializeSeq, Deserialize, Deserializer, Serialize, Serializer};

use crate::types::SealProof;

pub mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use client::{ChainClient, MarketClient};

/// network version of the chain
pub type NetworkVersion = u32;

pub mod policy {
    use fil_clock::ChainEpoch;

    use super::NetworkVersion;

    pub const CHAIN_FINALITY: ChainEpoch = 900;

    /// number of deadlines in one proving period
    pub const WPOST_PERIOD_DEADLINES: u64 = 48;

    /// epochs a sector must stay referenceable for winning post
    pub fn winning_post_sector_set_lookback(nv: NetworkVersion) -> ChainEpoch {
        if nv <= 3 {
            return 10;
        }

        CHAIN_FINALITY
    }
}

/// cids of the blocks inside a tipset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TipSetKey(pub Vec<CidJson>);

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChainHead {
    #[serde(rename = "Cids")]
    pub key: TipSetKey,
    pub height: ChainEpoch,
}

fn zero_big_int() -> String {
    "0".to_owned()
}

/// on-chain record of a sector
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorOnChainInfo {
    pub sector_number: SectorNumber,
    pub seal_proof: SealProof,
    #[serde(rename = "SealedCID")]
    pub sealed_cid: CidJson,
    #[serde(rename = "DealIDs", default)]
    pub deal_ids: Option<Vec<u64>>,
    pub activation: ChainEpoch,
    pub expiration: ChainEpoch,
    #[serde(default = "zero_big_int")]
    pub deal_weight: String,
    #[serde(default = "zero_big_int")]
    pub verified_deal_weight: String,
    #[serde(rename = "SectorKeyCID", default)]
    pub sector_key_cid: Option<CidJson>,
}

impl SectorOnChainInfo {
    /// if any deal weight is carried
    pub fn has_deal_weight(&self) -> bool {
        let nonzero = |w: &str| !w.is_empty() && w.trim_start_matches('0') != "";
        nonzero(&self.deal_weight) || nonzero(&self.verified_deal_weight)
    }
}

/// read-only chain queries
pub trait ChainAPI: Send + Sync {
    fn chain_head(&self) -> anyhow::Result<ChainHead>;

    fn state_network_version(&self, tsk: &TipSetKey) -> anyhow::Result<NetworkVersion>;

    fn winning_post_sector_set_lookback(&self, nv: NetworkVersion) -> ChainEpoch {
        policy::winning_post_sector_set_lookback(nv)
    }

    /// on-chain records of the given sector numbers, all of them if empty
    fn state_miner_sectors(
        &self,
        miner: ActorID,
        numbers: &[SectorNumber],
        tsk: &TipSetKey,
    ) -> anyhow::Result<Vec<SectorOnChainInfo>>;

    fn state_sector_get_info(
        &self,
        miner: ActorID,
        number: SectorNumber,
        tsk: &TipSetKey,
    ) -> anyhow::Result<Option<SectorOnChainInfo>>;

    /// active sectors assigned to the deadline
    fn state_miner_deadline_sectors(
        &self,
        miner: ActorID,
        deadline: u64,
        tsk: &TipSetKey,
    ) -> anyhow::Result<Vec<SectorOnChainInfo>>;
}

/// remote market service holding piece data
pub trait MarketAPI: Send + Sync {
    fn piece_resource_url(&self, piece: &Cid) -> String;
}

/// bitfield carried in json as RLE+ run lengths, the first run being unset bits
#[derive(Clone, Debug, Default)]
pub struct BitFieldRuns(pub BitField);

impl From<BitField> for BitFieldRuns {
    fn from(bf: BitField) -> Self {
        BitFieldRuns(bf)
    }
}

impl Serialize for BitFieldRuns {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        let mut pos = 0u64;
        for range in self.0.ranges() {
            seq.serialize_element(&(range.start - pos))?;
            seq.serialize_element(&(range.end - range.start))?;
            pos = range.end;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for BitFieldRuns {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let runs: Vec<u64> = Vec::deserialize(deserializer)?;

        let mut ranges: Vec<Range<u64>> = Vec::with_capacity(runs.len() / 2);
        let mut pos = 0u64;
        for (idx, run) in runs.into_iter().enumerate() {
            let end = pos
                .checked_add(run)
                .ok_or_else(|| de::Error::custom("bitfield runs overflow"))?;

            if idx % 2 == 1 && run > 0 {
                match ranges.last_mut() {
                    Some(last) if last.end == pos => last.end = end,
                    _ => ranges.push(pos..end),
                }
            }
            pos = end;
        }

        Ok(BitFieldRuns(BitField::from_ranges(Ranges::new(ranges))))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_lookback_policy() {
        assert_eq!(policy::winning_post_sector_set_lookback(3), 10);
        assert_eq!(policy::winning_post_sector_set_lookback(4), 900);
        assert_eq!(policy::winning_post_sector_set_lookback(21), 900);
    }

    #[test]
    fn test_bitfield_runs() {
        let cases: Vec<(Vec<u64>, Vec<u64>)> = vec![
            (vec![], vec![]),
            (vec![0], vec![0, 1]),
            (vec![5, 7], vec![5, 1, 1, 1]),
            (vec![2, 3, 4, 9], vec![2, 3, 4, 1]),
        ];

        for (numbers, runs) in cases {
            let bf = BitFieldRuns(BitField::try_from_bits(numbers.clone()).unwrap());
            assert_eq!(serde_json::to_value(&bf).unwrap(), serde_json::json!(runs));

            let decoded: BitFieldRuns = serde_json::from_value(serde_json::json!(runs)).unwrap();
            assert_eq!(decoded.0.iter().collect::<Vec<_>>(), numbers);
        }

        // zero-length set runs are tolerated & adjacent ranges merged
        let decoded: BitFieldRuns = serde_json::from_str("[1, 2, 0, 0, 0, 1]").unwrap();
        assert_eq!(decoded.0.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_bitfield_huge_run() {
        // a run covering 2^40 sectors is kept as a range
        let decoded: BitFieldRuns = serde_json::from_str("[0, 1099511627776]").unwrap();
        assert_eq!(decoded.0.len(), 1 << 40);
        assert_eq!(decoded.0.first(), Some(0));

        let err = serde_json::from_str::<BitFieldRuns>("[18446744073709551615, 2]");
        assert!(err.is_err());
    }

    #[test]
    fn test_deal_weight() {
        let raw = r#"{
            "SectorNumber": 1,
            "SealProof": 8,
            "SealedCID": {"/": "baga6ea4seaqdb5jftgpyv2rsxatevpzfb5i5747roq57jb2n3mnkjmz3etcreda"},
            "Activation": 10,
            "Expiration": 100000,
            "DealWeight": "0",
            "VerifiedDealWeight": "0"
        }"#;
        let info: SectorOnChainInfo = serde_json::from_str(raw).unwrap();
        assert!(!info.has_deal_weight());
        assert!(info.sector_key_cid.is_none());

        let mut info = info;
        info.verified_deal_weight = "1024".to_owned();
        assert!(info.has_deal_weight());
    }
}
