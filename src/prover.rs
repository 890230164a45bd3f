//! window post prover collaborator

use std::collections::HashMap;
use std::env::vars;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use fil_types::ActorID;
use serde::{Deserialize, Serialize};

use crate::b64serde::B64Vec;
use crate::config::ProverConfig;
use crate::logging::debug;
use crate::types::{PoStProof, PrivateSectorInfo};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WindowPoStOutput {
    pub proofs: Vec<B64Vec>,
    /// numbers of the sectors failed to be proved
    #[serde(default)]
    pub faults: Vec<u64>,
}

pub trait Prover: Send + Sync {
    fn generate_window_post(
        &self,
        miner: ActorID,
        proof_type: PoStProof,
        sectors: &[PrivateSectorInfo],
        randomness: &[u8],
    ) -> Result<WindowPoStOutput>;
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WindowPoStInput<'a> {
    miner_id: ActorID,
    proof_type: PoStProof,
    sectors: &'a [PrivateSectorInfo],
    randomness: B64Vec,
}

#[derive(Deserialize)]
struct Response<T> {
    err_msg: Option<String>,
    result: Option<T>,
}

/// runs the configured program once per request,
/// one json line in through stdin & one json line out through stdout
pub struct ExtProver {
    bin: String,
    args: Vec<String>,
    envs: HashMap<String, String>,
}

impl ExtProver {
    pub fn from_config(cfg: &ProverConfig) -> Result<Option<Self>> {
        let bin = match cfg.bin.as_ref() {
            Some(b) if !b.is_empty() => b.clone(),
            _ => return Ok(None),
        };

        Ok(Some(ExtProver {
            bin,
            args: cfg.args.clone().unwrap_or_default(),
            envs: cfg.envs.clone().unwrap_or_default(),
        }))
    }

    fn call<I: Serialize, O: serde::de::DeserializeOwned>(&self, input: &I) -> Result<O> {
        let mut envs: HashMap<String, String> = vars().collect();
        envs.extend(self.envs.clone());

        let mut child = Command::new(&self.bin)
            .args(&self.args)
            .envs(envs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn prover {}", self.bin))?;

        let mut stdin = child.stdin.take().ok_or_else(|| anyhow!("child stdin not found"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("child stdout not found"))?;

        let mut line = serde_json::to_vec(input).context("encode prover input")?;
        line.push(b'\n');
        stdin.write_all(&line).context("write prover input")?;
        drop(stdin);

        let mut out = String::new();
        BufReader::new(stdout)
            .read_line(&mut out)
            .context("read prover output")?;

        let status = child.wait().context("wait for prover")?;
        debug!(bin = self.bin.as_str(), ?status, "prover exited");

        let resp: Response<O> = serde_json::from_str(out.trim())
            .with_context(|| format!("decode prover output, exit status {}", status))?;

        if let Some(msg) = resp.err_msg {
            return Err(anyhow!("prover failed: {}", msg));
        }

        resp.result.ok_or_else(|| anyhow!("prover returned no result"))
    }
}

impl Prover for ExtProver {
    fn generate_window_post(
        &self,
        miner: ActorID,
        proof_type: PoStProof,
        sectors: &[PrivateSectorInfo],
        randomness: &[u8],
    ) -> Result<WindowPoStOutput> {
        self.call(&WindowPoStInput {
            miner_id: miner,
            proof_type,
            sectors,
            randomness: B64Vec::from(randomness.to_vec()),
        })
    }
}

/// used when no prover program is configured
pub struct UnavailableProver;

impl Prover for UnavailableProver {
    fn generate_window_post(
        &self,
        _miner: ActorID,
        _proof_type: PoStProof,
        _sectors: &[PrivateSectorInfo],
        _randomness: &[u8],
    ) -> Result<WindowPoStOutput> {
        Err(anyhow!("no window post prover configured"))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::mpsc::{channel, Receiver, Sender};
    use std::sync::Mutex;

    use super::*;

    /// reports every request through a channel
    pub struct RecordingProver {
        tx: Mutex<Sender<(ActorID, usize)>>,
    }

    impl RecordingProver {
        pub fn new() -> (Self, Receiver<(ActorID, usize)>) {
            let (tx, rx) = channel();
            (RecordingProver { tx: Mutex::new(tx) }, rx)
        }
    }

    impl Prover for RecordingProver {
        fn generate_window_post(
            &self,
            miner: ActorID,
            _proof_type: PoStProof,
            sectors: &[PrivateSectorInfo],
            _randomness: &[u8],
        ) -> Result<WindowPoStOutput> {
            let _ = self.tx.lock().unwrap().send((miner, sectors.len()));
            Err(anyhow!("recording prover never proves"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    fn script_prover(body: &str) -> (tempfile::TempDir, ExtProver) {
        let dir = tempdir().unwrap();
        let script = dir.path().join("prover.sh");
        let mut f = std::fs::File::create(&script).unwrap();
        writeln!(f, "read line").unwrap();
        writeln!(f, "{}", body).unwrap();
        drop(f);

        let prover = ExtProver::from_config(&ProverConfig {
            bin: Some("sh".to_owned()),
            args: Some(vec![script.to_string_lossy().into_owned()]),
            envs: None,
        })
        .unwrap()
        .unwrap();

        (dir, prover)
    }

    #[test]
    fn test_not_configured() {
        assert!(ExtProver::from_config(&ProverConfig::default()).unwrap().is_none());
        assert!(UnavailableProver
            .generate_window_post(1000, PoStProof::StackedDrgWindow32GiBV1, &[], &[0; 32])
            .is_err());
    }

    #[test]
    fn test_ext_prover_result() {
        let (_dir, prover) =
            script_prover(r#"echo '{"err_msg":null,"result":{"Proofs":["AQID"],"Faults":[3]}}'"#);
        let out = prover
            .generate_window_post(1000, PoStProof::StackedDrgWindow32GiBV1, &[], &[0; 32])
            .unwrap();
        assert_eq!(out.proofs.len(), 1);
        assert_eq!(out.proofs[0].as_ref(), &[1u8, 2, 3][..]);
        assert_eq!(out.faults, vec![3]);
    }

    #[test]
    fn test_ext_prover_error() {
        let (_dir, prover) = script_prover(r#"echo '{"err_msg":"no gpu","result":null}'"#);
        let err = prover
            .generate_window_post(1000, PoStProof::StackedDrgWindow32GiBV1, &[], &[0; 32])
            .unwrap_err();
        assert!(format!("{}", err).contains("no gpu"));
    }
}
