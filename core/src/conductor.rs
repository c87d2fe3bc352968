// vim: tw=80
//! The conductor client: the control-plane queries an `Aof` needs before it
//! can talk to a Volume (spec.md section 6).
//!
//! Only the two queries spec.md names are implemented: asking the conductor
//! to create a new AoF-backed volume, and asking whether one already exists.
//! The conductor server itself, replica placement, and the wire transport to
//! the Volume are all out of scope (spec.md section 1) — this is strictly
//! the client side, the same boundary the teacher draws around `rpc.rs`'s
//! client stubs for its own control plane.

use crate::{
    error::{Error, Result},
    types::VolId,
};
use serde::Deserialize;

/// What the conductor is asked to do, and what it reports back.
pub trait Conductor: Send + Sync {
    /// Ask the conductor to allocate a new volume for an AoF, sized `size`
    /// bytes with `replica_count` replicas. Returns the assigned volume id.
    fn create_aof(&self, name: &str, size: u64, replica_count: u32) -> Result<VolId>;

    /// Ask whether a volume by this name already exists.
    fn check_volume_exists(&self, name: &str) -> Result<bool>;
}

/// Common shape of a conductor JSON reply (spec.md section 6): every
/// response carries at least a `ret_code`, zero on success; `reason` is
/// present only on failure; payload fields vary per query.
#[derive(Debug, Deserialize)]
struct Reply {
    ret_code: i32,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    vol_id: Option<VolId>,
    #[serde(default)]
    exists: Option<bool>,
}

impl Reply {
    fn into_result(self) -> Result<Reply> {
        if self.ret_code != 0 {
            Err(Error::Econductor {
                ret_code: self.ret_code,
                reason: self.reason,
            })
        } else {
            Ok(self)
        }
    }
}

/// A blocking HTTP client for the conductor's control plane, matching
/// spec.md section 6's `op=create_aof`/`op=check_volume_exists` queries.
///
/// Uses `reqwest`'s blocking client rather than its async one: every caller
/// of this trait already runs on a native blocking thread (the AoF lifecycle
/// calls, never an executor handler — spec.md section 4.2's
/// no-blocking-in-handlers rule), so there is nothing to gain from async
/// here and it keeps this module out of the executor's cooperative-scheduling
/// concerns entirely.
pub struct HttpConductor {
    base_url: String,
    client:   reqwest::blocking::Client,
}

impl HttpConductor {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpConductor {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    #[tracing::instrument(skip(self))]
    fn get(&self, query: &[(&str, String)]) -> Result<Reply> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(query)
            .send()?
            .error_for_status()?;
        let reply: Reply = resp.json()?;
        reply.into_result()
    }
}

impl Conductor for HttpConductor {
    #[tracing::instrument(skip(self))]
    fn create_aof(&self, name: &str, size: u64, replica_count: u32) -> Result<VolId> {
        let reply = self.get(&[
            ("op", "create_aof".to_string()),
            ("volume_name", name.to_string()),
            ("size", size.to_string()),
            ("rep_cnt", replica_count.to_string()),
        ])?;
        reply
            .vol_id
            .ok_or_else(|| Error::Other("conductor reply missing vol_id".to_string()))
    }

    #[tracing::instrument(skip(self))]
    fn check_volume_exists(&self, name: &str) -> Result<bool> {
        let reply = self.get(&[
            ("op", "check_volume_exists".to_string()),
            ("volume_name", name.to_string()),
        ])?;
        Ok(reply.exists.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_with_nonzero_ret_code_is_an_error() {
        let reply = Reply {
            ret_code: 17,
            reason: "already exists".to_string(),
            vol_id: None,
            exists: None,
        };
        let err = reply.into_result().unwrap_err();
        match err {
            Error::Econductor { ret_code, reason } => {
                assert_eq!(ret_code, 17);
                assert_eq!(reason, "already exists");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn reply_with_zero_ret_code_is_ok() {
        let reply = Reply {
            ret_code: 0,
            reason: String::new(),
            vol_id: Some(42),
            exists: None,
        };
        assert_eq!(reply.into_result().unwrap().vol_id, Some(42));
    }
}
