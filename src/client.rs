//! Binary-protocol client collaborator.
//!
//! The tools in this crate are glue around a key/value client: they parse
//! addresses and arguments, then forward everything to the connection. The
//! [`Client`] trait is that capability surface; [`McClient`] is the TCP-backed
//! implementation. The wire format is a line of serde_json per request and
//! response, which keeps the transport out of the tools' contract.

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::addr::{AddrFamily, ConnectionTarget};
use crate::{McError, Result};

/// Requested replication/persistence guarantee for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurabilityLevel {
    /// No durability requirement.
    None,
    /// Acknowledged by a majority of replicas.
    Majority,
    /// Majority acknowledgement plus persistence on the active node.
    MajorityAndPersistOnMaster,
    /// Persisted on a majority of replicas.
    PersistToMajority,
}

impl DurabilityLevel {
    /// Decode a raw wire-level durability value (0-3).
    pub fn from_raw(raw: u8) -> Result<DurabilityLevel> {
        match raw {
            0 => Ok(DurabilityLevel::None),
            1 => Ok(DurabilityLevel::Majority),
            2 => Ok(DurabilityLevel::MajorityAndPersistOnMaster),
            3 => Ok(DurabilityLevel::PersistToMajority),
            other => Err(McError::InvalidDurability(other)),
        }
    }
}

impl Default for DurabilityLevel {
    fn default() -> Self {
        DurabilityLevel::Majority
    }
}

/// Durability attached to a single write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurabilityRequirement {
    /// Requested guarantee.
    pub level: DurabilityLevel,
    /// Server-side timeout in milliseconds, server default when `None`.
    pub timeout: Option<u64>,
}

/// Outcome of a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    /// Compare-and-swap value of the stored document.
    pub cas: u64,
    /// Mutation sequence number assigned by the server.
    pub seqno: u64,
}

impl std::fmt::Display for MutationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cas:{} seqno:{}", self.cas, self.seqno)
    }
}

/// Server feature toggled during session setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    /// Extended error codes.
    Xerror,
    /// Mutation sequence numbers in mutation responses.
    MutationSeqno,
    /// Server-side tracing of request durations.
    Tracing,
}

/// Write operation variants sharing one request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationOp {
    /// Store unconditionally.
    Set,
    /// Store only if the key does not exist.
    Add,
    /// Store only if the key exists.
    Replace,
}

/// One request on the wire.
#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    /// Capability handshake carrying the agent name.
    Hello {
        /// Agent string identifying the tool.
        agent: String,
    },
    /// Plaintext credential exchange.
    SaslAuthPlain {
        /// User name.
        user: String,
        /// Password.
        password: String,
    },
    /// Select the bucket all later operations target.
    SelectBucket {
        /// Bucket name.
        bucket: String,
    },
    /// Toggle a server feature on.
    EnableFeature {
        /// Feature to enable.
        feature: Feature,
    },
    /// Read a key.
    Get {
        /// Key to read.
        key: String,
    },
    /// Store a value, optionally durably.
    Mutate {
        /// Which store semantics to apply.
        op: MutationOp,
        /// Key to write.
        key: String,
        /// Value bytes.
        value: Vec<u8>,
        /// Durability requirement, plain write when `None`.
        durability: Option<DurabilityRequirement>,
    },
    /// Delete a key, optionally durably.
    Delete {
        /// Key to delete.
        key: String,
        /// Durability requirement, plain delete when `None`.
        durability: Option<DurabilityRequirement>,
    },
}

/// Response to session-setup requests.
#[derive(Debug, Serialize, Deserialize)]
pub enum StatusResponse {
    /// Request accepted.
    Ok(()),
    /// Server-side failure.
    Err(String),
}

/// Response to a `Get`.
#[derive(Debug, Serialize, Deserialize)]
pub enum GetResponse {
    /// Value bytes, `None` when the key does not exist.
    Ok(Option<Vec<u8>>),
    /// Server-side failure.
    Err(String),
}

/// Response to a `Mutate` or `Delete`.
#[derive(Debug, Serialize, Deserialize)]
pub enum MutationResponse {
    /// Mutation applied.
    Ok(MutationResult),
    /// Server-side failure.
    Err(String),
}

/// Capability surface of the key/value connection, as consumed by the tools.
///
/// Everything behind these methods, including the durability semantics and
/// the authentication exchange, belongs to the client/server pair; the tools
/// only forward arguments and print results.
pub trait Client {
    /// Capability handshake, announcing the agent name.
    fn hello(&mut self, agent: &str) -> Result<()>;
    /// Authenticate via plaintext credential exchange.
    fn sasl_auth_plain(&mut self, user: &str, password: &str) -> Result<()>;
    /// Select the target bucket.
    fn select_bucket(&mut self, bucket: &str) -> Result<()>;
    /// Enable extended error codes.
    fn enable_xerror(&mut self) -> Result<()>;
    /// Enable mutation sequence numbers.
    fn enable_mutation_seqno(&mut self) -> Result<()>;
    /// Enable request tracing.
    fn enable_tracing(&mut self) -> Result<()>;

    /// Get the value of a key, `None` if it does not exist.
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Store a value unconditionally.
    fn set(&mut self, key: &str, value: &[u8]) -> Result<MutationResult>;
    /// Store a value only if the key does not exist.
    fn add(&mut self, key: &str, value: &[u8]) -> Result<MutationResult>;
    /// Store a value only if the key exists.
    fn replace(&mut self, key: &str, value: &[u8]) -> Result<MutationResult>;
    /// Delete a key.
    fn delete(&mut self, key: &str) -> Result<MutationResult>;

    /// `set` with a durability requirement.
    fn set_durable(
        &mut self,
        key: &str,
        value: &[u8],
        durability: DurabilityRequirement,
    ) -> Result<MutationResult>;
    /// `add` with a durability requirement.
    fn add_durable(
        &mut self,
        key: &str,
        value: &[u8],
        durability: DurabilityRequirement,
    ) -> Result<MutationResult>;
    /// `replace` with a durability requirement.
    fn replace_durable(
        &mut self,
        key: &str,
        value: &[u8],
        durability: DurabilityRequirement,
    ) -> Result<MutationResult>;
    /// `delete` with a durability requirement.
    fn delete_durable(
        &mut self,
        key: &str,
        durability: DurabilityRequirement,
    ) -> Result<MutationResult>;
}

/// TCP-backed client: one blocking connection per process, opened once and
/// used for every command.
pub struct McClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl McClient {
    /// Connect to the target, honouring the address family inferred from the
    /// address syntax. Every matching resolved address is tried in order.
    pub fn connect(target: &ConnectionTarget) -> Result<McClient> {
        let addrs = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(McError::Connection)?;

        let mut last_err: Option<std::io::Error> = None;
        for addr in addrs.filter(|a| family_matches(a, target.family)) {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    debug!("connected to {}", addr);
                    let reader = BufReader::new(stream.try_clone().map_err(McError::Connection)?);
                    return Ok(McClient {
                        reader,
                        writer: stream,
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(McError::Connection(last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no {:?} address found for {}", target.family, target.host),
            )
        })))
    }

    fn call<R: DeserializeOwned + std::fmt::Debug>(&mut self, req: &Request) -> Result<R> {
        debug!("request: {:?}", req);
        serde_json::to_writer(&mut self.writer, req)?;
        self.writer.flush()?;

        let mut de = serde_json::Deserializer::from_reader(&mut self.reader);
        let resp = R::deserialize(&mut de)?;
        debug!("response: {:?}", resp);
        Ok(resp)
    }

    fn status(&mut self, req: Request) -> Result<()> {
        match self.call(&req)? {
            StatusResponse::Ok(()) => Ok(()),
            StatusResponse::Err(msg) => Err(McError::Server(msg)),
        }
    }

    fn mutate(
        &mut self,
        op: MutationOp,
        key: &str,
        value: &[u8],
        durability: Option<DurabilityRequirement>,
    ) -> Result<MutationResult> {
        let req = Request::Mutate {
            op,
            key: key.to_string(),
            value: value.to_vec(),
            durability,
        };
        match self.call(&req)? {
            MutationResponse::Ok(result) => Ok(result),
            MutationResponse::Err(msg) => Err(McError::Server(msg)),
        }
    }

    fn remove(&mut self, key: &str, durability: Option<DurabilityRequirement>) -> Result<MutationResult> {
        let req = Request::Delete {
            key: key.to_string(),
            durability,
        };
        match self.call(&req)? {
            MutationResponse::Ok(result) => Ok(result),
            MutationResponse::Err(msg) => Err(McError::Server(msg)),
        }
    }
}

fn family_matches(addr: &SocketAddr, family: AddrFamily) -> bool {
    match family {
        AddrFamily::Unspec => true,
        AddrFamily::Inet => addr.is_ipv4(),
        AddrFamily::Inet6 => addr.is_ipv6(),
    }
}

impl Client for McClient {
    fn hello(&mut self, agent: &str) -> Result<()> {
        self.status(Request::Hello {
            agent: agent.to_string(),
        })
    }

    fn sasl_auth_plain(&mut self, user: &str, password: &str) -> Result<()> {
        self.status(Request::SaslAuthPlain {
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    fn select_bucket(&mut self, bucket: &str) -> Result<()> {
        self.status(Request::SelectBucket {
            bucket: bucket.to_string(),
        })
    }

    fn enable_xerror(&mut self) -> Result<()> {
        self.status(Request::EnableFeature {
            feature: Feature::Xerror,
        })
    }

    fn enable_mutation_seqno(&mut self) -> Result<()> {
        self.status(Request::EnableFeature {
            feature: Feature::MutationSeqno,
        })
    }

    fn enable_tracing(&mut self) -> Result<()> {
        self.status(Request::EnableFeature {
            feature: Feature::Tracing,
        })
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let req = Request::Get {
            key: key.to_string(),
        };
        match self.call(&req)? {
            GetResponse::Ok(value) => Ok(value),
            GetResponse::Err(msg) => Err(McError::Server(msg)),
        }
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<MutationResult> {
        self.mutate(MutationOp::Set, key, value, None)
    }

    fn add(&mut self, key: &str, value: &[u8]) -> Result<MutationResult> {
        self.mutate(MutationOp::Add, key, value, None)
    }

    fn replace(&mut self, key: &str, value: &[u8]) -> Result<MutationResult> {
        self.mutate(MutationOp::Replace, key, value, None)
    }

    fn delete(&mut self, key: &str) -> Result<MutationResult> {
        self.remove(key, None)
    }

    fn set_durable(
        &mut self,
        key: &str,
        value: &[u8],
        durability: DurabilityRequirement,
    ) -> Result<MutationResult> {
        self.mutate(MutationOp::Set, key, value, Some(durability))
    }

    fn add_durable(
        &mut self,
        key: &str,
        value: &[u8],
        durability: DurabilityRequirement,
    ) -> Result<MutationResult> {
        self.mutate(MutationOp::Add, key, value, Some(durability))
    }

    fn replace_durable(
        &mut self,
        key: &str,
        value: &[u8],
        durability: DurabilityRequirement,
    ) -> Result<MutationResult> {
        self.mutate(MutationOp::Replace, key, value, Some(durability))
    }

    fn delete_durable(
        &mut self,
        key: &str,
        durability: DurabilityRequirement,
    ) -> Result<MutationResult> {
        self.remove(key, Some(durability))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durability_level_from_raw() {
        assert_eq!(DurabilityLevel::from_raw(0).unwrap(), DurabilityLevel::None);
        assert_eq!(
            DurabilityLevel::from_raw(1).unwrap(),
            DurabilityLevel::Majority
        );
        assert_eq!(
            DurabilityLevel::from_raw(2).unwrap(),
            DurabilityLevel::MajorityAndPersistOnMaster
        );
        assert_eq!(
            DurabilityLevel::from_raw(3).unwrap(),
            DurabilityLevel::PersistToMajority
        );
        assert!(matches!(
            DurabilityLevel::from_raw(4),
            Err(McError::InvalidDurability(4))
        ));
    }

    #[test]
    fn default_requirement_is_majority() {
        let req = DurabilityRequirement::default();
        assert_eq!(req.level, DurabilityLevel::Majority);
        assert_eq!(req.timeout, None);
    }
}
