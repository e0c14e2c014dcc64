//! Wire and storage types shared by every `subreg-*` crate.
//!
//! These are plain serde structs with no behavior beyond parsing/validation
//! helpers; components depend on the types here rather than re-deriving them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn subdomain_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9\-_+]{3,36}$").expect("valid regex"))
}

fn data_pubkey_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^pubkey:data:[0-9a-fA-F]+$").expect("valid regex"))
}

/// Maximum accepted length for a single subdomain's own zone file text.
pub const MAX_ZONEFILE_LEN: usize = 40_960;

/// Maximum accepted length for an intake request body.
pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

pub fn is_valid_subdomain_name(name: &str) -> bool {
    subdomain_name_re().is_match(name)
}

pub fn is_valid_data_pubkey(key: &str) -> bool {
    data_pubkey_re().is_match(key)
}

/// One URI record inside a subdomain's zone file (RFC 7553-style).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UriRecord {
    pub name: String,
    pub priority: u16,
    pub weight: u16,
    pub target: String,
}

/// The body accepted by the intake RPC's `POST /register` route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub subdomain: String,
    pub data_pubkey: String,
    #[serde(default)]
    pub uris: Option<Vec<UriRecord>>,
    #[serde(default)]
    pub zonefile_str: Option<String>,
}

/// Errors raised while validating and normalizing a [`RegisterRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    InvalidSubdomainName(String),
    InvalidDataPubkey,
    MissingZonefile,
    ZonefileTooLong(usize),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::InvalidSubdomainName(s) => {
                write!(f, "subdomain name '{s}' does not match required pattern")
            }
            RequestError::InvalidDataPubkey => write!(f, "data_pubkey does not match required pattern"),
            RequestError::MissingZonefile => {
                write!(f, "request must supply one of zonefile_str or uris")
            }
            RequestError::ZonefileTooLong(n) => write!(f, "zonefile text is {n} bytes, exceeds maximum"),
        }
    }
}

impl std::error::Error for RequestError {}

/// A validated subdomain creation, ready to be queued.
///
/// `sequence_number` is always `0` at creation time: the core never produces
/// a resubmission of an existing subdomain, only first-time registrations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subdomain {
    pub name: String,
    pub owner_pubkey: String,
    pub sequence_number: u32,
    pub zonefile_text: String,
}

/// Validate a [`RegisterRequest`] and assemble its [`Subdomain`], building the
/// zone-file text from `uris` when `zonefile_str` was not supplied directly.
pub fn parse_register_request(req: &RegisterRequest) -> Result<Subdomain, RequestError> {
    if !is_valid_subdomain_name(&req.subdomain) {
        return Err(RequestError::InvalidSubdomainName(req.subdomain.clone()));
    }
    if !is_valid_data_pubkey(&req.data_pubkey) {
        return Err(RequestError::InvalidDataPubkey);
    }

    let zonefile_text = match (&req.zonefile_str, &req.uris) {
        (Some(z), _) => z.clone(),
        (None, Some(uris)) => build_zonefile_from_uris(&req.subdomain, uris),
        (None, None) => return Err(RequestError::MissingZonefile),
    };

    if zonefile_text.len() > MAX_ZONEFILE_LEN {
        return Err(RequestError::ZonefileTooLong(zonefile_text.len()));
    }

    Ok(Subdomain {
        name: req.subdomain.clone(),
        owner_pubkey: req.data_pubkey.clone(),
        sequence_number: 0,
        zonefile_text,
    })
}

/// Assemble a minimal BIND-style zone file for one subdomain from its URI
/// records: `$origin`, a fixed `$ttl`, then one `uri` line per record.
pub fn build_zonefile_from_uris(subdomain: &str, uris: &[UriRecord]) -> String {
    let mut out = String::new();
    out.push_str(&format!("$origin {subdomain}\n"));
    out.push_str("$ttl 3600\n");
    for u in uris {
        out.push_str(&format!(
            "_{name} uri {priority} {weight} \"{target}\"\n",
            name = u.name,
            priority = u.priority,
            weight = u.weight,
            target = u.target,
        ));
    }
    out
}

/// Terminal/non-terminal state of a queued subdomain creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitState {
    Pending,
    Committed { txid: String },
    AlreadyExisted,
    Failed { reason: String },
}

impl CommitState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommitState::Pending)
    }
}

/// One row of a parent domain's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub received_at: i64,
    pub subdomain_name: String,
    pub payload: Subdomain,
    pub commit_state: CommitState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_names() {
        assert!(is_valid_subdomain_name("alice"));
        assert!(is_valid_subdomain_name("bob-2"));
        assert!(!is_valid_subdomain_name("ab"));
        assert!(!is_valid_subdomain_name("Has-Upper"));
    }

    #[test]
    fn builds_zonefile_from_uris() {
        let uris = vec![UriRecord {
            name: "https".into(),
            priority: 10,
            weight: 1,
            target: "https://example.com".into(),
        }];
        let zf = build_zonefile_from_uris("alice", &uris);
        assert!(zf.starts_with("$origin alice\n$ttl 3600\n"));
        assert!(zf.contains("https://example.com"));
    }

    #[test]
    fn rejects_missing_zonefile_source() {
        let req = RegisterRequest {
            subdomain: "alice".into(),
            data_pubkey: "pubkey:data:00".into(),
            uris: None,
            zonefile_str: None,
        };
        assert_eq!(parse_register_request(&req), Err(RequestError::MissingZonefile));
    }

    #[test]
    fn register_request_round_trips_through_json() {
        let req = RegisterRequest {
            subdomain: "alice".into(),
            data_pubkey: "pubkey:data:00ff".into(),
            uris: Some(vec![UriRecord {
                name: "https".into(),
                priority: 10,
                weight: 1,
                target: "https://example.com".into(),
            }]),
            zonefile_str: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: RegisterRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.subdomain, back.subdomain);
        assert_eq!(req.data_pubkey, back.data_pubkey);
        assert_eq!(req.uris.as_ref().unwrap().len(), back.uris.as_ref().unwrap().len());
        assert_eq!(req.uris.unwrap()[0].target, back.uris.unwrap()[0].target);
    }

    #[test]
    fn subdomain_round_trips_through_json() {
        let sub = Subdomain {
            name: "alice".into(),
            owner_pubkey: "pubkey:data:00ff".into(),
            sequence_number: 0,
            zonefile_text: "$origin alice\n$ttl 3600\n".into(),
        };
        let json = serde_json::to_string(&sub).unwrap();
        let back: Subdomain = serde_json::from_str(&json).unwrap();
        assert_eq!(sub, back);
    }
}
