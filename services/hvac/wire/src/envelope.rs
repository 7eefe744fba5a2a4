//! JSON datagram envelope and the packs it carries.
//!
//! Every datagram except the discovery probe is an [`Envelope`] whose `pack`
//! field holds an encrypted JSON document. Inbound packs are parsed into
//! [`Pack`]; outbound ones are built from [`Request`].

use crate::cipher::{open_pack, seal_pack, CipherKey};
use crate::error::WireError;
use crate::frame::StatusFrame;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Discovery probe, sent unencrypted
pub const SCAN_REQUEST: &[u8] = br#"{"t":"scan"}"#;

/// Client id stamped on every outbound envelope
pub const APP_CID: &str = "app";

/// Envelope type of encrypted packs
pub const PACK_TYPE: &str = "pack";

/// Outer JSON object of a datagram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender client id
    #[serde(default)]
    pub cid: String,
    /// 1 on bind requests, 0 otherwise
    #[serde(default)]
    pub i: u8,
    /// Envelope type, `pack` for all encrypted traffic
    pub t: String,
    /// Controller user id
    #[serde(default)]
    pub uid: u64,
    /// Encrypted pack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack: Option<String>,
    /// Target client id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcid: Option<String>,
}

impl Envelope {
    /// Parse a received datagram
    pub fn parse(datagram: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(datagram)
            .map_err(|e| WireError::MalformedFrame(format!("envelope: {e}")))
    }

    /// Seal a request for a controller identified by `tcid`/`uid`
    pub fn seal(request: &Request, key: &CipherKey, tcid: &str, uid: u64) -> Self {
        Self {
            cid: APP_CID.to_string(),
            i: u8::from(matches!(request, Request::Bind { .. })),
            t: PACK_TYPE.to_string(),
            uid,
            pack: Some(seal_pack(&request.to_pack(), key)),
            tcid: Some(tcid.to_string()),
        }
    }

    /// Serialize for sending
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(|e| WireError::MalformedFrame(format!("envelope: {e}")))
    }

    /// Decrypt and parse the carried pack
    pub fn open(&self, key: &CipherKey) -> Result<Pack, WireError> {
        if !self.t.eq_ignore_ascii_case(PACK_TYPE) {
            return Err(WireError::UnknownMessageType(self.t.clone()));
        }
        let sealed = self
            .pack
            .as_deref()
            .ok_or_else(|| WireError::MalformedFrame("envelope without pack".to_string()))?;
        Pack::from_value(open_pack(sealed, key)?)
    }
}

/// Controller identity from a discovery response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Announcement {
    /// Controller MAC
    pub mac: String,
    /// Friendly name
    #[serde(default)]
    pub name: String,
    /// Number of sub-devices behind the controller
    #[serde(default, rename = "subCnt")]
    pub sub_count: u32,
}

/// One entry of a sub-device page
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubDeviceEntry {
    /// Sub-device MAC
    pub mac: String,
    /// Friendly name
    #[serde(default)]
    pub name: String,
}

/// Property values carried by a status report or acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusPayload {
    /// `code -> raw` columns
    Columns(Vec<(String, i64)>),
    /// Binary status frame
    Binary(StatusFrame),
}

/// Decrypted inbound pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pack {
    /// Discovery response
    Dev(Announcement),
    /// Bind confirmation with the session key
    BindOk {
        /// Controller MAC
        mac: String,
        /// Session key
        key: String,
    },
    /// One page of sub-devices
    SubList {
        /// Page index
        page: u32,
        /// Devices on this page
        devices: Vec<SubDeviceEntry>,
    },
    /// Status report
    Dat {
        /// Reporting device
        mac: String,
        /// Values
        payload: StatusPayload,
    },
    /// Command acknowledgment
    Res {
        /// Acknowledging device
        mac: String,
        /// Acknowledged values
        payload: StatusPayload,
    },
}

#[derive(Deserialize)]
struct BindOkPack {
    #[serde(default)]
    mac: String,
    key: String,
}

#[derive(Deserialize)]
struct SubListPack {
    #[serde(default)]
    i: u32,
    #[serde(default)]
    list: Vec<SubDeviceEntry>,
}

#[derive(Deserialize)]
struct StatusPack {
    mac: String,
    #[serde(default)]
    cols: Vec<String>,
    #[serde(default)]
    dat: Vec<Value>,
    #[serde(default)]
    opt: Vec<String>,
    #[serde(default)]
    val: Option<Vec<Value>>,
    #[serde(default)]
    p: Option<Vec<Value>>,
    #[serde(default)]
    bin: Option<String>,
}

impl StatusPack {
    fn into_payload(self) -> Result<(String, StatusPayload), WireError> {
        if let Some(bin) = self.bin {
            return Ok((self.mac, StatusPayload::Binary(StatusFrame::from_hex(&bin)?)));
        }
        // status reports use cols/dat, acknowledgments opt with val or p
        let (codes, values) = if self.cols.is_empty() {
            (self.opt, self.val.or(self.p).unwrap_or_default())
        } else {
            (self.cols, self.dat)
        };
        if codes.len() != values.len() {
            return Err(WireError::MalformedFrame(format!(
                "{} columns but {} values",
                codes.len(),
                values.len()
            )));
        }
        let columns = codes
            .into_iter()
            .zip(values)
            .filter_map(|(code, value)| match raw_value(&value) {
                Some(raw) => Some((code, raw)),
                None => {
                    debug!("Skipping non-integer value {} for {}", value, code);
                    None
                }
            })
            .collect();
        Ok((self.mac, StatusPayload::Columns(columns)))
    }
}

fn raw_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn field<T: serde::de::DeserializeOwned>(kind: &str, value: Value) -> Result<T, WireError> {
    serde_json::from_value(value).map_err(|e| WireError::MalformedFrame(format!("{kind}: {e}")))
}

impl Pack {
    /// Route a decrypted pack by its `t` field; type names are case-insensitive
    pub fn from_value(value: Value) -> Result<Self, WireError> {
        let kind = value
            .get("t")
            .and_then(Value::as_str)
            .ok_or_else(|| WireError::MalformedFrame("pack without type".to_string()))?
            .to_ascii_lowercase();

        match kind.as_str() {
            "dev" => Ok(Pack::Dev(field(&kind, value)?)),
            "bindok" => {
                let pack: BindOkPack = field(&kind, value)?;
                Ok(Pack::BindOk {
                    mac: pack.mac,
                    key: pack.key,
                })
            }
            "sublist" => {
                let pack: SubListPack = field(&kind, value)?;
                Ok(Pack::SubList {
                    page: pack.i,
                    devices: pack.list,
                })
            }
            "dat" => {
                let (mac, payload) = field::<StatusPack>(&kind, value)?.into_payload()?;
                Ok(Pack::Dat { mac, payload })
            }
            "res" => {
                let (mac, payload) = field::<StatusPack>(&kind, value)?.into_payload()?;
                Ok(Pack::Res { mac, payload })
            }
            _ => Err(WireError::UnknownMessageType(kind)),
        }
    }

    /// Message type name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Pack::Dev(_) => "dev",
            Pack::BindOk { .. } => "bindok",
            Pack::SubList { .. } => "subList",
            Pack::Dat { .. } => "dat",
            Pack::Res { .. } => "res",
        }
    }
}

/// Outbound request pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Bind to a discovered controller
    Bind {
        /// Controller MAC
        mac: String,
    },
    /// Ask for one page of sub-devices
    SubDevices {
        /// Controller MAC
        mac: String,
        /// Page index
        page: u32,
    },
    /// Poll the listed columns of a device
    Status {
        /// Device MAC
        mac: String,
        /// Column codes
        cols: Vec<&'static str>,
    },
    /// Poll a binary-variant device with the query frame
    BinaryStatus {
        /// Device MAC
        mac: String,
    },
    /// Set properties through columns
    Command {
        /// Column codes
        opt: Vec<&'static str>,
        /// Raw values, parallel to `opt`
        p: Vec<i64>,
        /// Sub-device MAC when the target sits behind a controller
        sub: Option<String>,
    },
    /// Replace the whole state with a binary frame
    BinaryCommand {
        /// Device MAC
        mac: String,
        /// Command frame
        frame: StatusFrame,
    },
}

impl Request {
    /// Message type name
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Bind { .. } => "bind",
            Request::SubDevices { .. } => "subDev",
            Request::Status { .. } | Request::BinaryStatus { .. } => "status",
            Request::Command { .. } | Request::BinaryCommand { .. } => "cmd",
        }
    }

    /// Plain JSON pack
    pub fn to_pack(&self) -> Value {
        match self {
            Request::Bind { mac } => json!({"mac": mac, "t": "bind", "uid": 0}),
            Request::SubDevices { mac, page } => json!({"mac": mac, "i": page, "t": "subDev"}),
            Request::Status { mac, cols } => json!({"cols": cols, "mac": mac, "t": "status"}),
            Request::BinaryStatus { mac } => {
                json!({"mac": mac, "bin": StatusFrame::query().to_hex(), "t": "status"})
            }
            Request::Command { opt, p, sub } => {
                let mut pack = json!({"opt": opt, "p": p, "t": "cmd"});
                if let Some(sub) = sub {
                    pack["sub"] = json!(sub);
                }
                pack
            }
            Request::BinaryCommand { mac, frame } => {
                json!({"mac": mac, "bin": frame.to_hex(), "t": "cmd"})
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::DEFAULT_KEY;

    fn inbound(pack: Value, key: &CipherKey) -> Vec<u8> {
        let envelope = Envelope {
            cid: "f4911e000000".to_string(),
            i: 0,
            t: "pack".to_string(),
            uid: 0,
            pack: Some(seal_pack(&pack, key)),
            tcid: Some("app".to_string()),
        };
        envelope.to_bytes().unwrap()
    }

    fn open(pack: Value) -> Result<Pack, WireError> {
        Envelope::parse(&inbound(pack, &DEFAULT_KEY))?.open(&DEFAULT_KEY)
    }

    #[test]
    fn test_dev_announcement() {
        let pack = open(json!({"t": "dev", "mac": "f4911e000000", "name": "hall", "subCnt": 2}))
            .unwrap();
        assert_eq!(
            pack,
            Pack::Dev(Announcement {
                mac: "f4911e000000".to_string(),
                name: "hall".to_string(),
                sub_count: 2,
            })
        );
    }

    #[test]
    fn test_bindok_is_case_insensitive() {
        let pack = open(json!({"t": "BindOk", "mac": "f4911e000000", "key": "0123456789abcdef"}))
            .unwrap();
        assert_eq!(pack.kind(), "bindok");
    }

    #[test]
    fn test_status_columns() {
        let pack = open(json!({
            "t": "dat",
            "mac": "f4911e000000",
            "cols": ["Pow", "SetTem", "Lig"],
            "dat": [1, "24", null],
        }))
        .unwrap();
        assert_eq!(
            pack,
            Pack::Dat {
                mac: "f4911e000000".to_string(),
                payload: StatusPayload::Columns(vec![
                    ("Pow".to_string(), 1),
                    ("SetTem".to_string(), 24)
                ]),
            }
        );
    }

    #[test]
    fn test_res_values() {
        let Pack::Res { payload, .. } =
            open(json!({"t": "res", "mac": "m", "r": 200, "opt": ["Tur"], "p": [1], "val": [1]}))
                .unwrap()
        else {
            panic!("expected res");
        };
        assert_eq!(payload, StatusPayload::Columns(vec![("Tur".to_string(), 1)]));

        assert!(matches!(
            open(json!({"t": "res", "mac": "m", "opt": ["Tur", "Pow"], "val": [1]})),
            Err(WireError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_binary_status() {
        let frame = StatusFrame::query();
        let pack = open(json!({"t": "dat", "mac": "m", "bin": frame.to_hex()})).unwrap();
        assert_eq!(
            pack,
            Pack::Dat {
                mac: "m".to_string(),
                payload: StatusPayload::Binary(frame),
            }
        );
    }

    #[test]
    fn test_unknown_type_is_not_a_decryption_failure() {
        assert_eq!(
            open(json!({"t": "wlan", "mac": "m"})),
            Err(WireError::UnknownMessageType("wlan".to_string()))
        );
        let wrong_key = CipherKey::parse("0123456789abcdef").unwrap();
        let datagram = inbound(json!({"t": "dev", "mac": "m"}), &wrong_key);
        assert!(matches!(
            Envelope::parse(&datagram).unwrap().open(&DEFAULT_KEY),
            Err(WireError::DecryptionFailure(_))
        ));
    }

    #[test]
    fn test_outbound_envelope() {
        let request = Request::Bind {
            mac: "f4911e000000".to_string(),
        };
        let envelope = Envelope::seal(&request, &DEFAULT_KEY, "f4911e000000", 0);
        assert_eq!(envelope.i, 1);
        assert_eq!(envelope.cid, "app");
        assert_eq!(envelope.tcid.as_deref(), Some("f4911e000000"));

        let bytes = envelope.to_bytes().unwrap();
        let parsed = Envelope::parse(&bytes).unwrap();
        let plain = open_pack(parsed.pack.as_deref().unwrap(), &DEFAULT_KEY).unwrap();
        assert_eq!(plain, json!({"mac": "f4911e000000", "t": "bind", "uid": 0}));

        let status = Envelope::seal(
            &Request::Status {
                mac: "m".to_string(),
                cols: vec!["Pow"],
            },
            &DEFAULT_KEY,
            "f4911e000000",
            0,
        );
        assert_eq!(status.i, 0);
    }

    #[test]
    fn test_binary_status_request() {
        let request = Request::BinaryStatus {
            mac: "m".to_string(),
        };
        assert_eq!(request.kind(), "status");
        assert_eq!(
            request.to_pack()["bin"],
            json!("aaaa12a00a0a00000000000000000000000000001a")
        );
    }

    #[test]
    fn test_command_pack() {
        let request = Request::Command {
            opt: vec!["SetTem", "TemUn"],
            p: vec![24, 0],
            sub: Some("a0b1c2d3e4f5".to_string()),
        };
        assert_eq!(request.kind(), "cmd");
        assert_eq!(
            request.to_pack(),
            json!({"opt": ["SetTem", "TemUn"], "p": [24, 0], "t": "cmd", "sub": "a0b1c2d3e4f5"})
        );
        let plain = Request::Command {
            opt: vec!["Pow"],
            p: vec![1],
            sub: None,
        };
        assert!(plain.to_pack().get("sub").is_none());
    }
}
