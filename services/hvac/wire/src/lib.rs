//! Wire protocol for UDP air-conditioner controllers.
//!
//! This crate covers everything that touches bytes: the JSON datagram
//! envelope, pack encryption, property descriptors and the bit-packed binary
//! status frame used by the binary protocol variant. It performs no I/O.
//!
//! ## Features
//!
//! - **Envelope**: outer JSON object with encrypted `pack` payloads
//! - **Cipher**: AES-128-ECB + PKCS#7 + base64 with factory and session keys
//! - **Properties**: typed, validated values for every controllable setting
//! - **Binary frames**: one layout table shared by decoding and editing
//!
//! ## Datagram Format
//!
//! ```text
//! {"cid":"app","i":0,"t":"pack","uid":0,"tcid":"<controller>","pack":"<base64>"}
//!                                                                      |
//!                             AES-128-ECB(key, PKCS#7(JSON pack)) -----+
//! ```
//!
//! | request  | response  |
//! |----------|-----------|
//! | `scan`   | `dev`     |
//! | `bind`   | `bindok`  |
//! | `subDev` | `subList` |
//! | `status` | `dat`     |
//! | `cmd`    | `res`     |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cipher;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod property;

// Re-export main types
pub use cipher::{decrypt, encrypt, open_pack, seal_pack, CipherKey, DEFAULT_KEY};
pub use codec::{decode_target, encode_target, BinaryStatus, FanMode, FrameEditor, ModeChange};
pub use envelope::{
    Announcement, Envelope, Pack, Request, StatusPayload, SubDeviceEntry, APP_CID, SCAN_REQUEST,
};
pub use error::WireError;
pub use frame::{
    checksum, endpoint_frame, format_minutes, parse_minutes, Field, Slot, StatusFrame,
    FRAME_TYPE_COMMAND, FRAME_TYPE_STATUS, STATUS_FRAME_LEN,
};
pub use property::{
    AirValve, FanSpeed, Mode, Property, PropertyValue, QuietMode, Switch, SwingHorizontal,
    SwingVertical, Temperature, TemperatureUnit, CELSIUS_RANGE, FAHRENHEIT_RANGE,
};
