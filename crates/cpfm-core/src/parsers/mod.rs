//! Parsers for stored telemetry payloads

pub mod payload;
pub mod php_serialize;

pub use payload::{
    decode_extra_details, decode_payload, decode_server_info, extra_details_from_map,
    server_info_from_map, PayloadMap, PayloadStatus,
};
pub use php_serialize::unserialize;
