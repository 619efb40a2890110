mod namehash;
pub use namehash::{
    ROOT_LABEL,
    ROOT_NODE,
    fqdn,
    namehash,
    node_id,
    node_id_decimal,
};

pub mod events;

pub mod model;

pub mod primitives;
