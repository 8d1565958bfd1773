pub mod chain;
pub mod metadata;
pub mod yields;

pub use chain::{ChainSnapshot, NetUid, RawSubnet, RawValidator};
pub use metadata::{
    default_subnet_name, default_subnet_symbol, default_validator_name, MetadataSnapshot,
    SubnetOverride, ValidatorIdentity,
};
pub use yields::{EnrichedSubnet, EnrichedValidator};
