//! Entity definitions loaded by the pipeline
//!
//! Each module declares one or more [`Entity`] implementations as unit
//! structs with `const` field tables. [`default_registry`] collects them in
//! load order.

pub mod beneficiary;
pub mod claim;
pub mod provider;

use crate::core::partition::{DateInterval, PartitionGroup, PartitionType};
use crate::domain::Result;
use crate::model::{Entity, EntityRegistry};

pub use beneficiary::{Beneficiary, BeneficiaryMbiId, BeneficiaryOvershareMbi, BeneficiaryThirdParty};
pub use claim::{Claim, ClaimDateSignature, ClaimItem, ClaimRx};
pub use provider::ProviderHistory;

/// Destination table of the core beneficiary entity
pub const BENEFICIARY_TABLE: &str = "idr.beneficiary";

/// Destination table of the core claim entity
pub const CLAIM_TABLE: &str = "idr.claim";

pub const PART_D_CLAIM_TYPE_CODES: &[i32] = &[1, 2, 3, 4];
pub const INSTITUTIONAL_CLAIM_TYPE_CODES: &[i32] = &[10, 20, 30, 40, 50, 60, 61, 62, 63, 64];
pub const PROFESSIONAL_CLAIM_TYPE_CODES: &[i32] = &[71, 72, 81, 82];
pub const PAC_CLAIM_TYPE_CODES: &[i32] = &[
    1011, 1012, 1013, 1014, 1018, 1021, 1022, 1023, 1034, 1071, 1072, 1073, 1074, 1075, 1076,
    1077, 1700, 1800, 2700, 2800, 2900,
];

/// Single unbounded group for non-claim entities
pub const NON_CLAIM_PARTITION: PartitionGroup =
    PartitionGroup::new("non_claim", &[], PartitionType::ALL, None, 0);

pub const PART_D_PARTITIONS: &[PartitionGroup] = &[PartitionGroup::new(
    "part_d",
    PART_D_CLAIM_TYPE_CODES,
    PartitionType::PART_D,
    Some(DateInterval::Years(1)),
    2,
)];

pub const ADJUDICATED_PARTITIONS: &[PartitionGroup] = &[
    PartitionGroup::new(
        "institutional",
        INSTITUTIONAL_CLAIM_TYPE_CODES,
        PartitionType::INSTITUTIONAL,
        Some(DateInterval::Years(1)),
        1,
    ),
    PartitionGroup::new(
        "professional",
        PROFESSIONAL_CLAIM_TYPE_CODES,
        PartitionType::PROFESSIONAL,
        Some(DateInterval::Years(1)),
        1,
    ),
    PartitionGroup::new(
        "pac",
        PAC_CLAIM_TYPE_CODES,
        PartitionType::PAC,
        Some(DateInterval::Years(1)),
        0,
    ),
];

/// Every shipped entity, in registration order
pub fn all_entities() -> Vec<&'static dyn Entity> {
    vec![
        &BeneficiaryOvershareMbi as &'static dyn Entity,
        &Beneficiary,
        &BeneficiaryMbiId,
        &BeneficiaryThirdParty,
        &ProviderHistory,
        &Claim,
        &ClaimItem,
        &ClaimDateSignature,
        &ClaimRx,
    ]
}

/// Validated registry of every shipped entity
///
/// # Errors
///
/// Returns an error if any shipped descriptor is inconsistent.
pub fn default_registry() -> Result<EntityRegistry> {
    EntityRegistry::new(all_entities())
}
