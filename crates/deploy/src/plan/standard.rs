//! The fixed deployment topology.

use alloy_core::primitives::Address;

use super::{
    Arg, DeploymentPlan, DeploymentStep, Operation, ResourceKind, ResourceSpec, WiringAction,
};
use crate::error::DeployError;

pub const AZIMUTH: &str = "azimuth";
pub const POLLS: &str = "polls";
pub const CLAIMS: &str = "claims";
pub const ECLIPTIC: &str = "ecliptic";
pub const TREASURY: &str = "treasury";
pub const STARTOKEN: &str = "startoken";

/// Upgrade and document poll durations (5 days).
pub const POLL_DURATION_SECS: u64 = 432_000;

/// The standard deployment plan:
/// 1. Registry (`azimuth`)
/// 2. Governance (`polls`)
/// 3. Claims, bound to the registry
/// 4. Controller (`ecliptic`), which then takes ownership of the registry and governance
/// 5. Treasury, bound to the registry
/// 6. Token, minted by the treasury constructor
pub fn standard_plan() -> Result<DeploymentPlan, DeployError> {
    DeploymentPlan::new([
        DeploymentStep::new(ResourceSpec::create(AZIMUTH, ResourceKind::Registry, vec![])),
        DeploymentStep::new(ResourceSpec::create(
            POLLS,
            ResourceKind::Governance,
            vec![Arg::uint(POLL_DURATION_SECS), Arg::uint(POLL_DURATION_SECS)],
        )),
        DeploymentStep::new(ResourceSpec::create(
            CLAIMS,
            ResourceKind::Claims,
            vec![Arg::resource(AZIMUTH)],
        )),
        DeploymentStep::new(ResourceSpec::create(
            ECLIPTIC,
            ResourceKind::Controller,
            vec![
                // No previous controller to upgrade from.
                Arg::address(Address::ZERO),
                Arg::resource(AZIMUTH),
                Arg::resource(POLLS),
                Arg::resource(CLAIMS),
            ],
        ))
        .wire(WiringAction::transfer_authority(AZIMUTH, ECLIPTIC))
        .wire(WiringAction::transfer_authority(POLLS, ECLIPTIC)),
        DeploymentStep::new(ResourceSpec::create(
            TREASURY,
            ResourceKind::Treasury,
            vec![Arg::resource(AZIMUTH)],
        )),
        DeploymentStep::new(ResourceSpec::derived(
            STARTOKEN,
            ResourceKind::Token,
            TREASURY,
            Operation::view("startoken()"),
        )),
    ])
}
