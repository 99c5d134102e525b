//! The standard seed: one galaxy, four of its stars and one planet.

use super::{SeedScript, SeedStep};
use crate::{
    actors::ActorRole,
    plan::{Arg, ECLIPTIC, Operation},
};

/// The seeded galaxy.
pub const GALAXY: u32 = 0;
/// Stars spawned under [`GALAXY`].
pub const STARS: [u32; 4] = [0x100, 0x200, 0x300, 0x400];
/// Stars that get networking keys.
pub const STARS_WITH_KEYS: [u32; 2] = [0x100, 0x200];
/// Planet spawned under star 256.
pub const PLANET: u32 = 0x1_0100;
/// Crypto suite version of the seeded keys.
pub const KEY_REVISION_SUITE: u32 = 1;

pub fn create_galaxy(controller: &str, galaxy: u32, owner: Arg) -> SeedStep {
    SeedStep::new(
        format!("create galaxy {galaxy}"),
        controller,
        Operation::transact("createGalaxy(uint32,address)"),
        vec![Arg::uint(galaxy.into()), owner],
    )
}

pub fn spawn(controller: &str, point: u32, owner: Arg) -> SeedStep {
    SeedStep::new(
        format!("spawn {point}"),
        controller,
        Operation::transact("spawn(uint32,address)"),
        vec![Arg::uint(point.into()), owner],
    )
}

/// Set placeholder networking keys on `point`, without a breach.
pub fn configure_keys(controller: &str, point: u32) -> SeedStep {
    SeedStep::new(
        format!("configure keys of {point}"),
        controller,
        Operation::transact("configureKeys(uint32,bytes32,bytes32,uint32,bool)"),
        vec![
            Arg::uint(point.into()),
            Arg::bytes32(1),
            Arg::bytes32(2),
            Arg::uint(KEY_REVISION_SUITE.into()),
            Arg::bool(false),
        ],
    )
}

/// Seed steps, all sent by the creator through the controller.
///
/// Keys are configured on a point before anything below it is spawned.
pub fn standard_seed_script() -> SeedScript {
    let creator = || Arg::Actor(ActorRole::Creator);

    std::iter::once(create_galaxy(ECLIPTIC, GALAXY, creator()))
        .chain(std::iter::once(configure_keys(ECLIPTIC, GALAXY)))
        .chain(STARS.iter().map(|star| spawn(ECLIPTIC, *star, creator())))
        .chain(STARS_WITH_KEYS.iter().map(|star| configure_keys(ECLIPTIC, *star)))
        .chain(std::iter::once(spawn(ECLIPTIC, PLANET, creator())))
        .collect()
}
