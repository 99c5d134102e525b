//! Integration tests for starkup-deploy.
//!
//! Every scenario runs against the in-memory ledger, so no node is needed.
//! Run with: cargo test --test integration_test

use std::collections::HashSet;

use anyhow::Result;
use starkup_deploy::{
    ActorOverrides, ActorRole, Actors, Arg, CallOutput, DeployError, DeploymentPlan,
    DeploymentStep, ExportSink, HandleMap, InMemoryLedger, Operation, Orchestrator, RecordedCall,
    ResourceFactory, ResourceKind, ResourceSpec, RunStage, RunState, SeedScript, WiringAction,
    WiringExecutor,
    plan::{AZIMUTH, CLAIMS, ECLIPTIC, POLLS, STARTOKEN, TREASURY},
    seed::{GALAXY, PLANET, create_galaxy},
    standard_plan, standard_seed_script,
};
use tempdir::TempDir;

/// Test setup: a fresh ledger, its actors and a scratch directory for the export.
struct TestContext {
    ledger: InMemoryLedger,
    actors: Actors,
    temp_dir: TempDir,
}

impl TestContext {
    async fn new() -> Result<Self> {
        init_test_tracing();

        let ledger = InMemoryLedger::new();
        let actors = Actors::from_accounts(&ledger.accounts().await?)?;
        let temp_dir = TempDir::new("starkup-it")?;

        Ok(Self {
            ledger,
            actors,
            temp_dir,
        })
    }

    fn sink(&self) -> ExportSink {
        ExportSink::new(self.temp_dir.path().join(".env"))
    }

    fn executor(&self) -> WiringExecutor<'_, InMemoryLedger> {
        WiringExecutor::new(&self.ledger, &self.actors)
    }

    async fn read(&self, name: &str, handles: &HandleMap, view: &str) -> Result<CallOutput> {
        let handle = handles
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no handle for {name}"))?;
        self.ledger
            .call(handle, self.actors.creator, &Operation::view(view), &[])
            .await
    }
}

/// Initialize tracing for tests (idempotent).
fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

/// Registry, governance, claims and a controller that takes ownership of the
/// first two.
fn authority_plan(with_wiring: bool) -> DeploymentPlan {
    let mut controller = DeploymentStep::new(ResourceSpec::create(
        ECLIPTIC,
        ResourceKind::Controller,
        vec![
            Arg::address(Default::default()),
            Arg::resource(AZIMUTH),
            Arg::resource(POLLS),
            Arg::resource(CLAIMS),
        ],
    ));
    if with_wiring {
        controller = controller
            .wire(WiringAction::transfer_authority(AZIMUTH, ECLIPTIC))
            .wire(WiringAction::transfer_authority(POLLS, ECLIPTIC));
    }

    DeploymentPlan::new([
        DeploymentStep::new(ResourceSpec::create(AZIMUTH, ResourceKind::Registry, vec![])),
        DeploymentStep::new(ResourceSpec::create(
            POLLS,
            ResourceKind::Governance,
            vec![Arg::uint(432_000), Arg::uint(432_000)],
        )),
        DeploymentStep::new(ResourceSpec::create(
            CLAIMS,
            ResourceKind::Claims,
            vec![Arg::resource(AZIMUTH)],
        )),
        controller,
    ])
    .expect("authority plan is valid")
}

fn register_galaxy() -> SeedScript {
    SeedScript::new([create_galaxy(ECLIPTIC, GALAXY, Arg::Actor(ActorRole::Creator))])
}

fn count_creations(calls: &[RecordedCall]) -> usize {
    calls
        .iter()
        .filter(|call| matches!(call, RecordedCall::Create { .. }))
        .count()
}

#[tokio::test]
async fn test_authority_transfer_and_export() -> Result<()> {
    let ctx = TestContext::new().await?;
    let plan = authority_plan(true);

    let result = ctx.executor().deploy_all(&plan).await?;
    let handles = result.handles();
    assert_eq!(handles.len(), 4);

    let controller = result.address_of(ECLIPTIC).expect("controller deployed");
    for owned in [AZIMUTH, POLLS] {
        let owner = ctx.read(owned, handles, "owner()").await?.address()?;
        assert_eq!(owner, controller, "{owned} should be owned by the controller");
    }

    let path = ctx.sink().export(&plan, handles)?;
    let content = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);

    for (line, handle) in lines.iter().zip(handles.iter()) {
        let (key, value) = line.split_once('=').expect("KEY=VALUE line");
        assert_eq!(key, format!("REACT_APP_{}_ADDRESS", handle.name.to_uppercase()));
        assert_eq!(value, handle.address.to_checksum(None));
    }

    Ok(())
}

#[tokio::test]
async fn test_registration_succeeds_after_wiring() -> Result<()> {
    let ctx = TestContext::new().await?;
    let result = ctx.executor().deploy_all(&authority_plan(true)).await?;

    let applied = register_galaxy().seed(&ctx.ledger, &ctx.actors, &result).await?;
    assert_eq!(applied, 1);

    let registry = result.address_of(AZIMUTH).expect("registry deployed");
    assert_eq!(ctx.ledger.point_owner(registry, GALAXY), Some(ctx.actors.creator));

    Ok(())
}

#[tokio::test]
async fn test_registration_without_wiring_fails() -> Result<()> {
    let ctx = TestContext::new().await?;
    let result = ctx.executor().deploy_all(&authority_plan(false)).await?;
    let before = result.clone();

    let err = register_galaxy()
        .seed(&ctx.ledger, &ctx.actors, &result)
        .await
        .unwrap_err();

    match &err {
        DeployError::SeedFailed { index, label, .. } => {
            assert_eq!(*index, 0);
            assert_eq!(label, "create galaxy 0");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.stage(), RunStage::Seeding);
    assert_eq!(result, before);

    let registry = result.address_of(AZIMUTH).expect("registry deployed");
    assert_eq!(ctx.ledger.point_owner(registry, GALAXY), None);

    Ok(())
}

#[tokio::test]
async fn test_reruns_produce_disjoint_addresses() -> Result<()> {
    let ctx = TestContext::new().await?;
    let plan = standard_plan()?;

    let first = ctx.executor().deploy_all(&plan).await?;
    let second = ctx.executor().deploy_all(&plan).await?;

    let first: HashSet<_> = first.handles().iter().map(|h| h.address).collect();
    let second: HashSet<_> = second.handles().iter().map(|h| h.address).collect();
    assert_eq!(first.len(), plan.len());
    assert!(first.is_disjoint(&second));

    Ok(())
}

#[tokio::test]
async fn test_result_covers_every_declared_name() -> Result<()> {
    let ctx = TestContext::new().await?;
    let plan = standard_plan()?;

    let result = ctx.executor().deploy_all(&plan).await?;

    let declared: Vec<&str> = plan.names().collect();
    let deployed: Vec<&str> = result.handles().iter().map(|h| h.name.as_str()).collect();
    assert_eq!(deployed, declared);

    // The token is the one the treasury minted.
    let token = ctx
        .read(TREASURY, result.handles(), "startoken()")
        .await?
        .address()?;
    assert_eq!(result.address_of(STARTOKEN), Some(token));

    Ok(())
}

#[test]
fn test_forward_reference_is_rejected_before_any_call() {
    let err = DeploymentPlan::new([
        ResourceSpec::create(CLAIMS, ResourceKind::Claims, vec![Arg::resource(AZIMUTH)]),
        ResourceSpec::create(AZIMUTH, ResourceKind::Registry, vec![]),
    ])
    .unwrap_err();

    assert!(matches!(&err, DeployError::UnresolvedReference { name, .. } if name == AZIMUTH));
    assert_eq!(err.stage(), RunStage::Planning);
}

#[tokio::test]
async fn test_partial_handles_are_not_exported() -> Result<()> {
    let ctx = TestContext::new().await?;
    let result = ctx.executor().deploy_all(&authority_plan(true)).await?;

    // Export against a larger plan than the one deployed.
    let err = ctx
        .sink()
        .export(&standard_plan()?, result.handles())
        .unwrap_err();

    match err {
        DeployError::IncompleteResult { missing } => {
            assert_eq!(missing, vec![TREASURY, STARTOKEN]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!ctx.temp_dir.path().join(".env").exists());

    Ok(())
}

#[tokio::test]
async fn test_creation_failure_stops_the_run() -> Result<()> {
    let ctx = TestContext::new().await?;
    ctx.ledger.fail_creation(ResourceKind::Governance);

    let err = ctx
        .executor()
        .deploy_all(&standard_plan()?)
        .await
        .unwrap_err();

    assert!(matches!(&err, DeployError::CreationFailed { name, .. } if name == POLLS));
    assert_eq!(err.stage(), RunStage::Deploying);

    // The registry stays live, and nothing after the failed creation was attempted.
    let calls = ctx.ledger.calls();
    assert_eq!(count_creations(&calls), 2);
    assert_eq!(calls.len(), 2);
    assert_eq!(ctx.ledger.contract_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_wiring_failure_reports_step() -> Result<()> {
    let ctx = TestContext::new().await?;
    ctx.ledger.fail_operation("transferOwnership");

    let err = ctx
        .executor()
        .deploy_all(&standard_plan()?)
        .await
        .unwrap_err();

    match &err {
        DeployError::WiringFailed {
            step,
            target,
            operation,
            ..
        } => {
            assert_eq!(step, ECLIPTIC);
            assert_eq!(target, AZIMUTH);
            assert_eq!(operation, "transferOwnership(address)");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.stage(), RunStage::Wiring);

    Ok(())
}

#[tokio::test]
async fn test_full_run() -> Result<()> {
    let ctx = TestContext::new().await?;
    let sink = ctx.sink();
    let mut orchestrator =
        Orchestrator::from_environment(InMemoryLedger::new(), &ActorOverrides::default()).await?;

    let report = orchestrator
        .run(&standard_plan()?, &standard_seed_script(), &sink)
        .await?;

    assert_eq!(orchestrator.state(), &RunState::Active(RunStage::Done));
    assert_eq!(report.artifact, sink.path());
    assert_eq!(report.seeded, standard_seed_script().len());

    let content = std::fs::read_to_string(&report.artifact)?;
    for key in [
        "REACT_APP_AZIMUTH_ADDRESS",
        "REACT_APP_POLLS_ADDRESS",
        "REACT_APP_CLAIMS_ADDRESS",
        "REACT_APP_ECLIPTIC_ADDRESS",
        "REACT_APP_TREASURY_ADDRESS",
        "REACT_APP_STARTOKEN_ADDRESS",
    ] {
        assert!(content.contains(&format!("{key}=0x")), "missing {key}");
    }

    let registry = report.result.address_of(AZIMUTH).expect("registry deployed");
    let creator = orchestrator.actors().creator;
    assert_eq!(orchestrator.factory().point_owner(registry, PLANET), Some(creator));

    Ok(())
}

#[tokio::test]
async fn test_orchestrator_runs_once() -> Result<()> {
    let ctx = TestContext::new().await?;
    let mut orchestrator = Orchestrator::new(ctx.ledger, ctx.actors);
    let plan = standard_plan()?;

    orchestrator
        .run(&plan, &SeedScript::empty(), &ExportSink::new(ctx.temp_dir.path().join("a.env")))
        .await?;

    let err = orchestrator
        .run(&plan, &SeedScript::empty(), &ExportSink::new(ctx.temp_dir.path().join("b.env")))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::RunFinished(RunStage::Done)));
    assert!(!ctx.temp_dir.path().join("b.env").exists());

    Ok(())
}

#[tokio::test]
async fn test_invalid_seed_fails_in_planning() -> Result<()> {
    let ctx = TestContext::new().await?;
    let mut orchestrator = Orchestrator::new(ctx.ledger, ctx.actors);
    let seed = SeedScript::new([create_galaxy("nowhere", GALAXY, Arg::Actor(ActorRole::Creator))]);

    let err = orchestrator
        .run(&standard_plan()?, &seed, &ExportSink::new(ctx.temp_dir.path().join(".env")))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), RunStage::Planning);
    assert!(matches!(
        orchestrator.state(),
        RunState::Failed {
            stage: RunStage::Planning,
            ..
        }
    ));
    assert!(orchestrator.factory().calls().is_empty());

    Ok(())
}
