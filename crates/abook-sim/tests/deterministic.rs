use abook_config::AbookConfig;
use abook_core::{CommandKind, CommandState, CommandStatus};
use abook_sim::{Op, Sim};

fn reliable() -> AbookConfig {
    AbookConfig {
        collection: "sim".to_string(),
        ..AbookConfig::default()
    }
}

fn outcome(sim: &Sim) -> Vec<(u64, String, CommandStatus)> {
    sim.results()
        .iter()
        .map(|r| (r.command_id.0, r.kind.to_string(), r.status))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_reliable_runs_are_clean() {
    for seed in [1, 2, 3] {
        let mut sim = Sim::new(seed, &reliable()).await;
        let violations = sim.run(80).await.to_vec();
        assert!(violations.is_empty(), "seed {seed}: {violations:#?}");
        let report = sim.report();
        assert!(report.successful > 0, "seed {seed}: {report:?}");
        assert_eq!(report.failed, 0, "no faults, no quota pressure");
        assert_eq!(report.injected_failures, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_same_seed_same_outcome() {
    let mut first = Sim::new(42, &reliable()).await;
    first.run(60).await;
    let mut second = Sim::new(42, &reliable()).await;
    second.run(60).await;

    assert_eq!(outcome(&first), outcome(&second));
    assert_eq!(first.report().prompts, second.report().prompts);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_add_never_reaches_remote() {
    let mut sim = Sim::new(5, &reliable()).await;
    let before = sim.report().quota_remaining;

    let mut pending = None;
    for _ in 0..10 {
        assert!(sim.step_with(Op::Add).await.is_empty());
        pending = sim
            .service()
            .in_flight()
            .into_iter()
            .find(|id| sim.service().state(*id) == Some(CommandState::GracePeriod));
        if pending.is_some() {
            break;
        }
    }
    let command = pending.expect("an add reached its grace period");
    assert!(sim.step_with(Op::Cancel { command }).await.is_empty());
    sim.settle().await;

    assert!(sim.violations().is_empty(), "{:#?}", sim.violations());
    assert!(!sim.path(command).contains(&CommandState::RequestingRemoteChange));
    assert_eq!(sim.path(command).last(), Some(&CommandState::Cancelled));
    assert!(sim
        .service()
        .book()
        .backing_persons()
        .iter()
        .all(|p| !p.id.is_provisional()));
    assert!(sim.report().quota_remaining <= before);
}

#[tokio::test(start_paused = true)]
async fn test_override_with_delete_spawns_delete() {
    let mut sim = Sim::new(11, &reliable()).await;
    let target = sim.service().book().backing_persons()[0].id.clone();
    sim.step_with(Op::Edit {
        target: target.clone(),
    })
    .await;
    let Some(command) = sim.service().in_flight().first().copied() else {
        // The prompt was dismissed; nothing to override.
        return;
    };
    assert_eq!(sim.service().state(command), Some(CommandState::GracePeriod));
    sim.step_with(Op::OverrideDelete { command }).await;
    sim.settle().await;

    assert!(sim.violations().is_empty(), "{:#?}", sim.violations());
    assert!(!sim.service().book().contains(&target));
    let delete = sim
        .results()
        .iter()
        .find(|r| r.kind == CommandKind::Delete)
        .expect("override spawned a delete");
    assert_eq!(delete.status, CommandStatus::Successful);
}
