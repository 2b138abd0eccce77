mod common;

use std::time::Duration;

use abook_command::CommandIntent;
use abook_core::{CommandId, CommandKind, CommandState, CommandStatus, PersonId, PersonInput};
use tokio::time::{sleep, Instant};

use common::{Harness, BOOK};

#[tokio::test(start_paused = true)]
async fn add_succeeds_after_grace_period() {
    let h = Harness::new(3);
    h.input.push(PersonInput::named("Alex Yeoh").with_phone("87438807"));
    let start = Instant::now();
    let id = h.service.submit(CommandIntent::Add { input: None });

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.service.state(id), Some(CommandState::GracePeriod));
    let visible = h.book.visible_persons();
    assert_eq!(visible.len(), 1);
    let (person, pending) = &visible[0];
    assert!(person.id.is_provisional());
    assert_eq!(pending.as_ref().map(|p| p.kind), Some(CommandKind::Add));
    assert!(h.book.backing(&person.id).is_none());

    let result = h.service.wait_for(id).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert_eq!(result.status, CommandStatus::Successful);
    assert_eq!(result.kind, CommandKind::Add);
    assert_eq!(result.target_type, "Person");
    assert_eq!(result.name_before, None);
    assert_eq!(result.name_after.as_deref(), Some("Alex Yeoh"));

    let confirmed = PersonId::new(result.target_id);
    assert!(!confirmed.is_provisional());
    assert_eq!(h.book.backing(&confirmed).unwrap().name(), "Alex Yeoh");
    assert!(h.book.pending(&confirmed).is_none());
    assert_eq!(h.remote_name(&confirmed).as_deref(), Some("Alex Yeoh"));
    assert!(h.registry.is_empty());
    assert_eq!(
        h.observer.states_of(id),
        vec![
            CommandState::NewlyCreated,
            CommandState::RetrievingInput,
            CommandState::SimulatingResult,
            CommandState::GracePeriod,
            CommandState::CheckingRemoteConflict,
            CommandState::RequestingRemoteChange,
            CommandState::Successful,
        ]
    );
    assert_eq!(h.observer.ticks_of(id), vec![3, 2, 1, 0]);
}

#[tokio::test(start_paused = true)]
async fn override_with_delete_cancels_add_and_deletes_nothing() {
    let h = Harness::new(3);
    let mut feed = h.service.subscribe();
    h.input.push(PersonInput::named("Bernice Yu"));
    let id = h.service.submit(CommandIntent::Add { input: None });

    sleep(Duration::from_secs(1)).await;
    assert!(h.service.override_with_delete(id));

    let result = h.service.wait_for(id).await.unwrap();
    assert_eq!(result.status, CommandStatus::Cancelled);
    assert_eq!(result.via, None);
    h.service.wait_idle().await;

    let first = feed.recv().await.unwrap();
    let second = feed.recv().await.unwrap();
    assert_eq!(first.command_id, id);
    assert_eq!(second.kind, CommandKind::Delete);
    assert_eq!(second.status, CommandStatus::Cancelled);

    assert!(h.book.is_empty());
    assert_eq!(h.remote.store().live_count(BOOK), 0);
    assert!(h.alerts.alerts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn override_with_delete_on_edit_deletes_person() {
    let h = Harness::new(3);
    let person = h.seed_person("David Li");
    let id = h.service.submit(CommandIntent::Edit {
        target: person.clone(),
        input: Some(PersonInput::named("David Lee")),
    });

    sleep(Duration::from_secs(1)).await;
    assert!(h.service.override_with_delete(id));
    assert!(!h.service.override_with_delete(id), "the pause takes one signal");
    h.service.wait_idle().await;

    assert_eq!(h.service.wait_for(id).await.unwrap().status, CommandStatus::Cancelled);
    let delete = h.service.wait_for(CommandId(id.0 + 1)).await.unwrap();
    assert_eq!(delete.kind, CommandKind::Delete);
    assert_eq!(delete.status, CommandStatus::Successful);
    assert!(!h.book.contains(&person));
    assert_eq!(h.remote_name(&person), None);
}

#[tokio::test(start_paused = true)]
async fn failed_request_is_alerted_and_retryable_once() {
    let h = Harness::new(3);
    let person = h.seed_person("Charlotte");
    h.observer.fail_remote_requests(h.remote.clone());

    let id = h.service.submit(CommandIntent::Edit {
        target: person.clone(),
        input: Some(PersonInput::named("Charlotte Oliveiro")),
    });
    let result = h.service.wait_for(id).await.unwrap();
    assert_eq!(result.status, CommandStatus::Failed);
    assert_eq!(result.via, Some(CommandState::RequestFailed));
    assert_eq!(result.name_before.as_deref(), Some("Charlotte"));
    assert_eq!(h.service.state(id), Some(CommandState::Cancelled));

    let alerts = h.alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].command_id, id);
    assert_eq!(h.book.backing(&person).unwrap().name(), "Charlotte");
    assert_eq!(h.book.visible(&person).unwrap().name(), "Charlotte");
    assert!(h.book.pending(&person).is_none());
    assert_eq!(h.remote_name(&person).as_deref(), Some("Charlotte"));

    h.observer.stop_failing();
    let retry = h.service.retry(id).expect("failed request is retryable");
    assert_eq!(h.service.retry(id), None);
    let retried = h.service.wait_for(retry).await.unwrap();
    assert_eq!(retried.status, CommandStatus::Successful);
    assert_eq!(h.book.backing(&person).unwrap().name(), "Charlotte Oliveiro");
    assert_eq!(h.remote_name(&person).as_deref(), Some("Charlotte Oliveiro"));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_grace_never_reaches_remote() {
    let h = Harness::new(3);
    let person = h.seed_person("Irfan Ibrahim");
    let quota_before = h.remote.store().quota_status().remaining;

    let id = h.service.submit(CommandIntent::Edit {
        target: person.clone(),
        input: Some(PersonInput::named("Irfan")),
    });
    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.book.visible(&person).unwrap().name(), "Irfan");
    assert!(h.service.cancel(id));

    let result = h.service.wait_for(id).await.unwrap();
    assert_eq!(result.status, CommandStatus::Cancelled);
    assert!(!h
        .observer
        .states_of(id)
        .contains(&CommandState::RequestingRemoteChange));
    assert_eq!(h.book.visible(&person).unwrap().name(), "Irfan Ibrahim");
    assert_eq!(h.remote_name(&person).as_deref(), Some("Irfan Ibrahim"));
    assert_eq!(h.remote.store().quota_status().remaining, quota_before);
    assert!(!h.service.cancel(id), "finished commands ignore cancel");
}

#[tokio::test(start_paused = true)]
async fn override_with_edit_restarts_countdown() {
    let h = Harness::new(3);
    h.input.push(PersonInput::named("Roy"));
    let start = Instant::now();
    let id = h.service.submit(CommandIntent::Add { input: None });

    sleep(Duration::from_secs(1)).await;
    assert!(h.service.override_with_edit(id, PersonInput::named("")).is_err());
    assert_eq!(h.service.state(id), Some(CommandState::GracePeriod));
    assert_eq!(
        h.service
            .override_with_edit(id, PersonInput::named("Roy Balakrishnan"))
            .unwrap(),
        true
    );

    let result = h.service.wait_for(id).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(4));
    assert_eq!(result.status, CommandStatus::Successful);
    assert_eq!(result.name_after.as_deref(), Some("Roy Balakrishnan"));
    let confirmed = PersonId::new(result.target_id);
    assert_eq!(h.remote_name(&confirmed).as_deref(), Some("Roy Balakrishnan"));
    assert!(h.observer.ticks_of(id).iter().filter(|&&r| r == 3).count() >= 2);
}

#[tokio::test(start_paused = true)]
async fn overriding_a_delete_with_edit_is_ignored() {
    let h = Harness::new(3);
    let person = h.seed_person("Alex");
    let id = h.service.submit(CommandIntent::Delete { target: person });
    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.service.override_with_edit(id, PersonInput::named("Bo")), Ok(false));
    assert!(!h.service.override_with_delete(id));
    assert_eq!(
        h.service.wait_for(id).await.unwrap().status,
        CommandStatus::Successful
    );
}

#[tokio::test(start_paused = true)]
async fn remote_change_during_grace_is_a_conflict() {
    let h = Harness::new(3);
    let person = h.seed_person("Bernice");
    let id = h.service.submit(CommandIntent::Edit {
        target: person.clone(),
        input: Some(PersonInput::named("Bernice Yu")),
    });

    sleep(Duration::from_secs(1)).await;
    let remote_id = person.remote_id().unwrap();
    h.remote
        .store()
        .update_person(BOOK, remote_id, &abook_core::PersonData::named("Bernie"))
        .unwrap();

    let result = h.service.wait_for(id).await.unwrap();
    assert_eq!(result.status, CommandStatus::Failed);
    assert_eq!(result.via, Some(CommandState::ConflictFound));
    assert_eq!(h.alerts.alerts().len(), 1);
    assert_eq!(h.alerts.alerts()[0].title, "Conflict");
    assert_eq!(h.remote_name(&person).as_deref(), Some("Bernie"));
    assert_eq!(h.book.visible(&person).unwrap().name(), "Bernice");
    assert_eq!(h.service.retry(id), None, "conflicts are not retried");
}

#[tokio::test(start_paused = true)]
async fn remote_delete_during_grace_is_a_conflict() {
    let h = Harness::new(2);
    let person = h.seed_person("Charlotte");
    let id = h.service.submit(CommandIntent::Delete {
        target: person.clone(),
    });
    sleep(Duration::from_secs(1)).await;
    h.remote
        .store()
        .delete_person(BOOK, person.remote_id().unwrap())
        .unwrap();

    let result = h.service.wait_for(id).await.unwrap();
    assert_eq!(result.via, Some(CommandState::ConflictFound));
    assert!(h.book.visible(&person).is_some());
}

#[tokio::test(start_paused = true)]
async fn invalid_input_prompts_again() {
    let h = Harness::new(1);
    h.input.push(PersonInput::named("   "));
    h.input.push(PersonInput::named("David").with_email("not-an-email"));
    h.input.push(PersonInput::named("David").with_email("david@example.com"));
    let id = h.service.submit(CommandIntent::Add { input: None });

    let result = h.service.wait_for(id).await.unwrap();
    assert_eq!(result.status, CommandStatus::Successful);

    let prompts = h.input.prompts();
    assert_eq!(prompts.len(), 3);
    assert_eq!(prompts[0].error, None);
    assert!(prompts[1].error.is_some());
    assert!(prompts[2].error.is_some());
    assert_eq!(
        prompts[2].initial.as_ref().map(|i| i.name.as_str()),
        Some("David")
    );
}

#[tokio::test(start_paused = true)]
async fn supplied_invalid_input_falls_back_to_prompt() {
    let h = Harness::new(1);
    h.input.push(PersonInput::named("Alex"));
    let id = h.service.submit(CommandIntent::Add {
        input: Some(PersonInput::named("")),
    });
    assert_eq!(
        h.service.wait_for(id).await.unwrap().status,
        CommandStatus::Successful
    );
    assert_eq!(h.input.prompts().len(), 1);
    assert!(h.input.prompts()[0].error.is_some());
}

#[tokio::test(start_paused = true)]
async fn dismissed_prompt_cancels_silently() {
    let h = Harness::new(3);
    h.input.push_dismiss();
    let id = h.service.submit(CommandIntent::Add { input: None });
    let result = h.service.wait_for(id).await.unwrap();
    assert_eq!(result.status, CommandStatus::Cancelled);
    assert!(h.alerts.alerts().is_empty());
    assert!(h.book.is_empty());
    assert!(h.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn edit_of_unknown_person_is_cancelled() {
    let h = Harness::new(3);
    let id = h.service.submit(CommandIntent::Edit {
        target: PersonId::from_remote(404),
        input: Some(PersonInput::named("Nobody")),
    });
    let result = h.service.wait_for(id).await.unwrap();
    assert_eq!(result.status, CommandStatus::Cancelled);
    assert!(result.detail.unwrap().contains("no longer exists"));
    assert!(h.input.prompts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn edit_prompt_is_prefilled() {
    let h = Harness::new(1);
    let person = h.seed_person("Alex Yeoh");
    h.input.push(PersonInput::named("Alex Y"));
    let id = h.service.submit(CommandIntent::Edit {
        target: person,
        input: None,
    });
    h.service.wait_for(id).await.unwrap();
    let prompts = h.input.prompts();
    assert_eq!(
        prompts[0].initial.as_ref().map(|i| i.name.as_str()),
        Some("Alex Yeoh")
    );
}

#[tokio::test(start_paused = true)]
async fn new_tags_are_created_before_the_person() {
    let h = Harness::new(1);
    let id = h.service.submit(CommandIntent::Add {
        input: Some(PersonInput::named("Irfan").with_tag("colleagues")),
    });
    let result = h.service.wait_for(id).await.unwrap();
    assert_eq!(result.status, CommandStatus::Successful);
    assert!(h.book.known_tags().contains("colleagues"));
    let person = PersonId::new(result.target_id);
    assert!(h
        .book
        .backing(&person)
        .unwrap()
        .data
        .tags
        .contains("colleagues"));
}

#[tokio::test(start_paused = true)]
async fn successful_commands_save_the_book() {
    let h = Harness::new(1);
    let id = h.service.submit(CommandIntent::Add {
        input: Some(PersonInput::named("Alex")),
    });
    h.service.wait_for(id).await.unwrap();
    assert_eq!(h.storage.save_count(), 1);

    h.input.push_dismiss();
    let cancelled = h.service.submit(CommandIntent::Add { input: None });
    h.service.wait_for(cancelled).await.unwrap();
    assert_eq!(h.storage.save_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn published_failure_can_be_retried_at_once() {
    let h = Harness::new(0);
    let person = h.seed_person("Bernice Yu");
    h.observer.fail_remote_requests(h.remote.clone());
    let mut results = h.service.subscribe();

    let id = h.service.submit(CommandIntent::Edit {
        target: person.clone(),
        input: Some(PersonInput::named("Bernice Y")),
    });
    let result = results.recv().await.unwrap();
    assert_eq!(result.command_id, id);
    assert_eq!(result.via, Some(CommandState::RequestFailed));
    assert_eq!(h.service.state(id), Some(CommandState::Cancelled));
    assert!(!h.registry.has_ongoing(&person));

    h.observer.stop_failing();
    let retry = h.service.retry(id).expect("failed request is retryable");
    assert_eq!(
        h.service.wait_for(retry).await.unwrap().status,
        CommandStatus::Successful
    );
}

#[tokio::test(start_paused = true)]
async fn finished_commands_are_dropped_unless_retryable() {
    let h = Harness::with_retention(1, 0);
    h.input.push(PersonInput::named("Alex"));
    let add = h.service.submit(CommandIntent::Add { input: None });
    assert_eq!(h.service.tracked(), 1);
    h.service.wait_for(add).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.service.tracked(), 0);
    assert!(h.service.handle(add).is_none());
    assert!(h.service.in_flight().is_empty());

    let person = h.seed_person("Charlotte");
    h.observer.fail_remote_requests(h.remote.clone());
    let edit = h.service.submit(CommandIntent::Edit {
        target: person,
        input: Some(PersonInput::named("Charlotte O")),
    });
    h.service.wait_for(edit).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.service.tracked(), 1, "failed request is kept for retry");

    h.observer.stop_failing();
    let retry = h.service.retry(edit).unwrap();
    h.service.wait_for(retry).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.service.tracked(), 0);
}

#[tokio::test(start_paused = true)]
async fn recent_results_stay_reachable() {
    let h = Harness::with_retention(1, 2);
    let mut ids = Vec::new();
    for name in ["Alex", "Bernice", "Charlotte"] {
        let id = h.service.submit(CommandIntent::Add {
            input: Some(PersonInput::named(name)),
        });
        h.service.wait_for(id).await.unwrap();
        ids.push(id);
    }
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.service.tracked(), 2);
    assert!(h.service.handle(ids[0]).is_none());
    assert_eq!(h.service.state(ids[2]), Some(CommandState::Successful));
}
