mod common;

use std::{collections::HashMap, sync::atomic::Ordering, time::Duration};

use chrono::TimeDelta;
use common::{eventually, Harness, TEAM_A};
use futures::future::join_all;
use sandplane::{
    config::PlaneConfig,
    lifecycle::{CreateSandboxRequest, ResumeSandboxRequest},
    listing::ListQuery,
    models::SandboxState,
    store, utils, SandplaneError,
};

//--------------------------------------------------------------------------------------------------
// Tests: Create
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_team_quota_holds_under_concurrent_creates() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    h.fabric.set_create_delay(Duration::from_millis(20));

    let results = join_all((0..3).map(|_| h.create())).await;
    let created: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let rejected: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();

    assert_eq!(created.len(), 2);
    assert_eq!(rejected.len(), 1);
    assert!(matches!(
        rejected[0],
        SandplaneError::QuotaExceeded { limit: 2 }
    ));
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 2);

    h.service.kill(TEAM_A, created[0].get_sandbox_id()).await?;
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 1);

    h.create().await?;
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 2);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_node_failure_releases_both_slots() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let slots = h.service.get_admission().available_creation_slots();
    h.fabric.fail_create.store(true, Ordering::SeqCst);

    let err = h.create().await.unwrap_err();
    assert!(matches!(err, SandplaneError::Internal(_)));
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 0);
    assert_eq!(h.service.get_admission().available_creation_slots(), slots);
    assert!(h.service.get_registry().is_empty());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_validates_timeout_and_resources() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;

    let err = h
        .create_with(
            CreateSandboxRequest::builder()
                .template("base")
                .timeout(2 * 3600)
                .build(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::InvalidArgument(_)));

    let err = h
        .create_with(
            CreateSandboxRequest::builder()
                .template("base")
                .cpu_count(64)
                .build(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::InvalidArgument(_)));

    for timeout in [0, u64::MAX] {
        let err = h
            .create_with(
                CreateSandboxRequest::builder()
                    .template("base")
                    .timeout(timeout)
                    .build(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SandplaneError::InvalidArgument(_)));
    }

    assert_eq!(h.service.get_admission().team_count(TEAM_A), 0);
    assert!(h.service.get_registry().is_empty());

    let longest = h
        .create_with(
            CreateSandboxRequest::builder()
                .template("base")
                .timeout(3600)
                .build(),
        )
        .await?;
    assert_eq!(
        longest.get_end_at(),
        longest.get_started_at() + TimeDelta::hours(1)
    );
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_create_resolves_templates() -> anyhow::Result<()> {
    let h = Harness::start(5).await?;

    let sandbox = h
        .create_with(CreateSandboxRequest::builder().template("python").build())
        .await?;
    assert_eq!(sandbox.get_template_id(), "base");
    assert_eq!(sandbox.get_alias().as_deref(), Some("python"));

    let sandbox = h
        .create_with(CreateSandboxRequest::builder().template("shared").build())
        .await?;
    assert_eq!(sandbox.get_alias(), &None);

    let err = h
        .create_with(CreateSandboxRequest::builder().template("missing").build())
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::NotFound(_)));

    let err = h
        .create_with(CreateSandboxRequest::builder().template("base:v9").build())
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::NotFound(_)));

    let err = h
        .create_with(CreateSandboxRequest::builder().template("private").build())
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::Forbidden(_)));

    let err = h
        .create_with(CreateSandboxRequest::builder().template("remote").build())
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::InvalidArgument(_)));
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests: Pause
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_pause_moves_sandbox_to_snapshot() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();

    h.service.pause(TEAM_A, id).await?;

    assert!(!h.service.get_registry().contains(id));
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 0);

    let listed = h.service.get(TEAM_A, id).await?;
    assert_eq!(listed.state, SandboxState::Paused);
    assert_eq!(listed.started_at, sandbox.get_started_at());
    assert_eq!(listed.template_id, "base");

    let err = h.service.pause(TEAM_A, id).await.unwrap_err();
    assert!(matches!(err, SandplaneError::Conflict(_)));

    let err = h.service.pause(TEAM_A, "sbx_unknown").await.unwrap_err();
    assert!(matches!(err, SandplaneError::NotFound(_)));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_other_team_cannot_touch_sandbox() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();
    let other = h.other_team.get_id();

    assert!(matches!(
        h.service.pause(other, id).await.unwrap_err(),
        SandplaneError::Forbidden(_)
    ));
    assert!(matches!(
        h.service.kill(other, id).await.unwrap_err(),
        SandplaneError::Forbidden(_)
    ));
    assert!(matches!(
        h.service.get(other, id).await.unwrap_err(),
        SandplaneError::Forbidden(_)
    ));
    assert!(matches!(
        h.service
            .keep_alive_for(&h.other_team, id, Duration::from_secs(60), false)
            .await
            .unwrap_err(),
        SandplaneError::Forbidden(_)
    ));

    assert!(h.service.get_registry().contains(id));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_concurrent_pause_joins_the_capture_in_flight() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id().clone();

    h.fabric.close_gate();

    let first = {
        let service = h.service.clone();
        let id = id.clone();
        tokio::spawn(async move { service.pause(TEAM_A, &id).await })
    };

    let mut pausing = false;
    for _ in 0..100 {
        if h.service.get(TEAM_A, &id).await?.state == SandboxState::Pausing {
            pausing = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(pausing);

    let second = {
        let service = h.service.clone();
        let id = id.clone();
        tokio::spawn(async move { service.pause(TEAM_A, &id).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    h.fabric.open_gate();

    assert!(first.await?.is_ok());
    assert!(matches!(
        second.await?.unwrap_err(),
        SandplaneError::Conflict(_)
    ));
    assert_eq!(h.service.get(TEAM_A, &id).await?.state, SandboxState::Paused);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_abandoned_pause_still_completes() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();

    h.fabric.close_gate();
    let abandoned =
        tokio::time::timeout(Duration::from_millis(30), h.service.pause(TEAM_A, id)).await;
    assert!(abandoned.is_err());

    h.fabric.open_gate();

    let registry = h.service.get_registry().clone();
    let id_owned = id.clone();
    assert!(eventually(|| !registry.contains(&id_owned)).await);

    assert_eq!(h.service.get(TEAM_A, id).await?.state, SandboxState::Paused);
    assert!(matches!(
        h.service.pause(TEAM_A, id).await.unwrap_err(),
        SandplaneError::Conflict(_)
    ));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_failed_capture_leaves_sandbox_pausing() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();

    h.fabric.fail_capture.store(true, Ordering::SeqCst);
    let err = h.service.pause(TEAM_A, id).await.unwrap_err();
    assert!(matches!(err, SandplaneError::Internal(_)));

    assert_eq!(h.service.get(TEAM_A, id).await?.state, SandboxState::Pausing);
    let page = h.service.list(TEAM_A, &ListQuery::default()).await?;
    assert!(page.items.is_empty());

    let err = h.service.pause(TEAM_A, id).await.unwrap_err();
    assert!(matches!(err, SandplaneError::Internal(_)));

    h.service.kill(TEAM_A, id).await?;
    assert!(matches!(
        h.service.get(TEAM_A, id).await.unwrap_err(),
        SandplaneError::NotFound(_)
    ));
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 0);
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests: Resume
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_resume_restores_identity_and_labels() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let labels = HashMap::from([("env".to_string(), "prod".to_string())]);
    let sandbox = h
        .create_with(
            CreateSandboxRequest::builder()
                .template("python")
                .metadata(labels.clone())
                .build(),
        )
        .await?;
    let id = sandbox.get_sandbox_id();

    h.service.pause(TEAM_A, id).await?;
    let snapshot = store::get_snapshot(h.service.get_pool(), id, TEAM_A)
        .await?
        .expect("paused sandbox has a snapshot");

    let resumed = h
        .service
        .resume(&h.team, id, ResumeSandboxRequest::builder().timeout(60).build())
        .await?;
    assert_eq!(resumed.get_sandbox_id(), id);
    assert_eq!(resumed.get_template_id(), "base");
    assert_eq!(resumed.get_alias().as_deref(), Some("python"));
    assert_eq!(resumed.get_metadata(), &labels);
    assert_eq!(resumed.get_build_id(), snapshot.get_build_id());
    assert_eq!(
        resumed.get_end_at(),
        resumed.get_started_at() + TimeDelta::seconds(60)
    );

    // Live again and no longer paused.
    assert!(h.fabric.is_live(id));
    assert!(store::get_snapshot(h.service.get_pool(), id, TEAM_A).await?.is_none());
    assert_eq!(h.service.get(TEAM_A, id).await?.state, SandboxState::Running);
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 1);

    let page = h.service.list(TEAM_A, &ListQuery::default()).await?;
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].state, SandboxState::Running);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_resume_rejects_running_unknown_and_foreign_sandboxes() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();

    let err = h
        .service
        .resume(&h.team, id, ResumeSandboxRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::Conflict(_)));

    let err = h
        .service
        .resume(&h.team, "sbx_unknown", ResumeSandboxRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::NotFound(_)));

    h.service.pause(TEAM_A, id).await?;
    let err = h
        .service
        .resume(&h.other_team, id, ResumeSandboxRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::NotFound(_)));

    for timeout in [0, 2 * 3600] {
        let err = h
            .service
            .resume(&h.team, id, ResumeSandboxRequest::builder().timeout(timeout).build())
            .await
            .unwrap_err();
        assert!(matches!(err, SandplaneError::InvalidArgument(_)));
    }

    assert_eq!(h.service.get(TEAM_A, id).await?.state, SandboxState::Paused);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_resume_waits_for_pause_in_flight() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id().clone();

    h.fabric.close_gate();
    let pause = {
        let service = h.service.clone();
        let id = id.clone();
        tokio::spawn(async move { service.pause(TEAM_A, &id).await })
    };

    let registry = h.service.get_registry().clone();
    for _ in 0..100 {
        if registry.get(&id).await.map(|s| s.get_state()) == Some(SandboxState::Pausing) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let resume = {
        let service = h.service.clone();
        let team = h.team.clone();
        let id = id.clone();
        tokio::spawn(async move {
            service
                .resume(&team, &id, ResumeSandboxRequest::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!resume.is_finished());

    h.fabric.open_gate();
    pause.await??;
    resume.await??;

    assert_eq!(h.service.get(TEAM_A, &id).await?.state, SandboxState::Running);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_failed_resume_keeps_the_snapshot() -> anyhow::Result<()> {
    let h = Harness::start(1).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();
    h.service.pause(TEAM_A, id).await?;

    h.fabric.fail_create.store(true, Ordering::SeqCst);
    let err = h
        .service
        .resume(&h.team, id, ResumeSandboxRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::Internal(_)));
    assert_eq!(h.service.get(TEAM_A, id).await?.state, SandboxState::Paused);
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 0);

    // Quota failures leave the snapshot in place too.
    h.fabric.fail_create.store(false, Ordering::SeqCst);
    h.create().await?;
    let err = h
        .service
        .resume(&h.team, id, ResumeSandboxRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::QuotaExceeded { limit: 1 }));
    assert_eq!(h.service.get(TEAM_A, id).await?.state, SandboxState::Paused);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_concurrent_resumes_start_the_sandbox_once() -> anyhow::Result<()> {
    let h = Harness::start(5).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();
    h.service.pause(TEAM_A, id).await?;
    h.fabric.set_create_delay(Duration::from_millis(20));

    let results = join_all(
        (0..4).map(|_| h.service.resume(&h.team, id, ResumeSandboxRequest::default())),
    )
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert!(matches!(err, SandplaneError::NotFound(_) | SandplaneError::Conflict(_)));
    }
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 1);
    assert_eq!(h.service.get_registry().len(), 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_resumed_sandbox_releases_its_snapshot_build() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();

    h.service.pause(TEAM_A, id).await?;
    let first = h
        .service
        .resume(&h.team, id, ResumeSandboxRequest::default())
        .await?;
    assert!(h.fabric.deleted_builds().is_empty());

    // Pausing again captures a new build and retires the one it ran from.
    h.service.pause(TEAM_A, id).await?;
    let fabric = h.fabric.clone();
    assert!(eventually(|| fabric.deleted_builds().len() == 1).await);
    assert_eq!(fabric.deleted_builds()[0].1, *first.get_build_id());

    let second = h
        .service
        .resume(&h.team, id, ResumeSandboxRequest::default())
        .await?;
    assert_ne!(second.get_build_id(), first.get_build_id());

    h.service.kill(TEAM_A, id).await?;
    assert!(eventually(|| fabric.deleted_builds().len() == 2).await);
    assert_eq!(fabric.deleted_builds()[1].1, *second.get_build_id());
    assert!(matches!(
        h.service.get(TEAM_A, id).await.unwrap_err(),
        SandplaneError::NotFound(_)
    ));
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests: Kill
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_kill_proceeds_when_node_removal_fails() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();

    h.fabric.fail_kill.store(true, Ordering::SeqCst);
    h.service.kill(TEAM_A, id).await?;

    assert!(!h.service.get_registry().contains(id));
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 0);
    assert!(matches!(
        h.service.kill(TEAM_A, id).await.unwrap_err(),
        SandplaneError::NotFound(_)
    ));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_kill_paused_sandbox_deletes_snapshot() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();

    h.service.pause(TEAM_A, id).await?;
    h.service.kill(TEAM_A, id).await?;

    assert!(matches!(
        h.service.get(TEAM_A, id).await.unwrap_err(),
        SandplaneError::NotFound(_)
    ));

    let fabric = h.fabric.clone();
    assert!(eventually(|| fabric.deleted_builds().len() == 1).await);
    assert_eq!(fabric.deleted_builds()[0].0, "local");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_kill_all_reports_counts() -> anyhow::Result<()> {
    let h = Harness::start(5).await?;
    h.create_many(3).await?;

    let summary = h.service.kill_all(TEAM_A).await;
    assert_eq!(summary.killed, 3);
    assert_eq!(summary.failed, 0);
    assert!(h.service.get_registry().is_empty());
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 0);

    let summary = h.service.kill_all(TEAM_A).await;
    assert_eq!(summary.killed, 0);
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests: Keep-alive and metadata
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_keep_alive_is_floored_and_capped() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();

    let before = utils::now_micros();
    h.service
        .keep_alive_for(&h.team, id, Duration::from_secs(1), true)
        .await?;
    let after = utils::now_micros();

    let end_at = h.service.get(TEAM_A, id).await?.end_at;
    assert!(end_at >= before + TimeDelta::seconds(15));
    assert!(end_at <= after + TimeDelta::seconds(15));

    h.service
        .keep_alive_for(&h.team, id, Duration::from_secs(10 * 3600), false)
        .await?;
    let capped = h.service.get(TEAM_A, id).await?.end_at;
    assert_eq!(capped, sandbox.get_started_at() + TimeDelta::hours(1));

    h.service
        .keep_alive_for(&h.team, id, Duration::from_secs(60), false)
        .await?;
    assert_eq!(h.service.get(TEAM_A, id).await?.end_at, capped);

    h.service
        .keep_alive_for(&h.team, id, Duration::from_secs(60), true)
        .await?;
    assert!(h.service.get(TEAM_A, id).await?.end_at < capped);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_keep_alive_with_huge_durations_is_capped() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();
    let cap = sandbox.get_started_at() + TimeDelta::hours(1);

    for allow_shorter in [true, false] {
        for duration in [Duration::from_secs(u64::MAX), Duration::MAX] {
            h.service
                .keep_alive_for(&h.team, id, duration, allow_shorter)
                .await?;
            assert_eq!(h.service.get(TEAM_A, id).await?.end_at, cap);
        }
    }
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_keep_alive_requires_running_sandbox() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();

    h.service.pause(TEAM_A, id).await?;
    let err = h
        .service
        .keep_alive_for(&h.team, id, Duration::from_secs(60), false)
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::NotFound(_)));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_metadata_update_for_running_and_paused() -> anyhow::Result<()> {
    let h = Harness::start(2).await?;
    let sandbox = h.create().await?;
    let id = sandbox.get_sandbox_id();

    let labels = HashMap::from([("env".to_string(), "prod".to_string())]);
    h.service.update_metadata(TEAM_A, id, labels.clone()).await?;
    assert_eq!(h.service.get(TEAM_A, id).await?.metadata, labels);

    h.fabric.fail_update.store(true, Ordering::SeqCst);
    let err = h
        .service
        .update_metadata(TEAM_A, id, HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::Internal(_)));
    assert_eq!(h.service.get(TEAM_A, id).await?.metadata, labels);

    h.service.pause(TEAM_A, id).await?;
    let paused_labels = HashMap::from([("stage".to_string(), "archived".to_string())]);
    h.service
        .update_metadata(TEAM_A, id, paused_labels.clone())
        .await?;
    assert_eq!(h.service.get(TEAM_A, id).await?.metadata, paused_labels);

    let err = h
        .service
        .update_metadata(TEAM_A, "sbx_unknown", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SandplaneError::NotFound(_)));
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests: Background work
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_reaper_ends_expired_sandboxes() -> anyhow::Result<()> {
    let h = Harness::start(5).await?;
    let killed = h
        .create_with(CreateSandboxRequest::builder().template("base").timeout(1).build())
        .await?;
    let paused = h
        .create_with(
            CreateSandboxRequest::builder()
                .template("base")
                .timeout(1)
                .auto_pause(true)
                .build(),
        )
        .await?;
    let alive = h
        .create_with(CreateSandboxRequest::builder().template("base").timeout(600).build())
        .await?;

    assert_eq!(h.service.reap_expired().await, 0);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.service.reap_expired().await, 2);

    let registry = h.service.get_registry().clone();
    let paused_id = paused.get_sandbox_id().clone();
    assert!(eventually(|| !registry.contains(&paused_id)).await);

    assert!(matches!(
        h.service.get(TEAM_A, killed.get_sandbox_id()).await.unwrap_err(),
        SandplaneError::NotFound(_)
    ));
    assert_eq!(
        h.service.get(TEAM_A, paused.get_sandbox_id()).await?.state,
        SandboxState::Paused
    );
    assert_eq!(
        h.service.get(TEAM_A, alive.get_sandbox_id()).await?.state,
        SandboxState::Running
    );
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_slow_capture_does_not_hold_up_the_reaper() -> anyhow::Result<()> {
    let h = Harness::start_with(5, |config| {
        PlaneConfig::builder()
            .bulk_kill_concurrency(1)
            .database_path(config.database_path())
            .teams(config.get_teams().clone())
            .templates(config.get_templates().clone())
            .build()
    })
    .await?;

    let expiring = |auto_pause| {
        CreateSandboxRequest::builder()
            .template("base")
            .timeout(1)
            .auto_pause(auto_pause)
            .build()
    };
    let first_paused = h.create_with(expiring(true)).await?;
    let second_paused = h.create_with(expiring(true)).await?;
    let killed = h.create_with(expiring(false)).await?;

    h.fabric.close_gate();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let ended = tokio::time::timeout(Duration::from_secs(1), h.service.reap_expired()).await?;
    assert_eq!(ended, 3);
    assert!(!h.service.get_registry().contains(killed.get_sandbox_id()));
    for sandbox in [&first_paused, &second_paused] {
        assert_eq!(
            h.service.get(TEAM_A, sandbox.get_sandbox_id()).await?.state,
            SandboxState::Pausing
        );
    }

    // Nothing left to end while the captures are held.
    assert_eq!(h.service.reap_expired().await, 0);

    h.fabric.open_gate();
    let registry = h.service.get_registry().clone();
    assert!(eventually(|| registry.is_empty()).await);
    for sandbox in [&first_paused, &second_paused] {
        assert_eq!(
            h.service.get(TEAM_A, sandbox.get_sandbox_id()).await?.state,
            SandboxState::Paused
        );
    }
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_reaper_stops_on_shutdown() -> anyhow::Result<()> {
    let h = Harness::start_with(2, |config| {
        PlaneConfig::builder()
            .reap_interval_ms(10)
            .database_path(config.database_path())
            .teams(config.get_teams().clone())
            .templates(config.get_templates().clone())
            .build()
    })
    .await?;
    let sandbox = h
        .create_with(CreateSandboxRequest::builder().template("base").timeout(1).build())
        .await?;

    h.service.spawn_reaper();
    let registry = h.service.get_registry().clone();
    let id = sandbox.get_sandbox_id().clone();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(eventually(|| !registry.contains(&id)).await);

    tokio::time::timeout(Duration::from_secs(5), h.service.shutdown()).await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_sync_drops_sandboxes_the_node_lost() -> anyhow::Result<()> {
    let h = Harness::start(5).await?;
    let sandboxes = h.create_many(2).await?;
    let lost = sandboxes[0].get_sandbox_id();

    h.fabric.forget(lost);
    assert_eq!(h.service.sync_cluster("local").await?, 1);
    assert_eq!(h.service.sync_cluster("local").await?, 0);
    assert_eq!(h.service.sync_cluster("eu-1").await?, 0);

    h.fabric.forget(sandboxes[1].get_sandbox_id());
    assert_eq!(h.service.sync_clusters().await, 1);

    assert!(!h.service.get_registry().contains(lost));
    assert!(!h.service.get_registry().contains(sandboxes[1].get_sandbox_id()));
    assert_eq!(h.service.get_admission().team_count(TEAM_A), 1);
    Ok(())
}
