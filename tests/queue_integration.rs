//! Scheduler scenarios driven end to end through a scripted downloader.

mod support;

use std::path::PathBuf;
use std::time::Duration;

use mediadl_core::sorting::{Condition, Operator, RuleDraft, RuleScope};
use mediadl_core::{
    DownloadOptions, FailureKind, PlaylistMode, QueueEvent, SubmitOutcome, TaskId,
    ValidationError,
};
use support::{Behavior, Harness};
use tokio::sync::broadcast::error::TryRecvError;

const SIDECAR: &str = r#"{"id": "abc", "title": "Clip", "uploader": "Chan", "height": 1080}"#;

fn opts() -> DownloadOptions {
    DownloadOptions::default()
}

fn admitted_id(outcome: &SubmitOutcome) -> TaskId {
    match outcome {
        SubmitOutcome::Admitted { id, .. } => *id,
        other => panic!("expected admission, got {other:?}"),
    }
}

#[tokio::test]
async fn test_successful_download_is_moved_and_archived() {
    let mut h = Harness::new(2).await;
    let url = "https://youtu.be/abc";
    h.launcher
        .script(url, Behavior::succeed("Clip [abc].mp4", SIDECAR));

    let outcome = h.scheduler.submit(url, opts()).await;
    assert_eq!(
        outcome,
        SubmitOutcome::Admitted {
            id: TaskId(1),
            started: true
        }
    );

    let finished = h
        .expect_event(|e| matches!(e, QueueEvent::Finished { .. }))
        .await;
    let QueueEvent::Finished {
        final_path, moved, ..
    } = finished
    else {
        unreachable!();
    };
    assert_eq!(moved, 1);
    assert_eq!(final_path, h.config.completed_dir.join("Clip [abc].mp4"));
    assert!(final_path.is_file());
    // The sidecar is consumed, not delivered.
    assert!(!h.config.completed_dir.join("Clip [abc].info.json").exists());

    h.scheduler.wait_idle().await;
    assert!(h.archive.contains(url).await.unwrap());
    assert_eq!(h.scheduler.resolved_path(url), Some(final_path));
}

#[tokio::test]
async fn test_events_arrive_in_lifecycle_order() {
    let mut h = Harness::new(1).await;
    let url = "https://youtu.be/order";
    h.launcher
        .script(url, Behavior::succeed("Order [order].mp4", "{}"));

    h.scheduler.submit(url, opts()).await;
    let events = h.drain_until_idle().await;

    let position = |pred: &dyn Fn(&QueueEvent) -> bool| {
        events
            .iter()
            .position(|e| pred(e))
            .expect("event missing")
    };
    let added = position(&|e| matches!(e, QueueEvent::TaskAdded { queued: false, .. }));
    let started = position(&|e| matches!(e, QueueEvent::TaskStarted { .. }));
    let progress = position(&|e| matches!(e, QueueEvent::Progress { .. }));
    let finished = position(&|e| matches!(e, QueueEvent::Finished { .. }));
    assert!(added < started);
    assert!(started < progress);
    assert!(progress < finished);
}

#[tokio::test]
async fn test_second_submission_waits_when_bound_is_one() {
    let mut h = Harness::new(1).await;
    let first = "https://youtu.be/first";
    let second = "https://youtu.be/second";
    h.launcher
        .script(first, Behavior::succeed("First [first].mp4", "{}").held());
    h.launcher
        .script(second, Behavior::succeed("Second [second].mp4", "{}"));

    let a = h.scheduler.submit(first, opts()).await;
    let b = h.scheduler.submit(second, opts()).await;
    assert!(matches!(a, SubmitOutcome::Admitted { started: true, .. }));
    assert!(matches!(b, SubmitOutcome::Admitted { started: false, .. }));

    let snapshot = h.scheduler.snapshot();
    assert_eq!(snapshot.running, vec![admitted_id(&a)]);
    assert_eq!(snapshot.pending, vec![admitted_id(&b)]);
    h.expect_event(|e| matches!(e, QueueEvent::Progress { .. }))
        .await;
    assert_eq!(h.launcher.launched_urls(), vec![first.to_string()]);

    h.launcher.release(first);
    h.drain_until_idle().await;
    assert_eq!(
        h.launcher.launched_urls(),
        vec![first.to_string(), second.to_string()]
    );
    assert_eq!(h.launcher.peak_running(), 1);
}

#[tokio::test]
async fn test_pending_tasks_start_in_submission_order() {
    let mut h = Harness::new(1).await;
    let urls: Vec<String> = (0..4).map(|i| format!("https://youtu.be/v{i}")).collect();
    for (i, url) in urls.iter().enumerate() {
        h.launcher
            .script(url, Behavior::succeed(&format!("V{i} [v{i}].mp4"), "{}"));
    }
    for url in &urls {
        h.scheduler.submit(url, opts()).await;
    }
    h.drain_until_idle().await;
    assert_eq!(h.launcher.launched_urls(), urls);
}

#[tokio::test]
async fn test_running_count_never_exceeds_bound() {
    let mut h = Harness::new(2).await;
    let urls: Vec<String> = (0..5).map(|i| format!("https://youtu.be/p{i}")).collect();
    for (i, url) in urls.iter().enumerate() {
        h.launcher.script(
            url,
            Behavior::succeed(&format!("P{i} [p{i}].mp4"), "{}").held(),
        );
    }
    for url in &urls {
        h.scheduler.submit(url, opts()).await;
    }
    assert_eq!(h.scheduler.snapshot().running.len(), 2);
    assert_eq!(h.scheduler.snapshot().pending.len(), 3);

    for url in &urls {
        h.launcher.release(url);
    }
    h.drain_until_idle().await;
    assert_eq!(h.launcher.launched_urls().len(), 5);
    assert!(h.launcher.peak_running() <= 2);
}

#[tokio::test]
async fn test_raising_bound_promotes_pending_immediately() {
    let mut h = Harness::new(1).await;
    let urls: Vec<String> = (0..3).map(|i| format!("https://youtu.be/r{i}")).collect();
    for (i, url) in urls.iter().enumerate() {
        h.launcher.script(
            url,
            Behavior::succeed(&format!("R{i} [r{i}].mp4"), "{}").held(),
        );
    }
    for url in &urls {
        h.scheduler.submit(url, opts()).await;
    }
    assert_eq!(h.scheduler.snapshot().pending.len(), 2);

    assert_eq!(h.scheduler.set_concurrency_limit(3), 3);
    let snapshot = h.scheduler.snapshot();
    assert_eq!(snapshot.running.len(), 3);
    assert!(snapshot.pending.is_empty());

    for url in &urls {
        h.launcher.release(url);
    }
    h.drain_until_idle().await;
}

#[tokio::test]
async fn test_lowering_bound_does_not_stop_running_tasks() {
    let mut h = Harness::new(3).await;
    let urls: Vec<String> = (0..3).map(|i| format!("https://youtu.be/l{i}")).collect();
    for (i, url) in urls.iter().enumerate() {
        h.launcher.script(
            url,
            Behavior::succeed(&format!("L{i} [l{i}].mp4"), "{}").held(),
        );
    }
    for url in &urls {
        h.scheduler.submit(url, opts()).await;
    }
    assert_eq!(h.scheduler.set_concurrency_limit(0), 1);
    assert_eq!(h.scheduler.snapshot().running.len(), 3);

    for url in &urls {
        h.launcher.release(url);
    }
    let events = h.drain_until_idle().await;
    let finished = events
        .iter()
        .filter(|e| matches!(e, QueueEvent::Finished { .. }))
        .count();
    assert_eq!(finished, 3);
}

#[tokio::test]
async fn test_archived_url_is_reported_as_duplicate() {
    let mut h = Harness::new(2).await;
    let url = "https://youtu.be/dupe";
    h.archive.record(url).await.unwrap();

    let outcome = h.scheduler.submit(url, opts()).await;
    assert_eq!(outcome, SubmitOutcome::Duplicate);
    h.expect_event(|e| matches!(e, QueueEvent::DuplicateDetected { .. }))
        .await;
    assert!(h.launcher.launched_urls().is_empty());
    assert!(h.scheduler.snapshot().running.is_empty());
}

#[tokio::test]
async fn test_forced_redownload_bypasses_archive() {
    let mut h = Harness::new(2).await;
    let url = "https://youtu.be/again";
    h.archive.record(url).await.unwrap();
    h.launcher
        .script(url, Behavior::succeed("Again [again].mp4", "{}"));

    let forced = DownloadOptions {
        redownload: true,
        ..opts()
    };
    let outcome = h.scheduler.submit(url, forced).await;
    assert!(matches!(outcome, SubmitOutcome::Admitted { .. }));
    h.drain_until_idle().await;
    assert_eq!(h.launcher.launched_urls(), vec![url.to_string()]);
}

#[tokio::test]
async fn test_retry_resubmits_with_original_options() {
    let mut h = Harness::new(2).await;
    let url = "https://youtu.be/retry";
    h.launcher.script(url, Behavior::fail("Unable to download"));

    let audio = DownloadOptions {
        audio_only: true,
        ..opts()
    };
    h.scheduler.submit(url, audio).await;
    h.expect_event(|e| matches!(e, QueueEvent::Failed { .. })).await;
    h.drain_until_idle().await;

    h.launcher
        .script(url, Behavior::succeed("Retry [retry].m4a", "{}"));
    let outcome = h.scheduler.retry(url).await.expect("url was submitted");
    assert!(matches!(outcome, SubmitOutcome::Admitted { .. }));
    h.drain_until_idle().await;

    let launches = h.launcher.launches();
    assert_eq!(launches.len(), 2);
    assert!(launches[1].has_arg("--extract-audio"));
    assert!(h.scheduler.request_for(url).unwrap().options.audio_only);
    assert!(h.scheduler.retry("https://youtu.be/never").await.is_none());
}

#[tokio::test]
async fn test_invalid_and_search_urls_are_rejected_without_a_slot() {
    let mut h = Harness::new(1).await;

    let outcome = h.scheduler.submit("not a url", opts()).await;
    assert!(matches!(
        outcome,
        SubmitOutcome::Rejected(ValidationError::InvalidUrl { .. })
    ));
    let outcome = h
        .scheduler
        .submit("https://www.youtube.com/results?search_query=cats", opts())
        .await;
    assert!(matches!(
        outcome,
        SubmitOutcome::Rejected(ValidationError::SearchPage { .. })
    ));

    let events = h.drain_until_idle().await;
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, QueueEvent::ValidationFailed { .. }))
            .count(),
        2
    );
    assert!(h.launcher.launched_urls().is_empty());
    assert!(h.scheduler.snapshot().running.is_empty());
}

#[tokio::test]
async fn test_conflicting_modes_are_rejected() {
    let h = Harness::new(1).await;
    let both = DownloadOptions {
        audio_only: true,
        metadata_only: true,
        ..opts()
    };
    let outcome = h.scheduler.submit("https://youtu.be/x", both).await;
    assert_eq!(
        outcome,
        SubmitOutcome::Rejected(ValidationError::ConflictingModes)
    );
}

#[tokio::test]
async fn test_cancelling_pending_task_never_launches_it() {
    let mut h = Harness::new(1).await;
    let first = "https://youtu.be/hold";
    let second = "https://youtu.be/waiting";
    h.launcher
        .script(first, Behavior::succeed("Hold [hold].mp4", "{}").held());

    h.scheduler.submit(first, opts()).await;
    let queued = admitted_id(&h.scheduler.submit(second, opts()).await);

    assert!(h.scheduler.cancel(queued));
    let cancelled = h
        .expect_event(|e| matches!(e, QueueEvent::Cancelled { .. }))
        .await;
    assert_eq!(
        cancelled,
        QueueEvent::Cancelled {
            id: queued,
            url: second.to_string(),
            retryable: true
        }
    );
    assert!(h.scheduler.snapshot().pending.is_empty());

    h.launcher.release(first);
    h.drain_until_idle().await;
    assert_eq!(h.launcher.launched_urls(), vec![first.to_string()]);
    assert!(!h.scheduler.cancel(TaskId(999)));
}

#[tokio::test]
async fn test_cancelling_after_progress_is_not_retryable() {
    let mut h = Harness::new(1).await;
    let url = "https://youtu.be/midway";
    h.launcher
        .script(url, Behavior::succeed("Midway [midway].mp4", "{}").held());

    let id = admitted_id(&h.scheduler.submit(url, opts()).await);
    h.expect_event(|e| matches!(e, QueueEvent::Progress { update, .. } if update.percent.is_some()))
        .await;
    assert!(h.scheduler.cancel(id));

    let cancelled = h
        .expect_event(|e| matches!(e, QueueEvent::Cancelled { .. }))
        .await;
    assert!(matches!(
        cancelled,
        QueueEvent::Cancelled {
            retryable: false,
            ..
        }
    ));
    h.drain_until_idle().await;
    assert!(!h.archive.contains(url).await.unwrap());
}

#[tokio::test]
async fn test_cancel_all_settles_every_task() {
    let mut h = Harness::new(1).await;
    let urls: Vec<String> = (0..3).map(|i| format!("https://youtu.be/c{i}")).collect();
    for (i, url) in urls.iter().enumerate() {
        h.launcher.script(
            url,
            Behavior::succeed(&format!("C{i} [c{i}].mp4"), "{}").held(),
        );
        h.scheduler.submit(url, opts()).await;
    }

    assert_eq!(h.scheduler.cancel_all(), 3);
    let events = h.drain_until_idle().await;
    let cancelled = events
        .iter()
        .filter(|e| matches!(e, QueueEvent::Cancelled { .. }))
        .count();
    assert_eq!(cancelled, 3);
    // Only the task holding the single slot can ever have reached the tool.
    assert!(
        h.launcher
            .launched_urls()
            .iter()
            .all(|u| *u == urls[0])
    );
}

#[tokio::test]
async fn test_cancel_all_stops_urls_awaiting_support_check() {
    let mut h = Harness::new(2).await;
    let url = "https://vimeo.example/1";
    h.launcher
        .script(url, Behavior::succeed("One [1].mp4", "{}").probe_held());

    assert_eq!(h.scheduler.submit(url, opts()).await, SubmitOutcome::Probing);
    assert_eq!(h.scheduler.cancel_all(), 1);
    h.launcher.release_probe(url);

    let cancelled = h
        .expect_event(|e| matches!(e, QueueEvent::Cancelled { .. }))
        .await;
    let QueueEvent::Cancelled {
        url: cancelled_url,
        retryable,
        ..
    } = cancelled
    else {
        unreachable!();
    };
    assert_eq!(cancelled_url, url);
    assert!(retryable);
    h.drain_until_idle().await;
    assert!(h.launcher.launched_urls().is_empty());
    assert!(h.scheduler.snapshot().running.is_empty());
    assert_eq!(h.scheduler.summary().cancelled, 1);

    // A later submission of the same URL is admitted normally.
    h.launcher
        .script(url, Behavior::succeed("One [1].mp4", "{}"));
    assert_eq!(h.scheduler.submit(url, opts()).await, SubmitOutcome::Probing);
    h.drain_until_idle().await;
    assert_eq!(h.launcher.launched_urls(), vec![url.to_string()]);
}

#[tokio::test]
async fn test_chatty_download_keeps_observers_in_step() {
    let mut h = Harness::new(1).await;
    let url = "https://youtu.be/chatty";
    let mut behavior = Behavior::fail("[youtube] chatty: Private video");
    behavior.lines = std::iter::once("[download] Destination: {scratch}/Chatty.mp4".to_string())
        .chain((1..5000).map(|i| format!("[download] {:.2}% of 10.00MiB", f64::from(i) / 100.0)))
        .chain(std::iter::once("ERROR: [youtube] chatty: Private video".to_string()))
        .collect();
    h.launcher.script(url, behavior);

    h.scheduler.submit(url, opts()).await;
    tokio::time::timeout(Duration::from_secs(10), h.scheduler.wait_idle())
        .await
        .expect("queue did not go idle");

    let mut failed = 0;
    loop {
        match h.events.try_recv() {
            Ok(QueueEvent::Failed { .. }) => failed += 1,
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => panic!("observer lagged by {skipped} events"),
            Err(_) => break,
        }
    }
    assert_eq!(failed, 1);

    let summary = h.scheduler.summary();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.problems.len(), 1);
    assert_eq!(summary.problems[0].0, url);
}

#[tokio::test]
async fn test_summary_records_outcomes_without_reading_events() {
    let h = Harness::new(2).await;
    let good = "https://youtu.be/good";
    let bad = "https://youtu.be/bad";
    h.launcher
        .script(good, Behavior::succeed("Good [good].mp4", "{}"));
    h.launcher.script(bad, Behavior::fail("[youtube] bad: Video unavailable"));
    h.archive.record("https://youtu.be/seen").await.unwrap();

    h.scheduler.submit(good, opts()).await;
    h.scheduler.submit(bad, opts()).await;
    h.scheduler.submit("https://youtu.be/seen", opts()).await;
    h.scheduler.submit("not a url", opts()).await;
    tokio::time::timeout(Duration::from_secs(5), h.scheduler.wait_idle())
        .await
        .expect("queue did not go idle");

    let summary = h.scheduler.summary();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(
        summary.finished,
        vec![(good.to_string(), h.config.completed_dir.join("Good [good].mp4"))]
    );
    assert!(summary.has_problems());
}

#[tokio::test]
async fn test_failure_is_classified() {
    let mut h = Harness::new(1).await;
    let url = "https://youtu.be/secret";
    h.launcher.script(
        url,
        Behavior::fail("[youtube] secret: Private video. Sign in if you've been granted access"),
    );

    h.scheduler.submit(url, opts()).await;
    let failed = h
        .expect_event(|e| matches!(e, QueueEvent::Failed { .. }))
        .await;
    let QueueEvent::Failed { kind, message, .. } = failed else {
        unreachable!();
    };
    assert_eq!(kind, FailureKind::Private);
    assert!(!message.is_empty());
    h.drain_until_idle().await;
    assert!(!h.archive.contains(url).await.unwrap());
}

#[tokio::test]
async fn test_unknown_host_is_probed_before_admission() {
    let mut h = Harness::new(1).await;
    let url = "https://vimeo.example/123";
    h.launcher
        .script(url, Behavior::succeed("Vid [123].mp4", "{}"));

    let outcome = h.scheduler.submit(url, opts()).await;
    assert_eq!(outcome, SubmitOutcome::Probing);
    h.expect_event(|e| matches!(e, QueueEvent::TaskAdded { .. }))
        .await;
    h.drain_until_idle().await;

    assert!(h.launcher.outputs().iter().any(|i| i.has_arg("--simulate")));
    assert_eq!(h.launcher.launched_urls(), vec![url.to_string()]);
}

#[tokio::test]
async fn test_failed_probe_rejects_as_unsupported() {
    let mut h = Harness::new(1).await;
    let url = "https://nothing-here.example/page";
    h.launcher
        .script(url, Behavior::succeed("x.mp4", "{}").unsupported());

    assert_eq!(h.scheduler.submit(url, opts()).await, SubmitOutcome::Probing);
    let rejected = h
        .expect_event(|e| matches!(e, QueueEvent::ValidationFailed { .. }))
        .await;
    assert!(matches!(
        rejected,
        QueueEvent::ValidationFailed {
            error: ValidationError::Unsupported { .. },
            ..
        }
    ));
    h.drain_until_idle().await;
    assert!(h.launcher.launched_urls().is_empty());
}

#[tokio::test]
async fn test_refreshed_index_admits_known_hosts_without_probe() {
    let mut h = Harness::new(1).await;
    assert_eq!(h.scheduler.refresh_index().await.unwrap(), 3);
    assert!(h.config.extractor_index_path().is_file());

    let url = "https://vimeo.com/42";
    h.launcher
        .script(url, Behavior::succeed("Vimeo [42].mp4", "{}"));
    let outcome = h.scheduler.submit(url, opts()).await;
    assert!(matches!(outcome, SubmitOutcome::Admitted { .. }));
    h.drain_until_idle().await;
    assert!(!h.launcher.outputs().iter().any(|i| i.has_arg("--simulate")));
}

#[tokio::test]
async fn test_prefetched_metadata_is_published() {
    let mut h = Harness::new(1).await;
    let url = "https://youtu.be/meta";
    h.launcher.script(
        url,
        Behavior::succeed("Meta [meta].mp4", "{}")
            .held()
            .with_metadata(r#"{"id": "meta", "title": "Prefetched"}"#),
    );

    let id = admitted_id(&h.scheduler.submit(url, opts()).await);
    let resolved = h
        .expect_event(|e| matches!(e, QueueEvent::MetadataResolved { .. }))
        .await;
    assert_eq!(
        resolved,
        QueueEvent::MetadataResolved {
            id,
            title: Some("Prefetched".to_string())
        }
    );
    assert_eq!(
        h.scheduler.metadata(id).and_then(|m| m.title()).as_deref(),
        Some("Prefetched")
    );

    h.launcher.release(url);
    h.drain_until_idle().await;
    assert!(h.scheduler.metadata(id).is_none());
}

#[tokio::test]
async fn test_metadata_arriving_after_task_settled_is_discarded() {
    let mut h = Harness::new(1).await;
    let url = "https://youtu.be/late";
    h.launcher.script(
        url,
        Behavior::succeed("Late [late].mp4", "{}")
            .with_metadata(r#"{"id": "late", "title": "Too late"}"#)
            .metadata_held(),
    );

    let id = admitted_id(&h.scheduler.submit(url, opts()).await);
    h.expect_event(|e| matches!(e, QueueEvent::Finished { .. }))
        .await;
    h.drain_until_idle().await;

    h.launcher.release_metadata(url);
    h.wait_for(|_| {
        h.launcher
            .answered()
            .iter()
            .any(|i| i.url == url && i.has_arg("--dump-single-json"))
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.scheduler.metadata(id).is_none());
    let events = h.drain_until_idle().await;
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, QueueEvent::MetadataResolved { .. }))
    );
}

#[tokio::test]
async fn test_matching_rule_routes_download() {
    let mut h = Harness::new(1).await;
    let sorted = h.config.completed_dir.join("sorted");
    h.rules
        .add(RuleDraft {
            name: "Chan uploads".to_string(),
            target_path: sorted.clone(),
            subfolder_pattern: Some("{uploader}".to_string()),
            download_type: RuleScope::Video,
            conditions: vec![Condition::new(
                "uploader",
                Operator::Equals,
                vec!["Chan".to_string()],
            )],
        })
        .unwrap();

    let url = "https://youtu.be/routed";
    h.launcher
        .script(url, Behavior::succeed("Routed [routed].mp4", SIDECAR));
    h.scheduler.submit(url, opts()).await;
    h.drain_until_idle().await;

    let expected: PathBuf = sorted.join("Chan").join("Routed [routed].mp4");
    assert!(expected.is_file());
    assert_eq!(h.scheduler.resolved_path(url), Some(expected));
}

#[tokio::test]
async fn test_low_resolution_best_download_warns() {
    let mut h = Harness::new(1).await;
    let url = "https://youtu.be/tiny";
    h.launcher.script(
        url,
        Behavior::succeed("Tiny [tiny].mp4", r#"{"id": "tiny", "height": 360}"#),
    );

    h.scheduler.submit(url, opts()).await;
    let events = h.drain_until_idle().await;
    assert!(events.iter().any(|e| matches!(
        e,
        QueueEvent::LowQualityWarning { height: 360, .. }
    )));

    let url = "https://youtu.be/sharp";
    h.launcher
        .script(url, Behavior::succeed("Sharp [sharp].mp4", SIDECAR));
    h.scheduler.submit(url, opts()).await;
    let events = h.drain_until_idle().await;
    assert!(!events
        .iter()
        .any(|e| matches!(e, QueueEvent::LowQualityWarning { .. })));
}

#[tokio::test]
async fn test_gallery_host_runs_gallery_tool() {
    let mut h = Harness::new(1).await;
    let url = "https://imgur.com/gallery/abc";
    let mut behavior = Behavior::succeed("image.jpg", "{}");
    behavior.lines = vec!["{scratch}/image.jpg".to_string()];
    behavior.files.truncate(1);
    h.launcher.script(url, behavior);

    assert_eq!(h.scheduler.submit(url, opts()).await, SubmitOutcome::Probing);
    h.drain_until_idle().await;

    let launches = h.launcher.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].program, h.config.gallery_dl_path);
    assert!(launches[0].has_arg("-d"));
    assert!(h.config.completed_dir.join("image.jpg").is_file());
}

#[tokio::test]
async fn test_playlist_entries_are_queued_with_playlist_title() {
    let mut h = Harness::new(1).await;
    let albums = h.config.completed_dir.join("albums");
    h.rules
        .add(RuleDraft {
            name: "Playlists".to_string(),
            target_path: albums.clone(),
            subfolder_pattern: Some("{album}".to_string()),
            download_type: RuleScope::VideoPlaylist,
            conditions: vec![Condition::new(
                "album",
                Operator::Equals,
                vec!["Mixtape".to_string()],
            )],
        })
        .unwrap();

    let playlist = "https://www.youtube.com/playlist?list=PL1";
    let first = "https://www.youtube.com/watch?v=e1";
    let second = "https://www.youtube.com/watch?v=e2";
    let listing = format!(
        r#"{{"_type": "playlist", "title": "Mixtape", "entries": [{{"url": "{first}"}}, {{"url": "{second}"}}]}}"#
    );
    h.launcher.script(
        playlist,
        Behavior::succeed("unused.mp4", "{}").with_metadata(&listing),
    );
    h.launcher
        .script(first, Behavior::succeed("One [e1].mp4", r#"{"id": "e1"}"#));
    h.launcher
        .script(second, Behavior::succeed("Two [e2].mp4", r#"{"id": "e2"}"#));

    let outcomes = h.scheduler.submit_expanded(playlist, opts()).await;
    assert_eq!(outcomes.len(), 2);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, SubmitOutcome::Admitted { .. }))
    );
    h.drain_until_idle().await;

    assert_eq!(
        h.launcher.launched_urls(),
        vec![first.to_string(), second.to_string()]
    );
    assert!(h.launcher.launches().iter().all(|i| i.has_arg("--no-playlist")));
    for entry in [first, second] {
        let request = h.scheduler.request_for(entry).unwrap();
        assert_eq!(request.options.playlist_title.as_deref(), Some("Mixtape"));
        assert_eq!(request.options.playlist_mode, PlaylistMode::Single);
    }
    assert!(albums.join("Mixtape").join("One [e1].mp4").is_file());
    assert!(albums.join("Mixtape").join("Two [e2].mp4").is_file());
}

#[tokio::test]
async fn test_unlistable_url_is_submitted_as_is() {
    let mut h = Harness::new(1).await;
    let url = "https://youtu.be/solo";
    h.launcher
        .script(url, Behavior::succeed("Solo [solo].mp4", "{}"));

    let outcomes = h.scheduler.submit_expanded(url, opts()).await;
    assert_eq!(outcomes.len(), 1);
    h.drain_until_idle().await;

    assert!(
        h.launcher
            .outputs()
            .iter()
            .any(|i| i.url == url && i.has_arg("--flat-playlist") && i.has_arg("--dump-single-json"))
    );
    assert_eq!(h.launcher.launched_urls(), vec![url.to_string()]);
    let request = h.scheduler.request_for(url).unwrap();
    assert_eq!(request.options.playlist_title, None);
    assert!(h.config.completed_dir.join("Solo [solo].mp4").is_file());
}

#[tokio::test]
async fn test_single_playlist_mode_skips_listing() {
    let mut h = Harness::new(1).await;
    let url = "https://youtu.be/only";
    h.launcher
        .script(url, Behavior::succeed("Only [only].mp4", "{}"));

    let single = DownloadOptions {
        playlist_mode: PlaylistMode::Single,
        ..opts()
    };
    h.scheduler.submit_expanded(url, single).await;
    h.drain_until_idle().await;

    assert!(!h.launcher.outputs().iter().any(|i| i.has_arg("--flat-playlist")));
    assert_eq!(h.launcher.launched_urls(), vec![url.to_string()]);
}
