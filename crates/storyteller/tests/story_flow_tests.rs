//! End-to-end tests: a request goes through submission, the queue, the
//! worker and ends up in the story library.

mod common;

use common::{FormBuilder, ScriptedGenerator, TestHarness};

use storyteller::config::MetadataBackend;
use storyteller::db::{story_repo, user_repo};
use storyteller::job::{JobState, NextStep};
use storyteller::library::LibraryError;
use storyteller::submission::SubmissionError;
use storyteller::{check_status, JobOutcome, StatusReport};

const STORY: &str = "Luna the fox looked up and saw the comet.\n\n\
                     It was lost, so she showed it the way home.\n\n\
                     Then everyone slept soundly.";

#[test]
fn test_submitted_story_is_generated_and_viewable() {
    let harness = TestHarness::new();
    let generator = ScriptedGenerator::replying(STORY);
    let worker = harness.worker(harness.pipeline(generator.clone()));

    let form = FormBuilder::new().title("Luna and the Comet").length("short").build();
    let submission = harness.submitter().submit(&form, None).unwrap();
    assert!(matches!(
        check_status(&harness.jobs(), &submission.request_id),
        StatusReport::Queued(_)
    ));

    let outcome = worker.run_once().unwrap().expect("one job queued");
    let JobOutcome::Completed { output_file, .. } = outcome else {
        panic!("job failed: {:?}", outcome);
    };

    let report = check_status(&harness.jobs(), &submission.request_id);
    assert_eq!(report.label(), "processed");
    assert_eq!(report.next_step(), NextStep::ShowStory(output_file.clone()));

    let html = harness.read_story(&output_file);
    assert!(html.contains("Luna and the Comet"));
    assert!(html.contains(&submission.request_id));

    let library = harness.library();
    let view = library.view(&output_file, None).unwrap();
    assert_eq!(view.metadata.title.as_deref(), Some("Luna and the Comet"));
    assert_eq!(view.metadata.request_id.as_deref(), Some(submission.request_id.as_str()));
    assert!(view.metadata.story.unwrap().contains("showed it the way home"));
    assert_eq!(view.language, Some("English"));
    assert_eq!(view.views, 1);

    let listings = library.list(None).unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].filename, output_file);
    assert_eq!(listings[0].provider.as_deref(), Some("scripted"));
    assert_eq!(listings[0].views, 1);
}

#[test]
fn test_prompts_reach_the_generator() {
    let harness = TestHarness::new();
    let generator = ScriptedGenerator::replying(STORY);
    let worker = harness.worker(harness.pipeline(generator.clone()));

    let form = FormBuilder::new()
        .length("short")
        .lesson("sharing")
        .model("openai/gpt-4o-mini")
        .build();
    harness.submitter().submit(&form, None).unwrap();
    worker.run_once().unwrap();

    let requests = generator.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.max_tokens, 1000);
    assert_eq!(request.model, "openai/gpt-4o-mini");
    assert!(request.system_prompt.contains("short sentences"));
    assert!(request.user_message.contains("an adventure among the stars"));
    assert!(request.user_message.contains("Luna the fox"));
    assert!(request.user_message.contains("sharing"));
}

#[test]
fn test_ratings_accumulate() {
    let harness = TestHarness::new();
    let worker = harness.worker(harness.pipeline(ScriptedGenerator::replying(STORY)));
    harness.submitter().submit(&FormBuilder::new().build(), None).unwrap();
    let outcome = worker.run_once().unwrap().unwrap();
    let JobOutcome::Completed { output_file, .. } = outcome else {
        panic!("job failed");
    };

    let library = harness.library();
    library.rate(&output_file, 5).unwrap();
    let summary = library.rate(&output_file, 2).unwrap();
    assert_eq!(summary.count, 2);
    assert!((summary.average - 3.5).abs() < f64::EPSILON);

    assert!(matches!(
        library.rate(&output_file, 6),
        Err(LibraryError::InvalidRating(6))
    ));
    assert!(matches!(
        library.rate("missing.html", 3),
        Err(LibraryError::NotFound(_))
    ));
}

#[test]
fn test_json_file_metadata_backend() {
    let harness = TestHarness::with_metadata_backend(MetadataBackend::JsonFile);
    let worker = harness.worker(harness.pipeline(ScriptedGenerator::replying(STORY)));
    harness.submitter().submit(&FormBuilder::new().build(), None).unwrap();
    let Some(JobOutcome::Completed { output_file, .. }) = worker.run_once().unwrap() else {
        panic!("job failed");
    };

    let library = harness.library();
    library.view(&output_file, None).unwrap();
    library.rate(&output_file, 4).unwrap();

    let raw = std::fs::read_to_string(&harness.config.paths.metadata_file).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["stories"][&output_file]["views"], 1);
    assert_eq!(doc["stories"][&output_file]["ratings"], serde_json::json!([4]));
}

#[test]
fn test_generation_failure_lands_in_error() {
    let harness = TestHarness::new();
    let worker = harness.worker(harness.pipeline(ScriptedGenerator::failing(503)));
    let submission = harness.submitter().submit(&FormBuilder::new().build(), None).unwrap();

    let outcome = worker.run_once().unwrap().unwrap();
    assert!(!outcome.is_completed());

    let report = check_status(&harness.jobs(), &submission.request_id);
    assert_eq!(report.label(), "error");
    let NextStep::ShowForm(error) = report.next_step() else {
        panic!("expected the form to be shown again");
    };
    assert!(error.contains("503"));

    let counts = harness.jobs().counts().unwrap();
    assert_eq!((counts.queued, counts.processed, counts.failed), (0, 0, 1));
    assert!(harness.library().list(None).unwrap().is_empty());
}

#[test]
fn test_malformed_queue_file_does_not_stop_the_worker() {
    let harness = TestHarness::new();
    let worker = harness.worker(harness.pipeline(ScriptedGenerator::replying(STORY)));
    harness.write_queue_file("broken-request.json", "{ not json");
    harness.submitter().submit(&FormBuilder::new().build(), None).unwrap();

    let first = worker.run_once().unwrap().unwrap();
    let second = worker.run_once().unwrap().unwrap();
    assert!(worker.run_once().unwrap().is_none());

    let (failed, completed) = if first.is_completed() {
        (second, first)
    } else {
        (first, second)
    };
    assert!(completed.is_completed());
    let JobOutcome::Failed { request_id, error_type, .. } = failed else {
        panic!("expected a failure");
    };
    assert_eq!(request_id, "broken-request");
    assert_eq!(error_type, "malformed_request");

    let error_file = harness.jobs().path_for(JobState::Failed, "broken-request");
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(error_file).unwrap()).unwrap();
    assert_eq!(doc["status"], "error");
    assert!(doc["original_payload"].is_null());

    let report = check_status(&harness.jobs(), "broken-request");
    assert!(matches!(report, StatusReport::Failed { record: None, .. }));
    assert!(matches!(report.next_step(), NextStep::ShowForm(ref e) if !e.is_empty()));
}

#[test]
fn test_narration_writes_audio_next_to_the_page() {
    let harness = TestHarness::new();
    let pipeline = harness.pipeline_with(ScriptedGenerator::replying(STORY), harness.narrator(60));
    let worker = harness.worker(pipeline);
    let submission = harness
        .submitter()
        .submit(&FormBuilder::new().audio().build(), None)
        .unwrap();

    let Some(JobOutcome::Completed { output_file, audio_file, .. }) = worker.run_once().unwrap()
    else {
        panic!("job failed");
    };
    let audio_file = audio_file.expect("audio produced");
    assert_eq!(audio_file, format!("audio/{}.mp3", submission.request_id));

    let audio = std::fs::read(harness.stories_dir().join(&audio_file)).unwrap();
    assert!(!audio.is_empty());
    assert!(audio.iter().all(|&b| b == 0xFF));

    assert!(harness.read_story(&output_file).contains(&audio_file));
    let listing = &harness.library().list(None).unwrap()[0];
    assert!(listing.has_audio());
}

#[test]
fn test_credits_are_spent_per_submission() {
    let harness = TestHarness::new();
    let user = harness.create_user("maya", 1);
    let submitter = harness.submitter();

    let submission = submitter.submit(&FormBuilder::new().build(), Some(user)).unwrap();
    assert_eq!(submission.credits_left, Some(0));
    assert_eq!(submission.record.username.as_deref(), Some("maya"));

    assert!(matches!(
        submitter.submit(&FormBuilder::new().build(), Some(user)),
        Err(SubmissionError::NoCredits(_))
    ));
    assert_eq!(harness.jobs().counts().unwrap().queued, 1);
}

#[test]
fn test_private_stories_are_hidden_from_others() {
    let harness = TestHarness::new();
    let owner = harness.create_user("owner", 5);
    let other = harness.create_user("other", 5);
    let worker = harness.worker(harness.pipeline(ScriptedGenerator::replying(STORY)));

    harness
        .submitter()
        .submit(&FormBuilder::new().title("Secret").private(true).build(), Some(owner))
        .unwrap();
    let Some(JobOutcome::Completed { output_file, .. }) = worker.run_once().unwrap() else {
        panic!("job failed");
    };

    let row = story_repo::find_by_filename(&harness.db, &output_file)
        .unwrap()
        .expect("story row recorded");
    assert_eq!(row.user_id, owner);
    assert_eq!(row.is_private, Some(true));

    let library = harness.library();
    assert!(library.view(&output_file, Some(owner)).is_ok());
    assert!(matches!(
        library.view(&output_file, Some(other)),
        Err(LibraryError::Private(_))
    ));
    assert!(matches!(
        library.view(&output_file, None),
        Err(LibraryError::Private(_))
    ));
    assert_eq!(library.list(Some(owner)).unwrap().len(), 1);
    assert!(library.list(Some(other)).unwrap().is_empty());
}

#[test]
fn test_account_privacy_applies_when_story_has_no_flag() {
    let harness = TestHarness::new();
    let owner = harness.create_user("quiet", 5);
    user_repo::set_private(&harness.db, owner, true).unwrap();
    let worker = harness.worker(harness.pipeline(ScriptedGenerator::replying(STORY)));

    harness
        .submitter()
        .submit(&FormBuilder::new().build(), Some(owner))
        .unwrap();
    worker.run_once().unwrap();

    let library = harness.library();
    assert!(library.list(None).unwrap().is_empty());
    assert_eq!(library.list(Some(owner)).unwrap().len(), 1);
}

#[test]
fn test_sync_rebuilds_story_rows() {
    let harness = TestHarness::new();
    let fallback = harness.create_user("admin", 0);
    assert_eq!(fallback, 1);
    let worker = harness.worker(harness.pipeline(ScriptedGenerator::replying(STORY)));

    harness.submitter().submit(&FormBuilder::new().build(), None).unwrap();
    let Some(JobOutcome::Completed { output_file, .. }) = worker.run_once().unwrap() else {
        panic!("job failed");
    };
    assert!(story_repo::find_by_filename(&harness.db, &output_file)
        .unwrap()
        .is_none());

    let library = harness.library();
    let processed = harness.config.paths.processed.clone();
    let skipped = library.sync_processed(&processed, false).unwrap();
    assert_eq!((skipped.succeeded, skipped.failed), (0, 1));

    let forced = library.sync_processed(&processed, true).unwrap();
    assert_eq!((forced.succeeded, forced.failed), (1, 0));
    let row = story_repo::find_by_filename(&harness.db, &output_file)
        .unwrap()
        .unwrap();
    assert_eq!(row.user_id, fallback);
}

#[test]
fn test_recreate_prefills_the_form() {
    let harness = TestHarness::new();
    let owner = harness.create_user("parent", 3);
    let worker = harness.worker(harness.pipeline(ScriptedGenerator::replying(STORY)));

    let form = FormBuilder::new()
        .theme("ocean")
        .age_range("3-5")
        .language("es")
        .lesson("kindness")
        .build();
    harness.submitter().submit(&form, Some(owner)).unwrap();
    let Some(JobOutcome::Completed { output_file, .. }) = worker.run_once().unwrap() else {
        panic!("job failed");
    };

    let row = story_repo::find_by_filename(&harness.db, &output_file)
        .unwrap()
        .unwrap();
    let prefilled = harness.submitter().prefill_from_story(row.id).unwrap();
    assert_eq!(prefilled.theme, "ocean");
    assert_eq!(prefilled.age_range, "3-5");
    assert_eq!(prefilled.language, "es");
    assert_eq!(prefilled.lesson.as_deref(), Some("kindness"));
    assert_eq!(prefilled.characters, "Luna the fox");
}

#[test]
fn test_recreated_demo_story_runs_again() {
    let harness = TestHarness::new();
    let owner = harness.create_user("parent", 5);
    let worker = harness.worker(harness.demo_pipeline());

    let form = FormBuilder::new().theme("space").age_range("5-8").build();
    harness.submitter().submit(&form, Some(owner)).unwrap();
    let Some(JobOutcome::Completed { output_file, .. }) = worker.run_once().unwrap() else {
        panic!("demo job failed");
    };
    let row = story_repo::find_by_filename(&harness.db, &output_file)
        .unwrap()
        .unwrap();
    assert_eq!(row.provider.as_deref(), Some("placeholder"));

    let prefilled = harness.submitter().prefill_from_story(row.id).unwrap();
    assert_eq!(prefilled.backend.as_deref(), Some("openai"));
    let again = harness.submitter().submit(&prefilled, Some(owner)).unwrap();

    let outcome = worker.run_once().unwrap().expect("recreated job queued");
    assert!(outcome.is_completed(), "recreated job failed: {:?}", outcome);
    assert_eq!(outcome.request_id(), again.request_id);
    assert_eq!(harness.jobs().counts().unwrap().failed, 0);
}

#[test]
fn test_unknown_backend_is_refused_before_charging() {
    let harness = TestHarness::new();
    let owner = harness.create_user("parent", 2);

    let mut form = FormBuilder::new().build();
    form.backend = Some("placeholder".to_string());
    let err = harness.submitter().submit(&form, Some(owner)).unwrap_err();
    assert!(matches!(err, SubmissionError::UnknownBackend(ref name) if name == "placeholder"));
    assert_eq!(user_repo::credits(&harness.db, owner).unwrap(), Some(2));
    assert_eq!(harness.jobs().counts().unwrap().queued, 0);
}
