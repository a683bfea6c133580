use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use serde_json::json;
use solidq::engine::Engine;
use solidq::error::Error;
use solidq::model::{STATS_NAMESPACE, WorkItem};

fn open_temp() -> (tempfile::TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path().join("core.db")).unwrap();
    (dir, engine)
}

#[test]
fn push_count_pop_roundtrip() {
    let (_dir, engine) = open_temp();

    engine.push("jobs", "job-42", Some(&json!({"x": 1}))).unwrap();
    assert_eq!(engine.count("jobs").unwrap(), 1);

    let item = engine.pop("jobs").unwrap().expect("one item queued");
    assert_eq!(item, WorkItem::with_payload("job-42", json!({"x": 1})));
    assert_eq!(engine.count("jobs").unwrap(), 0);
}

#[test]
fn pop_on_missing_or_empty_channel_is_none() {
    let engine: Engine = Engine::in_memory().unwrap();
    assert!(engine.pop("nothing-here").unwrap().is_none());
    assert!(engine.pop_many("nothing-here", 5).unwrap().is_empty());

    engine.push("jobs", "a", None).unwrap();
    engine.pop("jobs").unwrap();
    assert!(engine.pop("jobs").unwrap().is_none());
}

#[test]
fn pops_in_key_order() {
    let engine: Engine = Engine::in_memory().unwrap();
    engine.push("jobs", "b", None).unwrap();
    engine.push("jobs", "a", None).unwrap();
    engine.push("jobs", "c", None).unwrap();

    let ids: Vec<_> = engine
        .pop_many("jobs", 10)
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(ids, ["a", "b", "c"]);
}

#[test]
fn pop_many_respects_limit_and_treats_zero_as_one() {
    let engine: Engine = Engine::in_memory().unwrap();
    for id in ["1", "2", "3", "4"] {
        engine.push("jobs", id, None).unwrap();
    }

    assert_eq!(engine.pop_many("jobs", 0).unwrap().len(), 1);
    assert_eq!(engine.pop_many("jobs", 2).unwrap().len(), 2);
    assert_eq!(engine.count("jobs").unwrap(), 1);
}

#[test]
fn pop_many_with_huge_limit_drains_the_channel() {
    let engine: Engine = Engine::in_memory().unwrap();
    for id in ["a", "b", "c"] {
        engine.push("jobs", id, None).unwrap();
    }

    let ids: Vec<_> = engine
        .pop_many("jobs", usize::MAX)
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(ids, ["a", "b", "c"]);
    assert_eq!(engine.count("jobs").unwrap(), 0);
    assert_eq!(engine.stats().unwrap().get("jobs:pop"), Some(&3));
}

#[test]
fn repush_overwrites_payload_without_duplicating() {
    let engine: Engine = Engine::in_memory().unwrap();
    engine.push("jobs", "a", Some(&json!("first"))).unwrap();
    engine.push("jobs", "a", Some(&json!("second"))).unwrap();

    assert_eq!(engine.count("jobs").unwrap(), 1);
    let item = engine.pop("jobs").unwrap().unwrap();
    assert_eq!(item.payload, Some(json!("second")));
}

#[test]
fn reset_drops_the_channel() {
    let engine: Engine = Engine::in_memory().unwrap();
    engine.push("jobs", "a", None).unwrap();
    engine.push("jobs", "b", None).unwrap();
    engine.push("other", "c", None).unwrap();

    engine.reset_channel("jobs").unwrap();
    assert_eq!(engine.count("jobs").unwrap(), 0);
    assert!(engine.pop("jobs").unwrap().is_none());
    assert!(!engine.list_channels().unwrap().contains("jobs"));
    assert_eq!(engine.count("other").unwrap(), 1);

    // Resetting an absent channel is fine.
    engine.reset_channel("never-existed").unwrap();
}

#[test]
fn stats_count_pushes_and_popped_items() {
    let engine: Engine = Engine::in_memory().unwrap();
    assert!(engine.stats().unwrap().is_empty());

    engine.push("jobs", "a", None).unwrap();
    engine.push("jobs", "b", None).unwrap();
    engine.pop_many("jobs", 5).unwrap();
    // Empty polls are not counted.
    engine.pop("jobs").unwrap();

    let stats = engine.stats().unwrap();
    assert_eq!(stats.get("jobs:push"), Some(&2));
    assert_eq!(stats.get("jobs:pop"), Some(&2));

    let channels = engine.list_channels_with_count().unwrap();
    assert_eq!(channels.get("jobs"), Some(&0));
    assert_eq!(channels.get(STATS_NAMESPACE), Some(&2));
}

#[test]
fn concurrent_pushers_lose_nothing() {
    const PUSHERS: usize = 8;
    const PER_PUSHER: usize = 50;

    let (_dir, engine) = open_temp();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..PUSHERS)
        .map(|p| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..PER_PUSHER {
                    engine.push("jobs", &format!("{p}-{i}"), None).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.count("jobs").unwrap(), (PUSHERS * PER_PUSHER) as u64);
    assert_eq!(
        engine.stats().unwrap().get("jobs:push"),
        Some(&((PUSHERS * PER_PUSHER) as u64))
    );
}

#[test]
fn concurrent_poppers_never_share_an_item() {
    const ITEMS: usize = 400;
    const POPPERS: usize = 8;

    let (_dir, engine) = open_temp();
    for i in 0..ITEMS {
        engine.push("jobs", &format!("{i:04}"), None).unwrap();
    }
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..POPPERS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut got = Vec::new();
                while let Some(item) = engine.pop("jobs").unwrap() {
                    got.push(item.id);
                }
                got
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }
    let distinct: HashSet<_> = all.iter().cloned().collect();
    assert_eq!(all.len(), ITEMS, "no drops");
    assert_eq!(distinct.len(), ITEMS, "no duplicates");
    assert_eq!(engine.count("jobs").unwrap(), 0);
}

#[test]
fn second_handle_on_same_file_is_locked() {
    let (dir, engine) = open_temp();
    let path = dir.path().join("core.db");

    let err = Engine::<serde_json::Value>::open(&path).unwrap_err();
    assert!(matches!(err, Error::Locked(p) if p == path));

    engine.close().unwrap();
    let reopened: Engine = Engine::open(&path).unwrap();
    assert!(reopened.is_open());
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("core.db");

    {
        let engine: Engine = Engine::open(&path).unwrap();
        engine.push("jobs", "a", Some(&json!({"keep": true}))).unwrap();
    }

    let engine: Engine = Engine::open(&path).unwrap();
    assert_eq!(engine.count("jobs").unwrap(), 1);
    assert_eq!(
        engine.pop("jobs").unwrap().unwrap().payload,
        Some(json!({"keep": true}))
    );
}

#[test]
fn closed_engine_reports_not_open() {
    let (_dir, engine) = open_temp();
    engine.close().unwrap();
    engine.close().unwrap();

    assert!(!engine.is_open());
    assert!(matches!(engine.push("jobs", "a", None), Err(Error::NotOpen)));
    assert!(matches!(engine.pop("jobs"), Err(Error::NotOpen)));
    assert!(matches!(engine.count("jobs"), Err(Error::NotOpen)));
}

#[test]
fn typed_payloads() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Job {
        url: String,
        retries: u32,
    }

    let engine: Engine<Job> = Engine::in_memory().unwrap();
    let job = Job {
        url: "https://example.com".into(),
        retries: 3,
    };
    engine.push("crawl", "j1", Some(&job)).unwrap();
    assert_eq!(engine.pop("crawl").unwrap().unwrap().payload, Some(job));
}
