//! End-to-end behaviour of the sectioned model: notification sequences,
//! invariants that hold across operations, and thread affinity.

use std::collections::HashSet;
use std::sync::atomic::{AtomicIsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::thread;

use parking_lot::Mutex;

use horizon_sections::prelude::*;

#[derive(Debug, Clone, PartialEq, Entity)]
struct Person {
    #[entity(id)]
    id: u32,
    #[entity(key)]
    name: String,
    #[entity(key)]
    country: String,
    age: u32,
}

fn person(id: u32, name: &str, country: &str, age: u32) -> Person {
    Person {
        id,
        name: name.to_string(),
        country: country.to_string(),
        age,
    }
}

fn people() -> Vec<Person> {
    vec![
        person(1, "Alice", "France", 31),
        person(2, "Bob", "Germany", 45),
        person(3, "Chloe", "France", 27),
        person(4, "Dieter", "Germany", 52),
        person(5, "Emma", "Italy", 38),
        person(6, "Fabio", "Italy", 29),
        person(7, "Gaston", "France", 61),
        person(8, "Hanna", "Germany", 33),
        person(9, "Ilaria", "Italy", 24),
        person(10, "Jules", "France", 40),
    ]
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Will,
    Change(Change),
    Did,
}

/// Records every notification and tracks will/did balance.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<Event>>,
    balance: AtomicIsize,
}

impl RecordingSink {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    fn balance(&self) -> isize {
        self.balance.load(AtomicOrdering::SeqCst)
    }
}

impl ChangeSink for RecordingSink {
    fn will_change_content(&self) {
        self.balance.fetch_add(1, AtomicOrdering::SeqCst);
        self.events.lock().push(Event::Will);
    }

    fn did_change(&self, change: &Change) {
        self.events.lock().push(Event::Change(change.clone()));
    }

    fn did_change_content(&self) {
        self.balance.fetch_sub(1, AtomicOrdering::SeqCst);
        self.events.lock().push(Event::Did);
    }
}

fn new_model(
    key: Option<&str>,
    config: ModelConfig<Person>,
) -> (SectionedModel<Person>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let mut builder = SectionedModel::builder().config(config).delegate(sink.clone());
    if let Some(key) = key {
        builder = builder.section_key_field(key);
    }
    (builder.build().unwrap(), sink)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Slot<T> = Arc<Mutex<Option<Result<T>>>>;

fn capture<T: Send + 'static>() -> (Slot<T>, impl FnOnce(Result<T>) + Send + 'static) {
    let slot: Slot<T> = Arc::new(Mutex::new(None));
    let writer = slot.clone();
    (slot, move |result: Result<T>| *writer.lock() = Some(result))
}

fn taken<T>(slot: &Slot<T>) -> Result<T> {
    slot.lock().take().expect("completion ran")
}

fn paths(section: usize, rows: std::ops::Range<usize>) -> Vec<IndexPath> {
    rows.map(|row| IndexPath::new(section, row)).collect()
}

#[test]
fn test_unkeyed_insert_reports_every_row() {
    let (model, sink) = new_model(None, ModelConfig::default());

    model.insert(people(), drop);
    model.flush();

    assert_eq!(model.number_of_sections(), 1);
    assert_eq!(model.number_of_whole_entities(), 10);
    assert_eq!(
        sink.take(),
        vec![
            Event::Will,
            Event::Change(Change::entities_inserted(paths(0, 0..10))),
            Event::Did,
        ]
    );
    let ids: Vec<u32> = model.all_entities().iter().map(|p| p.id).collect();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_reinsert_is_idempotent() {
    let (model, sink) = new_model(None, ModelConfig::default());
    model.insert(people(), drop);
    model.flush();
    sink.take();

    let mut again = people();
    again[4].age = 39;
    model.insert(again, drop);
    model.flush();

    assert_eq!(model.number_of_whole_entities(), 10);
    assert_eq!(model.number_of_fetched_entities(), 10);
    let events = sink.take();
    assert_eq!(events.first(), Some(&Event::Will));
    assert_eq!(events.last(), Some(&Event::Did));
    for event in &events {
        if let Event::Change(change) = event {
            assert_eq!(change.kind(), ChangeKind::Update);
        }
    }
    assert_eq!(model.entity(IndexPath::new(0, 4)).map(|p| p.age), Some(39));
}

#[test]
fn test_fetch_twice_keeps_counts() {
    let (model, sink) = new_model(Some("country"), ModelConfig::default());

    model.fetch(people(), drop);
    model.fetch(people(), drop);
    model.flush();

    assert_eq!(model.number_of_whole_entities(), 10);
    assert_eq!(model.number_of_fetched_entities(), 10);
    assert!(sink.take().is_empty());
}

#[test]
fn test_removing_last_entity_deletes_section() {
    let (model, sink) = new_model(Some("country"), ModelConfig::default());
    let data: Vec<Person> = people()
        .into_iter()
        .map(|mut p| {
            if p.id == 6 || p.id == 9 {
                p.country = "Germany".into();
            }
            p
        })
        .collect();
    model.insert(data, drop);
    model.flush();
    assert_eq!(model.number_of_sections(), 3);
    assert_eq!(model.section_names(), vec!["France", "Germany", "Italy"]);
    sink.take();

    let (removed, done) = capture();
    model.remove(&[person(5, "Emma", "Italy", 38)], done);
    model.flush();

    assert_eq!(taken(&removed).unwrap().len(), 1);
    assert_eq!(model.number_of_sections(), 2);
    assert_eq!(
        sink.take(),
        vec![
            Event::Will,
            Event::Change(Change::section_deleted("Italy", 2)),
            Event::Did,
        ]
    );
    assert!(!model.is_fetched(&5));
}

#[test]
fn test_cleanup_can_be_disabled() {
    let config = ModelConfig::builder().remove_empty_sections(false).build();
    let (model, sink) = new_model(Some("country"), config);
    model.fetch(vec![person(1, "Alice", "France", 31)], drop);

    model.remove_at(vec![IndexPath::new(0, 0)], drop);
    model.flush();

    assert_eq!(model.number_of_sections(), 1);
    assert_eq!(model.number_of_entities(0), 0);
    assert_eq!(
        sink.take(),
        vec![
            Event::Will,
            Event::Change(Change::entities_deleted(vec![IndexPath::new(0, 0)])),
            Event::Did,
        ]
    );
}

#[test]
fn test_programmatic_move_is_reported() {
    let (model, sink) = new_model(None, ModelConfig::default());
    model.fetch(people(), drop);

    model.move_entity(IndexPath::new(0, 0), IndexPath::new(0, 9), false, drop);
    model.flush();

    assert_eq!(
        sink.take(),
        vec![
            Event::Will,
            Event::Change(Change::entities_moved(
                vec![IndexPath::new(0, 0)],
                vec![IndexPath::new(0, 9)],
            )),
            Event::Did,
        ]
    );
    assert_eq!(model.index_path(&people()[0]), Some(IndexPath::new(0, 9)));
}

#[test]
fn test_user_driven_move_is_silent() {
    let (model, sink) = new_model(None, ModelConfig::default());
    model.fetch(people(), drop);

    model.move_entity(IndexPath::new(0, 9), IndexPath::new(0, 0), true, drop);
    model.flush();

    assert!(sink.take().is_empty());
    assert_eq!(model.entity(IndexPath::new(0, 0)).map(|p| p.id), Some(10));
}

#[test]
fn test_update_reports_current_position() {
    let (model, sink) = new_model(None, ModelConfig::default());
    model.fetch(people(), drop);
    let alice = people()[0].clone();

    // Queued before the update, so the update must see Alice at row 9.
    model.move_entity(IndexPath::new(0, 0), IndexPath::new(0, 9), true, drop);
    let (updated, done) = capture();
    model.update(&alice, |p| p.age += 1, done);
    model.flush();

    assert_eq!(taken(&updated).unwrap(), Some(IndexPath::new(0, 9)));
    assert_eq!(
        sink.take(),
        vec![Event::Change(Change::entities_updated(vec![IndexPath::new(0, 9)]))]
    );
    assert_eq!(model.entity(IndexPath::new(0, 9)).map(|p| p.age), Some(32));
}

#[test]
fn test_filter_conservation() {
    let config = ModelConfig::builder().filter(|p: &Person| p.age >= 35).build();
    let (model, _sink) = new_model(Some("country"), config);

    model.insert(people(), drop);
    model.flush();

    for p in people() {
        assert!(model.is_fetched(&p.id));
        assert_eq!(model.contains(&p.id), p.age >= 35, "{p:?}");
    }
    assert_eq!(model.number_of_fetched_entities(), 10);
    assert_eq!(model.number_of_whole_entities(), 5);
}

#[test]
fn test_section_partition() {
    let config = ModelConfig::builder()
        .sort_entities_by_key(|p: &Person| p.age)
        .sort_sections_by_name()
        .build();
    let (model, _sink) = new_model(Some("country"), config);

    let all = people();
    let (first, second) = all.split_at(4);
    model.insert(first.to_vec(), drop);
    model.insert(second.to_vec(), drop);
    model.flush();

    let stored: HashSet<u32> = model.all_entities().iter().map(|p| p.id).collect();
    assert_eq!(stored, (1..=10).collect());
    for section in model.snapshot() {
        assert!(section.entities().iter().all(|p| p.country == section.name()));
        assert!(section.entities().windows(2).all(|w| w[0].age <= w[1].age));
    }
    assert_eq!(model.section_names(), vec!["France", "Germany", "Italy"]);
}

#[test]
fn test_insert_reports_final_section_indices() {
    let config = ModelConfig::builder().sort_sections_by_name().build();
    let (model, sink) = new_model(Some("country"), config);
    model.fetch(vec![person(2, "Bob", "Germany", 45)], drop);

    model.insert(vec![person(1, "Alice", "France", 31)], drop);
    model.flush();

    assert_eq!(model.section_names(), vec!["France", "Germany"]);
    assert_eq!(
        sink.take(),
        vec![
            Event::Will,
            // Germany shifts to 1 implicitly.
            Event::Change(Change::section_inserted("France", 0)),
            Event::Did,
        ]
    );
}

#[test]
fn test_head_insert_into_sorted_model_is_a_single_insert() {
    let config = ModelConfig::builder()
        .sort_entities_by_key(|p: &Person| p.id)
        .build();
    let (model, sink) = new_model(None, config);
    model.fetch((2..=11).map(|id| person(id, "P", "France", 30)).collect(), drop);

    model.insert(vec![person(1, "First", "France", 30)], drop);
    model.flush();

    assert_eq!(model.number_of_whole_entities(), 11);
    assert_eq!(model.index_path_for_id(&1), Some(IndexPath::new(0, 0)));
    assert_eq!(
        sink.take(),
        vec![
            Event::Will,
            Event::Change(Change::entities_inserted(vec![IndexPath::new(0, 0)])),
            Event::Did,
        ]
    );
}

#[test]
fn test_same_id_twice_in_one_batch_lands_once() {
    let (model, _sink) = new_model(Some("country"), ModelConfig::default());

    model.insert(
        vec![person(1, "Alice", "A", 31), person(1, "Alice", "B", 31)],
        drop,
    );
    model.flush();

    assert_eq!(model.number_of_whole_entities(), 1);
    assert_eq!(model.number_of_fetched_entities(), 1);
    assert_eq!(model.section_names(), vec!["B"]);
}

#[test]
fn test_sort_round_trip_and_move_pairing() {
    let (model, sink) = new_model(None, ModelConfig::default());
    model.fetch(people(), drop);
    model.flush();
    let before = model.all_entities();

    let (sorted, done) = capture();
    model.sort_entities(0, |a: &Person, b: &Person| a.age.cmp(&b.age), done);
    model.flush();

    let permutation = taken(&sorted).unwrap();
    let after = model.all_entities();
    assert_eq!(permutation.old.len(), before.len());
    assert_eq!(permutation.new.len(), before.len());
    assert_eq!(permutation.apply(&before), after);
    assert!(after.windows(2).all(|w| w[0].age <= w[1].age));

    let events = sink.take();
    let Event::Change(change) = &events[1] else {
        panic!("expected a move, got {events:?}");
    };
    assert_eq!(change.kind(), ChangeKind::Move);
    assert_eq!(change.len(), permutation.moved().count());

    // Same comparator again: nothing moves.
    let (sorted, done) = capture();
    model.sort_entities(0, |a: &Person, b: &Person| a.age.cmp(&b.age), done);
    model.flush();
    assert!(taken(&sorted).unwrap().is_identity());
    assert_eq!(sink.take(), vec![Event::Will, Event::Did]);
}

#[test]
fn test_sort_sections_reports_moves() {
    let (model, sink) = new_model(Some("country"), ModelConfig::default());
    model.fetch(people(), drop);
    model.flush();
    let before = model.section_names();

    let (sorted, done) = capture();
    model.sort_sections(|a, b| b.name().cmp(a.name()), done);
    model.flush();

    let permutation = taken(&sorted).unwrap();
    assert_eq!(permutation.len(), 3);
    assert_eq!(permutation.apply(&before), model.section_names());
    let moves = sink
        .take()
        .into_iter()
        .filter(|event| matches!(event, Event::Change(c) if c.is_section()))
        .count();
    assert_eq!(moves, permutation.moved().count());
}

#[test]
fn test_reorder_uses_configured_comparators() {
    let (model, _sink) = new_model(Some("country"), ModelConfig::default());
    model.fetch(people(), drop);
    model.update_config(|builder| {
        builder
            .sort_entities_by(|a: &Person, b: &Person| b.id.cmp(&a.id))
            .sort_sections_by(|a, b| b.name().cmp(a.name()))
    });

    let (entities, done_entities) = capture();
    let (sections, done_sections) = capture();
    model.reorder_entities(done_entities);
    model.reorder_sections(done_sections);
    model.flush();

    assert_eq!(taken(&entities).unwrap().len(), 3);
    assert_eq!(taken(&sections).unwrap().new, vec![2, 1, 0]);
    assert_eq!(model.section_names(), vec!["Italy", "Germany", "France"]);
    let italy: Vec<u32> = model
        .section(0)
        .map(|s| s.entities().iter().map(|p| p.id).collect())
        .unwrap_or_default();
    assert_eq!(italy, vec![9, 6, 5]);
}

#[test]
fn test_invalid_positions_leave_state_untouched() {
    let (model, sink) = new_model(Some("country"), ModelConfig::default());
    model.fetch(people(), drop);

    let (removed, done) = capture();
    model.remove_at(vec![IndexPath::new(0, 0), IndexPath::new(5, 0)], done);
    let (moved, done_move) = capture();
    model.move_entity(IndexPath::new(0, 0), IndexPath::new(0, 40), false, done_move);
    model.flush();

    assert!(taken(&removed).unwrap_err().is_out_of_bounds());
    assert!(taken(&moved).unwrap_err().is_out_of_bounds());
    assert_eq!(model.number_of_whole_entities(), 10);
    assert_eq!(model.number_of_fetched_entities(), 10);
    // Brackets stay balanced even when the body fails.
    assert_eq!(sink.take(), vec![Event::Will, Event::Did, Event::Will, Event::Did]);
    assert_eq!(sink.balance(), 0);
}

#[test]
fn test_remove_all_is_silent() {
    let (model, sink) = new_model(Some("country"), ModelConfig::default());
    model.insert(people(), drop);
    model.flush();
    sink.take();

    model.remove_all(drop);
    model.flush();

    assert!(model.is_empty());
    assert_eq!(model.number_of_sections(), 0);
    assert_eq!(model.number_of_fetched_entities(), 0);
    assert!(sink.take().is_empty());
}

#[test]
fn test_signals_mirror_delegate() {
    let (model, sink) = new_model(Some("country"), ModelConfig::default());
    let mirrored = Arc::new(Mutex::new(Vec::new()));

    let log = mirrored.clone();
    model.signals().will_change_content.connect(move |_| log.lock().push(Event::Will));
    let log = mirrored.clone();
    model
        .signals()
        .changed
        .connect(move |change| log.lock().push(Event::Change(change.clone())));
    let log = mirrored.clone();
    model.signals().did_change_content.connect(move |_| log.lock().push(Event::Did));

    model.insert(people(), drop);
    model.remove(&people()[..2], drop);
    model.flush();

    assert_eq!(*mirrored.lock(), sink.take());
}

#[test]
fn test_balance_under_concurrent_callers() {
    init_tracing();
    let config = ModelConfig::builder().sort_sections_by_name().build();
    let (model, sink) = new_model(Some("country"), config);
    let model = Arc::new(model);

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let model = model.clone();
            thread::spawn(move || {
                for i in 0..25u32 {
                    let id = t * 100 + i;
                    let country = ["France", "Germany", "Italy", "Spain"][(id % 4) as usize];
                    model.insert(vec![person(id, "P", country, 20 + i)], drop);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    model.flush();

    assert_eq!(model.number_of_whole_entities(), 100);
    assert_eq!(model.section_names(), vec!["France", "Germany", "Italy", "Spain"]);
    assert_eq!(sink.balance(), 0);

    // Units never interleave: brackets alternate strictly.
    let mut depth = 0;
    for event in sink.take() {
        match event {
            Event::Will => depth += 1,
            Event::Did => depth -= 1,
            Event::Change(_) => assert_eq!(depth, 1),
        }
        assert!((0..=1).contains(&depth));
    }
}

/// Reads the model back while notifications are delivered.
#[derive(Default)]
struct ReadingSink {
    model: Mutex<Weak<SectionedModel<Person>>>,
    seen: Mutex<Vec<(thread::ThreadId, usize)>>,
}

impl ChangeSink for ReadingSink {
    fn did_change(&self, _change: &Change) {
        if let Some(model) = self.model.lock().upgrade() {
            let count = model.number_of_whole_entities();
            self.seen.lock().push((thread::current().id(), count));
        }
    }
}

#[test]
fn test_main_context_delivery_and_completion() {
    init_tracing();
    let main = MainContext::for_current_thread();
    let sink = Arc::new(ReadingSink::default());
    let model = Arc::new(
        SectionedModel::<Person>::builder()
            .main_context(main.clone())
            .delegate(sink.clone())
            .worker_name("scenario-worker")
            .build()
            .unwrap(),
    );
    *sink.model.lock() = Arc::downgrade(&model);

    let completed_on = Arc::new(Mutex::new(None));
    let slot = completed_on.clone();
    model.insert(people()[..3].to_vec(), move |_| {
        *slot.lock() = Some(thread::current().id());
    });
    model.insert(people()[3..].to_vec(), drop);
    model.flush();

    let me = thread::current().id();
    assert_eq!(*completed_on.lock(), Some(me));
    // Each batch observed the state it describes, on the main thread.
    assert_eq!(*sink.seen.lock(), vec![(me, 3), (me, 10)]);

    let worker_thread = Arc::new(Mutex::new(None));
    let slot = worker_thread.clone();
    let background = model.clone();
    thread::spawn(move || {
        background.insert(vec![person(11, "Karl", "Austria", 50)], move |_| {
            *slot.lock() = thread::current().name().map(str::to_string);
        });
    })
    .join()
    .unwrap();
    model.flush();
    assert_eq!(worker_thread.lock().as_deref(), Some("scenario-worker"));
}

#[test]
fn test_insert_at_creates_section_at_end() {
    let (model, sink) = new_model(Some("country"), ModelConfig::default());
    model.fetch(people(), drop);

    let (inserted, done) = capture();
    model.insert_at(person(11, "Karl", "Austria", 50), IndexPath::new(3, 0), done);
    model.flush();

    assert_eq!(taken(&inserted).unwrap(), IndexPath::new(3, 0));
    assert_eq!(model.section_names().last().map(String::as_str), Some("Austria"));
    assert_eq!(
        model.section(3).and_then(|s| s.index_title().map(str::to_string)),
        Some("A".to_string())
    );
    assert_eq!(
        sink.take(),
        vec![
            Event::Will,
            Event::Change(Change::section_inserted("Austria", 3)),
            Event::Did,
        ]
    );
}
