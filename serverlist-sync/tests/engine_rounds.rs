//! Sync engine behaviour against in-memory stores: first publication,
//! pruning, retries, lost races and retry exhaustion.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serverlist_core::{codec, MemberEntry, MembershipList, Revision, ServerName};
use serverlist_sync::{
    Backoff, Clock, DataKey, MemoryStore, RemoteStore, RetryPolicy, RoundError, StaticAddress,
    StoreError, StoreRecord, SyncEngine, SyncError, SyncOptions, SystemClock, VerificationFailure,
    VerifyMode,
};

const KEY: DataKey = [0x42; 32];

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Manually driven clock; sleeping advances "now" and is recorded.
struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 8, 12, 0, 0).unwrap()
}

fn entry(name: &str, ip: &str, last_seen: DateTime<Utc>) -> MemberEntry {
    MemberEntry {
        name: ServerName::from(name),
        address: Some(ip.to_string()),
        last_seen,
    }
}

fn seed(store: &MemoryStore, entries: Vec<MemberEntry>, revision: u64) {
    let payload = codec::encode(&MembershipList::from(entries)).unwrap();
    store.write(&KEY, &payload, Revision(revision)).unwrap();
}

fn stored_list(store: &MemoryStore) -> (MembershipList, Revision) {
    let record = store.snapshot(&KEY).expect("record present");
    (codec::decode(&record.data).unwrap(), record.revision)
}

fn bounded(max_rounds: u32) -> SyncOptions {
    SyncOptions {
        retry: RetryPolicy {
            max_rounds: Some(max_rounds),
            ..RetryPolicy::default()
        },
        ..SyncOptions::default()
    }
}

fn engine<'a, S: RemoteStore + ?Sized>(
    store: &'a S,
    resolver: &'a StaticAddress,
    clock: &'a FakeClock,
    name: &str,
    options: SyncOptions,
) -> SyncEngine<'a, S, StaticAddress, &'a FakeClock> {
    SyncEngine::new(store, resolver, clock, KEY, ServerName::from(name), options)
        .with_backoff(Backoff::seeded(Duration::from_secs(180), 7))
}

/// Fails the first `failures` reads with a transport error.
struct FlakyStore {
    inner: MemoryStore,
    failures: Mutex<u32>,
}

impl RemoteStore for FlakyStore {
    fn read(&self, key: &DataKey) -> Result<StoreRecord, StoreError> {
        let mut left = self.failures.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(StoreError::Transport {
                endpoint: "memory".into(),
                message: "connection reset".into(),
            });
        }
        self.inner.read(key)
    }

    fn write(&self, key: &DataKey, data: &[u8], revision: Revision) -> Result<(), StoreError> {
        self.inner.write(key, data, revision)
    }
}

/// Right before our first write lands, a rival host publishes its own list
/// at the same revision. Depending on `silent`, our write is then either
/// rejected (the store reports a conflict) or acknowledged and discarded.
struct RivalStore {
    inner: MemoryStore,
    rival: Mutex<Option<MemberEntry>>,
    silent: bool,
}

impl RivalStore {
    fn new(rival: MemberEntry, silent: bool) -> Self {
        Self {
            inner: MemoryStore::new(),
            rival: Mutex::new(Some(rival)),
            silent,
        }
    }
}

impl RemoteStore for RivalStore {
    fn read(&self, key: &DataKey) -> Result<StoreRecord, StoreError> {
        self.inner.read(key)
    }

    fn write(&self, key: &DataKey, data: &[u8], revision: Revision) -> Result<(), StoreError> {
        if let Some(rival) = self.rival.lock().unwrap().take() {
            let (mut list, _) = match self.inner.read(key) {
                Ok(record) => (codec::decode(&record.data).unwrap(), record.revision),
                Err(_) => (MembershipList::new(), Revision::ZERO),
            };
            list.upsert_self(
                &rival.name,
                &serverlist_core::AddressLookup::Resolved(rival.address.clone().unwrap()),
                rival.last_seen,
            );
            self.inner
                .write(key, &codec::encode(&list).unwrap(), revision)
                .unwrap();
            if self.silent {
                return Ok(());
            }
        }
        self.inner.write(key, data, revision)
    }
}

/// Acknowledges every write and keeps nothing.
struct DroppingStore(MemoryStore);

impl RemoteStore for DroppingStore {
    fn read(&self, key: &DataKey) -> Result<StoreRecord, StoreError> {
        self.0.read(key)
    }

    fn write(&self, _key: &DataKey, _data: &[u8], _revision: Revision) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Stores a fresh own entry whose address differs from what we sent.
struct RewritingStore(MemoryStore);

impl RemoteStore for RewritingStore {
    fn read(&self, key: &DataKey) -> Result<StoreRecord, StoreError> {
        self.0.read(key)
    }

    fn write(&self, key: &DataKey, data: &[u8], revision: Revision) -> Result<(), StoreError> {
        let list = codec::decode(data).unwrap();
        let rewritten: Vec<_> = list
            .into_entries()
            .into_iter()
            .map(|mut e| {
                e.address = Some("198.51.100.1".to_string());
                e
            })
            .collect();
        let payload = codec::encode(&MembershipList::from(rewritten)).unwrap();
        self.0.write(key, &payload, revision)
    }
}

// ---------------------------------------------------------------------------
// 1. Happy paths
// ---------------------------------------------------------------------------

#[test]
fn first_publication_on_empty_store() {
    let store = MemoryStore::new();
    let resolver = StaticAddress::unavailable("lookup disabled");
    let clock = FakeClock::at(t0());

    let report = engine(&store, &resolver, &clock, "dev1.siasky.dev", SyncOptions::default())
        .run()
        .expect("run");

    assert_eq!(report.rounds, 1);
    assert_eq!(report.revision, Revision(1));
    assert_eq!(report.entry, entry("dev1.siasky.dev", "", t0()));

    let (list, revision) = stored_list(&store);
    assert_eq!(revision, Revision(1));
    assert_eq!(list.entries(), &[entry("dev1.siasky.dev", "", t0())]);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(3)]);
}

#[test]
fn existing_members_kept_and_stale_members_pruned() {
    let store = MemoryStore::new();
    seed(
        &store,
        vec![
            entry("dev2", "10.0.0.2", t0() - chrono::Duration::days(1)),
            entry("dev3", "10.0.0.3", t0() - chrono::Duration::days(8)),
        ],
        5,
    );
    let resolver = StaticAddress::resolved("10.0.0.1");
    let clock = FakeClock::at(t0());

    let report = engine(&store, &resolver, &clock, "dev1", SyncOptions::default())
        .run()
        .expect("run");

    assert_eq!(report.revision, Revision(6));
    assert_eq!(report.pruned.len(), 1);
    assert_eq!(report.pruned[0].name, ServerName::from("dev3"));

    let (list, _) = stored_list(&store);
    let names: Vec<_> = list.iter().map(|e| e.name.0.as_str()).collect();
    assert_eq!(names, ["dev2", "dev1"]);
}

#[test]
fn known_address_survives_failed_lookup() {
    let store = MemoryStore::new();
    seed(
        &store,
        vec![entry("dev1", "1.2.3.4", t0() - chrono::Duration::days(2))],
        1,
    );
    let resolver = StaticAddress::unavailable("ipify timed out");
    let clock = FakeClock::at(t0());

    let report = engine(&store, &resolver, &clock, "dev1", SyncOptions::default())
        .run()
        .expect("run");

    assert_eq!(report.entry, entry("dev1", "1.2.3.4", t0()));
}

// ---------------------------------------------------------------------------
// 2. Retries
// ---------------------------------------------------------------------------

#[test]
fn transient_read_failures_are_retried() {
    let store = FlakyStore {
        inner: MemoryStore::new(),
        failures: Mutex::new(2),
    };
    let resolver = StaticAddress::unavailable("off");
    let clock = FakeClock::at(t0());

    let report = engine(&store, &resolver, &clock, "dev1", SyncOptions::default())
        .run()
        .expect("run");

    assert_eq!(report.rounds, 3);
    assert_eq!(report.revision, Revision(1));
    let sleeps = clock.sleeps();
    assert_eq!(sleeps.len(), 3, "two backoffs and one settle pause: {sleeps:?}");
    assert!(sleeps[..2].iter().all(|d| *d <= Duration::from_secs(180)));
}

#[test]
fn round_cap_surfaces_last_error() {
    let store = FlakyStore {
        inner: MemoryStore::new(),
        failures: Mutex::new(u32::MAX),
    };
    let resolver = StaticAddress::unavailable("off");
    let clock = FakeClock::at(t0());

    let err = engine(&store, &resolver, &clock, "dev1", bounded(3))
        .run()
        .unwrap_err();

    match err {
        SyncError::RetriesExhausted { rounds, last } => {
            assert_eq!(rounds, 3);
            assert!(matches!(last, RoundError::Read(StoreError::Transport { .. })));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(clock.sleeps().len(), 2, "no backoff after the final round");
}

#[test]
fn deadline_stops_retrying() {
    let store = FlakyStore {
        inner: MemoryStore::new(),
        failures: Mutex::new(u32::MAX),
    };
    let resolver = StaticAddress::unavailable("off");
    let clock = FakeClock::at(t0());
    let options = SyncOptions {
        retry: RetryPolicy {
            deadline: Some(Duration::from_secs(10 * 60)),
            ..RetryPolicy::default()
        },
        ..SyncOptions::default()
    };

    let err = engine(&store, &resolver, &clock, "dev1", options)
        .run()
        .unwrap_err();

    assert!(
        matches!(err, SyncError::DeadlineExceeded { deadline_secs: 600, .. }),
        "got: {err}"
    );
    assert_eq!(clock.now() - t0(), chrono::Duration::minutes(10));
}

#[test]
fn backoff_is_cut_short_by_deadline() {
    let store = FlakyStore {
        inner: MemoryStore::new(),
        failures: Mutex::new(u32::MAX),
    };
    let resolver = StaticAddress::unavailable("off");
    let clock = FakeClock::at(t0());
    let options = SyncOptions {
        retry: RetryPolicy {
            deadline: Some(Duration::from_secs(5)),
            ..RetryPolicy::default()
        },
        ..SyncOptions::default()
    };

    let err = engine(&store, &resolver, &clock, "dev1", options)
        .with_backoff(Backoff::seeded(Duration::from_secs(180), 3))
        .run()
        .unwrap_err();

    assert!(
        matches!(err, SyncError::DeadlineExceeded { deadline_secs: 5, .. }),
        "got: {err}"
    );
    assert!(clock.sleeps().iter().all(|d| *d <= Duration::from_secs(5)));
    assert_eq!(clock.now() - t0(), chrono::Duration::seconds(5));
}

#[test]
fn corrupt_record_is_retried_then_fatal_under_cap() {
    let store = MemoryStore::new();
    store.write(&KEY, b"{\"not\":\"a list\"}", Revision(3)).unwrap();
    let resolver = StaticAddress::unavailable("off");
    let clock = FakeClock::at(t0());

    let err = engine(&store, &resolver, &clock, "dev1", bounded(2))
        .run()
        .unwrap_err();

    assert!(
        matches!(err, SyncError::RetriesExhausted { rounds: 2, last: RoundError::Decode(_) }),
        "got: {err}"
    );
    assert_eq!(store.snapshot(&KEY).unwrap().revision, Revision(3));
}

// ---------------------------------------------------------------------------
// 3. Lost races
// ---------------------------------------------------------------------------

#[test]
fn rejected_write_retries_on_top_of_winner() {
    let store = RivalStore::new(entry("dev2", "10.0.0.2", t0()), false);
    let resolver = StaticAddress::resolved("10.0.0.1");
    let clock = FakeClock::at(t0());

    let report = engine(&store, &resolver, &clock, "dev1", SyncOptions::default())
        .run()
        .expect("run");

    assert_eq!(report.rounds, 2);
    assert_eq!(report.revision, Revision(2));
    let list = codec::decode(&store.inner.snapshot(&KEY).unwrap().data).unwrap();
    let names: Vec<_> = list.iter().map(|e| e.name.0.as_str()).collect();
    assert_eq!(names, ["dev2", "dev1"]);
}

#[test]
fn silently_superseded_write_is_caught_by_verification() {
    let store = RivalStore::new(entry("dev2", "10.0.0.2", t0()), true);
    let resolver = StaticAddress::resolved("10.0.0.1");
    let clock = FakeClock::at(t0());

    let mut sync = engine(&store, &resolver, &clock, "dev1", SyncOptions::default());
    let first = sync.run_round(1).unwrap_err();
    assert!(
        matches!(first, RoundError::Verify(VerificationFailure::Missing)),
        "got: {first}"
    );

    let report = sync.run().expect("run");
    assert_eq!(report.revision, Revision(2));
    assert_eq!(
        codec::decode(&store.inner.snapshot(&KEY).unwrap().data)
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn dropped_write_leaves_stale_entry() {
    let inner = MemoryStore::new();
    seed(&inner, vec![entry("dev1", "", t0() - chrono::Duration::hours(1))], 1);
    let store = DroppingStore(inner);
    let resolver = StaticAddress::unavailable("off");
    let clock = FakeClock::at(t0());

    let err = engine(&store, &resolver, &clock, "dev1", bounded(1))
        .run()
        .unwrap_err();

    match err {
        SyncError::RetriesExhausted {
            last: RoundError::Verify(VerificationFailure::Stale { age_secs }),
            ..
        } => assert!(age_secs >= 3600, "age {age_secs}"),
        other => panic!("expected stale verification, got {other:?}"),
    }
}

#[test]
fn fresh_mode_accepts_rewritten_entry_but_exact_mode_does_not() {
    let resolver = StaticAddress::resolved("10.0.0.1");

    let clock = FakeClock::at(t0());
    let store = RewritingStore(MemoryStore::new());
    let report = engine(&store, &resolver, &clock, "dev1", bounded(1))
        .run()
        .expect("fresh mode");
    assert_eq!(report.entry.address.as_deref(), Some("198.51.100.1"));

    let clock = FakeClock::at(t0());
    let store = RewritingStore(MemoryStore::new());
    let options = SyncOptions {
        verify: VerifyMode::Exact,
        ..bounded(1)
    };
    let err = engine(&store, &resolver, &clock, "dev1", options)
        .run()
        .unwrap_err();
    assert!(
        matches!(
            err,
            SyncError::RetriesExhausted {
                last: RoundError::Verify(VerificationFailure::Mismatch),
                ..
            }
        ),
        "got: {err}"
    );
}

// ---------------------------------------------------------------------------
// 4. Concurrent hosts
// ---------------------------------------------------------------------------

#[test]
fn concurrent_hosts_both_end_up_on_the_list() {
    let store = MemoryStore::new();
    let options = SyncOptions {
        retry: RetryPolicy {
            max_rounds: Some(500),
            deadline: None,
            max_backoff: Duration::from_millis(20),
            settle: Duration::from_millis(5),
        },
        ..SyncOptions::default()
    };
    let names = ["dev1.siasky.dev", "dev2.siasky.dev", "dev3.siasky.dev"];

    let reports: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = names
            .iter()
            .map(|name| {
                let store = &store;
                let options = options.clone();
                scope.spawn(move || {
                    let resolver = StaticAddress::unavailable("off");
                    let mut engine = SyncEngine::new(
                        store,
                        &resolver,
                        SystemClock,
                        KEY,
                        ServerName::from(*name),
                        options,
                    );
                    let report = engine.run().expect("engine run");
                    (report, Utc::now())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("engine thread"))
            .collect()
    });

    let (list, _) = stored_list(&store);
    assert_eq!(list.len(), names.len());
    for ((report, finished), name) in reports.iter().zip(names) {
        let stored: Vec<_> = list.iter().filter(|e| e.name.0 == name).collect();
        assert_eq!(stored.len(), 1, "exactly one entry for {name}");
        assert!(*finished - report.entry.last_seen <= chrono::Duration::minutes(5));
    }
}
