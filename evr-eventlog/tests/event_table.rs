//! End-to-end demultiplexing: subscription filtering, tick scaling, per-queue
//! counters and buffers, and scan coalescing with the completion protocol,
//! observed through consumers subscribed to the queue notifiers.

use std::sync::{Arc, Mutex, Once};

use evr_eventlog::{event_logs, EventDev, EventLogs};
use evr_notify::flush;
use evr_types::{
    record::{ArrayRecord, LongRecord, Record},
    TimeStamp,
};
use ntest::timeout;

static ONCE_SETUP: Once = Once::new();

fn once_setup() {
    ONCE_SETUP.call_once(|| {
        tracing_subscriber::fmt::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    });
}

const T0: u32 = 631_152_012;

fn push(input: &EventDev, words: &[u32]) {
    let mut arr = ArrayRecord::u32("TST:input", words.len());
    arr.value
        .as_u32_mut()
        .unwrap()
        .copy_from_slice(words);
    arr.nord = words.len();
    input.push_log(&mut arr).unwrap();
}

/// A count consumer scanned whenever its queue changes.
fn last_consumer(logs: &EventLogs, queue: &str, name: &str) -> Arc<Mutex<LongRecord>> {
    let rec = Arc::new(Mutex::new(LongRecord::new(name)));
    let dev = Arc::new(EventDev::try_bind(logs, &format!("log=evt queue={queue}")).unwrap());
    let notifier = dev.notifier().unwrap().clone();
    {
        let rec = rec.clone();
        notifier.subscribe(1, move || {
            let _ = dev.read_last(&mut rec.lock().unwrap());
        });
    }
    rec
}

#[test]
#[timeout(10000)]
fn demultiplexes_by_subscription_with_coalesced_scans() {
    once_setup();
    let logs = EventLogs::new();

    let input = EventDev::try_bind(&logs, "log=evt").unwrap();
    let mult = EventDev::try_bind(&logs, "log=evt").unwrap();
    let code1 = EventDev::try_bind(&logs, "log=evt queue=q1").unwrap();
    let code2 = EventDev::try_bind(&logs, "log=evt queue=q2").unwrap();

    let last1 = last_consumer(&logs, "q1", "TST:last1");
    let last2 = last_consumer(&logs, "q2", "TST:last2");

    // delta-buffer consumer on q1, default autoclear
    let buf1 = Arc::new(Mutex::new(ArrayRecord::f64("TST:buf1", 5)));
    let buf1_dev = Arc::new(EventDev::bind_buffer(
        &logs,
        &buf1.lock().unwrap(),
        "log=evt queue=q1",
    ));
    {
        let buf1 = buf1.clone();
        let dev = buf1_dev.clone();
        let notifier = dev.notifier().unwrap().clone();
        notifier.subscribe(1, move || {
            let _ = dev.read_buffer(&mut buf1.lock().unwrap());
        });
    }

    let mut rec = Record::new("TST:mult");
    mult.set_tick_scale(&mut rec, 2.0).unwrap();

    // manual first processing of the count record
    {
        let last1_dev = EventDev::try_bind(&logs, "log=evt queue=q1").unwrap();
        let mut rec = last1.lock().unwrap();
        last1_dev.read_last(&mut rec).unwrap();
        assert_eq!(rec.val, 1);
        assert_eq!(rec.record.time, TimeStamp::default());
    }

    // an all-zero log carries no event codes
    push(&input, &[0, 0, 0, 0, 0, 0]);
    flush();
    assert_eq!(last1.lock().unwrap().val, 1);

    let mut rec = Record::new("TST:code1");
    code1.set_event(&mut rec, 100).unwrap();
    code2.set_event(&mut rec, 25).unwrap();

    // codes without listeners leave both queues untouched
    push(&input, &[5, 10, 1, 0, 0, 0, 10, 11, 2, 0, 0, 0]);
    flush();
    {
        let rec = last1.lock().unwrap();
        assert_eq!(rec.val, 1);
        assert_eq!(rec.record.time, TimeStamp::default());
        assert_eq!(last2.lock().unwrap().val, 0);
    }

    // both queues take their share; two q1 events coalesce into one scan
    push(
        &input,
        &[25, T0, 1, 100, T0, 2, 100, T0, 3, 25, T0, 4],
    );
    flush();
    {
        let rec = last1.lock().unwrap();
        assert_eq!(rec.val, 2);
        assert_eq!(rec.record.time, TimeStamp::new(12, 3 * 2));
    }
    {
        let rec = last2.lock().unwrap();
        assert_eq!(rec.val, 1);
        assert_eq!(rec.record.time, TimeStamp::new(12, 4 * 2));
    }
    {
        let arr = buf1.lock().unwrap();
        assert_eq!(arr.record.time, TimeStamp::new(12, 2 * 2));
        assert_eq!(arr.nord, 2);
        assert_eq!(&arr.value.as_f64().unwrap()[..2], &[0.0, 2e-9]);
    }

    // the completed scan re-armed q2; q1 stays quiet
    push(&input, &[25, T0, 8]);
    flush();
    assert_eq!(last1.lock().unwrap().val, 2);
    {
        let rec = last2.lock().unwrap();
        assert_eq!(rec.val, 2);
        assert_eq!(rec.record.time, TimeStamp::new(12, 8 * 2));
    }
}

#[test]
#[timeout(10000)]
fn manual_clear_feeds_an_autoclear_off_consumer() {
    once_setup();
    let logs = EventLogs::new();

    let input = EventDev::try_bind(&logs, "log=evt2").unwrap();
    let sel = EventDev::try_bind(&logs, "log=evt2 queue=q").unwrap();
    let mut rec = Record::new("TST:code");
    sel.set_event(&mut rec, 25).unwrap();

    let buf = ArrayRecord::f64("TST:buf", 4);
    let reader = EventDev::bind_buffer(&logs, &buf, "log=evt2 queue=q autoclear=no");
    let clearer = EventDev::try_bind(&logs, "log=evt2 queue=q").unwrap();

    push(&input, &[25, T0, 1, 25, T0, 2]);

    // without autoclear the same buffer reads back until cleared
    let mut buf = buf;
    for _ in 0..2 {
        reader.read_buffer(&mut buf).unwrap();
        assert_eq!(buf.nord, 2);
        assert_eq!(&buf.value.as_f64().unwrap()[..2], &[0.0, 1e-9]);
        assert_eq!(buf.record.time, TimeStamp::new(12, 1));
    }

    let mut clear_rec = Record::new("TST:clear");
    clearer.clear(&mut clear_rec, 0).unwrap();
    reader.read_buffer(&mut buf).unwrap();
    assert_eq!(buf.nord, 2, "clear(0) is a no-op");

    clearer.clear(&mut clear_rec, 1).unwrap();
    reader.read_buffer(&mut buf).unwrap();
    assert_eq!(buf.nord, 0);
    flush();
}

#[test]
fn process_wide_registry_pins_logs_by_name() {
    once_setup();
    let a = event_logs().get_or_create("ioc-log");
    let b = event_logs().get_or_create("ioc-log");
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.name(), "ioc-log");
}
