use std::sync::{Arc, Mutex};

use signalflow::{create, CachePolicy, Direct};

#[test]
fn multicast_latest_replays_most_recent_to_late_subscriber() {
    let (input, signal) = create::<i32>();
    let hub = signal.multicast(Arc::new(Direct), CachePolicy::Latest);

    input.send(1).unwrap();
    input.send(2).unwrap();

    let late = hub.subscribe();
    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let _sub = late.subscribe(Arc::new(Direct), move |v| received2.lock().unwrap().push(v), |_| {});

    assert_eq!(*received.lock().unwrap(), vec![2]);

    input.send(3).unwrap();
    assert_eq!(*received.lock().unwrap(), vec![2, 3]);
}

#[test]
fn playback_replays_full_history_to_every_new_subscriber() {
    let (input, signal) = create::<i32>();
    let hub = signal.multicast(Arc::new(Direct), CachePolicy::All);

    input.send(1).unwrap();
    input.send(2).unwrap();
    input.send(3).unwrap();

    let late = hub.subscribe();
    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let _sub = late.subscribe(Arc::new(Direct), move |v| received2.lock().unwrap().push(v), |_| {});

    assert_eq!(*received.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn cache_until_active_buffers_then_switches_to_live_forwarding() {
    let (input, signal) = create::<i32>();
    let cache = signal.cache_until_active(Vec::new());

    input.send(1).unwrap();
    input.send(2).unwrap();

    let attached = cache.attach();
    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let _sub = attached.subscribe(Arc::new(Direct), move |v| received2.lock().unwrap().push(v), |_| {});

    assert_eq!(*received.lock().unwrap(), vec![1, 2]);

    input.send(3).unwrap();
    assert_eq!(*received.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn independent_multicast_subscribers_each_get_every_value_exactly_once() {
    let (input, signal) = create::<i32>();
    let hub = signal.multicast(Arc::new(Direct), CachePolicy::None);

    let a = Arc::new(Mutex::new(Vec::new()));
    let a2 = Arc::clone(&a);
    let _sub_a = hub.subscribe().subscribe(Arc::new(Direct), move |v| a2.lock().unwrap().push(v), |_| {});

    let b = Arc::new(Mutex::new(Vec::new()));
    let b2 = Arc::clone(&b);
    let _sub_b = hub.subscribe().subscribe(Arc::new(Direct), move |v| b2.lock().unwrap().push(v), |_| {});

    input.send(10).unwrap();
    input.send(20).unwrap();

    assert_eq!(*a.lock().unwrap(), vec![10, 20]);
    assert_eq!(*b.lock().unwrap(), vec![10, 20]);
}

#[test]
fn continuous_seeds_the_first_subscriber_with_initial_until_a_value_arrives() {
    let (input, signal) = create::<i32>();
    let hub = signal.continuous(Arc::new(Direct), 0);

    let a = hub.subscribe();
    let received_a = Arc::new(Mutex::new(Vec::new()));
    let received_a2 = Arc::clone(&received_a);
    let _sub_a = a.subscribe(Arc::new(Direct), move |v| received_a2.lock().unwrap().push(v), |_| {});

    input.send(1).unwrap();

    let b = hub.subscribe();
    let received_b = Arc::new(Mutex::new(Vec::new()));
    let received_b2 = Arc::clone(&received_b);
    let _sub_b = b.subscribe(Arc::new(Direct), move |v| received_b2.lock().unwrap().push(v), |_| {});

    input.send(2).unwrap();

    assert_eq!(*received_a.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(*received_b.lock().unwrap(), vec![1, 2]);
}

#[test]
fn cache_until_active_replays_precached_values_ahead_of_the_buffered_burst() {
    let (input, signal) = create::<i32>();
    let cache = signal.cache_until_active(vec![9]);

    input.send(1).unwrap();
    input.send(2).unwrap();

    let attached = cache.attach();
    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let _sub = attached.subscribe(Arc::new(Direct), move |v| received2.lock().unwrap().push(v), |_| {});

    assert_eq!(*received.lock().unwrap(), vec![9, 1, 2]);
}
