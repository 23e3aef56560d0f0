use std::sync::{Arc, Mutex};

use signalflow::{combine2, create, preclosed, End};

#[test]
fn preclosed_delivers_values_then_end_to_a_late_subscriber() {
    let signal = preclosed(vec![1, 2, 3], End::Complete);
    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let ended = Arc::new(Mutex::new(false));
    let ended2 = Arc::clone(&ended);
    let _sub = signal.subscribe(
        Arc::new(signalflow::Direct),
        move |v| received2.lock().unwrap().push(v),
        move |end| *ended2.lock().unwrap() = end.is_complete(),
    );

    assert_eq!(*received.lock().unwrap(), vec![1, 2, 3]);
    assert!(*ended.lock().unwrap());
}

#[test]
fn combine2_recomputes_once_both_sources_have_a_value() {
    let (a_input, a_signal) = create::<i32>();
    let (b_input, b_signal) = create::<i32>();
    let combined = combine2(a_signal, b_signal, Arc::new(signalflow::Direct), |a, b| a + b);

    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let _sub = combined.subscribe(Arc::new(signalflow::Direct), move |v| received2.lock().unwrap().push(v), |_| {});

    a_input.send(1).unwrap();
    assert!(received.lock().unwrap().is_empty(), "no output until both sources have a value");

    b_input.send(10).unwrap();
    assert_eq!(*received.lock().unwrap(), vec![11]);

    a_input.send(2).unwrap();
    assert_eq!(*received.lock().unwrap(), vec![11, 12]);
}
