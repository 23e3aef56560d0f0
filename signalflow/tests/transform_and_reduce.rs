use std::sync::{Arc, Mutex};

use signalflow::{create, Direct, Next};

#[test]
fn transform_maps_values_and_forwards_end() {
    let (input, signal) = create::<i32>();
    let doubled = signal.transform(Arc::new(Direct), |v| Next::Single(v * 2));

    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let ended = Arc::new(Mutex::new(false));
    let ended2 = Arc::clone(&ended);
    let _sub = doubled.subscribe(
        Arc::new(Direct),
        move |v| received2.lock().unwrap().push(v),
        move |_end| *ended2.lock().unwrap() = true,
    );

    input.send(1).unwrap();
    input.send(2).unwrap();
    input.complete().unwrap();

    assert_eq!(*received.lock().unwrap(), vec![2, 4]);
    assert!(*ended.lock().unwrap());
}

#[test]
fn transform_can_drop_or_fan_out_values() {
    let (input, signal) = create::<i32>();
    let fanned = signal.transform(Arc::new(Direct), |v| {
        if v % 2 == 0 {
            Next::None
        } else {
            Next::Many(vec![v, v])
        }
    });

    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let _sub = fanned.subscribe(Arc::new(Direct), move |v| received2.lock().unwrap().push(v), |_| {});

    input.send(1).unwrap();
    input.send(2).unwrap();
    input.send(3).unwrap();

    assert_eq!(*received.lock().unwrap(), vec![1, 1, 3, 3]);
}

#[test]
fn reduce_folds_and_forwards_running_total() {
    let (input, signal) = create::<i32>();
    let total = signal.reduce(0, Arc::new(Direct), |acc, v| acc + v);

    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let _sub = total.subscribe(Arc::new(Direct), move |v| received2.lock().unwrap().push(v), |_| {});

    input.send(1).unwrap();
    input.send(2).unwrap();
    input.send(3).unwrap();

    assert_eq!(*received.lock().unwrap(), vec![1, 3, 6]);
}

#[test]
fn reduce_with_initializer_seeds_state_from_the_first_value() {
    let (input, signal) = create::<i32>();
    let total = signal.reduce_with_initializer(Arc::new(Direct), |first| *first, |acc, v| acc + v);

    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let _sub = total.subscribe(Arc::new(Direct), move |v| received2.lock().unwrap().push(v), |_| {});

    input.send(5).unwrap();
    input.send(2).unwrap();
    input.send(3).unwrap();

    assert_eq!(*received.lock().unwrap(), vec![5, 7, 10]);
}
