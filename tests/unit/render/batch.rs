use super::*;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

#[test]
fn zero_nprocs_is_rejected() {
    let err = BatchRunner::new(0, "test").err().unwrap();
    assert!(err.to_string().starts_with("validation error:"));
}

#[test]
fn batches_drain_in_dispatch_order() {
    let runner = BatchRunner::new(3, "test").unwrap();
    let control = StageControl::default();
    let mut seen = Vec::new();
    let mut progress = Vec::new();

    let completed = runner
        .run(
            (0..7u64).collect(),
            &control,
            |&n| {
                // Later jobs finish first inside a batch.
                std::thread::sleep(Duration::from_millis(20 - n * 2));
                (n != 4).then_some(n * 10)
            },
            |batch, done| {
                progress.push(done);
                seen.extend(batch);
                Ok(())
            },
        )
        .unwrap();

    assert!(completed);
    assert_eq!(progress, vec![3, 6, 7]);
    let expected = (0..7u64)
        .map(|n| (n, (n != 4).then_some(n * 10)))
        .collect::<Vec<_>>();
    assert_eq!(seen, expected);
    assert!(!control.is_running());
}

#[test]
fn concurrency_never_exceeds_nprocs() {
    let runner = BatchRunner::new(2, "test").unwrap();
    let control = StageControl::default();
    let active = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);

    runner
        .run(
            (0..9).collect::<Vec<u32>>(),
            &control,
            |_| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                active.fetch_sub(1, Ordering::SeqCst);
                Some(())
            },
            |_, _| Ok(()),
        )
        .unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[test]
fn stop_skips_remaining_batches_after_draining_current() {
    let runner = BatchRunner::new(2, "test").unwrap();
    let control = StageControl::default();
    let calls = AtomicUsize::new(0);

    let completed = runner
        .run(
            (0..6).collect::<Vec<u32>>(),
            &control,
            |_| {
                if calls.fetch_add(1, Ordering::SeqCst) == 2 {
                    assert!(control.request_stop());
                }
                Some(())
            },
            |_, _| Ok(()),
        )
        .unwrap();

    assert!(!completed);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(!control.take_stop(), "flag is cleared once observed");
}

#[test]
fn stop_during_last_batch_still_completes() {
    let runner = BatchRunner::new(4, "test").unwrap();
    let control = StageControl::default();

    let completed = runner
        .run(
            vec![1, 2, 3],
            &control,
            |_| {
                control.request_stop();
                Some(())
            },
            |_, _| Ok(()),
        )
        .unwrap();

    assert!(completed);
    assert!(!control.take_stop());
}

#[test]
fn idle_stage_ignores_stop_requests() {
    let handle = StopHandle::new();
    assert!(!handle.request_stop());

    let runner = BatchRunner::new(1, "test").unwrap();
    let completed = runner
        .run(vec![1, 2], handle.render(), |_| Some(()), |_, _| Ok(()))
        .unwrap();
    assert!(completed, "a stop requested before the stage started is not kept");
}

#[test]
fn on_batch_errors_abort_the_run() {
    let runner = BatchRunner::new(1, "test").unwrap();
    let control = StageControl::default();
    let mut batches = 0;
    let res = runner.run(
        vec![1, 2, 3],
        &control,
        |_| Some(()),
        |_, _| {
            batches += 1;
            Err(MapAnimError::cache("boom"))
        },
    );
    assert!(res.is_err());
    assert_eq!(batches, 1);
    assert!(!control.is_running());
}

#[test]
fn stop_requested_before_the_first_batch_is_kept_while_open() {
    let runner = BatchRunner::new(1, "test").unwrap();
    let control = StageControl::default();
    let outer = control.begin();
    assert!(control.request_stop());

    let calls = AtomicUsize::new(0);
    let completed = runner
        .run(
            vec![1, 2, 3],
            &control,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(())
            },
            |_, _| Ok(()),
        )
        .unwrap();
    assert!(!completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(control.is_running(), "the outer opening is still held");

    drop(outer);
    assert!(!control.is_running());
    assert!(!control.request_stop());
}

#[test]
fn closing_the_last_opening_clears_an_unobserved_stop() {
    let control = StageControl::default();
    let outer = control.begin();
    let inner = control.begin();
    assert!(control.request_stop());
    drop(inner);
    assert!(control.is_running());
    drop(outer);
    assert!(!control.take_stop());
}
